//! 🕰️ The RotationWorker: sleeps until the schedule says so, rotates, repeat.
//! Holds a clone of the buffer handle and no state of its own. Retirement goals.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tracing::info;

use super::Worker;
use crate::buffer::IngestionBuffer;
use crate::rotation::RotationSchedule;

#[derive(Debug)]
pub(crate) struct RotationWorker {
    buffer: IngestionBuffer,
    schedule: RotationSchedule,
}

impl RotationWorker {
    pub(crate) fn new(buffer: IngestionBuffer, schedule: RotationSchedule) -> Self {
        Self { buffer, schedule }
    }

    async fn run(self) -> Result<()> {
        info!(
            "🕰️ RotationWorker on schedule '{}'",
            self.schedule.display_label()
        );
        // 🔒 the last slot we fired. The wall clock may step backwards under us
        // (NTP, a VM resume); a slot that already fired must never fire again.
        let mut last_fired: Option<DateTime<Local>> = None;
        loop {
            let now = Local::now();
            let next = self.schedule.next_after(last_fired.map_or(now, |fired| fired.max(now)))?;
            // 💤 a negative wait can't happen, but if the clock jumps, rotate right away
            let wait = (next - now).to_std().unwrap_or_default();
            info!("🕰️ next rotation at {} (in {:?})", next, wait);
            tokio::time::sleep(wait).await;

            // wall clock and tokio's clock can disagree; never name an index before its time
            let fire_at = Local::now().max(next);
            self.buffer
                .rotate_at(fire_at)
                .await
                .context("💀 RotationWorker's scheduled rotation failed")?;
            last_fired = Some(fire_at);
        }
    }
}

impl Worker for RotationWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use crate::backends::{InMemoryIndex, IndexingBackend};
    use crate::buffer::BufferConfig;

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_lagging_wall_clock_never_refires_a_slot() -> Result<()> {
        // ⏩ tokio's clock races ahead while the wall clock barely moves,
        // which is exactly what a backwards NTP step looks like from in here
        let dir = tempfile::tempdir()?;
        let index = InMemoryIndex::new();
        let buffer = IngestionBuffer::new(
            IndexingBackend::InMemory(index.clone()),
            BufferConfig {
                journal_path: dir.path().join("journal.json"),
                ..BufferConfig::default()
            },
        )
        .await?;

        let worker = RotationWorker::new(buffer.clone(), RotationSchedule::parse("hourly")?).start();
        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        worker.abort();

        let ensured = index.ensured().await;
        let distinct: HashSet<&String> = ensured.iter().collect();
        assert_eq!(
            distinct.len(),
            ensured.len(),
            "💀 an index was recreated (and emptied) twice: {:?}",
            ensured
        );
        // 🕰️ at least one scheduled rotation happened on top of the startup one
        assert!(ensured.len() >= 4);
        Ok(())
    }
}
