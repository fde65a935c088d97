//! ⏱️ The FlushWorker: a metronome with a bulk API.
//!
//! Every `flush_interval` it calls `flush_all`. When the consumer flushes on size,
//! the buffer pokes a `Notify` and the metronome starts its count over, so a
//! fresh size-flush isn't followed by a pointless timer flush a heartbeat later.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, trace};

use super::Worker;
use crate::buffer::IngestionBuffer;

#[derive(Debug)]
pub(crate) struct FlushWorker {
    buffer: IngestionBuffer,
    interval: Duration,
}

impl FlushWorker {
    pub(crate) fn new(buffer: IngestionBuffer, interval: Duration) -> Self {
        Self { buffer, interval }
    }

    async fn run(self) -> Result<()> {
        info!("⏱️ FlushWorker ticking every {:?}", self.interval);
        // first tick one interval from now, not immediately
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let reset = self.buffer.flush_timer_reset();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let flushed = self
                        .buffer
                        .flush_all()
                        .await
                        .context("💀 FlushWorker's periodic flush failed")?;
                    if flushed == 0 {
                        trace!("⏱️ tick, nothing buffered");
                    }
                }
                _ = reset.notified() => {
                    trace!("⏱️ size-triggered flush happened, restarting the countdown");
                    ticker.reset();
                }
            }
        }
    }
}

impl Worker for FlushWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryIndex, IndexingBackend};
    use crate::buffer::BufferConfig;
    use crate::common::{Category, Document};

    fn event(payload: &str) -> Document {
        Document::new(Category::Event, payload).expect("💀 valid test JSON")
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_size_flush_restarts_the_countdown() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let index = InMemoryIndex::new();
        let buffer = IngestionBuffer::new(
            IndexingBackend::InMemory(index.clone()),
            BufferConfig {
                batch_size: 2,
                journal_path: dir.path().join("journal.json"),
                ..BufferConfig::default()
            },
        )
        .await?;
        let ticker = FlushWorker::new(buffer.clone(), Duration::from_secs(10)).start();

        // ⏱️ t=9s: a size flush, then one straggler that stays under the batch size
        tokio::time::sleep(Duration::from_secs(9)).await;
        buffer.append(event(r#"{"n":1}"#)).await?;
        buffer.append(event(r#"{"n":2}"#)).await?;
        buffer.append(event(r#"{"n":3}"#)).await?;
        assert_eq!(index.uploads().await.len(), 1);

        // ⏱️ t=10.5s: the original tick would have shipped the straggler by now. It didn't.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(index.uploads().await.len(), 1);

        // ⏱️ t=19.5s: the restarted countdown (9s + 10s) has fired
        tokio::time::sleep(Duration::from_secs(9)).await;
        let uploads = index.uploads().await;
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[1].1, vec![r#"{"n":3}"#.to_string()]);

        ticker.abort();
        Ok(())
    }
}
