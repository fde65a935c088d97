//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where three tasks share one mutex..."
//! 🎬 "One supervisor dared to watch them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module: part middle manager, part helicopter parent.
//!
//! 🧠 Knowledge graph:
//! - Startup order: indexing client, schedule, buffer (journal replay + startup
//!   rotation), source, then the workers. Nothing is consumed before recovery.
//! - Background workers (flush, rotation) never finish on their own. If one
//!   does, it's an error, and so is anything the consumer returns as Err.
//! - The consumer finishing Ok means the source ran dry: stop the timers, do
//!   one last `flush_all`, go home.
//! - First failure wins. Everyone else is aborted, and the error goes up to the
//!   CLI, which prints the chain and exits non-zero. No retries, no heroics.
//!
//! ⚠️ DO NOT MAKE THIS PUB EVER
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod workers;

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinError;
use tracing::info;

use crate::app_config::AppConfig;
use crate::backends::{IndexingBackend, SourceBackend};
use crate::buffer::IngestionBuffer;
use crate::rotation::RotationSchedule;
use workers::{ConsumerWorker, FlushWorker, RotationWorker, Worker};

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?"
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🚀 Wire everything up and babysit until the source ends or something breaks.
    pub(crate) async fn run(self) -> Result<()> {
        let AppConfig {
            source_config,
            indexing_config,
            buffer: buffer_config,
        } = self.app_config;

        buffer_config.validate()?;
        let schedule = RotationSchedule::parse(&buffer_config.rotation_spec)
            .context("💀 rotation_spec did not parse. The indices would never know when to move out.")?;
        let flush_interval = buffer_config.flush_interval();

        let client = IndexingBackend::from_config(&indexing_config)
            .await
            .context("💀 Could not set up the indexing client")?;
        info!(
            "🚀 logvex starting: batch_size={}, flush every {:?}, rotation '{}', journal at '{}'",
            buffer_config.batch_size,
            flush_interval,
            schedule.display_label(),
            buffer_config.journal_path.display()
        );

        let buffer = IngestionBuffer::new(client, buffer_config)
            .await
            .context("💀 Could not bring the ingestion buffer up")?;
        let source = SourceBackend::from_config(&source_config)
            .await
            .context("💀 Could not set up the message source")?;

        supervise(buffer, source, schedule, flush_interval).await
    }
}

/// 🧵 Start the three workers and wait for the first one to matter.
pub(crate) async fn supervise(
    buffer: IngestionBuffer,
    source: SourceBackend,
    schedule: RotationSchedule,
    flush_interval: Duration,
) -> Result<()> {
    let mut background = vec![
        FlushWorker::new(buffer.clone(), flush_interval).start(),
        RotationWorker::new(buffer.clone(), schedule).start(),
    ];
    let mut consumer = ConsumerWorker::new(source, buffer.clone()).start();

    let outcome = tokio::select! {
        joined = &mut consumer => settle(joined, "ConsumerWorker"),
        (joined, _, _) = futures::future::select_all(background.iter_mut()) => {
            match settle(joined, "a background worker") {
                Ok(()) => Err(anyhow::anyhow!(
                    "💀 a background worker stopped on its own. They are supposed to be immortal."
                )),
                Err(err) => Err(err),
            }
        }
    };

    // 🪓 first one out turns off the lights
    consumer.abort();
    for handle in &background {
        handle.abort();
    }
    outcome?;

    let flushed = buffer
        .flush_all()
        .await
        .context("💀 The final flush after the source ended failed")?;
    info!(
        "🏁 source finished; final flush shipped {} documents. Goodnight.",
        flushed
    );
    Ok(())
}

// 🧅 JoinHandle<Result<()>> gives Result<Result<()>, JoinError>. Peel both layers.
fn settle(joined: Result<Result<()>, JoinError>, who: &str) -> Result<()> {
    joined.with_context(|| format!("💀 {} panicked or was cancelled", who))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryIndex, InMemorySource};
    use crate::buffer::BufferConfig;

    async fn buffer_in(
        dir: &tempfile::TempDir,
        batch_size: usize,
    ) -> Result<(IngestionBuffer, InMemoryIndex)> {
        let index = InMemoryIndex::new();
        let buffer = IngestionBuffer::new(
            IndexingBackend::InMemory(index.clone()),
            BufferConfig {
                batch_size,
                journal_path: dir.path().join("journal.json"),
                ..BufferConfig::default()
            },
        )
        .await?;
        Ok((buffer, index))
    }

    #[tokio::test]
    async fn the_one_where_every_delivery_is_acked_and_the_rest_is_flushed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (buffer, index) = buffer_in(&dir, 100).await?;
        let (tx, source) = InMemorySource::channel(8);
        let watcher = source.clone();

        tx.send(br#"{"category":"Event","document":{"n":1}}"#.to_vec()).await?;
        tx.send(b"DONE".to_vec()).await?;
        tx.send(b"this is not an envelope".to_vec()).await?;
        tx.send(br#"{"category":"Telemetry","document":{"n":2}}"#.to_vec()).await?;
        tx.send(br#"{"category":"Consumption","document":{"kwh":7}}"#.to_vec()).await?;
        drop(tx);

        supervise(
            buffer.clone(),
            SourceBackend::InMemory(source),
            RotationSchedule::parse("daily")?,
            Duration::from_secs(3600),
        )
        .await?;

        assert_eq!(watcher.acked().await, vec![1, 2, 3, 4, 5]);
        let uploads = index.uploads().await;
        assert_eq!(uploads.len(), 2);
        let shipped: Vec<&str> = uploads
            .iter()
            .flat_map(|(_, payloads)| payloads.iter().map(String::as_str))
            .collect();
        assert!(shipped.contains(&r#"{"kwh":7}"#));
        assert!(shipped.contains(&r#"{"n":1}"#));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_failed_upload_takes_everyone_down() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (buffer, index) = buffer_in(&dir, 1).await?;
        index.fail_uploads(true);
        let (tx, source) = InMemorySource::channel(8);
        tx.send(br#"{"category":"Event","document":{"n":1}}"#.to_vec()).await?;

        let result = supervise(
            buffer,
            SourceBackend::InMemory(source),
            RotationSchedule::parse("daily")?,
            Duration::from_secs(3600),
        )
        .await;

        assert!(result.is_err());
        drop(tx);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_metronome_flushes_on_its_own() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (buffer, index) = buffer_in(&dir, 100).await?;
        let ticker = FlushWorker::new(buffer.clone(), Duration::from_millis(100)).start();

        buffer
            .append(crate::common::Document::new(
                crate::common::Category::Event,
                r#"{"tick":"tock"}"#,
            )?)
            .await?;
        tokio::time::sleep(Duration::from_millis(400)).await;
        ticker.abort();

        assert_eq!(index.uploads().await.len(), 1);
        Ok(())
    }
}
