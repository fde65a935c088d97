//! 🎬 *[a message arrives. it could be a log line. it could be "DONE". it could be garbage.]*
//! *[the consumer does not flinch. it decodes. it appends. it acks. every single time.]*
//!
//! 📥 The ConsumerWorker: the pipeline's front desk. Every delivery gets acked,
//! including the ones it throws away, because a redelivered piece of garbage is
//! still garbage, just later.

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use super::Worker;
use crate::backends::{Source, SourceBackend};
use crate::buffer::IngestionBuffer;
use crate::common::{Decoded, decode_delivery};

#[derive(Debug)]
pub(crate) struct ConsumerWorker {
    source: SourceBackend,
    buffer: IngestionBuffer,
}

impl ConsumerWorker {
    pub(crate) fn new(source: SourceBackend, buffer: IngestionBuffer) -> Self {
        Self { source, buffer }
    }

    async fn run(mut self) -> Result<()> {
        info!("📥 ConsumerWorker started listening...");
        let mut accepted: u64 = 0;
        let mut dropped: u64 = 0;

        while let Some(delivery) = self
            .source
            .next_delivery()
            .await
            .context("💀 ConsumerWorker could not receive the next delivery")?
        {
            match decode_delivery(&delivery.body) {
                Ok(Decoded::Done) => {
                    trace!("🏁 control token on delivery {}, nothing to buffer", delivery.tag);
                }
                Ok(Decoded::Document(document)) => {
                    self.buffer
                        .append(document)
                        .await
                        .context("💀 ConsumerWorker failed to buffer a document")?;
                    accepted += 1;
                }
                Err(err) => {
                    // 🗑️ malformed: say so, ack it anyway, move on
                    warn!(
                        "⚠️ dropping malformed delivery {}: {:#}",
                        delivery.tag, err
                    );
                    dropped += 1;
                }
            }
            self.source.ack(delivery.tag).await.with_context(|| {
                format!(
                    "💀 ConsumerWorker could not ack delivery {}. The broker and we now disagree about reality.",
                    delivery.tag
                )
            })?;
        }

        info!(
            "🏁 ConsumerWorker: source ended after {} accepted and {} dropped deliveries",
            accepted, dropped
        );
        Ok(())
    }
}

impl Worker for ConsumerWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}
