use std::sync::Arc;

use anyhow::Result;
use async_channel::{Receiver, Sender};
use async_trait::async_trait;

use crate::backends::Source;
use crate::common::Delivery;

/// 📬 A message queue that is really just an `async_channel` in a trench coat.
///
/// Push raw delivery bodies into the [`Sender`] from wherever; they come out
/// here as deliveries with increasing tags. Drop every sender and the stream
/// ends, which is how a test says "that's all, folks".
///
/// Acks are collected in a shared Vec so tests can check that every delivery
/// got one, including the ones we threw away.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    rx: Receiver<Vec<u8>>,
    next_tag: u64,
    acked: Arc<tokio::sync::Mutex<Vec<u64>>>,
}

impl InMemorySource {
    /// 🚀 Make a source and the sender that feeds it. Bounded, because infinite
    /// queues are how memory leaks get their start in life.
    pub fn channel(capacity: usize) -> (Sender<Vec<u8>>, Self) {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        (
            tx,
            Self {
                rx,
                next_tag: 0,
                acked: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            },
        )
    }

    /// ✅ Every tag acked so far, in order.
    pub async fn acked(&self) -> Vec<u64> {
        self.acked.lock().await.clone()
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>> {
        match self.rx.recv().await {
            Ok(body) => {
                self.next_tag += 1;
                Ok(Some(Delivery {
                    tag: self.next_tag,
                    body,
                }))
            }
            // 🏁 closed and drained. the party is over.
            Err(_) => Ok(None),
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<()> {
        self.acked.lock().await.push(tag);
        Ok(())
    }
}
