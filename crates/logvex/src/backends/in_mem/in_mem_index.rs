use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;

use crate::backends::IndexingClient;
use crate::common::Document;

/// 📒 One thing somebody asked the index to do, written down in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCall {
    Upload {
        index_name: String,
        payloads: Vec<String>,
    },
    EnsureEmpty {
        index_name: String,
    },
}

/// 📦 An indexing client that never forgets. Unlike my dad, who forgot my soccer game in 1998.
///
/// Every `upload` and `ensure_empty_index` lands in one shared, ordered call log
/// behind an `Arc<Mutex<...>>`, so a test can hand a clone to the buffer and
/// still peek inside afterwards. Clone-able for exactly that reason.
///
/// 🧨 `fail_uploads(true)` turns every subsequent upload into an error, for
/// the tests that need to watch things go wrong on purpose.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIndex {
    calls: Arc<tokio::sync::Mutex<Vec<IndexCall>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 📒 The full call log, in order.
    pub async fn calls(&self) -> Vec<IndexCall> {
        self.calls.lock().await.clone()
    }

    /// 📡 Just the uploads, as `(index_name, payloads)` pairs.
    pub async fn uploads(&self) -> Vec<(String, Vec<String>)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                IndexCall::Upload {
                    index_name,
                    payloads,
                } => Some((index_name.clone(), payloads.clone())),
                IndexCall::EnsureEmpty { .. } => None,
            })
            .collect()
    }

    /// 🏗️ Just the names of indices that were (re)created, in order.
    pub async fn ensured(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                IndexCall::EnsureEmpty { index_name } => Some(index_name.clone()),
                IndexCall::Upload { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl IndexingClient for InMemoryIndex {
    async fn upload(&self, documents: &[Document], index_name: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!(
                "💀 in-memory index told to fail, and it is nothing if not obedient ('{}')",
                index_name
            );
        }
        // 🔒 The Mutex is load-bearing. Do not remove. I know it looks optional. It isn't.
        self.calls.lock().await.push(IndexCall::Upload {
            index_name: index_name.to_string(),
            payloads: documents
                .iter()
                .map(|document| document.payload().to_string())
                .collect(),
        });
        Ok(())
    }

    async fn ensure_empty_index(&self, index_name: &str) -> Result<()> {
        self.calls.lock().await.push(IndexCall::EnsureEmpty {
            index_name: index_name.to_string(),
        });
        Ok(())
    }
}
