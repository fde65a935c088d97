//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Sources hand us deliveries off the queue. Indexing clients take batches
//! of documents and put them somewhere searchable. The buffer sits in the
//! middle, holding its breath.
//!
//! 🎭 This module is the casting agency. Need to ship to Elasticsearch? Keep
//! everything in RAM for a test? Read deliveries out of an NDJSON file? We've got
//! a backend for that.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::{IndexingConfig, SourceConfig};
use crate::common::{Delivery, Document};

pub mod elasticsearch;
pub mod file;
pub mod in_mem;

// 🎯 Re-export so callers can say `backends::FileSourceConfig` and move on with their lives.
pub use elasticsearch::{ElasticsearchIndex, ElasticsearchIndexConfig};
pub use file::{FileSource, FileSourceConfig};
pub use in_mem::{InMemoryIndex, InMemorySource, IndexCall};

// ===== Source Trait and Backend Enum =====

/// 🚰 A message consumer: yields deliveries, takes acks.
///
/// # Contract
/// - `next_delivery` returns `Ok(None)` once the stream has ended for good.
/// - Every delivery handed out must be acked after it has been processed,
///   including the ones we decided to drop.
/// - An ack that fails is an error for the caller to escalate, not to retry.
#[async_trait]
pub trait Source: std::fmt::Debug + Send {
    /// 📬 Pull the next delivery, waiting if the queue is quiet.
    async fn next_delivery(&mut self) -> Result<Option<Delivery>>;
    /// ✅ Tell upstream we're done with `tag`.
    async fn ack(&mut self, tag: u64) -> Result<()>;
}

/// 🎭 The many faces of a Source. Dispatches to the concrete consumer so the
/// consumer worker never has to know where deliveries come from.
#[derive(Debug)]
pub enum SourceBackend {
    InMemory(InMemorySource),
    File(FileSource),
}

impl SourceBackend {
    /// 🔧 Resolve the source from config.
    ///
    /// `InMemory` from config is a channel whose sender is already gone: the
    /// stream ends immediately. That makes it a "replay the journal, rotate, and
    /// exit" run, handy for draining a crashed instance without new traffic.
    pub async fn from_config(config: &SourceConfig) -> Result<Self> {
        match config {
            SourceConfig::File(file_config) => {
                Ok(Self::File(FileSource::new(file_config.clone()).await?))
            }
            SourceConfig::InMemory => {
                let (_sender, source) = InMemorySource::channel(1);
                Ok(Self::InMemory(source))
            }
        }
    }
}

#[async_trait]
impl Source for SourceBackend {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>> {
        match self {
            SourceBackend::InMemory(source) => source.next_delivery().await,
            SourceBackend::File(source) => source.next_delivery().await,
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<()> {
        match self {
            SourceBackend::InMemory(source) => source.ack(tag).await,
            SourceBackend::File(source) => source.ack(tag).await,
        }
    }
}

// ===== Indexing Client Trait and Backend Enum =====

/// 🕳️ The indexing collaborator. Two verbs, both synchronous from our side.
///
/// # Contract 📜
/// - `upload` ships a batch of opaque documents to one index, in order.
/// - `ensure_empty_index` deletes the index if it exists (not-found is fine)
///   and creates it fresh and empty.
/// - Any retry/backoff lives INSIDE the implementation. Once an error comes
///   back out, the buffer treats it as final.
#[async_trait]
pub trait IndexingClient: std::fmt::Debug + Send + Sync {
    async fn upload(&self, documents: &[Document], index_name: &str) -> Result<()>;
    async fn ensure_empty_index(&self, index_name: &str) -> Result<()>;
}

/// 🎭 The polymorphic indexing client. The buffer holds one of these and
/// stays blissfully ignorant of whether it's talking to a cluster or a Vec.
#[derive(Debug)]
pub enum IndexingBackend {
    InMemory(InMemoryIndex),
    Elasticsearch(ElasticsearchIndex),
}

impl IndexingBackend {
    /// 🔧 Resolve the indexing client from config. Elasticsearch pings the cluster here.
    pub async fn from_config(config: &IndexingConfig) -> Result<Self> {
        match config {
            IndexingConfig::Elasticsearch(es_config) => Ok(Self::Elasticsearch(
                ElasticsearchIndex::new(es_config.clone()).await?,
            )),
            IndexingConfig::InMemory => Ok(Self::InMemory(InMemoryIndex::default())),
        }
    }
}

#[async_trait]
impl IndexingClient for IndexingBackend {
    async fn upload(&self, documents: &[Document], index_name: &str) -> Result<()> {
        match self {
            IndexingBackend::InMemory(index) => index.upload(documents, index_name).await,
            IndexingBackend::Elasticsearch(index) => index.upload(documents, index_name).await,
        }
    }

    async fn ensure_empty_index(&self, index_name: &str) -> Result<()> {
        match self {
            IndexingBackend::InMemory(index) => index.ensure_empty_index(index_name).await,
            IndexingBackend::Elasticsearch(index) => index.ensure_empty_index(index_name).await,
        }
    }
}
