//! 🪣 The Ingestion Buffer: the single source of truth for "accepted, not yet indexed".
//!
//! 🎬 *[three tasks walk up to one mutex.]*
//! *[the consumer wants to append. the ticker wants to flush. the cron wants to rotate.]*
//! *["one at a time," says the mutex. it has said this before. it will say it again.]*
//!
//! 🧠 Knowledge graph:
//! - State = per-index FIFO queues + the active index suffix + the recovery journal,
//!   all behind ONE `tokio::sync::Mutex`. No per-index locks. A flush of the events
//!   index blocks an append headed for consumptions. Known, accepted; the obvious
//!   optimization is swap-the-queue-out-then-upload-outside-the-lock, not done here.
//! - Uploads and index creation run INSIDE the critical section. The lock is the
//!   ordering guarantee: append, flush and rotate happen in one total order.
//! - Two flush triggers: queue length hits `batch_size` (synchronous, in `append`),
//!   or the periodic ticker fires (`flush_all`). A size flush kicks the ticker's
//!   reset button through a `Notify` so it doesn't flush again a heartbeat later.
//! - A queue is cleared only after its upload came back Ok. A failed upload leaves
//!   the queue and the journal untouched and returns the error upward, where the
//!   supervisor turns it into process exit. No retries live here.
//! - Rotation lives in `crate::rotation`, which borrows this module's state.
//!
//! 🦆

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::{debug, info, trace};

use crate::backends::{IndexingBackend, IndexingClient};
use crate::common::{Category, Document};
use crate::journal::RecoveryJournal;

// ============================================================
// 🔧 BufferConfig
// ============================================================

/// 🔧 Knobs for the buffer, the journal and the rotation schedule.
/// Every field has a default, so an empty `[buffer]` table is a valid config.
#[derive(Debug, Deserialize, Clone)]
pub struct BufferConfig {
    /// 📦 Documents per index before a synchronous flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// ⏱️ Seconds between periodic flushes.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// 🕰️ When to rotate, in local time:
    /// - `hourly` / `daily` / `weekly` (also with a leading `@`; `@midnight`,
    ///   `@monthly`, `@yearly` too)
    /// - a 5-field cron `m h dom mon dow` where each field is a `,` list of `*`,
    ///   `n` or `a-b`, each optionally `/step`. E.g. `0 0 * * 1-5`, `*/30 * * * *`.
    ///   No month or weekday names.
    #[serde(default = "default_rotation_spec")]
    pub rotation_spec: String,
    /// 🗃️ Where the recovery journal lives.
    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,
    /// 💾 Journal appends between disk writes. The bounded data-loss window.
    #[serde(default = "default_journal_write_every")]
    pub journal_write_every: usize,
    #[serde(default = "default_event_index_base")]
    pub event_index_base: String,
    #[serde(default = "default_consumption_index_base")]
    pub consumption_index_base: String,
}

// 📦 1000 docs. A round number, chosen by staring at it until it felt right.
fn default_batch_size() -> usize {
    1000
}

fn default_flush_interval_secs() -> u64 {
    5
}

// 🌙 local midnight, every night
fn default_rotation_spec() -> String {
    "daily".to_string()
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("logvex_journal.json")
}

fn default_journal_write_every() -> usize {
    10
}

fn default_event_index_base() -> String {
    "events".to_string()
}

fn default_consumption_index_base() -> String {
    "consumptions".to_string()
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval_secs(),
            rotation_spec: default_rotation_spec(),
            journal_path: default_journal_path(),
            journal_write_every: default_journal_write_every(),
            event_index_base: default_event_index_base(),
            consumption_index_base: default_consumption_index_base(),
        }
    }
}

impl BufferConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// 🚦 Refuse the configs that would make the buffer silly.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.batch_size > 0,
            "💀 batch_size must be at least 1. A batch of zero is a philosophy, not a flush trigger."
        );
        anyhow::ensure!(
            self.flush_interval_secs > 0,
            "💀 flush_interval_secs must be at least 1. A zero-second ticker is a busy loop with extra steps."
        );
        anyhow::ensure!(
            self.journal_write_every > 0,
            "💀 journal_write_every must be at least 1."
        );
        anyhow::ensure!(
            !self.event_index_base.is_empty() && !self.consumption_index_base.is_empty(),
            "💀 index base names must not be empty. '_2026.01.01-000000' is not a name, it's a cry for help."
        );
        Ok(())
    }
}

// ============================================================
// 🪣 IngestionBuffer
// ============================================================

/// 🏷️ `base + "_" + suffix`. The one true physical index name recipe.
pub fn physical_index_name(base: &str, suffix: &str) -> String {
    format!("{}_{}", base, suffix)
}

/// 🪣 The buffer handle. Cheap to clone; every clone shares the same state.
/// The workers each get one. Nobody gets a second mutex.
#[derive(Debug, Clone)]
pub struct IngestionBuffer {
    pub(crate) inner: Arc<BufferInner>,
}

#[derive(Debug)]
pub(crate) struct BufferInner {
    pub(crate) client: IndexingBackend,
    batch_size: usize,
    event_index_base: String,
    consumption_index_base: String,
    state: Mutex<BufferState>,
    flush_timer_reset: Notify,
}

/// 🔒 Everything the lock protects.
#[derive(Debug)]
pub(crate) struct BufferState {
    /// Physical index name -> documents in append order.
    pub(crate) queues: BTreeMap<String, Vec<Document>>,
    pub(crate) active_suffix: String,
    pub(crate) journal: RecoveryJournal,
}

impl IngestionBuffer {
    /// 🚀 Build the buffer: replay the journal, then rotate onto fresh indices
    /// named after the current local time. Nothing is accepted until both are done.
    pub async fn new(client: IndexingBackend, config: BufferConfig) -> Result<Self> {
        Self::new_at(client, config, Local::now()).await
    }

    /// 🕰️ Same as [`IngestionBuffer::new`], with the startup clock pinned.
    pub async fn new_at(
        client: IndexingBackend,
        config: BufferConfig,
        now: DateTime<Local>,
    ) -> Result<Self> {
        config.validate()?;

        let mut journal =
            RecoveryJournal::open(&config.journal_path, config.journal_write_every)
                .await
                .context("💀 Could not open the recovery journal. Without it, durability is just a rumor.")?;
        replay_journal(&client, &mut journal).await?;

        let buffer = Self {
            inner: Arc::new(BufferInner {
                client,
                batch_size: config.batch_size,
                event_index_base: config.event_index_base,
                consumption_index_base: config.consumption_index_base,
                state: Mutex::new(BufferState {
                    queues: BTreeMap::new(),
                    active_suffix: String::new(),
                    journal,
                }),
                flush_timer_reset: Notify::new(),
            }),
        };

        // 🎬 the eager startup rotation: fresh suffix, fresh empty indices, names journaled
        buffer
            .rotate_at(now)
            .await
            .context("💀 The startup rotation failed, so there is no safe index to write into.")?;
        Ok(buffer)
    }

    /// 📥 Accept one document.
    ///
    /// `Unknown` documents are dropped on the floor, no questions asked. Everything
    /// else is queued under its physical index name and journaled. When the queue
    /// reaches `batch_size`, it's uploaded right here, lock held, and that
    /// category's journal entries are cleared.
    ///
    /// # Errors
    /// 💀 Journal I/O or upload failure. Both are meant to be fatal upstream.
    pub async fn append(&self, document: Document) -> Result<()> {
        let category = document.category();
        let Some(base) = self.inner.base_name(category) else {
            trace!("🫥 dropping a document of unknown category");
            return Ok(());
        };

        let mut state = self.inner.lock_state().await;
        let index_name = physical_index_name(base, &state.active_suffix);

        state
            .journal
            .append(&document)
            .await
            .context("💀 Could not journal an incoming document. The recovery mirror is cracked.")?;

        let queue = state.queues.entry(index_name.clone()).or_default();
        queue.push(document);
        if queue.len() < self.inner.batch_size {
            return Ok(());
        }

        let flushed = self.inner.flush_queue(&mut state, &index_name).await?;
        state.journal.clear(category).await.with_context(|| {
            format!(
                "💀 Uploaded the {} queue but could not clear its journal entries.",
                category
            )
        })?;
        // ⏱️ just flushed; tell the ticker to start counting from zero again
        self.inner.flush_timer_reset.notify_one();
        debug!(
            "📦 size-triggered flush: {} documents to '{}'",
            flushed, index_name
        );
        Ok(())
    }

    /// ⏱️ The periodic flush: upload every non-empty queue.
    ///
    /// If anything went out, the WHOLE journal is reset, both categories, even one
    /// whose queue happened to be empty. Coarser than the per-category clear of the
    /// size-triggered path, on purpose.
    ///
    /// Returns how many documents were flushed. Zero means zero uploads happened.
    pub async fn flush_all(&self) -> Result<usize> {
        let mut state = self.inner.lock_state().await;
        let flushed = self.inner.drain_queues(&mut state).await?;
        if flushed > 0 {
            state
                .journal
                .reset()
                .await
                .context("💀 Flushed every queue but could not reset the journal.")?;
            debug!("⏱️ periodic flush shipped {} documents", flushed);
        }
        Ok(flushed)
    }

    /// 🔍 Snapshot of one queue, in order. For tests and curious operators.
    pub async fn get_buffered(&self, index_name: &str) -> Vec<Document> {
        self.inner
            .lock_state()
            .await
            .queues
            .get(index_name)
            .cloned()
            .unwrap_or_default()
    }

    /// 🏷️ Where a document of `category` would go right now. `None` for `Unknown`.
    pub async fn active_index_name(&self, category: Category) -> Option<String> {
        let base = self.inner.base_name(category)?;
        let state = self.inner.lock_state().await;
        Some(physical_index_name(base, &state.active_suffix))
    }

    pub async fn active_suffix(&self) -> String {
        self.inner.lock_state().await.active_suffix.clone()
    }

    /// ⏱️ Signalled after every size-triggered flush. The flush worker listens.
    pub(crate) fn flush_timer_reset(&self) -> &Notify {
        &self.inner.flush_timer_reset
    }
}

impl BufferInner {
    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().await
    }

    pub(crate) fn base_name(&self, category: Category) -> Option<&str> {
        match category {
            Category::Event => Some(&self.event_index_base),
            Category::Consumption => Some(&self.consumption_index_base),
            Category::Unknown => None,
        }
    }

    /// 🏷️ `(events, consumptions)` physical names for `suffix`.
    pub(crate) fn index_names(&self, suffix: &str) -> (String, String) {
        (
            physical_index_name(&self.event_index_base, suffix),
            physical_index_name(&self.consumption_index_base, suffix),
        )
    }

    /// 📡 Upload one queue and clear it. Cleared only once the upload said Ok.
    pub(crate) async fn flush_queue(
        &self,
        state: &mut BufferState,
        index_name: &str,
    ) -> Result<usize> {
        let Some(queue) = state.queues.get_mut(index_name) else {
            return Ok(0);
        };
        if queue.is_empty() {
            return Ok(0);
        }
        self.client
            .upload(queue.as_slice(), index_name)
            .await
            .with_context(|| {
                format!(
                    "💀 Uploading {} buffered documents to '{}' failed. They are still buffered and journaled; a restart will replay them.",
                    queue.len(),
                    index_name
                )
            })?;
        let flushed = queue.len();
        queue.clear();
        Ok(flushed)
    }

    /// 🚰 Flush every non-empty queue, in index-name order.
    pub(crate) async fn drain_queues(&self, state: &mut BufferState) -> Result<usize> {
        let pending: Vec<String> = state
            .queues
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        let mut flushed = 0;
        for index_name in pending {
            flushed += self.flush_queue(state, &index_name).await?;
        }
        Ok(flushed)
    }
}

/// 🔁 Upload whatever a previous life left in the journal, to the index names
/// it recorded, then wipe the documents. Runs before the buffer exists.
async fn replay_journal(client: &IndexingBackend, journal: &mut RecoveryJournal) -> Result<()> {
    if !journal.contents().has_documents() {
        debug!("📭 recovery journal is empty, nothing to replay");
        return Ok(());
    }

    for category in [Category::Event, Category::Consumption] {
        let documents = journal.contents().documents(category);
        if documents.is_empty() {
            continue;
        }
        let index_name = journal.contents().index_name(category).to_string();
        anyhow::ensure!(
            !index_name.is_empty(),
            "💀 The journal holds {} {} documents but no index name to send them to. \
             We will not guess. Inspect '{}' by hand.",
            documents.len(),
            category,
            journal.path().display()
        );
        info!(
            "🔁 replaying {} {} documents from the journal into '{}'",
            documents.len(),
            category,
            index_name
        );
        client
            .upload(&documents, &index_name)
            .await
            .with_context(|| {
                format!(
                    "💀 Replaying the journal into '{}' failed. The journal is untouched; try again when the index store is back.",
                    index_name
                )
            })?;
    }

    journal
        .reset()
        .await
        .context("💀 Replayed the journal but could not reset it afterwards.")
}
