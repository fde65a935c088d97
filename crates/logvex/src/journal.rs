//! 🗃️ The Recovery Journal: a durable, file-backed mirror of everything the
//! buffer has accepted but not yet uploaded.
//!
//! 🎬 *[the power goes out. the process dies mid-sentence.]*
//! *[it comes back. it opens this file. it remembers.]*
//!
//! 🧠 Knowledge graph:
//! - One JSON file, four keys: `EventDocuments`, `ConsumptionDocuments`,
//!   `EventIndexName`, `ConsumptionIndexName`. Documents are embedded as raw JSON.
//! - Writes are batched: `append` only hits the disk every `write_every` appends
//!   (combined across both categories). Everything else (`clear`, `reset`,
//!   `set_index_names`) writes immediately.
//! - Every write goes to `<path>.tmp`, gets fsynced, and is renamed over `<path>`.
//!   A kill mid-write leaves the previous journal in place, never half a file.
//! - Only ever touched while the buffer lock is held. This module has no lock
//!   of its own and does not want one.
//! - No file on disk = nothing to recover. That is a normal Tuesday, not an error.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::common::{Category, Document};

/// 📜 Exactly what lives on disk. Field names are the wire format; do not rename.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalContents {
    #[serde(rename = "EventDocuments", default, deserialize_with = "null_as_empty")]
    pub event_documents: Vec<Box<RawValue>>,
    #[serde(
        rename = "ConsumptionDocuments",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub consumption_documents: Vec<Box<RawValue>>,
    #[serde(rename = "EventIndexName", default)]
    pub event_index_name: String,
    #[serde(rename = "ConsumptionIndexName", default)]
    pub consumption_index_name: String,
}

// 🕳️ Older writers spelled "no documents" as `null`. We accept both dialects.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<Box<RawValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Box<RawValue>>>::deserialize(deserializer)?.unwrap_or_default())
}

impl JournalContents {
    /// 📦 The pending documents for one category, rebuilt as [`Document`]s.
    /// `Unknown` never gets journaled, so it always comes back empty.
    pub fn documents(&self, category: Category) -> Vec<Document> {
        let raw = match category {
            Category::Event => &self.event_documents,
            Category::Consumption => &self.consumption_documents,
            Category::Unknown => return Vec::new(),
        };
        raw.iter()
            .map(|payload| Document::from_raw(category, payload.clone()))
            .collect()
    }

    /// 🏷️ The physical index name recorded for a category. Empty if never set.
    pub fn index_name(&self, category: Category) -> &str {
        match category {
            Category::Event => &self.event_index_name,
            Category::Consumption => &self.consumption_index_name,
            Category::Unknown => "",
        }
    }

    pub fn has_documents(&self) -> bool {
        !self.event_documents.is_empty() || !self.consumption_documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.event_documents.len() + self.consumption_documents.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_documents()
    }

    fn documents_mut(&mut self, category: Category) -> Option<&mut Vec<Box<RawValue>>> {
        match category {
            Category::Event => Some(&mut self.event_documents),
            Category::Consumption => Some(&mut self.consumption_documents),
            Category::Unknown => None,
        }
    }
}

/// 🗃️ The journal handle: in-memory contents plus the file they mirror.
#[derive(Debug)]
pub struct RecoveryJournal {
    path: PathBuf,
    contents: JournalContents,
    write_every: usize,
    appends_since_write: usize,
}

impl RecoveryJournal {
    /// 🚀 Open (or start) the journal at `path`, loading whatever a previous
    /// process left behind.
    ///
    /// `write_every` is the append cadence: the file is rewritten once that many
    /// appends have piled up since the last write. Must be at least 1.
    pub async fn open(path: impl Into<PathBuf>, write_every: usize) -> Result<Self> {
        let path = path.into();
        anyhow::ensure!(
            write_every > 0,
            "💀 journal_write_every must be at least 1. Zero means 'never write', and a journal that never writes is a diary with no pages."
        );
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!(
                    "💀 Could not create the journal directory '{}'. The journal needs a home before it can remember anything.",
                    parent.display()
                )
            })?;
        }
        let contents = Self::load(&path).await?;
        debug!(
            "🗃️ journal opened at '{}' holding {} pending documents",
            path.display(),
            contents.len()
        );
        Ok(Self {
            path,
            contents,
            write_every,
            appends_since_write: 0,
        })
    }

    /// 📖 Read the journal file. Absent (or empty) file = empty contents, not an error.
    pub async fn load(path: &Path) -> Result<JournalContents> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                trace!("📭 no journal at '{}', nothing to recover", path.display());
                return Ok(JournalContents::default());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "💀 The journal at '{}' exists but would not be read. Durability cannot be promised from here.",
                        path.display()
                    )
                });
            }
        };
        if bytes.trim_ascii().is_empty() {
            return Ok(JournalContents::default());
        }
        serde_json::from_slice(&bytes).with_context(|| {
            format!(
                "💀 The journal at '{}' is not valid journal JSON. Something wrote here that wasn't us, or wasn't finished.",
                path.display()
            )
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents(&self) -> &JournalContents {
        &self.contents
    }

    /// ✍️ Stage a document. Hits the disk only when the cadence says so.
    pub async fn append(&mut self, document: &Document) -> Result<()> {
        let Some(documents) = self.contents.documents_mut(document.category()) else {
            return Ok(());
        };
        documents.push(document.raw_payload().to_owned());
        self.appends_since_write += 1;
        if self.appends_since_write >= self.write_every {
            self.persist().await?;
        }
        Ok(())
    }

    /// 🧹 Drop one category's entries (staged and persisted) and rewrite.
    pub async fn clear(&mut self, category: Category) -> Result<()> {
        let Some(documents) = self.contents.documents_mut(category) else {
            return Ok(());
        };
        documents.clear();
        self.persist().await
    }

    /// 🗑️ Drop every pending document. Index names stay put.
    pub async fn reset(&mut self) -> Result<()> {
        self.contents.event_documents.clear();
        self.contents.consumption_documents.clear();
        self.persist().await
    }

    /// 🏷️ Record the current physical index names. Rotation's business only.
    pub async fn set_index_names(&mut self, event: &str, consumption: &str) -> Result<()> {
        self.contents.event_index_name = event.to_string();
        self.contents.consumption_index_name = consumption.to_string();
        self.persist().await
    }

    // 💾 temp file, fsync, rename. The file is either the old journal or the new one.
    async fn persist(&mut self) -> Result<()> {
        let bytes = serde_json::to_vec(&self.contents)
            .context("💀 The journal refused to serialize itself. Introspection is hard.")?;
        let temp_path = temp_path_for(&self.path);

        let mut file = tokio::fs::File::create(&temp_path).await.with_context(|| {
            format!(
                "💀 Could not create the journal temp file '{}'. The disk said no.",
                temp_path.display()
            )
        })?;
        file.write_all(&bytes).await.with_context(|| {
            format!(
                "💀 Writing the journal temp file '{}' failed halfway. The real journal is untouched.",
                temp_path.display()
            )
        })?;
        file.sync_all()
            .await
            .context("💀 fsync on the journal temp file failed. The bytes never made it to the platter.")?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path).await.with_context(|| {
            format!(
                "💀 Could not move the journal into place at '{}'. The previous journal still stands.",
                self.path.display()
            )
        })?;

        sync_parent_dir(&self.path).await?;

        self.appends_since_write = 0;
        trace!(
            "💾 journal persisted: {} bytes, {} pending documents",
            bytes.len(),
            self.contents.len()
        );
        Ok(())
    }
}

// 📁 A bare file name lives in the current directory, which `parent()` spells "".
#[cfg_attr(not(unix), allow(dead_code))]
fn parent_dir_of(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

// 📁 fsync the directory too, or a power cut can quietly undo the rename.
// Unix only: elsewhere a directory can't be opened as a file.
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = parent_dir_of(path);
    let dir = tokio::fs::File::open(parent).await.with_context(|| {
        format!(
            "💀 Could not open the journal directory '{}' to fsync the rename.",
            parent.display()
        )
    })?;
    dir.sync_all().await.with_context(|| {
        format!(
            "💀 fsync on the journal directory '{}' failed. The rename may not survive a power cut.",
            parent.display()
        )
    })
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(payload: &str) -> Document {
        Document::new(Category::Event, payload).expect("💀 test payload should be valid JSON")
    }

    fn consumption(payload: &str) -> Document {
        Document::new(Category::Consumption, payload)
            .expect("💀 test payload should be valid JSON")
    }

    #[test]
    fn the_one_where_a_bare_file_name_lives_right_here() {
        assert_eq!(parent_dir_of(Path::new("journal.json")), Path::new("."));
        assert_eq!(
            parent_dir_of(Path::new("/var/lib/logvex/journal.json")),
            Path::new("/var/lib/logvex")
        );
    }

    #[tokio::test]
    async fn the_one_where_a_nested_journal_survives_the_directory_fsync() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("deep").join("er").join("journal.json");
        let mut journal = RecoveryJournal::open(&path, 1).await?;

        journal.append(&event(r#"{"n":1}"#)).await?;
        journal.set_index_names("events_A", "consumptions_A").await?;

        let on_disk = RecoveryJournal::load(&path).await?;
        assert_eq!(on_disk.documents(Category::Event).len(), 1);
        assert_eq!(on_disk.event_index_name, "events_A");
        assert!(!temp_path_for(&path).exists());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_no_file_means_nothing_to_recover() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let contents = RecoveryJournal::load(&dir.path().join("nope.json")).await?;
        assert!(contents.is_empty());
        assert_eq!(contents.event_index_name, "");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_appends_wait_for_the_cadence() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("journal.json");
        let mut journal = RecoveryJournal::open(&path, 3).await?;

        journal.append(&event(r#"{"n":1}"#)).await?;
        journal.append(&consumption(r#"{"n":2}"#)).await?;
        // 🕰️ two appends, cadence of three: nothing on disk yet
        assert!(!path.exists());

        journal.append(&event(r#"{"n":3}"#)).await?;
        let on_disk = RecoveryJournal::load(&path).await?;
        assert_eq!(on_disk.documents(Category::Event).len(), 2);
        assert_eq!(on_disk.documents(Category::Consumption).len(), 1);
        assert_eq!(
            on_disk.documents(Category::Event)[1].payload(),
            r#"{"n":3}"#
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_clear_only_touches_one_category() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("journal.json");
        let mut journal = RecoveryJournal::open(&path, 1).await?;
        journal.append(&event(r#"{"e":1}"#)).await?;
        journal.append(&consumption(r#"{"c":1}"#)).await?;

        journal.clear(Category::Event).await?;

        let on_disk = RecoveryJournal::load(&path).await?;
        assert!(on_disk.documents(Category::Event).is_empty());
        assert_eq!(on_disk.documents(Category::Consumption).len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_reset_forgets_documents_but_keeps_names() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("journal.json");
        let mut journal = RecoveryJournal::open(&path, 1).await?;
        journal.set_index_names("events_X", "consumptions_X").await?;
        journal.append(&event(r#"{"e":1}"#)).await?;

        journal.reset().await?;

        let on_disk = RecoveryJournal::load(&path).await?;
        assert!(on_disk.is_empty());
        assert_eq!(on_disk.event_index_name, "events_X");
        assert_eq!(on_disk.consumption_index_name, "consumptions_X");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_wire_format_is_exactly_four_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("journal.json");
        let mut journal = RecoveryJournal::open(&path, 1).await?;
        journal.set_index_names("events_A", "consumptions_A").await?;
        journal.append(&event(r#"{"msg":"hi"}"#)).await?;

        let raw: serde_json::Value = serde_json::from_slice(&tokio::fs::read(&path).await?)?;
        assert_eq!(
            raw,
            serde_json::json!({
                "EventDocuments": [{"msg": "hi"}],
                "ConsumptionDocuments": [],
                "EventIndexName": "events_A",
                "ConsumptionIndexName": "consumptions_A"
            })
        );
        // 🧹 temp file never outlives a successful write
        assert!(!temp_path_for(&path).exists());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_null_lists_from_older_writers_are_forgiven() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("journal.json");
        tokio::fs::write(
            &path,
            r#"{"EventDocuments":null,"ConsumptionDocuments":[{"kwh":4}],"EventIndexName":"events_Q","ConsumptionIndexName":"consumptions_Q"}"#,
        )
        .await?;

        let journal = RecoveryJournal::open(&path, 10).await?;
        assert!(journal.contents().documents(Category::Event).is_empty());
        assert_eq!(
            journal.contents().documents(Category::Consumption)[0].payload(),
            r#"{"kwh":4}"#
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_corrupt_journal_is_a_hard_stop() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("journal.json");
        tokio::fs::write(&path, "{\"EventDocuments\": [").await?;
        assert!(RecoveryJournal::open(&path, 10).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_zero_cadence_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(RecoveryJournal::open(dir.path().join("j.json"), 0).await.is_err());
        Ok(())
    }
}
