use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    fs::File,
    io::{self, AsyncBufReadExt},
};
use tracing::trace;

use crate::backends::Source;
use crate::common::Delivery;

// -- 📂 FileSourceConfig: "It's just a file", said no sysadmin ever before the disk filled up.
// -- Lives here, close to the FileSource that actually uses it.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSourceConfig {
    pub file_name: String,
}

/// 📂 FileSource: reads a file line by line and hands each non-blank line out
/// as a delivery. The tag is the 1-based line number, so a warning about a
/// malformed delivery points you straight at the offending line.
///
/// ⚠️ Acks are bookkeeping only. A file has no broker to tell.
#[derive(Debug)]
pub struct FileSource {
    buf_reader: io::BufReader<File>,
    source_config: FileSourceConfig,
    line_number: u64,
    acked: u64,
}

impl FileSource {
    /// 🚀 Open the file. If it isn't there, anyhow will tell you with theatrical flair.
    pub async fn new(source_config: FileSourceConfig) -> Result<Self> {
        let file_handle = File::open(&source_config.file_name).await.with_context(|| {
            format!(
                "💀 The door to '{}' would not budge. We checked if it existed (it might not). \
                 We checked permissions (they might be wrong). The file remains unopened.",
                source_config.file_name
            )
        })?;
        Ok(Self {
            buf_reader: io::BufReader::new(file_handle),
            source_config,
            line_number: 0,
            acked: 0,
        })
    }

    /// 📊 How many deliveries have been acked so far.
    pub fn acked(&self) -> u64 {
        self.acked
    }
}

#[async_trait]
impl Source for FileSource {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let bytes_read = self
                .buf_reader
                .read_until(b'\n', &mut line)
                .await
                .with_context(|| {
                    format!(
                        "💀 Reading line {} of '{}' failed. The file was fine a second ago.",
                        self.line_number + 1,
                        self.source_config.file_name
                    )
                })?;
            if bytes_read == 0 {
                trace!("🏁 '{}' is out of lines", self.source_config.file_name);
                return Ok(None);
            }
            self.line_number += 1;

            let body = line.trim_ascii();
            if body.is_empty() {
                continue;
            }
            return Ok(Some(Delivery {
                tag: self.line_number,
                body: body.to_vec(),
            }));
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<()> {
        trace!("✅ acked line {} of '{}'", tag, self.source_config.file_name);
        self.acked += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn the_one_where_blank_lines_are_skipped_but_still_counted() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "DONE\n\n  \n{{\"category\":\"Event\",\"document\":{{}}}}\r\n")?;

        let mut source = FileSource::new(FileSourceConfig {
            file_name: file.path().display().to_string(),
        })
        .await?;

        let first = source.next_delivery().await?.expect("💀 first line should be there");
        assert_eq!(first.tag, 1);
        assert_eq!(first.body, b"DONE");

        let second = source.next_delivery().await?.expect("💀 fourth line should be there");
        assert_eq!(second.tag, 4);
        assert_eq!(second.body, br#"{"category":"Event","document":{}}"#);

        assert!(source.next_delivery().await?.is_none());
        source.ack(first.tag).await?;
        source.ack(second.tag).await?;
        assert_eq!(source.acked(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_file_is_a_figment_of_our_imagination() {
        let result = FileSource::new(FileSourceConfig {
            file_name: "/definitely/not/here.ndjson".to_string(),
        })
        .await;
        assert!(result.is_err());
    }
}
