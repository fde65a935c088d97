//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{ElasticsearchIndexConfig, FileSourceConfig};
use crate::buffer::BufferConfig;

/// 📦 The AppConfig: one struct to rule them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Where deliveries come from.
    pub source_config: SourceConfig,
    /// 🗄️ Where buffered documents end up.
    pub indexing_config: IndexingConfig,
    #[serde(default, alias = "buffer_config")]
    pub buffer: BufferConfig,
}

/// 📡 Source flavors. Pick one; serde will hold you to it.
#[derive(Debug, Deserialize, Clone)]
pub enum SourceConfig {
    /// 📂 NDJSON file, one delivery per line.
    File(FileSourceConfig),
    /// 🫙 Nothing at all. The stream ends at once: replay, rotate, flush, exit.
    InMemory,
}

/// 🗄️ Indexing client flavors.
#[derive(Debug, Deserialize, Clone)]
pub enum IndexingConfig {
    Elasticsearch(ElasticsearchIndexConfig),
    /// 🧪 Records calls in RAM and forgets them on exit. Dry runs.
    InMemory,
}

/// 🚀 Load the config: env vars (`LOGVEX_*`, nested with `__`) merged with an
/// optional TOML file. TOML wins on conflicts.
///
/// - `config_file_name` is None → env vars only.
/// - `config_file_name` is Some → env vars + TOML file.
///
/// 💀 Returns an error if config is unparseable. The message says which layer to blame.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    // 🏗️ env vars as the base layer, like a good sourdough starter
    let config = Figment::new().merge(Env::prefixed("LOGVEX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (LOGVEX_*). \
             The file exists in our hearts, but apparently not on disk, or not as valid TOML.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (LOGVEX_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .buffer
        .validate()
        .context("💀 The [buffer] section parsed, but its values don't make sense")?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // 🧪 Figment wants TOML from disk, like it's method acting.
    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_everything_is_spelled_out() {
        let file = write_test_config(
            r#"
            [source_config.File]
            file_name = "deliveries.ndjson"

            [indexing_config.Elasticsearch]
            url = "http://localhost:9200"
            api_key = "c2VjcmV0"

            [buffer]
            batch_size = 250
            flush_interval_secs = 2
            rotation_spec = "0 6 * * 1"
            journal_path = "/var/lib/logvex/journal.json"
            journal_write_every = 1
            event_index_base = "ev"
            "#,
        );

        let app_config = load_config(Some(file.path()))
            .expect("💀 A fully spelled-out config should parse.");

        assert_eq!(app_config.buffer.batch_size, 250);
        assert_eq!(app_config.buffer.flush_interval_secs, 2);
        assert_eq!(app_config.buffer.rotation_spec, "0 6 * * 1");
        assert_eq!(app_config.buffer.event_index_base, "ev");
        // 🎯 the one we didn't mention keeps its default
        assert_eq!(app_config.buffer.consumption_index_base, "consumptions");
        match app_config.indexing_config {
            IndexingConfig::Elasticsearch(es) => {
                assert_eq!(es.url, "http://localhost:9200");
                assert_eq!(es.api_key.as_deref(), Some("c2VjcmV0"));
            }
            honestly_who_knows => panic!(
                "💀 Expected Elasticsearch, but serde took us to {:?}. Plot twist energy.",
                honestly_who_knows
            ),
        }
        assert!(matches!(app_config.source_config, SourceConfig::File(_)));
    }

    #[test]
    fn the_one_where_buffer_defaults_show_up_uninvited_but_helpful() {
        let file = write_test_config(
            r#"
            source_config = "InMemory"
            indexing_config = "InMemory"
            "#,
        );

        let app_config =
            load_config(Some(file.path())).expect("💀 Unit variants and no [buffer] should parse.");

        assert_eq!(app_config.buffer.batch_size, 1000);
        assert_eq!(app_config.buffer.flush_interval_secs, 5);
        assert_eq!(app_config.buffer.rotation_spec, "daily");
        assert_eq!(app_config.buffer.journal_write_every, 10);
        assert_eq!(app_config.buffer.event_index_base, "events");
    }

    #[test]
    fn the_one_where_the_buffer_answers_to_its_old_name() {
        let file = write_test_config(
            r#"
            source_config = "InMemory"
            indexing_config = "InMemory"

            [buffer_config]
            batch_size = 7
            "#,
        );

        let app_config = load_config(Some(file.path()))
            .expect("💀 The buffer_config alias should parse.");
        assert_eq!(app_config.buffer.batch_size, 7);
    }

    #[test]
    fn the_one_where_a_zero_batch_is_sent_home() {
        let file = write_test_config(
            r#"
            source_config = "InMemory"
            indexing_config = "InMemory"

            [buffer]
            batch_size = 0
            "#,
        );

        assert!(load_config(Some(file.path())).is_err());
    }
}
