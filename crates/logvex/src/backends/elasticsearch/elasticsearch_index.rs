use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::backends::IndexingClient;
use crate::common::Document;

// 📡 ElasticsearchIndexConfig: "It's just Elasticsearch", they said, before the cluster went red.
// 🔧 auth is tri-modal: username+password, api_key, or "I hope anonymous works".
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchIndexConfig {
    /// 📡 Cluster URL, scheme and port included.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key. Wins over basic auth when both are set. This is not a democracy.
    #[serde(default)]
    pub api_key: Option<String>,
    /// 🏗️ Body for `PUT /{index}` when an index is (re)created: settings, mappings,
    /// the works. `None` lets the cluster's templates decide.
    #[serde(default)]
    pub index_settings: Option<serde_json::Value>,
}

/// 📦 The slice of a `_bulk` response we actually care about.
/// `errors: true` means at least one item failed even though the HTTP status was 200.
/// Elasticsearch: where a 200 can still be bad news.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
}

/// 📡 The Elasticsearch indexing client. Pure I/O, zero buffering.
///
/// Internally holds:
/// - `client`: the HTTP muscle 💪, reused across requests
/// - `config`: URL, auth, index settings
#[derive(Debug)]
pub struct ElasticsearchIndex {
    client: reqwest::Client,
    config: ElasticsearchIndexConfig,
}

impl ElasticsearchIndex {
    /// 🚀 Build the client and ping the cluster root so a wrong URL fails at
    /// startup, not a thousand documents in.
    ///
    /// 10s connect timeout, 30s request timeout. We will wait, but not forever.
    pub async fn new(config: ElasticsearchIndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a TLS stack having a bad day. Either way: tragic.")?;

        let index = Self { client, config };

        // -- 📡 "Hello? Is this thing on?"
        let response = index
            .authorize(index.client.get(&index.config.url))
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 Could not reach Elasticsearch at '{}'. We knocked. Nobody came to the door.",
                    index.config.url
                )
            })?;
        if !response.status().is_success() {
            anyhow::bail!(
                "💀 Elasticsearch at '{}' answered the ping with '{}'. Check the URL and the credentials.",
                index.config.url,
                response.status()
            );
        }
        debug!("✅ Elasticsearch at '{}' is home and answering", index.config.url);

        Ok(index)
    }

    // 🔒 Auth priority: API key, then basic auth, then nothing and a prayer.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    /// 📦 Render the NDJSON `_bulk` body: one action line, one source line, per document.
    /// Source lines are the raw payloads, untouched. We trust them; `Document` checked them.
    fn render_bulk(documents: &[Document], index_name: &str) -> String {
        let action = serde_json::json!({ "index": { "_index": index_name } }).to_string();
        let estimated_size: usize = documents
            .iter()
            .map(|document| document.payload().len() + action.len() + 2)
            .sum();
        let mut body = String::with_capacity(estimated_size);
        for document in documents {
            body.push_str(&action);
            body.push('\n');
            body.push_str(document.payload());
            body.push('\n');
        }
        body
    }
}

#[async_trait]
impl IndexingClient for ElasticsearchIndex {
    /// 📡 POST the batch to `/_bulk`. Non-2xx or `"errors": true` both count as failure.
    /// 🔄 No retries here. Retries are a policy decision and this is a pipe.
    async fn upload(&self, documents: &[Document], index_name: &str) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let body = Self::render_bulk(documents, index_name);
        debug!(
            "📡 shipping {} documents ({} bytes) to '{}' via /_bulk",
            documents.len(),
            body.len(),
            index_name
        );

        let response = self
            .authorize(self.client.post(self.endpoint("_bulk")))
            // ⚠️ application/x-ndjson, not application/json. Elasticsearch cares. Deeply.
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 The bulk request for '{}' never made it to Elasticsearch. The network was not vibing with it.",
                    index_name
                )
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!(
                "💀 Elasticsearch looked at our bulk request for '{}' and said '{}'. The body read: '{}'.",
                index_name,
                status,
                text
            );
        }

        match serde_json::from_str::<BulkResponse>(&text) {
            Ok(parsed) if parsed.errors => anyhow::bail!(
                "💀 The bulk request for '{}' came back 200 with \"errors\": true. Some documents were rejected. The body read: '{}'.",
                index_name,
                text
            ),
            Ok(_) => {}
            Err(err) => trace!(
                "🤷 bulk response for '{}' wasn't parseable ({}), trusting the 2xx",
                index_name,
                err
            ),
        }

        trace!("🚀 bulk request for '{}' landed", index_name);
        Ok(())
    }

    /// 🧨 DELETE (404 is fine, it was never there) then PUT, fresh and empty.
    async fn ensure_empty_index(&self, index_name: &str) -> Result<()> {
        let response = self
            .authorize(self.client.delete(self.endpoint(index_name)))
            .send()
            .await
            .with_context(|| {
                format!("💀 Could not send the DELETE for index '{}'.", index_name)
            })?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 Elasticsearch would not delete index '{}': '{}'. Body: '{}'.",
                index_name,
                status,
                text
            );
        }

        let mut create = self.authorize(self.client.put(self.endpoint(index_name)));
        if let Some(ref settings) = self.config.index_settings {
            create = create
                .header("Content-Type", "application/json")
                .body(settings.to_string());
        }
        let response = create.send().await.with_context(|| {
            format!("💀 Could not send the PUT to create index '{}'.", index_name)
        })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 Elasticsearch would not create index '{}': '{}'. Body: '{}'.",
                index_name,
                status,
                text
            );
        }

        debug!("🏗️ index '{}' is fresh, empty and ready", index_name);
        Ok(())
    }
}
