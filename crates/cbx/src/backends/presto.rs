//! 🐝 Presto over HTTP: the statement protocol, minus everything we don't need.
//!
//! ```text
//! POST /v1/statement          body = SQL, X-Presto-* headers
//!   → { id, nextUri?, error? }
//! GET  nextUri                until there is no nextUri
//!   → { id, nextUri?, error? }
//! ```
//!
//! DDL returns no rows worth reading, so we only look at `nextUri` and `error`.
//! An `error` anywhere along the chain fails the query.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::backends::Queryer;

/// 📡 Where Presto lives and who we say we are when we knock.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrestoConfig {
    #[serde(default = "default_presto_url")]
    pub url: String,
    #[serde(default = "default_presto_user")]
    pub user: String,
    #[serde(default = "default_presto_catalog")]
    pub catalog: String,
    #[serde(default = "default_presto_schema")]
    pub schema: String,
    /// ⏱️ Per-request timeout. Presto long-polls, so this bounds each hop, not the whole query.
    #[serde(default = "default_presto_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PrestoConfig {
    fn default() -> Self {
        Self {
            url: default_presto_url(),
            user: default_presto_user(),
            catalog: default_presto_catalog(),
            schema: default_presto_schema(),
            timeout_secs: default_presto_timeout_secs(),
        }
    }
}

fn default_presto_url() -> String {
    "http://presto:8080".to_string()
}

fn default_presto_user() -> String {
    "cbx".to_string()
}

fn default_presto_catalog() -> String {
    "hive".to_string()
}

fn default_presto_schema() -> String {
    "default".to_string()
}

fn default_presto_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    next_uri: Option<String>,
    #[serde(default)]
    error: Option<StatementError>,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    #[serde(default)]
    message: String,
}

/// 🐝 Talks to Presto's statement endpoint with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct PrestoQueryer {
    client: reqwest::Client,
    config: PrestoConfig,
}

impl PrestoQueryer {
    pub fn new(config: PrestoConfig) -> Result<Self> {
        let the_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Presto will have to wait.")?;
        Ok(Self {
            client: the_client,
            config,
        })
    }

    fn statement_url(&self) -> String {
        format!("{}/v1/statement", self.config.url.trim_end_matches('/'))
    }

    async fn read_response(response: reqwest::Response, what: &str) -> Result<StatementResponse> {
        let the_status = response.status();
        let the_body = response
            .text()
            .await
            .with_context(|| format!("💀 could not read the response to {}", what))?;
        if !the_status.is_success() {
            bail!("💀 Presto answered {} with HTTP {}: {}", what, the_status, the_body);
        }
        let the_response: StatementResponse = serde_json::from_str(&the_body)
            .with_context(|| format!("💀 Presto's answer to {} was not statement JSON", what))?;
        if let Some(the_error) = &the_response.error {
            bail!("💀 Presto rejected the query: {}", the_error.message);
        }
        Ok(the_response)
    }
}

#[async_trait]
impl Queryer for PrestoQueryer {
    async fn query(&self, statement: &str) -> Result<()> {
        let the_response = self
            .client
            .post(self.statement_url())
            .header("X-Presto-User", &self.config.user)
            .header("X-Presto-Catalog", &self.config.catalog)
            .header("X-Presto-Schema", &self.config.schema)
            .body(statement.to_string())
            .send()
            .await
            .context("💀 could not reach Presto to submit the statement")?;

        let mut the_state = Self::read_response(the_response, "the statement").await?;
        debug!(query_id = ?the_state.id, "🐝 statement accepted");

        while let Some(the_next_uri) = the_state.next_uri.take() {
            trace!(next_uri = %the_next_uri, "🐝 polling statement");
            let the_response = self
                .client
                .get(&the_next_uri)
                .header("X-Presto-User", &self.config.user)
                .send()
                .await
                .with_context(|| format!("💀 could not poll Presto at {}", the_next_uri))?;
            the_state = Self::read_response(the_response, "a status poll").await?;
        }

        debug!(query_id = ?the_state.id, "✅ statement finished");
        Ok(())
    }
}
