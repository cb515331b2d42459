//! 🪣 Billing manifests, straight from the bucket AWS delivers them to.
//!
//! A Cost and Usage Report lands in S3 like this:
//!
//! ```text
//! <prefix>/<report>/20180101-20180201/<report>-Manifest.json   ← the one we want
//! <prefix>/<report>/20180101-20180201/<assembly-id>/<report>-1.csv.gz
//! <prefix>/<report>/20180101-20180201/<assembly-id>/<report>-Manifest.json   ← a snapshot, skip
//! ```
//!
//! So: list everything under the prefix, keep `*-Manifest.json` keys whose parent
//! directory is a billing period range, fetch each, parse each.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aws::Manifest;
use crate::backends::ManifestRetriever;

const MANIFEST_SUFFIX: &str = "-Manifest.json";

/// 🌎 AWS settings. Credentials come from the usual chain (env, profile, IAM role), not from here.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AwsConfig {
    /// 🌎 Defaults to "us-east-1". If you don't choose a region, the region chooses you.
    #[serde(default = "default_aws_region")]
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_aws_region(),
        }
    }
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

/// 🪣 Lists and fetches manifests with the AWS SDK.
#[derive(Clone)]
pub struct S3ManifestRetriever {
    client: aws_sdk_s3::Client,
    region: String,
}

impl std::fmt::Debug for S3ManifestRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ManifestRetriever")
            .field("region", &self.region)
            .finish()
    }
}

impl S3ManifestRetriever {
    /// 🚀 Loads AWS config from the environment and builds an S3 client for `config.region`.
    pub async fn new(config: &AwsConfig) -> Self {
        let the_aws_config = aws_config::from_env()
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .load()
            .await;
        Self {
            client: aws_sdk_s3::Client::new(&the_aws_config),
            region: config.region.clone(),
        }
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut the_keys = Vec::new();
        let mut the_token: Option<String> = None;
        loop {
            let mut the_request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(token) = the_token.take() {
                the_request = the_request.continuation_token(token);
            }
            let the_page = the_request
                .send()
                .await
                .with_context(|| format!("💀 failed to list s3://{}/{}", bucket, prefix))?;

            the_keys.extend(
                the_page
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match (the_page.is_truncated(), the_page.next_continuation_token()) {
                (Some(true), Some(token)) => the_token = Some(token.to_string()),
                _ => break,
            }
        }
        Ok(the_keys)
    }

    async fn fetch_manifest(&self, bucket: &str, key: &str) -> Result<Manifest> {
        let the_object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("💀 failed to get s3://{}/{}", bucket, key))?;
        let the_bytes = the_object
            .body
            .collect()
            .await
            .with_context(|| format!("💀 failed to read the body of s3://{}/{}", bucket, key))?
            .into_bytes();
        serde_json::from_slice(&the_bytes)
            .with_context(|| format!("💀 s3://{}/{} is not a manifest we can read", bucket, key))
    }
}

#[async_trait]
impl ManifestRetriever for S3ManifestRetriever {
    async fn retrieve_manifests(&self, bucket: &str, prefix: &str) -> Result<Vec<Manifest>> {
        let the_prefix = list_prefix(prefix);
        let the_keys = self.list_keys(bucket, &the_prefix).await?;

        let mut the_manifests = Vec::new();
        for the_key in the_keys.iter().filter(|key| is_manifest_key(key)) {
            debug!(bucket = %bucket, key = %the_key, "🧾 fetching billing manifest");
            the_manifests.push(self.fetch_manifest(bucket, the_key).await?);
        }

        info!(
            bucket = %bucket,
            prefix = %the_prefix,
            manifests = the_manifests.len(),
            "🪣 retrieved billing manifests"
        );
        Ok(the_manifests)
    }
}

/// 📁 `reports` → `reports/`, and an empty prefix stays empty (the whole bucket).
fn list_prefix(prefix: &str) -> String {
    let the_trimmed = prefix.trim_matches('/');
    if the_trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", the_trimmed)
    }
}

/// 🔍 A top-level manifest: `.../<YYYYMMDD-YYYYMMDD>/<anything>-Manifest.json`.
pub fn is_manifest_key(key: &str) -> bool {
    if !key.ends_with(MANIFEST_SUFFIX) {
        return false;
    }
    let mut the_parts = key.rsplit('/');
    let _the_file = the_parts.next();
    the_parts.next().is_some_and(is_billing_period_dir)
}

fn is_billing_period_dir(dir: &str) -> bool {
    match dir.split_once('-') {
        Some((start, end)) => is_yyyymmdd(start) && is_yyyymmdd(end),
        None => false,
    }
}

fn is_yyyymmdd(part: &str) -> bool {
    part.len() == 8 && part.bytes().all(|b| b.is_ascii_digit())
}
