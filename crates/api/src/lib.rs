//! Typed client for the proxy manager's REST surface.
//!
//! Wraps the endpoints the operator console drives: listing proxy files,
//! managing destination folders, moving and deleting footage, kicking off
//! reprocessing, and reading or updating the server's JSON configuration.
//! Field names mirror the server's JSON tags exactly.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client as Http;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Destination backends the server accepts.
const DESTINATION_TYPES: [&str; 2] = ["local", "nfs"];

/// A proxy file and its original counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyFile {
    pub original: String,
    pub proxy: String,
}

/// Server configuration document, field-for-field from the server's
/// `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub sd_card_mappings: HashMap<String, SdCard>,
    pub ignored_extensions: Vec<String>,
    pub timezone: String,
    pub destination_config: DestinationConfig,
}

/// One SD card the server watches for fresh footage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdCard {
    pub name: String,
    pub source_dirs: Vec<String>,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// "local" or "nfs".
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveRequest<'a> {
    files: &'a [String],
    destination: &'a str,
    new_folder: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    original: &'a str,
    proxy: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDestinationRequest<'a> {
    folder_name: &'a str,
}

/// HTTP client for the proxy manager server.
#[derive(Debug, Clone)]
pub struct ProxyApi {
    http: Http,
    base_url: String,
}

impl ProxyApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http: Http::builder().build()?,
            base_url,
        })
    }

    /// Files awaiting a move, with whatever proxies exist for them.
    pub async fn list_proxies(&self) -> Result<Vec<ProxyFile>> {
        let resp = self
            .http
            .get(self.endpoint("/api/proxies"))
            .send()
            .await
            .context("proxies request failed")?;
        check(resp).await?.json().await.context("invalid proxies payload")
    }

    pub async fn list_destinations(&self) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(self.endpoint("/api/destinations"))
            .send()
            .await
            .context("destinations request failed")?;
        check(resp)
            .await?
            .json()
            .await
            .context("invalid destinations payload")
    }

    pub async fn create_destination(&self, folder_name: &str) -> Result<()> {
        debug!("creating destination folder {}", folder_name);
        let resp = self
            .http
            .post(self.endpoint("/api/destinations"))
            .json(&CreateDestinationRequest { folder_name })
            .send()
            .await
            .context("create destination request failed")?;
        check(resp).await.map(|_| ())
    }

    /// Move files into a destination folder, optionally creating
    /// `new_folder` beneath it (pass an empty string to skip).
    pub async fn move_files(
        &self,
        files: &[String],
        destination: &str,
        new_folder: &str,
    ) -> Result<()> {
        debug!("moving {} file(s) to {}", files.len(), destination);
        let resp = self
            .http
            .post(self.endpoint("/api/move"))
            .json(&MoveRequest {
                files,
                destination,
                new_folder,
            })
            .send()
            .await
            .context("move request failed")?;
        check(resp).await.map(|_| ())
    }

    /// Delete a video and its proxy (pass an empty proxy when none exists).
    pub async fn delete_video(&self, original: &str, proxy: &str) -> Result<()> {
        debug!("deleting {}", original);
        let resp = self
            .http
            .delete(self.endpoint("/api/delete"))
            .json(&DeleteRequest { original, proxy })
            .send()
            .await
            .context("delete request failed")?;
        check(resp).await.map(|_| ())
    }

    /// Ask the server to re-render proxies for all high-resolution files.
    pub async fn reprocess(&self) -> Result<()> {
        let resp = self
            .http
            .post(self.endpoint("/api/reprocess"))
            .send()
            .await
            .context("reprocess request failed")?;
        check(resp).await.map(|_| ())
    }

    pub async fn fetch_config(&self) -> Result<Config> {
        let resp = self
            .http
            .get(self.endpoint("/api/config"))
            .send()
            .await
            .context("config request failed")?;
        check(resp).await?.json().await.context("invalid config payload")
    }

    /// Replace the server configuration wholesale. The server rejects
    /// unknown destination types, so that is checked before sending.
    pub async fn update_config(&self, config: &Config) -> Result<()> {
        if !DESTINATION_TYPES.contains(&config.destination_config.kind.as_str()) {
            bail!(
                "destination type {:?} is not one of {:?}",
                config.destination_config.kind,
                DESTINATION_TYPES
            );
        }
        let resp = self
            .http
            .post(self.endpoint("/api/config/update"))
            .json(config)
            .send()
            .await
            .context("config update request failed")?;
        check(resp).await.map(|_| ())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(anyhow!(
        "server {}: {}",
        status,
        resp.text().await.unwrap_or_default()
    ))
}
