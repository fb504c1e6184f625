//! Target acquisition
//!
//! Targets come from three places: the static list in the configuration,
//! local target-list files, and an optional remote list fetched over HTTP.
//! The remote list is cached for `websource.interval`; a failed fetch simply
//! contributes nothing to the cycle.

use crate::config::{HttpMethod, WebsourceSettings};
use crate::http;
use chrono::{DateTime, Utc};
use protocol::address::extract_addresses;
use protocol::Target;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote source answered with status {0}")]
    Status(u16),

    #[error("cache file {path:?}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// State carried between cycles for the remote list
#[derive(Debug, Default)]
pub struct SourceCache {
    /// Time of the last successful fetch
    pub last_fetch: Option<DateTime<Utc>>,
    /// Addresses from the last successful fetch
    pub addresses: Vec<String>,
    pub cache_file: Option<PathBuf>,
}

pub struct SourceSynchronizer {
    settings: Option<WebsourceSettings>,
    client: reqwest::Client,
    cache: SourceCache,
}

impl SourceSynchronizer {
    pub fn new(settings: Option<WebsourceSettings>) -> Result<Self, SourceError> {
        Ok(Self::with_client(settings, http::build_client()?))
    }

    pub fn with_client(settings: Option<WebsourceSettings>, client: reqwest::Client) -> Self {
        let cache = SourceCache {
            cache_file: settings.as_ref().and_then(|s| s.cache_file.clone()),
            ..SourceCache::default()
        };
        Self {
            settings,
            client,
            cache,
        }
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Remote addresses for the cycle starting at `now`
    ///
    /// Never fails: any problem is logged and yields an empty list.
    pub async fn remote_targets(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let Some(settings) = self.settings.clone() else {
            return Vec::new();
        };

        if self.is_fresh(now, &settings) {
            if let Some(addresses) = self.read_cache_file() {
                debug!("Using cached target list ({} addresses)", addresses.len());
                return addresses;
            }
            debug!("Using in-memory target list ({} addresses)", self.cache.addresses.len());
            return self.cache.addresses.clone();
        }

        match self.fetch(&settings).await {
            Ok(body) => {
                let addresses = extract_addresses(&body);
                info!("Fetched {} addresses from {}", addresses.len(), settings.url);
                self.cache.last_fetch = Some(now);
                self.cache.addresses = addresses.clone();
                if let Err(e) = self.write_cache_file(&body) {
                    warn!("Failed to store target list cache: {}", e);
                }
                addresses
            }
            Err(e) => {
                warn!("Failed to fetch target list from {}: {}", settings.url, e);
                Vec::new()
            }
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>, settings: &WebsourceSettings) -> bool {
        let Some(last) = self.cache.last_fetch else {
            return false;
        };
        (now - last)
            .to_std()
            .map(|age| age < settings.interval)
            // last fetch lies in the future (clock stepped back)
            .unwrap_or(true)
    }

    async fn fetch(&self, settings: &WebsourceSettings) -> Result<String, SourceError> {
        let request = match settings.method {
            HttpMethod::Get => self.client.get(&settings.url),
            HttpMethod::Post => self.client.post(&settings.url),
        };
        let response = request
            .headers(http::header_map(&settings.headers))
            .send()
            .await?;

        let status = response.status();
        if !http::is_success(status) {
            return Err(SourceError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }

    fn read_cache_file(&self) -> Option<Vec<String>> {
        let path = self.cache.cache_file.as_ref()?;
        if !path.is_file() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(text) => Some(extract_addresses(&text)),
            Err(e) => {
                warn!("Failed to read target list cache {:?}: {}", path, e);
                None
            }
        }
    }

    fn write_cache_file(&self, body: &str) -> Result<(), SourceError> {
        let Some(path) = &self.cache.cache_file else {
            return Ok(());
        };
        std::fs::write(path, body).map_err(|source| SourceError::Cache {
            path: path.clone(),
            source,
        })
    }
}

/// Addresses from local target-list files, in file order
///
/// Unreadable files are skipped with a warning.
pub fn load_file_targets<P: AsRef<Path>>(files: &[P]) -> Vec<String> {
    let mut addresses = Vec::new();
    for file in files {
        let path = file.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => addresses.extend(extract_addresses(&text)),
            Err(e) => warn!("Failed to read target file {:?}: {}", path, e),
        }
    }
    addresses
}

/// Union of all sources: static first, then files, then remote
///
/// Duplicates are dropped by exact normalized address, first occurrence wins.
pub fn merge_targets(static_targets: &[Target], file_targets: &[String], remote_targets: &[String]) -> Vec<Target> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    let parsed = file_targets
        .iter()
        .chain(remote_targets)
        .filter_map(|addr| match Target::parse(addr) {
            Ok(t) => Some(t),
            Err(e) => {
                debug!("Dropping target {}: {}", addr, e);
                None
            }
        });

    for target in static_targets.iter().cloned().chain(parsed) {
        if seen.insert(target.address().to_string()) {
            merged.push(target);
        }
    }

    merged
}
