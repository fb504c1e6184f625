//! Report delivery to a remote collector
//!
//! One POST per cycle, no retries. A successful delivery is remembered and,
//! when a cache file is configured, written there as JSON; failures leave
//! both untouched.

use crate::config::WebhookSettings;
use crate::http;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("collector answered with status {status}")]
    Status { status: u16, body: String },
}

/// Outcome of the last successful delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub request_headers: Vec<(String, String)>,
    pub payload: String,
    pub status: u16,
    pub response_headers: String,
    pub response_body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// No collector configured
    Skipped,
    Delivered { status: u16 },
}

pub struct WebhookDispatcher {
    settings: Option<WebhookSettings>,
    client: reqwest::Client,
    last_delivery: Option<DeliveryRecord>,
}

impl WebhookDispatcher {
    pub fn new(settings: Option<WebhookSettings>) -> Result<Self, DeliveryError> {
        Ok(Self::with_client(settings, http::build_client()?))
    }

    pub fn with_client(settings: Option<WebhookSettings>, client: reqwest::Client) -> Self {
        Self {
            settings,
            client,
            last_delivery: None,
        }
    }

    pub fn last_delivery(&self) -> Option<&DeliveryRecord> {
        self.last_delivery.as_ref()
    }

    pub async fn dispatch(&mut self, payload: &str) -> Result<Delivery, DeliveryError> {
        let Some(settings) = &self.settings else {
            return Ok(Delivery::Skipped);
        };

        let mut headers = http::header_map(&settings.headers);
        if !payload.is_empty() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            headers.insert(CONTENT_LENGTH, HeaderValue::from(payload.len()));
        }
        let request_headers = headers
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();

        debug!("Posting {} bytes to {}", payload.len(), settings.url);
        let response = self
            .client
            .post(&settings.url)
            .headers(headers)
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        let response_headers = http::format_headers(response.headers());
        let body = response.text().await.unwrap_or_default();

        if !http::is_success(status) {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let record = DeliveryRecord {
            timestamp: Utc::now(),
            url: settings.url.clone(),
            request_headers,
            payload: payload.to_string(),
            status: status.as_u16(),
            response_headers,
            response_body: body,
        };
        if let Some(path) = &settings.cache_file {
            store_record(path, &record);
        }
        info!("Report delivered to {} (status {})", settings.url, record.status);

        let status = record.status;
        self.last_delivery = Some(record);
        Ok(Delivery::Delivered { status })
    }
}

fn store_record(path: &Path, record: &DeliveryRecord) {
    let result = serde_json::to_string_pretty(record)
        .map_err(std::io::Error::from)
        .and_then(|json| std::fs::write(path, json));
    if let Err(e) = result {
        warn!("Failed to write delivery cache {:?}: {}", path, e);
    }
}
