//! Shared HTTP client settings for the target source and the webhook

use crate::config::Header;
use protocol::{AGENT_NAME, HTTP_SUCCESS};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tracing::warn;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

/// Builder with the agent's user agent, timeouts and redirect policy applied
pub fn client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(AGENT_NAME)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(10))
}

pub fn build_client() -> reqwest::Result<reqwest::Client> {
    client_builder().build()
}

/// Convert configured headers, skipping any that are not valid HTTP
pub fn header_map(headers: &[Header]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => warn!("Skipping invalid HTTP header {:?}", name),
        }
    }
    map
}

pub fn is_success(status: reqwest::StatusCode) -> bool {
    HTTP_SUCCESS.contains(&status.as_u16())
}

/// Render response headers as `Name: value` lines
pub fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join("\n")
}
