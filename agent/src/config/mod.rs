//! Configuration management
//!
//! [`Config`] is the raw, deserializable form (TOML file, then command-line
//! and environment overrides). [`Config::finalize`] turns it into the
//! immutable [`Settings`] every component receives; out-of-range values are
//! clamped or reset to defaults instead of rejected.

use anyhow::{Context, Result};
use protocol::{ProbeSettings, Target, AGENT_NAME};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_PIDFILE: &str = "/run/pinger-agent.pid";

/// Files consulted, in order, when no agent name is configured
const NAME_SOURCES: [&str; 3] = ["/etc/HOSTNAME", "/proc/sys/kernel/hostname", "/etc/machine-id"];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub probe: ProbeConfig,
    pub targets: TargetsConfig,
    pub websource: WebsourceConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub name: String,
    pub daemon: bool,
    pub quiet: bool,
    pub pidfile: String,
    pub output: String,
    pub format: String,
    /// Seconds between cycles in daemon mode
    pub pause: i64,
    /// Measurement binary
    pub fping: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub interval: i64,
    pub size: i64,
    pub count: i64,
    pub ttl: i64,
    pub retries: i64,
    /// yes/no/on/off/y/n/1/0
    pub fragment: String,
    pub timeout: i64,
    pub source_address: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub addresses: Vec<String>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebsourceConfig {
    pub url: String,
    pub method: String,
    /// `Name: Value` pairs separated by `|`
    pub headers: String,
    pub interval: i64,
    pub cachefile: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: String,
    pub headers: String,
    pub cachefile: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            daemon: false,
            quiet: false,
            pidfile: DEFAULT_PIDFILE.to_string(),
            output: String::new(),
            format: "json".to_string(),
            pause: 30,
            fping: "fping".to_string(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: 10,
            size: 1000,
            count: 10,
            ttl: 64,
            retries: 0,
            fragment: "yes".to_string(),
            timeout: 900,
            source_address: String::new(),
        }
    }
}

impl Default for WebsourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".to_string(),
            headers: String::new(),
            interval: 60,
            cachefile: String::new(),
        }
    }
}

/// Local output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Case-insensitive GET/POST, anything else falls back to GET
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "post" => HttpMethod::Post,
            _ => HttpMethod::Get,
        }
    }
}

/// HTTP header as a name/value pair
pub type Header = (String, String);

#[derive(Debug, Clone)]
pub struct WebsourceSettings {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<Header>,
    pub interval: Duration,
    pub cache_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub url: String,
    pub headers: Vec<Header>,
    pub cache_file: Option<PathBuf>,
}

/// Validated, immutable agent configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub name: String,
    pub daemon: bool,
    pub quiet: bool,
    pub pidfile: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub pause: Duration,
    pub fping: String,
    pub probe: ProbeSettings,
    pub targets: Vec<Target>,
    pub target_files: Vec<PathBuf>,
    pub websource: Option<WebsourceSettings>,
    pub webhook: Option<WebhookSettings>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Sort a free-standing argument into an address or a target-list file
    pub fn add_positional(&mut self, arg: &str) {
        let candidate = arg.trim();
        if candidate.is_empty() {
            return;
        }
        if Target::parse(candidate).is_ok() {
            self.targets.addresses.push(candidate.to_string());
        } else if absolute_path(candidate).is_some_and(|p| p.is_file()) {
            self.targets.files.push(candidate.to_string());
        } else {
            debug!("Ignoring unknown argument: {}", candidate);
        }
    }

    pub fn finalize(self) -> Settings {
        let general = self.general;
        let probe = self.probe;

        let name = if general.name.trim().is_empty() {
            resolve_agent_name(&NAME_SOURCES)
        } else {
            general.name.trim().to_string()
        };

        let pidfile = absolute_path(&general.pidfile)
            .or_else(|| general.daemon.then(|| PathBuf::from(DEFAULT_PIDFILE)));

        let format = match general.format.trim().to_lowercase().as_str() {
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Json,
        };

        let pause = reset_outside(general.pause, 0, 3600, 30) as u64;

        let source_address = match probe.source_address.trim() {
            "" => None,
            addr => match Target::parse(addr) {
                Ok(t) => Some(t.address().to_string()),
                Err(e) => {
                    warn!("Ignoring invalid source address {}: {}", addr, e);
                    None
                }
            },
        };

        let probe_settings = ProbeSettings {
            name: name.clone(),
            interval: reset_outside(probe.interval, 1, 10_000, 10) as u32,
            pause,
            size: probe.size.clamp(8, 65_488) as u32,
            count: probe.count.clamp(1, 100) as u32,
            ttl: (if probe.ttl < 1 { 64 } else { probe.ttl.min(255) }) as u8,
            retries: probe.retries.clamp(0, 10) as u8,
            fragment: import_flag(&probe.fragment).unwrap_or(true),
            timeout: probe.timeout.clamp(10, 10_000) as u32,
            source_address,
            ..ProbeSettings::default()
        };

        let mut targets = Vec::new();
        for addr in &self.targets.addresses {
            match Target::parse(addr) {
                Ok(t) => targets.push(t),
                Err(e) => debug!("Dropping static target {}: {}", addr, e),
            }
        }

        let target_files = self
            .targets
            .files
            .iter()
            .filter_map(|f| absolute_path(f))
            .collect();

        let websource = is_url(&self.websource.url).then(|| WebsourceSettings {
            url: self.websource.url.trim().to_string(),
            method: HttpMethod::parse(&self.websource.method),
            headers: parse_headers(&self.websource.headers),
            interval: Duration::from_secs(self.websource.interval.clamp(60, 3600) as u64),
            cache_file: absolute_path(&self.websource.cachefile),
        });

        let webhook = is_url(&self.webhook.url).then(|| WebhookSettings {
            url: self.webhook.url.trim().to_string(),
            headers: parse_headers(&self.webhook.headers),
            cache_file: absolute_path(&self.webhook.cachefile),
        });

        Settings {
            name,
            daemon: general.daemon,
            quiet: general.quiet,
            pidfile,
            output: absolute_path(&general.output),
            format,
            pause: Duration::from_secs(pause),
            fping: general.fping,
            probe: probe_settings,
            targets,
            target_files,
            websource,
            webhook,
        }
    }
}

fn reset_outside(value: i64, min: i64, max: i64, default: i64) -> i64 {
    if (min..=max).contains(&value) { value } else { default }
}

/// Boolean words used by environment variables and flags
pub fn import_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "y" | "yes" | "on" | "true" | "1" => Some(true),
        "n" | "no" | "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Parse `Name: Value|Other: Value` into header pairs, dropping malformed entries
pub fn parse_headers(value: &str) -> Vec<Header> {
    value
        .trim()
        .split('|')
        .filter_map(|entry| entry.split_once(": "))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

pub fn is_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

/// Only absolute paths are accepted for files the agent reads or writes
pub fn absolute_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    value.starts_with('/').then(|| PathBuf::from(value))
}

/// First non-empty line among `sources`, else the program name
pub fn resolve_agent_name<P: AsRef<Path>>(sources: &[P]) -> String {
    sources
        .iter()
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| AGENT_NAME.to_string())
}
