//! Report data model
//!
//! A [`Report`] is produced once per measurement cycle and serialized as JSON
//! for the local output file and the webhook body. Sequential host ids are
//! 1-based and become JSON object keys.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Value of `ping_config.type`
pub const PROBE_TYPE: &str = "icmp-echo";

/// Per-host outcome of one probe batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostStatus {
    /// No reply at all (or no diagnostic line)
    #[default]
    NoResponse,
    /// Every attempt answered
    Online,
    /// Some attempts answered, some lost
    PartialLoss,
}

impl HostStatus {
    pub fn code(self) -> u8 {
        match self {
            HostStatus::NoResponse => 0,
            HostStatus::Online => 1,
            HostStatus::PartialLoss => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HostStatus::NoResponse),
            1 => Some(HostStatus::Online),
            2 => Some(HostStatus::PartialLoss),
            _ => None,
        }
    }

    /// Anything that answered at least once counts as online
    pub fn is_online(self) -> bool {
        self != HostStatus::NoResponse
    }
}

impl Serialize for HostStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for HostStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        HostStatus::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("unknown host status {code}")))
    }
}

/// Statistics for one target after a probe batch
///
/// Latencies are integer microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostResult {
    pub address: String,
    pub status: HostStatus,
    pub min: u64,
    pub avg: u64,
    pub max: u64,
    /// Sum of all samples, lost attempts counted as zero
    pub total: u64,
    pub sent: u32,
    pub received: u32,
    pub losts: u32,
    pub jitter: u64,
}

impl HostResult {
    /// Zeroed record for a target that has not reported anything yet
    pub fn empty(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }
}

/// Probe parameters in effect for a cycle (`ping_config` in the report)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(rename = "type")]
    pub probe_type: String,
    /// Agent name
    pub name: String,
    /// Milliseconds between packets
    pub interval: u32,
    /// Seconds between cycles in daemon mode
    pub pause: u64,
    /// ICMP payload bytes
    pub size: u32,
    pub count: u32,
    pub ttl: u8,
    pub retries: u8,
    pub fragment: bool,
    /// Per-packet timeout in milliseconds
    pub timeout: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            probe_type: PROBE_TYPE.to_string(),
            name: String::new(),
            interval: 10,
            pause: 30,
            size: 1000,
            count: 10,
            ttl: 64,
            retries: 0,
            fragment: true,
            timeout: 900,
            source_address: None,
        }
    }
}

/// Identity and timing of one measurement cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleEvent {
    pub uuid: String,
    pub start_datetime: String,
    pub start_timestamp: i64,
    pub stop_datetime: String,
    pub stop_timestamp: i64,
    pub ellapsed_time: i64,
}

impl CycleEvent {
    pub fn new(uuid: impl Into<String>, start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        let start_timestamp = start.timestamp();
        let stop_timestamp = stop.timestamp();
        Self {
            uuid: uuid.into(),
            start_datetime: start.to_rfc3339_opts(SecondsFormat::Secs, false),
            start_timestamp,
            stop_datetime: stop.to_rfc3339_opts(SecondsFormat::Secs, false),
            stop_timestamp,
            ellapsed_time: stop_timestamp - start_timestamp,
        }
    }
}

/// Cycle-level rollup over all host results
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub hosts: BTreeMap<u32, String>,
    pub hosts_online: BTreeMap<u32, String>,
    pub hosts_offline: BTreeMap<u32, String>,
    pub total_online: u32,
    pub total_offline: u32,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
}

impl Summary {
    /// Roll up results in order, assigning ids 1, 2, 3, ...
    pub fn from_results(results: &[HostResult]) -> Self {
        let mut summary = Summary::default();

        for (id, result) in (1u32..).zip(results) {
            summary.hosts.insert(id, result.address.clone());
            summary.packets_sent += u64::from(result.sent);
            summary.packets_received += u64::from(result.received);
            summary.packets_lost += u64::from(result.losts);

            if result.status.is_online() {
                summary.total_online += 1;
                summary.hosts_online.insert(id, result.address.clone());
            } else {
                summary.total_offline += 1;
                summary.hosts_offline.insert(id, result.address.clone());
            }
        }

        summary
    }
}

/// Complete cycle report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub event: CycleEvent,
    pub ping_config: ProbeSettings,
    pub ping_summary: Summary,
    pub ping_table: BTreeMap<u32, HostResult>,
}

impl Report {
    pub fn new(event: CycleEvent, settings: ProbeSettings, results: Vec<HostResult>) -> Self {
        let ping_summary = Summary::from_results(&results);
        let ping_table = (1u32..).zip(results).collect();
        Self {
            event,
            ping_config: settings,
            ping_summary,
            ping_table,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
