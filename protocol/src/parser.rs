//! Diagnostic stream parser and per-host aggregation
//!
//! The measurement backend writes one line per target to its diagnostic
//! stream:
//!
//! ```text
//! 1.1.1.1     : 0.0123 0.0131 -
//! 2001:db8::1 : - - -
//! ```
//!
//! Each token is a latency or the loss marker `-`. The unit of the latency
//! depends on the backend: fping prints milliseconds, the generic contract
//! is seconds. See [`LatencyUnit`].

use crate::address::Target;
use crate::report::{HostResult, HostStatus};
use std::collections::HashMap;
use tracing::debug;

/// Token printed for an attempt that got no reply
pub const LOSS_MARKER: &str = "-";

/// Separator between the address and the attempt tokens
pub const LINE_SEPARATOR: &str = " : ";

/// Unit of the latency tokens on a diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatencyUnit {
    #[default]
    Seconds,
    Milliseconds,
}

impl LatencyUnit {
    /// Scale from this unit to microseconds
    pub fn micros_per_unit(self) -> f64 {
        match self {
            LatencyUnit::Seconds => 1_000_000.0,
            LatencyUnit::Milliseconds => 1_000.0,
        }
    }
}

/// One probe attempt as reported on a diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Lost,
    /// Round trip in microseconds
    Reply(u64),
}

impl Attempt {
    fn parse(token: &str, unit: LatencyUnit) -> Option<Self> {
        if token == LOSS_MARKER {
            return Some(Attempt::Lost);
        }
        let value: f64 = token.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(Attempt::Reply((value * unit.micros_per_unit()).round() as u64))
    }

    /// Sample value used for min/max/total; a loss contributes zero
    fn micros(self) -> u64 {
        match self {
            Attempt::Lost => 0,
            Attempt::Reply(us) => us,
        }
    }
}

/// Split a diagnostic line into its address and attempts
///
/// Returns `None` for lines that are not per-host result lines (no
/// separator, no tokens, or a token that is neither a number nor the loss
/// marker).
pub fn parse_line(line: &str, unit: LatencyUnit) -> Option<(&str, Vec<Attempt>)> {
    let (address, replies) = line.split_once(LINE_SEPARATOR)?;
    let address = address.trim();
    if address.is_empty() {
        return None;
    }

    let attempts = replies
        .split_whitespace()
        .map(|token| Attempt::parse(token, unit))
        .collect::<Option<Vec<_>>>()?;
    if attempts.is_empty() {
        return None;
    }

    Some((address, attempts))
}

/// Fold the attempts for one address into a [`HostResult`]
///
/// Lost attempts count as a zero sample for min/max, so any loss pulls the
/// minimum down to zero.
pub fn aggregate(address: &str, attempts: &[Attempt]) -> HostResult {
    let mut result = HostResult::empty(address);
    let mut min: Option<u64> = None;
    let mut max: Option<u64> = None;

    for attempt in attempts {
        result.sent += 1;
        match attempt {
            Attempt::Lost => result.losts += 1,
            Attempt::Reply(_) => result.received += 1,
        }

        let sample = attempt.micros();
        min = Some(min.map_or(sample, |m| m.min(sample)));
        max = Some(max.map_or(sample, |m| m.max(sample)));
        result.total += sample;
    }

    result.min = min.unwrap_or(0);
    result.max = max.unwrap_or(0);
    result.jitter = result.max - result.min;
    result.avg = if result.total > 0 && result.received > 0 {
        result.total / u64::from(result.received)
    } else {
        0
    };
    result.status = match (result.received, result.losts) {
        (0, _) => HostStatus::NoResponse,
        (_, 0) => HostStatus::Online,
        _ => HostStatus::PartialLoss,
    };

    result
}

/// Parse a whole diagnostic stream against the cycle's target set
///
/// The output has exactly one record per target, in target order. Targets
/// without a line keep the zeroed record; lines for unknown addresses are
/// dropped. A later line for the same address replaces an earlier one.
pub fn parse_diagnostics(output: &str, targets: &[Target], unit: LatencyUnit) -> Vec<HostResult> {
    let mut results: Vec<HostResult> = targets
        .iter()
        .map(|t| HostResult::empty(t.address()))
        .collect();
    let index: HashMap<&str, usize> = targets
        .iter()
        .enumerate()
        .map(|(i, t)| (t.address(), i))
        .collect();

    for raw in output.lines() {
        let line = raw.replace('\t', " ");
        let Some((address, attempts)) = parse_line(&line, unit) else {
            continue;
        };
        match index.get(address) {
            Some(&i) => results[i] = aggregate(address, &attempts),
            None => debug!("Ignoring result line for unexpected address {}", address),
        }
    }

    results
}
