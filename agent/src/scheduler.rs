//! Measurement cycle driver
//!
//! One cycle: synchronize sources, merge targets, probe, build the report,
//! emit it locally and to the webhook. [`Scheduler::run_once`] runs a single
//! cycle; [`Scheduler::run_forever`] repeats with a pause until the shutdown
//! channel fires. A cycle in flight is never interrupted.

use crate::config::Settings;
use crate::output::OutputManager;
use crate::probe::{measure, ProbeError, ProbeExecutor};
use crate::sources::{load_file_targets, merge_targets, SourceSynchronizer};
use crate::webhook::{Delivery, DeliveryError, WebhookDispatcher};
use anyhow::Result;
use chrono::Utc;
use protocol::{CycleEvent, Report};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Target set was empty, nothing probed
    NoTargets,
    Failed(CycleError),
    Reported {
        report: Box<Report>,
        delivery: Result<Delivery, DeliveryError>,
    },
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&Report> {
        match self {
            CycleOutcome::Reported { report, .. } => Some(report),
            _ => None,
        }
    }
}

pub struct Scheduler {
    settings: Arc<Settings>,
    sources: SourceSynchronizer,
    executor: Box<dyn ProbeExecutor>,
    webhook: WebhookDispatcher,
    output: OutputManager,
}

impl Scheduler {
    pub fn new(settings: Arc<Settings>, executor: Box<dyn ProbeExecutor>) -> Result<Self> {
        let sources = SourceSynchronizer::new(settings.websource.clone())?;
        let webhook = WebhookDispatcher::new(settings.webhook.clone())?;
        Ok(Self::with_parts(settings, sources, executor, webhook))
    }

    pub fn with_parts(
        settings: Arc<Settings>,
        sources: SourceSynchronizer,
        executor: Box<dyn ProbeExecutor>,
        webhook: WebhookDispatcher,
    ) -> Self {
        Self {
            output: OutputManager::new(&settings),
            sources,
            executor,
            webhook,
            settings,
        }
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let remote = self.sources.remote_targets(Utc::now()).await;
        let files = load_file_targets(&self.settings.target_files);
        let targets = merge_targets(&self.settings.targets, &files, &remote);
        if targets.is_empty() {
            info!("No targets to probe, skipping cycle");
            return CycleOutcome::NoTargets;
        }

        let uuid = Uuid::new_v4().to_string();
        debug!("Cycle {} probing {} targets", uuid, targets.len());

        // event timing covers the measurement only
        let start = Utc::now();
        let results = match measure(self.executor.as_ref(), &targets, &self.settings.probe).await {
            Ok(results) => results,
            Err(e) => {
                error!("Cycle {} failed: {}", uuid, e);
                return CycleOutcome::Failed(e.into());
            }
        };

        let event = CycleEvent::new(uuid, start, Utc::now());
        let report = Report::new(event, self.settings.probe.clone(), results);
        let json = match report.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode report: {}", e);
                return CycleOutcome::Failed(e.into());
            }
        };

        info!(
            "Cycle {} done: {} online, {} offline",
            report.event.uuid, report.ping_summary.total_online, report.ping_summary.total_offline
        );

        if let Err(e) = self.output.emit(&report, &json) {
            error!("Output failed: {:#}", e);
        }

        let delivery = self.webhook.dispatch(&json).await;
        match &delivery {
            Err(DeliveryError::Status { status, body }) => {
                warn!("Webhook rejected report with status {}: {}", status, body.trim())
            }
            Err(e) => warn!("Webhook delivery failed: {}", e),
            Ok(_) => {}
        }

        CycleOutcome::Reported {
            report: Box::new(report),
            delivery,
        }
    }

    /// Single cycle; success means a report was produced
    pub async fn run_once(&mut self) -> ExitCode {
        match self.run_cycle().await {
            CycleOutcome::Reported { .. } => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        }
    }

    /// Cycle until `shutdown` turns true (or its sender goes away)
    ///
    /// Returns the number of cycles run.
    pub async fn run_forever(&mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut cycles = 0;
        info!("Starting measurement loop (pause {:?})", self.settings.pause);

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            self.run_cycle().await;
            cycles += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.settings.pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Measurement loop stopped after {} cycles", cycles);
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::http;
    use crate::probe::ProbeOutput;
    use crate::test_support::MockServer;
    use async_trait::async_trait;
    use protocol::{HostStatus, ProbeSettings, Target};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct MockExecutor {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl ProbeExecutor for MockExecutor {
        async fn execute(&self, targets: &[Target], _settings: &ProbeSettings) -> Result<ProbeOutput, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProbeError::Spawn {
                    command: "fping".into(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            let stderr = targets
                .iter()
                .map(|t| format!("{} : 0.001 - 0.003\n", t))
                .collect();
            Ok(ProbeOutput {
                stderr,
                ..Default::default()
            })
        }
    }

    fn settings(addresses: &[&str]) -> Arc<Settings> {
        let mut config = Config::default();
        config.general.quiet = true;
        config.general.name = "test-agent".into();
        config.targets.addresses = addresses.iter().map(|a| a.to_string()).collect();
        Arc::new(config.finalize())
    }

    fn scheduler(addresses: &[&str], executor: MockExecutor) -> Scheduler {
        Scheduler::new(settings(addresses), Box::new(executor)).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_produces_report() {
        let mut scheduler = scheduler(&["1.1.1.1", "8.8.8.8", "1.1.1.1"], MockExecutor::default());
        let outcome = scheduler.run_cycle().await;

        let report = outcome.report().unwrap();
        assert_eq!(report.ping_table.len(), 2);
        assert_eq!(report.ping_table[&1].address, "1.1.1.1");
        assert_eq!(report.ping_table[&1].status, HostStatus::PartialLoss);
        assert_eq!(report.ping_table[&1].max, 3000);
        assert_eq!(report.ping_config.name, "test-agent");
        assert_eq!(report.event.uuid.len(), 36);
        assert!(matches!(
            outcome,
            CycleOutcome::Reported {
                delivery: Ok(Delivery::Skipped),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_target_set_skips_probe() {
        let executor = MockExecutor::default();
        let mut scheduler = scheduler(&[], executor.clone());

        assert!(matches!(scheduler.run_cycle().await, CycleOutcome::NoTargets));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.run_once().await, ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_cycle_fatal() {
        let executor = MockExecutor {
            fail: true,
            ..Default::default()
        };
        let mut scheduler = scheduler(&["1.1.1.1"], executor);
        assert!(matches!(
            scheduler.run_cycle().await,
            CycleOutcome::Failed(CycleError::Probe(_))
        ));
        assert_eq!(scheduler.run_once().await, ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn test_run_once_success() {
        let mut scheduler = scheduler(&["1.1.1.1"], MockExecutor::default());
        assert_eq!(scheduler.run_once().await, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn test_target_files_are_read_every_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("targets.txt");
        std::fs::write(&list, "9.9.9.9\n").unwrap();

        let mut config = Config::default();
        config.general.quiet = true;
        config.targets.addresses = vec!["1.1.1.1".into()];
        config.targets.files = vec![list.to_str().unwrap().to_string()];
        let mut scheduler = Scheduler::new(Arc::new(config.finalize()), Box::new(MockExecutor::default())).unwrap();

        let first = scheduler.run_cycle().await;
        assert_eq!(first.report().unwrap().ping_summary.hosts.len(), 2);

        std::fs::write(&list, "9.9.9.9\n149.112.112.112\n").unwrap();
        let second = scheduler.run_cycle().await;
        let hosts: Vec<&String> = second.report().unwrap().ping_summary.hosts.values().collect();
        assert_eq!(hosts, vec!["1.1.1.1", "9.9.9.9", "149.112.112.112"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_forever_pauses_between_cycles() {
        let executor = MockExecutor::default();
        let mut scheduler = scheduler(&["1.1.1.1"], executor.clone());
        let (tx, rx) = watch::channel(false);

        // pause is 30s: cycles start at 0s, 30s and 60s
        let stopper = async {
            tokio::time::sleep(Duration::from_secs(75)).await;
            tx.send(true).unwrap();
        };
        let (cycles, ()) = tokio::join!(scheduler.run_forever(rx), stopper);

        assert_eq!(cycles, 3);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_forever_stops_when_sender_dropped() {
        let mut scheduler = scheduler(&["1.1.1.1"], MockExecutor::default());
        let (tx, rx) = watch::channel(false);
        drop(tx);
        assert_eq!(scheduler.run_forever(rx).await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_runs_nothing() {
        let executor = MockExecutor::default();
        let mut scheduler = scheduler(&["1.1.1.1"], executor.clone());
        let (_tx, rx) = watch::channel(true);
        assert_eq!(scheduler.run_forever(rx).await, 0);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_event_time_excludes_source_fetch() {
        let server = MockServer::delayed(vec![(200, "9.9.9.9\n")], Duration::from_millis(1100)).await;
        let mut config = Config::default();
        config.general.quiet = true;
        config.websource.url = server.url.clone();
        let settings = Arc::new(config.finalize());

        let client = http::client_builder().no_proxy().build().unwrap();
        let sources = SourceSynchronizer::with_client(settings.websource.clone(), client);
        let webhook = WebhookDispatcher::with_client(None, reqwest::Client::new());
        let mut scheduler = Scheduler::with_parts(settings, sources, Box::new(MockExecutor::default()), webhook);

        let before = Utc::now().timestamp();
        let outcome = scheduler.run_cycle().await;
        let report = outcome.report().unwrap();

        assert_eq!(report.ping_table[&1].address, "9.9.9.9");
        assert!(report.event.start_timestamp > before);
        assert_eq!(server.hits(), 1);
    }
}
