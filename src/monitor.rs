// src/monitor.rs
//! The monitor runner: one pass over all targets, then at most one
//! consolidated notification.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::{BaselinePolicy, MonitorConfig, Target};
use crate::diff::summarize_changes;
use crate::error::MonitorError;
use crate::extract::{extract_digest, IgnoreSet};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::metrics as m;
use crate::notify::{Digest, NotificationEvent, NotifierMux};
use crate::snapshot::{Snapshot, SnapshotStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Unchanged,
    Changed { changes: Vec<String> },
    /// First observation; baseline written.
    Baseline,
    /// Fetch or storage failure; nothing written for this target.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: String,
    pub url: String,
    pub outcome: TargetOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    NotNeeded,
    Sent { channels: usize },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
    pub events: Vec<NotificationEvent>,
    pub notification: NotificationStatus,
}

impl RunReport {
    /// 0 = run completed (individual fetch failures allowed),
    /// 2 = a required notification could not be delivered.
    pub fn exit_code(&self) -> u8 {
        match self.notification {
            NotificationStatus::Failed(_) => 2,
            _ => 0,
        }
    }

    pub fn count(&self, pred: impl Fn(&TargetOutcome) -> bool) -> usize {
        self.targets.iter().filter(|t| pred(&t.outcome)).count()
    }
}

pub struct Monitor {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<SnapshotStore>,
    notifier: NotifierMux,
    baseline: BaselinePolicy,
    concurrency: usize,
}

impl Monitor {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: SnapshotStore,
        notifier: NotifierMux,
    ) -> Self {
        Self {
            fetcher,
            store: Arc::new(store),
            notifier,
            baseline: BaselinePolicy::default(),
            concurrency: 1,
        }
    }

    pub fn with_baseline(mut self, policy: BaselinePolicy) -> Self {
        self.baseline = policy;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Production wiring: HTTP fetcher, file store, channels from config.
    pub fn from_config(cfg: &MonitorConfig) -> Result<Self, MonitorError> {
        let fetcher = HttpFetcher::new(cfg.fetch_timeout, &cfg.user_agent)
            .map_err(|e| MonitorError::config(format!("{e:#}")))?;
        let notifier = NotifierMux::from_config(cfg)?;
        let store = SnapshotStore::new(&cfg.state_dir);
        Ok(Self::new(Arc::new(fetcher), store, notifier)
            .with_baseline(cfg.baseline)
            .with_concurrency(cfg.concurrency))
    }

    pub async fn run(&self, targets: &[Target], test_mode: bool) -> RunReport {
        let started = Instant::now();
        let now = Utc::now();
        info!(
            targets = targets.len(),
            test_mode,
            concurrency = self.concurrency,
            "monitor run starting"
        );

        let outcomes = if self.concurrency <= 1 {
            let mut v = Vec::with_capacity(targets.len());
            for t in targets {
                v.push(check_target(self.fetcher.as_ref(), &self.store, t, now).await);
            }
            v
        } else {
            self.check_parallel(targets, now).await
        };

        let mut reports = Vec::with_capacity(targets.len());
        let mut events = Vec::new();
        for (t, outcome) in targets.iter().zip(outcomes) {
            match &outcome {
                TargetOutcome::Changed { changes } => {
                    events.push(NotificationEvent::changed(&t.name, &t.url, changes.clone(), now));
                }
                TargetOutcome::Baseline if self.baseline == BaselinePolicy::Notify => {
                    events.push(NotificationEvent::baseline(&t.name, &t.url, now));
                }
                _ => {}
            }
            reports.push(TargetReport {
                target: t.name.clone(),
                url: t.url.clone(),
                outcome,
            });
        }

        if test_mode {
            events.push(NotificationEvent::test(now));
        }

        let notification = match Digest::compose(&events) {
            None => NotificationStatus::NotNeeded,
            Some(digest) => match self.notifier.deliver(&digest).await {
                Ok(channels) => {
                    counter!(m::NOTIFICATIONS, "result" => "sent").increment(1);
                    NotificationStatus::Sent { channels }
                }
                Err(e) => {
                    counter!(m::NOTIFICATIONS, "result" => "failed").increment(1);
                    warn!(error = %e, "notification not delivered; snapshots are kept");
                    NotificationStatus::Failed(e.to_string())
                }
            },
        };

        let report = RunReport {
            targets: reports,
            events,
            notification,
        };

        gauge!(m::LAST_RUN_TS).set(now.timestamp() as f64);
        histogram!(m::RUN_DURATION_MS).record(started.elapsed().as_secs_f64() * 1_000.0);
        info!(
            checked = report.targets.len(),
            changed = report.count(|o| matches!(o, TargetOutcome::Changed { .. })),
            failed = report.count(|o| matches!(o, TargetOutcome::Failed { .. })),
            events = report.events.len(),
            "monitor run complete"
        );
        report
    }

    /// Bounded fan-out. Each task owns one target's files; outcomes come back
    /// in target order.
    async fn check_parallel(&self, targets: &[Target], now: DateTime<Utc>) -> Vec<TargetOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for (idx, t) in targets.iter().cloned().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (idx, check_target(fetcher.as_ref(), &store, &t, now).await)
            });
        }

        let mut slots: Vec<Option<TargetOutcome>> = vec![None; targets.len()];
        while let Some(res) = set.join_next().await {
            match res {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "target task aborted"),
            }
        }

        slots
            .into_iter()
            .map(|o| {
                o.unwrap_or_else(|| TargetOutcome::Failed {
                    error: "target task aborted".to_string(),
                })
            })
            .collect()
    }
}

/// Fetch, normalize, compare and (on change) persist one target. Never
/// touches another target's files.
#[instrument(skip_all, fields(page = %target.name))]
pub async fn check_target(
    fetcher: &dyn PageFetcher,
    store: &SnapshotStore,
    target: &Target,
    now: DateTime<Utc>,
) -> TargetOutcome {
    counter!(m::TARGETS_CHECKED).increment(1);

    let failed = |error: String| {
        counter!(m::FETCH_ERRORS).increment(1);
        warn!(url = %target.url, error = %error, "target skipped");
        TargetOutcome::Failed { error }
    };

    let ignore = match IgnoreSet::new(&target.ignore) {
        Ok(i) => i,
        Err(e) => return failed(format!("invalid ignore pattern: {e}")),
    };

    let body = match fetcher.fetch(&target.url).await {
        Ok(b) => b,
        Err(e) => return failed(MonitorError::fetch(&target.name, format!("{e:#}")).to_string()),
    };

    let digest = extract_digest(&body, &ignore);
    let current = Snapshot::new(&target.name, &target.url, digest, now);

    let previous = match store.load(&target.name).await {
        Ok(p) => p,
        Err(e) => return failed(e.to_string()),
    };

    let outcome = match &previous {
        Some(prev) if prev.content_hash == current.content_hash => {
            info!("no changes detected");
            return TargetOutcome::Unchanged;
        }
        Some(prev) => TargetOutcome::Changed {
            changes: summarize_changes(&prev.digest, &current.digest),
        },
        None => TargetOutcome::Baseline,
    };

    if let Err(e) = store.save(&current, &body).await {
        return failed(e.to_string());
    }

    match &outcome {
        TargetOutcome::Changed { changes } => {
            counter!(m::CHANGES).increment(1);
            info!(changes = changes.len(), "change detected");
        }
        _ => {
            counter!(m::BASELINES).increment(1);
            info!("no previous snapshot, baseline created");
        }
    }
    outcome
}
