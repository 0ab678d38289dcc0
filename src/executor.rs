use crate::{
    client::{CallOutcome, RemoteActionClient},
    failures::FailureAggregator,
    grouping::{CallBatch, Group, GroupingStrategy},
    notify::{Level, LogNotifier, Notification, NotificationSink},
    progress::{LogProgress, ProgressReporter, ProgressSink},
    report::{BatchOutcome, BatchReport, CallArtifact, GroupReport},
    util::now_rfc3339,
    work::WorkItem,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no work items to process")]
    EmptyBatch,

    #[error("work item id {0} appears more than once")]
    DuplicateId(String),
}

/// Tells the caller's dataset that an item succeeded, e.g. mark an order as
/// printed. The executor never touches that dataset itself.
pub trait UpdateCallback: Send + Sync {
    fn on_work_item_succeeded(&self, id: &str, patch: &serde_json::Value);
}

pub struct NoopUpdates;

impl UpdateCallback for NoopUpdates {
    fn on_work_item_succeeded(&self, _id: &str, _patch: &serde_json::Value) {}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateRecord {
    pub id: String,
    pub patch: serde_json::Value,
}

/// Keeps every successful patch in arrival order.
#[derive(Default)]
pub struct RecordedUpdates {
    seen: Mutex<Vec<UpdateRecord>>,
}

impl RecordedUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<UpdateRecord> {
        match self.seen.lock() {
            Ok(v) => v.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|u| u.id).collect()
    }
}

impl UpdateCallback for RecordedUpdates {
    fn on_work_item_succeeded(&self, id: &str, patch: &serde_json::Value) {
        let rec = UpdateRecord {
            id: id.to_string(),
            patch: patch.clone(),
        };
        match self.seen.lock() {
            Ok(mut v) => v.push(rec),
            Err(poisoned) => poisoned.into_inner().push(rec),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// How long the finished progress stays visible before going idle.
    pub reset_after: Duration,
    /// Pause between two consecutive calls of a run.
    pub call_interval: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            reset_after: Duration::from_millis(1500),
            call_interval: Duration::ZERO,
        }
    }
}

/// Drives one client over grouped work items, strictly one call at a time.
///
/// A run never aborts after it started: call errors become failure records
/// and the remaining groups still run. Retrying is another `run` with the
/// failed items only (see [`BatchReport::retry_items`]).
pub struct BatchExecutor<C: RemoteActionClient> {
    client: C,
    grouping: GroupingStrategy,
    opts: ExecutorOptions,
    progress: Arc<dyn ProgressSink>,
    notifier: Arc<dyn NotificationSink>,
    updates: Arc<dyn UpdateCallback>,
}

#[derive(Default)]
struct CallTally {
    success: usize,
    failed: usize,
}

impl<C: RemoteActionClient> BatchExecutor<C> {
    pub fn new(client: C, grouping: GroupingStrategy) -> Self {
        Self {
            client,
            grouping,
            opts: ExecutorOptions::default(),
            progress: Arc::new(LogProgress),
            notifier: Arc::new(LogNotifier),
            updates: Arc::new(NoopUpdates),
        }
    }

    pub fn with_options(mut self, opts: ExecutorOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_updates(mut self, updates: Arc<dyn UpdateCallback>) -> Self {
        self.updates = updates;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn run(
        &self,
        items: Vec<WorkItem<C::Payload>>,
    ) -> Result<BatchOutcome, BatchError> {
        if items.is_empty() {
            self.notifier.notify(Notification::new(
                Level::Info,
                self.client.name(),
                "nothing to process",
            ));
            return Err(BatchError::EmptyBatch);
        }
        let mut ids = HashSet::with_capacity(items.len());
        if let Some(dup) = items.iter().find(|it| !ids.insert(it.id())) {
            let err = BatchError::DuplicateId(dup.id().to_string());
            self.notifier.notify(Notification::new(
                Level::Error,
                self.client.name(),
                err.to_string(),
            ));
            return Err(err);
        }

        let started = now_rfc3339();
        let total = items.len();
        let groups = self.grouping.plan(items);

        info!(
            "batch {} start items={} groups={}",
            self.client.name(),
            total,
            groups.len()
        );

        let mut progress = ProgressReporter::new(self.progress.clone());
        progress.begin(total);

        let mut failures = FailureAggregator::new();
        let mut artifacts = Vec::new();
        let mut group_reports = Vec::with_capacity(groups.len());
        let mut calls_done = 0usize;

        for group in &groups {
            let mut row = GroupReport {
                label: group.label.clone(),
                success: 0,
                failed: 0,
            };

            for call in &group.calls {
                if calls_done > 0 && !self.opts.call_interval.is_zero() {
                    tokio::time::sleep(self.opts.call_interval).await;
                }
                progress.enter(&call.label);

                let tally = self
                    .dispatch(group, call, &mut failures, &mut artifacts)
                    .await;
                calls_done += 1;

                row.success += tally.success;
                row.failed += tally.failed;
                progress.advance(call.items.len());
            }

            info!(
                "group {} done success={} failed={}",
                row.label, row.success, row.failed
            );
            group_reports.push(row);
        }

        let report = BatchReport::new(
            self.client.name(),
            started,
            now_rfc3339(),
            group_reports,
            failures.into_records(),
        );

        // Dropping the handle leaves the reset running detached.
        let _ = progress.finish(self.opts.reset_after);
        self.notifier.notify(report.summary_notification());

        info!(
            "batch {} finished success={} failed={}",
            report.action, report.total_success, report.total_failed
        );

        Ok(BatchOutcome { report, artifacts })
    }

    /// The single suspension point of a run: one client call and the
    /// bookkeeping of its outcome.
    async fn dispatch(
        &self,
        group: &Group<C::Payload>,
        call: &CallBatch<C::Payload>,
        failures: &mut FailureAggregator,
        artifacts: &mut Vec<CallArtifact>,
    ) -> CallTally {
        debug!("call {} items={}", call.label, call.items.len());

        let mut rejected: HashMap<String, (String, Option<serde_json::Value>)> = HashMap::new();
        match self.client.perform(call).await {
            Ok(CallOutcome::Success { artifact }) => {
                keep_artifact(artifacts, group, call, artifact);
            }
            Ok(CallOutcome::PartialFailure {
                failures: item_failures,
                artifact,
            }) => {
                keep_artifact(artifacts, group, call, artifact);
                for r in item_failures {
                    if call.items.iter().any(|it| it.id() == r.id) {
                        rejected.entry(r.id).or_insert((r.reason, r.detail));
                    } else {
                        warn!("call {} rejected unknown item {}", call.label, r.id);
                    }
                }
            }
            Ok(CallOutcome::Error { reason }) => {
                warn!("call {} refused: {}", call.label, reason);
                for it in &call.items {
                    rejected.insert(it.id().to_string(), (reason.clone(), None));
                }
            }
            Err(err) => {
                warn!("call {} failed: {}", call.label, err);
                let reason = err.to_string();
                for it in &call.items {
                    rejected.insert(it.id().to_string(), (reason.clone(), None));
                }
            }
        }

        let mut tally = CallTally::default();
        for it in &call.items {
            match rejected.remove(it.id()) {
                Some((reason, detail)) => {
                    failures.record(it.id(), &group.label, &call.label, reason, detail);
                    tally.failed += 1;
                }
                None => {
                    let patch = self.client.success_patch(it);
                    self.updates.on_work_item_succeeded(it.id(), &patch);
                    tally.success += 1;
                }
            }
        }
        tally
    }
}

fn keep_artifact<P>(
    artifacts: &mut Vec<CallArtifact>,
    group: &Group<P>,
    call: &CallBatch<P>,
    artifact: Option<crate::client::Artifact>,
) {
    if let Some(artifact) = artifact {
        artifacts.push(CallArtifact {
            group_label: group.label.clone(),
            call_label: call.label.clone(),
            artifact,
        });
    }
}
