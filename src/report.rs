use crate::{
    client::Artifact,
    failures::FailureRecord,
    notify::{Level, Notification},
    work::{select_by_id, WorkItem},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReport {
    pub label: String,
    pub success: usize,
    pub failed: usize,
}

/// Final summary of one run. Built once by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub action: String,
    pub started: String,
    pub finished: String,
    pub total_success: usize,
    pub total_failed: usize,
    pub groups: Vec<GroupReport>,
    pub failures: Vec<FailureRecord>,
}

/// What a run hands back: the report plus any documents the calls returned,
/// in processing order.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub report: BatchReport,
    pub artifacts: Vec<CallArtifact>,
}

#[derive(Debug, Clone)]
pub struct CallArtifact {
    pub group_label: String,
    pub call_label: String,
    pub artifact: Artifact,
}

impl BatchReport {
    pub fn new(
        action: &str,
        started: String,
        finished: String,
        groups: Vec<GroupReport>,
        failures: Vec<FailureRecord>,
    ) -> Self {
        let total_success = groups.iter().map(|g| g.success).sum();
        let total_failed = groups.iter().map(|g| g.failed).sum();
        Self {
            action: action.to_string(),
            started,
            finished,
            total_success,
            total_failed,
            groups,
            failures,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading report: {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing report: {}", path.display()))
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.id.clone()).collect()
    }

    /// Exactly the items that failed in this run, in `items` order. Items that
    /// succeeded are never returned.
    pub fn retry_items<P: Clone>(&self, items: &[WorkItem<P>]) -> Vec<WorkItem<P>> {
        select_by_id(items, &self.failed_ids())
    }

    pub fn summary_notification(&self) -> Notification {
        let level = if self.total_failed == 0 {
            Level::Success
        } else {
            Level::Error
        };
        Notification::new(
            level,
            format!("{} finished", self.action),
            format!(
                "{} succeeded, {} failed",
                self.total_success, self.total_failed
            ),
        )
    }

    pub fn render_table(&self) -> String {
        let width = self
            .groups
            .iter()
            .map(|g| g.label.len())
            .max()
            .unwrap_or(0)
            .max("group".len());

        let mut out = String::new();
        let _ = writeln!(out, "{:<width$}  {:>7}  {:>6}", "group", "success", "failed");
        for g in &self.groups {
            let _ = writeln!(out, "{:<width$}  {:>7}  {:>6}", g.label, g.success, g.failed);
        }
        let _ = writeln!(
            out,
            "{:<width$}  {:>7}  {:>6}",
            "total", self.total_success, self.total_failed
        );

        if self.has_failures() {
            let _ = writeln!(out, "\nfailed ({}):", self.failures.len());
            for f in &self.failures {
                let _ = writeln!(out, "  {}  [{}]  {}", f.id, f.call_label, f.reason);
            }
        }
        out
    }
}
