use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: String,
    pub group_label: String,
    pub call_label: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Failures of a single run, at most one record per item identifier.
#[derive(Debug, Default)]
pub struct FailureAggregator {
    records: Vec<FailureRecord>,
    seen: HashSet<String>,
}

impl FailureAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when `id` already failed earlier in the run; the first
    /// reason is kept.
    pub fn record(
        &mut self,
        id: &str,
        group_label: &str,
        call_label: &str,
        reason: impl Into<String>,
        detail: Option<serde_json::Value>,
    ) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.records.push(FailureRecord {
            id: id.to_string(),
            group_label: group_label.to_string(),
            call_label: call_label.to_string(),
            reason: reason.into(),
            detail,
        });
        true
    }

    pub fn into_records(self) -> Vec<FailureRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_reports_collapse() {
        let mut agg = FailureAggregator::new();
        assert!(agg.record("SN1", "Shop A", "Shop A / jne", "label not ready", None));
        assert!(!agg.record("SN1", "Shop A", "Shop A / jne", "blob missing", None));
        assert!(agg.record("SN2", "Shop A", "Shop A / jne", "label not ready", None));

        let records = agg.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reason, "label not ready");
    }
}
