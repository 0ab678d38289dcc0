use super::http::{DashboardApi, Reply};
use super::{CallOutcome, ClientError, RemoteActionClient};
use crate::grouping::{CallBatch, GroupingStrategy, KeyExtractor};
use crate::work::WorkItem;
use async_trait::async_trait;
use clap::ValueEnum;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum CancelOperation {
    Accept,
    Reject,
}

impl CancelOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelOperation::Accept => "ACCEPT",
            CancelOperation::Reject => "REJECT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRow {
    pub order_sn: String,
    pub shop_id: u64,
    #[serde(default)]
    pub shop_name: Option<String>,
}

impl CancellationRow {
    pub fn into_work_item(self) -> WorkItem<CancellationRow> {
        let shop_id = self.shop_id.to_string();
        let shop_name = self.shop_name.clone().unwrap_or_else(|| shop_id.clone());
        WorkItem::new(self.order_sn.clone(), self)
            .with_attr("shop_id", shop_id)
            .with_attr("shop_name", shop_name)
    }
}

/// The endpoint takes one order at a time.
pub fn cancellation_grouping() -> GroupingStrategy {
    GroupingStrategy::by(vec![KeyExtractor::attr("shop_id")])
        .split_by(vec![KeyExtractor::ItemId])
        .labelled_by("shop_name")
}

pub struct CancellationAction {
    api: DashboardApi,
    operation: CancelOperation,
}

impl CancellationAction {
    pub fn new(api: DashboardApi, operation: CancelOperation) -> Self {
        Self { api, operation }
    }
}

#[async_trait]
impl RemoteActionClient for CancellationAction {
    type Payload = CancellationRow;

    fn name(&self) -> &str {
        match self.operation {
            CancelOperation::Accept => "accept-cancellations",
            CancelOperation::Reject => "reject-cancellations",
        }
    }

    async fn perform(&self, call: &CallBatch<CancellationRow>) -> Result<CallOutcome, ClientError> {
        let mut rejected = Vec::new();
        for it in &call.items {
            let row = it.payload();
            let req = self
                .api
                .request(Method::POST, "/api/orders/handle-cancellation")
                .json(&json!({
                    "shopId": row.shop_id,
                    "orderSn": row.order_sn,
                    "operation": self.operation.as_str(),
                }));
            if let Reply::Refused(reason) = self.api.call(req).await? {
                rejected.push(super::ItemRejection::new(it.id(), reason));
            }
        }

        Ok(if rejected.is_empty() {
            CallOutcome::ok()
        } else if rejected.len() == call.items.len() && call.items.len() == 1 {
            CallOutcome::Error {
                reason: rejected.remove(0).reason,
            }
        } else {
            CallOutcome::PartialFailure {
                failures: rejected,
                artifact: None,
            }
        })
    }

    fn success_patch(&self, _item: &WorkItem<CancellationRow>) -> serde_json::Value {
        json!({ "cancellation": self.operation.as_str() })
    }
}
