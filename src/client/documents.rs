use super::http::DashboardApi;
use super::{CallOutcome, ClientError, RemoteActionClient};
use crate::grouping::{CallBatch, GroupingStrategy, KeyExtractor};
use crate::work::WorkItem;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// An order row as the dashboard's order table exports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRow {
    pub order_sn: String,
    pub shop_id: u64,
    #[serde(default)]
    pub shop_name: Option<String>,
    #[serde(default)]
    pub shipping_carrier: Option<String>,
    #[serde(default)]
    pub package_number: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

impl OrderRow {
    pub fn into_work_item(self) -> WorkItem<OrderRow> {
        let shop_id = self.shop_id.to_string();
        let shop_name = self.shop_name.clone().unwrap_or_else(|| shop_id.clone());
        let carrier = self.shipping_carrier.clone().unwrap_or_default();
        WorkItem::new(self.order_sn.clone(), self)
            .with_attr("shop_id", shop_id)
            .with_attr("shop_name", shop_name)
            .with_attr("carrier", carrier)
    }
}

/// Shipping labels are merged per shop and generated per carrier.
pub fn document_grouping() -> GroupingStrategy {
    GroupingStrategy::by(vec![KeyExtractor::attr("shop_id")])
        .split_by(vec![KeyExtractor::attr("carrier")])
        .labelled_by("shop_name")
}

pub struct ShippingDocumentAction {
    api: DashboardApi,
    document_type: String,
}

impl ShippingDocumentAction {
    pub fn new(api: DashboardApi, document_type: impl Into<String>) -> Self {
        Self {
            api,
            document_type: document_type.into(),
        }
    }
}

#[async_trait]
impl RemoteActionClient for ShippingDocumentAction {
    type Payload = OrderRow;

    fn name(&self) -> &str {
        "print-documents"
    }

    async fn perform(&self, call: &CallBatch<OrderRow>) -> Result<CallOutcome, ClientError> {
        let first = call
            .items
            .first()
            .ok_or_else(|| ClientError::Other("empty call".to_string()))?
            .payload();
        let order_sns = call
            .items
            .iter()
            .map(|it| it.payload().order_sn.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let req = self.api.request(Method::GET, "/api/shipping-document/view").query(&[
            ("shopId", first.shop_id.to_string()),
            ("orderSns", order_sns),
            ("carrier", first.shipping_carrier.clone().unwrap_or_default()),
            ("documentType", self.document_type.clone()),
        ]);

        Ok(match self.api.download(req).await? {
            Ok(artifact) => CallOutcome::Success {
                artifact: Some(artifact),
            },
            Err(reason) => CallOutcome::Error { reason },
        })
    }

    fn success_patch(&self, _item: &WorkItem<OrderRow>) -> serde_json::Value {
        json!({ "is_printed": true })
    }
}
