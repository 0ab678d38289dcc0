use super::http::{model_key, DashboardApi, FailedModel, Reply};
use super::{CallOutcome, ClientError, ItemRejection, RemoteActionClient};
use crate::grouping::{CallBatch, GroupingStrategy, KeyExtractor};
use crate::work::WorkItem;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const STATUS_ENABLED: u8 = 1;
pub const STATUS_DISABLED: u8 = 0;

/// One model of an item registered in a flash sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRow {
    pub shop_id: u64,
    pub flash_sale_id: u64,
    pub item_id: u64,
    pub model_id: u64,
    #[serde(default)]
    pub status: Option<u8>,
}

impl ModelRow {
    pub fn key(&self) -> String {
        model_key(self.item_id, self.model_id)
    }

    /// Work item id. The same model may sit in several flash sales of a run.
    pub fn id(&self) -> String {
        scoped_id(self.flash_sale_id, &self.key())
    }

    pub fn into_work_item(self) -> WorkItem<ModelRow> {
        let shop_id = self.shop_id.to_string();
        let flash_sale_id = self.flash_sale_id.to_string();
        WorkItem::new(self.id(), self)
            .with_attr("shop_id", shop_id)
            .with_attr("flash_sale_id", flash_sale_id)
    }
}

fn scoped_id(flash_sale_id: u64, model_key: &str) -> String {
    format!("{flash_sale_id}:{model_key}")
}

/// Drop models that already have the target status; toggling them again
/// would only spend rate limit.
pub fn pending(rows: Vec<ModelRow>, activate: bool) -> Vec<ModelRow> {
    let target = if activate { STATUS_ENABLED } else { STATUS_DISABLED };
    rows.into_iter().filter(|r| r.status != Some(target)).collect()
}

/// One update call per shop and flash sale.
pub fn flash_sale_grouping() -> GroupingStrategy {
    GroupingStrategy::by(vec![KeyExtractor::attr("shop_id")])
        .split_by(vec![KeyExtractor::attr("flash_sale_id")])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemUpdate {
    pub item_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_limit: Option<u32>,
    pub models: Vec<ModelStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub model_id: u64,
    pub status: u8,
}

/// Fold models into per-item updates, keeping first-seen item order.
pub fn item_updates<'a>(rows: impl IntoIterator<Item = &'a ModelRow>, activate: bool) -> Vec<ItemUpdate> {
    let status = if activate { STATUS_ENABLED } else { STATUS_DISABLED };
    let mut out: Vec<ItemUpdate> = Vec::new();
    for row in rows {
        let model = ModelStatus {
            model_id: row.model_id,
            status,
        };
        match out.iter_mut().find(|u| u.item_id == row.item_id) {
            Some(existing) => existing.models.push(model),
            None => out.push(ItemUpdate {
                item_id: row.item_id,
                purchase_limit: activate.then_some(0),
                models: vec![model],
            }),
        }
    }
    out
}

pub struct FlashSaleToggleAction {
    api: DashboardApi,
    activate: bool,
}

impl FlashSaleToggleAction {
    pub fn new(api: DashboardApi, activate: bool) -> Self {
        Self { api, activate }
    }
}

#[async_trait]
impl RemoteActionClient for FlashSaleToggleAction {
    type Payload = ModelRow;

    fn name(&self) -> &str {
        if self.activate {
            "activate-flash-sale-models"
        } else {
            "deactivate-flash-sale-models"
        }
    }

    async fn perform(&self, call: &CallBatch<ModelRow>) -> Result<CallOutcome, ClientError> {
        let first = call
            .items
            .first()
            .ok_or_else(|| ClientError::Other("empty call".to_string()))?
            .payload();
        let items = item_updates(call.items.iter().map(|it| it.payload()), self.activate);

        let req = self
            .api
            .request(Method::PUT, "/api/flashsale/items/update")
            .json(&json!({
                "shop_id": first.shop_id,
                "flash_sale_id": first.flash_sale_id,
                "items": items,
            }));

        Ok(match self.api.call(req).await? {
            Reply::Refused(reason) => CallOutcome::Error { reason },
            Reply::Accepted(env) => {
                // One call covers one flash sale.
                let failures: Vec<_> = env
                    .failed_models()
                    .into_iter()
                    .map(FailedModel::into_rejection)
                    .map(|r| ItemRejection {
                        id: scoped_id(first.flash_sale_id, &r.id),
                        ..r
                    })
                    .collect();
                if failures.is_empty() {
                    CallOutcome::ok()
                } else {
                    CallOutcome::PartialFailure {
                        failures,
                        artifact: None,
                    }
                }
            }
        })
    }

    fn success_patch(&self, _item: &WorkItem<ModelRow>) -> serde_json::Value {
        let status = if self.activate { STATUS_ENABLED } else { STATUS_DISABLED };
        json!({ "status": status })
    }
}
