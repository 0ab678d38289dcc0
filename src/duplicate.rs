//! Copy one flash sale into other time slots.
//!
//! Each target slot is a work item handled by one call that creates the new
//! flash sale and then registers the source's items in it. Step events are
//! streamed to an optional channel so a caller can render them live.

use crate::client::http::{DashboardApi, Reply};
use crate::client::{CallOutcome, ClientError, ItemRejection, RemoteActionClient};
use crate::failures::FailureRecord;
use crate::grouping::{CallBatch, GroupingStrategy, KeyExtractor};
use crate::work::WorkItem;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    pub item_id: u64,
    #[serde(default)]
    pub item_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceModel {
    pub item_id: u64,
    pub model_id: u64,
    #[serde(default)]
    pub input_promotion_price: f64,
    #[serde(default)]
    pub campaign_stock: u64,
}

/// Items and models of the flash sale being copied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlashSaleSource {
    #[serde(default)]
    pub items: Vec<SourceItem>,
    #[serde(default)]
    pub models: Vec<SourceModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRegistration {
    pub item_id: u64,
    pub purchase_limit: u32,
    pub models: Vec<ModelRegistration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRegistration {
    pub model_id: u64,
    pub input_promo_price: f64,
    pub stock: u64,
}

impl FlashSaleSource {
    /// Registrations for every item with at least one stocked model. Models
    /// without campaign stock are left out.
    pub fn registrations(&self) -> Vec<ItemRegistration> {
        self.items
            .iter()
            .filter_map(|item| {
                let models: Vec<_> = self
                    .models
                    .iter()
                    .filter(|m| m.item_id == item.item_id && m.campaign_stock > 0)
                    .map(|m| ModelRegistration {
                        model_id: m.model_id,
                        input_promo_price: m.input_promotion_price,
                        stock: m.campaign_stock,
                    })
                    .collect();
                (!models.is_empty()).then_some(ItemRegistration {
                    item_id: item.item_id,
                    purchase_limit: 0,
                    models,
                })
            })
            .collect()
    }
}

pub async fn fetch_source(
    api: &DashboardApi,
    shop_id: u64,
    flash_sale_id: u64,
) -> Result<FlashSaleSource, ClientError> {
    let req = api.request(Method::GET, "/api/flashsale/detail_items").query(&[
        ("shop_id", shop_id.to_string()),
        ("flash_sale_id", flash_sale_id.to_string()),
    ]);
    match api.call(req).await? {
        Reply::Refused(reason) => Err(ClientError::Other(format!(
            "cannot load flash sale #{flash_sale_id}: {reason}"
        ))),
        Reply::Accepted(env) => {
            serde_json::from_value(env.data).map_err(|e| ClientError::Decode(e.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeslotRow {
    pub shop_id: u64,
    pub timeslot_id: u64,
}

impl TimeslotRow {
    pub fn into_work_item(self) -> WorkItem<TimeslotRow> {
        let shop_id = self.shop_id.to_string();
        WorkItem::new(self.timeslot_id.to_string(), self).with_attr("shop_id", shop_id)
    }
}

/// One call per time slot.
pub fn duplicate_grouping() -> GroupingStrategy {
    GroupingStrategy::by(vec![KeyExtractor::attr("shop_id")]).split_by(vec![KeyExtractor::ItemId])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicationStep {
    Create,
    Created,
    Register,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicationEvent {
    pub timeslot_id: u64,
    pub step: DuplicationStep,
    pub flash_sale_id: Option<u64>,
    pub total_items: usize,
    pub successful_items: usize,
    pub status: String,
}

/// Why a slot failed, and the flash sale it already got if creation went
/// through.
struct SlotFailure {
    reason: String,
    flash_sale_id: Option<u64>,
}

impl SlotFailure {
    fn before_create(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            flash_sale_id: None,
        }
    }

    fn after_create(flash_sale_id: u64, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            flash_sale_id: Some(flash_sale_id),
        }
    }
}

pub struct DuplicateAction {
    api: DashboardApi,
    source_items: usize,
    registrations: Vec<ItemRegistration>,
    events: Option<UnboundedSender<DuplicationEvent>>,
    created: Mutex<HashMap<u64, u64>>,
}

impl DuplicateAction {
    pub fn new(api: DashboardApi, source: &FlashSaleSource) -> Self {
        Self {
            api,
            source_items: source.items.len(),
            registrations: source.registrations(),
            events: None,
            created: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_events(mut self, tx: UnboundedSender<DuplicationEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn registrations(&self) -> &[ItemRegistration] {
        &self.registrations
    }

    /// Flash sale already created for `timeslot_id`, either by this action
    /// or by the run being retried.
    pub fn created_for(&self, timeslot_id: u64) -> Option<u64> {
        match self.created.lock() {
            Ok(m) => m.get(&timeslot_id).copied(),
            Err(poisoned) => poisoned.into_inner().get(&timeslot_id).copied(),
        }
    }

    fn remember(&self, timeslot_id: u64, flash_sale_id: u64) {
        match self.created.lock() {
            Ok(mut m) => m.insert(timeslot_id, flash_sale_id),
            Err(poisoned) => poisoned.into_inner().insert(timeslot_id, flash_sale_id),
        };
    }

    fn emit(
        &self,
        slot: &TimeslotRow,
        step: DuplicationStep,
        flash_sale_id: Option<u64>,
        (total_items, successful_items): (usize, usize),
        status: String,
    ) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(DuplicationEvent {
                timeslot_id: slot.timeslot_id,
                step,
                flash_sale_id,
                total_items,
                successful_items,
                status,
            });
        }
    }

    async fn create(&self, slot: &TimeslotRow) -> Result<u64, SlotFailure> {
        self.emit(
            slot,
            DuplicationStep::Create,
            None,
            (self.source_items, 0),
            "creating flash sale".into(),
        );

        let req = self
            .api
            .request(Method::POST, "/api/flashsale/create")
            .json(&json!({ "shop_id": slot.shop_id, "timeslot_id": slot.timeslot_id }));
        let env = match self.api.call(req).await {
            Err(err) => return Err(SlotFailure::before_create(format!("create failed: {err}"))),
            Ok(Reply::Refused(reason)) => {
                return Err(SlotFailure::before_create(format!("create failed: {reason}")));
            }
            Ok(Reply::Accepted(env)) => env,
        };
        let Some(flash_sale_id) = env.data.get("flash_sale_id").and_then(|v| v.as_u64()) else {
            return Err(SlotFailure::before_create(
                "create answered without flash_sale_id",
            ));
        };
        self.remember(slot.timeslot_id, flash_sale_id);
        info!("timeslot {} -> flash sale #{}", slot.timeslot_id, flash_sale_id);
        self.emit(
            slot,
            DuplicationStep::Created,
            Some(flash_sale_id),
            (self.source_items, 0),
            format!("flash sale #{flash_sale_id} created"),
        );
        Ok(flash_sale_id)
    }

    async fn register(&self, slot: &TimeslotRow, flash_sale_id: u64) -> Result<(), SlotFailure> {
        self.emit(
            slot,
            DuplicationStep::Register,
            Some(flash_sale_id),
            (self.source_items, 0),
            format!("registering items into #{flash_sale_id}"),
        );
        let req = self
            .api
            .request(Method::POST, "/api/flashsale/items/add")
            .json(&json!({
                "shop_id": slot.shop_id,
                "flash_sale_id": flash_sale_id,
                "items": self.registrations,
            }));
        let not_registered =
            |reason: String| format!("flash sale #{flash_sale_id} created but items not registered: {reason}");
        let env = match self.api.call(req).await {
            Err(err) => {
                return Err(SlotFailure::after_create(flash_sale_id, not_registered(err.to_string())));
            }
            Ok(Reply::Refused(reason)) => {
                return Err(SlotFailure::after_create(flash_sale_id, not_registered(reason)));
            }
            Ok(Reply::Accepted(env)) => env,
        };

        let failed_items = {
            let mut ids: Vec<u64> = env.failed_models().iter().map(|f| f.item_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids.len()
        };
        if failed_items > 0 {
            warn!(
                "flash sale #{} rejected {} of {} items",
                flash_sale_id,
                failed_items,
                self.registrations.len()
            );
        }
        let registered = self.registrations.len().saturating_sub(failed_items);
        self.emit(
            slot,
            DuplicationStep::Complete,
            Some(flash_sale_id),
            (self.registrations.len(), registered),
            format!("registered {registered} items into #{flash_sale_id}"),
        );
        Ok(())
    }

    /// Create the slot's flash sale unless an earlier attempt already did,
    /// then register the items.
    async fn duplicate_into(&self, slot: &TimeslotRow) -> Result<(), SlotFailure> {
        let flash_sale_id = match self.created_for(slot.timeslot_id) {
            Some(id) => {
                info!("timeslot {} reuses flash sale #{}", slot.timeslot_id, id);
                id
            }
            None => self.create(slot).await?,
        };
        self.register(slot, flash_sale_id).await
    }
}

#[async_trait]
impl RemoteActionClient for DuplicateAction {
    type Payload = TimeslotRow;

    fn name(&self) -> &str {
        "duplicate-flash-sale"
    }

    async fn perform(&self, call: &CallBatch<TimeslotRow>) -> Result<CallOutcome, ClientError> {
        let mut rejected = Vec::new();
        for it in &call.items {
            if let Err(failure) = self.duplicate_into(it.payload()).await {
                let mut rejection = ItemRejection::new(it.id(), failure.reason);
                if let Some(id) = failure.flash_sale_id {
                    rejection = rejection.with_detail(json!({ "flash_sale_id": id }));
                }
                rejected.push(rejection);
            }
        }
        Ok(if rejected.is_empty() {
            CallOutcome::ok()
        } else {
            CallOutcome::PartialFailure {
                failures: rejected,
                artifact: None,
            }
        })
    }

    fn success_patch(&self, item: &WorkItem<TimeslotRow>) -> serde_json::Value {
        match self.created_for(item.payload().timeslot_id) {
            Some(id) => json!({ "flash_sale_id": id }),
            None => json!({}),
        }
    }

    fn resume(&self, previous: &[FailureRecord]) {
        for f in previous {
            let timeslot = f.id.parse::<u64>().ok();
            let flash_sale = f
                .detail
                .as_ref()
                .and_then(|d| d.get("flash_sale_id"))
                .and_then(|v| v.as_u64());
            if let (Some(timeslot), Some(flash_sale)) = (timeslot, flash_sale) {
                self.remember(timeslot, flash_sale);
            }
        }
    }
}
