#![allow(dead_code)]

use async_trait::async_trait;
use seller_bulk::{
    client::{CallOutcome, ClientError, ItemRejection, RemoteActionClient},
    grouping::CallBatch,
    progress::{ProgressSink, ProgressState},
    work::WorkItem,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// What the scripted client answers for a call, looked up by call label.
#[derive(Debug, Clone)]
pub enum Script {
    Ok,
    Throw(String),
    Refuse(String),
    Reject(Vec<String>),
}

#[derive(Default)]
pub struct ScriptedClient {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, call_label: &str, script: Script) -> Self {
        self.scripts.insert(call_label.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn touched_ids(&self) -> Vec<String> {
        self.calls().into_iter().flat_map(|(_, ids)| ids).collect()
    }
}

#[async_trait]
impl RemoteActionClient for ScriptedClient {
    type Payload = ();

    fn name(&self) -> &str {
        "scripted"
    }

    async fn perform(&self, call: &CallBatch<()>) -> Result<CallOutcome, ClientError> {
        let ids: Vec<String> = call.items.iter().map(|it| it.id().to_string()).collect();
        self.calls.lock().unwrap().push((call.label.clone(), ids));
        tokio::task::yield_now().await;

        match self.scripts.get(&call.label).cloned().unwrap_or(Script::Ok) {
            Script::Ok => Ok(CallOutcome::ok()),
            Script::Throw(msg) => Err(ClientError::Other(msg)),
            Script::Refuse(reason) => Ok(CallOutcome::Error { reason }),
            Script::Reject(ids) => Ok(CallOutcome::PartialFailure {
                failures: ids
                    .into_iter()
                    .map(|id| ItemRejection::new(id, "rejected by marketplace"))
                    .collect(),
                artifact: None,
            }),
        }
    }

    fn success_patch(&self, _item: &WorkItem<()>) -> serde_json::Value {
        serde_json::json!({ "done": true })
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    states: Mutex<Vec<ProgressState>>,
}

impl RecordingProgress {
    pub fn states(&self) -> Vec<ProgressState> {
        self.states.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn update(&self, state: &ProgressState) {
        self.states.lock().unwrap().push(state.clone());
    }
}

/// `n` items of shop `shop`, ids `<shop>-<i>`.
pub fn shop_items(shop: &str, n: usize) -> Vec<WorkItem<()>> {
    (0..n)
        .map(|i| WorkItem::new(format!("{shop}-{i}"), ()).with_attr("shop", shop))
        .collect()
}
