pub mod cancellation;
pub mod documents;
pub mod flash_sale;
pub mod http;
pub mod types;

use crate::failures::FailureRecord;
use crate::grouping::CallBatch;
use crate::work::WorkItem;
use async_trait::async_trait;

pub use types::{Artifact, CallOutcome, ClientError, ItemRejection};

/// One outbound call covering a [`CallBatch`]. `Err` means the call itself
/// failed (transport, unexpected status); business-rule rejections come back
/// inside `Ok` as [`CallOutcome::PartialFailure`] or [`CallOutcome::Error`].
///
/// Re-invoking with an item that failed before must be safe.
#[async_trait]
pub trait RemoteActionClient: Send + Sync {
    type Payload: Send + Sync;

    fn name(&self) -> &str;

    async fn perform(&self, call: &CallBatch<Self::Payload>) -> Result<CallOutcome, ClientError>;

    /// Patch handed to the update callback for each item that succeeded.
    fn success_patch(&self, _item: &WorkItem<Self::Payload>) -> serde_json::Value {
        serde_json::Value::Object(Default::default())
    }

    /// Called once before a retry run with the failures being retried, so
    /// the client can pick up where those items stopped.
    fn resume(&self, _previous: &[FailureRecord]) {}
}
