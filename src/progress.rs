use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub total: usize,
    pub processed: usize,
    pub current_group_label: String,
}

impl ProgressState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.total == 0 && self.processed == 0
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.processed == self.total
    }
}

/// Receives every published progress state. Observational only.
pub trait ProgressSink: Send + Sync {
    fn update(&self, state: &ProgressState);
}

/// Publishes progress on a `watch` channel for live observers (a terminal
/// spinner, an SSE endpoint).
pub struct WatchProgress {
    tx: watch::Sender<ProgressState>,
}

impl WatchProgress {
    pub fn new() -> (Self, watch::Receiver<ProgressState>) {
        let (tx, rx) = watch::channel(ProgressState::idle());
        (Self { tx }, rx)
    }
}

impl ProgressSink for WatchProgress {
    fn update(&self, state: &ProgressState) {
        self.tx.send_replace(state.clone());
    }
}

pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn update(&self, state: &ProgressState) {
        if state.is_idle() {
            return;
        }
        info!(
            "progress {}/{} group={}",
            state.processed, state.total, state.current_group_label
        );
    }
}

/// Owned by one executor run; the only writer of its [`ProgressState`].
pub struct ProgressReporter {
    state: ProgressState,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            state: ProgressState::idle(),
            sink,
        }
    }

    pub fn begin(&mut self, total: usize) {
        self.state = ProgressState {
            total,
            processed: 0,
            current_group_label: String::new(),
        };
        self.publish();
    }

    pub fn enter(&mut self, label: &str) {
        self.state.current_group_label = label.to_string();
        self.publish();
    }

    pub fn advance(&mut self, n: usize) {
        self.state.processed = (self.state.processed + n).min(self.state.total);
        self.publish();
    }

    /// Return the indicator to idle once `reset_after` has elapsed. A zero
    /// delay resets synchronously and returns no task.
    pub fn finish(self, reset_after: Duration) -> Option<JoinHandle<()>> {
        if reset_after.is_zero() {
            self.sink.update(&ProgressState::idle());
            return None;
        }
        let sink = self.sink;
        Some(tokio::spawn(async move {
            tokio::time::sleep(reset_after).await;
            sink.update(&ProgressState::idle());
        }))
    }

    fn publish(&self) {
        self.sink.update(&self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_clamped_to_total() {
        let (sink, rx) = WatchProgress::new();
        let mut p = ProgressReporter::new(Arc::new(sink));
        p.begin(3);
        p.advance(2);
        p.advance(5);
        assert_eq!(rx.borrow().processed, 3);
        assert!(rx.borrow().is_complete());
    }

    #[tokio::test]
    async fn finish_resets_after_delay() {
        let (sink, rx) = WatchProgress::new();
        let mut p = ProgressReporter::new(Arc::new(sink));
        p.begin(1);
        p.advance(1);
        let handle = p.finish(Duration::from_millis(20)).expect("delayed reset");
        assert!(rx.borrow().is_complete());
        handle.await.unwrap();
        assert!(rx.borrow().is_idle());
    }
}
