// Execution Events
// Lifecycle notifications emitted synchronously, in order, during a run.
// Fire-and-forget: the engine never waits on the observer.

use crate::config::models::StageStatus;
use crate::cost::CostBreakdown;

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for pipeline lifecycle events
pub type ProgressSender = mpsc::UnboundedSender<PipelineEvent>;

/// Receiver for pipeline lifecycle events
pub type ProgressReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during pipeline execution
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A stage began executing
    StageStarted {
        stage_id: String,
        display_name: String,
        index: usize,
        total: usize,
    },

    /// A stage finished successfully
    StageCompleted {
        stage_id: String,
        status: StageStatus,
        duration: Duration,
        cost: CostBreakdown,
        cached: bool,
    },

    /// A stage's skip condition held
    StageSkipped { stage_id: String, reason: String },

    /// A stage failed; the pipeline halts after this event
    StageFailed { stage_id: String, error: String },

    /// Coarse progress after each stage concludes
    Progress { completed: usize, total: usize },
}

impl PipelineEvent {
    pub fn stage_started(
        stage_id: impl Into<String>,
        display_name: impl Into<String>,
        index: usize,
        total: usize,
    ) -> Self {
        Self::StageStarted {
            stage_id: stage_id.into(),
            display_name: display_name.into(),
            index,
            total,
        }
    }

    pub fn stage_completed(
        stage_id: impl Into<String>,
        status: StageStatus,
        duration: Duration,
        cost: CostBreakdown,
        cached: bool,
    ) -> Self {
        Self::StageCompleted {
            stage_id: stage_id.into(),
            status,
            duration,
            cost,
            cached,
        }
    }

    pub fn stage_skipped(stage_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StageSkipped {
            stage_id: stage_id.into(),
            reason: reason.into(),
        }
    }

    pub fn stage_failed(stage_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::StageFailed {
            stage_id: stage_id.into(),
            error: error.into(),
        }
    }

    pub fn progress(completed: usize, total: usize) -> Self {
        Self::Progress { completed, total }
    }
}

/// Helper trait for sending events, ignoring a disconnected observer
pub trait EventSender {
    fn send_event(&self, event: PipelineEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: PipelineEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: PipelineEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel_ordering() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(PipelineEvent::stage_started("draft", "Draft", 0, 2));
        tx.send_event(PipelineEvent::progress(1, 2));

        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::StageStarted { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::Progress { completed: 1, total: 2 }
        ));
    }

    #[test]
    fn test_absent_observer_is_ignored() {
        let sender: Option<ProgressSender> = None;
        sender.send_event(PipelineEvent::stage_skipped("draft", "condition held"));
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send_event(PipelineEvent::progress(1, 1));
    }
}
