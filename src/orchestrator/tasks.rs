//! Typed background-task handle: at most one task of each kind runs at a
//! time (wake+recognize, think, speak, music, news-TTS, news-play).
//!
//! Wraps a [`CancellationToken`] (signal) with a [`JoinHandle`] (join),
//! replacing boolean-flag cancellation with a structured primitive.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Wake,
    Think,
    Speak,
    Music,
    NewsTts,
    NewsPlay,
}

pub struct TaskHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn spawn<F>(future: F) -> Self
    where
        F: FnOnce(CancellationToken) -> tokio::task::JoinHandle<()>,
    {
        let cancel = CancellationToken::new();
        let handle = future(cancel.clone());
        Self { cancel, handle }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels and waits up to `timeout` for the task to exit. Returns
    /// `true` if it exited in time.
    pub async fn cancel_and_join(self, timeout: Duration) -> bool {
        self.cancel.cancel();
        tokio::time::timeout(timeout, self.handle).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_task_observes_cancellation() {
        let task = TaskHandle::spawn(|cancel| {
            tokio::spawn(async move {
                cancel.cancelled().await;
            })
        });
        assert!(!task.is_finished());
        let exited = task.cancel_and_join(Duration::from_secs(1)).await;
        assert!(exited);
    }

    #[tokio::test]
    async fn join_times_out_if_task_ignores_cancellation() {
        let task = TaskHandle::spawn(|_cancel| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
            })
        });
        let exited = task.cancel_and_join(Duration::from_millis(20)).await;
        assert!(!exited);
    }
}
