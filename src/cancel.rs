//! Cooperative cancellation for listings and tree assembly.

use std::future::Future;
use tokio::sync::watch;

use crate::client::RedditClientError;

/// A cloneable cancellation signal. Every clone observes the same flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: std::sync::Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: std::sync::Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        // send_replace never fails, even with no receivers left.
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives in `self`, so changed() cannot report a closed
        // channel while we wait.
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }

    /// Run `fut` unless cancellation fires first.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T, RedditClientError>
    where
        F: Future<Output = Result<T, RedditClientError>>,
    {
        if self.is_cancelled() {
            return Err(RedditClientError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(RedditClientError::Cancelled),
            res = fut => res,
        }
    }

    /// Sleep for `duration`, returning early with `Cancelled`.
    pub async fn sleep(&self, duration: std::time::Duration) -> Result<(), RedditClientError> {
        self.guard(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
