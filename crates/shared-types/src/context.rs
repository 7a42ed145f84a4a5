//! # Cancellation Context
//!
//! Every suspending chain operation (block fetch, ticket wait, queue send,
//! state sync) takes a `&Context`. A context fires when its cancel handle is
//! triggered or its deadline passes, whichever comes first.
//!
//! ```text
//! let (ctx, cancel) = Context::with_cancel();
//! let ctx = ctx.with_timeout(Duration::from_secs(10));
//! tokio::select! {
//!     _ = ctx.cancelled() => ...,
//!     block = fetch => ...,
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context stopped.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ContextError {
    /// The cancel handle was triggered.
    #[error("context cancelled")]
    Cancelled,
    /// The deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal plus optional deadline.
#[derive(Clone, Debug)]
pub struct Context {
    cancel: watch::Receiver<bool>,
    // Keeps the channel open so `changed()` never reports a closed sender.
    _sender: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

/// Triggers cancellation of every context derived from it.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Fire the cancel signal. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Context {
    /// A context that never fires.
    pub fn background() -> Self {
        let (sender, cancel) = watch::channel(false);
        Self {
            cancel,
            _sender: Arc::new(sender),
            deadline: None,
        }
    }

    /// A context paired with a handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (sender, cancel) = watch::channel(false);
        let sender = Arc::new(sender);
        let ctx = Self {
            cancel,
            _sender: sender.clone(),
            deadline: None,
        };
        (ctx, CancelHandle { sender })
    }

    /// Derive a context sharing this cancel signal with a tighter deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancel: self.cancel.clone(),
            _sender: self._sender.clone(),
            deadline: Some(deadline),
        }
    }

    /// Deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check.
    pub fn err(&self) -> Option<ContextError> {
        if *self.cancel.borrow() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// True once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves when the context fires and reports why.
    pub async fn cancelled(&self) -> ContextError {
        let mut rx = self.cancel.clone();
        let signal = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = signal => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                signal.await;
                ContextError::Cancelled
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn test_cancel_handle_fires() {
        let (ctx, cancel) = Context::with_cancel();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        cancel.cancel();
        assert_eq!(task.await.unwrap(), ContextError::Cancelled);
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_done());

        let reason = ctx.cancelled().await;
        assert_eq!(reason, ContextError::DeadlineExceeded);
        assert!(ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_keeps_tighter_deadline() {
        let tight = Context::background().with_timeout(Duration::from_millis(10));
        let loose = tight.with_timeout(Duration::from_secs(60));
        assert_eq!(tight.deadline(), loose.deadline());
    }

    #[tokio::test]
    async fn test_derived_context_shares_cancel() {
        let (ctx, cancel) = Context::with_cancel();
        let derived = ctx.with_timeout(Duration::from_secs(60));
        cancel.cancel();
        assert_eq!(derived.err(), Some(ContextError::Cancelled));
    }
}
