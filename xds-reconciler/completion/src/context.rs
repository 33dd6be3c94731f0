use crate::PushError;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Governs a single batch: it may be cancelled explicitly and may carry a
/// deadline. Clones share the same cancellation state.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

// === impl Context ===

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline(Instant::now() + timeout)
    }

    /// Sets the deadline, keeping the earlier one if a deadline is already set.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Returns a context that is cancelled whenever this one is, but which may
    /// also be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the context is cancelled or its deadline has passed,
    /// returning the corresponding error.
    pub async fn done(&self) -> PushError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => PushError::Cancelled,
                _ = time::sleep_until(deadline) => PushError::Timeout,
            },
            None => {
                self.token.cancelled().await;
                PushError::Cancelled
            }
        }
    }
}
