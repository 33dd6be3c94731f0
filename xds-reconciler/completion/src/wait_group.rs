use crate::{Context, PushError};
use std::{fmt, sync::Arc};
use tokio::sync::watch;

/// A barrier over a dynamic number of pending acknowledgments.
#[derive(Debug)]
pub struct WaitGroup {
    ctx: Context,
    state: Arc<watch::Sender<State>>,
}

/// One pending acknowledgment registered with a [`WaitGroup`].
///
/// Resolving consumes the completion, so each registration is resolved at most
/// once. A completion that is dropped unresolved counts as cancelled so that a
/// push channel losing track of a resource cannot stall the barrier.
pub struct Completion {
    state: Arc<watch::Sender<State>>,
    resolved: bool,
}

#[derive(Debug, Default)]
struct State {
    pending: usize,
    failure: Option<PushError>,
}

// === impl WaitGroup ===

impl WaitGroup {
    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: ctx.clone(),
            state: Arc::new(watch::Sender::new(State::default())),
        }
    }

    /// Registers a new pending acknowledgment.
    pub fn add_completion(&self) -> Completion {
        self.state.send_modify(|state| state.pending += 1);
        Completion {
            state: self.state.clone(),
            resolved: false,
        }
    }

    /// The number of registered completions that have not been resolved.
    pub fn pending(&self) -> usize {
        self.state.borrow().pending
    }

    /// Waits for every registered completion to succeed.
    ///
    /// Returns the first reported failure, or the context's error if it is
    /// cancelled or expires first. A wait group without registrations resolves
    /// immediately. Waiting again after resolution returns the same outcome.
    pub async fn wait(&self) -> Result<(), PushError> {
        let mut rx = self.state.subscribe();
        let resolved = async move {
            match rx.wait_for(State::is_resolved).await {
                Ok(state) => state.outcome(),
                // The sender is owned by this wait group.
                Err(_) => Err(PushError::Cancelled),
            }
        };

        tokio::select! {
            biased;
            res = resolved => res,
            error = self.ctx.done() => Err(error),
        }
    }
}

// === impl Completion ===

impl Completion {
    pub fn complete(mut self, result: Result<(), PushError>) {
        self.resolve(result);
    }

    fn resolve(&mut self, result: Result<(), PushError>) {
        if std::mem::replace(&mut self.resolved, true) {
            return;
        }
        self.state.send_modify(|state| {
            state.pending = state.pending.saturating_sub(1);
            if let Err(error) = result {
                // First failure wins.
                state.failure.get_or_insert(error);
            }
        });
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::debug!("Completion dropped without being resolved");
            self.resolve(Err(PushError::Cancelled));
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

// === impl State ===

impl State {
    fn is_resolved(&self) -> bool {
        self.failure.is_some() || self.pending == 0
    }

    fn outcome(&self) -> Result<(), PushError> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
