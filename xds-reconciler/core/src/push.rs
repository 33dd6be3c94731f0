use crate::{
    resource::{Resource, ResourceKind},
    Completion, PushError,
};
use std::fmt;

/// Invoked with the outcome of a single pushed resource.
pub type ResultCallback = Box<dyn FnOnce(Result<(), PushError>) + Send + 'static>;

/// Distributes resources to the data plane.
///
/// Each call takes effect in the channel's resource cache immediately and
/// returns a [`Revert`] that restores the prior state of that one resource.
/// Acknowledgments arrive later, on arbitrary tasks: when the data plane ACKs
/// or NACKs the change, the channel first invokes `on_result` and then
/// resolves `completion` with the same outcome.
///
/// When a call leaves the cache unchanged, `completion` is resolved
/// successfully right away and `on_result` is never invoked.
pub trait PushChannel: Send + Sync {
    fn upsert(
        &self,
        resource: Resource,
        completion: Option<Completion>,
        on_result: Option<ResultCallback>,
    ) -> Result<Revert, PushError>;

    fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        completion: Option<Completion>,
        on_result: Option<ResultCallback>,
    ) -> Result<Revert, PushError>;
}

/// Undoes exactly one push or delete by restoring the resource's prior value.
pub struct Revert(Box<dyn FnOnce() + Send + 'static>);

/// Reverts accumulated over one batch, in call order.
///
/// Reverts of distinct resources commute. A resource mutated twice in one
/// batch (a listener deleted and re-added on another port) is only restored
/// by undoing its mutations newest first, so the list unwinds in reverse.
#[derive(Default)]
pub struct RevertList(Vec<Revert>);

// === impl Revert ===

impl Revert {
    pub fn new(revert: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(revert))
    }

    /// A revert for a call that changed nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn revert(self) {
        (self.0)()
    }
}

impl fmt::Debug for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Revert").finish()
    }
}

// === impl RevertList ===

impl RevertList {
    pub fn push(&mut self, revert: Revert) {
        self.0.push(revert);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies every revert, newest first, returning how many were applied.
    pub fn revert(self) -> usize {
        let n = self.0.len();
        for revert in self.0.into_iter().rev() {
            revert.revert();
        }
        n
    }
}

impl fmt::Debug for RevertList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevertList")
            .field("len", &self.0.len())
            .finish()
    }
}
