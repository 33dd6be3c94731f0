//! Acknowledgment barriers for asynchronous configuration pushes.
//!
//! A [`WaitGroup`] is opened for a single barrier. Every push that must be
//! acknowledged before the barrier passes registers a [`Completion`], which the
//! push channel resolves once the data plane has ACKed or NACKed the resource.
//! [`WaitGroup::wait`] resolves when every registered completion succeeded, when
//! the first failure is reported, or when the governing [`Context`] is cancelled
//! or its deadline passes, whichever comes first.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod context;
mod wait_group;

#[cfg(test)]
mod tests;

pub use self::{
    context::Context,
    wait_group::{Completion, WaitGroup},
};

/// Describes why a pushed resource did not become active.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// The data plane declined the resource (NACK).
    #[error("{resource} rejected: {detail}")]
    Rejected { resource: String, detail: String },

    /// The push channel refused the call before anything was sent.
    #[error("{resource} could not be pushed: {detail}")]
    Failed { resource: String, detail: String },

    /// No acknowledgment arrived before the batch deadline.
    #[error("timed out waiting for acknowledgment")]
    Timeout,

    /// The batch was cancelled, or a completion was abandoned unresolved.
    #[error("cancelled")]
    Cancelled,
}
