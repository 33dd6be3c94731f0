//! Reconciles the data plane's resources with a desired resource set.
//!
//! A [`Plan`] orders the deletions and pushes between two resource sets and
//! places acknowledgment barriers between them. The [`Reconciler`] executes a
//! plan against a [`PushChannel`](xds_reconciler_core::PushChannel): when any
//! barrier fails, every mutation issued by the batch is reverted and the
//! failure is returned.
//!
//! ```text
//! deletes:  listeners -> routes -> clusters -> endpoints -> secrets
//!           [await deletes, if a listener changes port]
//! upserts:  secrets -> endpoints -> clusters -> routes
//!           [await clusters, if listeners follow]
//!           listeners
//!           [await listeners]
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cache;
mod metrics;
pub mod plan;
mod reconciler;

#[cfg(test)]
mod tests;

pub use self::{
    cache::{AckMode, Cache},
    metrics::ReconcilerMetrics,
    plan::{Barrier, Plan, Step},
    reconciler::{Operation, Phase, Reconciler},
};
