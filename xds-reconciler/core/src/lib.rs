//! Core types shared by the xDS reconciler crates.
//!
//! Resources are modeled as the subset of the Envoy v3 API that the reconciler
//! must inspect or rewrite: names, cross-references to other resources, filter
//! chains and xDS config sources. Every other field is carried through verbatim,
//! so the payloads remain opaque to the engine.
//!
//! ```text
//! [ Listener ] -> [ RouteConfiguration ] -> [ Cluster ] -> [ ClusterLoadAssignment ]
//!      \                                        /
//!       `------------> [ Secret ] <------------'
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod error;
pub mod filters;
mod names;
pub mod ports;
pub mod push;
pub mod resource;
mod set;


pub use self::{
    error::Error,
    filters::{NamedFilter, OrderedFilters},
    names::{Qualify, Scope},
    ports::PortAllocator,
    push::{PushChannel, ResultCallback, Revert, RevertList},
    resource::{Resource, ResourceKey, ResourceKind, ResourceRef},
    set::{PortAction, PortCallback, ResourceSet, Summary},
};
pub use xds_reconciler_completion::{Completion, Context, PushError, WaitGroup};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Validates a decoded resource before it is handed to the push channel.
pub trait Validate: Send + Sync {
    fn validate(&self, resource: ResourceRef<'_>) -> anyhow::Result<()>;
}
