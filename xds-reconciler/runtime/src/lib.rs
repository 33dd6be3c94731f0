#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use xds_reconciler_core as core;
pub use xds_reconciler_engine as engine;
pub use xds_reconciler_normalize as normalize;

mod apply;
mod args;
mod batch;
mod log;
pub mod ports;


pub use self::{
    apply::Applier,
    args::Args,
    batch::BatchFile,
    log::{LogFilter, LogFormat},
    ports::PortPool,
};
