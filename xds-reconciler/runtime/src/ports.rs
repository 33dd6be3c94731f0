use ahash::AHashMap as HashMap;
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::{collections::BTreeSet, num::NonZeroU16, ops::RangeInclusive};
use tracing::{debug, trace};
use xds_reconciler_core::PortAllocator;

/// Leases local proxy ports from a fixed range.
///
/// A name keeps its port until it is released, so allocating again for a name
/// that already holds a lease returns the same port. Released ports are handed
/// out again, lowest first.
#[derive(Debug)]
pub struct PortPool {
    range: RangeInclusive<u16>,
    state: Mutex<State>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Lease {
    pub port: u16,

    /// Set once the listener bound to the port has been acknowledged.
    pub acked: bool,
}

#[derive(Debug, Default)]
struct State {
    leases: HashMap<String, Lease>,
    in_use: BTreeSet<u16>,
}

/// Parses an inclusive port range such as `10000-20000`. A single port is a
/// range of one.
pub fn parse_port_range(s: &str) -> Result<RangeInclusive<u16>> {
    let (floor, ceil) = match s.split_once('-') {
        Some((floor, ceil)) => (floor, ceil),
        None => (s, s),
    };
    let floor = floor.trim().parse::<NonZeroU16>().context("parsing port")?;
    let ceil = ceil.trim().parse::<NonZeroU16>().context("parsing port")?;
    if floor > ceil {
        bail!("Port range must be increasing");
    }
    Ok(u16::from(floor)..=u16::from(ceil))
}

// === impl PortPool ===

impl PortPool {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            range,
            state: Default::default(),
        }
    }

    pub fn range(&self) -> &RangeInclusive<u16> {
        &self.range
    }

    pub fn lease(&self, name: &str) -> Option<Lease> {
        self.state.lock().leases.get(name).copied()
    }

    /// All current leases, ordered by port.
    pub fn leases(&self) -> Vec<(String, Lease)> {
        let mut leases = self
            .state
            .lock()
            .leases
            .iter()
            .map(|(name, lease)| (name.clone(), *lease))
            .collect::<Vec<_>>();
        leases.sort_by_key(|(_, lease)| lease.port);
        leases
    }
}

impl PortAllocator for PortPool {
    fn allocate(&self, name: &str, ingress: bool, local_only: bool) -> Result<u16> {
        let mut state = self.state.lock();
        if let Some(lease) = state.leases.get(name) {
            trace!(%name, port = lease.port, "Reusing lease");
            return Ok(lease.port);
        }

        let Some(port) = self.range.clone().find(|p| !state.in_use.contains(p)) else {
            bail!(
                "no free proxy port in {}-{}",
                self.range.start(),
                self.range.end()
            );
        };
        state.in_use.insert(port);
        state
            .leases
            .insert(name.to_string(), Lease { port, acked: false });
        debug!(%name, port, ingress, local_only, "Leased proxy port");
        Ok(port)
    }

    fn ack(&self, name: &str) -> Result<()> {
        if let Some(lease) = self.state.lock().leases.get_mut(name) {
            lease.acked = true;
            debug!(%name, port = lease.port, "Acknowledged proxy port");
        }
        Ok(())
    }

    fn release(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(lease) = state.leases.remove(name) {
            state.in_use.remove(&lease.port);
            debug!(%name, port = lease.port, "Released proxy port");
        }
        Ok(())
    }

    fn leased(&self, name: &str) -> Option<u16> {
        self.lease(name).map(|lease| lease.port)
    }
}
