use crate::NormalizeOptions;
use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    sync::Arc,
};
use tracing::{debug, warn};
use xds_reconciler_core::{
    resource::{AdditionalAddress, Address},
    Error, PortAllocator, PortCallback, ResourceSet, Result,
};

/// Whether a resource set describes resources being installed or removed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// The set is being installed, or is the new side of an update. Leases
    /// are committed once the listener is acknowledged.
    Added,

    /// The set is being removed, or is the old side of an update. Leases are
    /// released once the listener's deletion is acknowledged.
    Removed,
}

/// Binds listeners without an explicit address to leased local ports.
#[derive(Clone)]
pub struct PortBinder {
    allocator: Arc<dyn PortAllocator>,
    ipv4: bool,
    ipv6: bool,
}

// === impl PortBinder ===

impl PortBinder {
    pub fn new(allocator: Arc<dyn PortAllocator>, options: &NormalizeOptions) -> Self {
        Self {
            allocator,
            ipv4: options.ipv4,
            ipv6: options.ipv6,
        }
    }

    /// Leases a port for every listener that needs a local address, and
    /// registers the lease's lifecycle callback on the set.
    ///
    /// All leases are obtained before any listener is modified. On error the
    /// set is left as it was and the leases taken by this call are released.
    /// When installing, a lease taken by this call is also released if the
    /// batch is aborted. Leases the allocator already held for these
    /// listeners are never released here.
    pub fn bind(&self, set: &mut ResourceSet, lifecycle: Lifecycle) -> Result<()> {
        let mut leases = Vec::new();
        let mut fresh = Vec::new();
        for (idx, listener) in set.listeners.iter().enumerate() {
            if !listener.needs_local_address() {
                continue;
            }
            if self.allocator.leased(&listener.name).is_none() {
                fresh.push(idx);
            }
            let res = if self.ipv4 || self.ipv6 {
                self.allocate(&listener.name)
            } else {
                Err(Error::PortAllocation {
                    listener: listener.name.clone(),
                    reason: "no address family is enabled".to_string(),
                })
            };
            match res {
                Ok(port) => leases.push((idx, port)),
                Err(error) => {
                    for idx in fresh {
                        self.release(&set.listeners[idx].name);
                    }
                    return Err(error);
                }
            }
        }

        for (idx, port) in leases {
            let fresh = fresh.contains(&idx);
            let listener = &mut set.listeners[idx];
            let (address, additional) = self.local_addresses(port);
            listener.address = Some(address);
            listener.additional_addresses = additional;
            debug!(
                listener = %listener.name,
                port,
                fresh,
                ?lifecycle,
                "Bound listener to local port"
            );

            let name = listener.name.clone();
            let allocator = self.allocator.clone();
            let callback = match lifecycle {
                Lifecycle::Added if fresh => {
                    let ack = name.clone();
                    let release = allocator.clone();
                    PortCallback::commit(move || allocator.ack(&ack))
                        .on_abort(move || release.release(&name))
                }
                Lifecycle::Added => PortCallback::commit(move || allocator.ack(&name)),
                Lifecycle::Removed => PortCallback::release(move || allocator.release(&name)),
            };
            let name = listener.name.clone();
            set.set_port_callback(name, callback);
        }
        Ok(())
    }

    fn release(&self, listener: &str) {
        match self.allocator.release(listener) {
            Ok(()) => debug!(%listener, "Released unused lease"),
            Err(error) => {
                let error = format!("{error:#}");
                warn!(%listener, %error, "Failed to release lease");
            }
        }
    }

    fn allocate(&self, listener: &str) -> Result<u16> {
        match self.allocator.allocate(listener, false, true) {
            Ok(0) => Err(Error::PortAllocation {
                listener: listener.to_string(),
                reason: "allocator returned port 0".to_string(),
            }),
            Ok(port) => Ok(port),
            Err(error) => Err(Error::PortAllocation {
                listener: listener.to_string(),
                reason: format!("{error:#}"),
            }),
        }
    }

    /// The loopback address of the first enabled family is the listener's
    /// primary address; the other, if enabled, is an additional address.
    fn local_addresses(&self, port: u16) -> (Address, Vec<AdditionalAddress>) {
        let primary = if self.ipv4 {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        };
        let additional = if self.ipv4 && self.ipv6 {
            vec![AdditionalAddress {
                address: Address::tcp(IpAddr::V6(Ipv6Addr::LOCALHOST), port),
                ..Default::default()
            }]
        } else {
            vec![]
        };
        (Address::tcp(primary, port), additional)
    }
}

impl std::fmt::Debug for PortBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortBinder")
            .field("ipv4", &self.ipv4)
            .field("ipv6", &self.ipv6)
            .finish_non_exhaustive()
    }
}
