use anyhow::Result;

/// Leases local ports for listeners that are not given an explicit address.
///
/// Leases are keyed by the listener's qualified name. `ack` and `release` are
/// idempotent and must succeed for names that are no longer leased.
pub trait PortAllocator: Send + Sync {
    fn allocate(&self, name: &str, ingress: bool, local_only: bool) -> Result<u16>;

    /// Marks a lease as in use once its listener has been acknowledged.
    fn ack(&self, name: &str) -> Result<()>;

    fn release(&self, name: &str) -> Result<()>;

    /// The port currently leased to a listener, if any.
    fn leased(&self, name: &str) -> Option<u16>;
}

impl<A: PortAllocator + ?Sized> PortAllocator for std::sync::Arc<A> {
    fn allocate(&self, name: &str, ingress: bool, local_only: bool) -> Result<u16> {
        (**self).allocate(name, ingress, local_only)
    }

    fn ack(&self, name: &str) -> Result<()> {
        (**self).ack(name)
    }

    fn release(&self, name: &str) -> Result<()> {
        (**self).release(name)
    }

    fn leased(&self, name: &str) -> Option<u16> {
        (**self).leased(name)
    }
}
