use crate::resource::{
    Cluster, ClusterLoadAssignment, Listener, Resource, ResourceKind, ResourceRef,
    RouteConfiguration, Secret,
};
use ahash::AHashMap as HashMap;
use std::fmt;

/// The canonical form of one configuration batch.
///
/// Names are unique per resource type. The set also owns the port lifecycle
/// callbacks for the listeners whose addresses were leased while building it;
/// each callback is taken out of the set before it is invoked, so it runs at
/// most once.
#[derive(Default)]
pub struct ResourceSet {
    pub listeners: Vec<Listener>,
    pub routes: Vec<RouteConfiguration>,
    pub clusters: Vec<Cluster>,
    pub endpoints: Vec<ClusterLoadAssignment>,
    pub secrets: Vec<Secret>,

    port_callbacks: HashMap<String, PortCallback>,
}

/// What a listener's port lease callback does when it runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortAction {
    /// Confirms a lease once the listener using it has been acknowledged.
    Commit,

    /// Returns a lease once the listener using it has been removed.
    Release,
}

pub struct PortCallback {
    action: PortAction,
    callback: Callback,
    abort: Option<Callback>,
}

type Callback = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Per-type resource counts, formatted for logs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub listeners: usize,
    pub routes: usize,
    pub clusters: usize,
    pub endpoints: usize,
    pub secrets: usize,
}

// === impl ResourceSet ===

impl ResourceSet {
    pub fn insert(&mut self, resource: Resource) {
        match resource {
            Resource::Listener(r) => self.listeners.push(r),
            Resource::Route(r) => self.routes.push(r),
            Resource::Cluster(r) => self.clusters.push(r),
            Resource::Endpoint(r) => self.endpoints.push(r),
            Resource::Secret(r) => self.secrets.push(r),
        }
    }

    pub fn len(&self) -> usize {
        let Summary {
            listeners,
            routes,
            clusters,
            endpoints,
            secrets,
        } = self.summary();
        listeners + routes + clusters + endpoints + secrets
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> Summary {
        Summary {
            listeners: self.listeners.len(),
            routes: self.routes.len(),
            clusters: self.clusters.len(),
            endpoints: self.endpoints.len(),
            secrets: self.secrets.len(),
        }
    }

    /// Iterates over all resources, grouped by type.
    pub fn iter(&self) -> impl Iterator<Item = ResourceRef<'_>> + '_ {
        self.listeners
            .iter()
            .map(ResourceRef::Listener)
            .chain(self.routes.iter().map(ResourceRef::Route))
            .chain(self.clusters.iter().map(ResourceRef::Cluster))
            .chain(self.endpoints.iter().map(ResourceRef::Endpoint))
            .chain(self.secrets.iter().map(ResourceRef::Secret))
    }

    /// Iterates over the resources of a single type in insertion order.
    pub fn iter_kind(&self, kind: ResourceKind) -> impl Iterator<Item = ResourceRef<'_>> + '_ {
        self.iter().filter(move |r| r.kind() == kind)
    }

    pub fn names(&self, kind: ResourceKind) -> impl Iterator<Item = &str> + '_ {
        self.iter_kind(kind).map(|r| r.name())
    }

    pub fn get(&self, kind: ResourceKind, name: &str) -> Option<ResourceRef<'_>> {
        self.iter_kind(kind).find(|r| r.name() == name)
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.get(kind, name).is_some()
    }

    pub fn listener(&self, name: &str) -> Option<&Listener> {
        self.listeners.iter().find(|l| l.name == name)
    }

    /// Removes a resource from the set, preserving the order of the rest.
    pub fn take(&mut self, kind: ResourceKind, name: &str) -> Option<Resource> {
        fn remove<T>(items: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> Option<T> {
            let idx = items.iter().position(matches)?;
            Some(items.remove(idx))
        }

        match kind {
            ResourceKind::Listener => {
                remove(&mut self.listeners, |r| r.name == name).map(Resource::Listener)
            }
            ResourceKind::Route => {
                remove(&mut self.routes, |r| r.name == name).map(Resource::Route)
            }
            ResourceKind::Cluster => {
                remove(&mut self.clusters, |r| r.name == name).map(Resource::Cluster)
            }
            ResourceKind::Endpoint => {
                remove(&mut self.endpoints, |r| r.cluster_name == name).map(Resource::Endpoint)
            }
            ResourceKind::Secret => {
                remove(&mut self.secrets, |r| r.name == name).map(Resource::Secret)
            }
        }
    }

    /// Returns true if updating from `self` to `new` adds or removes a
    /// listener.
    pub fn listeners_added_or_deleted(&self, new: &Self) -> bool {
        let added = new.listeners.iter().any(|l| self.listener(&l.name).is_none());
        let removed = self.listeners.iter().any(|l| new.listener(&l.name).is_none());
        added || removed
    }

    pub fn set_port_callback(&mut self, listener: impl ToString, callback: PortCallback) {
        self.port_callbacks.insert(listener.to_string(), callback);
    }

    pub fn take_port_callback(&mut self, listener: &str) -> Option<PortCallback> {
        self.port_callbacks.remove(listener)
    }

    /// Removes every port callback still held by the set.
    pub fn take_port_callbacks(&mut self) -> impl Iterator<Item = (String, PortCallback)> + '_ {
        self.port_callbacks.drain()
    }

    pub fn port_callback(&self, listener: &str) -> Option<PortAction> {
        self.port_callbacks.get(listener).map(PortCallback::action)
    }
}

impl fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut callbacks = self.port_callbacks.keys().collect::<Vec<_>>();
        callbacks.sort();
        f.debug_struct("ResourceSet")
            .field("listeners", &self.listeners)
            .field("routes", &self.routes)
            .field("clusters", &self.clusters)
            .field("endpoints", &self.endpoints)
            .field("secrets", &self.secrets)
            .field("port_callbacks", &callbacks)
            .finish()
    }
}

impl FromIterator<Resource> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut set = Self::default();
        for resource in iter {
            set.insert(resource);
        }
        set
    }
}

// === impl PortCallback ===

impl PortCallback {
    pub fn commit(callback: impl FnOnce() -> anyhow::Result<()> + Send + 'static) -> Self {
        Self {
            action: PortAction::Commit,
            callback: Box::new(callback),
            abort: None,
        }
    }

    pub fn release(callback: impl FnOnce() -> anyhow::Result<()> + Send + 'static) -> Self {
        Self {
            action: PortAction::Release,
            callback: Box::new(callback),
            abort: None,
        }
    }

    /// Sets what runs instead of the callback when the batch holding it is
    /// rolled back.
    pub fn on_abort(self, abort: impl FnOnce() -> anyhow::Result<()> + Send + 'static) -> Self {
        Self {
            abort: Some(Box::new(abort)),
            ..self
        }
    }

    pub fn action(&self) -> PortAction {
        self.action
    }

    pub fn invoke(self) -> anyhow::Result<()> {
        (self.callback)()
    }

    pub fn abort(self) -> anyhow::Result<()> {
        match self.abort {
            Some(abort) => abort(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PortCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortCallback")
            .field("action", &self.action)
            .field("abortable", &self.abort.is_some())
            .finish_non_exhaustive()
    }
}

// === impl Summary ===

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = [
            (self.listeners, "listeners"),
            (self.routes, "routes"),
            (self.clusters, "clusters"),
            (self.endpoints, "endpoints"),
            (self.secrets, "secrets"),
        ];
        let mut sep = "";
        let mut empty = true;
        for (n, what) in counts.into_iter().filter(|(n, _)| *n > 0) {
            write!(f, "{sep}{n} {what}")?;
            sep = ", ";
            empty = false;
        }
        if empty {
            f.write_str("no resources")?;
        }
        Ok(())
    }
}
