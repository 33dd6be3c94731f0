use std::fmt;
use xds_reconciler_core::{resource::Listener, ResourceKey, ResourceKind, ResourceSet};

/// An acknowledgment barrier within a batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Barrier {
    /// Listener deletions that must complete before a replacement listener
    /// may bind the same port.
    Deletes,

    /// Cluster pushes that must be acknowledged before any listener
    /// referencing them is pushed.
    Clusters,

    /// Listener pushes and deletions that decide the batch's outcome.
    Listeners,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Delete {
        key: ResourceKey,
        barrier: Option<Barrier>,
    },
    Upsert {
        key: ResourceKey,
        barrier: Option<Barrier>,
    },
    Await(Barrier),
}

/// The ordered operations that move the data plane from one resource set to
/// another.
///
/// Deletions run dependents first (listeners, routes, clusters, endpoints,
/// secrets) and additions dependencies first, in the reverse order. Every
/// resource of the new set is pushed, whether or not it changed; the push
/// channel skips identical content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<Step>,
    retained_listeners: Vec<String>,
}

const DELETE_ORDER: [ResourceKind; 5] = [
    ResourceKind::Listener,
    ResourceKind::Route,
    ResourceKind::Cluster,
    ResourceKind::Endpoint,
    ResourceKind::Secret,
];

// === impl Barrier ===

impl Barrier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deletes => "deletes",
            Self::Clusters => "clusters",
            Self::Listeners => "listeners",
        }
    }
}

impl fmt::Display for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Step ===

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (op, key, barrier) = match self {
            Self::Await(barrier) => return write!(f, "await {barrier}"),
            Self::Delete { key, barrier } => ("delete", key, barrier),
            Self::Upsert { key, barrier } => ("upsert", key, barrier),
        };
        write!(f, "{op} {key}")?;
        if let Some(barrier) = barrier {
            write!(f, " [{barrier}]")?;
        }
        Ok(())
    }
}

// === impl Plan ===

impl Plan {
    pub fn new(old: &ResourceSet, new: &ResourceSet) -> Self {
        let mut steps = Vec::new();

        // A listener whose port changes cannot be updated in place: its old
        // incarnation must be gone before the new one binds.
        let mut retained_listeners = Vec::new();
        let mut deleted_listeners = Vec::new();
        let mut replaced = false;
        for listener in &old.listeners {
            match new.listener(&listener.name) {
                Some(update) if port_changed(listener, update) => {
                    replaced = true;
                    deleted_listeners.push(listener.name.as_str());
                }
                Some(_) => retained_listeners.push(listener.name.clone()),
                None => deleted_listeners.push(listener.name.as_str()),
            }
        }

        let listener_deletes = if replaced {
            Barrier::Deletes
        } else {
            Barrier::Listeners
        };
        for name in deleted_listeners {
            steps.push(Step::Delete {
                key: ResourceKey::new(ResourceKind::Listener, name),
                barrier: Some(listener_deletes),
            });
        }
        for kind in &DELETE_ORDER[1..] {
            for name in old.names(*kind).filter(|n| !new.contains(*kind, n)) {
                steps.push(Step::Delete {
                    key: ResourceKey::new(*kind, name),
                    barrier: None,
                });
            }
        }
        if replaced {
            steps.push(Step::Await(Barrier::Deletes));
        }

        // Clusters are only acknowledged reliably while a listener references
        // them, so they are awaited only when listeners follow.
        let adds_listeners = !new.listeners.is_empty();
        for kind in DELETE_ORDER[1..].iter().rev() {
            let barrier = (*kind == ResourceKind::Cluster && adds_listeners)
                .then_some(Barrier::Clusters);
            for name in new.names(*kind) {
                steps.push(Step::Upsert {
                    key: ResourceKey::new(*kind, name),
                    barrier,
                });
            }
        }
        if adds_listeners && !new.clusters.is_empty() {
            steps.push(Step::Await(Barrier::Clusters));
        }
        for name in new.names(ResourceKind::Listener) {
            steps.push(Step::Upsert {
                key: ResourceKey::new(ResourceKind::Listener, name),
                barrier: Some(Barrier::Listeners),
            });
        }

        let awaits_listeners = steps.iter().any(|step| match step {
            Step::Delete { barrier, .. } | Step::Upsert { barrier, .. } => {
                *barrier == Some(Barrier::Listeners)
            }
            Step::Await(_) => false,
        });
        if awaits_listeners {
            steps.push(Step::Await(Barrier::Listeners));
        }

        Self {
            steps,
            retained_listeners,
        }
    }

    pub fn install(new: &ResourceSet) -> Self {
        Self::new(&ResourceSet::default(), new)
    }

    pub fn uninstall(old: &ResourceSet) -> Self {
        Self::new(old, &ResourceSet::default())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn deletes(&self) -> impl Iterator<Item = &ResourceKey> + '_ {
        self.steps.iter().filter_map(|step| match step {
            Step::Delete { key, .. } => Some(key),
            _ => None,
        })
    }

    pub fn upserts(&self) -> impl Iterator<Item = &ResourceKey> + '_ {
        self.steps.iter().filter_map(|step| match step {
            Step::Upsert { key, .. } => Some(key),
            _ => None,
        })
    }

    /// Whether additions wait for listener deletions to be acknowledged.
    pub fn waits_for_delete(&self) -> bool {
        self.steps.contains(&Step::Await(Barrier::Deletes))
    }

    /// Listeners present in both sets on the same port. Their existing leases
    /// are already committed.
    pub fn retained_listeners(&self) -> &[String] {
        &self.retained_listeners
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "{step}")?;
        }
        Ok(())
    }
}

impl IntoIterator for Plan {
    type Item = Step;
    type IntoIter = std::vec::IntoIter<Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

fn port_changed(old: &Listener, new: &Listener) -> bool {
    match new.port() {
        Some(port) => port != old.port().unwrap_or(0),
        None => false,
    }
}
