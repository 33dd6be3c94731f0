use ahash::AHashMap as HashMap;
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use xds_reconciler_core::{
    Completion, PushChannel, PushError, Resource, ResourceKey, ResourceKind, ResourceRef,
    ResultCallback, Revert,
};

/// An in-memory resource store that acknowledges pushes on behalf of a data
/// plane.
#[derive(Clone, Debug)]
pub struct Cache {
    inner: Arc<Mutex<Inner>>,
    mode: AckMode,
}

/// How the cache acknowledges mutations.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AckMode {
    /// Every mutation is acknowledged immediately.
    #[default]
    Auto,

    /// Mutations stay pending until acknowledged through [`Cache::ack`] or
    /// [`Cache::nack`].
    Manual,

    /// Listeners and routes that reference clusters absent from the cache are
    /// rejected; everything else is acknowledged immediately.
    Consistency,
}

/// A mutation applied to the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Upsert(ResourceKey),
    Delete(ResourceKey),
}

#[derive(Debug, Default)]
struct Inner {
    resources: HashMap<ResourceKey, Resource>,
    version: u64,
    pending: Vec<Pending>,
    events: Option<mpsc::UnboundedSender<Event>>,
}

struct Pending {
    key: ResourceKey,
    version: u64,
    completion: Option<Completion>,
    on_result: Option<ResultCallback>,
}

// === impl Cache ===

impl Cache {
    pub fn new(mode: AckMode) -> Self {
        Self {
            inner: Default::default(),
            mode,
        }
    }

    /// Returns a cache that reports every applied mutation, including those
    /// still awaiting acknowledgment.
    pub fn with_events(mode: AckMode) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cache = Self::new(mode);
        cache.inner.lock().events = Some(tx);
        (cache, rx)
    }

    pub fn mode(&self) -> AckMode {
        self.mode
    }

    /// Incremented by every mutation and revert.
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    pub fn get(&self, kind: ResourceKind, name: &str) -> Option<Resource> {
        self.inner
            .lock()
            .resources
            .get(&ResourceKey::new(kind, name))
            .cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<ResourceKey, Resource> {
        self.inner
            .lock()
            .resources
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Keys of mutations awaiting acknowledgment, in the order they were
    /// applied.
    pub fn pending(&self) -> Vec<ResourceKey> {
        self.inner
            .lock()
            .pending
            .iter()
            .map(|p| p.key.clone())
            .collect()
    }

    /// Acknowledges all pending mutations of a resource. Returns false if none
    /// were pending.
    pub fn ack(&self, kind: ResourceKind, name: &str) -> bool {
        self.resolve(&ResourceKey::new(kind, name), Ok(()))
    }

    /// Rejects all pending mutations of a resource. Returns false if none were
    /// pending.
    pub fn nack(&self, kind: ResourceKind, name: &str, detail: impl ToString) -> bool {
        let key = ResourceKey::new(kind, name);
        let error = PushError::Rejected {
            resource: key.to_string(),
            detail: detail.to_string(),
        };
        self.resolve(&key, Err(error))
    }

    /// Acknowledges every pending mutation, returning how many there were.
    pub fn ack_all(&self) -> usize {
        let pending = std::mem::take(&mut self.inner.lock().pending);
        let n = pending.len();
        for p in pending {
            p.resolve(Ok(()));
        }
        n
    }

    fn resolve(&self, key: &ResourceKey, result: Result<(), PushError>) -> bool {
        let resolved = {
            let mut inner = self.inner.lock();
            let (resolved, pending) = std::mem::take(&mut inner.pending)
                .into_iter()
                .partition::<Vec<_>, _>(|p| p.key == *key);
            inner.pending = pending;
            resolved
        };
        let found = !resolved.is_empty();
        for p in resolved {
            p.resolve(result.clone());
        }
        found
    }

    /// Records a mutation, returning its revert and, unless acknowledgment is
    /// manual, its outcome. Must be called with the lock held.
    fn mutate(
        &self,
        inner: &mut Inner,
        key: ResourceKey,
        prior: Option<Resource>,
        event: Event,
        completion: Option<Completion>,
        on_result: Option<ResultCallback>,
    ) -> (Revert, Option<(Pending, Result<(), PushError>)>) {
        inner.version += 1;
        let version = inner.version;
        if let Some(events) = &inner.events {
            let _ = events.send(event);
        }

        let pending = Pending {
            key: key.clone(),
            version,
            completion,
            on_result,
        };
        let outcome = match self.mode {
            AckMode::Auto => Some((pending, Ok(()))),
            AckMode::Consistency => {
                let result = match inner.resources.get(&key) {
                    Some(resource) => check_references(inner, resource.view()),
                    None => Ok(()),
                };
                Some((pending, result))
            }
            AckMode::Manual => {
                inner.pending.push(pending);
                None
            }
        };

        let revert = {
            let inner = self.inner.clone();
            Revert::new(move || {
                let mut inner = inner.lock();
                inner.version += 1;
                // A reverted mutation will never be acknowledged.
                inner.pending.retain(|p| !(p.key == key && p.version == version));
                trace!(%key, "Reverting");
                match prior {
                    Some(resource) => inner.resources.insert(key, resource),
                    None => inner.resources.remove(&key),
                };
            })
        };
        (revert, outcome)
    }
}

impl PushChannel for Cache {
    fn upsert(
        &self,
        resource: Resource,
        completion: Option<Completion>,
        on_result: Option<ResultCallback>,
    ) -> Result<Revert, PushError> {
        let key = resource.key();
        let (revert, outcome) = {
            let mut inner = self.inner.lock();
            if inner.resources.get(&key) == Some(&resource) {
                drop(inner);
                debug!(%key, "Unchanged");
                if let Some(completion) = completion {
                    completion.complete(Ok(()));
                }
                return Ok(Revert::noop());
            }
            let prior = inner.resources.insert(key.clone(), resource);
            self.mutate(
                &mut inner,
                key.clone(),
                prior,
                Event::Upsert(key),
                completion,
                on_result,
            )
        };
        if let Some((pending, result)) = outcome {
            pending.resolve(result);
        }
        Ok(revert)
    }

    fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        completion: Option<Completion>,
        on_result: Option<ResultCallback>,
    ) -> Result<Revert, PushError> {
        let key = ResourceKey::new(kind, name);
        let (revert, outcome) = {
            let mut inner = self.inner.lock();
            let Some(prior) = inner.resources.remove(&key) else {
                drop(inner);
                debug!(%key, "Already absent");
                if let Some(completion) = completion {
                    completion.complete(Ok(()));
                }
                return Ok(Revert::noop());
            };
            self.mutate(
                &mut inner,
                key.clone(),
                Some(prior),
                Event::Delete(key),
                completion,
                on_result,
            )
        };
        if let Some((pending, result)) = outcome {
            pending.resolve(result);
        }
        Ok(revert)
    }
}

/// Rejects listeners and routes that forward to clusters the cache does not
/// hold.
fn check_references(inner: &Inner, resource: ResourceRef<'_>) -> Result<(), PushError> {
    let refs = match resource {
        ResourceRef::Listener(listener) => listener.cluster_refs(),
        ResourceRef::Route(route) => route.cluster_refs().collect(),
        _ => return Ok(()),
    };
    let missing = refs.into_iter().find(|cluster| {
        !inner
            .resources
            .contains_key(&ResourceKey::new(ResourceKind::Cluster, cluster))
    });
    match missing {
        Some(cluster) => Err(PushError::Rejected {
            resource: ResourceKey::new(resource.kind(), resource.name()).to_string(),
            detail: format!("unknown cluster {cluster:?}"),
        }),
        None => Ok(()),
    }
}

// === impl Pending ===

impl Pending {
    /// Reports the outcome to the result callback before resolving the
    /// completion.
    fn resolve(self, result: Result<(), PushError>) {
        trace!(key = %self.key, version = self.version, ok = result.is_ok(), "Acknowledging");
        if let Some(on_result) = self.on_result {
            on_result(result.clone());
        }
        if let Some(completion) = self.completion {
            completion.complete(result);
        }
    }
}

impl std::fmt::Debug for Pending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("key", &self.key)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
