use crate::{
    metrics::ReconcilerMetrics,
    plan::{Barrier, Plan, Step},
};
use ahash::AHashMap as HashMap;
use parking_lot::Mutex;
use std::{fmt, sync::Arc};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use xds_reconciler_core::{
    Completion, Context, Error, PortAction, PortCallback, PushChannel, PushError, ResourceKey,
    ResourceKind, ResourceSet, Result, ResultCallback, RevertList, WaitGroup,
};

/// Drives the data plane from one resource set to another through a push
/// channel, with all-or-nothing semantics per batch.
#[derive(Clone, Debug)]
pub struct Reconciler<C> {
    channel: C,
    metrics: ReconcilerMetrics,
    ack_timeout: Option<Duration>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Install,
    Update,
    Uninstall,
}

/// The progress of a single batch. `Committed` and `RolledBack` are terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Pending,
    DeletesIssued,
    AwaitDeleteBarrier,
    AddsIssued,
    AwaitClusterBarrier,
    AwaitListenerBarrier,
    Committed,
    RollingBack,
    RolledBack,
}

struct Batch<'a, C> {
    channel: &'a C,
    metrics: &'a ReconcilerMetrics,
    ctx: Context,
    op: Operation,
    phase: Phase,
    reverts: RevertList,
    barriers: HashMap<Barrier, WaitGroup>,
    leases: Arc<Mutex<Leases>>,
}

/// Port callbacks of the listeners a batch has pushed or deleted.
#[derive(Debug, Default)]
struct Leases {
    /// Callbacks awaiting the outcome of their listener's push or deletion.
    pending: HashMap<String, PortCallback>,

    /// Commit callbacks of acknowledged listeners, run once the batch commits.
    confirmed: Vec<PortCallback>,

    rolled_back: bool,
}

// === impl Reconciler ===

impl<C: PushChannel> Reconciler<C> {
    pub fn new(channel: C, metrics: ReconcilerMetrics) -> Self {
        Self {
            channel,
            metrics,
            ack_timeout: None,
        }
    }

    /// Bounds the time each batch waits for acknowledgments, in addition to
    /// any deadline on the caller's context.
    pub fn with_ack_timeout(self, timeout: Duration) -> Self {
        Self {
            ack_timeout: Some(timeout),
            ..self
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub async fn install(&self, ctx: &Context, set: ResourceSet) -> Result<()> {
        let plan = Plan::install(&set);
        self.run(ctx, Operation::Install, plan, ResourceSet::default(), set)
            .await
    }

    pub async fn update(
        &self,
        ctx: &Context,
        old: ResourceSet,
        mut new: ResourceSet,
    ) -> Result<()> {
        let plan = Plan::new(&old, &new);
        for name in plan.retained_listeners() {
            // The listener keeps its address, so its lease was committed by
            // an earlier batch.
            if new.take_port_callback(name).is_some() {
                debug!(listener = %name, "Dropped port callback of unchanged listener");
            }
        }
        self.run(ctx, Operation::Update, plan, old, new).await
    }

    pub async fn uninstall(&self, ctx: &Context, set: ResourceSet) -> Result<()> {
        let plan = Plan::uninstall(&set);
        self.run(ctx, Operation::Uninstall, plan, set, ResourceSet::default())
            .await
    }

    async fn run(
        &self,
        ctx: &Context,
        op: Operation,
        plan: Plan,
        old: ResourceSet,
        new: ResourceSet,
    ) -> Result<()> {
        let ctx = match self.ack_timeout {
            Some(timeout) => ctx.child().deadline(Instant::now() + timeout),
            None => ctx.clone(),
        };
        debug!(%op, deletes = plan.deletes().count(), upserts = %new.summary(), "Reconciling");

        let mut batch = Batch {
            channel: &self.channel,
            metrics: &self.metrics,
            ctx,
            op,
            phase: Phase::Pending,
            reverts: RevertList::default(),
            barriers: HashMap::default(),
            leases: Default::default(),
        };
        let result = batch.execute(plan, old, new).await;
        self.metrics.batch(op, result.is_ok());
        result
    }
}

// === impl Batch ===

impl<C: PushChannel> Batch<'_, C> {
    async fn execute(
        &mut self,
        plan: Plan,
        mut old: ResourceSet,
        mut new: ResourceSet,
    ) -> Result<()> {
        for step in plan {
            let res = match step {
                Step::Delete { key, barrier } => {
                    self.transition(Phase::DeletesIssued);
                    let on_result = self.port_callback(&mut old, &key);
                    let completion = self.completion(barrier);
                    debug!(%key, ?barrier, "Deleting");
                    self.channel
                        .delete(key.kind, &key.name, completion, on_result)
                }

                Step::Upsert { key, barrier } => {
                    self.transition(Phase::AddsIssued);
                    let Some(resource) = new.take(key.kind, &key.name) else {
                        continue;
                    };
                    let on_result = self.port_callback(&mut new, &key);
                    let completion = self.completion(barrier);
                    debug!(%key, ?barrier, "Upserting");
                    self.channel.upsert(resource, completion, on_result)
                }

                Step::Await(barrier) => {
                    self.transition(match barrier {
                        Barrier::Deletes => Phase::AwaitDeleteBarrier,
                        Barrier::Clusters => Phase::AwaitClusterBarrier,
                        Barrier::Listeners => Phase::AwaitListenerBarrier,
                    });
                    if let Err(error) = self.wait(barrier).await {
                        return Err(self.roll_back(&mut new, error));
                    }
                    continue;
                }
            };

            match res {
                Ok(revert) => self.reverts.push(revert),
                Err(error) => return Err(self.roll_back(&mut new, error)),
            }
        }

        self.transition(Phase::Committed);
        // Callbacks still pending belong to pushes that changed nothing, and
        // are dropped.
        let confirmed = std::mem::take(&mut self.leases.lock().confirmed);
        for callback in confirmed {
            invoke_port_callback(self.metrics, callback);
        }
        info!(op = %self.op, "Committed batch");
        Ok(())
    }

    fn transition(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(op = %self.op, from = ?self.phase, to = ?phase, "Batch phase");
            self.phase = phase;
        }
    }

    fn completion(&mut self, barrier: Option<Barrier>) -> Option<Completion> {
        let barrier = barrier?;
        let ctx = &self.ctx;
        let group = self
            .barriers
            .entry(barrier)
            .or_insert_with(|| WaitGroup::new(ctx));
        Some(group.add_completion())
    }

    async fn wait(&mut self, barrier: Barrier) -> Result<(), PushError> {
        let Some(group) = self.barriers.remove(&barrier) else {
            debug!(%barrier, "Nothing to wait for");
            return Ok(());
        };
        let start = Instant::now();
        debug!(%barrier, pending = group.pending(), "Waiting for acknowledgments");
        let res = group.wait().await;
        let elapsed = start.elapsed();
        self.metrics.barrier_waited(barrier, elapsed);
        debug!(%barrier, ?elapsed, ok = res.is_ok(), "Barrier resolved");
        res
    }

    /// Registers the lease callback of a listener, if the set holds one, to
    /// run with the outcome of that listener's push or deletion.
    fn port_callback(&self, set: &mut ResourceSet, key: &ResourceKey) -> Option<ResultCallback> {
        if key.kind != ResourceKind::Listener {
            return None;
        }
        let callback = set.take_port_callback(&key.name)?;
        let listener = key.name.clone();
        self.leases.lock().pending.insert(listener.clone(), callback);

        let metrics = self.metrics.clone();
        let leases = self.leases.clone();
        Some(Box::new(move |result: Result<(), PushError>| {
            let callback = {
                let mut leases = leases.lock();
                // A rollback has already taken it.
                let Some(callback) = leases.pending.remove(&listener) else {
                    return;
                };
                let acked = result.is_ok() && !leases.rolled_back;
                if acked && callback.action() == PortAction::Commit {
                    leases.confirmed.push(callback);
                    return;
                }
                callback
            };
            match (callback.action(), result) {
                // The listener is gone regardless of how the rest of the batch
                // fares.
                (PortAction::Release, Ok(())) => invoke_port_callback(&metrics, callback),
                (PortAction::Release, Err(error)) => {
                    debug!(%listener, %error, "Listener was not deleted; keeping its lease");
                }
                (PortAction::Commit, result) => {
                    debug!(%listener, ok = result.is_ok(), "Listener was not committed");
                    abort_port_callback(&metrics, callback);
                }
            }
        }))
    }

    fn roll_back(&mut self, new: &mut ResourceSet, error: PushError) -> Error {
        self.transition(Phase::RollingBack);
        self.barriers.clear();
        let reverts = std::mem::take(&mut self.reverts);
        let n = reverts.revert();
        self.metrics.reverted(n);

        // Leases obtained for this batch's listeners are returned, whether the
        // listener was acknowledged, still pending, or never pushed. Release
        // callbacks are dropped, since every deletion has been reverted.
        let aborted = {
            let mut leases = self.leases.lock();
            leases.rolled_back = true;
            let confirmed = std::mem::take(&mut leases.confirmed);
            let pending = std::mem::take(&mut leases.pending).into_values();
            confirmed
                .into_iter()
                .chain(pending)
                .chain(new.take_port_callbacks().map(|(_, callback)| callback))
                .filter(|callback| callback.action() == PortAction::Commit)
                .collect::<Vec<_>>()
        };
        for callback in aborted {
            abort_port_callback(self.metrics, callback);
        }

        self.transition(Phase::RolledBack);
        info!(op = %self.op, reverted = n, %error, "Rolled back batch");
        Error::Push(error)
    }
}

fn invoke_port_callback(metrics: &ReconcilerMetrics, callback: PortCallback) {
    let action = callback.action();
    if let Err(error) = callback.invoke() {
        let error = format!("{error:#}");
        warn!(?action, %error, "Failure in port allocation callback");
        metrics.port_callback_failed(action);
    }
}

fn abort_port_callback(metrics: &ReconcilerMetrics, callback: PortCallback) {
    let action = callback.action();
    if let Err(error) = callback.abort() {
        let error = format!("{error:#}");
        warn!(?action, %error, "Failure aborting port allocation callback");
        metrics.port_callback_failed(action);
    }
}

// === impl Operation ===

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Update => "update",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
