use crate::{plan::Barrier, Operation};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;
use xds_reconciler_core::PortAction;

#[derive(Clone, Debug)]
pub struct ReconcilerMetrics {
    batches: Family<BatchLabels, Counter>,
    barrier_wait: Family<BarrierLabels, Histogram>,
    port_callback_failures: Family<CallbackLabels, Counter>,
    reverted: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BatchLabels {
    op: &'static str,
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BarrierLabels {
    barrier: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CallbackLabels {
    action: &'static str,
}

// === impl ReconcilerMetrics ===

impl ReconcilerMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let batches = Family::<BatchLabels, Counter>::default();
        reg.register(
            "batches",
            "Count of reconciled batches by operation and outcome",
            batches.clone(),
        );

        let barrier_wait = Family::<BarrierLabels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0].into_iter())
        });
        reg.register_with_unit(
            "barrier_wait",
            "Time spent waiting for acknowledgments at each barrier",
            Unit::Seconds,
            barrier_wait.clone(),
        );

        let port_callback_failures = Family::<CallbackLabels, Counter>::default();
        reg.register(
            "port_callback_failures",
            "Count of port lease callbacks that returned an error",
            port_callback_failures.clone(),
        );

        let reverted = Counter::default();
        reg.register(
            "reverted_mutations",
            "Count of pushes and deletions undone by rollbacks",
            reverted.clone(),
        );

        Self {
            batches,
            barrier_wait,
            port_callback_failures,
            reverted,
        }
    }

    pub(crate) fn batch(&self, op: Operation, committed: bool) {
        let outcome = if committed { "committed" } else { "rolled_back" };
        self.batches
            .get_or_create(&BatchLabels {
                op: op.as_str(),
                outcome,
            })
            .inc();
    }

    pub(crate) fn barrier_waited(&self, barrier: Barrier, elapsed: time::Duration) {
        self.barrier_wait
            .get_or_create(&BarrierLabels {
                barrier: barrier.as_str(),
            })
            .observe(elapsed.as_secs_f64());
    }

    pub(crate) fn port_callback_failed(&self, action: PortAction) {
        let action = match action {
            PortAction::Commit => "commit",
            PortAction::Release => "release",
        };
        self.port_callback_failures
            .get_or_create(&CallbackLabels { action })
            .inc();
    }

    pub(crate) fn reverted(&self, n: usize) {
        self.reverted.inc_by(n as u64);
    }
}

impl Default for ReconcilerMetrics {
    /// Metrics that are not exported.
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}
