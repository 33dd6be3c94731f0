use super::*;
use crate::cache::Event;
use pretty_assertions::assert_eq;
use prometheus_client::registry::Registry;
use serde_json::json;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::time;
use tokio_test::{assert_pending, assert_ready, assert_ready_ok, task};
use xds_reconciler_core::{
    resource, Completion, Context, Error, PortCallback, PushChannel, PushError, Resource,
    ResourceKey,
    ResourceKind::{self, *},
    ResourceSet, ResultCallback, Revert,
};

fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    )
}

fn key(kind: ResourceKind, name: &str) -> ResourceKey {
    ResourceKey::new(kind, name)
}

fn listener(name: &str, port: u32, cluster: &str) -> Resource {
    let listener = serde_json::from_value::<resource::Listener>(json!({
        "name": name,
        "address": {
            "socket_address": { "protocol": "TCP", "address": "127.0.0.1", "port_value": port },
        },
        "filter_chains": [{
            "filters": [{
                "name": "envoy.filters.network.tcp_proxy",
                "typed_config": {
                    "@type": resource::TCP_PROXY_TYPE_URL,
                    "stat_prefix": name,
                    "cluster": cluster,
                },
            }],
        }],
    }))
    .expect("listener must decode");
    Resource::Listener(listener)
}

fn route(name: &str, cluster: &str) -> Resource {
    let route = serde_json::from_value::<resource::RouteConfiguration>(json!({
        "name": name,
        "virtual_hosts": [{
            "name": "default",
            "domains": ["*"],
            "routes": [{ "match": { "prefix": "/" }, "route": { "cluster": cluster } }],
        }],
    }))
    .expect("route must decode");
    Resource::Route(route)
}

fn cluster(name: &str) -> Resource {
    Resource::Cluster(resource::Cluster {
        name: name.to_string(),
        ..Default::default()
    })
}

fn endpoints(cluster: &str) -> Resource {
    Resource::Endpoint(resource::ClusterLoadAssignment {
        cluster_name: cluster.to_string(),
        ..Default::default()
    })
}

fn secret(name: &str) -> Resource {
    Resource::Secret(resource::Secret {
        name: name.to_string(),
        ..Default::default()
    })
}

fn set(resources: impl IntoIterator<Item = Resource>) -> ResourceSet {
    resources.into_iter().collect()
}

fn counting(calls: &Arc<AtomicUsize>) -> impl FnOnce() -> anyhow::Result<()> + Send + 'static {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Port leases as an allocator tracks them, keyed by listener, with whether
/// each has been acknowledged.
#[derive(Clone, Debug, Default)]
struct Leases(Arc<parking_lot::Mutex<BTreeMap<String, bool>>>);

impl Leases {
    /// Leases a port for a listener of the set being installed.
    fn lease(&self, set: &mut ResourceSet, listener: &str) {
        self.0.lock().insert(listener.to_string(), false);
        let ack = self.0.clone();
        let release = self.0.clone();
        let name = listener.to_string();
        let callback = PortCallback::commit(move || {
            if let Some(acked) = ack.lock().get_mut(&name) {
                *acked = true;
            }
            Ok(())
        });
        let name = listener.to_string();
        let callback = callback.on_abort(move || {
            release.lock().remove(&name);
            Ok(())
        });
        set.set_port_callback(listener, callback);
    }

    fn held(&self) -> Vec<(String, bool)> {
        self.0.lock().clone().into_iter().collect()
    }
}

fn reconciler(mode: AckMode) -> (Reconciler<Cache>, tokio::sync::mpsc::UnboundedReceiver<Event>) {
    let (cache, events) = Cache::with_events(mode);
    (Reconciler::new(cache, ReconcilerMetrics::default()), events)
}

fn port_of(cache: &Cache, name: &str) -> Option<u32> {
    match cache.get(Listener, name)? {
        Resource::Listener(l) => l.port(),
        _ => None,
    }
}

// === Plan ===

#[test]
fn install_adds_dependencies_first() {
    let new = set([
        listener("l", 8080, "c"),
        route("r", "c"),
        cluster("c"),
        endpoints("c"),
        secret("s"),
    ]);
    let plan = Plan::install(&new);
    assert_eq!(
        plan.to_string(),
        "upsert secret s\n\
         upsert endpoint c\n\
         upsert cluster c [clusters]\n\
         upsert route r\n\
         await clusters\n\
         upsert listener l [listeners]\n\
         await listeners\n",
    );
    assert!(!plan.waits_for_delete());
}

#[test]
fn clusters_without_listeners_are_not_awaited() {
    let plan = Plan::install(&set([cluster("c"), route("r", "c")]));
    assert_eq!(plan.to_string(), "upsert cluster c\nupsert route r\n");
}

#[test]
fn uninstall_deletes_dependents_first() {
    let old = set([
        secret("s"),
        endpoints("c"),
        cluster("c"),
        route("r", "c"),
        listener("l", 8080, "c"),
    ]);
    let plan = Plan::uninstall(&old);
    assert_eq!(
        plan.to_string(),
        "delete listener l [listeners]\n\
         delete route r\n\
         delete cluster c\n\
         delete endpoint c\n\
         delete secret s\n\
         await listeners\n",
    );
}

#[test]
fn update_deletes_only_departed_resources() {
    let old = set([
        listener("l1", 8080, "c1"),
        listener("l2", 8081, "c1"),
        route("r1", "c1"),
        cluster("c1"),
        cluster("c2"),
    ]);
    let new = set([listener("l1", 8080, "c2"), cluster("c2"), cluster("c3")]);
    let plan = Plan::new(&old, &new);

    assert_eq!(
        plan.deletes().cloned().collect::<Vec<_>>(),
        [key(Listener, "l2"), key(Route, "r1"), key(Cluster, "c1")],
    );
    assert_eq!(
        plan.upserts().cloned().collect::<Vec<_>>(),
        [key(Cluster, "c2"), key(Cluster, "c3"), key(Listener, "l1")],
    );
    assert_eq!(plan.retained_listeners(), ["l1"]);
    assert!(!plan.waits_for_delete());
    assert!(plan.steps().contains(&Step::Delete {
        key: key(Listener, "l2"),
        barrier: Some(Barrier::Listeners),
    }));
}

#[test]
fn port_change_replaces_listener() {
    let old = set([listener("l", 8080, "c"), cluster("c")]);
    let new = set([listener("l", 9090, "c"), cluster("c")]);
    let plan = Plan::new(&old, &new);
    assert_eq!(
        plan.to_string(),
        "delete listener l [deletes]\n\
         await deletes\n\
         upsert cluster c [clusters]\n\
         await clusters\n\
         upsert listener l [listeners]\n\
         await listeners\n",
    );
    assert!(plan.waits_for_delete());
    assert!(plan.retained_listeners().is_empty());
}

#[test]
fn plan_diff_sets() {
    let sets = [
        set([]),
        set([listener("a", 1, "x"), cluster("x")]),
        set([listener("a", 2, "x"), secret("s")]),
        set([listener("b", 1, "y"), cluster("y"), endpoints("y")]),
        set([route("r", "x"), cluster("x"), endpoints("x"), secret("s")]),
    ];
    for old in &sets {
        for new in &sets {
            let plan = Plan::new(old, new);
            let mut expected_deletes = old
                .iter()
                .map(|r| key(r.kind(), r.name()))
                .filter(|k| !new.contains(k.kind, &k.name))
                .collect::<Vec<_>>();
            for l in &old.listeners {
                let replaced = new
                    .listener(&l.name)
                    .is_some_and(|n| n.port() != l.port());
                if replaced {
                    expected_deletes.push(key(Listener, &l.name));
                }
            }
            let mut deletes = plan.deletes().cloned().collect::<Vec<_>>();
            deletes.sort();
            expected_deletes.sort();
            assert_eq!(deletes, expected_deletes, "{plan}");

            let mut upserts = plan.upserts().cloned().collect::<Vec<_>>();
            let mut expected_upserts = new
                .iter()
                .map(|r| key(r.kind(), r.name()))
                .collect::<Vec<_>>();
            upserts.sort();
            expected_upserts.sort();
            assert_eq!(upserts, expected_upserts, "{plan}");
        }
    }
}

// === Reconciler ===

#[tokio::test]
async fn listener_waits_for_cluster_ack() {
    let _trace = init_tracing();
    let (reconciler, mut events) = reconciler(AckMode::Manual);
    let cache = reconciler.channel().clone();
    let ctx = Context::new();

    let mut install = task::spawn(reconciler.install(
        &ctx,
        set([cluster("c"), listener("l", 8080, "c")]),
    ));
    assert_pending!(install.poll());
    assert_eq!(events.try_recv(), Ok(Event::Upsert(key(Cluster, "c"))));
    assert!(events.try_recv().is_err(), "listener must not be pushed yet");

    assert!(cache.ack(Cluster, "c"));
    assert!(install.is_woken());
    assert_pending!(install.poll());
    assert_eq!(events.try_recv(), Ok(Event::Upsert(key(Listener, "l"))));

    assert!(cache.ack(Listener, "l"));
    assert_ready_ok!(install.poll());
    assert_eq!(cache.snapshot().len(), 2);
}

#[tokio::test]
async fn rejected_listener_rolls_back_batch() {
    let _trace = init_tracing();
    let (reconciler, _events) = reconciler(AckMode::Consistency);
    let cache = reconciler.channel().clone();
    let ctx = Context::new();

    reconciler
        .install(&ctx, set([secret("existing")]))
        .await
        .expect("install must succeed");
    let before = cache.snapshot();

    let err = reconciler
        .install(&ctx, set([secret("s"), listener("l", 8080, "missing")]))
        .await
        .expect_err("listener must be rejected");
    assert!(
        matches!(
            err,
            Error::Push(PushError::Rejected { ref resource, .. }) if resource == "listener l"
        ),
        "{err}"
    );
    assert!(!err.is_pre_mutation());
    assert_eq!(cache.snapshot(), before);
}

#[tokio::test]
async fn failed_update_restores_prior_state() {
    let _trace = init_tracing();
    let (reconciler, _events) = reconciler(AckMode::Consistency);
    let cache = reconciler.channel().clone();
    let ctx = Context::new();

    let old = || {
        set([
            cluster("c1"),
            route("r1", "c1"),
            listener("l1", 8080, "c1"),
            listener("l3", 8082, "c1"),
        ])
    };
    reconciler
        .install(&ctx, old())
        .await
        .expect("install must succeed");
    let before = cache.snapshot();

    let new = set([
        cluster("c2"),
        listener("l1", 8080, "c2"),
        listener("l2", 8081, "missing"),
        listener("l3", 9092, "c2"),
    ]);
    let err = reconciler
        .update(&ctx, old(), new)
        .await
        .expect_err("l2 must be rejected");
    assert!(matches!(err, Error::Push(PushError::Rejected { .. })), "{err}");
    assert_eq!(cache.snapshot(), before);
    assert_eq!(port_of(&cache, "l3"), Some(8082));
}

#[tokio::test]
async fn port_change_deletes_before_adding() {
    let _trace = init_tracing();
    let (reconciler, mut events) = reconciler(AckMode::Manual);
    let cache = reconciler.channel().clone();
    let ctx = Context::new();

    let mut install = task::spawn(reconciler.install(&ctx, set([listener("l", 8080, "c")])));
    assert_pending!(install.poll());
    assert_eq!(cache.ack_all(), 1);
    assert_ready_ok!(install.poll());
    assert_eq!(events.try_recv(), Ok(Event::Upsert(key(Listener, "l"))));

    let mut update = task::spawn(reconciler.update(
        &ctx,
        set([listener("l", 8080, "c")]),
        set([listener("l", 9090, "c")]),
    ));
    assert_pending!(update.poll());
    assert_eq!(events.try_recv(), Ok(Event::Delete(key(Listener, "l"))));
    assert!(events.try_recv().is_err(), "new listener must wait for delete");

    assert!(cache.ack(Listener, "l"));
    assert_pending!(update.poll());
    assert_eq!(events.try_recv(), Ok(Event::Upsert(key(Listener, "l"))));
    assert_eq!(port_of(&cache, "l"), Some(9090));

    assert!(cache.ack(Listener, "l"));
    assert_ready_ok!(update.poll());
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_delete_times_out() {
    let _trace = init_tracing();
    let (reconciler, mut events) = reconciler(AckMode::Manual);
    let cache = reconciler.channel().clone();

    let setup = Context::new();
    let mut install = task::spawn(reconciler.install(&setup, set([listener("l", 8080, "c")])));
    assert_pending!(install.poll());
    cache.ack_all();
    assert_ready_ok!(install.poll());
    drop(install);
    let _ = events.try_recv();

    let ctx = Context::with_timeout(time::Duration::from_secs(5));
    let mut update = task::spawn(reconciler.update(
        &ctx,
        set([listener("l", 8080, "c")]),
        set([listener("l", 9090, "c")]),
    ));
    assert_pending!(update.poll());
    assert_eq!(events.try_recv(), Ok(Event::Delete(key(Listener, "l"))));

    time::advance(time::Duration::from_secs(6)).await;
    let err = assert_ready!(update.poll()).expect_err("delete must time out");
    assert!(matches!(err, Error::Push(PushError::Timeout)), "{err}");
    assert!(events.try_recv().is_err(), "new listener must not be pushed");
    assert_eq!(port_of(&cache, "l"), Some(8080));
    assert!(cache.pending().is_empty());
}

#[tokio::test]
async fn cancellation_rolls_back() {
    let _trace = init_tracing();
    let (reconciler, _events) = reconciler(AckMode::Manual);
    let cache = reconciler.channel().clone();
    let ctx = Context::new();

    let mut install = task::spawn(
        reconciler.install(&ctx, set([secret("s"), listener("l", 8080, "c")])),
    );
    assert_pending!(install.poll());
    assert_eq!(cache.pending(), [key(Secret, "s"), key(Listener, "l")]);

    ctx.cancel();
    let err = assert_ready!(install.poll()).expect_err("batch must be cancelled");
    assert!(matches!(err, Error::Push(PushError::Cancelled)), "{err}");
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn release_fires_once_on_acknowledged_delete() {
    let _trace = init_tracing();
    let (reconciler, _events) = reconciler(AckMode::Manual);
    let cache = reconciler.channel().clone();
    let ctx = Context::new();

    let mut install = task::spawn(reconciler.install(&ctx, set([listener("l", 10000, "c")])));
    assert_pending!(install.poll());
    cache.ack_all();
    assert_ready_ok!(install.poll());
    drop(install);

    let releases = Arc::new(AtomicUsize::new(0));
    let mut old = set([listener("l", 10000, "c")]);
    old.set_port_callback("l", PortCallback::release(counting(&releases)));

    let mut uninstall = task::spawn(reconciler.uninstall(&ctx, old));
    assert_pending!(uninstall.poll());
    assert_eq!(releases.load(Ordering::SeqCst), 0);

    assert!(cache.ack(Listener, "l"));
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert_ready_ok!(uninstall.poll());

    assert!(!cache.ack(Listener, "l"));
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn commit_waits_for_batch_commit() {
    let _trace = init_tracing();
    let (reconciler, _events) = reconciler(AckMode::Manual);
    let cache = reconciler.channel().clone();
    let ctx = Context::new();

    let commits = Arc::new(AtomicUsize::new(0));
    let mut new = set([listener("l1", 10000, "c"), listener("l2", 10001, "c")]);
    new.set_port_callback("l1", PortCallback::commit(counting(&commits)));

    let mut install = task::spawn(reconciler.install(&ctx, new));
    assert_pending!(install.poll());
    assert!(cache.ack(Listener, "l1"));
    assert_eq!(commits.load(Ordering::SeqCst), 0, "l2 is still pending");

    assert!(cache.ack(Listener, "l2"));
    assert_ready_ok!(install.poll());
    assert_eq!(commits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rolled_back_batch_does_not_commit_leases() {
    let _trace = init_tracing();
    let (reconciler, _events) = reconciler(AckMode::Manual);
    let cache = reconciler.channel().clone();
    let ctx = Context::new();

    let commits = Arc::new(AtomicUsize::new(0));
    let mut new = set([listener("l1", 10000, "c"), listener("l2", 10001, "c")]);
    new.set_port_callback("l1", PortCallback::commit(counting(&commits)));

    let mut install = task::spawn(reconciler.install(&ctx, new));
    assert_pending!(install.poll());
    assert!(cache.ack(Listener, "l1"));
    assert!(cache.nack(Listener, "l2", "invalid filter chain"));
    let err = assert_ready!(install.poll()).expect_err("l2 was rejected");
    assert!(matches!(err, Error::Push(PushError::Rejected { .. })), "{err}");
    assert_eq!(commits.load(Ordering::SeqCst), 0);
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn rejected_install_releases_its_leases() {
    let _trace = init_tracing();
    let (reconciler, _events) = reconciler(AckMode::Consistency);
    let ctx = Context::new();
    let leases = Leases::default();

    let mut new = set([
        cluster("c"),
        listener("api", 10000, "c"),
        listener("web", 10001, "missing"),
    ]);
    leases.lease(&mut new, "api");
    leases.lease(&mut new, "web");
    let err = reconciler
        .install(&ctx, new)
        .await
        .expect_err("web must be rejected");
    assert!(matches!(err, Error::Push(PushError::Rejected { .. })), "{err}");
    assert!(leases.held().is_empty());
    assert!(reconciler.channel().snapshot().is_empty());

    let mut new = set([cluster("c"), listener("api", 10000, "c")]);
    leases.lease(&mut new, "api");
    reconciler
        .install(&ctx, new)
        .await
        .expect("install must succeed");
    assert_eq!(leases.held(), [("api".to_string(), true)]);
}

#[tokio::test]
async fn rollback_releases_leases_of_pending_listeners() {
    let _trace = init_tracing();
    let (reconciler, _events) = reconciler(AckMode::Manual);
    let cache = reconciler.channel().clone();
    let ctx = Context::new();
    let leases = Leases::default();

    let mut new = set([listener("l1", 10000, "c"), listener("l2", 10001, "c")]);
    leases.lease(&mut new, "l1");
    leases.lease(&mut new, "l2");
    let mut install = task::spawn(reconciler.install(&ctx, new));
    assert_pending!(install.poll());

    assert!(cache.nack(Listener, "l2", "invalid filter chain"));
    let err = assert_ready!(install.poll()).expect_err("l2 was rejected");
    assert!(matches!(err, Error::Push(PushError::Rejected { .. })), "{err}");
    assert!(leases.held().is_empty());
    assert!(!cache.ack(Listener, "l1"), "l1 was reverted");
    assert!(leases.held().is_empty());
}

#[tokio::test]
async fn refused_push_releases_leases_of_unpushed_listeners() {
    let _trace = init_tracing();
    let cache = Cache::new(AckMode::Auto);
    let reconciler = Reconciler::new(
        Refusing {
            cache: cache.clone(),
            refused: key(Cluster, "c"),
        },
        ReconcilerMetrics::default(),
    );
    let leases = Leases::default();

    let mut new = set([cluster("c"), listener("l", 10000, "c")]);
    leases.lease(&mut new, "l");
    reconciler
        .install(&Context::new(), new)
        .await
        .expect_err("cluster push must fail");
    assert!(leases.held().is_empty());
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn failed_update_keeps_leases_of_prior_listeners() {
    let _trace = init_tracing();
    let (reconciler, _events) = reconciler(AckMode::Consistency);
    let ctx = Context::new();
    let leases = Leases::default();

    let mut old = set([cluster("c"), listener("l1", 10000, "c")]);
    leases.lease(&mut old, "l1");
    reconciler
        .install(&ctx, old)
        .await
        .expect("install must succeed");

    // The retained listener's lease is the one committed above, so it holds
    // no abort action of its own.
    let mut new = set([
        cluster("c"),
        listener("l1", 10000, "c"),
        listener("l2", 10001, "missing"),
    ]);
    new.set_port_callback("l1", PortCallback::commit(|| Ok(())));
    leases.lease(&mut new, "l2");
    reconciler
        .update(&ctx, set([cluster("c"), listener("l1", 10000, "c")]), new)
        .await
        .expect_err("l2 must be rejected");
    assert_eq!(leases.held(), [("l1".to_string(), true)]);
}

#[tokio::test]
async fn unchanged_listeners_keep_their_leases() {
    let _trace = init_tracing();
    let (reconciler, _events) = reconciler(AckMode::Auto);
    let ctx = Context::new();

    reconciler
        .install(&ctx, set([listener("l", 10000, "c1")]))
        .await
        .expect("install must succeed");

    let commits = Arc::new(AtomicUsize::new(0));
    let mut new = set([listener("l", 10000, "c2")]);
    new.set_port_callback("l", PortCallback::commit(counting(&commits)));
    reconciler
        .update(&ctx, set([listener("l", 10000, "c1")]), new)
        .await
        .expect("update must succeed");
    assert_eq!(commits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn identical_pushes_are_not_reported() {
    let _trace = init_tracing();
    let (reconciler, mut events) = reconciler(AckMode::Auto);
    let ctx = Context::new();

    reconciler
        .install(&ctx, set([listener("l", 10000, "c")]))
        .await
        .expect("install must succeed");
    let _ = events.try_recv();
    let version = reconciler.channel().version();

    let commits = Arc::new(AtomicUsize::new(0));
    let mut again = set([listener("l", 10000, "c")]);
    again.set_port_callback("l", PortCallback::commit(counting(&commits)));
    reconciler
        .install(&ctx, again)
        .await
        .expect("install must succeed");

    assert_eq!(commits.load(Ordering::SeqCst), 0);
    assert_eq!(reconciler.channel().version(), version);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn failing_port_callbacks_do_not_fail_batches() {
    let _trace = init_tracing();
    let mut registry = Registry::default();
    let metrics = ReconcilerMetrics::register(&mut registry);
    let reconciler = Reconciler::new(Cache::new(AckMode::Auto), metrics);

    let mut new = set([listener("l", 10000, "c")]);
    new.set_port_callback(
        "l",
        PortCallback::commit(|| anyhow::bail!("lease already expired")),
    );
    reconciler
        .install(&Context::new(), new)
        .await
        .expect("install must succeed");

    let mut text = String::new();
    prometheus_client::encoding::text::encode(&mut text, &registry).unwrap();
    assert!(text.contains("port_callback_failures_total{action=\"commit\"} 1"), "{text}");
    assert!(text.contains("batches_total{op=\"install\",outcome=\"committed\"} 1"), "{text}");
}

/// Refuses pushes of one resource outright.
struct Refusing {
    cache: Cache,
    refused: ResourceKey,
}

impl PushChannel for Refusing {
    fn upsert(
        &self,
        resource: Resource,
        completion: Option<Completion>,
        on_result: Option<ResultCallback>,
    ) -> Result<Revert, PushError> {
        if resource.key() == self.refused {
            return Err(PushError::Failed {
                resource: self.refused.to_string(),
                detail: "channel closed".to_string(),
            });
        }
        self.cache.upsert(resource, completion, on_result)
    }

    fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        completion: Option<Completion>,
        on_result: Option<ResultCallback>,
    ) -> Result<Revert, PushError> {
        self.cache.delete(kind, name, completion, on_result)
    }
}

#[tokio::test]
async fn refused_push_reverts_earlier_mutations() {
    let _trace = init_tracing();
    let mut registry = Registry::default();
    let metrics = ReconcilerMetrics::register(&mut registry);
    let cache = Cache::new(AckMode::Auto);
    let reconciler = Reconciler::new(
        Refusing {
            cache: cache.clone(),
            refused: key(Cluster, "c"),
        },
        metrics,
    );

    let err = reconciler
        .install(
            &Context::new(),
            set([secret("s"), endpoints("c"), cluster("c"), listener("l", 8080, "c")]),
        )
        .await
        .expect_err("cluster push must fail");
    assert!(matches!(err, Error::Push(PushError::Failed { .. })), "{err}");
    assert!(cache.snapshot().is_empty());

    let mut text = String::new();
    prometheus_client::encoding::text::encode(&mut text, &registry).unwrap();
    assert!(text.contains("reverted_mutations_total 2"), "{text}");
    assert!(text.contains("outcome=\"rolled_back\""), "{text}");
}
