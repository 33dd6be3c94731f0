use super::*;
use tokio::time::{self, Duration};

fn rejected(name: &str) -> PushError {
    PushError::Rejected {
        resource: format!("listener {name}"),
        detail: "bad config".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn empty_wait_group_resolves_immediately() {
    let ctx = Context::with_timeout(Duration::from_secs(1));
    let wg = WaitGroup::new(&ctx);
    assert_eq!(wg.pending(), 0);
    assert_eq!(wg.wait().await, Ok(()));
}

#[tokio::test(start_paused = true)]
async fn resolves_once_all_completions_succeed() {
    let ctx = Context::new();
    let wg = WaitGroup::new(&ctx);
    let c0 = wg.add_completion();
    let c1 = wg.add_completion();
    assert_eq!(wg.pending(), 2);

    tokio::spawn(async move {
        time::sleep(Duration::from_millis(10)).await;
        c0.complete(Ok(()));
        time::sleep(Duration::from_millis(10)).await;
        c1.complete(Ok(()));
    });

    assert_eq!(wg.wait().await, Ok(()));
    assert_eq!(wg.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn first_failure_wins() {
    let ctx = Context::new();
    let wg = WaitGroup::new(&ctx);
    let c0 = wg.add_completion();
    let c1 = wg.add_completion();
    let c2 = wg.add_completion();

    c1.complete(Err(rejected("a")));
    c2.complete(Err(rejected("b")));

    // Resolves on the failure even though c0 is still pending.
    assert_eq!(wg.wait().await, Err(rejected("a")));
    c0.complete(Ok(()));
    assert_eq!(wg.wait().await, Err(rejected("a")));
}

#[tokio::test(start_paused = true)]
async fn dropped_completion_is_cancelled() {
    let ctx = Context::new();
    let wg = WaitGroup::new(&ctx);
    drop(wg.add_completion());
    assert_eq!(wg.wait().await, Err(PushError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn deadline_times_out() {
    let ctx = Context::with_timeout(Duration::from_secs(5));
    let wg = WaitGroup::new(&ctx);
    let _pending = wg.add_completion();

    let start = time::Instant::now();
    assert_eq!(wg.wait().await, Err(PushError::Timeout));
    assert!(start.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn cancellation_unblocks_waiters() {
    let ctx = Context::new();
    let wg = WaitGroup::new(&ctx.child());
    let _pending = wg.add_completion();

    let cancel = ctx.clone();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    assert_eq!(wg.wait().await, Err(PushError::Cancelled));
    assert!(ctx.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn resolution_preferred_over_expired_context() {
    let ctx = Context::with_timeout(Duration::from_secs(1));
    let wg = WaitGroup::new(&ctx);
    wg.add_completion().complete(Ok(()));
    time::sleep(Duration::from_secs(2)).await;
    assert_eq!(wg.wait().await, Ok(()));
}

#[test]
fn earlier_deadline_is_kept() {
    let now = time::Instant::now();
    let ctx = Context::new()
        .deadline(now + Duration::from_secs(1))
        .deadline(now + Duration::from_secs(10));
    assert_eq!(ctx.expires_at(), Some(now + Duration::from_secs(1)));
}
