mod common;

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use vmward_api::MachineState;
use vmward_backend::{BackendError, BackendErrorKind, Operation};
use vmward_core::*;

use common::*;

const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

async fn past_timeout() {
    tokio::time::sleep(IDLE_TIMEOUT + Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_always_on_machine_never_arms() {
    let h = Harness::new();
    h.instance(MachineState::Stopped, "t2.micro", None);
    let machine = h.machine_with_builder(
        "",
        json!({ "instanceId": INSTANCE_ID, "instanceType": "t2.micro", "alwaysOn": true }),
    );

    assert!(!h.provider.start_timer(&machine));
    assert!(h.scheduler.is_empty());

    // an unreachable agent after start doesn't arm it either
    h.provider.start(&machine).await.unwrap();
    assert!(h.scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_machine_without_query_string_never_arms() {
    let h = Harness::new();
    let machine = h.machine("10.0.0.7").with_query_string("");

    assert!(!h.provider.start_timer(&machine));
    assert!(h.scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_single_entry_per_query_string() {
    let h = Harness::new();
    let machine = h.machine("10.0.0.7");

    assert!(h.provider.start_timer(&machine));
    assert!(!h.provider.start_timer(&machine));
    assert_eq!(h.scheduler.len(), 1);

    h.provider.stop_timer(&machine);
    assert!(h.provider.start_timer(&machine));
    assert_eq!(h.scheduler.len(), 1);
    assert!(h.scheduler.is_armed(QUERY_STRING));
}

#[tokio::test(start_paused = true)]
async fn test_stop_timer_twice_is_harmless() {
    let h = Harness::new();
    let machine = h.machine("10.0.0.7");

    h.provider.stop_timer(&machine);
    h.provider.stop_timer(&machine);
    assert!(h.scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fire_with_reconnected_agent_does_not_stop() {
    let h = Harness::new();
    h.instance(MachineState::Running, "t2.micro", Some("10.0.0.7"));
    h.seed_records("10.0.0.7");
    let machine = h.machine("10.0.0.7");

    assert!(h.provider.start_timer(&machine));
    h.agent.set_reachable(true);
    past_timeout().await;

    assert!(h.backend.calls_of(Operation::Stop).is_empty());
    assert!(!h.scheduler.is_armed(QUERY_STRING));
    assert_eq!(h.agent.probes(), vec![QUERY_STRING.to_string()]);
    assert!(h.store.states(MACHINE_ID).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_does_not_fire_before_timeout() {
    let h = Harness::new();
    h.instance(MachineState::Running, "t2.micro", Some("10.0.0.7"));
    let machine = h.machine("10.0.0.7");

    h.provider.start_timer(&machine);
    tokio::time::sleep(IDLE_TIMEOUT - Duration::from_secs(1)).await;

    assert!(h.backend.calls().is_empty());
    assert!(h.scheduler.is_armed(QUERY_STRING));
}

#[tokio::test(start_paused = true)]
async fn test_fire_stops_idle_machine() {
    let h = Harness::new();
    h.instance(MachineState::Running, "t2.micro", Some("10.0.0.7"));
    h.bind_aliases();
    h.seed_records("10.0.0.7");
    let machine = h.machine("10.0.0.7");

    h.provider.start_timer(&machine);
    past_timeout().await;

    assert_eq!(
        h.backend.instance(INSTANCE_ID).unwrap().state,
        MachineState::Stopped
    );
    assert_eq!(h.dns.record(DOMAIN), None);
    assert_eq!(h.dns.record(ALIAS_WWW), None);

    let states: Vec<MachineState> = h.store.states(MACHINE_ID).into_iter().map(|(s, _)| s).collect();
    assert_eq!(states, vec![MachineState::Stopping, MachineState::Stopped]);

    assert!(!h.scheduler.is_armed(QUERY_STRING));
    assert!(!h.locker.is_locked(MACHINE_ID));
    // the firing uses a no-op sink, not the caller's
    assert!(h.events.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_idle_stop_still_records_stopped() {
    let h = Harness::new();
    h.instance(MachineState::Running, "t2.micro", Some("10.0.0.7"));
    h.backend.fail_next(
        Operation::Stop,
        BackendError::new(BackendErrorKind::Transport, "timeout"),
    );
    let machine = h.machine("10.0.0.7");

    h.provider.start_timer(&machine);
    past_timeout().await;

    let states: Vec<MachineState> = h.store.states(MACHINE_ID).into_iter().map(|(s, _)| s).collect();
    assert_eq!(states, vec![MachineState::Stopping, MachineState::Stopped]);
    assert!(!h.locker.is_locked(MACHINE_ID));
}

#[tokio::test(start_paused = true)]
async fn test_stop_inactive_outcomes() {
    let h = Harness::new();
    h.machine("");
    let token = CancellationToken::new();

    h.instance(MachineState::Stopped, "t2.micro", None);
    assert_eq!(
        h.provider.stop_inactive(MACHINE_ID, &token).await.unwrap(),
        IdleOutcome::AlreadyStopped
    );

    h.instance(MachineState::Starting, "t2.micro", None);
    assert_eq!(
        h.provider.stop_inactive(MACHINE_ID, &token).await.unwrap(),
        IdleOutcome::InProgress(MachineState::Starting)
    );

    assert!(h.backend.calls_of(Operation::Stop).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_inactive_with_cancelled_token() {
    let h = Harness::new();
    h.instance(MachineState::Running, "t2.micro", Some("10.0.0.7"));
    h.machine("10.0.0.7");
    let token = CancellationToken::new();
    token.cancel();

    let outcome = h.provider.stop_inactive(MACHINE_ID, &token).await.unwrap();

    assert_eq!(outcome, IdleOutcome::Cancelled);
    assert!(h.backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_inactive_unknown_machine() {
    let h = Harness::new();
    let token = CancellationToken::new();

    let err = h.provider.stop_inactive("m-404", &token).await.unwrap_err();
    assert!(matches!(err, CoreError::MachineNotFound(id) if id == "m-404"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_for_lock() {
    let h = Harness::new();
    h.instance(MachineState::Running, "t2.micro", Some("10.0.0.7"));
    let machine = h.machine("10.0.0.7");

    // a workflow holds the machine while the timer fires
    h.locker.lock(MACHINE_ID).await;
    h.provider.start_timer(&machine);
    past_timeout().await;

    assert!(h.backend.calls_of(Operation::Stop).is_empty());
    h.provider.stop_timer(&machine);
    h.locker.unlock(MACHINE_ID).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(h.backend.calls_of(Operation::Stop).is_empty());
    assert!(h.store.states(MACHINE_ID).is_empty());
    assert!(!h.locker.is_locked(MACHINE_ID));
}

#[tokio::test(start_paused = true)]
async fn test_fire_after_provider_dropped_is_noop() {
    let h = Harness::new();
    h.instance(MachineState::Running, "t2.micro", Some("10.0.0.7"));
    let machine = h.machine("10.0.0.7");
    h.provider.start_timer(&machine);

    let Harness {
        provider,
        backend,
        scheduler,
        ..
    } = h;
    drop(provider);
    past_timeout().await;

    assert!(backend.calls().is_empty());
    assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_agent_check_leaves_machine_unlocked() {
    let h = Harness::new();
    h.instance(MachineState::Running, "t2.micro", Some("10.0.0.7"));
    let machine = h.machine("10.0.0.7");
    h.agent.panic_next();

    h.provider.start_timer(&machine);
    past_timeout().await;

    assert!(h.backend.calls_of(Operation::Stop).is_empty());
    assert!(!h.scheduler.is_armed(QUERY_STRING));
    assert!(!h.locker.is_locked(MACHINE_ID));

    // a later idle stop of the same machine still gets the lock
    let token = CancellationToken::new();
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        h.provider.stop_inactive(MACHINE_ID, &token),
    )
    .await;

    assert_eq!(outcome.unwrap().unwrap(), IdleOutcome::Stopped);
    assert_eq!(h.backend.calls_of(Operation::Stop).len(), 1);
    assert!(!h.locker.is_locked(MACHINE_ID));
}
