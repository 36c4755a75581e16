mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;

use common::{FakeApi, Failure, drain, quiet_polling, settle};
use ride_along::config::PollingConfig;
use ride_along::ids::{EntityId, SessionUser};
use ride_along::models::RequestStatus;
use ride_along::views::{
    CancelOutcome, NotificationLevel, NotificationReceiver, Notifier, RefreshPhase, RequestsView,
};

fn view_with(api: &Arc<FakeApi>, polling: PollingConfig) -> (RequestsView, NotificationReceiver) {
    let (notifier, rx) = Notifier::channel();
    let view = RequestsView::new(api.clone(), SessionUser::new("u9"), polling, notifier);
    (view, rx)
}

fn statuses(snapshot: &ride_along::views::RequestsSnapshot) -> Vec<(String, RequestStatus)> {
    snapshot
        .requests
        .iter()
        .map(|r| (r.id.to_string(), r.display_status()))
        .collect()
}

fn yes() -> impl Fn(&str) -> bool + Send + Sync {
    |_: &str| true
}

#[tokio::test]
async fn unresolved_request_triggers_exactly_one_ride_lookup() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({
        "id": "r3",
        "status": "pending",
        "passengers": [],
        "ride": {"id": "ride-3"}
    })]);
    api.set_ride(
        "ride-3",
        json!({"id": "ride-3", "passengers": [{"user": {"_id": "u9"}, "status": "accepted"}]}),
    );

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();

    let initial = view.snapshot().await;
    assert_eq!(statuses(&initial), vec![("r3".into(), RequestStatus::Pending)]);

    settle().await;
    assert_eq!(api.ride_lookups(), vec![EntityId::from("ride-3")]);
    let after = view.snapshot().await;
    assert_eq!(statuses(&after), vec![("r3".into(), RequestStatus::Confirmed)]);

    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Success);
}

#[tokio::test]
async fn lookups_are_deduplicated_per_ride() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![
        json!({"id": "a", "rideId": "ride-7"}),
        json!({"id": "b", "ride": "ride-7"}),
    ]);
    api.set_ride("ride-7", json!({"id": "ride-7", "passengers": []}));

    let (view, _rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();
    settle().await;

    assert_eq!(api.ride_lookups().len(), 1);
}

#[tokio::test]
async fn initial_load_never_notifies_and_unchanged_refresh_is_silent() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "a", "status": "confirmed"})]);

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();
    assert!(!view.refresh().await.unwrap());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn reordered_identical_list_is_not_a_change() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![
        json!({"id": "a", "status": "confirmed"}),
        json!({"id": "b", "status": "rejected"}),
    ]);
    api.push_requests(vec![
        json!({"id": "b", "status": "rejected"}),
        json!({"id": "a", "status": "confirmed"}),
    ]);

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();
    assert!(!view.refresh().await.unwrap());
    assert_eq!(api.list_count(), 2);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn status_change_on_refresh_notifies_once() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "a", "status": "confirmed"})]);
    api.push_requests(vec![json!({"id": "a", "status": "rejected"})]);

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();
    assert!(view.refresh().await.unwrap());

    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].message, "Request status updated");
    assert_eq!(
        statuses(&view.snapshot().await),
        vec![("a".into(), RequestStatus::Rejected)]
    );
}

#[tokio::test]
async fn terminal_status_does_not_regress_on_ambiguous_payload() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "a", "status": "rejected"})]);
    api.push_requests(vec![json!({"id": "a", "status": "pending"})]);

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();
    assert!(!view.refresh().await.unwrap());

    assert_eq!(
        statuses(&view.snapshot().await),
        vec![("a".into(), RequestStatus::Rejected)]
    );
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn pre_resolved_pending_may_replace_terminal() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "a", "status": "cancelled"})]);
    api.push_requests(vec![json!({"id": "a", "userRequestStatus": "pending"})]);

    let (view, _rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();
    assert!(view.refresh().await.unwrap());
    assert_eq!(
        statuses(&view.snapshot().await),
        vec![("a".into(), RequestStatus::Pending)]
    );
}

#[tokio::test]
async fn requests_sorted_by_recency_with_stable_ties() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![
        json!({"id": "undated", "status": "confirmed"}),
        json!({"id": "old", "status": "confirmed", "createdAt": "2025-01-01T00:00:00Z"}),
        json!({"id": "by-ride", "status": "confirmed",
               "ride": {"id": "x", "departureTime": "2025-02-01T00:00:00Z"}}),
        json!({"id": "new", "status": "confirmed", "createdAt": "2025-03-01T00:00:00Z"}),
        json!({"id": "undated-2", "status": "confirmed"}),
    ]);

    let (view, _rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();

    let ids: Vec<String> = view
        .snapshot()
        .await
        .requests
        .iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(ids, vec!["new", "by-ride", "old", "undated", "undated-2"]);
}

#[tokio::test]
async fn cancel_success_removes_entry() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![
        json!({"id": "keep", "status": "confirmed"}),
        json!({"id": "drop", "userRequestStatus": "pending"}),
    ]);

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();

    let outcome = view.cancel_request(&EntityId::from("drop"), &yes()).await;
    assert_eq!(outcome, CancelOutcome::Cancelled);

    let snapshot = view.snapshot().await;
    assert_eq!(statuses(&snapshot), vec![("keep".into(), RequestStatus::Confirmed)]);
    assert!(!snapshot.action_loading);
    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Success);
}

#[tokio::test]
async fn cancel_failure_shows_backend_message_and_keeps_list() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "r", "userRequestStatus": "pending"})]);
    api.fail_cancel(Failure::Api(400, Some("Too late to cancel")));

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();

    let outcome = view.cancel_request(&EntityId::from("r"), &yes()).await;
    assert_eq!(outcome, CancelOutcome::Failed("Too late to cancel".into()));
    assert_eq!(view.snapshot().await.requests.len(), 1);

    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Error);
    assert_eq!(notes[0].message, "Too late to cancel");
}

#[tokio::test]
async fn cancel_failure_without_message_uses_fallback() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "r", "userRequestStatus": "pending"})]);
    api.fail_cancel(Failure::Transport);

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();
    view.cancel_request(&EntityId::from("r"), &yes()).await;

    let notes = drain(&mut rx);
    assert_eq!(notes[0].message, "Failed to cancel request");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_cancels_send_a_single_request() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "r", "userRequestStatus": "pending"})]);
    api.delay_cancels(Duration::from_millis(200));

    let (view, _rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();
    let view = Arc::new(view);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let view = Arc::clone(&view);
            tokio::spawn(async move {
                let slow_yes = |_: &str| {
                    std::thread::sleep(Duration::from_millis(20));
                    true
                };
                view.cancel_request(&EntityId::from("r"), &slow_yes).await
            })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| **o == CancelOutcome::Cancelled).count(), 1);
    assert_eq!(outcomes.iter().filter(|o| **o == CancelOutcome::Busy).count(), 1);
    assert_eq!(api.cancel_calls.lock().unwrap().len(), 1);
    assert!(!view.snapshot().await.action_loading);
}

#[tokio::test]
async fn declined_confirmation_makes_no_call() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "r", "userRequestStatus": "pending"})]);

    let (view, _rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();

    let asked = AtomicUsize::new(0);
    let confirm = |_: &str| {
        asked.fetch_add(1, Ordering::SeqCst);
        false
    };
    let outcome = view.cancel_request(&EntityId::from("r"), &confirm).await;
    assert_eq!(outcome, CancelOutcome::Declined);
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert!(api.cancel_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn only_pending_requests_can_be_cancelled() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "r", "status": "confirmed"})]);

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();

    let outcome = view.cancel_request(&EntityId::from("r"), &yes()).await;
    assert_eq!(outcome, CancelOutcome::NotCancellable);
    assert!(api.cancel_calls.lock().unwrap().is_empty());
    assert_eq!(drain(&mut rx)[0].level, NotificationLevel::Error);
}

#[tokio::test]
async fn force_update_walks_requests_in_display_order() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![
        json!({"id": "first", "userRequestStatus": "pending", "rideId": "ride-1",
               "createdAt": "2025-03-03T00:00:00Z"}),
        json!({"id": "second", "userRequestStatus": "pending", "rideId": "ride-2",
               "createdAt": "2025-03-02T00:00:00Z"}),
        json!({"id": "third", "userRequestStatus": "pending", "rideId": "ride-3",
               "createdAt": "2025-03-01T00:00:00Z"}),
    ]);
    api.set_ride("ride-1", json!({"id": "ride-1", "passengers": []}));
    api.set_ride(
        "ride-2",
        json!({"id": "ride-2", "passengers": [{"user": "u9", "status": "confirmed"}]}),
    );
    api.set_ride("ride-3", json!({"id": "ride-3", "passengers": [{"user": "u9"}]}));

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();

    assert_eq!(view.force_update().await, 1);
    assert_eq!(
        api.ride_lookups(),
        vec![
            EntityId::from("ride-1"),
            EntityId::from("ride-2"),
            EntityId::from("ride-3")
        ]
    );
    assert_eq!(
        statuses(&view.snapshot().await),
        vec![
            ("first".into(), RequestStatus::Pending),
            ("second".into(), RequestStatus::Confirmed),
            ("third".into(), RequestStatus::Pending),
        ]
    );
    assert_eq!(drain(&mut rx).len(), 1);

    assert_eq!(view.force_update().await, 0);
    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Info);
    assert_eq!(notes[0].message, "All request statuses are up to date");
    assert!(!view.snapshot().await.forcing);
}

#[tokio::test]
async fn targeted_refetch_never_moves_terminal_back_to_pending() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "a", "status": "confirmed", "rideId": "ride-1"})]);
    api.set_ride(
        "ride-1",
        json!({"id": "ride-1", "passengers": [{"user": "u9", "status": "pending"}]}),
    );

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();

    assert_eq!(view.refetch_ride(&EntityId::from("ride-1")).await, None);
    assert_eq!(
        statuses(&view.snapshot().await),
        vec![("a".into(), RequestStatus::Confirmed)]
    );
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn targeted_refetch_is_skipped_while_loading() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "a", "rideId": "ride-1"})]);
    api.delay_lists(Duration::from_millis(80));

    let (view, _rx) = view_with(&api, quiet_polling());
    let view = Arc::new(view);
    let loader = {
        let view = Arc::clone(&view);
        tokio::spawn(async move { view.retry().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(view.snapshot().await.phase, RefreshPhase::Loading);

    assert_eq!(view.refetch_ride(&EntityId::from("ride-1")).await, None);
    assert!(api.ride_lookups().is_empty());
    assert_eq!(view.force_update().await, 0);

    loader.await.unwrap().unwrap();
    view.teardown();
}

#[tokio::test]
async fn load_failure_sets_page_error_and_retry_recovers() {
    let api = Arc::new(FakeApi::new());
    api.push_requests_failure(Failure::Transport);
    api.push_requests(vec![json!({"id": "a", "status": "confirmed"})]);

    let (view, mut rx) = view_with(&api, quiet_polling());
    assert!(view.mount().await.is_err());
    let failed = view.snapshot().await;
    assert_eq!(failed.phase, RefreshPhase::Idle);
    assert_eq!(failed.error.as_deref(), Some("Failed to load your ride requests"));

    view.retry().await.unwrap();
    let recovered = view.snapshot().await;
    assert!(recovered.error.is_none());
    assert_eq!(recovered.requests.len(), 1);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn successful_poll_after_failed_mount_clears_page_error() {
    let api = Arc::new(FakeApi::new());
    api.push_requests_failure(Failure::Transport);
    api.push_requests(vec![json!({"id": "a", "status": "confirmed"})]);

    let polling = PollingConfig {
        interval_ms: 20,
        settle_delay_ms: 3_600_000,
        refetch_defer_ms: 10,
    };
    let (view, _rx) = view_with(&api, polling);
    assert!(view.mount().await.is_err());
    assert!(view.snapshot().await.error.is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let polled = view.snapshot().await;
    assert!(api.list_count() >= 2);
    assert!(polled.error.is_none());
    assert_eq!(polled.requests.len(), 1);
}

#[tokio::test]
async fn unauthorized_load_requests_login() {
    let api = Arc::new(FakeApi::new());
    api.push_requests_failure(Failure::Unauthorized);

    let (view, mut rx) = view_with(&api, quiet_polling());
    assert!(view.mount().await.is_err());
    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::LoginRequired);
}

#[tokio::test]
async fn poll_failures_are_silent_but_manual_refresh_failures_are_not() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "a", "status": "confirmed"})]);
    api.push_requests_failure(Failure::Transport);

    let polling = PollingConfig {
        interval_ms: 20,
        settle_delay_ms: 3_600_000,
        refetch_defer_ms: 10,
    };
    let (view, mut rx) = view_with(&api, polling);
    view.mount().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(api.list_count() >= 2);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(view.snapshot().await.requests.len(), 1);

    assert!(view.refresh().await.is_err());
    let notes = drain(&mut rx);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Error);
    assert_eq!(notes[0].message, "Failed to refresh requests");
}

#[tokio::test]
async fn settle_fetch_runs_once_after_mount() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "a", "status": "confirmed"})]);

    let polling = PollingConfig {
        interval_ms: 3_600_000,
        settle_delay_ms: 20,
        refetch_defer_ms: 10,
    };
    let (view, _rx) = view_with(&api, polling);
    view.mount().await.unwrap();
    assert_eq!(api.list_count(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.list_count(), 2);
}

#[tokio::test]
async fn teardown_stops_polling_and_pending_lookups() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "r3", "ride": {"id": "ride-3"}})]);
    api.set_ride(
        "ride-3",
        json!({"id": "ride-3", "passengers": [{"user": "u9", "status": "confirmed"}]}),
    );

    let polling = PollingConfig {
        interval_ms: 20,
        settle_delay_ms: 3_600_000,
        refetch_defer_ms: 50,
    };
    let (view, mut rx) = view_with(&api, polling);
    view.mount().await.unwrap();
    view.teardown();
    assert!(view.is_torn_down());

    let calls = api.list_count();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(api.list_count(), calls);
    assert!(api.ride_lookups().is_empty());
    assert_eq!(
        statuses(&view.snapshot().await),
        vec![("r3".into(), RequestStatus::Pending)]
    );
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn results_landing_after_teardown_are_discarded() {
    let api = Arc::new(FakeApi::new());
    api.push_requests(vec![json!({"id": "a", "status": "confirmed"})]);
    api.push_requests(vec![json!({"id": "a", "status": "rejected"})]);
    api.delay_lists(Duration::from_millis(40));

    let (view, mut rx) = view_with(&api, quiet_polling());
    view.mount().await.unwrap();
    let view = Arc::new(view);
    let refresh = {
        let view = Arc::clone(&view);
        tokio::spawn(async move { view.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    view.teardown();

    assert!(!refresh.await.unwrap().unwrap());
    assert_eq!(
        statuses(&view.snapshot().await),
        vec![("a".into(), RequestStatus::Confirmed)]
    );
    assert!(drain(&mut rx).is_empty());
}
