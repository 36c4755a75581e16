//! "My requests" view: the current user's ride requests, kept fresh.
//!
//! Lifecycle: [`RequestsView::mount`] performs a blocking load, then a
//! background task runs one settle fetch and a recurring poll until
//! [`RequestsView::teardown`] (or drop). Every fetch goes through the
//! normalizer, the no-regression guard, recency sorting and change detection.
//! Unresolved rides get one deferred targeted lookup each.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::RideApi;
use crate::config::PollingConfig;
use crate::error::Result;
use crate::ids::{EntityId, SessionUser};
use crate::models::{RequestStatus, RideRef, RideRequest};
use crate::normalizer::{normalize_request, ride_status_for};
use crate::views::Confirm;
use crate::views::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RefreshPhase {
    #[default]
    Idle,
    /// Blocking fetch; the page shows a full loading indicator.
    Loading,
    /// Silent fetch; the current list stays on screen.
    Refreshing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    Declined,
    NotCancellable,
    Unknown,
    Busy,
    Failed(String),
}

/// Render-ready copy of the view state.
#[derive(Debug, Clone, Default)]
pub struct RequestsSnapshot {
    pub requests: Vec<RideRequest>,
    pub phase: RefreshPhase,
    /// Page-level error from the last blocking load; cleared by any later
    /// successful fetch.
    pub error: Option<String>,
    pub action_loading: bool,
    pub forcing: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct RequestsState {
    requests: Vec<RideRequest>,
    phase: RefreshPhase,
    error: Option<String>,
    action_loading: bool,
    forcing: bool,
    mounted: bool,
    fingerprint: Option<String>,
    lookups_in_flight: HashSet<EntityId>,
    last_synced_at: Option<DateTime<Utc>>,
}

/// Collapse a list to sorted `(id, status)` pairs, serialized.
pub fn status_fingerprint(requests: &[RideRequest]) -> String {
    let mut pairs: Vec<(&str, &str)> = requests
        .iter()
        .map(|r| (r.id.as_str(), r.display_status().as_str()))
        .collect();
    pairs.sort_unstable();
    serde_json::to_string(&pairs).unwrap_or_default()
}

/// Most recent first; ties keep backend order.
pub fn sort_by_recency(requests: &mut [RideRequest]) {
    requests.sort_by_key(|r| std::cmp::Reverse(r.recency()));
}

pub struct RequestsView {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn RideApi>,
    user: SessionUser,
    polling: PollingConfig,
    notifier: Notifier,
    state: Mutex<RequestsState>,
    shutdown: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl RequestsView {
    pub fn new(
        api: Arc<dyn RideApi>,
        user: SessionUser,
        polling: PollingConfig,
        notifier: Notifier,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                user,
                polling,
                notifier,
                state: Mutex::new(RequestsState::default()),
                shutdown: CancellationToken::new(),
                tasks: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Blocking load, then start the settle fetch and the periodic poll.
    /// Mounting twice is a no-op.
    pub async fn mount(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            if state.mounted {
                return Ok(());
            }
            state.mounted = true;
        }
        let loaded = self.inner.load().await;
        self.inner.spawn_refresh_loop();
        loaded
    }

    /// Blocking load again after a failure.
    pub async fn retry(&self) -> Result<()> {
        self.inner.load().await
    }

    /// Manual silent refresh. Returns whether any status changed.
    pub async fn refresh(&self) -> Result<bool> {
        self.inner.silent_fetch(true).await
    }

    /// Targeted re-fetch of every displayed request, one at a time, in
    /// display order. Returns how many entries changed.
    pub async fn force_update(&self) -> usize {
        self.inner.force_update().await
    }

    /// Re-fetch one ride and apply the user's status if it moved.
    pub async fn refetch_ride(&self, ride_id: &EntityId) -> Option<RequestStatus> {
        self.inner.refetch_ride(ride_id).await
    }

    pub async fn cancel_request(&self, request_id: &EntityId, confirm: &dyn Confirm) -> CancelOutcome {
        self.inner.cancel_request(request_id, confirm).await
    }

    pub async fn snapshot(&self) -> RequestsSnapshot {
        let state = self.inner.state.lock().await;
        RequestsSnapshot {
            requests: state.requests.clone(),
            phase: state.phase,
            error: state.error.clone(),
            action_loading: state.action_loading,
            forcing: state.forcing,
            last_synced_at: state.last_synced_at,
        }
    }

    /// Stop the poll and every pending deferred lookup. Later results are
    /// discarded.
    pub fn teardown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        debug!("requests view torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Drop for RequestsView {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Inner {
    fn track(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|t| !t.is_finished());
            tasks.push(task);
        }
    }

    async fn load(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.phase == RefreshPhase::Loading {
                return Ok(());
            }
            state.phase = RefreshPhase::Loading;
            state.error = None;
        }

        match self.api.list_my_requests().await {
            Ok(fetched) => {
                info!(count = fetched.len(), "ride requests loaded");
                self.apply(fetched).await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "loading ride requests failed");
                let mut state = self.state.lock().await;
                state.phase = RefreshPhase::Idle;
                state.error = Some(e.user_message("Failed to load your ride requests"));
                drop(state);
                if e.is_auth_failure() {
                    self.notifier.login_required();
                }
                Err(e)
            }
        }
    }

    fn spawn_refresh_loop(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let token = self.shutdown.clone();
        let settle = Duration::from_millis(self.polling.settle_delay_ms);
        let every = Duration::from_millis(self.polling.interval_ms.max(1));
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let settle = tokio::time::sleep(settle);
            tokio::pin!(settle);
            let mut settled = false;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = &mut settle, if !settled => {
                        settled = true;
                        let _ = inner.silent_fetch(false).await;
                    }
                    _ = interval.tick() => {
                        let _ = inner.silent_fetch(false).await;
                    }
                }
            }
        });
        self.track(task);
    }

    /// Non-blocking fetch. Skipped while any other fetch is in flight.
    async fn silent_fetch(self: &Arc<Self>, user_initiated: bool) -> Result<bool> {
        {
            let mut state = self.state.lock().await;
            if self.shutdown.is_cancelled() || state.phase != RefreshPhase::Idle {
                debug!(phase = ?state.phase, "refresh skipped");
                return Ok(false);
            }
            state.phase = RefreshPhase::Refreshing;
        }

        match self.api.list_my_requests().await {
            Ok(fetched) => Ok(self.apply(fetched).await),
            Err(e) => {
                self.state.lock().await.phase = RefreshPhase::Idle;
                if user_initiated {
                    self.notifier.failure(&e, "Failed to refresh requests");
                } else {
                    warn!(error = %e, "periodic refresh failed");
                    if e.is_auth_failure() {
                        self.notifier.login_required();
                    }
                }
                Err(e)
            }
        }
    }

    /// Normalize, guard, sort and publish a fetched list. Returns whether the
    /// (id, status) set changed relative to the previous list.
    async fn apply(self: &Arc<Self>, fetched: Vec<RideRequest>) -> bool {
        let normalized: Vec<_> = fetched
            .iter()
            .map(|r| normalize_request(r, &self.user))
            .collect();

        let mut state = self.state.lock().await;
        if self.shutdown.is_cancelled() {
            return false;
        }

        let previous: HashMap<EntityId, RequestStatus> = state
            .requests
            .iter()
            .map(|r| (r.id.clone(), r.display_status()))
            .collect();

        let mut lookups = Vec::new();
        let mut list = Vec::with_capacity(normalized.len());
        for item in normalized {
            let mut request = item.request;
            if !item.source.is_explicit()
                && let Some(prev) = previous.get(&request.id).copied()
                && prev.is_terminal()
            {
                debug!(request_id = %request.id, status = %prev, "keeping terminal status");
                request.status = Some(prev);
            }
            if let Some(ride_id) = item.lookup
                && state.lookups_in_flight.insert(ride_id.clone())
            {
                lookups.push(ride_id);
            }
            list.push(request);
        }
        sort_by_recency(&mut list);

        let fingerprint = status_fingerprint(&list);
        let changed = state
            .fingerprint
            .as_ref()
            .is_some_and(|old| *old != fingerprint);

        state.requests = list;
        state.fingerprint = Some(fingerprint);
        state.phase = RefreshPhase::Idle;
        state.error = None;
        state.last_synced_at = Some(Utc::now());
        drop(state);

        if changed {
            self.notifier.success("Request status updated");
        }
        for ride_id in lookups {
            self.schedule_lookup(ride_id);
        }
        changed
    }

    fn schedule_lookup(self: &Arc<Self>, ride_id: EntityId) {
        let inner = Arc::clone(self);
        let token = self.shutdown.clone();
        let defer = Duration::from_millis(self.polling.refetch_defer_ms);
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(defer) => {
                    inner.refetch_ride(&ride_id).await;
                }
            }
            inner.state.lock().await.lookups_in_flight.remove(&ride_id);
        });
        self.track(task);
    }

    async fn refetch_ride(&self, ride_id: &EntityId) -> Option<RequestStatus> {
        {
            let state = self.state.lock().await;
            if self.shutdown.is_cancelled() || state.phase != RefreshPhase::Idle {
                debug!(ride_id = %ride_id, "targeted refetch skipped, fetch in flight");
                return None;
            }
        }

        let ride = match self.api.get_ride(ride_id).await {
            Ok(ride) => ride,
            Err(e) => {
                warn!(ride_id = %ride_id, error = %e, "targeted ride refetch failed");
                return None;
            }
        };
        let Some(fresh) = ride_status_for(&ride, &self.user) else {
            debug!(ride_id = %ride_id, "user not among ride passengers");
            return None;
        };

        let mut state = self.state.lock().await;
        if self.shutdown.is_cancelled() {
            return None;
        }
        let idx = state
            .requests
            .iter()
            .position(|r| r.resolved_ride_id() == Some(ride_id))?;
        let current = state.requests[idx].display_status();
        if current == fresh || (current.is_terminal() && fresh == RequestStatus::Pending) {
            return None;
        }

        let mut updated = state.requests[idx].clone();
        updated.status = Some(fresh);
        updated.ride = Some(RideRef::Embedded(Box::new(ride)));
        state.requests[idx] = updated;
        let fingerprint = status_fingerprint(&state.requests);
        state.fingerprint = Some(fingerprint);
        drop(state);

        info!(ride_id = %ride_id, from = %current, to = %fresh, "request status changed");
        self.notifier
            .success(format!("Your ride request is now {}", fresh));
        Some(fresh)
    }

    async fn force_update(&self) -> usize {
        let ride_ids: Vec<EntityId> = {
            let mut state = self.state.lock().await;
            if state.phase == RefreshPhase::Loading || state.forcing {
                return 0;
            }
            state.forcing = true;
            state
                .requests
                .iter()
                .filter_map(|r| r.resolved_ride_id().cloned())
                .collect()
        };

        let mut changed = 0;
        for ride_id in &ride_ids {
            if self.shutdown.is_cancelled() {
                break;
            }
            if self.refetch_ride(ride_id).await.is_some() {
                changed += 1;
            }
        }

        self.state.lock().await.forcing = false;
        if changed == 0 && !self.shutdown.is_cancelled() {
            self.notifier.info("All request statuses are up to date");
        }
        changed
    }

    async fn cancel_request(&self, request_id: &EntityId, confirm: &dyn Confirm) -> CancelOutcome {
        {
            let state = self.state.lock().await;
            let Some(request) = state.requests.iter().find(|r| &r.id == request_id) else {
                return CancelOutcome::Unknown;
            };
            if state.action_loading {
                return CancelOutcome::Busy;
            }
            if request.display_status() != RequestStatus::Pending {
                drop(state);
                self.notifier.error("Only pending requests can be cancelled");
                return CancelOutcome::NotCancellable;
            }
        }

        if !confirm.confirm("Cancel this ride request?") {
            return CancelOutcome::Declined;
        }

        {
            let mut state = self.state.lock().await;
            if state.action_loading {
                return CancelOutcome::Busy;
            }
            state.action_loading = true;
        }
        let result = self.api.cancel_request(request_id).await;
        let mut state = self.state.lock().await;
        state.action_loading = false;

        match result {
            Ok(()) => {
                state.requests.retain(|r| &r.id != request_id);
                let fingerprint = status_fingerprint(&state.requests);
                state.fingerprint = Some(fingerprint);
                drop(state);
                info!(request_id = %request_id, "ride request cancelled");
                self.notifier.success("Ride request cancelled");
                CancelOutcome::Cancelled
            }
            Err(e) => {
                drop(state);
                warn!(request_id = %request_id, error = %e, "cancel failed");
                let message = e.user_message("Failed to cancel request");
                self.notifier.failure(&e, "Failed to cancel request");
                CancelOutcome::Failed(message)
            }
        }
    }
}
