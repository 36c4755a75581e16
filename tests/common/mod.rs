#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use ride_along::api::RideApi;
use ride_along::config::PollingConfig;
use ride_along::error::{Result, RideAlongError};
use ride_along::ids::EntityId;
use ride_along::models::{
    MatchQuery, RatingInput, ReportInput, Ride, RideRequest, RideRequestInput,
};
use ride_along::views::{Notification, NotificationReceiver};

/// Scripted backend failure. `RideAlongError` is not `Clone`, so tests
/// describe the error and the fake builds a fresh one per call.
#[derive(Debug, Clone)]
pub enum Failure {
    Unauthorized,
    NotFound(&'static str),
    Api(u16, Option<&'static str>),
    Transport,
}

impl Failure {
    fn build(&self) -> RideAlongError {
        match self {
            Failure::Unauthorized => RideAlongError::Unauthorized,
            Failure::NotFound(resource) => RideAlongError::NotFound {
                resource: resource.to_string(),
            },
            Failure::Api(status, message) => RideAlongError::Api {
                status: *status,
                message: message.map(str::to_string),
            },
            Failure::Transport => RideAlongError::Transport {
                message: "connection refused".into(),
            },
        }
    }
}

type Scripted<T> = std::result::Result<T, Failure>;

/// In-memory `RideApi`. List responses are consumed in order and the last one
/// repeats forever.
#[derive(Default)]
pub struct FakeApi {
    my_requests: Mutex<VecDeque<Scripted<Vec<RideRequest>>>>,
    rides: Mutex<HashMap<EntityId, Scripted<Ride>>>,
    all_rides: Mutex<Vec<Ride>>,
    matches: Mutex<Vec<Ride>>,
    cancel_result: Mutex<Option<Failure>>,
    request_result: Mutex<Option<Failure>>,
    feedback_result: Mutex<Option<Failure>>,
    ride_delay: Mutex<Option<Duration>>,
    list_delay: Mutex<Option<Duration>>,
    cancel_delay: Mutex<Option<Duration>>,

    pub list_calls: Mutex<usize>,
    pub ride_calls: Mutex<Vec<EntityId>>,
    pub cancel_calls: Mutex<Vec<EntityId>>,
    pub join_calls: Mutex<Vec<(EntityId, RideRequestInput)>>,
    pub match_calls: Mutex<Vec<MatchQuery>>,
    pub ratings: Mutex<Vec<(EntityId, RatingInput)>>,
    pub reports: Mutex<Vec<ReportInput>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_requests(&self, values: Vec<Value>) -> &Self {
        let parsed = values
            .into_iter()
            .map(|v| serde_json::from_value(v).expect("valid request fixture"))
            .collect();
        self.my_requests.lock().unwrap().push_back(Ok(parsed));
        self
    }

    pub fn push_requests_failure(&self, failure: Failure) -> &Self {
        self.my_requests.lock().unwrap().push_back(Err(failure));
        self
    }

    pub fn set_ride(&self, id: &str, value: Value) -> &Self {
        let ride = serde_json::from_value(value).expect("valid ride fixture");
        self.rides.lock().unwrap().insert(EntityId::from(id), Ok(ride));
        self
    }

    pub fn set_ride_failure(&self, id: &str, failure: Failure) -> &Self {
        self.rides.lock().unwrap().insert(EntityId::from(id), Err(failure));
        self
    }

    pub fn set_all_rides(&self, values: Vec<Value>) -> &Self {
        *self.all_rides.lock().unwrap() = values
            .into_iter()
            .map(|v| serde_json::from_value(v).expect("valid ride fixture"))
            .collect();
        self
    }

    pub fn set_matches(&self, values: Vec<Value>) -> &Self {
        *self.matches.lock().unwrap() = values
            .into_iter()
            .map(|v| serde_json::from_value(v).expect("valid ride fixture"))
            .collect();
        self
    }

    pub fn fail_cancel(&self, failure: Failure) -> &Self {
        *self.cancel_result.lock().unwrap() = Some(failure);
        self
    }

    pub fn fail_join(&self, failure: Failure) -> &Self {
        *self.request_result.lock().unwrap() = Some(failure);
        self
    }

    pub fn fail_feedback(&self, failure: Failure) -> &Self {
        *self.feedback_result.lock().unwrap() = Some(failure);
        self
    }

    pub fn delay_rides(&self, delay: Duration) -> &Self {
        *self.ride_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn delay_lists(&self, delay: Duration) -> &Self {
        *self.list_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn delay_cancels(&self, delay: Duration) -> &Self {
        *self.cancel_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn list_count(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    pub fn ride_lookups(&self) -> Vec<EntityId> {
        self.ride_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RideApi for FakeApi {
    async fn list_my_requests(&self) -> Result<Vec<RideRequest>> {
        *self.list_calls.lock().unwrap() += 1;
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = {
            let mut queue = self.my_requests.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };
        match next {
            Some(Ok(list)) => Ok(list),
            Some(Err(failure)) => Err(failure.build()),
            None => Ok(Vec::new()),
        }
    }

    async fn get_ride(&self, ride_id: &EntityId) -> Result<Ride> {
        self.ride_calls.lock().unwrap().push(ride_id.clone());
        let delay = *self.ride_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let found = self.rides.lock().unwrap().get(ride_id).cloned();
        match found {
            Some(Ok(ride)) => Ok(ride),
            Some(Err(failure)) => Err(failure.build()),
            None => Err(Failure::NotFound("Ride").build()),
        }
    }

    async fn cancel_request(&self, request_id: &EntityId) -> Result<()> {
        self.cancel_calls.lock().unwrap().push(request_id.clone());
        let delay = *self.cancel_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.cancel_result.lock().unwrap().as_ref() {
            Some(failure) => Err(failure.build()),
            None => Ok(()),
        }
    }

    async fn list_rides(&self) -> Result<Vec<Ride>> {
        Ok(self.all_rides.lock().unwrap().clone())
    }

    async fn best_matching_rides(&self, query: &MatchQuery) -> Result<Vec<Ride>> {
        self.match_calls.lock().unwrap().push(*query);
        Ok(self.matches.lock().unwrap().clone())
    }

    async fn request_ride(&self, ride_id: &EntityId, input: &RideRequestInput) -> Result<()> {
        self.join_calls
            .lock()
            .unwrap()
            .push((ride_id.clone(), input.clone()));
        match self.request_result.lock().unwrap().as_ref() {
            Some(failure) => Err(failure.build()),
            None => Ok(()),
        }
    }

    async fn rate_user(&self, user_id: &EntityId, input: &RatingInput) -> Result<()> {
        self.ratings
            .lock()
            .unwrap()
            .push((user_id.clone(), input.clone()));
        match self.feedback_result.lock().unwrap().as_ref() {
            Some(failure) => Err(failure.build()),
            None => Ok(()),
        }
    }

    async fn report_user(&self, input: &ReportInput) -> Result<()> {
        self.reports.lock().unwrap().push(input.clone());
        match self.feedback_result.lock().unwrap().as_ref() {
            Some(failure) => Err(failure.build()),
            None => Ok(()),
        }
    }
}

/// Polling that never fires on its own during a test.
pub fn quiet_polling() -> PollingConfig {
    PollingConfig {
        interval_ms: 3_600_000,
        settle_delay_ms: 3_600_000,
        refetch_defer_ms: 10,
    }
}

pub fn drain(rx: &mut NotificationReceiver) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(note) = rx.try_recv() {
        out.push(note);
    }
    out
}

/// Let spawned tasks and short timers run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}
