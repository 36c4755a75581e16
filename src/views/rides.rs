//! Ride browsing: full list, best-match search, details and join requests.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::RideApi;
use crate::error::{Result, RideAlongError};
use crate::geocoding::{Geocoder, enrich_location};
use crate::ids::{EntityId, SessionUser};
use crate::models::{Location, MatchQuery, RequestStatus, Ride, RideRequestInput};
use crate::normalizer::ride_status_for;
use crate::views::notify::Notifier;

/// A ride annotated for the session user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideListing {
    pub ride: Ride,
    /// The user's standing on this ride, if they appear among its passengers.
    pub my_status: Option<RequestStatus>,
    pub is_own: bool,
}

impl RideListing {
    pub fn new(ride: Ride, user: &SessionUser) -> Self {
        let my_status = ride_status_for(&ride, user);
        let is_own = ride.creator.as_ref().is_some_and(|c| user.matches(c));
        Self {
            ride,
            my_status,
            is_own,
        }
    }

    pub fn already_requested(&self) -> bool {
        matches!(
            self.my_status,
            Some(RequestStatus::Pending | RequestStatus::Confirmed)
        )
    }

    /// Reason a join request would be refused, if any.
    pub fn request_blocker(&self) -> Option<&'static str> {
        if self.is_own {
            Some("You cannot request your own ride")
        } else if self.already_requested() {
            Some("You have already requested this ride")
        } else if self.ride.is_full() {
            Some("This ride is full")
        } else if !self.ride.is_open() {
            Some("This ride is no longer available")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RidesSnapshot {
    pub listings: Vec<RideListing>,
    pub loading: bool,
    pub error: Option<String>,
    pub action_loading: bool,
}

#[derive(Debug, Default)]
struct RidesState {
    listings: Vec<RideListing>,
    loading: bool,
    error: Option<String>,
    action_loading: bool,
}

pub struct RidesView {
    api: Arc<dyn RideApi>,
    geocoder: Option<Arc<dyn Geocoder>>,
    user: SessionUser,
    notifier: Notifier,
    state: Mutex<RidesState>,
}

impl RidesView {
    pub fn new(api: Arc<dyn RideApi>, user: SessionUser, notifier: Notifier) -> Self {
        Self {
            api,
            geocoder: None,
            user,
            notifier,
            state: Mutex::new(RidesState::default()),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub async fn load_all(&self) -> Result<()> {
        self.load(None).await
    }

    pub async fn search(&self, query: MatchQuery) -> Result<()> {
        self.load(Some(query)).await
    }

    async fn load(&self, query: Option<MatchQuery>) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.loading = true;
            state.error = None;
        }

        let fetched = match &query {
            Some(q) => self.api.best_matching_rides(q).await,
            None => self.api.list_rides().await,
        };

        let rides = match fetched {
            Ok(rides) => rides,
            Err(e) => {
                warn!(error = %e, search = query.is_some(), "loading rides failed");
                let mut state = self.state.lock().await;
                state.loading = false;
                state.error = Some(e.user_message("Failed to load rides"));
                drop(state);
                if e.is_auth_failure() {
                    self.notifier.login_required();
                }
                return Err(e);
            }
        };

        let mut listings = Vec::with_capacity(rides.len());
        for mut ride in rides {
            self.enrich(&mut ride).await;
            listings.push(RideListing::new(ride, &self.user));
        }
        info!(count = listings.len(), search = query.is_some(), "rides loaded");

        let mut state = self.state.lock().await;
        state.listings = listings;
        state.loading = false;
        Ok(())
    }

    async fn enrich(&self, ride: &mut Ride) {
        let Some(geocoder) = self.geocoder.as_deref() else {
            return;
        };
        for location in [ride.pickup.as_mut(), ride.dropoff.as_mut()]
            .into_iter()
            .flatten()
        {
            enrich_location(geocoder, location).await;
        }
    }

    /// Fetch a single ride. A missing ride surfaces as "Ride not found".
    pub async fn details(&self, ride_id: &EntityId) -> Result<RideListing> {
        match self.api.get_ride(ride_id).await {
            Ok(mut ride) => {
                self.enrich(&mut ride).await;
                Ok(RideListing::new(ride, &self.user))
            }
            Err(e) => {
                debug!(ride_id = %ride_id, error = %e, "ride details failed");
                self.notifier.failure(&e, "Failed to load ride");
                Err(e)
            }
        }
    }

    /// Ask to join a ride. On success the listing is marked pending locally.
    pub async fn request_ride(
        &self,
        ride_id: &EntityId,
        pickup: Option<Location>,
        dropoff: Option<Location>,
    ) -> Result<()> {
        let listed = {
            let state = self.state.lock().await;
            if state.action_loading {
                return Err(RideAlongError::Validation {
                    message: "Another action is in progress".into(),
                });
            }
            state
                .listings
                .iter()
                .find(|l| l.ride.id.as_ref() == Some(ride_id))
                .cloned()
        };
        let listing = match listed {
            Some(listing) => listing,
            None => self.details(ride_id).await?,
        };

        if let Some(reason) = listing.request_blocker() {
            self.notifier.error(reason);
            return Err(RideAlongError::Validation {
                message: reason.to_string(),
            });
        }

        let input = RideRequestInput {
            pickup: pickup.or_else(|| listing.ride.pickup.clone()),
            dropoff: dropoff.or_else(|| listing.ride.dropoff.clone()),
            seats: 1,
        };

        self.state.lock().await.action_loading = true;
        let result = self.api.request_ride(ride_id, &input).await;
        let mut state = self.state.lock().await;
        state.action_loading = false;

        match result {
            Ok(()) => {
                if let Some(entry) = state
                    .listings
                    .iter_mut()
                    .find(|l| l.ride.id.as_ref() == Some(ride_id))
                {
                    entry.my_status = Some(RequestStatus::Pending);
                }
                drop(state);
                info!(ride_id = %ride_id, "ride requested");
                self.notifier.success("Ride requested");
                Ok(())
            }
            Err(e) => {
                drop(state);
                warn!(ride_id = %ride_id, error = %e, "ride request failed");
                self.notifier.failure(&e, "Failed to request ride");
                Err(e)
            }
        }
    }

    pub async fn snapshot(&self) -> RidesSnapshot {
        let state = self.state.lock().await;
        RidesSnapshot {
            listings: state.listings.clone(),
            loading: state.loading,
            error: state.error.clone(),
            action_loading: state.action_loading,
        }
    }
}
