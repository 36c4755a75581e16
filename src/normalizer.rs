//! Ride-request status normalization.
//!
//! The backend reports a user's status for a ride in several places, none of
//! them reliable on its own. [`normalize_request`] applies a fixed precedence
//! and yields exactly one canonical status per (user, ride) pair.
//!
//! Precedence, first match wins:
//!
//! 1. `userRequestStatus` (pre-resolved by the backend)
//! 2. `status`, unless it is the `pending` default
//! 3. the request's own `passengers` entry for the session user
//! 4. the embedded ride's `passengers` entry for the session user
//! 5. `pending`, plus a ride id for a deferred targeted lookup when one is
//!    resolvable
//! 6. `pending`

use serde::Serialize;

use crate::ids::{EntityId, SessionUser};
use crate::models::{PassengerEntry, RequestStatus, Ride, RideRequest};

/// Which precedence step produced the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusSource {
    PreResolved,
    Direct,
    OwnPassengers,
    RidePassengers,
    Default,
}

impl StatusSource {
    /// Sources strong enough to move a terminal status back to pending.
    pub fn is_explicit(self) -> bool {
        !matches!(self, StatusSource::Default)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub request: RideRequest,
    pub source: StatusSource,
    /// Ride whose current state should be fetched out of band.
    pub lookup: Option<EntityId>,
}

impl Normalized {
    pub fn status(&self) -> RequestStatus {
        self.request.display_status()
    }
}

/// Status carried by the session user's entry in `passengers`, if any.
pub fn passenger_status(passengers: &[PassengerEntry], user: &SessionUser) -> Option<RequestStatus> {
    passengers
        .iter()
        .filter(|p| p.user.as_ref().is_some_and(|u| user.matches(u)))
        .find_map(|p| p.status)
}

/// The session user's status on a ride, from its passenger list.
pub fn ride_status_for(ride: &Ride, user: &SessionUser) -> Option<RequestStatus> {
    passenger_status(&ride.passengers, user)
}

pub fn resolve_status(
    request: &RideRequest,
    user: &SessionUser,
) -> (RequestStatus, StatusSource) {
    if let Some(status) = request.user_request_status {
        return (status, StatusSource::PreResolved);
    }
    if let Some(status) = request.status.filter(|s| *s != RequestStatus::Pending) {
        return (status, StatusSource::Direct);
    }
    if let Some(status) = passenger_status(&request.passengers, user) {
        return (status, StatusSource::OwnPassengers);
    }
    if let Some(status) = request
        .embedded_ride()
        .and_then(|ride| ride_status_for(ride, user))
    {
        return (status, StatusSource::RidePassengers);
    }
    (RequestStatus::Pending, StatusSource::Default)
}

/// Produce a copy of `request` with its status replaced by the canonical
/// value. The input is left untouched.
pub fn normalize_request(request: &RideRequest, user: &SessionUser) -> Normalized {
    let (status, source) = resolve_status(request, user);
    let lookup = match source {
        StatusSource::Default => request.resolved_ride_id().cloned(),
        _ => None,
    };
    let mut normalized = request.clone();
    normalized.status = Some(status);
    Normalized {
        request: normalized,
        source,
        lookup,
    }
}
