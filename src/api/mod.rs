//! Backend REST collaborator.

pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::EntityId;
use crate::models::{
    MatchQuery, RatingInput, ReportInput, Ride, RideRequest, RideRequestInput,
};

pub use http::HttpRideApi;

/// Operations the ride-sharing backend exposes to this client.
///
/// Response-shape differences are resolved inside implementations; callers
/// receive typed values.
#[async_trait]
pub trait RideApi: Send + Sync {
    async fn list_my_requests(&self) -> Result<Vec<RideRequest>>;

    async fn get_ride(&self, ride_id: &EntityId) -> Result<Ride>;

    async fn cancel_request(&self, request_id: &EntityId) -> Result<()>;

    async fn list_rides(&self) -> Result<Vec<Ride>>;

    async fn best_matching_rides(&self, query: &MatchQuery) -> Result<Vec<Ride>>;

    async fn request_ride(&self, ride_id: &EntityId, input: &RideRequestInput) -> Result<()>;

    async fn rate_user(&self, user_id: &EntityId, input: &RatingInput) -> Result<()>;

    async fn report_user(&self, input: &ReportInput) -> Result<()>;
}
