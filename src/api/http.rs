use std::fmt;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::api::RideApi;
use crate::config::Config;
use crate::envelope::{Payload, error_message};
use crate::error::{Result, RideAlongError};
use crate::ids::EntityId;
use crate::models::{
    MatchQuery, RatingInput, ReportInput, Ride, RideRequest, RideRequestInput,
};

/// `reqwest` implementation of [`RideApi`].
#[derive(Clone)]
pub struct HttpRideApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl fmt::Debug for HttpRideApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRideApi")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpRideApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ride-along/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build reqwest client with timeout")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.api.base_url.clone(),
            config.runtime.api_token.clone(),
            Duration::from_millis(config.api.timeout_ms),
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send, map HTTP failures onto the error taxonomy, and resolve the
    /// response shape.
    async fn send(&self, builder: RequestBuilder, resource: &str) -> Result<Payload> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), resource, bytes = body.len(), "backend response");

        match status {
            StatusCode::UNAUTHORIZED => return Err(RideAlongError::Unauthorized),
            StatusCode::NOT_FOUND => {
                return Err(RideAlongError::NotFound {
                    resource: resource.to_string(),
                });
            }
            s if !s.is_success() => {
                return Err(RideAlongError::Api {
                    status: s.as_u16(),
                    message: error_message(&body),
                });
            }
            _ => {}
        }

        if body.trim().is_empty() {
            return Ok(Payload::Single(serde_json::Value::Null));
        }
        let value: serde_json::Value = serde_json::from_str(&body)?;
        Ok(Payload::from_value(value))
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        resource: &str,
    ) -> Result<Payload> {
        self.send(self.request(method, path).json(body), resource).await
    }
}

#[async_trait]
impl RideApi for HttpRideApi {
    async fn list_my_requests(&self) -> Result<Vec<RideRequest>> {
        let payload = self
            .send(self.request(Method::GET, "rides/requests/me"), "Ride requests")
            .await?;
        Ok(payload.into_list())
    }

    async fn get_ride(&self, ride_id: &EntityId) -> Result<Ride> {
        let payload = self
            .send(self.request(Method::GET, &format!("rides/{}", ride_id)), "Ride")
            .await?;
        payload.into_one("Ride")
    }

    async fn cancel_request(&self, request_id: &EntityId) -> Result<()> {
        self.send(
            self.request(Method::DELETE, &format!("rides/requests/{}", request_id)),
            "Ride request",
        )
        .await?;
        Ok(())
    }

    async fn list_rides(&self) -> Result<Vec<Ride>> {
        let payload = self.send(self.request(Method::GET, "rides"), "Rides").await?;
        Ok(payload.into_list())
    }

    async fn best_matching_rides(&self, query: &MatchQuery) -> Result<Vec<Ride>> {
        let payload = self
            .send(
                self.request(Method::GET, "rides/best-matches")
                    .query(&query.to_query_pairs()),
                "Rides",
            )
            .await?;
        Ok(payload.into_list())
    }

    async fn request_ride(&self, ride_id: &EntityId, input: &RideRequestInput) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("rides/{}/request", ride_id),
            input,
            "Ride",
        )
        .await?;
        Ok(())
    }

    async fn rate_user(&self, user_id: &EntityId, input: &RatingInput) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("users/{}/ratings", user_id),
            input,
            "User",
        )
        .await?;
        Ok(())
    }

    async fn report_user(&self, input: &ReportInput) -> Result<()> {
        self.send_json(Method::POST, "reports", input, "User").await?;
        Ok(())
    }
}
