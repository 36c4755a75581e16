//! Post-ride feedback: driver ratings and user reports.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::RideApi;
use crate::error::{Result, RideAlongError};
use crate::ids::EntityId;
use crate::models::{RatingInput, ReportInput};
use crate::views::notify::Notifier;

pub const MAX_COMMENT_CHARS: usize = 500;

pub struct FeedbackActions {
    api: Arc<dyn RideApi>,
    notifier: Notifier,
}

fn invalid(message: &str) -> RideAlongError {
    RideAlongError::Validation {
        message: message.to_string(),
    }
}

fn clean(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

impl FeedbackActions {
    pub fn new(api: Arc<dyn RideApi>, notifier: Notifier) -> Self {
        Self { api, notifier }
    }

    pub async fn rate_driver(
        &self,
        ride_id: &EntityId,
        driver_id: &EntityId,
        score: u8,
        comment: Option<String>,
    ) -> Result<()> {
        let comment = clean(comment);
        let problem = if !(1..=5).contains(&score) {
            Some("Rating must be between 1 and 5")
        } else if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
        {
            Some("Comment must be at most 500 characters")
        } else {
            None
        };
        if let Some(message) = problem {
            self.notifier.error(message);
            return Err(invalid(message));
        }

        let input = RatingInput {
            ride_id: ride_id.clone(),
            score,
            comment,
        };
        match self.api.rate_user(driver_id, &input).await {
            Ok(()) => {
                info!(ride_id = %ride_id, driver_id = %driver_id, score, "driver rated");
                self.notifier.success("Thanks for rating your driver");
                Ok(())
            }
            Err(e) => {
                warn!(driver_id = %driver_id, error = %e, "rating failed");
                self.notifier.failure(&e, "Failed to submit rating");
                Err(e)
            }
        }
    }

    pub async fn report_user(
        &self,
        user_id: &EntityId,
        reason: &str,
        details: Option<String>,
        ride_id: Option<EntityId>,
    ) -> Result<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            let message = "Please give a reason for the report";
            self.notifier.error(message);
            return Err(invalid(message));
        }

        let input = ReportInput {
            reported_user: user_id.clone(),
            reason: reason.to_string(),
            details: clean(details),
            ride_id,
        };
        match self.api.report_user(&input).await {
            Ok(()) => {
                info!(user_id = %user_id, "user reported");
                self.notifier.success("Report submitted");
                Ok(())
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "report failed");
                self.notifier.failure(&e, "Failed to submit report");
                Err(e)
            }
        }
    }
}
