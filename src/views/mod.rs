//! Screen-level controllers. Each view owns its state, talks to the backend
//! through [`RideApi`](crate::api::RideApi) and reports to the user through a
//! [`Notifier`].

pub mod feedback;
pub mod notify;
pub mod requests;
pub mod rides;

pub use feedback::FeedbackActions;
pub use notify::{Notification, NotificationLevel, NotificationReceiver, Notifier};
pub use requests::{CancelOutcome, RefreshPhase, RequestsSnapshot, RequestsView};
pub use rides::{RideListing, RidesSnapshot, RidesView};

/// Yes/no gate in front of destructive actions.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}
