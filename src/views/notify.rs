//! User-visible notifications.
//!
//! Views never print. They push [`Notification`]s into a channel and the
//! front end (CLI, dashboard) decides how to show them.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::RideAlongError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
    /// The session was rejected; the front end should send the user to log in.
    LoginRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Self, NotificationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, level: NotificationLevel, message: impl Into<String>) {
        let notification = Notification {
            level,
            message: message.into(),
        };
        // A closed receiver means the front end is gone; nothing to show.
        if self.tx.send(notification).is_err() {
            tracing::trace!("notification dropped, receiver closed");
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(NotificationLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(NotificationLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(NotificationLevel::Error, message);
    }

    pub fn login_required(&self) {
        self.push(NotificationLevel::LoginRequired, "Session expired");
    }

    /// Surface a failed user-initiated action.
    pub fn failure(&self, err: &RideAlongError, fallback: &str) {
        self.error(err.user_message(fallback));
        if err.is_auth_failure() {
            self.login_required();
        }
    }
}
