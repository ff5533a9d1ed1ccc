//! Short-lived user feedback ("toasts").
//!
//! Operations report success or failure through a [`Notifier`]. The
//! [`ToastRelay`] keeps only the newest notice and hides it after
//! [`TOAST_DURATION`]; the [`LogNotifier`] writes notices to the log, which is
//! what the command-line front end uses.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// How long a toast stays visible.
pub const TOAST_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

/// Receives transient notices.
pub trait Notifier {
    fn notify(&self, notice: Notice);
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }
}

/// Logs every notice through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.kind {
            NoticeKind::Success => info!(text = %notice.message, "Notice"),
            NoticeKind::Error => error!(text = %notice.message, "Notice"),
        }
    }
}

/// Holds the single visible toast.
#[derive(Debug, Default)]
pub struct ToastRelay {
    current: Mutex<Option<(Notice, Instant)>>,
}

impl ToastRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// The visible notice, if one was raised less than [`TOAST_DURATION`] ago.
    pub fn current(&self) -> Option<Notice> {
        self.current_at(Instant::now())
    }

    fn current_at(&self, now: Instant) -> Option<Notice> {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current
            .as_ref()
            .filter(|(_, raised)| now.saturating_duration_since(*raised) < TOAST_DURATION)
            .map(|(notice, _)| notice.clone())
    }

    /// Hide the visible notice early.
    pub fn dismiss(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Notifier for ToastRelay {
    fn notify(&self, notice: Notice) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((notice, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_notice_replaces_older() {
        let relay = ToastRelay::new();
        relay.notify(Notice::success("New digest created!"));
        relay.notify(Notice::error("rate limited"));
        assert_eq!(relay.current(), Some(Notice::error("rate limited")));
    }

    #[test]
    fn test_notice_expires() {
        let relay = ToastRelay::new();
        relay.notify(Notice::success("Webhook secret saved!"));
        let later = Instant::now() + TOAST_DURATION + Duration::from_millis(1);
        assert_eq!(relay.current_at(later), None);
        assert!(relay.current().is_some());
    }

    #[test]
    fn test_dismiss() {
        let relay = ToastRelay::new();
        relay.notify(Notice::success("Digest deleted successfully."));
        relay.dismiss();
        assert_eq!(relay.current(), None);
    }
}
