//! Lifecycle events delivered to the worker and their outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::network::{Request, Response};
use crate::notification::{Action, Notification, PUSH_TAG};

/// Tag of the one-shot background sync.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Tag of the recurring periodic sync.
pub const PERIODIC_SYNC_TAG: &str = "daily-update";

/// A push message, optionally carrying text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Message payload as text; `None` when the push carried no data.
    #[serde(default)]
    pub text: Option<String>,
}

/// A click on a shown notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Action button pressed; `None` when the body was clicked.
    #[serde(default)]
    pub action: Option<String>,
    /// Tag of the clicked notification.
    #[serde(default = "default_click_tag")]
    pub tag: String,
}

fn default_click_tag() -> String {
    PUSH_TAG.to_string()
}

impl ClickEvent {
    /// A click on the push notification with the given action.
    #[must_use]
    pub fn on_push(action: Option<&str>) -> Self {
        Self {
            action: action.map(str::to_string),
            tag: default_click_tag(),
        }
    }
}

/// Every event the host may deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// First start; populate the cache.
    Install,
    /// A page request to answer.
    Fetch(Request),
    /// A push message arrived.
    Push(PushEvent),
    /// The user clicked a notification or one of its actions.
    NotificationClick(ClickEvent),
    /// One-shot background sync.
    Sync {
        /// Registration tag.
        tag: String,
    },
    /// Recurring periodic sync.
    PeriodicSync {
        /// Registration tag.
        tag: String,
    },
}

impl Event {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Install => EventKind::Install,
            Self::Fetch(_) => EventKind::Fetch,
            Self::Push(_) => EventKind::Push,
            Self::NotificationClick(_) => EventKind::NotificationClick,
            Self::Sync { .. } => EventKind::Sync,
            Self::PeriodicSync { .. } => EventKind::PeriodicSync,
        }
    }
}

/// Event names as the host spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `install`
    Install,
    /// `fetch`
    Fetch,
    /// `push`
    Push,
    /// `notificationclick`
    NotificationClick,
    /// `sync`
    Sync,
    /// `periodicsync`
    PeriodicSync,
}

impl EventKind {
    /// All event kinds the worker handles.
    pub const ALL: [Self; 6] = [
        Self::Install,
        Self::Fetch,
        Self::Push,
        Self::NotificationClick,
        Self::Sync,
        Self::PeriodicSync,
    ];

    /// Host event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Fetch => "fetch",
            Self::Push => "push",
            Self::NotificationClick => "notificationclick",
            Self::Sync => "sync",
            Self::PeriodicSync => "periodicsync",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a completed install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Bucket that was populated.
    pub cache_name: String,
    /// Keys written, in precache order.
    pub cached: Vec<String>,
}

/// What a notification click did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ClickOutcome {
    /// The notification was closed and the app window opened.
    Opened {
        /// Action that led here.
        action: Action,
        /// URL of the opened window.
        url: String,
    },
    /// The notification was closed and nothing else happened.
    Dismissed,
}

/// Result of one sync routine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Key whose cache entry was overwritten.
    pub data_path: String,
    /// Size of the re-serialized document.
    pub bytes: usize,
    /// Whether the daily notification was shown.
    pub daily_notification: bool,
}

/// Outcome of a sync event after the best-effort policy is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The tag is not one this worker handles.
    Ignored,
    /// The routine ran to completion.
    Completed(SyncReport),
    /// The routine failed; the error was logged and swallowed.
    Failed {
        /// Rendered error.
        error: String,
    },
}

/// Outcome of dispatching an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The cache was populated.
    Installed(InstallReport),
    /// The page request was answered.
    Responded(Response),
    /// This notification was shown.
    Notified(Notification),
    /// The click was routed.
    Clicked(ClickOutcome),
    /// The sync ran, failed or was ignored.
    Synced(SyncOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds_cover_six_host_events() {
        let names: Vec<_> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "install",
                "fetch",
                "push",
                "notificationclick",
                "sync",
                "periodicsync"
            ]
        );
    }

    #[test]
    fn event_kind_mapping() {
        assert_eq!(Event::Install.kind(), EventKind::Install);
        assert_eq!(Event::Fetch(Request::get("/")).kind(), EventKind::Fetch);
        assert_eq!(
            Event::PeriodicSync {
                tag: PERIODIC_SYNC_TAG.to_string()
            }
            .kind(),
            EventKind::PeriodicSync
        );
    }

    #[test]
    fn click_event_defaults_to_push_tag() {
        let click: ClickEvent = serde_json::from_str("{}").unwrap();
        assert_eq!(click.tag, PUSH_TAG);
        assert_eq!(click.action, None);

        let click: ClickEvent = serde_json::from_str(r#"{"action":"close"}"#).unwrap();
        assert_eq!(click, ClickEvent::on_push(Some("close")));
    }

    #[test]
    fn push_event_payload_is_optional() {
        let push: PushEvent = serde_json::from_str("{}").unwrap();
        assert_eq!(push.text, None);
        let push: PushEvent = serde_json::from_str(r#"{"text":"Standings changed"}"#).unwrap();
        assert_eq!(push.text.as_deref(), Some("Standings changed"));
    }
}
