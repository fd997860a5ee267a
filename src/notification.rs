//! Notification descriptors and the host notification seam.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WorkerConfig;
use crate::error::{Error, Result};

/// Title shared by push and daily notifications.
pub const TITLE: &str = "🏆 MLB Wild Card Update!";

/// Body used when a push arrives without a payload.
pub const DEFAULT_PUSH_BODY: &str = "MLB Wild Card standings have been updated!";

/// Body of the daily update notification.
pub const DAILY_BODY: &str = "Your daily wild card race update is ready!";

/// Tag of push notifications; repeated pushes collapse into one.
pub const PUSH_TAG: &str = "mlb-update";

/// Tag of the daily update notification.
pub const DAILY_TAG: &str = "daily-update";

/// Vibration pattern in milliseconds.
pub const VIBRATE_PATTERN: [u32; 3] = [100, 50, 100];

/// Action a user may pick on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// "View Standings" button.
    Explore,
    /// "Close" button.
    Close,
    /// The notification body itself, or any unrecognised action.
    Default,
}

impl Action {
    /// Parses the action identifier carried by a click.
    #[must_use]
    pub fn parse(action: Option<&str>) -> Self {
        match action {
            Some("explore") => Self::Explore,
            Some("close") => Self::Close,
            _ => Self::Default,
        }
    }

    /// Wire identifier of the action, empty for the default action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explore => "explore",
            Self::Close => "close",
            Self::Default => "",
        }
    }
}

/// Button attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Action identifier reported on click.
    pub action: String,
    /// Button label.
    pub title: String,
    /// Button icon.
    pub icon: String,
}

/// Opaque data carried with a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    /// When the triggering event arrived.
    pub date_of_arrival: DateTime<Utc>,
    /// Application-defined key.
    pub primary_key: u32,
    /// URL to open on activation.
    pub url: String,
}

/// A notification to hand to the host for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Heading line.
    pub title: String,
    /// Message text.
    pub body: String,
    /// Large icon URL.
    pub icon: String,
    /// Small monochrome badge URL, if any.
    pub badge: Option<String>,
    /// Vibration pattern in milliseconds, alternating on and off.
    pub vibrate: Vec<u32>,
    /// Payload handed back on click.
    pub data: Option<NotificationData>,
    /// Buttons shown under the message.
    pub actions: Vec<NotificationAction>,
    /// Keep the notification up until the user acts on it.
    pub require_interaction: bool,
    /// Notifications sharing a tag replace each other.
    pub tag: String,
}

impl Notification {
    /// Builds the notification shown for a push message.
    #[must_use]
    pub fn push(config: &WorkerConfig, payload: Option<&str>, arrived: DateTime<Utc>) -> Self {
        Self {
            title: TITLE.to_string(),
            body: payload.unwrap_or(DEFAULT_PUSH_BODY).to_string(),
            icon: config.icon.clone(),
            badge: Some(config.icon.clone()),
            vibrate: VIBRATE_PATTERN.to_vec(),
            data: Some(NotificationData {
                date_of_arrival: arrived,
                primary_key: 1,
                url: config.app_url.clone(),
            }),
            actions: vec![
                NotificationAction {
                    action: Action::Explore.as_str().to_string(),
                    title: "View Standings".to_string(),
                    icon: config.icon.clone(),
                },
                NotificationAction {
                    action: Action::Close.as_str().to_string(),
                    title: "Close".to_string(),
                    icon: config.close_icon.clone(),
                },
            ],
            require_interaction: true,
            tag: PUSH_TAG.to_string(),
        }
    }

    /// Builds the daily update notification shown after a sync.
    #[must_use]
    pub fn daily(config: &WorkerConfig) -> Self {
        Self {
            title: TITLE.to_string(),
            body: DAILY_BODY.to_string(),
            icon: config.icon.clone(),
            badge: None,
            vibrate: Vec::new(),
            data: None,
            actions: Vec::new(),
            require_interaction: false,
            tag: DAILY_TAG.to_string(),
        }
    }
}

/// Abstraction over the host's notification display.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Displays a notification, replacing any shown one with the same tag.
    async fn show(&self, notification: Notification) -> Result<()>;

    /// Closes the notification with `tag`, if shown.
    async fn close(&self, tag: &str) -> Result<()>;
}

/// In-process notification display.
///
/// Keeps the currently visible notifications and logs each display.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    visible: Mutex<Vec<Notification>>,
}

impl NotificationCenter {
    /// Creates an empty notification center.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the currently visible notifications, oldest first.
    #[must_use]
    pub fn visible(&self) -> Vec<Notification> {
        self.visible
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for NotificationCenter {
    async fn show(&self, notification: Notification) -> Result<()> {
        log::info!(
            "Notification [{}] {}: {}",
            notification.tag,
            notification.title,
            notification.body
        );
        let mut visible = self
            .visible
            .lock()
            .map_err(|_| Error::Host("notification center poisoned".to_string()))?;
        visible.retain(|n| n.tag != notification.tag);
        visible.push(notification);
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<()> {
        let mut visible = self
            .visible
            .lock()
            .map_err(|_| Error::Host("notification center poisoned".to_string()))?;
        visible.retain(|n| n.tag != tag);
        Ok(())
    }
}
