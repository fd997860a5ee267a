//! Wall-clock abstraction and the time zone used for the daily notification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Time zone in which the daily notification hour is evaluated.
///
/// `Local` uses whatever zone the host is configured with. Deployments that
/// mean "7 AM Eastern" regardless of the host should pin a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NotifyZone {
    /// Host local time.
    #[default]
    Local,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl NotifyZone {
    /// Returns the wall-clock hour of `now` in this zone.
    #[must_use]
    pub fn hour(&self, now: DateTime<Utc>) -> u32 {
        match self {
            Self::Local => now.with_timezone(&Local).hour(),
            Self::Fixed(offset) => now.with_timezone(offset).hour(),
        }
    }
}

impl FromStr for NotifyZone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        if s.eq_ignore_ascii_case("utc") || s == "Z" {
            return Ok(Self::Fixed(Utc.fix()));
        }

        let invalid = || Error::Config(format!("invalid time zone offset: {s:?}"));
        let (sign, rest) = match s.as_bytes().first() {
            Some(b'+') => (1, &s[1..]),
            Some(b'-') => (-1, &s[1..]),
            _ => return Err(invalid()),
        };
        let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::Fixed)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for NotifyZone {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NotifyZone> for String {
    fn from(zone: NotifyZone) -> Self {
        zone.to_string()
    }
}

impl fmt::Display for NotifyZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}
