//! Wall-clock access in the bot's configured timezone.

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Input/output format for reminder dates: `dd.mm.yyyy HH:mm`.
pub const DISPLAY_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Storage format. Sorts lexically in chronological order.
pub const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Zero seconds and sub-seconds.
pub fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Converts UTC instants into naive local times of one timezone.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    tz: Tz,
}

impl Clock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> NaiveDateTime {
        self.local(Utc::now())
    }

    pub fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.tz).naive_local()
    }

    /// False for local times skipped by a daylight-saving jump; no tick
    /// ever maps to them.
    pub fn exists_locally(&self, local: NaiveDateTime) -> bool {
        self.tz.from_local_datetime(&local).earliest().is_some()
    }

    /// The minute a tick firing at `instant` is responsible for.
    pub fn minute_of(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        truncate_to_minute(self.local(instant))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(chrono_tz::UTC)
    }
}
