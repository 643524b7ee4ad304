//! Query windows for metrics and scaling-event history

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseTimeRangeError;

/// Cap on samples requested for any window
pub const MAX_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimeRange {
    ThirtySeconds,
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    #[default]
    OneHour,
    ThreeHours,
    SixHours,
    TwelveHours,
    OneDay,
    SevenDays,
    ThirtyDays,
}

/// `from` / `limit` query parameters for a history request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeParams {
    pub from: String,
    pub limit: u32,
}

impl TimeRange {
    pub const ALL: [TimeRange; 12] = [
        Self::ThirtySeconds,
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::OneHour,
        Self::ThreeHours,
        Self::SixHours,
        Self::TwelveHours,
        Self::OneDay,
        Self::SevenDays,
        Self::ThirtyDays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThirtySeconds => "30s",
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::ThreeHours => "3h",
            Self::SixHours => "6h",
            Self::TwelveHours => "12h",
            Self::OneDay => "24h",
            Self::SevenDays => "7d",
            Self::ThirtyDays => "30d",
        }
    }

    pub fn window(&self) -> Duration {
        match self {
            Self::ThirtySeconds => Duration::seconds(30),
            Self::OneMinute => Duration::minutes(1),
            Self::FiveMinutes => Duration::minutes(5),
            Self::FifteenMinutes => Duration::minutes(15),
            Self::ThirtyMinutes => Duration::minutes(30),
            Self::OneHour => Duration::hours(1),
            Self::ThreeHours => Duration::hours(3),
            Self::SixHours => Duration::hours(6),
            Self::TwelveHours => Duration::hours(12),
            Self::OneDay => Duration::hours(24),
            Self::SevenDays => Duration::days(7),
            Self::ThirtyDays => Duration::days(30),
        }
    }

    /// One sample per five minutes of window, at least one, at most [`MAX_LIMIT`]
    pub fn limit(&self) -> u32 {
        let seconds = self.window().num_seconds() as u32;
        seconds.div_ceil(300).clamp(1, MAX_LIMIT)
    }

    pub fn query_params(&self, now: DateTime<Utc>) -> RangeParams {
        RangeParams {
            from: (now - self.window()).to_rfc3339_opts(SecondsFormat::Millis, true),
            limit: self.limit(),
        }
    }

    /// How often a view of this window should refresh
    pub fn polling_interval(&self) -> std::time::Duration {
        let millis = match self {
            Self::ThirtySeconds => 500,
            Self::OneMinute | Self::FiveMinutes => 1_000,
            Self::FifteenMinutes => 5_000,
            Self::ThirtyMinutes => 10_000,
            Self::OneHour => 15_000,
            Self::ThreeHours => 30_000,
            Self::SixHours => 60_000,
            Self::TwelveHours => 120_000,
            Self::OneDay => 300_000,
            Self::SevenDays => 600_000,
            Self::ThirtyDays => 900_000,
        };
        std::time::Duration::from_millis(millis)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = ParseTimeRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|range| range.as_str() == s || (s == "1d" && *range == Self::OneDay))
            .ok_or_else(|| ParseTimeRangeError(s.to_string()))
    }
}
