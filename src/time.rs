//! Unit-typed durations used throughout the configuration
//!
//! Every time field in the config file is written as `<value><unit>`, e.g.
//! `200ms`, `1m` or `7d`. The value is 1 to 9999 without leading zeros and the
//! unit set accepted depends on the field:
//!
//! | field          | allowed units |
//! |----------------|---------------|
//! | `frequency`    | `s`, `m`, `h` |
//! | `expectedTime` | `ms`, `s`     |
//! | `timeout`      | `ms`, `s`     |
//! | `deleteAfter`  | `m`, `h`, `d` |

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::config::ConfigError;

static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([1-9][0-9]{0,3})(ms|s|m|h|d)$").expect("time pattern is a valid regex")
});

/// Units allowed for a metric's polling frequency
pub const FREQUENCY_UNITS: &[TimeUnit] = &[TimeUnit::Second, TimeUnit::Minute, TimeUnit::Hour];

/// Units allowed for `expectedTime` and `timeout`
pub const LATENCY_UNITS: &[TimeUnit] = &[TimeUnit::Millisecond, TimeUnit::Second];

/// Units allowed for the retention window (`deleteAfter`)
pub const RETENTION_UNITS: &[TimeUnit] = &[TimeUnit::Minute, TimeUnit::Hour, TimeUnit::Day];

/// Largest value a [`TimeDetail`] may carry
pub const MAX_TIME_VALUE: u32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Number of milliseconds in one unit
    pub fn millis(self) -> u64 {
        match self {
            TimeUnit::Millisecond => 1,
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Millisecond => "ms",
            TimeUnit::Second => "s",
            TimeUnit::Minute => "m",
            TimeUnit::Hour => "h",
            TimeUnit::Day => "d",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ms" => Ok(TimeUnit::Millisecond),
            "s" => Ok(TimeUnit::Second),
            "m" => Ok(TimeUnit::Minute),
            "h" => Ok(TimeUnit::Hour),
            "d" => Ok(TimeUnit::Day),
            other => Err(ConfigError::InvalidTime {
                value: other.to_string(),
            }),
        }
    }
}

/// A parsed `(value, unit)` pair such as `200ms`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeDetail {
    value: u32,
    unit: TimeUnit,
}

impl TimeDetail {
    /// Build a time detail from its parts, enforcing the `1..=9999` value range
    pub fn new(value: u32, unit: TimeUnit) -> Result<Self, ConfigError> {
        if !(1..=MAX_TIME_VALUE).contains(&value) {
            return Err(ConfigError::InvalidTime {
                value: format!("{value}{unit}"),
            });
        }

        Ok(Self { value, unit })
    }

    /// Parse `text` and check its unit against the field's `allowed` units
    ///
    /// ```
    /// use openmonitor::time::{TimeDetail, TimeUnit, LATENCY_UNITS};
    ///
    /// let timeout = TimeDetail::parse("200ms", LATENCY_UNITS).unwrap();
    /// assert_eq!(timeout.value(), 200);
    /// assert_eq!(timeout.unit(), TimeUnit::Millisecond);
    /// assert!(TimeDetail::parse("7d", LATENCY_UNITS).is_err());
    /// ```
    pub fn parse(text: &str, allowed: &[TimeUnit]) -> Result<Self, ConfigError> {
        let captures = TIME_PATTERN
            .captures(text)
            .ok_or_else(|| ConfigError::InvalidTime {
                value: text.to_string(),
            })?;

        // the pattern bounds the value to four digits, so this cannot overflow
        let value: u32 = captures[1].parse().map_err(|_| ConfigError::InvalidTime {
            value: text.to_string(),
        })?;
        let unit: TimeUnit = captures[2].parse()?;

        if !allowed.contains(&unit) {
            return Err(ConfigError::UnitNotAllowed {
                value: text.to_string(),
                allowed: allowed
                    .iter()
                    .map(|unit| unit.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        Self::new(value, unit)
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Exact conversion into milliseconds
    pub fn as_millis(&self) -> u64 {
        u64::from(self.value) * self.unit.millis()
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.as_millis())
    }

    /// Conversion for timestamp arithmetic (retention cut-offs)
    pub fn as_chrono(&self) -> chrono::Duration {
        // at most 9999 days, far below i64::MAX milliseconds
        chrono::Duration::milliseconds(self.as_millis() as i64)
    }
}

impl fmt::Display for TimeDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}
