//! Shared engine types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Logging threshold.
///
/// Each level includes every more severe level: `Info` emits info, warnings
/// and errors. Variants are ordered from quietest to loudest.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No output at all
    Disable,
    /// Errors only
    #[default]
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages, warnings and errors
    Info,
    /// Everything, including debug chatter
    All,
}

impl LogLevel {
    /// Returns true if anything at all should be logged.
    #[inline]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disable)
    }

    /// Returns true if messages of `severity` pass this threshold.
    #[inline]
    pub fn allows(self, severity: Self) -> bool {
        severity != Self::Disable && severity <= self
    }

    /// The lowercase name used on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::All => "all",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(Self::Disable),
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "all" => Ok(Self::All),
            other => Err(Error::InvalidValue {
                what: "log level",
                value: other.to_string(),
            }),
        }
    }
}

/// Host power-source status.
///
/// Only the coarse classification matters to GPU selection: whether the
/// machine runs from external power or drains a battery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatteryStatus {
    /// No battery present (desktop, or status unavailable)
    #[default]
    None,
    /// Battery present and charging
    Charging,
    /// Discharging, above 66%
    High,
    /// Discharging, above 33%
    Mid,
    /// Discharging, 33% or less
    Low,
    /// Discharging, below 5%
    Critical,
}

impl BatteryStatus {
    /// Classify a discharging battery by its remaining charge in percent.
    pub const fn from_discharge_level(percent: u8) -> Self {
        if percent < 5 {
            Self::Critical
        } else if percent > 66 {
            Self::High
        } else if percent > 33 {
            Self::Mid
        } else {
            Self::Low
        }
    }

    /// Returns true when the host is not running from battery.
    #[inline]
    pub const fn on_external_power(self) -> bool {
        matches!(self, Self::None | Self::Charging)
    }
}
