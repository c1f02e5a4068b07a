//! Cache lifetimes.

use crate::error::{SdkError, SdkResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Lifetime of a cached response, in whole seconds.
///
/// Parses plain numbers (`"300"`) and `"<n> <unit>"` strings such as
/// `"30 seconds"`, `"1 hour"` or `"2 days"`. A month counts as 30 days and
/// a year as 365.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheExpiry(u64);

impl CacheExpiry {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl From<u64> for CacheExpiry {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

impl From<Duration> for CacheExpiry {
    fn from(d: Duration) -> Self {
        Self(d.as_secs())
    }
}

fn unit_seconds(unit: &str) -> Option<u64> {
    let unit = unit.strip_suffix('s').unwrap_or(unit);
    Some(match unit {
        "sec" | "second" => 1,
        "min" | "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        "week" => 604_800,
        "month" => 2_592_000,
        "year" => 31_536_000,
        _ => return None,
    })
}

impl FromStr for CacheExpiry {
    type Err = SdkError;

    fn from_str(s: &str) -> SdkResult<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let mut parts = lowered.split_whitespace();
        let invalid = || SdkError::parse(format!("Invalid cache expiry: '{s}'"));

        let amount: u64 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let multiplier = match parts.next() {
            None => 1,
            Some(unit) => unit_seconds(unit).ok_or_else(invalid)?,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(amount.saturating_mul(multiplier)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        let secs = |s: &str| s.parse::<CacheExpiry>().unwrap().as_secs();
        assert_eq!(secs("300"), 300);
        assert_eq!(secs("30 seconds"), 30);
        assert_eq!(secs("1 hour"), 3_600);
        assert_eq!(secs("2 days"), 172_800);
        assert_eq!(secs("1 week"), 604_800);
        assert_eq!(secs("1 month"), 2_592_000);
        assert_eq!(secs("  5 Minutes "), 300);
        assert_eq!(secs("0"), 0);
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "soon", "1 fortnight", "-1 hour", "1 hour ago"] {
            let err = bad.parse::<CacheExpiry>().unwrap_err();
            assert_eq!(err.kind, crate::error::SdkErrorKind::Parse, "{bad}");
        }
    }

    #[test]
    fn conversions() {
        assert_eq!(CacheExpiry::from(Duration::from_millis(90_500)).as_secs(), 90);
        assert_eq!(CacheExpiry::from(10).as_duration(), Duration::from_secs(10));
    }
}
