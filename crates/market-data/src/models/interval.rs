use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default poll period for symbols without an override.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Shortest poll period accepted from configuration.
pub const MINIMUM_SCAN_INTERVAL: Duration = Duration::from_secs(30);

const MANUAL: &str = "manual";

/// How often a group of symbols is polled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanInterval {
    /// Never poll automatically; only explicit refreshes run a cycle.
    Manual,
    Every(Duration),
}

impl ScanInterval {
    /// The poll period, or `None` for manual groups.
    pub fn period(&self) -> Option<Duration> {
        match self {
            Self::Manual => None,
            Self::Every(period) => Some(*period),
        }
    }

    /// Raise the period to `minimum` if it is shorter. Manual is unaffected.
    pub fn clamped(self, minimum: Duration) -> Self {
        match self {
            Self::Every(period) if period < minimum => Self::Every(minimum),
            other => other,
        }
    }
}

impl Default for ScanInterval {
    fn default() -> Self {
        Self::Every(DEFAULT_SCAN_INTERVAL)
    }
}

impl fmt::Display for ScanInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "{}", MANUAL),
            Self::Every(period) => write!(f, "{}s", period.as_secs()),
        }
    }
}

impl Serialize for ScanInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Manual => serializer.serialize_str(MANUAL),
            Self::Every(period) => serializer.serialize_u64(period.as_secs()),
        }
    }
}

impl<'de> Deserialize<'de> for ScanInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(Self::Every(Duration::from_secs(seconds))),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl std::str::FromStr for ScanInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(MANUAL) {
            return Ok(Self::Manual);
        }
        trimmed
            .parse::<u64>()
            .map(|seconds| Self::Every(Duration::from_secs(seconds)))
            .map_err(|_| format!("invalid scan interval '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("manual".parse::<ScanInterval>(), Ok(ScanInterval::Manual));
        assert_eq!("MANUAL".parse::<ScanInterval>(), Ok(ScanInterval::Manual));
        assert_eq!(
            " 3600 ".parse::<ScanInterval>(),
            Ok(ScanInterval::Every(Duration::from_secs(3600)))
        );
        assert!("hourly".parse::<ScanInterval>().is_err());
    }

    #[test]
    fn test_deserialize_number_and_text() {
        let interval: ScanInterval = serde_json::from_str("120").unwrap();
        assert_eq!(interval, ScanInterval::Every(Duration::from_secs(120)));

        let interval: ScanInterval = serde_json::from_str("\"Manual\"").unwrap();
        assert_eq!(interval, ScanInterval::Manual);

        let interval: ScanInterval = serde_json::from_str("\"90\"").unwrap();
        assert_eq!(interval, ScanInterval::Every(Duration::from_secs(90)));

        assert!(serde_json::from_str::<ScanInterval>("\"soon\"").is_err());
    }

    #[test]
    fn test_clamped() {
        let interval = ScanInterval::Every(Duration::from_secs(5)).clamped(MINIMUM_SCAN_INTERVAL);
        assert_eq!(interval, ScanInterval::Every(MINIMUM_SCAN_INTERVAL));

        let interval = ScanInterval::Every(Duration::from_secs(300)).clamped(MINIMUM_SCAN_INTERVAL);
        assert_eq!(interval, ScanInterval::Every(Duration::from_secs(300)));

        assert_eq!(
            ScanInterval::Manual.clamped(MINIMUM_SCAN_INTERVAL),
            ScanInterval::Manual
        );
    }

    #[test]
    fn test_period() {
        assert_eq!(ScanInterval::Manual.period(), None);
        assert_eq!(ScanInterval::default().period(), Some(DEFAULT_SCAN_INTERVAL));
    }
}
