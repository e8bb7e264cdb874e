//! Power status and per-key settings.
//!
//! Field names follow the camelCase shape the EcoFlow integration has always
//! used, so settings written by the host's property inspector deserialize
//! directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::{DEFAULT_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS};

/// Instantaneous generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Sum of all PV inputs, as reported (0.1 W resolution)
    pub current: f64,
}

/// Instantaneous consumption.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Consumption {
    /// Sum of all metered loads, as reported (0.1 W resolution)
    pub total: f64,
}

/// Derived balance between generation and consumption.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Generation minus consumption
    pub net_load: f64,
    /// Any generation at all
    pub is_generating: bool,
    /// Any load at all
    pub is_consuming: bool,
}

/// Snapshot of the installation, fetched fresh on every poll.
///
/// # Example
///
/// ```
/// use eco_power_deck::PowerStatus;
///
/// let status = PowerStatus::from_readings(1234.0, 567.0).unwrap();
/// assert_eq!(status.summary.net_load, 667.0);
/// assert!(status.summary.is_generating);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerStatus {
    pub generation: Generation,
    pub consumption: Consumption,
    pub summary: Summary,
}

impl PowerStatus {
    /// Build a status from raw generation and consumption readings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReading`] if either value is NaN or infinite.
    pub fn from_readings(generation: f64, consumption: f64) -> Result<Self, Error> {
        if !generation.is_finite() {
            return Err(Error::InvalidReading {
                field: "generation",
                value: generation,
            });
        }
        if !consumption.is_finite() {
            return Err(Error::InvalidReading {
                field: "consumption",
                value: consumption,
            });
        }

        Ok(Self {
            generation: Generation {
                current: generation,
            },
            consumption: Consumption { total: consumption },
            summary: Summary {
                net_load: generation - consumption,
                is_generating: generation > 0.0,
                is_consuming: consumption > 0.0,
            },
        })
    }

    /// Whether generation currently covers the whole load.
    pub fn has_surplus(&self) -> bool {
        self.summary.is_generating && self.summary.net_load >= 0.0
    }
}

/// Settings stored by the host for one key.
///
/// ```
/// use std::time::Duration;
/// use eco_power_deck::Settings;
///
/// let settings: Settings = serde_json::from_str(r#"{"pollInterval": 15}"#).unwrap();
/// assert_eq!(settings.poll_period(), Duration::from_millis(15_000));
///
/// let settings: Settings = serde_json::from_str(r#"{"pollInterval": 2.5}"#).unwrap();
/// assert_eq!(settings.poll_period(), Duration::from_millis(2_500));
/// assert_eq!(Settings::default().poll_period(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Polling interval in seconds (default: 30)
    ///
    /// Property inspectors may store the value as a number or as the text
    /// of a number; anything else reads as unset.
    #[serde(
        default,
        deserialize_with = "lenient_seconds::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub poll_interval: Option<f64>,
}

impl Settings {
    /// Settings with an explicit polling interval.
    pub fn with_poll_interval(secs: u64) -> Self {
        Self::with_poll_interval_secs_f64(secs as f64)
    }

    /// Settings with a fractional polling interval.
    pub fn with_poll_interval_secs_f64(secs: f64) -> Self {
        Self {
            poll_interval: Some(secs),
        }
    }

    /// Configured interval in seconds.
    ///
    /// Unset, negative and non-finite values fall back to the default;
    /// the result is kept within `[MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS]`.
    pub fn poll_interval_secs(&self) -> f64 {
        let secs = match self.poll_interval {
            Some(secs) if secs.is_finite() && secs >= 0.0 => secs,
            _ => DEFAULT_POLL_INTERVAL_SECS as f64,
        };
        secs.clamp(MIN_POLL_INTERVAL_SECS as f64, MAX_POLL_INTERVAL_SECS as f64)
    }

    /// Timer period for these settings.
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs())
    }
}

mod lenient_seconds {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(f64),
        Text(String),
        Other(IgnoredAny),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<Seconds> = Option::deserialize(deserializer)?;
        Ok(match value {
            Some(Seconds::Number(secs)) => Some(secs),
            Some(Seconds::Text(text)) => text.trim().parse().ok(),
            Some(Seconds::Other(_)) | None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_readings_derives_summary() {
        let status = PowerStatus::from_readings(1234.0, 567.0).unwrap();
        assert_eq!(status.generation.current, 1234.0);
        assert_eq!(status.consumption.total, 567.0);
        assert_eq!(status.summary.net_load, 667.0);
        assert!(status.summary.is_generating);
        assert!(status.summary.is_consuming);
        assert!(status.has_surplus());
    }

    #[test]
    fn test_night_time_status() {
        let status = PowerStatus::from_readings(0.0, 850.0).unwrap();
        assert_eq!(status.summary.net_load, -850.0);
        assert!(!status.summary.is_generating);
        assert!(status.summary.is_consuming);
        assert!(!status.has_surplus());
    }

    #[test]
    fn test_non_finite_readings_rejected() {
        assert!(matches!(
            PowerStatus::from_readings(f64::NAN, 1.0),
            Err(Error::InvalidReading {
                field: "generation",
                ..
            })
        ));
        assert!(matches!(
            PowerStatus::from_readings(1.0, f64::INFINITY),
            Err(Error::InvalidReading {
                field: "consumption",
                ..
            })
        ));
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = PowerStatus::from_readings(10.0, 4.0).unwrap();
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["generation"]["current"], 10.0);
        assert_eq!(json["consumption"]["total"], 4.0);
        assert_eq!(json["summary"]["netLoad"], 6.0);
        assert_eq!(json["summary"]["isGenerating"], true);
        assert_eq!(json["summary"]["isConsuming"], true);
    }

    #[test]
    fn test_poll_period_defaults_to_30s() {
        assert_eq!(Settings::default().poll_interval_secs(), 30.0);
        assert_eq!(Settings::default().poll_period(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_poll_period_is_interval_times_1000() {
        for n in [1, 5, 30, 120, 3600] {
            let settings = Settings::with_poll_interval(n);
            assert_eq!(settings.poll_period(), Duration::from_millis(n * 1000));
        }
    }

    #[test]
    fn test_fractional_interval() {
        let settings: Settings = serde_json::from_str(r#"{"pollInterval": 2.5}"#).unwrap();
        assert_eq!(settings.poll_interval, Some(2.5));
        assert_eq!(settings.poll_period(), Duration::from_millis(2500));

        let settings = Settings::with_poll_interval_secs_f64(1.25);
        assert_eq!(settings.poll_period(), Duration::from_millis(1250));
    }

    #[test]
    fn test_zero_interval_uses_minimum() {
        let settings = Settings::with_poll_interval(0);
        assert_eq!(settings.poll_period(), Duration::from_secs(1));
        let settings = Settings::with_poll_interval_secs_f64(0.2);
        assert_eq!(settings.poll_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_interval_uses_default() {
        let settings: Settings = serde_json::from_str(r#"{"pollInterval": -5}"#).unwrap();
        assert_eq!(settings.poll_interval, Some(-5.0));
        assert_eq!(settings.poll_period(), Duration::from_secs(30));

        for secs in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.5] {
            let settings = Settings::with_poll_interval_secs_f64(secs);
            assert_eq!(settings.poll_period(), Duration::from_secs(30), "{secs}");
        }
    }

    #[test]
    fn test_huge_interval_is_capped() {
        let settings = Settings::with_poll_interval_secs_f64(1e300);
        assert_eq!(
            settings.poll_period(),
            Duration::from_secs(MAX_POLL_INTERVAL_SECS)
        );
    }

    #[test]
    fn test_settings_deserialize() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.poll_interval, None);

        let settings: Settings = serde_json::from_str(r#"{"pollInterval": 10}"#).unwrap();
        assert_eq!(settings.poll_interval, Some(10.0));

        let settings: Settings = serde_json::from_str(r#"{"pollInterval": null}"#).unwrap();
        assert_eq!(settings.poll_interval, None);

        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_settings_accept_text_intervals() {
        let settings: Settings = serde_json::from_str(r#"{"pollInterval": "15"}"#).unwrap();
        assert_eq!(settings.poll_period(), Duration::from_secs(15));

        let settings: Settings = serde_json::from_str(r#"{"pollInterval": " 2.5 "}"#).unwrap();
        assert_eq!(settings.poll_period(), Duration::from_millis(2500));

        // Unreadable values keep the rest of the settings usable
        for raw in [r#""soon""#, "true", "[5]"] {
            let json = format!(r#"{{"pollInterval": {raw}}}"#);
            let settings: Settings = serde_json::from_str(&json).unwrap();
            assert_eq!(settings.poll_interval, None, "{raw}");
            assert_eq!(settings.poll_period(), Duration::from_secs(30));
        }
    }
}
