//! # Configuration Module
//!
//! Loads the ferries configuration file and validates it before any sensor
//! is built. Each entry describes one route to poll.

use crate::constants::{self, KeyError};
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// One of the seven weekday tokens accepted in the `weekday` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekdayToken {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl WeekdayToken {
    /// All tokens in calendar order, the default filter.
    pub const ALL: [WeekdayToken; 7] = [
        WeekdayToken::Mon,
        WeekdayToken::Tue,
        WeekdayToken::Wed,
        WeekdayToken::Thu,
        WeekdayToken::Fri,
        WeekdayToken::Sat,
        WeekdayToken::Sun,
    ];

    pub fn as_weekday(self) -> Weekday {
        match self {
            WeekdayToken::Mon => Weekday::Mon,
            WeekdayToken::Tue => Weekday::Tue,
            WeekdayToken::Wed => Weekday::Wed,
            WeekdayToken::Thu => Weekday::Thu,
            WeekdayToken::Fri => Weekday::Fri,
            WeekdayToken::Sat => Weekday::Sat,
            WeekdayToken::Sun => Weekday::Sun,
        }
    }
}

/// Top level of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Trafikverket API key. Falls back to the environment when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    pub ferries: Vec<RouteConfig>,
}

/// A single ferry route to expose as a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    /// Display name of the sensor.
    pub name: String,
    /// Departure harbor.
    pub from: String,
    /// Arrival harbor; empty means any destination.
    #[serde(default)]
    pub to: String,
    /// Fixed departure time of day. When absent the current time is used.
    #[serde(default, deserialize_with = "deserialize_time")]
    pub time: Option<NaiveTime>,
    /// Weekdays the route applies to, in tie-break order.
    #[serde(default = "RouteConfig::default_weekdays", deserialize_with = "one_or_many")]
    pub weekday: Vec<WeekdayToken>,
}

impl RouteConfig {
    fn default_weekdays() -> Vec<WeekdayToken> {
        WeekdayToken::ALL.to_vec()
    }

    /// The allowed weekdays as chrono values, keeping the configured order.
    pub fn weekdays(&self) -> Vec<Weekday> {
        self.weekday.iter().map(|token| token.as_weekday()).collect()
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("ferry entry has an empty name".to_string()));
        }
        if self.from.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "ferry '{}' has an empty 'from' harbor",
                self.name
            )));
        }
        if self.weekday.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "ferry '{}' has an empty weekday list",
                self.name
            )));
        }
        Ok(())
    }
}

/// Accepts `HH:MM` as well as `HH:MM:SS`.
fn deserialize_time<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(raw) => parse_time(&raw).map(Some).map_err(serde::de::Error::custom),
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| format!("invalid time '{raw}', expected HH:MM or HH:MM:SS"))
}

/// A single weekday token is treated as a one-element list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<WeekdayToken>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(WeekdayToken),
        Many(Vec<WeekdayToken>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(token) => vec![token],
        OneOrMany::Many(tokens) => tokens,
    })
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Resolves the API key from the file, falling back to the environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Ok(constants::env_api_key()?.to_string()),
        }
    }

    /// Validates every route and requires at least one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ferries.is_empty() {
            return Err(ConfigError::Invalid("no ferries configured".to_string()));
        }
        self.ferries.iter().try_for_each(RouteConfig::validate)
    }

    /// Drops invalid routes, logging each one, and returns how many were dropped.
    #[cfg_attr(feature = "fail-fast-config", allow(dead_code))]
    pub fn retain_valid(&mut self) -> usize {
        let before = self.ferries.len();
        self.ferries.retain(|route| match route.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(route = %route.name, error = %e, "Skipping invalid ferry route");
                false
            }
        });
        before - self.ferries.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    ApiKey(#[from] KeyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_entry() {
        let config = Config::from_yaml(
            r#"
api_key: "secret"
ferries:
  - name: "Ekerö morning"
    from: "Ekerö"
    to: "Slagsta"
    time: "08:00"
    weekday: [mon, fri]
"#,
        )
        .unwrap();

        assert_eq!(config.api_key().unwrap(), "secret");
        let route = &config.ferries[0];
        assert_eq!(route.name, "Ekerö morning");
        assert_eq!(route.to, "Slagsta");
        assert_eq!(route.time, NaiveTime::from_hms_opt(8, 0, 0));
        assert_eq!(route.weekdays(), vec![Weekday::Mon, Weekday::Fri]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_yaml(
            r#"
ferries:
  - name: "Any"
    from: "Vaxholm"
"#,
        )
        .unwrap();

        let route = &config.ferries[0];
        assert_eq!(route.to, "");
        assert_eq!(route.time, None);
        assert_eq!(route.weekday, WeekdayToken::ALL.to_vec());
    }

    #[test]
    fn accepts_single_weekday_and_seconds() {
        let config = Config::from_yaml(
            r#"
ferries:
  - name: "Sunday"
    from: "Vaxholm"
    time: "17:45:30"
    weekday: sun
"#,
        )
        .unwrap();

        let route = &config.ferries[0];
        assert_eq!(route.weekdays(), vec![Weekday::Sun]);
        assert_eq!(route.time, NaiveTime::from_hms_opt(17, 45, 30));
    }

    #[test]
    fn rejects_unknown_weekday() {
        let result = Config::from_yaml(
            r#"
ferries:
  - name: "Bad"
    from: "Vaxholm"
    weekday: [monday]
"#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn rejects_bad_time() {
        let result = Config::from_yaml(
            r#"
ferries:
  - name: "Bad"
    from: "Vaxholm"
    time: "25:00"
"#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn empty_weekday_list_is_invalid() {
        let config = Config::from_yaml(
            r#"
ferries:
  - name: "Never"
    from: "Vaxholm"
    weekday: []
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn no_ferries_is_invalid() {
        let config = Config::from_yaml("ferries: []").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn retain_valid_drops_broken_routes() {
        let mut config = Config::from_yaml(
            r#"
ferries:
  - name: "Good"
    from: "Vaxholm"
  - name: "No origin"
    from: "  "
"#,
        )
        .unwrap();

        assert_eq!(config.retain_valid(), 1);
        assert_eq!(config.ferries.len(), 1);
        assert_eq!(config.ferries[0].name, "Good");
    }
}
