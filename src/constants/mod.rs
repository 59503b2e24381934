//! # Constants and Configuration Module
//!
//! Static constants describing the Trafikverket open data API and the ferry
//! sensor entities, plus the lookup of the API key from the environment.
//!
//! The key is loaded lazily and cached on first use so repeated lookups do
//! not hit the environment again.

use once_cell::sync::OnceCell;
use std::env;
use std::fmt;
use std::time::Duration;

/// Endpoint of the Trafikverket open data API (JSON responses).
pub const API_BASE_URL: &str = "https://api.trafikinfo.trafikverket.se/v2/data.json";

/// Environment variable consulted when the configuration file has no `api_key`.
pub const API_KEY_VAR: &str = "TRAFIKVERKET_API_KEY";

/// Schema version of the `FerryAnnouncement` object type.
pub const FERRY_ANNOUNCEMENT_SCHEMA: &str = "1.2";
/// Schema version of the `Situation` object type, which carries deviations.
pub const SITUATION_SCHEMA: &str = "1.5";

/// Timestamp format used in query filters (local time, no offset).
pub const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Icon shown for every ferry sensor.
pub const ICON: &str = "mdi:ferry";
/// Device class of the sensor value.
pub const DEVICE_CLASS_TIMESTAMP: &str = "timestamp";

/// How often each sensor is polled.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default location of the ferries configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "ferries.yaml";

/// Errors raised while resolving the API key from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The environment variable is not set.
    MissingVar(&'static str),
    /// The environment variable is set but empty or whitespace-only.
    EmptyVar(&'static str),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::MissingVar(var) => write!(
                f,
                "No api_key in the configuration file and '{var}' is not set. \
                Provide it in the file, your shell or a .env file."
            ),
            KeyError::EmptyVar(var) => write!(
                f,
                "Environment variable '{var}' is set but empty. \
                It must contain a non-empty API key."
            ),
        }
    }
}

impl std::error::Error for KeyError {}

/// Cached API key read from [`API_KEY_VAR`].
static API_KEY_CELL: OnceCell<String> = OnceCell::new();

/// Lazily loads, validates and caches a value in `cell`.
///
/// `fetch` only runs until it yields a non-empty value; later calls return
/// the cached string.
fn load_with<'c, F>(
    var: &'static str,
    cell: &'c OnceCell<String>,
    fetch: F,
) -> Result<&'c str, KeyError>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    let value_ref = cell.get_or_try_init(|| match fetch(var) {
        Ok(val) if val.trim().is_empty() => Err(KeyError::EmptyVar(var)),
        Ok(val) => Ok(val.trim().to_string()),
        Err(_) => Err(KeyError::MissingVar(var)),
    })?;
    Ok(value_ref.as_str())
}

/// Retrieves the Trafikverket API key from the environment.
///
/// # Errors
///
/// Returns `KeyError` if the variable is missing or empty.
pub fn env_api_key() -> Result<&'static str, KeyError> {
    load_with(API_KEY_VAR, &API_KEY_CELL, |s| env::var(s))
}
