use crate::service::{Deviation, FerryStop};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Snapshot of the last successful poll of one route.
///
/// Built in one piece from a fetched departure and never patched afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DepartureState {
    route: String,
    departure_time: Option<DateTime<FixedOffset>>,
    status: String,
    deviation_id: Option<String>,
    deviation: Option<String>,
    other_information: Vec<String>,
}

impl DepartureState {
    pub fn new(stop: FerryStop, deviation: Option<Deviation>) -> Self {
        let route = match stop.to_harbor_name.as_deref() {
            Some(to) if !to.is_empty() => format!("{} - {}", stop.from_harbor_name, to),
            _ => stop.from_harbor_name.clone(),
        };
        Self {
            route,
            departure_time: Some(stop.departure_time),
            status: stop.status().to_string(),
            deviation_id: stop.deviation_id,
            deviation: deviation.map(|d| d.message),
            other_information: stop.other_information,
        }
    }

    /// Harbors of the fetched departure, `from - to`.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn departure_time(&self) -> Option<DateTime<FixedOffset>> {
        self.departure_time
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn deviation_id(&self) -> Option<&str> {
        self.deviation_id.as_deref()
    }

    /// Shapes the state into the attribute record exposed to the host.
    pub fn attributes(&self) -> FerryAttributes {
        let other_information = if self.other_information.is_empty() {
            None
        } else {
            Some(self.other_information.join(", "))
        };

        FerryAttributes {
            departure_state: self.status.clone(),
            deviations: self.deviation.clone().filter(|text| !text.is_empty()),
            departure_time: self.departure_time,
            other_information,
        }
    }
}

/// Attributes published alongside the sensor value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FerryAttributes {
    pub departure_state: String,
    pub deviations: Option<String>,
    pub departure_time: Option<DateTime<FixedOffset>>,
    pub other_information: Option<String>,
}
