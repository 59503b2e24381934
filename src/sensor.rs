//! # Sensor Module
//!
//! A [`FerrySensor`] owns one configured route and the state of its last
//! poll. The host calls [`FerrySensor::update`] on every tick and reads the
//! value and attributes in between.

use crate::config::RouteConfig;
use crate::constants::{DEVICE_CLASS_TIMESTAMP, ICON};
use crate::departure::{DepartureState, FerryAttributes};
use crate::schedule::next_departure_date;
use crate::service::TimetableClient;
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Weekday};
use std::sync::Arc;

/// Polling sensor for the next departure of a single ferry route.
pub struct FerrySensor<C> {
    client: Arc<C>,
    route: RouteConfig,
    weekdays: Vec<Weekday>,
    state: Option<DepartureState>,
}

impl<C: TimetableClient> FerrySensor<C> {
    pub fn new(client: Arc<C>, route: RouteConfig) -> Self {
        let weekdays = route.weekdays();
        Self {
            client,
            route,
            weekdays,
            state: None,
        }
    }

    /// Runs one poll cycle against the local wall clock.
    pub async fn update(&mut self) {
        self.update_at(Local::now().naive_local()).await;
    }

    /// Runs one poll cycle as if the local time were `now`.
    ///
    /// Fetch errors are logged and never returned. A failed departure fetch
    /// keeps the previous state; a failed deviation fetch only leaves the
    /// deviation unset.
    pub async fn update_at(&mut self, now: NaiveDateTime) {
        let when = self.query_time(now);

        let stop = match self
            .client
            .fetch_next_departure(&self.route.from, &self.route.to, when)
            .await
        {
            Ok(stop) => {
                tracing::debug!(
                    route = %self.route.name,
                    %when,
                    departure_id = %stop.id,
                    kind = ?stop.type_name,
                    modified = ?stop.modified_time,
                    "Fetched departure"
                );
                stop
            }
            Err(e) => {
                tracing::error!(
                    route = %self.route.name,
                    %when,
                    error = %e,
                    "Departure encountered a problem"
                );
                return;
            }
        };

        let mut deviation = None;
        if let Some(deviation_id) = stop.deviation_id.as_deref() {
            match self.client.fetch_deviation(deviation_id).await {
                Ok(found) => {
                    tracing::debug!(
                        route = %self.route.name,
                        deviation_id,
                        header = ?found.header,
                        details = ?found.details,
                        severity = ?found.severity_code,
                        start = ?found.start_time,
                        end = ?found.end_time,
                        "Fetched deviation"
                    );
                    deviation = Some(found);
                }
                Err(e) => tracing::error!(
                    route = %self.route.name,
                    %when,
                    deviation_id,
                    error = %e,
                    "Deviation caused error"
                ),
            }
        }

        let state = DepartureState::new(stop, deviation);
        tracing::debug!(
            route = %self.route.name,
            harbors = state.route(),
            status = state.status(),
            departure = ?state.departure_time(),
            deviation_id = ?state.deviation_id(),
            "Updated ferry departure"
        );
        self.state = Some(state);
    }

    /// The moment to ask the timetable about.
    ///
    /// With a fixed time of day this is that time on the next applicable
    /// date; otherwise it is `now`.
    fn query_time(&self, now: NaiveDateTime) -> NaiveDateTime {
        match self.route.time {
            Some(time) => next_departure_date(now.date(), &self.weekdays).and_time(time),
            None => now,
        }
    }

    pub fn current_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.state.as_ref().and_then(DepartureState::departure_time)
    }

    /// `None` until a departure has been fetched successfully.
    pub fn current_attributes(&self) -> Option<FerryAttributes> {
        self.state.as_ref().map(DepartureState::attributes)
    }

    pub fn state(&self) -> Option<&DepartureState> {
        self.state.as_ref()
    }

    /// Value shown by the host: the departure as RFC 3339, or `unknown`.
    pub fn state_string(&self) -> String {
        self.current_timestamp()
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn name(&self) -> &str {
        &self.route.name
    }

    pub fn icon(&self) -> &'static str {
        ICON
    }

    pub fn device_class(&self) -> &'static str {
        DEVICE_CLASS_TIMESTAMP
    }
}
