use crate::config::RouteConfig;
use crate::sensor::FerrySensor;
use crate::service::TimetableClient;
use std::sync::Arc;

/// Every configured ferry sensor, sharing one timetable client.
pub struct DepartureBoard<C> {
    sensors: Vec<FerrySensor<C>>,
}

impl<C: TimetableClient> DepartureBoard<C> {
    /// Builds one sensor per route. Sensors start without state.
    pub fn new(client: Arc<C>, routes: Vec<RouteConfig>) -> Self {
        let sensors = routes
            .into_iter()
            .map(|route| FerrySensor::new(Arc::clone(&client), route))
            .collect();
        Self { sensors }
    }

    /// Builds the sensors and runs their first update before they are shown.
    pub async fn setup(client: Arc<C>, routes: Vec<RouteConfig>) -> Self {
        let mut board = Self::new(client, routes);
        board.update_all().await;
        board
    }

    /// Polls every sensor once, one after the other.
    ///
    /// Returns how many sensors hold a departure afterwards.
    pub async fn update_all(&mut self) -> usize {
        for sensor in &mut self.sensors {
            sensor.update().await;
        }
        let with_state = self
            .sensors
            .iter()
            .filter(|sensor| sensor.current_timestamp().is_some())
            .count();
        tracing::info!(
            sensors = self.sensors.len(),
            with_departure = with_state,
            "Ferry sensors updated"
        );
        with_state
    }

    pub fn sensors(&self) -> &[FerrySensor<C>] {
        &self.sensors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeekdayToken;
    use crate::service::{Deviation, FerryStop, TimetableError};
    use chrono::{DateTime, NaiveDateTime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers only for the harbor "Vaxholm".
    #[derive(Default)]
    struct HarborTimetable {
        calls: AtomicUsize,
    }

    impl TimetableClient for HarborTimetable {
        async fn fetch_next_departure(
            &self,
            from: &str,
            _to: &str,
            _when: NaiveDateTime,
        ) -> Result<FerryStop, TimetableError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if from != "Vaxholm" {
                return Err(TimetableError::NotFound(format!("No departures from {from}")));
            }
            Ok(FerryStop {
                id: "1".to_string(),
                deleted: false,
                departure_time: DateTime::parse_from_rfc3339("2024-05-20T09:00:00+02:00")
                    .unwrap(),
                other_information: vec!["Extra tur".to_string()],
                deviation_id: None,
                modified_time: None,
                from_harbor_name: from.to_string(),
                to_harbor_name: None,
                type_name: None,
            })
        }

        async fn fetch_deviation(&self, deviation_id: &str) -> Result<Deviation, TimetableError> {
            Err(TimetableError::NotFound(format!("No deviation {deviation_id}")))
        }
    }

    fn route(name: &str, from: &str) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            from: from.to_string(),
            to: String::new(),
            time: None,
            weekday: WeekdayToken::ALL.to_vec(),
        }
    }

    #[tokio::test]
    async fn setup_updates_every_sensor() {
        let client = Arc::new(HarborTimetable::default());
        let board = DepartureBoard::setup(
            client.clone(),
            vec![route("Vaxholm", "Vaxholm"), route("Broken", "Atlantis")],
        )
        .await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(board.sensors().len(), 2);
        assert!(board.sensors()[0].current_attributes().is_some());
        // A failing route does not affect the others.
        assert!(board.sensors()[1].current_attributes().is_none());
    }

    #[tokio::test]
    async fn update_all_counts_sensors_with_departures() {
        let client = Arc::new(HarborTimetable::default());
        let mut board = DepartureBoard::new(
            client.clone(),
            vec![route("A", "Vaxholm"), route("B", "Vaxholm"), route("C", "Nowhere")],
        );
        assert!(board.sensors().iter().all(|s| s.current_timestamp().is_none()));

        assert_eq!(board.update_all().await, 2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }
}
