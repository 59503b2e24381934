//! # Ferry Departures
//!
//! Polls the Trafikverket ferry timetable for a set of configured routes and
//! shows, per route, the next applicable departure together with its status,
//! any deviation message and free-text notices.
//!
//! Each route is a sensor that is updated every five minutes. A route may be
//! pinned to a time of day and restricted to certain weekdays, in which case
//! the next matching date is queried instead of the current moment.

use chrono::{DateTime, FixedOffset, Local};
use clap::Parser;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table,
    modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS},
    presets::UTF8_FULL,
};
use dotenvy::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, time};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod constants;
mod departure;
mod departure_board;
mod error;
mod schedule;
mod sensor;
mod service;

use config::Config;
use constants::{DEFAULT_CONFIG_PATH, SCAN_INTERVAL};
use departure_board::DepartureBoard;
use error::AppError;
use sensor::FerrySensor;
use service::{FerryStopStatus, TimetableClient, TrafikverketFerry};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "ferry_departures",
    version,
    about = "Polls Trafikverket for the next departure of configured ferry routes.",
    long_about = None
)]
struct Cli {
    /// Path to the ferries configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Poll once, print the board and exit.
    #[arg(long)]
    once: bool,

    /// With --once, print one JSON object per sensor instead of a table.
    #[arg(long, requires = "once")]
    json: bool,

    /// Override the poll interval in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval_secs: Option<u64>,
}

/// Creates a table with the shared board styling.
fn create_table(headers: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.into_iter().map(|h| {
            Cell::new(h)
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Center)
        }));
    table
}

/// Formats a departure in local time, or `--` when unknown.
fn format_departure(departure: Option<DateTime<FixedOffset>>) -> String {
    departure
        .map(|ts| ts.with_timezone(&Local).format("%a %Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "--".to_string())
}

/// Green for a departure running on time, red for anything else.
fn colourise_status(status: &str) -> Cell {
    let color = if status == FerryStopStatus::OnTime.name() {
        Color::Green
    } else {
        Color::Red
    };
    Cell::new(status)
        .add_attribute(Attribute::Bold)
        .set_alignment(CellAlignment::Center)
        .fg(color)
}

/// Renders one row per sensor.
fn render_sensors<C: TimetableClient>(sensors: &[FerrySensor<C>], interval: Duration) -> String {
    let mut table = create_table(vec![
        "Ferry",
        "Departure",
        "Status",
        "Deviation",
        "Other information",
    ]);

    for sensor in sensors {
        let mut name = format!("{} {}", sensor.name(), sensor.icon());
        if let Some(state) = sensor.state() {
            name.push_str(&format!("\n{}", state.route()));
        }
        let row = match sensor.current_attributes() {
            Some(attributes) => vec![
                Cell::new(name),
                Cell::new(format_departure(attributes.departure_time))
                    .set_alignment(CellAlignment::Center),
                colourise_status(&attributes.departure_state),
                Cell::new(attributes.deviations.as_deref().unwrap_or("--")),
                Cell::new(attributes.other_information.as_deref().unwrap_or("--")),
            ],
            None => vec![
                Cell::new(name),
                Cell::new(sensor.state_string()).set_alignment(CellAlignment::Center),
                Cell::new("--").set_alignment(CellAlignment::Center),
                Cell::new("--"),
                Cell::new("--"),
            ],
        };
        table.add_row(row);
    }

    format!(
        "{table}\n\x1b[1m\x1b[3mValues are {} timestamps. Auto-refreshing every {}s. Press Ctrl+C to exit.\x1b[0m",
        sensors
            .first()
            .map(|s| s.device_class())
            .unwrap_or(constants::DEVICE_CLASS_TIMESTAMP),
        interval.as_secs()
    )
}

/// The entity as a host would publish it: value, descriptors and attributes.
fn sensor_json<C: TimetableClient>(sensor: &FerrySensor<C>) -> serde_json::Value {
    serde_json::json!({
        "name": sensor.name(),
        "state": sensor.state_string(),
        "icon": sensor.icon(),
        "device_class": sensor.device_class(),
        "attributes": sensor.current_attributes(),
    })
}

/// Clears the screen and prints the board.
fn print_board<C: TimetableClient>(
    board: &DepartureBoard<C>,
    interval: Duration,
) -> Result<(), AppError> {
    clearscreen::clear()?;
    println!("Ferry departures");
    println!("Last updated: {}", Local::now().format("%H:%M:%S"));
    println!();
    println!("{}", render_sensors(board.sensors(), interval));
    Ok(())
}

/// Loads the configuration, dropping or rejecting invalid routes.
fn load_config(path: &Path) -> Result<Config, AppError> {
    #[allow(unused_mut)]
    let mut config = Config::load(path)?;

    // With `fail-fast-config`, any invalid route stops the program.
    #[cfg(feature = "fail-fast-config")]
    config.validate()?;

    #[cfg(not(feature = "fail-fast-config"))]
    {
        let dropped = config.retain_valid();
        if dropped > 0 {
            tracing::warn!(dropped, "Ignoring invalid ferry routes");
        }
        if config.ferries.is_empty() {
            return Err(crate::config::ConfigError::Invalid(
                "no valid ferries configured".to_string(),
            )
            .into());
        }
    }

    Ok(config)
}

/// Entry point.
///
/// 1. Loads `.env` and initialises tracing.
/// 2. Loads and validates the ferries configuration.
/// 3. Builds one sensor per route and runs the first update.
/// 4. Refreshes every sensor on the scan interval until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load environment variables from a .env file, if it exists.
    let _ = dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let interval_duration = cli
        .interval_secs
        .map(Duration::from_secs)
        .unwrap_or(SCAN_INTERVAL);

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };
    let api_key = config.api_key()?;
    tracing::info!(ferries = config.ferries.len(), "Loaded configuration");

    let client = Arc::new(TrafikverketFerry::new(api_key)?);
    let mut board = DepartureBoard::setup(client, config.ferries).await;

    if cli.once {
        if cli.json {
            for sensor in board.sensors() {
                println!("{}", sensor_json(sensor));
            }
        } else {
            println!("{}", render_sensors(board.sensors(), interval_duration));
        }
        return Ok(());
    }
    print_board(&board, interval_duration)?;

    let mut interval = time::interval(interval_duration);
    // The first tick completes immediately; the initial update already ran.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                break;
            }
            _ = interval.tick() => {
                board.update_all().await;
                if let Err(e) = print_board(&board, interval_duration) {
                    tracing::error!(error = %e, "Error printing board");
                }
            }
        }
    }

    println!("\nExiting...");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, WeekdayToken};
    use crate::service::{Deviation, FerryStop, TimetableError};
    use chrono::NaiveDateTime;

    struct OnTimeTimetable;

    impl TimetableClient for OnTimeTimetable {
        async fn fetch_next_departure(
            &self,
            from: &str,
            _to: &str,
            _when: NaiveDateTime,
        ) -> Result<FerryStop, TimetableError> {
            Ok(FerryStop {
                id: "1".to_string(),
                deleted: false,
                departure_time: DateTime::parse_from_rfc3339("2024-05-20T08:10:00+02:00")
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
            Err(TimetableError::NotFound(deviation_id.to_string()))
        }
    }

    fn route(name: &str) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            from: name.to_string(),
            to: String::new(),
            time: None,
            weekday: WeekdayToken::ALL.to_vec(),
        }
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["ferry_departures"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("ferries.yaml"));
        assert!(!cli.once);
        assert_eq!(cli.interval_secs, None);
    }

    #[test]
    fn cli_json_requires_once() {
        assert!(Cli::try_parse_from(["ferry_departures", "--json"]).is_err());
        let cli = Cli::try_parse_from(["ferry_departures", "--once", "--json"]).unwrap();
        assert!(cli.json);
    }

    #[test]
    fn cli_rejects_zero_interval() {
        assert!(Cli::try_parse_from(["ferry_departures", "--interval-secs", "0"]).is_err());
    }

    #[test]
    fn format_departure_unknown() {
        assert_eq!(format_departure(None), "--");
    }

    #[test]
    fn format_departure_known_uses_local_time() {
        let ts = DateTime::parse_from_rfc3339("2024-05-20T08:10:00+02:00").unwrap();
        let expected = ts.with_timezone(&Local).format("%a %Y-%m-%d %H:%M").to_string();
        assert_eq!(format_departure(Some(ts)), expected);
    }

    #[test]
    fn colourise_status_on_time() {
        let actual_cell = colourise_status("ON_TIME");
        let expected_cell = Cell::new("ON_TIME")
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Center)
            .fg(Color::Green);
        assert_eq!(actual_cell, expected_cell);
    }

    #[test]
    fn colourise_status_canceled() {
        let actual_cell = colourise_status("CANCELED");
        let expected_cell = Cell::new("CANCELED")
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Center)
            .fg(Color::Red);
        assert_eq!(actual_cell, expected_cell);
    }

    #[tokio::test]
    async fn render_shows_updated_and_pending_sensors() {
        let client = Arc::new(OnTimeTimetable);
        let mut updated = FerrySensor::new(client.clone(), route("Vaxholm"));
        updated.update().await;
        let pending = FerrySensor::new(client, route("Ekerö"));

        let rendered = render_sensors(&[updated, pending], SCAN_INTERVAL);
        assert!(rendered.contains("Vaxholm"));
        assert!(rendered.contains("mdi:ferry"));
        assert!(rendered.contains("ON_TIME"));
        assert!(rendered.contains("Extra tur"));
        assert!(rendered.contains("unknown"));
        assert!(rendered.contains("every 300s"));
    }

    #[tokio::test]
    async fn sensor_json_exposes_value_and_attributes() {
        let client = Arc::new(OnTimeTimetable);
        let pending = FerrySensor::new(client.clone(), route("Ekerö"));
        let json = sensor_json(&pending);
        assert_eq!(json["state"], "unknown");
        assert!(json["attributes"].is_null());

        let mut updated = FerrySensor::new(client, route("Vaxholm"));
        updated.update().await;
        let json = sensor_json(&updated);
        assert_eq!(json["name"], "Vaxholm");
        assert_eq!(json["device_class"], "timestamp");
        assert_eq!(json["state"], "2024-05-20T08:10:00+02:00");
        assert_eq!(json["attributes"]["departure_state"], "ON_TIME");
        assert_eq!(json["attributes"]["other_information"], "Extra tur");
    }
}
