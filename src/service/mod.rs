//! # Service Module
//!
//! This module handles all interactions with the ferry timetable. It defines
//! the [`TimetableClient`] seam the sensors poll through, the domain records
//! returned by it, and [`TrafikverketFerry`], the binding against the
//! Trafikverket open data API.
//!
//! Trafikverket queries are XML documents POSTed to a single endpoint; the
//! answers come back as JSON wrapped in a `RESPONSE.RESULT` envelope.

use crate::constants::{
    API_BASE_URL, FERRY_ANNOUNCEMENT_SCHEMA, QUERY_TIME_FORMAT, SITUATION_SCHEMA,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::convert::TryFrom;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Errors returned by a [`TimetableClient`].
#[derive(Debug, thiserror::Error)]
pub enum TimetableError {
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Trafikverket rejected the query: {0}")]
    Api(String),

    #[error("Unexpected API response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    MultipleFound(String),
}

/// Source of ferry departures and deviations.
///
/// Both calls may fail; callers are expected to log and carry on.
pub trait TimetableClient {
    /// Fetches the first departure from `from` to `to` after `when`.
    ///
    /// An empty `to` matches any destination harbor.
    fn fetch_next_departure(
        &self,
        from: &str,
        to: &str,
        when: NaiveDateTime,
    ) -> impl Future<Output = Result<FerryStop, TimetableError>> + Send;

    /// Fetches the deviation referenced by a departure.
    fn fetch_deviation(
        &self,
        deviation_id: &str,
    ) -> impl Future<Output = Result<Deviation, TimetableError>> + Send;
}

/// Status of a single ferry departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FerryStopStatus {
    /// Running according to the timetable.
    OnTime,
    /// The announcement has been withdrawn.
    Canceled,
}

impl FerryStopStatus {
    /// The enumeration name exposed as the `departure_state` attribute.
    pub fn name(&self) -> &'static str {
        match self {
            FerryStopStatus::OnTime => "ON_TIME",
            FerryStopStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for FerryStopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single scheduled ferry departure.
#[derive(Debug, Clone, PartialEq)]
pub struct FerryStop {
    pub id: String,
    pub deleted: bool,
    pub departure_time: DateTime<FixedOffset>,
    /// Free-text notices attached to the departure.
    pub other_information: Vec<String>,
    pub deviation_id: Option<String>,
    pub modified_time: Option<DateTime<FixedOffset>>,
    pub from_harbor_name: String,
    pub to_harbor_name: Option<String>,
    /// Announcement type as named by Trafikverket, e.g. `Avgång`.
    pub type_name: Option<String>,
}

impl FerryStop {
    pub fn status(&self) -> FerryStopStatus {
        if self.deleted {
            FerryStopStatus::Canceled
        } else {
            FerryStopStatus::OnTime
        }
    }
}

/// A service disruption referenced from a departure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Deviation {
    pub id: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    /// Text shown as the `deviations` attribute.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity_code: Option<i64>,
    #[serde(default)]
    pub start_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub end_time: Option<DateTime<FixedOffset>>,
}

/// `{"RESPONSE": {"RESULT": [...]}}`
#[derive(Deserialize, Debug)]
struct ApiEnvelope<R> {
    #[serde(rename = "RESPONSE")]
    response: ApiResponse<R>,
}

#[derive(Deserialize, Debug)]
struct ApiResponse<R> {
    #[serde(rename = "RESULT", default = "Vec::new")]
    result: Vec<R>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(rename = "SOURCE", default)]
    source: String,
    #[serde(rename = "MESSAGE", default)]
    message: String,
}

/// Result entries carry either objects of one type or an `ERROR` block.
trait ApiResult {
    fn error(&self) -> Option<&ApiError>;
}

#[derive(Deserialize, Debug)]
struct FerryAnnouncementResult {
    #[serde(rename = "FerryAnnouncement", default)]
    announcements: Vec<ApiFerryAnnouncement>,
    #[serde(rename = "ERROR")]
    error: Option<ApiError>,
}

impl ApiResult for FerryAnnouncementResult {
    fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }
}

#[derive(Deserialize, Debug)]
struct SituationResult {
    #[serde(rename = "Situation", default)]
    situations: Vec<ApiSituation>,
    #[serde(rename = "ERROR")]
    error: Option<ApiError>,
}

impl ApiResult for SituationResult {
    fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ApiSituation {
    #[serde(default)]
    deviation: Vec<Deviation>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ApiHarbor {
    name: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ApiAnnouncementType {
    name: Option<String>,
}

/// Raw `FerryAnnouncement` object as returned by the API.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ApiFerryAnnouncement {
    #[serde(default, deserialize_with = "id_as_string")]
    id: String,
    #[serde(default)]
    deleted: bool,
    departure_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    info: Vec<String>,
    deviation_id: Option<String>,
    modified_time: Option<DateTime<FixedOffset>>,
    from_harbor: Option<ApiHarbor>,
    to_harbor: Option<ApiHarbor>,
    #[serde(rename = "Type")]
    announcement_type: Option<ApiAnnouncementType>,
}

/// The API sends numeric ids for announcements; keep them as strings.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

/// Converts a raw announcement into a [`FerryStop`].
///
/// Announcements without a departure time or origin harbor cannot be shown
/// and are rejected.
impl TryFrom<ApiFerryAnnouncement> for FerryStop {
    type Error = &'static str;

    fn try_from(raw: ApiFerryAnnouncement) -> Result<Self, Self::Error> {
        let departure_time = raw.departure_time.ok_or("Missing departure time")?;
        let from_harbor = raw.from_harbor.ok_or("Missing departure harbor")?;

        Ok(FerryStop {
            id: raw.id,
            deleted: raw.deleted,
            departure_time,
            other_information: raw.info,
            deviation_id: raw.deviation_id.filter(|id| !id.is_empty()),
            modified_time: raw.modified_time,
            from_harbor_name: from_harbor.name,
            to_harbor_name: raw.to_harbor.map(|h| h.name),
            type_name: raw.announcement_type.and_then(|t| t.name),
        })
    }
}

/// Escapes a value for use inside a double-quoted XML attribute.
fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Wraps query filters in a complete `REQUEST` document.
fn build_request(
    api_key: &str,
    objecttype: &str,
    schemaversion: &str,
    query_attrs: &str,
    filters: &[String],
    includes: &[&str],
) -> String {
    let mut filter = String::new();
    match filters {
        [] => {}
        [single] => filter.push_str(single),
        many => {
            filter.push_str("<AND>");
            for f in many {
                filter.push_str(f);
            }
            filter.push_str("</AND>");
        }
    }
    let include: String = includes
        .iter()
        .map(|field| format!("<INCLUDE>{field}</INCLUDE>"))
        .collect();

    format!(
        "<REQUEST>\
         <LOGIN authenticationkey=\"{key}\" />\
         <QUERY objecttype=\"{objecttype}\" schemaversion=\"{schemaversion}\"{query_attrs}>\
         <FILTER>{filter}</FILTER>{include}\
         </QUERY>\
         </REQUEST>",
        key = xml_escape(api_key),
    )
}

fn eq_filter(name: &str, value: &str) -> String {
    format!("<EQ name=\"{name}\" value=\"{}\" />", xml_escape(value))
}

fn gt_filter(name: &str, value: &str) -> String {
    format!("<GT name=\"{name}\" value=\"{}\" />", xml_escape(value))
}

/// Fields requested for each `FerryAnnouncement`.
const FERRY_INCLUDES: &[&str] = &[
    "Id",
    "Deleted",
    "DepartureTime",
    "DeviationId",
    "FromHarbor",
    "ToHarbor",
    "Info",
    "ModifiedTime",
    "Type",
];

/// Builds the query for the next departure on a route.
fn ferry_query(api_key: &str, from: &str, to: &str, when: NaiveDateTime) -> String {
    let mut filters = vec![eq_filter("DepartureHarborName", from)];
    if !to.is_empty() {
        filters.push(eq_filter("ArrivalHarborName", to));
    }
    filters.push(gt_filter(
        "DepartureTime",
        &when.format(QUERY_TIME_FORMAT).to_string(),
    ));
    build_request(
        api_key,
        "FerryAnnouncement",
        FERRY_ANNOUNCEMENT_SCHEMA,
        " orderby=\"DepartureTime\" limit=\"1\"",
        &filters,
        FERRY_INCLUDES,
    )
}

/// Builds the query for a single deviation.
fn deviation_query(api_key: &str, deviation_id: &str) -> String {
    build_request(
        api_key,
        "Situation",
        SITUATION_SCHEMA,
        "",
        &[eq_filter("Deviation.Id", deviation_id)],
        &[],
    )
}

/// Trafikverket binding of [`TimetableClient`].
///
/// Holds one `reqwest::Client`, so clones of the surrounding `Arc` share
/// the same connection pool.
#[derive(Debug, Clone)]
pub struct TrafikverketFerry {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TrafikverketFerry {
    /// Creates a client against the public Trafikverket endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, TimetableError> {
        Self::with_base_url(api_key, API_BASE_URL)
    }

    /// Creates a client against a custom endpoint.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, TimetableError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }

    /// POSTs a query and returns the first result entry of the envelope.
    async fn post_query<R>(&self, query: String) -> Result<R, TimetableError>
    where
        R: DeserializeOwned + ApiResult,
    {
        let response = self
            .client
            .post(&self.base_url)
            .header(CONTENT_TYPE, "text/xml")
            .body(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let envelope: ApiEnvelope<R> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                TimetableError::InvalidResponse(e.to_string())
            } else {
                TimetableError::Api(format!("HTTP {status}"))
            }
        })?;

        let result = envelope
            .response
            .result
            .into_iter()
            .next()
            .ok_or_else(|| TimetableError::InvalidResponse("empty RESULT".to_string()))?;

        if let Some(error) = result.error() {
            return Err(TimetableError::Api(format!(
                "{}: {}",
                error.source, error.message
            )));
        }
        Ok(result)
    }
}

impl TimetableClient for TrafikverketFerry {
    async fn fetch_next_departure(
        &self,
        from: &str,
        to: &str,
        when: NaiveDateTime,
    ) -> Result<FerryStop, TimetableError> {
        tracing::debug!(from, to, %when, "Fetching next ferry departure");
        let result: FerryAnnouncementResult =
            self.post_query(ferry_query(&self.api_key, from, to, when)).await?;

        let raw = result.announcements.into_iter().next().ok_or_else(|| {
            TimetableError::NotFound(format!(
                "No ferry departure found from '{from}' to '{to}' after {when}"
            ))
        })?;

        FerryStop::try_from(raw).map_err(|e| TimetableError::InvalidResponse(e.to_string()))
    }

    async fn fetch_deviation(&self, deviation_id: &str) -> Result<Deviation, TimetableError> {
        tracing::debug!(deviation_id, "Fetching deviation");
        let result: SituationResult = self
            .post_query(deviation_query(&self.api_key, deviation_id))
            .await?;

        let mut deviations = result
            .situations
            .into_iter()
            .flat_map(|situation| situation.deviation)
            .filter(|deviation| deviation.id == deviation_id);

        let deviation = deviations.next().ok_or_else(|| {
            TimetableError::NotFound(format!("No deviation found with id '{deviation_id}'"))
        })?;
        if deviations.next().is_some() {
            return Err(TimetableError::MultipleFound(format!(
                "Multiple deviations found with id '{deviation_id}'"
            )));
        }
        Ok(deviation)
    }
}
