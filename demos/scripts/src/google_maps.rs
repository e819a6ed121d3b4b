//! Google Places lookups for other scripts.
//!
//! Binds no commands. Other scripts reach it through
//! [`HandlerContext::lookup`] and call [`GoogleMaps::search_places`] and
//! [`GoogleMaps::place_details`].
//!
//! ```toml
//! [plugins.google_maps]
//! api_key = "..."   # or GOOGLE_MAPS_API_KEY
//! lang = "da"       # default "en"
//! ```

use lark::prelude::*;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, warn};

const API_URL: &str = "https://maps.googleapis.com";
const DEFAULT_LANGUAGE: &str = "en";

// =============================================================================
// Opening hours
// =============================================================================

/// A weekday (0 is Sunday) and minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayTime {
    pub weekday: u8,
    pub minutes: u16,
}

impl DayTime {
    pub fn new(weekday: u8, hour: u8, minute: u8) -> Self {
        Self {
            weekday: weekday % 7,
            minutes: u16::from(hour) * 60 + u16::from(minute),
        }
    }

    /// Local wall-clock time, or UTC when the local offset is unknown.
    pub fn now() -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self::new(now.weekday().number_days_from_sunday(), now.hour(), now.minute())
    }
}

/// Opening and closing time for one weekday, in minutes since midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hours {
    pub open: Option<u16>,
    pub close: Option<u16>,
}

/// Parses the API's `HHMM` times.
fn parse_hhmm(time: &str) -> Option<u16> {
    if time.len() != 4 || !time.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u16 = time[..2].parse().ok()?;
    let minute: u16 = time[2..].parse().ok()?;
    (hour < 24 && minute < 60).then_some(hour * 60 + minute)
}

/// Formats minutes since midnight as `HH:MM`.
pub fn clock(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

// =============================================================================
// Place
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct RawPoint {
    day: u8,
    time: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPeriod {
    open: Option<RawPoint>,
    close: Option<RawPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawHours {
    open_now: Option<bool>,
    #[serde(default)]
    periods: Vec<RawPeriod>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPlace {
    place_id: String,
    #[serde(default)]
    name: String,
    formatted_address: Option<String>,
    rating: Option<f64>,
    url: Option<String>,
    opening_hours: Option<RawHours>,
}

/// A place from a text search or a details lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub id: String,
    pub name: String,
    pub formatted_address: Option<String>,
    pub rating: Option<f64>,
    pub url: Option<String>,
    /// Whether the place is open right now, if the API said.
    pub open_now: Option<bool>,
    /// A single period opening Sunday 00:00 with no close.
    pub always_open: bool,
    /// Indexed by weekday, 0 is Sunday.
    pub hours: [Option<Hours>; 7],
}

impl Place {
    fn from_raw(raw: RawPlace) -> Self {
        let mut place = Place {
            id: raw.place_id,
            name: raw.name,
            formatted_address: raw.formatted_address,
            rating: raw.rating,
            url: raw.url,
            open_now: None,
            always_open: false,
            hours: [None; 7],
        };
        let Some(opening_hours) = raw.opening_hours else {
            return place;
        };
        place.open_now = opening_hours.open_now;

        if let [period] = opening_hours.periods.as_slice() {
            let from_midnight = period
                .open
                .as_ref()
                .is_some_and(|open| open.day == 0 && open.time == "0000");
            if from_midnight && period.close.is_none() {
                place.always_open = true;
                return place;
            }
        }

        for period in &opening_hours.periods {
            let Some(day) = period.open.as_ref().or(period.close.as_ref()).map(|p| p.day) else {
                continue;
            };
            if let Some(slot) = place.hours.get_mut(usize::from(day)) {
                *slot = Some(Hours {
                    open: period.open.as_ref().and_then(|p| parse_hhmm(&p.time)),
                    close: period.close.as_ref().and_then(|p| parse_hhmm(&p.time)),
                });
            }
        }
        place
    }

    pub fn is_open(&self) -> bool {
        self.open_now == Some(true)
    }

    /// The hours for `weekday`, or none when the place has no period that day.
    pub fn hours_on(&self, weekday: u8) -> Hours {
        self.hours
            .get(usize::from(weekday))
            .copied()
            .flatten()
            .unwrap_or_default()
    }

    pub fn opening_time(&self, weekday: u8) -> Option<String> {
        self.hours_on(weekday).open.map(clock)
    }

    pub fn closing_time(&self, weekday: u8) -> Option<String> {
        self.hours_on(weekday).close.map(clock)
    }
}

// =============================================================================
// API
// =============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    status: String,
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<RawPlace>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    error_message: Option<String>,
    result: Option<RawPlace>,
}

/// Maps the API's `status` field to an error. `ZERO_RESULTS` is not one.
fn check_status(status: &str, error_message: Option<&str>) -> TaskResult<()> {
    let reason = match status {
        "OK" | "ZERO_RESULTS" => return Ok(()),
        "OVER_QUERY_LIMIT" => "query limit exceeded",
        "REQUEST_DENIED" => "request denied",
        "INVALID_REQUEST" => "invalid request",
        "NOT_FOUND" => "place not found",
        _ => "unknown error",
    };
    warn!(status, error_message, "Google Maps request failed");
    Err(TaskError::domain(format!("Google Maps: {reason}")))
}

pub struct GoogleMaps {
    api_key: String,
    lang: String,
    api_url: String,
}

impl GoogleMaps {
    fn request(&self, path: &str) -> Request {
        Request::get(format!("{}{path}", self.api_url))
            .query("key", &self.api_key)
            .query("language", &self.lang)
    }

    /// Text search for places matching `query`, best match first.
    pub fn search_places(&self, ctx: &HandlerContext, query: &str) -> Task<Vec<Place>> {
        debug!(query, "Searching places");
        let http = ctx.http().clone();
        let request = self.request("/maps/api/place/textsearch/json").query("query", query);
        ctx.spawn("google_maps.search_places", move |scope| async move {
            let body: SearchResponse = http
                .request(&scope, request)
                .wait()
                .await?
                .raise_for_status()?
                .json()?;
            check_status(&body.status, body.error_message.as_deref())?;
            Ok(body.results.into_iter().map(Place::from_raw).collect())
        })
    }

    /// Full details for `place`, including opening periods.
    pub fn place_details(&self, ctx: &HandlerContext, place: &Place) -> Task<Option<Place>> {
        let http = ctx.http().clone();
        let request = self
            .request("/maps/api/place/details/json")
            .query("placeid", &place.id);
        ctx.spawn("google_maps.place_details", move |scope| async move {
            let body: DetailsResponse = http
                .request(&scope, request)
                .wait()
                .await?
                .raise_for_status()?
                .json()?;
            check_status(&body.status, body.error_message.as_deref())?;
            Ok(body.result.map(Place::from_raw))
        })
    }
}

impl Plugin for GoogleMaps {
    const NAME: &'static str = "google_maps";
    const VERSION: &'static str = "1.0";
    const AUTHOR: &'static str = "Mikkel Kroman <mk@maero.dk>";
    const DESCRIPTION: &'static str = "Google Maps API interface";

    fn load(config: &PluginConfig) -> LoadResult<Self> {
        Ok(Self {
            api_key: config.require_or_env("api_key", "GOOGLE_MAPS_API_KEY")?,
            lang: config.get_str("lang").unwrap_or(DEFAULT_LANGUAGE).to_string(),
            api_url: config.get_str("api_url").unwrap_or(API_URL).to_string(),
        })
    }

    fn register(_bindings: &mut Bindings<Self>) {}
}
