use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime, Utc};
use log::warn;

use crate::config::{
    CellSelection, ExtractConfig, Location, PrecipitationUnit, TemperatureUnit, TimeFormat,
    WindSpeedUnit,
};
use crate::state::parse_replication_value;
use crate::streams::StreamKind;

/// Value type for a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
}

impl ParamValue {
    /// Wire encoding: lists join with commas, booleans lower-case.
    pub fn encode(&self) -> String {
        match self {
            ParamValue::Str(s) => s.clone(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::List(xs) => xs.join(","),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        ParamValue::List(value)
    }
}

impl From<&[String]> for ParamValue {
    fn from(value: &[String]) -> Self {
        ParamValue::List(value.to_vec())
    }
}

/// Flat query parameter set for one HTTP GET. Built fresh per
/// (stream, location, run); never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    inner: BTreeMap<String, ParamValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.inner.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.inner.iter()
    }

    /// Encoded (key, value) pairs ready for URL serialization.
    pub fn encoded_pairs(&self) -> Vec<(&str, String)> {
        self.inner
            .iter()
            .map(|(k, v)| (k.as_str(), v.encode()))
            .collect()
    }
}

/// Build the parameter set for one (stream, location) request.
///
/// `checkpoint` is the stored replication value for the pair, if any; a value
/// that fails to parse behaves exactly like no checkpoint.
pub fn build_params(
    kind: StreamKind,
    config: &ExtractConfig,
    location: &Location,
    checkpoint: Option<&str>,
) -> QueryParams {
    build_params_at(kind, config, location, checkpoint, Utc::now().naive_utc())
}

pub(crate) fn build_params_at(
    kind: StreamKind,
    config: &ExtractConfig,
    location: &Location,
    checkpoint: Option<&str>,
    now: NaiveDateTime,
) -> QueryParams {
    let mut params = QueryParams::new();

    // Location.
    params.set("latitude", location.latitude);
    params.set("longitude", location.longitude);
    if let Some(elevation) = location.elevation {
        params.set("elevation", elevation);
    }
    let timezone = location.timezone.as_deref().unwrap_or(&config.timezone);
    params.set("timezone", timezone);

    // Units, omitted when equal to the upstream default.
    if config.temperature_unit != TemperatureUnit::Celsius {
        params.set("temperature_unit", config.temperature_unit.as_str());
    }
    if config.wind_speed_unit != WindSpeedUnit::Kmh {
        params.set("wind_speed_unit", config.wind_speed_unit.as_str());
    }
    if config.precipitation_unit != PrecipitationUnit::Mm {
        params.set("precipitation_unit", config.precipitation_unit.as_str());
    }
    if config.timeformat != TimeFormat::Iso8601 {
        params.set("timeformat", config.timeformat.as_str());
    }

    if !config.models.is_empty() {
        params.set("models", config.models.clone());
    }
    if config.cell_selection != CellSelection::Land {
        params.set("cell_selection", config.cell_selection.as_str());
    }
    if let Some(key) = &config.api_key {
        params.set("apikey", key.as_str());
    }
    if let Some(tilt) = config.tilt {
        params.set("tilt", tilt);
    }
    if let Some(azimuth) = config.azimuth {
        params.set("azimuth", azimuth);
    }

    match kind {
        StreamKind::Forecast => {
            apply_relative_window(&mut params, config, true);
            // One variable is enough to obtain response metadata.
            if let Some(first) = config.hourly_variables.first() {
                params.set("hourly", first.as_str());
            }
        }
        StreamKind::Hourly => {
            apply_relative_window(&mut params, config, true);
            params.set("hourly", config.hourly_variables.clone());

            if let Some(start) = parse_checkpoint(kind, checkpoint) {
                let span = config.forecast_hours.unwrap_or(48);
                let end = now + Duration::hours(i64::from(span));
                params.set("start_hour", start.format("%Y-%m-%dT%H:%M").to_string());
                // The upstream rejects a start without an end.
                params.set("end_hour", end.format("%Y-%m-%dT%H:%M").to_string());
                clear_relative_window(&mut params);
            }
        }
        StreamKind::Daily => {
            apply_relative_window(&mut params, config, true);
            params.set("daily", config.daily_variables.clone());

            if let Some(start) = parse_checkpoint(kind, checkpoint) {
                let end = now + Duration::days(i64::from(config.forecast_days));
                params.set("start_date", start.format("%Y-%m-%d").to_string());
                params.set("end_date", end.format("%Y-%m-%d").to_string());
                clear_relative_window(&mut params);
            }
        }
        StreamKind::Current => {
            params.set("current", config.current_variables.clone());
        }
        StreamKind::Minutely15 => {
            // Forecast direction only; the upstream has no past window here.
            apply_relative_window(&mut params, config, false);
            if !config.minutely_15_variables.is_empty() {
                params.set("minutely_15", config.minutely_15_variables.clone());
            }
        }
        StreamKind::Historical => {
            // The archive endpoint only serves absolute windows, and never
            // data through the current instant.
            let start = parse_checkpoint(kind, checkpoint)
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .or_else(|| config.start_date.clone())
                .unwrap_or_else(|| (now - Duration::days(30)).format("%Y-%m-%d").to_string());
            let end = config
                .end_date
                .clone()
                .unwrap_or_else(|| (now - Duration::days(1)).format("%Y-%m-%d").to_string());
            params.set("start_date", start);
            params.set("end_date", end);
            params.set("hourly", config.hourly_variables.clone());
        }
    }

    params
}

fn parse_checkpoint(kind: StreamKind, checkpoint: Option<&str>) -> Option<NaiveDateTime> {
    let raw = checkpoint?;
    match parse_replication_value(raw) {
        Some(dt) => Some(dt),
        None => {
            warn!(
                "ignoring malformed replication value {raw:?} for stream {}",
                kind.name()
            );
            None
        }
    }
}

/// Relative window: exactly one unit family (hours vs days) per direction,
/// hours taking priority when configured.
fn apply_relative_window(params: &mut QueryParams, config: &ExtractConfig, with_past: bool) {
    match config.forecast_hours {
        Some(hours) => params.set("forecast_hours", hours),
        None => params.set("forecast_days", config.forecast_days),
    }
    if with_past {
        match config.past_hours {
            Some(hours) => params.set("past_hours", hours),
            None => params.set("past_days", config.past_days),
        }
    }
}

/// The upstream treats relative and absolute window parameters as mutually
/// exclusive and rejects requests mixing them.
fn clear_relative_window(params: &mut QueryParams) {
    params.remove("forecast_hours");
    params.remove("past_hours");
    params.remove("forecast_days");
    params.remove("past_days");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_location() -> Location {
        Location {
            name: "TestCity".to_string(),
            latitude: 45.0,
            longitude: 11.0,
            elevation: None,
            timezone: Some("Europe/Rome".to_string()),
        }
    }

    fn hour_window_config() -> ExtractConfig {
        ExtractConfig {
            locations: vec![test_location()],
            forecast_hours: Some(48),
            past_hours: Some(120),
            models: vec!["icon_d2".to_string()],
            hourly_variables: vec!["temperature_2m".to_string()],
            ..ExtractConfig::default()
        }
    }

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 23)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn location_and_timezone_override() {
        let config = hour_window_config();
        let params = build_params_at(
            StreamKind::Hourly,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );

        assert_eq!(params.get("latitude"), Some(&ParamValue::Float(45.0)));
        assert_eq!(params.get("longitude"), Some(&ParamValue::Float(11.0)));
        assert_eq!(
            params.get("timezone"),
            Some(&ParamValue::Str("Europe/Rome".to_string()))
        );
        assert!(!params.contains("elevation"));
    }

    #[test]
    fn global_timezone_when_no_override() {
        let config = hour_window_config();
        let location = Location {
            timezone: None,
            ..test_location()
        };
        let params = build_params_at(StreamKind::Hourly, &config, &location, None, fixed_now());
        assert_eq!(params.get("timezone"), Some(&ParamValue::Str("auto".to_string())));
    }

    #[test]
    fn elevation_included_only_when_set() {
        let config = hour_window_config();
        let location = Location {
            elevation: Some(120.5),
            ..test_location()
        };
        let params = build_params_at(StreamKind::Hourly, &config, &location, None, fixed_now());
        assert_eq!(params.get("elevation"), Some(&ParamValue::Float(120.5)));
    }

    #[test]
    fn default_units_are_suppressed() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Hourly,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );

        for key in [
            "temperature_unit",
            "wind_speed_unit",
            "precipitation_unit",
            "timeformat",
            "cell_selection",
        ] {
            assert!(!params.contains(key), "{key} should be suppressed at default");
        }
    }

    #[test]
    fn non_default_units_are_included() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            temperature_unit: crate::config::TemperatureUnit::Fahrenheit,
            wind_speed_unit: crate::config::WindSpeedUnit::Ms,
            precipitation_unit: crate::config::PrecipitationUnit::Inch,
            timeformat: crate::config::TimeFormat::Unixtime,
            cell_selection: crate::config::CellSelection::Nearest,
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Hourly,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );

        assert_eq!(
            params.get("temperature_unit"),
            Some(&ParamValue::Str("fahrenheit".to_string()))
        );
        assert_eq!(params.get("wind_speed_unit"), Some(&ParamValue::Str("ms".to_string())));
        assert_eq!(
            params.get("precipitation_unit"),
            Some(&ParamValue::Str("inch".to_string()))
        );
        assert_eq!(params.get("timeformat"), Some(&ParamValue::Str("unixtime".to_string())));
        assert_eq!(
            params.get("cell_selection"),
            Some(&ParamValue::Str("nearest".to_string()))
        );
    }

    #[test]
    fn models_and_apikey_and_panel_geometry() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            models: vec!["icon_d2".to_string(), "gfs_seamless".to_string()],
            api_key: Some("secret".to_string()),
            tilt: Some(45.0),
            azimuth: Some(-90.0),
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Hourly,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );

        assert_eq!(
            params.get("models").map(ParamValue::encode).as_deref(),
            Some("icon_d2,gfs_seamless")
        );
        assert_eq!(params.get("apikey"), Some(&ParamValue::Str("secret".to_string())));
        assert_eq!(params.get("tilt"), Some(&ParamValue::Float(45.0)));
        assert_eq!(params.get("azimuth"), Some(&ParamValue::Float(-90.0)));
    }

    #[test]
    fn hourly_relative_window_prefers_hours() {
        let config = hour_window_config();
        let params = build_params_at(
            StreamKind::Hourly,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );

        assert_eq!(params.get("forecast_hours"), Some(&ParamValue::Int(48)));
        assert_eq!(params.get("past_hours"), Some(&ParamValue::Int(120)));
        assert!(!params.contains("forecast_days"));
        assert!(!params.contains("past_days"));
        assert!(!params.contains("start_hour"));
        assert!(!params.contains("end_hour"));
    }

    #[test]
    fn hourly_relative_window_defaults_to_days() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Hourly,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );

        assert_eq!(params.get("forecast_days"), Some(&ParamValue::Int(7)));
        assert_eq!(params.get("past_days"), Some(&ParamValue::Int(0)));
        assert!(!params.contains("forecast_hours"));
        assert!(!params.contains("past_hours"));
    }

    #[test]
    fn hourly_checkpoint_switches_to_absolute_window() {
        let config = hour_window_config();
        let params = build_params_at(
            StreamKind::Hourly,
            &config,
            &test_location(),
            Some("2026-02-20T10:00"),
            fixed_now(),
        );

        assert_eq!(
            params.get("start_hour"),
            Some(&ParamValue::Str("2026-02-20T10:00".to_string()))
        );
        // end_hour = now + forecast_hours (48h from 2026-02-23T12:00).
        assert_eq!(
            params.get("end_hour"),
            Some(&ParamValue::Str("2026-02-25T12:00".to_string()))
        );
        for key in ["forecast_hours", "past_hours", "forecast_days", "past_days"] {
            assert!(!params.contains(key), "{key} must be removed in absolute mode");
        }
    }

    #[test]
    fn hourly_end_span_defaults_to_48_hours() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Hourly,
            &config,
            &test_location(),
            Some("2026-02-20T10:00"),
            fixed_now(),
        );
        assert_eq!(
            params.get("end_hour"),
            Some(&ParamValue::Str("2026-02-25T12:00".to_string()))
        );
    }

    #[test]
    fn daily_checkpoint_switches_to_absolute_window() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Daily,
            &config,
            &test_location(),
            Some("2026-02-15T00:00"),
            fixed_now(),
        );

        assert_eq!(
            params.get("start_date"),
            Some(&ParamValue::Str("2026-02-15".to_string()))
        );
        // end_date = now + forecast_days (7d from 2026-02-23).
        assert_eq!(
            params.get("end_date"),
            Some(&ParamValue::Str("2026-03-02".to_string()))
        );
        for key in ["forecast_hours", "past_hours", "forecast_days", "past_days"] {
            assert!(!params.contains(key));
        }
    }

    #[test]
    fn malformed_checkpoint_behaves_like_none() {
        let config = hour_window_config();
        let with_bad = build_params_at(
            StreamKind::Hourly,
            &config,
            &test_location(),
            Some("garbage"),
            fixed_now(),
        );
        let without = build_params_at(
            StreamKind::Hourly,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );
        assert_eq!(with_bad, without);
    }

    #[test]
    fn forecast_metadata_requests_single_variable() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            hourly_variables: vec!["temperature_2m".to_string(), "precipitation".to_string()],
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Forecast,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );
        assert_eq!(
            params.get("hourly"),
            Some(&ParamValue::Str("temperature_2m".to_string()))
        );
    }

    #[test]
    fn current_has_no_window_keys() {
        let config = hour_window_config();
        let params = build_params_at(
            StreamKind::Current,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );

        assert_eq!(
            params.get("current").map(ParamValue::encode).as_deref(),
            Some(
                "temperature_2m,relative_humidity_2m,apparent_temperature,is_day,precipitation,\
                 weather_code,cloud_cover,wind_speed_10m,wind_direction_10m"
            )
        );
        for key in [
            "forecast_hours",
            "forecast_days",
            "past_hours",
            "past_days",
            "start_hour",
            "end_hour",
        ] {
            assert!(!params.contains(key));
        }
    }

    #[test]
    fn minutely_has_forecast_direction_only() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            past_hours: Some(120),
            minutely_15_variables: vec!["temperature_2m".to_string()],
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Minutely15,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );

        assert_eq!(params.get("forecast_days"), Some(&ParamValue::Int(7)));
        assert!(!params.contains("past_hours"));
        assert!(!params.contains("past_days"));
        assert_eq!(
            params.get("minutely_15").map(ParamValue::encode).as_deref(),
            Some("temperature_2m")
        );
    }

    #[test]
    fn minutely_omits_empty_variable_list() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Minutely15,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );
        assert!(!params.contains("minutely_15"));
    }

    #[test]
    fn historical_defaults_to_trailing_30_days() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Historical,
            &config,
            &test_location(),
            None,
            fixed_now(),
        );

        assert_eq!(
            params.get("start_date"),
            Some(&ParamValue::Str("2026-01-24".to_string()))
        );
        // Yesterday: the archive never serves through the current instant.
        assert_eq!(
            params.get("end_date"),
            Some(&ParamValue::Str("2026-02-22".to_string()))
        );
        assert!(!params.contains("forecast_days"));
        assert!(!params.contains("past_days"));
    }

    #[test]
    fn historical_checkpoint_overrides_configured_start() {
        let config = ExtractConfig {
            locations: vec![test_location()],
            start_date: Some("2025-01-01".to_string()),
            end_date: Some("2026-02-01".to_string()),
            ..ExtractConfig::default()
        };
        let params = build_params_at(
            StreamKind::Historical,
            &config,
            &test_location(),
            Some("2026-01-15T00:00"),
            fixed_now(),
        );

        assert_eq!(
            params.get("start_date"),
            Some(&ParamValue::Str("2026-01-15".to_string()))
        );
        assert_eq!(
            params.get("end_date"),
            Some(&ParamValue::Str("2026-02-01".to_string()))
        );
    }

    #[test]
    fn window_key_families_never_mix() {
        // For every windowed stream and checkpoint state, hours and days never
        // coexist per direction, and relative never coexists with absolute.
        let configs = [
            ExtractConfig {
                locations: vec![test_location()],
                ..ExtractConfig::default()
            },
            hour_window_config(),
        ];
        let checkpoints: [Option<&str>; 3] = [None, Some("2026-02-20T10:00"), Some("garbage")];

        for config in &configs {
            for kind in [StreamKind::Forecast, StreamKind::Hourly, StreamKind::Daily] {
                for checkpoint in checkpoints {
                    let params =
                        build_params_at(kind, config, &test_location(), checkpoint, fixed_now());

                    assert!(
                        !(params.contains("forecast_hours") && params.contains("forecast_days"))
                    );
                    assert!(!(params.contains("past_hours") && params.contains("past_days")));

                    let absolute = params.contains("start_hour")
                        || params.contains("end_hour")
                        || params.contains("start_date")
                        || params.contains("end_date");
                    let relative = params.contains("forecast_hours")
                        || params.contains("forecast_days")
                        || params.contains("past_hours")
                        || params.contains("past_days");
                    assert!(!(absolute && relative), "mixed window modes for {kind:?}");
                }
            }
        }
    }

    #[test]
    fn encoded_pairs_join_lists_and_lowercase_bools() {
        let mut params = QueryParams::new();
        params.set("hourly", vec!["a".to_string(), "b".to_string()]);
        params.set("flag", true);
        params.set("n", 3i64);

        let pairs = params.encoded_pairs();
        assert!(pairs.contains(&("hourly", "a,b".to_string())));
        assert!(pairs.contains(&("flag", "true".to_string())));
        assert!(pairs.contains(&("n", "3".to_string())));
    }
}
