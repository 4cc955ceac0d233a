use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// One entry of the configured location list. Coordinates are WGS84 degrees.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters for statistical downscaling; the upstream falls
    /// back to a 90m digital elevation model when unset.
    #[serde(default)]
    pub elevation: Option<f64>,
    /// Per-location timezone override (IANA name or "auto").
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "celsius",
            TemperatureUnit::Fahrenheit => "fahrenheit",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindSpeedUnit {
    #[default]
    Kmh,
    Ms,
    Mph,
    Kn,
}

impl WindSpeedUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            WindSpeedUnit::Kmh => "kmh",
            WindSpeedUnit::Ms => "ms",
            WindSpeedUnit::Mph => "mph",
            WindSpeedUnit::Kn => "kn",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecipitationUnit {
    #[default]
    Mm,
    Inch,
}

impl PrecipitationUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            PrecipitationUnit::Mm => "mm",
            PrecipitationUnit::Inch => "inch",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFormat {
    #[default]
    Iso8601,
    Unixtime,
}

impl TimeFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeFormat::Iso8601 => "iso8601",
            TimeFormat::Unixtime => "unixtime",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellSelection {
    #[default]
    Land,
    Sea,
    Nearest,
}

impl CellSelection {
    pub fn as_str(self) -> &'static str {
        match self {
            CellSelection::Land => "land",
            CellSelection::Sea => "sea",
            CellSelection::Nearest => "nearest",
        }
    }
}

/// What to do when one (stream, location) unit fails: stop the run, or keep
/// going and report the failure at the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    #[default]
    Abort,
    Continue,
}

/// Extraction configuration.
///
/// Field defaults mirror the upstream API defaults; unit parameters equal to
/// their default are omitted from requests entirely (see `params`).
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    pub locations: Vec<Location>,

    /// Default timezone for locations without an override.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Number of forecast days (0-16). Ignored when `forecast_hours` is set.
    #[serde(default = "default_forecast_days")]
    pub forecast_days: u32,
    /// Takes priority over `forecast_days` for hourly-resolution streams.
    #[serde(default)]
    pub forecast_hours: Option<u32>,
    /// Include past days in the window (0-92). Ignored when `past_hours` is set.
    #[serde(default)]
    pub past_days: u32,
    #[serde(default)]
    pub past_hours: Option<u32>,

    /// Absolute bounds for the historical stream, `YYYY-MM-DD`.
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,

    #[serde(default = "default_hourly_variables")]
    pub hourly_variables: Vec<String>,
    #[serde(default = "default_daily_variables")]
    pub daily_variables: Vec<String>,
    #[serde(default = "default_current_variables")]
    pub current_variables: Vec<String>,
    /// 15-minutely data is only native in Central Europe and North America.
    #[serde(default)]
    pub minutely_15_variables: Vec<String>,

    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
    #[serde(default)]
    pub wind_speed_unit: WindSpeedUnit,
    #[serde(default)]
    pub precipitation_unit: PrecipitationUnit,
    #[serde(default)]
    pub timeformat: TimeFormat,

    /// Specific weather models; empty means the upstream best-match blend.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub cell_selection: CellSelection,

    /// Solar panel geometry for global tilted irradiance.
    #[serde(default)]
    pub tilt: Option<f64>,
    #[serde(default)]
    pub azimuth: Option<f64>,

    #[serde(default = "default_streams_to_sync")]
    pub streams_to_sync: Vec<String>,

    /// Commercial API key; sent as the `apikey` parameter when set.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

fn default_timezone() -> String {
    "auto".to_string()
}

fn default_forecast_days() -> u32 {
    7
}

fn default_hourly_variables() -> Vec<String> {
    [
        "temperature_2m",
        "relative_humidity_2m",
        "precipitation",
        "weather_code",
        "wind_speed_10m",
        "wind_direction_10m",
    ]
    .map(String::from)
    .to_vec()
}

fn default_daily_variables() -> Vec<String> {
    [
        "weather_code",
        "temperature_2m_max",
        "temperature_2m_min",
        "precipitation_sum",
        "sunrise",
        "sunset",
    ]
    .map(String::from)
    .to_vec()
}

fn default_current_variables() -> Vec<String> {
    [
        "temperature_2m",
        "relative_humidity_2m",
        "apparent_temperature",
        "is_day",
        "precipitation",
        "weather_code",
        "cloud_cover",
        "wind_speed_10m",
        "wind_direction_10m",
    ]
    .map(String::from)
    .to_vec()
}

fn default_streams_to_sync() -> Vec<String> {
    ["weather_forecast", "weather_hourly", "weather_daily"]
        .map(String::from)
        .to_vec()
}

fn default_api_url() -> String {
    "https://api.open-meteo.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            timezone: default_timezone(),
            forecast_days: default_forecast_days(),
            forecast_hours: None,
            past_days: 0,
            past_hours: None,
            start_date: None,
            end_date: None,
            hourly_variables: default_hourly_variables(),
            daily_variables: default_daily_variables(),
            current_variables: default_current_variables(),
            minutely_15_variables: Vec::new(),
            temperature_unit: TemperatureUnit::default(),
            wind_speed_unit: WindSpeedUnit::default(),
            precipitation_unit: PrecipitationUnit::default(),
            timeformat: TimeFormat::default(),
            models: Vec::new(),
            cell_selection: CellSelection::default(),
            tilt: None,
            azimuth: None,
            streams_to_sync: default_streams_to_sync(),
            api_key: None,
            api_url: default_api_url(),
            user_agent: None,
            request_timeout: default_request_timeout(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl ExtractConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let body = std::fs::read_to_string(path)?;
        Self::from_json_str(&body)
    }

    /// Fatal checks performed before any request is made.
    pub fn validate(&self) -> Result<()> {
        if self.locations.is_empty() {
            return Err(Error::InvalidConfig("at least one location is required".into()));
        }

        let mut seen = std::collections::BTreeSet::new();
        for loc in &self.locations {
            if loc.name.trim().is_empty() {
                return Err(Error::InvalidConfig("location name must not be empty".into()));
            }
            if !seen.insert(loc.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate location name: {}",
                    loc.name
                )));
            }
            if !(-90.0..=90.0).contains(&loc.latitude) {
                return Err(Error::InvalidConfig(format!(
                    "latitude out of range for {}: {}",
                    loc.name, loc.latitude
                )));
            }
            if !(-180.0..=180.0).contains(&loc.longitude) {
                return Err(Error::InvalidConfig(format!(
                    "longitude out of range for {}: {}",
                    loc.name, loc.longitude
                )));
            }
        }

        Ok(())
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }
}
