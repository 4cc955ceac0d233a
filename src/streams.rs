use log::warn;

use crate::config::ExtractConfig;

/// The six logical streams exposed by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Forecast metadata and request snapshot, one record per run.
    Forecast,
    Hourly,
    Daily,
    Current,
    Minutely15,
    Historical,
}

impl StreamKind {
    pub const ALL: [StreamKind; 6] = [
        StreamKind::Forecast,
        StreamKind::Hourly,
        StreamKind::Daily,
        StreamKind::Current,
        StreamKind::Minutely15,
        StreamKind::Historical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Forecast => "weather_forecast",
            StreamKind::Hourly => "weather_hourly",
            StreamKind::Daily => "weather_daily",
            StreamKind::Current => "weather_current",
            StreamKind::Minutely15 => "weather_minutely_15",
            StreamKind::Historical => "weather_historical",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        StreamKind::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Endpoint path relative to the configured base URL.
    pub fn path(self) -> &'static str {
        match self {
            StreamKind::Historical => "/v1/archive",
            _ => "/v1/forecast",
        }
    }

    pub fn primary_key(self) -> &'static [&'static str] {
        match self {
            StreamKind::Forecast => &["location_name", "generated_at"],
            StreamKind::Daily => &["location_name", "date"],
            _ => &["location_name", "time"],
        }
    }

    pub fn replication_key(self) -> &'static str {
        match self {
            StreamKind::Forecast => "generated_at",
            StreamKind::Daily => "date",
            _ => "time",
        }
    }

    /// Records are emitted non-decreasing by replication key. The upstream
    /// returns time arrays in chronological order, so this holds for every
    /// stream; the single-record streams declare it for consistency.
    pub fn is_sorted(self) -> bool {
        true
    }
}

/// Semantic field types used both for schema declarations and for value
/// coercion while flattening. The two must never diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    DateTime,
    Date,
    StringList,
}

/// Variable-name to field-type rule table, applied uniformly across streams.
pub fn variable_field_type(var: &str) -> FieldType {
    match var {
        "weather_code" | "is_day" => FieldType::Integer,
        "time" | "sunrise" | "sunset" => FieldType::DateTime,
        _ => FieldType::Number,
    }
}

/// A stream instance with its configuration-shaped schema.
///
/// The schema is built once at registry construction and immutable for the
/// run; it is never inferred from response content.
#[derive(Debug, Clone)]
pub struct StreamDefinition {
    pub kind: StreamKind,
    schema: Vec<(String, FieldType)>,
}

impl StreamDefinition {
    pub fn new(kind: StreamKind, config: &ExtractConfig) -> Self {
        Self {
            kind,
            schema: build_schema(kind, config),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn path(&self) -> &'static str {
        self.kind.path()
    }

    pub fn primary_key(&self) -> &'static [&'static str] {
        self.kind.primary_key()
    }

    pub fn replication_key(&self) -> &'static str {
        self.kind.replication_key()
    }

    pub fn is_sorted(&self) -> bool {
        self.kind.is_sorted()
    }

    /// Ordered (field name, type) pairs.
    pub fn schema(&self) -> &[(String, FieldType)] {
        &self.schema
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.schema.iter().map(|(name, _)| name.as_str())
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.schema
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }
}

fn push_field(fields: &mut Vec<(String, FieldType)>, name: &str, ty: FieldType) {
    if !fields.iter().any(|(n, _)| n == name) {
        fields.push((name.to_string(), ty));
    }
}

fn push_variables(fields: &mut Vec<(String, FieldType)>, vars: &[String]) {
    for var in vars {
        push_field(fields, var, variable_field_type(var));
    }
}

fn build_schema(kind: StreamKind, config: &ExtractConfig) -> Vec<(String, FieldType)> {
    let mut fields = Vec::new();
    push_field(&mut fields, "location_name", FieldType::String);
    push_field(&mut fields, "latitude", FieldType::Number);
    push_field(&mut fields, "longitude", FieldType::Number);

    match kind {
        StreamKind::Forecast => {
            push_field(&mut fields, "elevation", FieldType::Number);
            push_field(&mut fields, "timezone", FieldType::String);
            push_field(&mut fields, "timezone_abbreviation", FieldType::String);
            push_field(&mut fields, "utc_offset_seconds", FieldType::Integer);
            push_field(&mut fields, "generationtime_ms", FieldType::Number);
            push_field(&mut fields, "generated_at", FieldType::DateTime);
            push_field(&mut fields, "forecast_days", FieldType::Integer);
            push_field(&mut fields, "past_days", FieldType::Integer);
            push_field(&mut fields, "hourly_variables", FieldType::StringList);
            push_field(&mut fields, "daily_variables", FieldType::StringList);
        }
        StreamKind::Hourly => {
            push_field(&mut fields, "time", FieldType::DateTime);
            push_field(&mut fields, "time_unix", FieldType::Integer);
            push_variables(&mut fields, &config.hourly_variables);
        }
        StreamKind::Daily => {
            push_field(&mut fields, "date", FieldType::Date);
            push_variables(&mut fields, &config.daily_variables);
        }
        StreamKind::Current => {
            push_field(&mut fields, "time", FieldType::DateTime);
            push_field(&mut fields, "interval", FieldType::Integer);
            push_variables(&mut fields, &config.current_variables);
        }
        StreamKind::Minutely15 => {
            push_field(&mut fields, "time", FieldType::DateTime);
            push_variables(&mut fields, &config.minutely_15_variables);
        }
        StreamKind::Historical => {
            push_field(&mut fields, "time", FieldType::DateTime);
            push_field(&mut fields, "date", FieldType::Date);
            push_variables(&mut fields, &config.hourly_variables);
        }
    }

    fields
}

/// Names of every stream the connector can serve.
pub fn list_available() -> Vec<&'static str> {
    StreamKind::ALL.iter().map(|k| k.name()).collect()
}

/// Build definitions for the configured stream selection.
///
/// Unknown names are skipped with a warning, never an error.
pub fn instantiate(config: &ExtractConfig) -> Vec<StreamDefinition> {
    let mut out = Vec::new();
    for name in &config.streams_to_sync {
        match StreamKind::from_name(name) {
            Some(kind) => out.push(StreamDefinition::new(kind, config)),
            None => warn!("unknown stream requested: {name}"),
        }
    }
    out
}
