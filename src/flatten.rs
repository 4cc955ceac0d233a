use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::config::{ExtractConfig, Location};
use crate::state::parse_replication_value;
use crate::streams::{FieldType, StreamDefinition, StreamKind, variable_field_type};

/// One flat output row. The field set always equals the stream's schema field
/// set, regardless of what the response contained.
pub type Record = serde_json::Map<String, Value>;

/// Flatten one JSON response into records for the given stream and location.
///
/// Missing or empty time arrays yield zero records; short variable arrays
/// null-fill. Records come out in the upstream's own chronological order,
/// never re-sorted.
pub fn flatten_response(
    def: &StreamDefinition,
    config: &ExtractConfig,
    location: &Location,
    data: &Value,
) -> Vec<Record> {
    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    flatten_response_at(def, config, location, data, &generated_at)
}

pub(crate) fn flatten_response_at(
    def: &StreamDefinition,
    config: &ExtractConfig,
    location: &Location,
    data: &Value,
    generated_at: &str,
) -> Vec<Record> {
    match def.kind {
        StreamKind::Forecast => metadata_record(config, location, data, generated_at),
        StreamKind::Current => current_record(config, location, data),
        StreamKind::Hourly | StreamKind::Daily | StreamKind::Minutely15 | StreamKind::Historical => {
            flatten_block(def.kind, config, location, data)
        }
    }
}

fn base_record(location: &Location, data: &Value) -> Record {
    let mut record = Record::new();
    record.insert("location_name".into(), Value::from(location.name.as_str()));
    record.insert("latitude".into(), number_or_null(data.get("latitude")));
    record.insert("longitude".into(), number_or_null(data.get("longitude")));
    record
}

fn flatten_block(
    kind: StreamKind,
    config: &ExtractConfig,
    location: &Location,
    data: &Value,
) -> Vec<Record> {
    let (block_key, vars) = match kind {
        StreamKind::Hourly | StreamKind::Historical => ("hourly", &config.hourly_variables),
        StreamKind::Daily => ("daily", &config.daily_variables),
        StreamKind::Minutely15 => ("minutely_15", &config.minutely_15_variables),
        _ => return Vec::new(),
    };

    let Some(block) = data.get(block_key).and_then(Value::as_object) else {
        return Vec::new();
    };
    let Some(times) = block.get("time").and_then(Value::as_array) else {
        return Vec::new();
    };
    if times.is_empty() {
        return Vec::new();
    }

    let base = base_record(location, data);
    let mut records = Vec::with_capacity(times.len());

    for (i, time_val) in times.iter().enumerate() {
        let mut record = base.clone();

        match kind {
            StreamKind::Hourly => {
                let (iso, unix) = normalize_time(time_val);
                record.insert("time".into(), iso);
                record.insert("time_unix".into(), unix);
            }
            StreamKind::Daily => {
                record.insert("date".into(), date_string(time_val));
            }
            StreamKind::Minutely15 => {
                let (iso, _) = normalize_time(time_val);
                record.insert("time".into(), iso);
            }
            StreamKind::Historical => {
                let (iso, _) = normalize_time(time_val);
                record.insert("date".into(), date_string(&iso));
                record.insert("time".into(), iso);
            }
            _ => {}
        }

        for var in vars {
            if record.contains_key(var) {
                continue;
            }
            let value = block
                .get(var)
                .and_then(Value::as_array)
                .and_then(|values| values.get(i))
                .map(|v| coerce_value(v, variable_field_type(var)))
                .unwrap_or(Value::Null);
            record.insert(var.clone(), value);
        }

        records.push(record);
    }

    records
}

fn current_record(config: &ExtractConfig, location: &Location, data: &Value) -> Vec<Record> {
    let Some(current) = data.get("current").and_then(Value::as_object) else {
        return Vec::new();
    };
    if current.is_empty() {
        return Vec::new();
    }

    let mut record = base_record(location, data);
    record.insert(
        "time".into(),
        current
            .get("time")
            .map(|v| coerce_value(v, FieldType::DateTime))
            .unwrap_or(Value::Null),
    );
    record.insert(
        "interval".into(),
        current
            .get("interval")
            .and_then(Value::as_i64)
            .map(Value::from)
            .unwrap_or(Value::Null),
    );

    for var in &config.current_variables {
        if record.contains_key(var) {
            continue;
        }
        let value = current
            .get(var)
            .map(|v| coerce_value(v, variable_field_type(var)))
            .unwrap_or(Value::Null);
        record.insert(var.clone(), value);
    }

    vec![record]
}

fn metadata_record(
    config: &ExtractConfig,
    location: &Location,
    data: &Value,
    generated_at: &str,
) -> Vec<Record> {
    let mut record = base_record(location, data);
    record.insert("elevation".into(), number_or_null(data.get("elevation")));
    record.insert("timezone".into(), string_or_null(data.get("timezone")));
    record.insert(
        "timezone_abbreviation".into(),
        string_or_null(data.get("timezone_abbreviation")),
    );
    record.insert(
        "utc_offset_seconds".into(),
        data.get("utc_offset_seconds")
            .and_then(Value::as_i64)
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    record.insert(
        "generationtime_ms".into(),
        number_or_null(data.get("generationtime_ms")),
    );
    // Stamped from the wall clock, not an upstream value.
    record.insert("generated_at".into(), Value::from(generated_at));
    // Snapshot of the request configuration, for audit.
    record.insert("forecast_days".into(), Value::from(config.forecast_days));
    record.insert("past_days".into(), Value::from(config.past_days));
    record.insert(
        "hourly_variables".into(),
        Value::from(config.hourly_variables.clone()),
    );
    record.insert(
        "daily_variables".into(),
        Value::from(config.daily_variables.clone()),
    );

    vec![record]
}

/// ISO string and unix seconds for a time value, whichever representation the
/// upstream returned. Downstream consumers get both.
fn normalize_time(v: &Value) -> (Value, Value) {
    if let Some(s) = v.as_str() {
        let unix = parse_replication_value(s).map(|dt| dt.and_utc().timestamp());
        (Value::from(s), unix.map(Value::from).unwrap_or(Value::Null))
    } else if let Some(n) = v.as_i64() {
        (
            unix_to_iso(n).map(Value::from).unwrap_or(Value::Null),
            Value::from(n),
        )
    } else {
        (Value::Null, Value::Null)
    }
}

/// Plain date, truncating a timestamp at its date/time separator.
fn date_string(v: &Value) -> Value {
    if let Some(s) = v.as_str() {
        let date = s.split('T').next().unwrap_or(s);
        Value::from(date)
    } else if let Some(n) = v.as_i64() {
        DateTime::<Utc>::from_timestamp(n, 0)
            .map(|dt| Value::from(dt.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}

fn unix_to_iso(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339())
}

fn coerce_value(v: &Value, ty: FieldType) -> Value {
    if v.is_null() {
        return Value::Null;
    }
    match ty {
        FieldType::Integer => v
            .as_i64()
            .map(Value::from)
            .or_else(|| v.as_f64().map(|f| Value::from(f as i64)))
            .unwrap_or(Value::Null),
        FieldType::Number => v.as_f64().map(Value::from).unwrap_or(Value::Null),
        FieldType::DateTime | FieldType::Date | FieldType::String => {
            if let Some(s) = v.as_str() {
                Value::from(s)
            } else if let Some(n) = v.as_i64() {
                unix_to_iso(n).map(Value::from).unwrap_or(Value::Null)
            } else {
                Value::Null
            }
        }
        FieldType::StringList => v.clone(),
    }
}

fn number_or_null(v: Option<&Value>) -> Value {
    v.and_then(Value::as_f64).map(Value::from).unwrap_or(Value::Null)
}

fn string_or_null(v: Option<&Value>) -> Value {
    v.and_then(Value::as_str).map(Value::from).unwrap_or(Value::Null)
}
