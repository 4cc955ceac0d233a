#![forbid(unsafe_code)]

//! Incremental extraction client for the Open-Meteo weather API.
//!
//! The crate maps a declarative configuration (locations, variables, units,
//! time windows) into upstream GET requests, tracks per-(stream, location)
//! replication checkpoints across runs, and flattens the nested time-series
//! responses into flat, schema-stable records ready for a downstream store.
//!
//! Six logical streams are exposed, each with its own endpoint, keys, and
//! configuration-shaped schema: forecast metadata, hourly, daily, current
//! conditions, 15-minutely, and historical archive data.
//!
//! **Quick start**
//! ```no_run
//! use openmeteo_extract::{
//!     Extractor, ExtractConfig, MemoryStateStore, OpenMeteoClient, VecSink,
//! };
//!
//! let config = ExtractConfig::from_json_str(
//!     r#"{
//!         "locations": [{"name": "Rome", "latitude": 41.9, "longitude": 12.5}],
//!         "streams_to_sync": ["weather_hourly", "weather_daily"]
//!     }"#,
//! )?;
//!
//! let client = OpenMeteoClient::new(&config)?;
//! let extractor = Extractor::new(config)?;
//!
//! let mut sink = VecSink::new();
//! let mut state = MemoryStateStore::new();
//! let report = extractor.sync_all(&client, &mut sink, &mut state)?;
//! println!("{} records emitted", report.records_emitted());
//! # Ok::<(), openmeteo_extract::Error>(())
//! ```
//!
//! On the next run the same state store makes the windowed streams request
//! only data past their stored checkpoint. Persist checkpoints between
//! processes with [`JsonStateStore`], or implement [`StateStore`] against
//! your own state backend; likewise implement [`RecordSink`] to hand records
//! to a real consumer.

mod client;
mod config;
mod error;
mod flatten;
mod params;
mod state;
mod streams;
mod sync;

pub use crate::client::{Fetch, OpenMeteoClient};
pub use crate::config::{
    CellSelection, ErrorPolicy, ExtractConfig, Location, PrecipitationUnit, TemperatureUnit,
    TimeFormat, WindSpeedUnit,
};
pub use crate::error::{Error, Result};
pub use crate::flatten::{Record, flatten_response};
pub use crate::params::{ParamValue, QueryParams, build_params};
pub use crate::state::{
    JsonStateStore, MemoryStateStore, StateStore, parse_replication_value,
};
pub use crate::streams::{
    FieldType, StreamDefinition, StreamKind, instantiate, list_available, variable_field_type,
};
pub use crate::sync::{
    Extractor, Phase, RecordSink, SyncReport, SyncUnit, UnitOutcome, UnitReport, VecSink,
};
