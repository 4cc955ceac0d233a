use log::{debug, warn};
use serde_json::Value;

use crate::client::Fetch;
use crate::config::{ErrorPolicy, ExtractConfig, Location};
use crate::error::{Error, Result};
use crate::flatten::{Record, flatten_response};
use crate::params::build_params;
use crate::state::StateStore;
use crate::streams::{self, StreamDefinition};

/// Where emitted records go. Implementations own serialization and framing;
/// the run loop only guarantees emission order and checkpoint-after-emission.
pub trait RecordSink {
    fn emit(&mut self, stream: &str, record: &Record) -> Result<()>;
}

/// Sink that collects records in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub records: Vec<(String, Record)>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for VecSink {
    fn emit(&mut self, stream: &str, record: &Record) -> Result<()> {
        self.records.push((stream.to_string(), record.clone()));
        Ok(())
    }
}

/// One (stream, location) unit of work.
#[derive(Debug, Clone, Copy)]
pub struct SyncUnit<'a> {
    pub stream: &'a StreamDefinition,
    pub location: &'a Location,
}

/// Phase in which a unit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Requesting,
    Parsing,
    Emitting,
    Checkpointing,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Requesting => "requesting",
            Phase::Parsing => "parsing",
            Phase::Emitting => "emitting",
            Phase::Checkpointing => "checkpointing",
        }
    }
}

#[derive(Debug)]
pub enum UnitOutcome {
    Done,
    Failed { phase: Phase, message: String },
}

#[derive(Debug)]
pub struct UnitReport {
    pub stream: String,
    pub location: String,
    pub records: usize,
    pub outcome: UnitOutcome,
}

impl UnitReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Failed { .. })
    }
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub units: Vec<UnitReport>,
}

impl SyncReport {
    pub fn records_emitted(&self) -> usize {
        self.units.iter().map(|u| u.records).sum()
    }

    pub fn failed_units(&self) -> usize {
        self.units.iter().filter(|u| u.is_failed()).count()
    }
}

/// The extraction engine: instantiated streams fanned out over locations.
#[derive(Debug)]
pub struct Extractor {
    config: ExtractConfig,
    streams: Vec<StreamDefinition>,
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> Result<Self> {
        config.validate()?;
        let streams = streams::instantiate(&config);
        Ok(Self { config, streams })
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn streams(&self) -> &[StreamDefinition] {
        &self.streams
    }

    /// Every (stream, location) unit for this run: N locations x M selected
    /// streams, each independent of the others.
    pub fn plan(&self) -> Vec<SyncUnit<'_>> {
        let mut units = Vec::with_capacity(self.streams.len() * self.config.locations.len());
        for stream in &self.streams {
            for location in &self.config.locations {
                units.push(SyncUnit { stream, location });
            }
        }
        units
    }

    /// Run every planned unit: fetch, flatten, emit, advance checkpoint.
    ///
    /// Under `ErrorPolicy::Abort` the first failed unit stops the run and is
    /// returned as an error; under `Continue` all units are attempted and
    /// failures appear in the report.
    pub fn sync_all(
        &self,
        fetch: &impl Fetch,
        sink: &mut impl RecordSink,
        state: &mut impl StateStore,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for unit in self.plan() {
            let unit_report = self.run_unit(&unit, fetch, sink, state);

            if let UnitOutcome::Failed { phase, message } = &unit_report.outcome {
                warn!(
                    "unit failed: stream={} location={} phase={} error={}",
                    unit_report.stream,
                    unit_report.location,
                    phase.as_str(),
                    message
                );
                if self.config.error_policy == ErrorPolicy::Abort {
                    return Err(Error::SyncUnit {
                        stream: unit_report.stream,
                        location: unit_report.location,
                        phase: phase.as_str(),
                        message: message.clone(),
                    });
                }
            }

            report.units.push(unit_report);
        }

        Ok(report)
    }

    fn run_unit(
        &self,
        unit: &SyncUnit<'_>,
        fetch: &impl Fetch,
        sink: &mut impl RecordSink,
        state: &mut impl StateStore,
    ) -> UnitReport {
        let stream_name = unit.stream.name();
        let location_name = unit.location.name.as_str();

        let failed = |phase: Phase, records: usize, message: String| UnitReport {
            stream: stream_name.to_string(),
            location: location_name.to_string(),
            records,
            outcome: UnitOutcome::Failed { phase, message },
        };

        let checkpoint = state.get(stream_name, location_name);
        let params = build_params(
            unit.stream.kind,
            &self.config,
            unit.location,
            checkpoint.as_deref(),
        );

        let body = match fetch.fetch(unit.stream.kind, &params) {
            Ok(body) => body,
            Err(e) => return failed(Phase::Requesting, 0, e.to_string()),
        };

        // A body that is not valid JSON is a hard error for this unit.
        let data: Value = match serde_json::from_str(&body) {
            Ok(data) => data,
            Err(e) => return failed(Phase::Parsing, 0, e.to_string()),
        };

        let records = flatten_response(unit.stream, &self.config, unit.location, &data);
        debug!(
            "flattened {} records for stream={stream_name} location={location_name}",
            records.len()
        );

        let mut emitted = 0;
        for record in &records {
            if let Err(e) = sink.emit(stream_name, record) {
                return failed(Phase::Emitting, emitted, e.to_string());
            }
            emitted += 1;
        }

        // Checkpoint only after every record was emitted; a failure above
        // leaves the stored value untouched.
        if let Some(value) = propose_checkpoint(unit.stream, &records) {
            if let Err(e) = state.set(stream_name, location_name, &value) {
                return failed(Phase::Checkpointing, emitted, e.to_string());
            }
        }

        UnitReport {
            stream: stream_name.to_string(),
            location: location_name.to_string(),
            records: emitted,
            outcome: UnitOutcome::Done,
        }
    }
}

/// The proposed new checkpoint: the last record's replication-key value.
/// Streams emit non-decreasing by replication key, so the last value is the
/// maximum seen in this response.
fn propose_checkpoint(stream: &StreamDefinition, records: &[Record]) -> Option<String> {
    let key = stream.replication_key();
    records
        .last()?
        .get(key)?
        .as_str()
        .map(str::to_string)
}
