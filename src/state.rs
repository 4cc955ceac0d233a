use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::Result;

/// Parse a stored replication value.
///
/// Accepts `YYYY-MM-DDTHH:MM`, with optional seconds/fractions, RFC3339 with
/// a `Z` or numeric offset, and bare `YYYY-MM-DD` dates. Returns `None` for
/// anything else; a malformed checkpoint is treated as no checkpoint, never
/// as an error.
pub fn parse_replication_value(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Per-(stream, location) replication checkpoints.
///
/// The run loop reads a checkpoint before building a request and writes the
/// updated value only after every record from the response was emitted.
pub trait StateStore {
    fn get(&self, stream: &str, location: &str) -> Option<String>;
    fn set(&mut self, stream: &str, location: &str, value: &str) -> Result<()>;
}

fn state_key(stream: &str, location: &str) -> String {
    format!("{stream}/{location}")
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, stream: &str, location: &str) -> Option<String> {
        self.entries.get(&state_key(stream, location)).cloned()
    }

    fn set(&mut self, stream: &str, location: &str, value: &str) -> Result<()> {
        self.entries.insert(state_key(stream, location), value.to_string());
        Ok(())
    }
}

/// Checkpoints persisted as a flat JSON object keyed `"{stream}/{location}"`.
///
/// The file is rewritten on every set so that a crash between units leaves
/// only fully-emitted checkpoints behind.
#[derive(Debug)]
pub struct JsonStateStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let body = std::fs::read_to_string(&path)?;
            if body.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&body)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    fn persist(&self) -> Result<()> {
        let body = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, body)?;
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn get(&self, stream: &str, location: &str) -> Option<String> {
        self.entries.get(&state_key(stream, location)).cloned()
    }

    fn set(&mut self, stream: &str, location: &str, value: &str) -> Result<()> {
        self.entries.insert(state_key(stream, location), value.to_string());
        self.persist()
    }
}
