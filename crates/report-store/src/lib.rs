//! Flat-file JSON persistence for scan reports.
//!
//! Each report is written twice: under the generic `latest` key and under a
//! sanitized per-target key, so both "most recent scan" and "last scan of
//! this host" reads stay a single file open.

use anyhow::{Context, Result};
use netscan_core::models::Report;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

pub const LATEST_KEY: &str = "latest";

/// One JSON document per key under a data directory.
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ReportStore { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Persist `report` under both the latest key and its target key.
    pub fn save(&self, report: &Report) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating report directory {}", self.dir.display()))?;
        self.write(LATEST_KEY, report)?;
        self.write(&storage_key(&report.target), report)?;
        tracing::debug!(target_host = %report.target, dir = %self.dir.display(), "report persisted");
        Ok(())
    }

    fn write(&self, key: &str, report: &Report) -> Result<()> {
        let path = self.path_for(key);
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, report)?;
        writer.flush()?;
        Ok(())
    }

    /// Load a saved report, normalized to the current schema. `None` if the
    /// key has never been written.
    pub fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let value: Value = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(normalize_report(value)))
    }

    pub fn load_latest(&self) -> Result<Option<Value>> {
        self.load(LATEST_KEY)
    }

    pub fn load_target(&self, target: &str) -> Result<Option<Value>> {
        self.load(&storage_key(target))
    }
}

/// Make a target usable as a file-name key: path separators, whitespace, and
/// anything else unsafe become underscores.
pub fn storage_key(target: &str) -> String {
    target
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Bring any saved payload into the current report schema.
///
/// Current-schema values pass through untouched (normalization is
/// idempotent). Legacy payloads that only carry a flat vulnerability list
/// are wrapped with an empty service map and the original body preserved
/// under `raw`.
pub fn normalize_report(value: Value) -> Value {
    match &value {
        Value::Object(map)
            if map.contains_key("discovered_services") || map.contains_key("open_ports") =>
        {
            value
        }
        Value::Object(map) => {
            let target = map
                .get("target")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            json!({ "target": target, "discovered_services": {}, "raw": value })
        }
        _ => json!({ "target": "unknown", "discovered_services": {}, "raw": value }),
    }
}
