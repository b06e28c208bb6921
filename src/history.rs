use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Service name QR analyses are recorded under
pub const QUISHING_SERVICE: &str = "quishing";

/// Receiver of finished analyses. Recording is fire-and-forget: failures
/// stay inside the sink.
pub trait HistorySink: Send + Sync {
    fn record(&self, service: &str, input_label: &str, serialized_result: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub service: String,
    pub input: String,
    pub result: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(service: &str, input: &str, result: &str) -> Self {
        Self {
            service: service.to_string(),
            input: input.to_string(),
            result: result.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Keeps records in process memory
#[derive(Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl HistorySink for MemoryHistory {
    fn record(&self, service: &str, input_label: &str, serialized_result: &str) {
        match self.records.lock() {
            Ok(mut records) => {
                records.push(HistoryRecord::new(service, input_label, serialized_result))
            }
            Err(e) => log::warn!("History lock poisoned, dropping record: {e}"),
        }
    }
}

/// Append-only file with one JSON record per line
pub struct JsonLinesHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &HistoryRecord) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("history writer lock poisoned"))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history file: {}", self.path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Every parseable record in file order; malformed lines are skipped
    pub fn read_all(&self) -> Result<Vec<HistoryRecord>> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open history file: {}", self.path.display()))?;

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping malformed history line {}: {e}", index + 1),
            }
        }
        Ok(records)
    }
}

impl HistorySink for JsonLinesHistory {
    fn record(&self, service: &str, input_label: &str, serialized_result: &str) {
        let record = HistoryRecord::new(service, input_label, serialized_result);
        if let Err(e) = self.append(&record) {
            log::warn!("Failed to record {service} history for {input_label}: {e:#}");
        }
    }
}

/// Aggregate figures over recorded QR analyses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuishingStats {
    pub qr_scans: u64,
    pub quishing_detected: u64,
    pub redirect_traversals: u64,
}

impl QuishingStats {
    /// Tally serialized verdicts. Rows that are not JSON still count as scans.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a str>) -> Self {
        let mut stats = QuishingStats::default();

        for result in results {
            stats.qr_scans += 1;
            let parsed: serde_json::Value = serde_json::from_str(result).unwrap_or_default();

            let risk = parsed
                .get("risk_level")
                .and_then(|v| v.as_str())
                .or_else(|| {
                    parsed
                        .get("result")
                        .and_then(|nested| nested.get("risk_level"))
                        .and_then(|v| v.as_str())
                });
            if let Some(risk) = risk {
                if !risk.is_empty() && risk != crate::risk::LOW && risk != crate::risk::UNKNOWN {
                    stats.quishing_detected += 1;
                }
            }

            stats.redirect_traversals += parsed
                .get("redirect_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
        }

        stats
    }

    /// Tally the quishing records among mixed-service history
    pub fn from_records(records: &[HistoryRecord]) -> Self {
        Self::from_results(
            records
                .iter()
                .filter(|r| r.service == QUISHING_SERVICE)
                .map(|r| r.result.as_str()),
        )
    }
}
