//! Append-only JSONL record of every probe trial.
//!
//! One file per day, model and probe kind:
//!
//! ```text
//! log_dir/
//!   2026-03-14/
//!     openai_gpt-4o-mini_context_window.jsonl
//!     openai_gpt-4o-mini_max_output.jsonl
//! ```
//!
//! Each line is a [`TrialLogEntry`]. Attach a [`TrialLogHandler`] to a probe
//! to fill the log as the search runs.

use crate::data::NeedlePosition;
use crate::error::ProbeError;
use crate::events::{EventHandler, ProbeKind, ProbeScope, SearchEvent, SearchPhase};
use crate::search::{EvidenceSource, ProbeOutcome};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

/// One trial, as written to the log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrialLogEntry {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub probe: ProbeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needle_position: Option<NeedlePosition>,
    pub phase: SearchPhase,
    /// 1-based trial number within the phase.
    pub trial: u32,
    pub candidate: u32,
    pub succeeded: bool,
    pub evidence_source: EvidenceSource,
    pub estimated_tokens: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_text: String,
}

impl TrialLogEntry {
    pub fn from_trial(
        scope: &ProbeScope,
        phase: SearchPhase,
        trial: u32,
        outcome: &ProbeOutcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            model: scope.model.clone(),
            probe: scope.kind,
            needle_position: scope.needle,
            phase,
            trial,
            candidate: outcome.candidate_value,
            succeeded: outcome.succeeded,
            evidence_source: outcome.evidence_source,
            estimated_tokens: outcome.estimated_tokens,
            error_text: outcome.error_text.clone(),
        }
    }
}

/// Writes [`TrialLogEntry`] lines under a log directory.
#[derive(Debug)]
pub struct TrialLogger {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl TrialLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log file for a model and probe kind on a given day.
    pub fn path_for(&self, model: &str, kind: ProbeKind, date: NaiveDate) -> PathBuf {
        self.dir
            .join(date.format("%Y-%m-%d").to_string())
            .join(format!("{}_{kind}.jsonl", file_safe(model)))
    }

    /// Append one entry, creating directories as needed. Returns the file
    /// written to.
    pub fn append(&self, entry: &TrialLogEntry) -> Result<PathBuf, ProbeError> {
        let path = self.path_for(&entry.model, entry.probe, entry.timestamp.date_naive());
        let mut line = serde_json::to_string(entry)
            .map_err(|e| ProbeError::TrialLog(std::io::Error::other(e)))?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ProbeError::TrialLog)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(ProbeError::TrialLog)?;
        file.write_all(line.as_bytes())
            .map_err(ProbeError::TrialLog)?;
        Ok(path)
    }

    /// Read every entry back from a log file. Malformed lines are skipped.
    pub fn read(path: &Path) -> Result<Vec<TrialLogEntry>, ProbeError> {
        let text = std::fs::read_to_string(path).map_err(ProbeError::TrialLog)?;
        Ok(text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("skipping malformed trial log line in {}: {e}", path.display());
                    None
                }
            })
            .collect())
    }
}

/// Model names contain `/` and `:`; keep file names flat.
fn file_safe(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Event handler that appends every trial to a [`TrialLogger`].
///
/// Write failures never interrupt a search: the first one is logged at
/// `warn`, later ones at `debug`, and all are counted.
pub struct TrialLogHandler {
    logger: TrialLogger,
    failures: AtomicU32,
}

impl TrialLogHandler {
    pub fn new(logger: TrialLogger) -> Self {
        Self {
            logger,
            failures: AtomicU32::new(0),
        }
    }

    pub fn logger(&self) -> &TrialLogger {
        &self.logger
    }

    /// Entries that could not be written.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl EventHandler for TrialLogHandler {
    fn on_event(&self, scope: &ProbeScope, event: &SearchEvent<'_>) {
        let SearchEvent::Trial {
            phase,
            trial,
            outcome,
            ..
        } = event
        else {
            return;
        };
        let entry = TrialLogEntry::from_trial(scope, *phase, *trial, outcome);
        if let Err(e) = self.logger.append(&entry) {
            if self.failures.fetch_add(1, Ordering::Relaxed) == 0 {
                warn!("{e}; further trial log failures are logged at debug");
            } else {
                debug!("{e}");
            }
        }
    }
}
