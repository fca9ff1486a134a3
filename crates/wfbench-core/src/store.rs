//! Outcome Store and the serialized Outcome Set.

use crate::model::{Outcome, OutcomeKey, ValidationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const OUTCOMES_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("outcome for {0} was already written")]
    DuplicateKey(OutcomeKey),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid outcome file {}: {message}", path.display())]
    Format { path: PathBuf, message: String },
}

/// Run-scoped, write-once-per-key store. Only the engine's run loop writes to it.
#[derive(Debug, Default)]
pub struct OutcomeStore {
    outcomes: BTreeMap<OutcomeKey, Outcome>,
    next_sequence: u64,
}

impl OutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the terminal outcome for a key, stamping its sequence.
    pub fn record(&mut self, mut outcome: Outcome) -> Result<u64, StoreError> {
        if self.outcomes.contains_key(&outcome.key) {
            return Err(StoreError::DuplicateKey(outcome.key));
        }
        self.next_sequence += 1;
        outcome.sequence = self.next_sequence;
        self.outcomes.insert(outcome.key.clone(), outcome);
        Ok(self.next_sequence)
    }

    pub fn contains(&self, key: &OutcomeKey) -> bool {
        self.outcomes.contains_key(key)
    }

    pub fn get(&self, key: &OutcomeKey) -> Option<&Outcome> {
        self.outcomes.get(key)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Outcomes in key order.
    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.outcomes.into_values().collect()
    }
}

/// Immutable snapshot of a run, as handed to aggregation and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSet {
    pub schema_version: u32,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub judge_model: String,
    pub candidates: Vec<String>,
    /// True when the run stopped scheduling early; unscheduled pairs are absent.
    #[serde(default)]
    pub cancelled: bool,
    pub outcomes: Vec<Outcome>,
}

impl OutcomeSet {
    pub fn get(&self, key: &OutcomeKey) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }

    /// Outcomes a resumed run may carry forward unchanged.
    pub fn resumable(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes
            .iter()
            .filter(|o| o.verdict.status() == ValidationStatus::Valid)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| StoreError::Format {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let set: Self = serde_json::from_str(&raw).map_err(|e| StoreError::Format {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if set.schema_version != OUTCOMES_SCHEMA_VERSION {
            return Err(StoreError::Format {
                path: path.to_path_buf(),
                message: format!(
                    "unsupported schema_version {} (expected {})",
                    set.schema_version, OUTCOMES_SCHEMA_VERSION
                ),
            });
        }
        Ok(set)
    }
}
