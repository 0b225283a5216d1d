//! Persisted per-network deployment state.
//!
//! The [`StateRecorder`] owns the state document for one network: every
//! transition the deployer or wiring engine makes goes through it and is
//! written to disk before the caller learns of success. Saves are atomic
//! (write to a temp file, then rename) and an exclusive file lock keeps the
//! document single-writer for the lifetime of a run.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or persisting deployment state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read deployment state from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("deployment state file {path} is malformed")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to persist deployment state to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("another orchestration run holds the state lock for network {network}")]
    Locked { network: String },
    #[error(
        "state for network {network} was recorded on chain {recorded}, \
         but the configuration now says chain {configured}"
    )]
    ChainMismatch {
        network: String,
        recorded: u64,
        configured: u64,
    },
}

/// One successfully created artifact. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub network: String,
    pub artifact: String,
    pub address: Address,
    pub tx_hash: B256,
    pub gas_used: u64,
    pub block_number: u64,
    pub deployed_at: DateTime<Utc>,
}

/// Lifecycle of one artifact on one network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    NotStarted,
    /// A creation was about to be submitted when this was persisted. Seeing
    /// it on resume means the previous run died mid-submission.
    Pending,
    Deployed(DeploymentRecord),
    Failed { reason: String },
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactStatus::NotStarted => write!(f, "not started"),
            ArtifactStatus::Pending => write!(f, "pending"),
            ArtifactStatus::Deployed(record) => write!(f, "deployed at {}", record.address),
            ArtifactStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Lifecycle of one wiring action on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WiringStatus {
    NotApplied,
    Applied,
}

/// The full per-network record, serialized as one JSON document.
///
/// Artifact names absent from the maps read as `NotStarted`, so a state file
/// written by an older registry stays loadable when new artifacts appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub network: String,
    pub chain_id: u64,
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactStatus>,
    #[serde(default)]
    pub wiring: BTreeMap<String, WiringStatus>,
}

impl DeploymentState {
    pub fn new(network: impl Into<String>, chain_id: u64) -> Self {
        Self {
            network: network.into(),
            chain_id,
            artifacts: BTreeMap::new(),
            wiring: BTreeMap::new(),
        }
    }

    /// Status of an artifact, defaulting to `NotStarted` for unknown names.
    pub fn artifact_status(&self, name: &str) -> ArtifactStatus {
        self.artifacts
            .get(name)
            .cloned()
            .unwrap_or(ArtifactStatus::NotStarted)
    }

    /// The deployment record for an artifact, if it is deployed.
    pub fn deployed_record(&self, name: &str) -> Option<&DeploymentRecord> {
        match self.artifacts.get(name) {
            Some(ArtifactStatus::Deployed(record)) => Some(record),
            _ => None,
        }
    }

    /// Addresses of every deployed artifact, for argument resolution.
    pub fn deployed_addresses(&self) -> BTreeMap<String, Address> {
        self.artifacts
            .iter()
            .filter_map(|(name, status)| match status {
                ArtifactStatus::Deployed(record) => Some((name.clone(), record.address)),
                _ => None,
            })
            .collect()
    }

    pub fn is_wiring_applied(&self, action: &str) -> bool {
        self.wiring.get(action) == Some(&WiringStatus::Applied)
    }
}

/// Exclusive owner of one network's persisted state.
#[derive(Debug)]
pub struct StateRecorder {
    state_path: PathBuf,
    state: DeploymentState,
    // Held for the lifetime of the recorder; released on drop.
    _lock: std::fs::File,
}

impl StateRecorder {
    /// Open (or create) the state document for a network, taking the
    /// exclusive per-network lock.
    pub fn open(state_dir: &Path, network: &str, chain_id: u64) -> Result<Self, StateError> {
        std::fs::create_dir_all(state_dir).map_err(|source| StateError::Write {
            path: state_dir.to_path_buf(),
            source,
        })?;

        let lock = acquire_lock(state_dir, network)?;
        let state_path = state_file_path(state_dir, network);

        let state = match read_state(&state_path)? {
            Some(existing) => {
                if existing.chain_id != chain_id {
                    return Err(StateError::ChainMismatch {
                        network: network.to_string(),
                        recorded: existing.chain_id,
                        configured: chain_id,
                    });
                }
                tracing::info!(
                    network,
                    deployed = existing.deployed_addresses().len(),
                    "Loaded existing deployment state"
                );
                existing
            }
            None => {
                tracing::info!(network, chain_id, "Starting fresh deployment state");
                DeploymentState::new(network, chain_id)
            }
        };

        Ok(Self {
            state_path,
            state,
            _lock: lock,
        })
    }

    /// Read a network's state without taking the lock. For inspection only.
    pub fn peek(state_dir: &Path, network: &str) -> Result<Option<DeploymentState>, StateError> {
        read_state(&state_file_path(state_dir, network))
    }

    /// Delete a network's persisted state. Never happens implicitly; a fresh
    /// deployment requires the operator to ask for this.
    ///
    /// Returns whether a state document existed.
    pub fn reset(state_dir: &Path, network: &str) -> Result<bool, StateError> {
        if !state_dir.exists() {
            return Ok(false);
        }

        let _lock = acquire_lock(state_dir, network)?;
        let state_path = state_file_path(state_dir, network);
        if !state_path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(&state_path).map_err(|source| StateError::Write {
            path: state_path.clone(),
            source,
        })?;
        tracing::warn!(network, path = %state_path.display(), "Deployment state reset");
        Ok(true)
    }

    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    /// Mark an artifact as about to be submitted.
    pub fn record_pending(&mut self, artifact: &str) -> Result<(), StateError> {
        self.state
            .artifacts
            .insert(artifact.to_string(), ArtifactStatus::Pending);
        self.save()
    }

    /// Record a confirmed creation.
    pub fn record_deployed(&mut self, record: DeploymentRecord) -> Result<(), StateError> {
        self.state
            .artifacts
            .insert(record.artifact.clone(), ArtifactStatus::Deployed(record));
        self.save()
    }

    /// Record a failed creation attempt.
    pub fn record_failed(&mut self, artifact: &str, reason: String) -> Result<(), StateError> {
        self.state
            .artifacts
            .insert(artifact.to_string(), ArtifactStatus::Failed { reason });
        self.save()
    }

    /// Record a wiring action as applied.
    pub fn record_wiring_applied(&mut self, action: &str) -> Result<(), StateError> {
        self.state
            .wiring
            .insert(action.to_string(), WiringStatus::Applied);
        self.save()
    }

    /// Persist the current state atomically: the document is never
    /// observable half-written.
    fn save(&self) -> Result<(), StateError> {
        let content = serde_json::to_string_pretty(&self.state).map_err(|source| {
            StateError::Malformed {
                path: self.state_path.clone(),
                source,
            }
        })?;

        let tmp_path = self.state_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(|source| StateError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &self.state_path).map_err(|source| StateError::Write {
            path: self.state_path.clone(),
            source,
        })?;
        Ok(())
    }
}

fn state_file_path(state_dir: &Path, network: &str) -> PathBuf {
    state_dir.join(format!("{network}.json"))
}

fn acquire_lock(state_dir: &Path, network: &str) -> Result<std::fs::File, StateError> {
    let lock_path = state_dir.join(format!("{network}.lock"));
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|source| StateError::Write {
            path: lock_path.clone(),
            source,
        })?;

    lock.try_lock_exclusive().map_err(|_| StateError::Locked {
        network: network.to_string(),
    })?;
    Ok(lock)
}

fn read_state(path: &Path) -> Result<Option<DeploymentState>, StateError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StateError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let state = serde_json::from_str(&content).map_err(|source| StateError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(state))
}
