//! Interface-descriptor export.
//!
//! After a run, every deployed artifact's interface and address are
//! republished for downstream consumers: one descriptor file per artifact
//! plus a combined manifest, copied into each configured destination
//! directory. Destinations are independent; a failure to write one is
//! reported and does not block the others.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::artifact::ArtifactStore;
use crate::config::NetworkConfig;
use crate::state::DeploymentState;

/// Per-destination export failure.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create destination directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("descriptor serialization failed")]
    Serialize(#[from] serde_json::Error),
    #[error("no interface loaded for deployed artifact {0}")]
    MissingInterface(String),
}

/// The exported shape of one deployed artifact.
#[derive(Debug, Serialize)]
pub struct InterfaceDescriptor<'a> {
    pub contract_name: &'a str,
    pub network: &'a str,
    pub chain_id: u64,
    pub address: Address,
    pub abi: &'a serde_json::Value,
}

/// One artifact's entry in the combined manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub address: Address,
    pub tx_hash: B256,
    pub gas_used: u64,
    pub block_number: u64,
}

/// The combined manifest: network identity plus every deployed address.
#[derive(Debug, Serialize)]
pub struct DeploymentManifest {
    pub network: String,
    pub chain_id: u64,
    pub deployer: Address,
    pub rpc_url: String,
    pub currency: String,
    pub exported_at: DateTime<Utc>,
    pub contracts: BTreeMap<String, ManifestEntry>,
}

/// Result of writing one destination: number of files written, or why not.
#[derive(Debug)]
pub struct DestinationReport {
    pub destination: PathBuf,
    pub result: Result<usize, ExportError>,
}

/// Per-destination outcomes for one export pass.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub destinations: Vec<DestinationReport>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.destinations.iter().all(|d| d.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &DestinationReport> {
        self.destinations.iter().filter(|d| d.result.is_err())
    }
}

/// Export every deployed artifact's descriptor plus the combined manifest to
/// each destination.
pub fn export(
    state: &DeploymentState,
    store: &ArtifactStore,
    network: &NetworkConfig,
    destinations: &[PathBuf],
) -> ExportReport {
    let manifest = build_manifest(state, network);
    let mut report = ExportReport::default();

    for destination in destinations {
        let result = export_to(state, store, &manifest, destination);
        match &result {
            Ok(written) => tracing::info!(
                destination = %destination.display(),
                files = written,
                "Descriptors exported"
            ),
            Err(err) => tracing::warn!(
                destination = %destination.display(),
                error = %err,
                "Export destination failed, continuing with remaining destinations"
            ),
        }
        report.destinations.push(DestinationReport {
            destination: destination.clone(),
            result,
        });
    }

    report
}

/// Build the combined manifest from deployed records.
pub fn build_manifest(state: &DeploymentState, network: &NetworkConfig) -> DeploymentManifest {
    let contracts = state
        .artifacts
        .keys()
        .filter_map(|name| {
            state.deployed_record(name).map(|record| {
                (
                    name.clone(),
                    ManifestEntry {
                        address: record.address,
                        tx_hash: record.tx_hash,
                        gas_used: record.gas_used,
                        block_number: record.block_number,
                    },
                )
            })
        })
        .collect();

    DeploymentManifest {
        network: state.network.clone(),
        chain_id: state.chain_id,
        deployer: network.deployer,
        rpc_url: network.rpc_url.to_string(),
        currency: network.currency.clone(),
        exported_at: Utc::now(),
        contracts,
    }
}

fn export_to(
    state: &DeploymentState,
    store: &ArtifactStore,
    manifest: &DeploymentManifest,
    destination: &Path,
) -> Result<usize, ExportError> {
    std::fs::create_dir_all(destination).map_err(|source| ExportError::CreateDir {
        path: destination.to_path_buf(),
        source,
    })?;

    let mut written = 0;
    for (name, entry) in &manifest.contracts {
        let artifact = store
            .get(name)
            .ok_or_else(|| ExportError::MissingInterface(name.clone()))?;
        let descriptor = InterfaceDescriptor {
            contract_name: name,
            network: &state.network,
            chain_id: state.chain_id,
            address: entry.address,
            abi: &artifact.abi,
        };
        write_json(&destination.join(format!("{name}.json")), &descriptor)?;
        written += 1;
    }

    write_json(&destination.join("manifest.json"), manifest)?;
    written += 1;

    Ok(written)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ExportError> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ContractArtifact;
    use crate::state::{ArtifactStatus, DeploymentRecord};
    use tempdir::TempDir;
    use url::Url;

    fn network() -> NetworkConfig {
        NetworkConfig {
            chain_id: 50312,
            rpc_url: Url::parse("https://dream-rpc.somnia.network").unwrap(),
            deployer: Address::repeat_byte(0x01),
            currency: "STT".to_string(),
            min_balance: 0.1,
            gas_margin_percent: 10,
            confirm_timeout_secs: 120,
            explorer_url: None,
        }
    }

    fn deployed_state() -> DeploymentState {
        let mut state = DeploymentState::new("somnia-testnet", 50312);
        state.artifacts.insert(
            "EventFactory".to_string(),
            ArtifactStatus::Deployed(DeploymentRecord {
                network: "somnia-testnet".to_string(),
                artifact: "EventFactory".to_string(),
                address: Address::repeat_byte(0xaa),
                tx_hash: B256::repeat_byte(0x01),
                gas_used: 2_000_000,
                block_number: 7,
                deployed_at: Utc::now(),
            }),
        );
        state.artifacts.insert(
            "BoundaryNFT".to_string(),
            ArtifactStatus::Failed {
                reason: "confirmation timed out".to_string(),
            },
        );
        state
    }

    fn store() -> ArtifactStore {
        ArtifactStore::from_artifacts([ContractArtifact {
            contract_name: "EventFactory".to_string(),
            abi: serde_json::json!([{"type": "function", "name": "boundaryNFT"}]),
            bytecode: "0x6080".to_string(),
        }])
    }

    #[test]
    fn test_export_writes_descriptor_and_manifest() {
        let dir = TempDir::new("tokon-export").unwrap();
        let destination = dir.path().join("abis");

        let report = export(&deployed_state(), &store(), &network(), &[destination.clone()]);
        assert!(report.is_complete());

        let descriptor: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(destination.join("EventFactory.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(descriptor["contract_name"], "EventFactory");
        assert_eq!(descriptor["chain_id"], 50312);
        assert!(descriptor["abi"].is_array());

        let manifest: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(destination.join("manifest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest["network"], "somnia-testnet");
        assert_eq!(manifest["currency"], "STT");
        // Only deployed artifacts appear; the failed one is absent.
        assert!(manifest["contracts"]["EventFactory"].is_object());
        assert!(manifest["contracts"]["BoundaryNFT"].is_null());
    }

    #[test]
    fn test_failed_destination_does_not_block_others() {
        let dir = TempDir::new("tokon-export").unwrap();
        let good = dir.path().join("abis");
        // A regular file where a directory is needed makes this destination
        // unwritable.
        let bad = dir.path().join("blocked");
        std::fs::write(&bad, "not a directory").unwrap();

        let report = export(
            &deployed_state(),
            &store(),
            &network(),
            &[bad.clone(), good.clone()],
        );

        assert!(!report.is_complete());
        assert_eq!(report.failures().count(), 1);
        assert!(good.join("manifest.json").exists());
    }

    #[test]
    fn test_manifest_only_when_nothing_deployed() {
        let dir = TempDir::new("tokon-export").unwrap();
        let destination = dir.path().join("abis");
        let state = DeploymentState::new("localhost", 31337);

        let report = export(&state, &store(), &network(), &[destination.clone()]);
        assert!(report.is_complete());
        assert!(destination.join("manifest.json").exists());
        assert!(!destination.join("EventFactory.json").exists());
    }
}
