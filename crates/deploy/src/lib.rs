//! tokon-deploy - Deployment orchestration library for the TOKON contracts.
//!
//! This crate deploys the TOKON contract suite in dependency order, wires
//! the cross-contract permissions once every creation has confirmed, records
//! per-network progress so interrupted runs resume instead of redeploying,
//! and exports interface descriptors for downstream consumers.

mod artifact;
pub use artifact::{
    ArgResolver, ArgValue, ArtifactSpec, ArtifactStore, ContractArtifact, IdempotencyProbe,
    ResolveContext, UnresolvedArtifact, WiringAction, encode_call, encode_creation, selector,
    tokon_artifacts,
};

mod config;
pub use config::{
    ExportConfig, NetworkConfig, OrchestratorConfig, TOKON_CONFIG_FILENAME, format_units, to_wei,
};

mod deployer;
pub use deployer::{DeployError, deploy_artifact, run_creations};

mod export;
pub use export::{
    DeploymentManifest, DestinationReport, ExportError, ExportReport, InterfaceDescriptor,
    ManifestEntry, build_manifest, export,
};

mod gateway;
pub use gateway::{Confirmation, GatewayError, LedgerGateway, TxRequest};

mod planner;
pub use planner::{CycleError, plan, wiring_sequence};

mod report;
pub use report::{ArtifactLine, RunStatus, RunSummary, artifact_table, wiring_table};

pub mod rpc;
pub use rpc::HttpGateway;

mod state;
pub use state::{
    ArtifactStatus, DeploymentRecord, DeploymentState, StateError, StateRecorder, WiringStatus,
};

mod wiring;
pub use wiring::{ActionReport, WiringError, WiringOutcome, WiringReport, apply_wiring};
