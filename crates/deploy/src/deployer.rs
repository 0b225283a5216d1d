//! Artifact creation.
//!
//! One artifact at a time, in plan order: skip what is already deployed,
//! resolve constructor arguments from recorded addresses, check the balance
//! floor, estimate the creation cost with a safety margin, then submit and
//! confirm. Every state transition is persisted before the caller sees it,
//! which is what makes a rerun after partial failure resume instead of
//! redeploy.

use alloy_core::primitives::{Address, U256};
use chrono::Utc;
use thiserror::Error;

use crate::artifact::{ArtifactSpec, ArtifactStore, ResolveContext, UnresolvedArtifact, encode_creation};
use crate::config::{NetworkConfig, format_units};
use crate::gateway::{GatewayError, LedgerGateway, TxRequest};
use crate::state::{ArtifactStatus, DeploymentRecord, StateError, StateRecorder};

/// Errors from artifact creation.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The account cannot cover the configured balance floor. Recoverable by
    /// funding the account; never retried automatically.
    #[error(
        "insufficient funds on {account}: {} available, {} required; fund the account and rerun",
        format_units(*.balance, .currency),
        format_units(*.minimum, .currency)
    )]
    InsufficientFunds {
        account: Address,
        balance: U256,
        minimum: U256,
        currency: String,
    },

    /// A referenced artifact is not deployed even though the plan put it
    /// first. Fatal: the plan and the state disagree.
    #[error("artifact {artifact} references {dependency}, which is not deployed on this network")]
    MissingDependency {
        artifact: String,
        dependency: String,
    },

    /// No pre-built artifact file was loaded for this spec.
    #[error("no pre-built contract artifact for {artifact}")]
    MissingArtifact { artifact: String },

    #[error("artifact binary for {artifact} could not be decoded: {reason}")]
    BadArtifact { artifact: String, reason: String },

    /// The creation confirmed without a contract address in the receipt.
    #[error("creation of {artifact} confirmed but the receipt carries no contract address")]
    NoAddress { artifact: String },

    /// Submission or confirmation failed. The artifact is marked `Failed`
    /// in persisted state and the rerun decision is left to the operator.
    #[error("creation of {artifact} failed")]
    Creation {
        artifact: String,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Deploy a single artifact, returning its record.
///
/// Already-deployed artifacts return their existing record without touching
/// the network.
pub async fn deploy_artifact(
    spec: &ArtifactSpec,
    store: &ArtifactStore,
    recorder: &mut StateRecorder,
    gateway: &dyn LedgerGateway,
    network: &NetworkConfig,
) -> Result<DeploymentRecord, DeployError> {
    if let Some(record) = recorder.state().deployed_record(&spec.name) {
        tracing::info!(
            artifact = %spec.name,
            address = %record.address,
            "Artifact already deployed, skipping"
        );
        return Ok(record.clone());
    }

    if recorder.state().artifact_status(&spec.name) == ArtifactStatus::Pending {
        tracing::warn!(
            artifact = %spec.name,
            "Previous run was interrupted mid-submission, attempting the creation again"
        );
    }

    // The planner puts every referenced artifact first; seeing one missing
    // here means the plan and the persisted state disagree, and continuing
    // would create the contract with garbage arguments.
    let addresses = recorder.state().deployed_addresses();
    for dependency in spec.dependencies() {
        if !addresses.contains_key(dependency) {
            return Err(DeployError::MissingDependency {
                artifact: spec.name.clone(),
                dependency: dependency.to_string(),
            });
        }
    }

    let ctx = ResolveContext {
        deployer: gateway.sender(),
        addresses: &addresses,
    };
    let args = ctx.resolve_all(&spec.constructor_args).map_err(
        |UnresolvedArtifact(dependency)| DeployError::MissingDependency {
            artifact: spec.name.clone(),
            dependency,
        },
    )?;

    let balance = gateway
        .balance(gateway.sender())
        .await
        .map_err(|source| DeployError::Creation {
            artifact: spec.name.clone(),
            source,
        })?;
    let minimum = network.min_balance_wei();
    if balance < minimum {
        return Err(DeployError::InsufficientFunds {
            account: gateway.sender(),
            balance,
            minimum,
            currency: network.currency.clone(),
        });
    }

    let contract = store
        .get(&spec.name)
        .ok_or_else(|| DeployError::MissingArtifact {
            artifact: spec.name.clone(),
        })?;
    let bytecode = contract
        .creation_bytecode()
        .map_err(|err| DeployError::BadArtifact {
            artifact: spec.name.clone(),
            reason: err.to_string(),
        })?;

    let tx = TxRequest::creation(encode_creation(&bytecode, &args));
    let estimate = gateway
        .estimate_gas(&tx)
        .await
        .map_err(|source| DeployError::Creation {
            artifact: spec.name.clone(),
            source,
        })?;
    let gas_limit = network.buffered_gas_limit(estimate);

    tracing::info!(
        artifact = %spec.name,
        estimate,
        gas_limit,
        "Deploying artifact..."
    );

    // Persisted before submission so a crash mid-flight is visible on resume.
    recorder.record_pending(&spec.name)?;

    let tx = tx.with_gas_limit(gas_limit);
    let tx_hash = match gateway.submit(&tx).await {
        Ok(tx_hash) => tx_hash,
        Err(source) => return Err(creation_failure(recorder, &spec.name, source)?),
    };

    tracing::info!(
        artifact = %spec.name,
        tx_hash = %tx_hash,
        "Creation submitted, waiting for confirmation..."
    );

    let confirmation = match gateway.confirm(tx_hash).await {
        Ok(confirmation) => confirmation,
        Err(source) => return Err(creation_failure(recorder, &spec.name, source)?),
    };

    let Some(address) = confirmation.contract_address else {
        recorder.record_failed(&spec.name, "receipt carried no contract address".to_string())?;
        return Err(DeployError::NoAddress {
            artifact: spec.name.clone(),
        });
    };

    let record = DeploymentRecord {
        network: recorder.state().network.clone(),
        artifact: spec.name.clone(),
        address,
        tx_hash,
        gas_used: confirmation.gas_used,
        block_number: confirmation.block_number,
        deployed_at: Utc::now(),
    };
    recorder.record_deployed(record.clone())?;

    tracing::info!(
        artifact = %spec.name,
        address = %address,
        block = confirmation.block_number,
        gas_used = confirmation.gas_used,
        "Artifact deployed"
    );
    if let Some(url) = network.explorer_address_url(address) {
        tracing::info!(artifact = %spec.name, explorer = %url, "View on explorer");
    }

    Ok(record)
}

/// Deploy every planned artifact in order.
///
/// Stops at the first failure, since later artifacts may depend on the
/// failed one; everything deployed before the failure stays recorded.
pub async fn run_creations(
    planned: &[&ArtifactSpec],
    store: &ArtifactStore,
    recorder: &mut StateRecorder,
    gateway: &dyn LedgerGateway,
    network: &NetworkConfig,
) -> Result<Vec<DeploymentRecord>, DeployError> {
    let mut records = Vec::with_capacity(planned.len());
    for spec in planned {
        records.push(deploy_artifact(spec, store, recorder, gateway, network).await?);
    }
    Ok(records)
}

/// Persist the failure, then hand back the deploy error. A persistence
/// failure takes precedence: the run cannot continue without its record.
fn creation_failure(
    recorder: &mut StateRecorder,
    artifact: &str,
    source: GatewayError,
) -> Result<DeployError, StateError> {
    recorder.record_failed(artifact, source.to_string())?;
    Ok(DeployError::Creation {
        artifact: artifact.to_string(),
        source,
    })
}
