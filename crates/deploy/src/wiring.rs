//! Post-deployment wiring.
//!
//! Once every creation has confirmed, the wiring pass establishes the
//! cross-contract references and permissions: registering the NFT and the
//! verification contract with the factory, granting the organizer role,
//! registering the trusted signer. Each action carries a read-back probe, so
//! re-running a whole pass never resubmits configuration that already took
//! effect, and one failed action never blocks its siblings.

use alloy_core::primitives::{Address, B256};
use thiserror::Error;

use crate::artifact::{
    IdempotencyProbe, ResolveContext, UnresolvedArtifact, WiringAction, encode_call,
};
use crate::gateway::{GatewayError, LedgerGateway, TxRequest};
use crate::state::{StateError, StateRecorder};

/// Per-action wiring failure. Never fatal to the run; surfaced through the
/// report instead.
#[derive(Debug, Error)]
pub enum WiringError {
    #[error("wiring target {0} is not deployed on this network")]
    TargetNotDeployed(String),

    #[error(transparent)]
    Unresolved(#[from] UnresolvedArtifact),

    #[error("configuration call failed")]
    Call(#[from] GatewayError),
}

/// Final status of one wiring action within a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WiringOutcome {
    /// Recorded as applied by an earlier run; nothing was submitted.
    PreviouslyApplied,
    /// The on-ledger probe showed the effect already in place; recorded as
    /// applied without a submission.
    AlreadySatisfied,
    /// A configuration call was submitted and confirmed.
    Applied { tx_hash: B256 },
    /// The action did not take effect; the reason is kept for the report.
    Failed { reason: String },
}

impl WiringOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, WiringOutcome::Failed { .. })
    }
}

impl std::fmt::Display for WiringOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WiringOutcome::PreviouslyApplied => write!(f, "applied (previous run)"),
            WiringOutcome::AlreadySatisfied => write!(f, "applied (already on ledger)"),
            WiringOutcome::Applied { tx_hash } => write!(f, "applied (tx {tx_hash})"),
            WiringOutcome::Failed { reason } => write!(f, "unresolved: {reason}"),
        }
    }
}

/// One line of the wiring report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub action: String,
    pub target: String,
    pub outcome: WiringOutcome,
}

/// Every action's final status, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WiringReport {
    pub actions: Vec<ActionReport>,
}

impl WiringReport {
    /// Actions that did not take effect this pass.
    pub fn unresolved(&self) -> impl Iterator<Item = &ActionReport> {
        self.actions
            .iter()
            .filter(|report| !report.outcome.is_applied())
    }

    /// Whether every action is applied.
    pub fn is_complete(&self) -> bool {
        self.actions.iter().all(|report| report.outcome.is_applied())
    }
}

/// Run every wiring action in order, continuing past per-action failures.
///
/// Only a state-persistence failure aborts the pass: without its record the
/// idempotency guarantees are gone.
pub async fn apply_wiring(
    actions: &[&WiringAction],
    recorder: &mut StateRecorder,
    gateway: &dyn LedgerGateway,
) -> Result<WiringReport, StateError> {
    let mut report = WiringReport::default();

    for action in actions {
        let outcome = if recorder.state().is_wiring_applied(&action.name) {
            tracing::debug!(action = %action.name, "Wiring already recorded, skipping");
            WiringOutcome::PreviouslyApplied
        } else {
            match apply_action(action, recorder, gateway).await {
                Ok(outcome) => {
                    recorder.record_wiring_applied(&action.name)?;
                    outcome
                }
                Err(err) => {
                    let reason = failure_reason(&err);
                    tracing::warn!(
                        action = %action.name,
                        target = %action.target,
                        reason = %reason,
                        "Wiring action unresolved, continuing with remaining actions"
                    );
                    WiringOutcome::Failed { reason }
                }
            }
        };

        report.actions.push(ActionReport {
            action: action.name.clone(),
            target: action.target.clone(),
            outcome,
        });
    }

    Ok(report)
}

async fn apply_action(
    action: &WiringAction,
    recorder: &StateRecorder,
    gateway: &dyn LedgerGateway,
) -> Result<WiringOutcome, WiringError> {
    let addresses = recorder.state().deployed_addresses();
    let target = *addresses
        .get(&action.target)
        .ok_or_else(|| WiringError::TargetNotDeployed(action.target.clone()))?;

    let ctx = ResolveContext {
        deployer: gateway.sender(),
        addresses: &addresses,
    };

    if let Some(probe) = &action.probe {
        match probe_satisfied(probe, target, &ctx, gateway).await {
            Ok(true) => {
                tracing::info!(
                    action = %action.name,
                    target = %action.target,
                    "Wiring already in effect on the ledger, skipping submission"
                );
                return Ok(WiringOutcome::AlreadySatisfied);
            }
            Ok(false) => {}
            // The call itself is safely repeatable, so an inconclusive probe
            // falls through to submission.
            Err(err) => {
                tracing::warn!(
                    action = %action.name,
                    error = %err,
                    "Idempotency probe inconclusive, submitting the call"
                );
            }
        }
    }

    let args = ctx.resolve_all(&action.args)?;
    let tx = TxRequest::call(target, encode_call(&action.signature, &args));

    let tx_hash = gateway.submit(&tx).await?;
    tracing::info!(
        action = %action.name,
        target = %action.target,
        tx_hash = %tx_hash,
        "Wiring call submitted, waiting for confirmation..."
    );
    gateway.confirm(tx_hash).await?;

    tracing::info!(action = %action.name, target = %action.target, "Wiring applied");
    Ok(WiringOutcome::Applied { tx_hash })
}

async fn probe_satisfied(
    probe: &IdempotencyProbe,
    target: Address,
    ctx: &ResolveContext<'_>,
    gateway: &dyn LedgerGateway,
) -> Result<bool, WiringError> {
    let args = ctx.resolve_all(&probe.args)?;
    let expected = ctx.resolve(&probe.expected)?;
    let returned = gateway
        .read_view(target, encode_call(&probe.signature, &args))
        .await?;

    Ok(returned.len() >= 32 && returned[..32] == expected.encode_word())
}

/// Flatten an error and its sources into a single report line.
fn failure_reason(err: &WiringError) -> String {
    let mut reason = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        reason.push_str(": ");
        reason.push_str(&inner.to_string());
        source = inner.source();
    }
    reason
}
