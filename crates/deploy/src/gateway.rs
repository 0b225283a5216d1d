//! The ledger seam.
//!
//! [`LedgerGateway`] is the only surface through which the orchestrator
//! touches a network: balance reads, cost estimation, transaction submission,
//! confirmation waits and view calls. The production implementation lives in
//! [`crate::rpc`]; tests drive the orchestrator against scripted in-memory
//! gateways.

use alloy_core::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a gateway implementation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The node could not be reached or the transport failed.
    #[error("network error: {0}")]
    Network(String),
    /// The node answered with an RPC-level error.
    #[error("rpc error: {0}")]
    Rpc(String),
    /// The transaction was mined but reverted.
    #[error("transaction {tx_hash} reverted on the ledger")]
    Reverted { tx_hash: B256 },
    /// The transaction has no receipt yet.
    #[error("transaction {0} is not yet confirmed")]
    NotConfirmed(B256),
    /// No receipt appeared within the configured window. The run must be
    /// restarted; persisted state makes the restart resume, not repeat.
    #[error("timed out after {timeout_secs}s waiting for confirmation of {tx_hash}")]
    ConfirmTimeout { tx_hash: B256, timeout_secs: u64 },
    /// The node serves a different chain than the configuration claims.
    #[error("chain id mismatch: configuration says {expected}, node reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },
}

/// A transaction to submit: a creation when `to` is empty, a call otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Option<Address>,
    pub data: Bytes,
    /// Explicit resource limit. When unset the node estimates on submission.
    pub gas_limit: Option<u64>,
}

impl TxRequest {
    /// A contract-creation transaction.
    pub fn creation(data: Bytes) -> Self {
        Self {
            to: None,
            data,
            gas_limit: None,
        }
    }

    /// A call against a deployed contract.
    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to: Some(to),
            data,
            gas_limit: None,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// The outcome of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Address of the created contract, for creation transactions.
    pub contract_address: Option<Address>,
    pub block_number: u64,
    pub gas_used: u64,
}

/// Ledger operations the orchestrator depends on.
///
/// Submissions from one account are serialized by the ledger's per-account
/// sequence numbering, so callers never submit concurrently; read-only
/// operations carry no such restriction.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Chain the gateway is connected to.
    fn chain_id(&self) -> u64;

    /// The externally-managed account submissions are signed with.
    fn sender(&self) -> Address;

    /// Native balance of an account.
    async fn balance(&self, account: Address) -> Result<U256, GatewayError>;

    /// Estimated resource cost of a transaction, without submitting it.
    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, GatewayError>;

    /// Sign and submit a transaction, returning its handle.
    async fn submit(&self, tx: &TxRequest) -> Result<B256, GatewayError>;

    /// Block until the ledger reports the transaction final, or time out.
    async fn confirm(&self, tx_hash: B256) -> Result<Confirmation, GatewayError>;

    /// Execute a read-only call against a deployed contract.
    async fn read_view(&self, target: Address, call: Bytes) -> Result<Bytes, GatewayError>;
}
