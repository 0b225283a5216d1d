//! JSON-RPC plumbing and the production [`LedgerGateway`].
//!
//! [`HttpGateway`] talks to an Ethereum-compatible node over HTTP. Signing
//! stays on the node side: submissions go through `eth_sendTransaction` from
//! the configured deployer account, so the orchestrator never holds key
//! material.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::NetworkConfig;
use crate::gateway::{Confirmation, GatewayError, LedgerGateway, TxRequest};

/// Timeout for a single RPC request.
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between receipt polls while waiting for confirmation.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(RPC_TIMEOUT)
        .build()
        .map_err(|e| GatewayError::Network(format!("failed to create HTTP client: {e}")))
}

/// Make a JSON-RPC call and deserialize the result.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, GatewayError> {
    let response = client
        .post(url)
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| GatewayError::Network(format!("failed to send {method} request: {e}")))?;

    let result: Value = response
        .json()
        .await
        .map_err(|e| GatewayError::Network(format!("failed to parse {method} response: {e}")))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        return Err(GatewayError::Rpc(format!("{method}: {message}")));
    }

    let result_value = result
        .get("result")
        .ok_or_else(|| GatewayError::Rpc(format!("{method}: no result in response")))?
        .clone();

    serde_json::from_value(result_value)
        .map_err(|e| GatewayError::Rpc(format!("failed to deserialize {method} result: {e}")))
}

/// Parse a 0x-prefixed hex quantity into a u64.
pub fn parse_hex_u64(value: &str) -> Result<u64, GatewayError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| GatewayError::Rpc(format!("malformed hex quantity {value}: {e}")))
}

/// Parse a 0x-prefixed hex quantity into a U256.
pub fn parse_hex_u256(value: &str) -> Result<U256, GatewayError> {
    U256::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| GatewayError::Rpc(format!("malformed hex quantity {value}: {e}")))
}

/// Transaction receipt fields the orchestrator cares about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    status: Option<String>,
    contract_address: Option<Address>,
    block_number: String,
    gas_used: String,
}

/// [`LedgerGateway`] over Ethereum JSON-RPC.
pub struct HttpGateway {
    client: reqwest::Client,
    url: String,
    chain_id: u64,
    sender: Address,
    confirm_timeout: Duration,
}

impl HttpGateway {
    /// Connect to the network's RPC endpoint and verify it serves the chain
    /// the configuration claims.
    pub async fn connect(network: &NetworkConfig) -> Result<Self, GatewayError> {
        let gateway = Self {
            client: create_client()?,
            url: network.rpc_url.to_string(),
            chain_id: network.chain_id,
            sender: network.deployer,
            confirm_timeout: Duration::from_secs(network.confirm_timeout_secs),
        };

        let reported: String =
            json_rpc_call(&gateway.client, &gateway.url, "eth_chainId", vec![]).await?;
        let actual = parse_hex_u64(&reported)?;
        if actual != network.chain_id {
            return Err(GatewayError::ChainIdMismatch {
                expected: network.chain_id,
                actual,
            });
        }

        tracing::debug!(url = %gateway.url, chain_id = actual, "Connected to RPC endpoint");
        Ok(gateway)
    }

    /// Build the parameter object for `eth_sendTransaction` / `eth_estimateGas`.
    fn tx_params(&self, tx: &TxRequest) -> Value {
        let mut params = serde_json::Map::new();
        params.insert("from".to_string(), json!(self.sender.to_string()));
        if let Some(to) = tx.to {
            params.insert("to".to_string(), json!(to.to_string()));
        }
        params.insert("data".to_string(), json!(tx.data.to_string()));
        if let Some(gas) = tx.gas_limit {
            params.insert("gas".to_string(), json!(format!("{gas:#x}")));
        }
        Value::Object(params)
    }

    async fn try_receipt(&self, tx_hash: B256) -> Result<RpcReceipt, GatewayError> {
        let receipt: Option<RpcReceipt> = json_rpc_call(
            &self.client,
            &self.url,
            "eth_getTransactionReceipt",
            vec![json!(tx_hash.to_string())],
        )
        .await?;

        receipt.ok_or(GatewayError::NotConfirmed(tx_hash))
    }

    fn confirmation_from_receipt(
        tx_hash: B256,
        receipt: RpcReceipt,
    ) -> Result<Confirmation, GatewayError> {
        if receipt.status.as_deref() == Some("0x0") {
            return Err(GatewayError::Reverted { tx_hash });
        }

        Ok(Confirmation {
            contract_address: receipt.contract_address,
            block_number: parse_hex_u64(&receipt.block_number)?,
            gas_used: parse_hex_u64(&receipt.gas_used)?,
        })
    }
}

#[async_trait]
impl LedgerGateway for HttpGateway {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn balance(&self, account: Address) -> Result<U256, GatewayError> {
        let result: String = json_rpc_call(
            &self.client,
            &self.url,
            "eth_getBalance",
            vec![json!(account.to_string()), json!("latest")],
        )
        .await?;
        parse_hex_u256(&result)
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, GatewayError> {
        let result: String = json_rpc_call(
            &self.client,
            &self.url,
            "eth_estimateGas",
            vec![self.tx_params(tx)],
        )
        .await?;
        parse_hex_u64(&result)
    }

    async fn submit(&self, tx: &TxRequest) -> Result<B256, GatewayError> {
        let result: String = json_rpc_call(
            &self.client,
            &self.url,
            "eth_sendTransaction",
            vec![self.tx_params(tx)],
        )
        .await?;
        result
            .parse::<B256>()
            .map_err(|e| GatewayError::Rpc(format!("malformed transaction hash {result}: {e}")))
    }

    async fn confirm(&self, tx_hash: B256) -> Result<Confirmation, GatewayError> {
        let poll_secs = RECEIPT_POLL_INTERVAL.as_secs().max(1);
        let max_polls = (self.confirm_timeout.as_secs() / poll_secs).max(1) as usize;

        let outcome = (|| async { self.try_receipt(tx_hash).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(RECEIPT_POLL_INTERVAL)
                    .with_max_times(max_polls),
            )
            .when(|err| matches!(err, GatewayError::NotConfirmed(_)))
            .await;

        match outcome {
            Ok(receipt) => Self::confirmation_from_receipt(tx_hash, receipt),
            Err(GatewayError::NotConfirmed(_)) => Err(GatewayError::ConfirmTimeout {
                tx_hash,
                timeout_secs: self.confirm_timeout.as_secs(),
            }),
            Err(err) => Err(err),
        }
    }

    async fn read_view(&self, target: Address, call: Bytes) -> Result<Bytes, GatewayError> {
        let result: String = json_rpc_call(
            &self.client,
            &self.url,
            "eth_call",
            vec![
                json!({
                    "to": target.to_string(),
                    "data": call.to_string(),
                }),
                json!("latest"),
            ],
        )
        .await?;
        result
            .parse::<Bytes>()
            .map_err(|e| GatewayError::Rpc(format!("malformed eth_call result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u64("0x2a").unwrap(), 42);
        assert_eq!(parse_hex_u64("0xc369").unwrap(), 50025);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn test_parse_hex_u256() {
        assert_eq!(
            parse_hex_u256("0xde0b6b3a7640000").unwrap(),
            U256::from(1_000_000_000_000_000_000u128)
        );
        assert!(parse_hex_u256("not-hex").is_err());
    }

    #[test]
    fn test_receipt_to_confirmation() {
        let receipt = RpcReceipt {
            status: Some("0x1".to_string()),
            contract_address: Some(Address::repeat_byte(0x42)),
            block_number: "0x10".to_string(),
            gas_used: "0x5208".to_string(),
        };

        let confirmation =
            HttpGateway::confirmation_from_receipt(B256::repeat_byte(1), receipt).unwrap();
        assert_eq!(
            confirmation.contract_address,
            Some(Address::repeat_byte(0x42))
        );
        assert_eq!(confirmation.block_number, 16);
        assert_eq!(confirmation.gas_used, 21000);
    }

    #[test]
    fn test_reverted_receipt_is_an_error() {
        let receipt = RpcReceipt {
            status: Some("0x0".to_string()),
            contract_address: None,
            block_number: "0x10".to_string(),
            gas_used: "0x5208".to_string(),
        };

        let err =
            HttpGateway::confirmation_from_receipt(B256::repeat_byte(1), receipt).unwrap_err();
        assert!(matches!(err, GatewayError::Reverted { .. }));
    }

    #[test]
    fn test_tx_params_shape() {
        let gateway = HttpGateway {
            client: reqwest::Client::new(),
            url: "http://localhost:8545".to_string(),
            chain_id: 31337,
            sender: Address::repeat_byte(0x01),
            confirm_timeout: Duration::from_secs(120),
        };

        let creation = gateway.tx_params(&TxRequest::creation(Bytes::from(vec![0x60, 0x80])));
        assert!(creation.get("to").is_none());
        assert_eq!(creation["data"], "0x6080");

        let call = gateway.tx_params(
            &TxRequest::call(Address::repeat_byte(0x02), Bytes::from(vec![0xab]))
                .with_gas_limit(100_000),
        );
        assert!(call.get("to").is_some());
        assert_eq!(call["gas"], "0x186a0");
    }
}
