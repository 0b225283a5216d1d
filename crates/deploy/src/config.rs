//! Orchestrator configuration.
//!
//! One `Tokon.toml` describes every network the contract suite can be
//! deployed to, plus where pre-built artifacts, per-network deployment state
//! and exported descriptors live. The active network is selected at run time;
//! no artifact-level logic depends on which one it is.

use std::collections::BTreeMap;
use std::path::PathBuf;

use alloy_core::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// The default name for the orchestrator configuration file.
pub const TOKON_CONFIG_FILENAME: &str = "Tokon.toml";

/// Wei per whole unit of the native currency.
const WEI_PER_UNIT: u128 = 1_000_000_000_000_000_000;

/// Top-level configuration, serialized to/from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Directory holding the pre-built contract artifacts
    /// (`<dir>/<Name>.sol/<Name>.json`).
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    /// Directory holding one deployment-state document per network.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub export: ExportConfig,

    /// Deployable networks, keyed by name.
    pub networks: BTreeMap<String, NetworkConfig>,
}

/// Where interface descriptors are republished after a successful run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Consumer-facing output directories. Each receives a full copy.
    #[serde(default)]
    pub destinations: Vec<PathBuf>,
}

/// Connection and fee parameters for one network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_url: Url,
    /// Account transactions are submitted from. The node holds the key.
    pub deployer: Address,

    /// Native currency symbol, used in balances and funding hints.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Minimum balance (in whole currency units) required before any
    /// creation is attempted.
    #[serde(default = "default_min_balance")]
    pub min_balance: f64,

    /// Fractional buffer applied on top of gas estimates.
    #[serde(default = "default_gas_margin_percent")]
    pub gas_margin_percent: u64,

    /// How long to wait for a submitted transaction to confirm.
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// Block-explorer base URL, used for links in run summaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<Url>,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts/src")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("deployments")
}

fn default_currency() -> String {
    "ETH".to_string()
}

fn default_min_balance() -> f64 {
    0.1
}

fn default_gas_margin_percent() -> u64 {
    10
}

fn default_confirm_timeout_secs() -> u64 {
    120
}

impl OrchestratorConfig {
    /// Load the configuration from a TOML file, or from `Tokon.toml` inside
    /// a directory.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(TOKON_CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::debug!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Look up a network by name.
    pub fn network(&self, name: &str) -> Result<&NetworkConfig> {
        self.networks.get(name).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown network '{}'. Configured networks: {}",
                name,
                self.networks
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
    }
}

impl NetworkConfig {
    /// The configured balance floor, in wei.
    pub fn min_balance_wei(&self) -> U256 {
        to_wei(self.min_balance)
    }

    /// Apply the configured safety margin to a gas estimate.
    pub fn buffered_gas_limit(&self, estimate: u64) -> u64 {
        estimate.saturating_add(estimate.saturating_mul(self.gas_margin_percent) / 100)
    }

    /// Explorer link for an address, when an explorer is configured.
    pub fn explorer_address_url(&self, address: Address) -> Option<String> {
        self.explorer_url.as_ref().map(|base| {
            format!("{}/address/{}", base.as_str().trim_end_matches('/'), address)
        })
    }
}

/// Convert a whole-unit amount to wei.
///
/// Rounds to gwei precision (9 decimal places) to avoid floating-point
/// noise, then scales to wei. Gwei precision is more than sufficient for a
/// balance floor.
pub fn to_wei(amount: f64) -> U256 {
    let gwei = (amount * 1e9).round() as u128;
    U256::from(gwei * 1_000_000_000u128)
}

/// Render a wei amount as a whole-unit decimal string with its currency
/// symbol, e.g. `0.25 STT`.
pub fn format_units(wei: U256, currency: &str) -> String {
    let unit = U256::from(WEI_PER_UNIT);
    let whole = wei / unit;
    let frac = wei % unit;

    if frac.is_zero() {
        return format!("{whole} {currency}");
    }

    let frac_digits = format!("{:018}", frac.to::<u128>());
    let trimmed = frac_digits.trim_end_matches('0');
    format!("{whole}.{trimmed} {currency}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        artifacts_dir = "artifacts/src"

        [export]
        destinations = ["abis", "../app/lib/shared/contracts/abis"]

        [networks.fuji]
        chain_id = 43113
        rpc_url = "https://api.avax-test.network/ext/bc/C/rpc"
        deployer = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
        currency = "AVAX"
        explorer_url = "https://testnet.snowtrace.io/"

        [networks.localhost]
        chain_id = 31337
        rpc_url = "http://127.0.0.1:8545"
        deployer = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
    "#;

    #[test]
    fn test_parse_config_with_defaults() {
        let config: OrchestratorConfig = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.networks.len(), 2);
        assert_eq!(config.state_dir, PathBuf::from("deployments"));
        assert_eq!(config.export.destinations.len(), 2);

        let localhost = config.network("localhost").unwrap();
        assert_eq!(localhost.chain_id, 31337);
        assert_eq!(localhost.currency, "ETH");
        assert_eq!(localhost.min_balance, 0.1);
        assert_eq!(localhost.gas_margin_percent, 10);
        assert_eq!(localhost.confirm_timeout_secs, 120);
        assert!(localhost.explorer_url.is_none());
    }

    #[test]
    fn test_unknown_network_lists_candidates() {
        let config: OrchestratorConfig = toml::from_str(SAMPLE).unwrap();
        let err = config.network("mainnet").unwrap_err().to_string();
        assert!(err.contains("fuji"));
        assert!(err.contains("localhost"));
    }

    #[test]
    fn test_to_wei() {
        assert_eq!(to_wei(1.0), U256::from(1_000_000_000_000_000_000u128));
        assert_eq!(to_wei(0.1), U256::from(100_000_000_000_000_000u128));
        assert_eq!(to_wei(0.05), U256::from(50_000_000_000_000_000u128));
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(to_wei(1.0), "STT"), "1 STT");
        assert_eq!(format_units(to_wei(0.25), "AVAX"), "0.25 AVAX");
        assert_eq!(format_units(U256::ZERO, "ETH"), "0 ETH");
    }

    #[test]
    fn test_buffered_gas_limit() {
        let config: OrchestratorConfig = toml::from_str(SAMPLE).unwrap();
        let network = config.network("localhost").unwrap();

        // 10% buffer, matching the margin used for live deployments.
        assert_eq!(network.buffered_gas_limit(1_000_000), 1_100_000);
        assert_eq!(network.buffered_gas_limit(0), 0);
    }

    #[test]
    fn test_explorer_address_url() {
        let config: OrchestratorConfig = toml::from_str(SAMPLE).unwrap();
        let fuji = config.network("fuji").unwrap();
        let url = fuji
            .explorer_address_url(Address::repeat_byte(0x42))
            .unwrap();

        assert!(url.starts_with("https://testnet.snowtrace.io/address/0x"));
        assert!(config.network("localhost").unwrap()
            .explorer_address_url(Address::repeat_byte(0x42))
            .is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let config: OrchestratorConfig = toml::from_str(SAMPLE).unwrap();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let reparsed: OrchestratorConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(config, reparsed);
    }
}
