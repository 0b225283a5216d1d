//! Artifact descriptions for the TOKON contract suite.
//!
//! An [`ArtifactSpec`] describes one deployable contract: how to build its
//! constructor arguments (possibly from the addresses of other artifacts) and
//! which configuration calls must run once it is on the ledger. The pre-built
//! binary and interface for each artifact are loaded from Hardhat-layout
//! artifact files via [`ArtifactStore`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use alloy_core::primitives::{Address, Bytes, U256, keccak256};
use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

/// A literal argument value for a constructor or configuration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
}

impl ArgValue {
    /// Encode the value as a single 32-byte call-data word.
    pub fn encode_word(&self) -> [u8; 32] {
        match self {
            ArgValue::Address(addr) => addr.into_word().0,
            ArgValue::Uint(value) => value.to_be_bytes::<32>(),
            ArgValue::Bool(flag) => {
                let mut word = [0u8; 32];
                word[31] = u8::from(*flag);
                word
            }
        }
    }
}

/// How to obtain one argument at execution time.
///
/// Arguments are either fixed up front or only known once another artifact
/// has an address on the target network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgResolver {
    /// A fixed value.
    Literal(ArgValue),
    /// The deployed address of another artifact, by name.
    ArtifactAddress(String),
    /// The account the orchestrator submits transactions from.
    DeployerAccount,
}

impl ArgResolver {
    /// The artifact name this resolver references, if any.
    fn referenced_artifact(&self) -> Option<&str> {
        match self {
            ArgResolver::ArtifactAddress(name) => Some(name),
            _ => None,
        }
    }
}

/// Error raised when an argument references an artifact with no address yet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("artifact {0} has no recorded address on this network")]
pub struct UnresolvedArtifact(pub String);

/// Everything argument resolution may draw from: the submitting account and
/// the addresses recorded for already-deployed artifacts.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub deployer: Address,
    pub addresses: &'a BTreeMap<String, Address>,
}

impl ResolveContext<'_> {
    /// Resolve a single argument.
    pub fn resolve(&self, resolver: &ArgResolver) -> Result<ArgValue, UnresolvedArtifact> {
        match resolver {
            ArgResolver::Literal(value) => Ok(*value),
            ArgResolver::DeployerAccount => Ok(ArgValue::Address(self.deployer)),
            ArgResolver::ArtifactAddress(name) => self
                .addresses
                .get(name)
                .map(|addr| ArgValue::Address(*addr))
                .ok_or_else(|| UnresolvedArtifact(name.clone())),
        }
    }

    /// Resolve an ordered argument list.
    pub fn resolve_all(
        &self,
        resolvers: &[ArgResolver],
    ) -> Result<Vec<ArgValue>, UnresolvedArtifact> {
        resolvers.iter().map(|r| self.resolve(r)).collect()
    }
}

/// A read-only check that tells whether a configuration call has already
/// taken effect on the ledger.
///
/// The probe is a view call whose single-word return value is compared
/// against `expected`. When they match, resubmitting the configuration call
/// would be a no-op and is skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyProbe {
    /// View function signature, e.g. `boundaryNFT()`.
    pub signature: String,
    pub args: Vec<ArgResolver>,
    pub expected: ArgResolver,
}

/// A post-deployment configuration call against a deployed artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct WiringAction {
    /// Unique action name, used as the persistence key.
    pub name: String,
    /// Artifact receiving the call.
    pub target: String,
    /// Function signature, e.g. `setBoundaryNFT(address)`.
    pub signature: String,
    pub args: Vec<ArgResolver>,
    /// Optional read-back check making re-execution skippable.
    pub probe: Option<IdempotencyProbe>,
}

impl WiringAction {
    /// All artifact names this action needs addresses for.
    pub fn referenced_artifacts(&self) -> BTreeSet<&str> {
        let mut refs: BTreeSet<&str> = BTreeSet::new();
        refs.insert(self.target.as_str());
        refs.extend(self.args.iter().filter_map(ArgResolver::referenced_artifact));
        if let Some(probe) = &self.probe {
            refs.extend(probe.args.iter().filter_map(ArgResolver::referenced_artifact));
            refs.extend(probe.expected.referenced_artifact());
        }
        refs
    }
}

/// Static description of one deployable artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSpec {
    /// Unique artifact name, matching the pre-built artifact file.
    pub name: String,
    /// Constructor arguments, in declaration order.
    pub constructor_args: Vec<ArgResolver>,
    /// Configuration calls that become possible once this artifact and
    /// everything it references are deployed.
    pub wiring: Vec<WiringAction>,
}

impl ArtifactSpec {
    /// Names of all artifacts this one needs addresses from, through its
    /// constructor or its wiring actions. The artifact itself is excluded.
    pub fn dependencies(&self) -> BTreeSet<&str> {
        let mut deps: BTreeSet<&str> = self
            .constructor_args
            .iter()
            .filter_map(ArgResolver::referenced_artifact)
            .collect();
        for action in &self.wiring {
            deps.extend(action.referenced_artifacts());
        }
        deps.remove(self.name.as_str());
        deps
    }
}

/// The TOKON artifact registry.
///
/// Three contracts in dependency order: the event factory, the boundary NFT
/// (whose constructor takes the factory address), and the standalone claim
/// verification contract. Wiring actions are declared on the artifact whose
/// deployment makes them possible, so the reference graph stays acyclic.
pub fn tokon_artifacts() -> Vec<ArtifactSpec> {
    vec![
        ArtifactSpec {
            name: "EventFactory".to_string(),
            constructor_args: vec![],
            wiring: vec![],
        },
        ArtifactSpec {
            name: "BoundaryNFT".to_string(),
            constructor_args: vec![ArgResolver::ArtifactAddress("EventFactory".to_string())],
            wiring: vec![
                WiringAction {
                    name: "set-boundary-nft".to_string(),
                    target: "EventFactory".to_string(),
                    signature: "setBoundaryNFT(address)".to_string(),
                    args: vec![ArgResolver::ArtifactAddress("BoundaryNFT".to_string())],
                    probe: Some(IdempotencyProbe {
                        signature: "boundaryNFT()".to_string(),
                        args: vec![],
                        expected: ArgResolver::ArtifactAddress("BoundaryNFT".to_string()),
                    }),
                },
                WiringAction {
                    name: "grant-organizer-role".to_string(),
                    target: "EventFactory".to_string(),
                    signature: "grantOrganizerRole(address)".to_string(),
                    args: vec![ArgResolver::ArtifactAddress("BoundaryNFT".to_string())],
                    probe: Some(IdempotencyProbe {
                        signature: "isOrganizer(address)".to_string(),
                        args: vec![ArgResolver::ArtifactAddress("BoundaryNFT".to_string())],
                        expected: ArgResolver::Literal(ArgValue::Bool(true)),
                    }),
                },
            ],
        },
        ArtifactSpec {
            name: "ClaimVerification".to_string(),
            constructor_args: vec![],
            wiring: vec![
                WiringAction {
                    name: "set-claim-verification".to_string(),
                    target: "EventFactory".to_string(),
                    signature: "setClaimVerification(address)".to_string(),
                    args: vec![ArgResolver::ArtifactAddress("ClaimVerification".to_string())],
                    probe: Some(IdempotencyProbe {
                        signature: "claimVerification()".to_string(),
                        args: vec![],
                        expected: ArgResolver::ArtifactAddress("ClaimVerification".to_string()),
                    }),
                },
                WiringAction {
                    name: "set-trusted-signer".to_string(),
                    target: "ClaimVerification".to_string(),
                    signature: "setTrustedSigner(address,bool)".to_string(),
                    args: vec![
                        ArgResolver::DeployerAccount,
                        ArgResolver::Literal(ArgValue::Bool(true)),
                    ],
                    probe: Some(IdempotencyProbe {
                        signature: "isTrustedSigner(address)".to_string(),
                        args: vec![ArgResolver::DeployerAccount],
                        expected: ArgResolver::Literal(ArgValue::Bool(true)),
                    }),
                },
            ],
        },
    ]
}

/// Compute the 4-byte function selector for a signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// ABI-encode a function call: selector followed by one 32-byte word per
/// argument. All TOKON configuration calls take statically-sized arguments.
pub fn encode_call(signature: &str, args: &[ArgValue]) -> Bytes {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(&arg.encode_word());
    }
    Bytes::from(data)
}

/// Build creation call data: the contract binary followed by the encoded
/// constructor arguments.
pub fn encode_creation(bytecode: &Bytes, args: &[ArgValue]) -> Bytes {
    let mut data = Vec::with_capacity(bytecode.len() + 32 * args.len());
    data.extend_from_slice(bytecode);
    for arg in args {
        data.extend_from_slice(&arg.encode_word());
    }
    Bytes::from(data)
}

/// One pre-built contract artifact as produced by the contract build:
/// `<artifacts_dir>/<Name>.sol/<Name>.json` with `abi` and `bytecode`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractArtifact {
    #[serde(rename = "contractName", default)]
    pub contract_name: String,
    pub abi: serde_json::Value,
    pub bytecode: String,
}

impl ContractArtifact {
    /// Load one artifact file from the build output directory.
    pub fn load(artifacts_dir: &Path, name: &str) -> Result<Self> {
        let path = artifacts_dir
            .join(format!("{name}.sol"))
            .join(format!("{name}.json"));
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact file {}", path.display()))?;
        let mut artifact: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact file {}", path.display()))?;
        if artifact.contract_name.is_empty() {
            artifact.contract_name = name.to_string();
        }
        Ok(artifact)
    }

    /// Decode the creation binary.
    pub fn creation_bytecode(&self) -> Result<Bytes> {
        let raw = hex::decode(self.bytecode.trim_start_matches("0x")).with_context(|| {
            format!("Artifact {} has malformed bytecode", self.contract_name)
        })?;
        Ok(Bytes::from(raw))
    }

    /// Number of functions in the interface.
    pub fn function_count(&self) -> usize {
        self.abi_entries_of_type("function")
    }

    /// Number of events in the interface.
    pub fn event_count(&self) -> usize {
        self.abi_entries_of_type("event")
    }

    fn abi_entries_of_type(&self, kind: &str) -> usize {
        self.abi
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.get("type").and_then(|t| t.as_str()) == Some(kind))
                    .count()
            })
            .unwrap_or(0)
    }
}

/// All pre-built artifacts required by a deployment run, keyed by name.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    artifacts: BTreeMap<String, ContractArtifact>,
}

impl ArtifactStore {
    /// Load the artifact file for every spec in the registry.
    pub fn load(artifacts_dir: &Path, specs: &[ArtifactSpec]) -> Result<Self> {
        let mut artifacts = BTreeMap::new();
        for spec in specs {
            let artifact = ContractArtifact::load(artifacts_dir, &spec.name)?;
            tracing::debug!(
                artifact = %spec.name,
                functions = artifact.function_count(),
                events = artifact.event_count(),
                "Loaded contract artifact"
            );
            artifacts.insert(spec.name.clone(), artifact);
        }
        Ok(Self { artifacts })
    }

    /// Build a store from already-loaded artifacts.
    pub fn from_artifacts(artifacts: impl IntoIterator<Item = ContractArtifact>) -> Self {
        Self {
            artifacts: artifacts
                .into_iter()
                .map(|a| (a.contract_name.clone(), a))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ContractArtifact> {
        self.artifacts.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_selector_known_value() {
        // transfer(address,uint256) has the well-known selector a9059cbb.
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_encode_call_layout() {
        let data = encode_call(
            "setBoundaryNFT(address)",
            &[ArgValue::Address(addr(0x42))],
        );

        // 4-byte selector + one 32-byte word.
        assert_eq!(data.len(), 36);
        // Address is left-padded to 32 bytes.
        assert!(data[4..16].iter().all(|b| *b == 0));
        assert!(data[16..36].iter().all(|b| *b == 0x42));
    }

    #[test]
    fn test_encode_bool_word() {
        let word = ArgValue::Bool(true).encode_word();
        assert_eq!(word[31], 1);
        assert!(word[..31].iter().all(|b| *b == 0));

        assert_eq!(ArgValue::Bool(false).encode_word(), [0u8; 32]);
    }

    #[test]
    fn test_encode_uint_word() {
        let word = ArgValue::Uint(U256::from(0xdeadbeefu64)).encode_word();
        assert_eq!(&word[28..], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_encode_creation_appends_args() {
        let bytecode = Bytes::from(vec![0x60, 0x80, 0x60, 0x40]);
        let data = encode_creation(&bytecode, &[ArgValue::Address(addr(0x11))]);

        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &[0x60, 0x80, 0x60, 0x40]);
        assert!(data[16..].iter().all(|b| *b == 0x11));
    }

    #[test]
    fn test_resolve_artifact_address() {
        let mut addresses = BTreeMap::new();
        addresses.insert("EventFactory".to_string(), addr(0xaa));
        let ctx = ResolveContext {
            deployer: addr(0x01),
            addresses: &addresses,
        };

        let resolved = ctx
            .resolve(&ArgResolver::ArtifactAddress("EventFactory".to_string()))
            .unwrap();
        assert_eq!(resolved, ArgValue::Address(addr(0xaa)));

        let missing = ctx.resolve(&ArgResolver::ArtifactAddress("BoundaryNFT".to_string()));
        assert_eq!(missing, Err(UnresolvedArtifact("BoundaryNFT".to_string())));
    }

    #[test]
    fn test_resolve_deployer_account() {
        let addresses = BTreeMap::new();
        let ctx = ResolveContext {
            deployer: addr(0x07),
            addresses: &addresses,
        };

        let resolved = ctx.resolve(&ArgResolver::DeployerAccount).unwrap();
        assert_eq!(resolved, ArgValue::Address(addr(0x07)));
    }

    #[test]
    fn test_registry_dependencies() {
        let specs = tokon_artifacts();
        let by_name: BTreeMap<&str, &ArtifactSpec> =
            specs.iter().map(|s| (s.name.as_str(), s)).collect();

        assert!(by_name["EventFactory"].dependencies().is_empty());
        assert_eq!(
            by_name["BoundaryNFT"].dependencies(),
            BTreeSet::from(["EventFactory"])
        );
        // ClaimVerification wires itself into the factory.
        assert_eq!(
            by_name["ClaimVerification"].dependencies(),
            BTreeSet::from(["EventFactory"])
        );
    }

    #[test]
    fn test_registry_wiring_names_unique() {
        let specs = tokon_artifacts();
        let names: Vec<&str> = specs
            .iter()
            .flat_map(|s| s.wiring.iter().map(|w| w.name.as_str()))
            .collect();
        let unique: BTreeSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
    }

    #[test]
    fn test_artifact_counts_from_abi() {
        let artifact = ContractArtifact {
            contract_name: "EventFactory".to_string(),
            abi: serde_json::json!([
                {"type": "function", "name": "setBoundaryNFT"},
                {"type": "function", "name": "boundaryNFT"},
                {"type": "event", "name": "BoundaryNFTUpdated"},
                {"type": "constructor"}
            ]),
            bytecode: "0x6080".to_string(),
        };

        assert_eq!(artifact.function_count(), 2);
        assert_eq!(artifact.event_count(), 1);
        assert_eq!(
            artifact.creation_bytecode().unwrap(),
            Bytes::from(vec![0x60, 0x80])
        );
    }
}
