//! Contract artifacts and the registry of deployed contract addresses.

use serde::Deserialize;
use std::path::Path;
use std::sync::RwLock;

use txbot_types::Address;

use crate::config::HarnessConfig;
use crate::OrchestratorError;

/// The contracts some worker kinds depend on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContractKind {
    /// Burns a requested amount of gas per call (`go(gasAmount)`).
    GasConsumer,
    /// Mintable test token used by convert workers.
    Token,
}

impl ContractKind {
    pub fn name(&self) -> &'static str {
        match self {
            ContractKind::GasConsumer => "GasConsumer",
            ContractKind::Token => "ERC20MinterBurnerDecimals",
        }
    }

    /// Constructor arguments: the token is deployed as ("test", "test", 18).
    pub fn deploy_args(&self) -> Vec<String> {
        match self {
            ContractKind::GasConsumer => Vec::new(),
            ContractKind::Token => vec!["test".into(), "test".into(), "18".into()],
        }
    }
}

/// Compiled contract as read from a JSON artifact (`{"bytecode": "0x..."}`).
#[derive(Clone, Debug, Deserialize)]
pub struct ContractArtifact {
    #[serde(default)]
    pub name: String,
    pub bytecode: String,
}

impl ContractArtifact {
    pub fn new(name: impl Into<String>, bytecode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytecode: bytecode.into(),
        }
    }

    /// Parse an artifact, checking that the bytecode is non-empty hex.
    pub fn from_json_str(name: &str, json: &str) -> Result<Self, OrchestratorError> {
        let mut artifact: ContractArtifact = serde_json::from_str(json)
            .map_err(|e| OrchestratorError::Config(format!("artifact {name}: {e}")))?;
        if artifact.name.is_empty() {
            artifact.name = name.to_string();
        }
        let code = artifact.bytecode_hex();
        if code.is_empty() || hex::decode(code).is_err() {
            return Err(OrchestratorError::Config(format!(
                "artifact {name}: bytecode is not valid hex"
            )));
        }
        Ok(artifact)
    }

    pub fn from_file(name: &str, path: &Path) -> Result<Self, OrchestratorError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!("artifact {}: {e}", path.display()))
        })?;
        Self::from_json_str(name, &json)
    }

    /// Bytecode without the `0x` prefix.
    pub fn bytecode_hex(&self) -> &str {
        self.bytecode
            .strip_prefix("0x")
            .unwrap_or(&self.bytecode)
    }
}

/// Artifacts available for bootstrap and lazy deployment.
#[derive(Clone, Debug, Default)]
pub struct ContractArtifacts {
    pub gas_consumer: Option<ContractArtifact>,
    pub token: Option<ContractArtifact>,
}

impl ContractArtifacts {
    /// Load whichever artifact paths the configuration names.
    pub fn load(config: &HarnessConfig) -> Result<Self, OrchestratorError> {
        let load = |kind: ContractKind, path: &Option<std::path::PathBuf>| {
            path.as_deref()
                .map(|p| ContractArtifact::from_file(kind.name(), p))
                .transpose()
        };
        Ok(Self {
            gas_consumer: load(ContractKind::GasConsumer, &config.gas_consumer_artifact)?,
            token: load(ContractKind::Token, &config.token_artifact)?,
        })
    }

    pub fn get(&self, kind: ContractKind) -> Option<&ContractArtifact> {
        match kind {
            ContractKind::GasConsumer => self.gas_consumer.as_ref(),
            ContractKind::Token => self.token.as_ref(),
        }
    }
}

/// Deployed contract addresses. Written during bootstrap or by a lazy
/// fallback deploy; read by worker construction.
#[derive(Debug, Default)]
pub struct ContractRegistry {
    gas_consumer: RwLock<Option<Address>>,
    token: RwLock<Option<Address>>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: ContractKind) -> &RwLock<Option<Address>> {
        match kind {
            ContractKind::GasConsumer => &self.gas_consumer,
            ContractKind::Token => &self.token,
        }
    }

    pub fn get(&self, kind: ContractKind) -> Option<Address> {
        self.slot(kind)
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn set(&self, kind: ContractKind, address: Address) {
        let mut guard = self
            .slot(kind)
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn artifact_parses_and_strips_prefix() {
        let artifact =
            ContractArtifact::from_json_str("GasConsumer", r#"{"abi": [], "bytecode": "0x6080"}"#)
                .unwrap();
        assert_eq!(artifact.name, "GasConsumer");
        assert_eq!(artifact.bytecode_hex(), "6080");
    }

    #[test]
    fn artifact_rejects_bad_bytecode() {
        assert!(ContractArtifact::from_json_str("x", r#"{"bytecode": "0x"}"#).is_err());
        assert!(ContractArtifact::from_json_str("x", r#"{"bytecode": "zz"}"#).is_err());
        assert!(ContractArtifact::from_json_str("x", r#"{"abi": []}"#).is_err());
    }

    #[test]
    fn artifacts_load_from_config_paths() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bytecode": "0x60806040"}}"#).unwrap();
        let config = HarnessConfig {
            token_artifact: Some(file.path().to_path_buf()),
            ..HarnessConfig::default()
        };
        let artifacts = ContractArtifacts::load(&config).unwrap();
        assert!(artifacts.gas_consumer.is_none());
        let token = artifacts.get(ContractKind::Token).unwrap();
        assert_eq!(token.name, "ERC20MinterBurnerDecimals");
    }

    #[test]
    fn registry_starts_empty() {
        let registry = ContractRegistry::new();
        assert!(registry.get(ContractKind::Token).is_none());
        let addr = Address::from_bytes([7; 20]);
        registry.set(ContractKind::Token, addr.clone());
        assert_eq!(registry.get(ContractKind::Token), Some(addr));
        assert!(registry.get(ContractKind::GasConsumer).is_none());
    }

    #[test]
    fn token_deploy_args() {
        assert_eq!(ContractKind::Token.deploy_args(), vec!["test", "test", "18"]);
        assert!(ContractKind::GasConsumer.deploy_args().is_empty());
    }
}
