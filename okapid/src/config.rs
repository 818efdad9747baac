//! Node configuration, loaded from a TOML file.
//!
//! Sections mirror the deployment layout: `[node]` for the miner identity
//! and listen address, `[db]` for the sled directory, `[parent]` for the
//! seed peer, and an optional `[api]` block that the core accepts but does
//! not serve (the HTTP query API is an external adapter).

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use okapi_chain::address::{Address, AddressError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("the wallet address is not valid: {0}")]
    BadWallet(#[from] AddressError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub node: NodeSection,
    pub db: DbSection,
    #[serde(default)]
    pub api: Option<ApiSection>,
    #[serde(default)]
    pub parent: Option<ParentSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// The base58check address mined rewards are paid to.
    pub wallet: String,
    /// `1` to run the miner, `0` to only follow the chain.
    #[serde(default = "default_mine")]
    pub mine: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbSection {
    /// The sled database directory.
    pub path: PathBuf,
}

/// Accepted for compatibility with deployments that run the external query
/// API next to the node; the core ignores it.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default)]
    pub active: u8,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub cores: u32,
    #[serde(default)]
    pub rps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParentSection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    1111
}

fn default_mine() -> u8 {
    1
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// This node's own `host:port` peer address.
    pub fn local_address(&self) -> String {
        format!("{}:{}", self.node.host, self.node.port)
    }

    /// The seed peer, if one is configured.
    pub fn parent_address(&self) -> Option<String> {
        self.parent
            .as_ref()
            .map(|parent| format!("{}:{}", parent.host, parent.port))
    }

    pub fn mine(&self) -> bool {
        self.node.mine != 0
    }

    pub fn miner_address(&self) -> Result<Address, ConfigError> {
        Ok(Address::from_str(&self.node.wallet)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [node]
        host = "127.0.0.1"
        port = 4001
        wallet = "1111111111111111111114oLvT2"
        mine = 1

        [db]
        path = "/var/lib/okapi"

        [api]
        active = 0
        port = 5000
        cores = 2
        rps = 100

        [parent]
        host = "10.0.0.1"
        port = 4001
    "#;

    #[test]
    fn parses_all_sections() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.local_address(), "127.0.0.1:4001");
        assert_eq!(config.parent_address().as_deref(), Some("10.0.0.1:4001"));
        assert!(config.mine());
        assert_eq!(config.miner_address().unwrap(), Address::new([0; 20]));
        assert_eq!(config.db.path, PathBuf::from("/var/lib/okapi"));
        assert_eq!(config.api.unwrap().port, 5000);
    }

    #[test]
    fn parent_and_api_are_optional() {
        let minimal = r#"
            [node]
            host = "127.0.0.1"
            wallet = "1111111111111111111114oLvT2"

            [db]
            path = "okapi-data"
        "#;
        let config: Config = toml::from_str(minimal).unwrap();
        assert_eq!(config.node.port, 1111);
        assert!(config.mine());
        assert!(config.parent_address().is_none());
    }

    #[test]
    fn bad_wallet_is_an_error() {
        let broken = SAMPLE.replace("1111111111111111111114oLvT2", "not-an-address");
        let config: Config = toml::from_str(&broken).unwrap();
        assert!(matches!(
            config.miner_address(),
            Err(ConfigError::BadWallet(_))
        ));
    }
}
