//! Supported chains and DID-PKH helpers
//!
//! Every wallet-backed identity is expressed as a `did:pkh` DID of the form
//! `did:pkh:<namespace>:<chain id>:<address>`. This module holds the static
//! namespace table and the conversions between DIDs and chain addresses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{OrbisError, Result};

/// Chains a wallet identity can come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Ethereum and EVM compatible chains
    Evm,

    /// Solana
    Solana,

    /// Tezos
    Tezos,

    /// Stacks
    Stacks,
}

impl Chain {
    /// All supported chains
    pub const ALL: [Chain; 4] = [Chain::Evm, Chain::Solana, Chain::Tezos, Chain::Stacks];

    /// CAIP-2 namespace of the chain
    pub fn namespace(&self) -> &'static str {
        match self {
            Chain::Evm => "eip155",
            Chain::Solana => "solana",
            Chain::Tezos => "tezos",
            Chain::Stacks => "stacks",
        }
    }

    /// Mainnet chain reference used in challenges and DIDs
    pub fn chain_id(&self) -> &'static str {
        match self {
            Chain::Evm => "1",
            Chain::Solana => "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
            Chain::Tezos => "NetXdQprcVkpaWU",
            Chain::Stacks => "1",
        }
    }

    /// Human readable account name used in sign-in messages
    pub fn account_name(&self) -> &'static str {
        match self {
            Chain::Evm => "Ethereum",
            Chain::Solana => "Solana",
            Chain::Tezos => "Tezos",
            Chain::Stacks => "Stacks",
        }
    }

    /// Lookup a chain by its CAIP-2 namespace
    pub fn from_namespace(namespace: &str) -> Result<Self> {
        Chain::ALL
            .iter()
            .copied()
            .find(|chain| chain.namespace() == namespace)
            .ok_or_else(|| {
                OrbisError::UnsupportedChain(format!(
                    "Network namespace {} is not a supported network",
                    namespace
                ))
            })
    }

    fn as_str(&self) -> &'static str {
        match self {
            Chain::Evm => "evm",
            Chain::Solana => "solana",
            Chain::Tezos => "tezos",
            Chain::Stacks => "stacks",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Chain {
    type Err = OrbisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "evm" | "ethereum" => Ok(Chain::Evm),
            "solana" => Ok(Chain::Solana),
            "tezos" => Ok(Chain::Tezos),
            "stacks" => Ok(Chain::Stacks),
            other => Err(OrbisError::UnsupportedChain(other.to_string())),
        }
    }
}

/// Identity of an authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainIdentity {
    /// DID of the user
    pub did: String,

    /// Chain the identity comes from
    pub chain: Chain,

    /// Chain specific extras (address, public key)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ChainIdentity {
    /// Create an identity with empty metadata
    pub fn new(did: impl Into<String>, chain: Chain) -> Self {
        Self {
            did: did.into(),
            chain,
            metadata: Map::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Address stored in the metadata, if any
    pub fn address(&self) -> Option<&str> {
        self.metadata.get("address").and_then(Value::as_str)
    }

    /// Public key stored in the metadata, if any
    pub fn public_key(&self) -> Option<&str> {
        self.metadata.get("publicKey").and_then(Value::as_str)
    }
}

/// Address extracted from a DID-PKH
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DidAddress {
    /// Chain address
    pub address: String,

    /// Chain of the address
    pub chain: Chain,
}

/// Build the `did:pkh` DID of an address on the chain's mainnet
///
/// EVM addresses are lower-cased so that DIDs compare exactly.
pub fn did_pkh(chain: Chain, address: &str) -> String {
    let address = match chain {
        Chain::Evm => address.to_lowercase(),
        _ => address.to_string(),
    };

    format!("did:pkh:{}:{}:{}", chain.namespace(), chain.chain_id(), address)
}

/// Parse a `did:pkh` DID into its chain and address
pub fn did_to_address(did: &str) -> Result<DidAddress> {
    let parts: Vec<&str> = did.split(':').collect();
    if parts.len() != 5 || parts[0] != "did" || parts[1] != "pkh" {
        return Err(OrbisError::Validation(format!(
            "Invalid did type {}, only DID PKH format is supported",
            did
        )));
    }

    Ok(DidAddress {
        chain: Chain::from_namespace(parts[2])?,
        address: parts[4].to_string(),
    })
}

/// Parse a list of DIDs, dropping duplicates, empty entries and non PKH DIDs
pub fn dids_to_addresses<I, S>(dids: I) -> Vec<DidAddress>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut addresses = Vec::new();

    for did in dids {
        let did = did.as_ref();
        if did.is_empty() || !seen.insert(did.to_string()) {
            continue;
        }

        if let Ok(address) = did_to_address(did) {
            addresses.push(address);
        }
    }

    addresses
}

/// Derive the user identity carried by a `did:pkh` DID
pub fn parse_identity_from_did(did: &str) -> Result<ChainIdentity> {
    let DidAddress { address, chain } = did_to_address(did)?;
    Ok(ChainIdentity::new(did, chain).with_metadata("address", address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_table() {
        assert_eq!(Chain::Evm.namespace(), "eip155");
        assert_eq!(Chain::Tezos.chain_id(), "NetXdQprcVkpaWU");
        for chain in Chain::ALL {
            assert_eq!(Chain::from_namespace(chain.namespace()).unwrap(), chain);
            assert_eq!(chain.to_string().parse::<Chain>().unwrap(), chain);
        }
        assert!(matches!(
            Chain::from_namespace("cosmos"),
            Err(OrbisError::UnsupportedChain(_))
        ));
        assert_eq!("Ethereum".parse::<Chain>().unwrap(), Chain::Evm);
    }

    #[test]
    fn test_did_pkh() {
        assert_eq!(
            did_pkh(Chain::Evm, "0xAbC0000000000000000000000000000000000001"),
            "did:pkh:eip155:1:0xabc0000000000000000000000000000000000001"
        );
        assert_eq!(
            did_pkh(Chain::Solana, "AbC"),
            "did:pkh:solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp:AbC"
        );
    }

    #[test]
    fn test_did_to_address() {
        let parsed = did_to_address("did:pkh:tezos:NetXdQprcVkpaWU:tz1abc").unwrap();
        assert_eq!(parsed.chain, Chain::Tezos);
        assert_eq!(parsed.address, "tz1abc");

        assert!(did_to_address("did:key:z6Mkabc").is_err());
        assert!(did_to_address("did:pkh:cosmos:hub:abc").is_err());
    }

    #[test]
    fn test_dids_to_addresses() {
        let parsed = dids_to_addresses([
            "did:pkh:eip155:1:0xabc",
            "",
            "did:pkh:eip155:1:0xabc",
            "did:key:z6Mkabc",
            "did:pkh:stacks:1:SP123",
        ]);

        assert_eq!(
            parsed,
            vec![
                DidAddress {
                    address: "0xabc".to_string(),
                    chain: Chain::Evm
                },
                DidAddress {
                    address: "SP123".to_string(),
                    chain: Chain::Stacks
                },
            ]
        );
    }

    #[test]
    fn test_parse_identity_from_did() {
        let identity = parse_identity_from_did("did:pkh:eip155:1:0xabc").unwrap();
        assert_eq!(identity.chain, Chain::Evm);
        assert_eq!(identity.address(), Some("0xabc"));
        assert_eq!(identity.public_key(), None);
    }
}
