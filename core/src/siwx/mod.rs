//! Sign-In With X challenges
//!
//! A challenge is built fresh for every authentication attempt. Fields not
//! supplied through [`SiwxOverrides`] are derived from the [`SiwxContext`]
//! (domain and uri of the running application) and the requested
//! [`SiwxResource`]s.

mod message;

pub use message::micheline_payload;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::config::SiwxConfig;
use crate::crypto::{random_nonce, NONCE_LENGTH};
use crate::error::{OrbisError, Result};

/// Message version
pub const SIWX_VERSION: &str = "1";

/// Domain used when neither the context nor the overrides provide one
pub const FALLBACK_DOMAIN: &str = "localhost";

/// Uri used when neither the context nor the overrides provide one
pub const FALLBACK_URI: &str = "http://localhost";

/// A resource a session grants access to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiwxResource {
    /// Resource type identifier
    pub resource_type: String,

    /// Name shown to the user in the challenge statement
    pub user_friendly_name: String,

    /// Scoping URNs added to the challenge resources
    pub siwx_resources: Vec<String>,
}

impl SiwxResource {
    /// Document storage on the decentralized network
    pub fn storage() -> Self {
        Self {
            resource_type: "storage".to_string(),
            user_friendly_name: "Ceramic Network".to_string(),
            siwx_resources: vec!["ceramic://*".to_string()],
        }
    }
}

/// Values provided by the running application
#[derive(Debug, Clone)]
pub struct SiwxContext {
    /// Host of the application
    pub domain: Option<String>,

    /// Full uri of the application
    pub uri: Option<String>,

    /// Validity window of issued challenges
    pub validity: Duration,
}

impl Default for SiwxContext {
    fn default() -> Self {
        Self::from(&SiwxConfig::default())
    }
}

impl From<&SiwxConfig> for SiwxContext {
    fn from(config: &SiwxConfig) -> Self {
        Self {
            domain: config.domain.clone(),
            uri: config.uri.clone(),
            validity: Duration::seconds(config.validity_secs as i64),
        }
    }
}

/// Explicit field values taking precedence over derived ones
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiwxOverrides {
    /// Address to sign in with
    pub address: Option<String>,
    /// Requesting domain
    pub domain: Option<String>,
    /// Subject uri
    pub uri: Option<String>,
    /// Statement
    pub statement: Option<String>,
    /// Nonce
    pub nonce: Option<String>,
    /// Issue time
    pub issued_at: Option<DateTime<Utc>>,
    /// Expiration time
    pub expiration_time: Option<DateTime<Utc>>,
    /// Chain reference
    pub chain_id: Option<String>,
    /// Scoping URNs
    pub resources: Option<Vec<String>>,
}

/// Structured challenge to be signed by a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiwxChallenge {
    /// Chain of the signing wallet
    pub chain: Chain,
    /// Requesting domain
    pub domain: String,
    /// Signing address
    pub address: String,
    /// Human readable statement
    pub statement: String,
    /// Subject uri, the session key DID during authentication
    pub uri: String,
    /// Message version
    pub version: String,
    /// Random nonce
    pub nonce: String,
    /// Issue time
    pub issued_at: DateTime<Utc>,
    /// Expiration time
    pub expiration_time: DateTime<Utc>,
    /// Chain reference
    pub chain_id: String,
    /// Scoping URNs
    pub resources: Vec<String>,
}

/// Challenge along with the wallet signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedChallenge {
    /// Signed challenge
    pub challenge: SiwxChallenge,

    /// Signature as returned by the wallet
    pub signature: String,
}

impl SignedChallenge {
    /// Append a public key to the signature
    ///
    /// Tezos credentials carry the signer's public key after the signature.
    pub fn append_public_key(&mut self, public_key: &str) {
        self.signature.push_str(public_key);
    }
}

/// Statement listing the resources a challenge grants access to
pub fn resources_statement(resources: &[SiwxResource]) -> String {
    let names: Vec<&str> = resources
        .iter()
        .map(|resource| resource.user_friendly_name.as_str())
        .collect();

    format!(
        "Give this application access to some of your data on {}.",
        names.join(", ")
    )
}

fn resolve(
    field: &str,
    overridden: Option<&String>,
    context: Option<&String>,
    fallback: &str,
) -> Result<String> {
    let value = overridden
        .or(context)
        .map(String::as_str)
        .unwrap_or(fallback)
        .trim();

    if value.is_empty() {
        return Err(OrbisError::Configuration(format!(
            "No \"{}\" has been set",
            field
        )));
    }

    Ok(value.to_string())
}

impl SiwxChallenge {
    /// Build a challenge for an address on a chain
    ///
    /// Fails when no resource is requested, when domain or uri resolve to an
    /// empty value, or when the expiration does not follow the issue time.
    pub fn create(
        address: &str,
        chain: Chain,
        resources: &[SiwxResource],
        overrides: &SiwxOverrides,
        context: &SiwxContext,
    ) -> Result<Self> {
        if resources.is_empty() {
            return Err(OrbisError::Configuration(
                "At least one resource is required to build a challenge".to_string(),
            ));
        }

        let domain = resolve(
            "domain",
            overrides.domain.as_ref(),
            context.domain.as_ref(),
            FALLBACK_DOMAIN,
        )?;
        let uri = resolve(
            "uri",
            overrides.uri.as_ref(),
            context.uri.as_ref(),
            FALLBACK_URI,
        )?;

        let issued_at = overrides.issued_at.unwrap_or_else(Utc::now);
        let expiration_time = overrides
            .expiration_time
            .unwrap_or(issued_at + context.validity);

        if expiration_time <= issued_at {
            return Err(OrbisError::Validation(format!(
                "Expiration time {} must follow issue time {}",
                expiration_time, issued_at
            )));
        }

        let scoped = match &overrides.resources {
            Some(resources) => resources.clone(),
            None => {
                let mut scoped: Vec<String> = Vec::new();
                for urn in resources.iter().flat_map(|r| r.siwx_resources.iter()) {
                    if !scoped.contains(urn) {
                        scoped.push(urn.clone());
                    }
                }
                scoped
            }
        };

        let challenge = Self {
            chain,
            domain,
            address: overrides
                .address
                .clone()
                .unwrap_or_else(|| address.to_string()),
            statement: overrides
                .statement
                .clone()
                .unwrap_or_else(|| resources_statement(resources)),
            uri,
            version: SIWX_VERSION.to_string(),
            nonce: overrides
                .nonce
                .clone()
                .unwrap_or_else(|| random_nonce(NONCE_LENGTH)),
            issued_at,
            expiration_time,
            chain_id: overrides
                .chain_id
                .clone()
                .unwrap_or_else(|| chain.chain_id().to_string()),
            resources: scoped,
        };

        debug!(
            "Created {} challenge for {} on {}",
            challenge.chain, challenge.address, challenge.domain
        );

        Ok(challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> SiwxContext {
        SiwxContext {
            domain: Some("app.example".to_string()),
            uri: Some("https://app.example/login".to_string()),
            validity: Duration::days(90),
        }
    }

    #[test]
    fn test_derived_fields() {
        let challenge = SiwxChallenge::create(
            "0xabc",
            Chain::Tezos,
            &[SiwxResource::storage()],
            &SiwxOverrides::default(),
            &context(),
        )
        .unwrap();

        assert_eq!(challenge.domain, "app.example");
        assert_eq!(challenge.uri, "https://app.example/login");
        assert_eq!(challenge.version, "1");
        assert_eq!(challenge.nonce.len(), NONCE_LENGTH);
        assert_eq!(challenge.chain_id, "NetXdQprcVkpaWU");
        assert_eq!(challenge.resources, vec!["ceramic://*".to_string()]);
        assert_eq!(
            challenge.statement,
            "Give this application access to some of your data on Ceramic Network."
        );
        assert_eq!(
            challenge.expiration_time - challenge.issued_at,
            Duration::days(90)
        );
    }

    #[test]
    fn test_fallbacks_and_overrides() {
        let issued_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let overrides = SiwxOverrides {
            uri: Some("did:key:z6Mkabc".to_string()),
            nonce: Some("fixednonce".to_string()),
            issued_at: Some(issued_at),
            ..Default::default()
        };
        let context = SiwxContext {
            domain: None,
            uri: None,
            validity: Duration::days(1),
        };

        let challenge =
            SiwxChallenge::create("SP1", Chain::Stacks, &[SiwxResource::storage()], &overrides, &context)
                .unwrap();

        assert_eq!(challenge.domain, FALLBACK_DOMAIN);
        assert_eq!(challenge.uri, "did:key:z6Mkabc");
        assert_eq!(challenge.nonce, "fixednonce");
        assert_eq!(challenge.expiration_time, issued_at + Duration::days(1));
    }

    #[test]
    fn test_resources_are_merged() {
        let extra = SiwxResource {
            resource_type: "indexer".to_string(),
            user_friendly_name: "Orbis Node".to_string(),
            siwx_resources: vec!["ceramic://*".to_string(), "orbis://*".to_string()],
        };

        let challenge = SiwxChallenge::create(
            "addr",
            Chain::Solana,
            &[SiwxResource::storage(), extra],
            &SiwxOverrides::default(),
            &context(),
        )
        .unwrap();

        assert_eq!(challenge.resources, vec!["ceramic://*", "orbis://*"]);
        assert_eq!(
            challenge.statement,
            "Give this application access to some of your data on Ceramic Network, Orbis Node."
        );
    }

    #[test]
    fn test_failures() {
        let err = SiwxChallenge::create("a", Chain::Evm, &[], &SiwxOverrides::default(), &context())
            .unwrap_err();
        assert!(matches!(err, OrbisError::Configuration(_)));

        let overrides = SiwxOverrides {
            domain: Some("  ".to_string()),
            ..Default::default()
        };
        let err = SiwxChallenge::create("a", Chain::Evm, &[SiwxResource::storage()], &overrides, &context())
            .unwrap_err();
        assert!(matches!(err, OrbisError::Configuration(ref msg) if msg.contains("domain")));

        let now = Utc::now();
        let overrides = SiwxOverrides {
            issued_at: Some(now),
            expiration_time: Some(now - Duration::seconds(1)),
            ..Default::default()
        };
        let err = SiwxChallenge::create("a", Chain::Evm, &[SiwxResource::storage()], &overrides, &context())
            .unwrap_err();
        assert!(matches!(err, OrbisError::Validation(_)));
    }

    #[test]
    fn test_append_public_key() {
        let challenge = SiwxChallenge::create(
            "tz1abc",
            Chain::Tezos,
            &[SiwxResource::storage()],
            &SiwxOverrides::default(),
            &context(),
        )
        .unwrap();
        let mut signed = SignedChallenge {
            challenge,
            signature: "edsigXYZ".to_string(),
        };
        signed.append_public_key("edpkABC");
        assert_eq!(signed.signature, "edsigXYZedpkABC");
    }
}
