//! CACAO credentials
//!
//! A CACAO binds a session key (the challenge `uri`, a `did:key`) to the
//! wallet controlled `did:pkh` issuer for the challenge validity window.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::{did_to_address, Chain};
use crate::error::{OrbisError, Result};
use crate::siwx::SignedChallenge;

/// Credential header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacaoHeader {
    /// Payload format, `eip4361` or `caip122`
    pub t: String,
}

/// Credential payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacaoPayload {
    /// Requesting domain
    pub domain: String,
    /// Issuer, the wallet `did:pkh`
    pub iss: String,
    /// Audience, the session key DID
    pub aud: String,
    /// Message version
    pub version: String,
    /// Challenge nonce
    pub nonce: String,
    /// Issue time
    pub iat: String,
    /// Expiration time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<String>,
    /// Statement shown to the signer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    /// Scoping URNs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
}

/// Credential signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacaoSignature {
    /// Signature scheme
    pub t: String,
    /// Encoded signature
    pub s: String,
}

/// Chain agnostic capability object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cacao {
    /// Header
    pub h: CacaoHeader,
    /// Payload
    pub p: CacaoPayload,
    /// Signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<CacaoSignature>,
}

fn signature_type(chain: Chain) -> Result<&'static str> {
    match chain {
        Chain::Evm => Ok("eip191"),
        Chain::Solana => Ok("solana:ed25519"),
        Chain::Tezos => Ok("tezos:ed25519"),
        Chain::Stacks => Err(OrbisError::UnsupportedChain(
            "Credentials cannot be derived for stacks".to_string(),
        )),
    }
}

fn timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Cacao {
    /// Derive the credential from a signed challenge
    pub fn from_signed(signed: &SignedChallenge) -> Result<Self> {
        let challenge = &signed.challenge;
        let signature = signature_type(challenge.chain)?;

        let header = match challenge.chain {
            Chain::Evm => "eip4361",
            _ => "caip122",
        };

        Ok(Self {
            h: CacaoHeader {
                t: header.to_string(),
            },
            p: CacaoPayload {
                domain: challenge.domain.clone(),
                iss: format!(
                    "did:pkh:{}:{}:{}",
                    challenge.chain.namespace(),
                    challenge.chain_id,
                    challenge.address
                ),
                aud: challenge.uri.clone(),
                version: challenge.version.clone(),
                nonce: challenge.nonce.clone(),
                iat: timestamp(&challenge.issued_at),
                exp: Some(timestamp(&challenge.expiration_time)),
                statement: Some(challenge.statement.clone()),
                resources: Some(challenge.resources.clone()),
            },
            s: Some(CacaoSignature {
                t: signature.to_string(),
                s: signed.signature.clone(),
            }),
        })
    }

    /// Wallet DID that issued the credential
    pub fn issuer(&self) -> &str {
        &self.p.iss
    }

    /// Session key DID the credential was issued to
    pub fn audience(&self) -> &str {
        &self.p.aud
    }

    /// Chain of the issuer
    pub fn chain(&self) -> Result<Chain> {
        Ok(did_to_address(self.issuer())?.chain)
    }

    /// Parsed expiration time, `None` for credentials without expiry
    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.p
            .exp
            .as_deref()
            .map(|exp| {
                DateTime::parse_from_rfc3339(exp)
                    .map(|time| time.with_timezone(&Utc))
                    .map_err(|e| OrbisError::Session(format!("Invalid expiration time {}: {}", exp, e)))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::siwx::{SiwxChallenge, SiwxContext, SiwxOverrides, SiwxResource};
    use chrono::TimeZone;

    fn signed(chain: Chain, address: &str) -> SignedChallenge {
        let overrides = SiwxOverrides {
            uri: Some("did:key:z6Mkabc".to_string()),
            issued_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let challenge = SiwxChallenge::create(
            address,
            chain,
            &[SiwxResource::storage()],
            &overrides,
            &SiwxContext::default(),
        )
        .unwrap();

        SignedChallenge {
            challenge,
            signature: "0xsig".to_string(),
        }
    }

    #[test]
    fn test_from_signed_evm() {
        let cacao = Cacao::from_signed(&signed(Chain::Evm, "0xabc")).unwrap();

        assert_eq!(cacao.h.t, "eip4361");
        assert_eq!(cacao.issuer(), "did:pkh:eip155:1:0xabc");
        assert_eq!(cacao.audience(), "did:key:z6Mkabc");
        assert_eq!(cacao.p.iat, "2024-01-01T00:00:00.000Z");
        assert_eq!(cacao.s.as_ref().unwrap().t, "eip191");
        assert_eq!(cacao.chain().unwrap(), Chain::Evm);
        assert_eq!(
            cacao.expires_at().unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_from_signed_other_chains() {
        let cacao = Cacao::from_signed(&signed(Chain::Tezos, "tz1abc")).unwrap();
        assert_eq!(cacao.h.t, "caip122");
        assert_eq!(cacao.issuer(), "did:pkh:tezos:NetXdQprcVkpaWU:tz1abc");
        assert_eq!(cacao.s.unwrap().t, "tezos:ed25519");

        let err = Cacao::from_signed(&signed(Chain::Stacks, "SP1")).unwrap_err();
        assert!(matches!(err, OrbisError::UnsupportedChain(_)));
    }

    #[test]
    fn test_invalid_expiration() {
        let mut cacao = Cacao::from_signed(&signed(Chain::Solana, "abc")).unwrap();
        cacao.p.exp = Some("yesterday".to_string());
        assert!(matches!(cacao.expires_at(), Err(OrbisError::Session(_))));

        cacao.p.exp = None;
        assert_eq!(cacao.expires_at().unwrap(), None);
    }
}
