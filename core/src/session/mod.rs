//! DID sessions
//!
//! Two kinds of sessions exist:
//!
//! - [`KeyDidSession`]: a bare `did:key` derived from a 32-byte seed, used
//!   for service and bot identities.
//! - [`CredentialedSession`]: a throwaway session key bound to a wallet DID
//!   by a [`Cacao`], valid until the credential expires.
//!
//! Both serialize to an opaque base64 string. Parsing only decodes the
//! structure; [`Session::validate`] performs the integrity, expiry and
//! identity checks required before a session is used.

mod cacao;

pub use cacao::{Cacao, CacaoHeader, CacaoPayload, CacaoSignature};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::chain::{parse_identity_from_did, Chain, ChainIdentity};
use crate::crypto::{
    did_key_from_seed, identifiers_match, seed_from_hex, CompactJws, SEED_LENGTH,
};
use crate::error::{OrbisError, Result};

/// Prefix of legacy serialized key-DID sessions
const LEGACY_KEY_DID_PREFIX: &str = "did:key:session";

/// Session kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    /// Seed backed `did:key`
    KeyDid,
    /// Wallet backed credential
    CacaoDid,
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionType::KeyDid => write!(f, "key-did"),
            SessionType::CacaoDid => write!(f, "cacao-did"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "sessionType")]
enum Envelope {
    #[serde(rename = "key-did")]
    KeyDid { did: String, seed: String },

    #[serde(rename = "cacao-did", rename_all = "camelCase")]
    CacaoDid { key_seed: String, cacao: Cacao },
}

fn session_seed(seed: &str) -> Result<[u8; SEED_LENGTH]> {
    seed_from_hex(seed).map_err(|e| OrbisError::Session(format!("Invalid session seed: {}", e)))
}

fn encode_envelope(envelope: &Envelope) -> Result<String> {
    Ok(STANDARD.encode(serde_json::to_vec(envelope)?))
}

/// Self-sovereign session backed by a seed
#[derive(Clone, PartialEq, Eq)]
pub struct KeyDidSession {
    seed: [u8; SEED_LENGTH],
    did: String,
}

impl fmt::Debug for KeyDidSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDidSession")
            .field("did", &self.did)
            .finish_non_exhaustive()
    }
}

impl KeyDidSession {
    /// Derive the session of a seed
    pub fn from_seed(seed: [u8; SEED_LENGTH]) -> Self {
        let did = did_key_from_seed(&seed);
        Self { seed, did }
    }

    /// Session DID
    pub fn did(&self) -> &str {
        &self.did
    }

    /// Seed bytes
    pub fn seed(&self) -> &[u8; SEED_LENGTH] {
        &self.seed
    }

    /// Hex encoded seed
    pub fn seed_hex(&self) -> String {
        hex::encode(self.seed)
    }

    /// Key fragment of the DID
    pub fn public_key(&self) -> &str {
        self.did.rsplit(':').next().unwrap_or(&self.did)
    }

    /// Check that the stored DID is the one controlled by the seed
    pub fn verify(&self) -> Result<()> {
        let derived = did_key_from_seed(&self.seed);
        if !identifiers_match(&derived, &self.did) {
            return Err(OrbisError::Session(format!(
                "Key DID {} does not match its seed",
                self.did
            )));
        }
        Ok(())
    }

    /// Serialize to the opaque session string
    pub fn serialize(&self) -> Result<String> {
        encode_envelope(&Envelope::KeyDid {
            did: self.did.clone(),
            seed: self.seed_hex(),
        })
    }
}

/// Wallet backed session
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialedSession {
    key_seed: [u8; SEED_LENGTH],
    cacao: Cacao,
}

impl fmt::Debug for CredentialedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialedSession")
            .field("did", &self.did())
            .field("cacao", &self.cacao)
            .finish_non_exhaustive()
    }
}

impl CredentialedSession {
    /// Bind a session key seed to its credential
    pub fn new(key_seed: [u8; SEED_LENGTH], cacao: Cacao) -> Self {
        Self { key_seed, cacao }
    }

    /// Wallet DID of the session
    pub fn did(&self) -> &str {
        self.cacao.issuer()
    }

    /// DID of the session key
    pub fn key_did(&self) -> String {
        did_key_from_seed(&self.key_seed)
    }

    /// Credential
    pub fn cacao(&self) -> &Cacao {
        &self.cacao
    }

    /// Whether the credential is signed and issued to this session key
    pub fn has_session(&self) -> bool {
        self.cacao.s.is_some() && identifiers_match(&self.key_did(), self.cacao.audience())
    }

    /// Whether the credential has expired at the given time
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .cacao
            .expires_at()?
            .map_or(false, |expiration| expiration < now))
    }

    /// Whether the credential has expired
    pub fn is_expired(&self) -> Result<bool> {
        self.is_expired_at(Utc::now())
    }

    /// Serialize to the opaque session string
    pub fn serialize(&self) -> Result<String> {
        encode_envelope(&Envelope::CacaoDid {
            key_seed: hex::encode(self.key_seed),
            cacao: self.cacao.clone(),
        })
    }
}

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    /// Seed backed session
    KeyDid(KeyDidSession),
    /// Wallet backed session
    Credentialed(CredentialedSession),
}

impl Session {
    /// Kind of the session
    pub fn session_type(&self) -> SessionType {
        match self {
            Session::KeyDid(_) => SessionType::KeyDid,
            Session::Credentialed(_) => SessionType::CacaoDid,
        }
    }

    /// DID acting through this session
    pub fn did(&self) -> &str {
        match self {
            Session::KeyDid(session) => session.did(),
            Session::Credentialed(session) => session.did(),
        }
    }

    /// Serialize to the opaque session string
    pub fn serialize(&self) -> Result<String> {
        match self {
            Session::KeyDid(session) => session.serialize(),
            Session::Credentialed(session) => session.serialize(),
        }
    }

    fn signing_seed(&self) -> &[u8; SEED_LENGTH] {
        match self {
            Session::KeyDid(session) => &session.seed,
            Session::Credentialed(session) => &session.key_seed,
        }
    }

    /// DID of the key signing on behalf of the session
    pub fn signing_did(&self) -> String {
        match self {
            Session::KeyDid(session) => session.did.clone(),
            Session::Credentialed(session) => session.key_did(),
        }
    }

    /// Sign a JSON payload with the session key
    pub fn create_jws(&self, payload: &Value) -> Result<CompactJws> {
        CompactJws::sign(self.signing_seed(), payload)
    }

    /// Verify a JWS signed by this session's key and return its payload
    pub fn verify_jws(&self, jws: &CompactJws) -> Result<Value> {
        let verified = jws.verify()?;
        let expected = self.signing_did();

        if !identifiers_match(&expected, &verified.signer) {
            return Err(OrbisError::Validation(format!(
                "JWS signed by {}, expected the session key {}",
                verified.signer, expected
            )));
        }

        Ok(verified.payload)
    }

    /// Identity of the user behind the session
    pub fn identity(&self) -> Result<ChainIdentity> {
        match self {
            Session::KeyDid(session) => Ok(ChainIdentity::new(session.did(), Chain::Evm)
                .with_metadata("publicKey", session.public_key())),
            Session::Credentialed(session) => parse_identity_from_did(session.did()),
        }
    }

    /// Check integrity, validity and, if given, the expected DID
    pub fn validate(&self, expected_did: Option<&str>) -> Result<()> {
        match self {
            Session::KeyDid(session) => session.verify()?,
            Session::Credentialed(session) => {
                if !session.has_session() {
                    return Err(OrbisError::Session(
                        "Invalid credentialed session".to_string(),
                    ));
                }
                if session.is_expired()? {
                    return Err(OrbisError::Session(format!(
                        "Session of {} expired",
                        session.did()
                    )));
                }
            }
        }

        if let Some(expected) = expected_did {
            if self.did() != expected {
                return Err(OrbisError::Session(format!(
                    "Session DID mismatch, expected {} got {}",
                    expected,
                    self.did()
                )));
            }
        }

        Ok(())
    }

    /// Decode a serialized session
    ///
    /// Plain JSON sessions from older releases (`{"session": {"session": ..}}`)
    /// are upgraded on the fly.
    pub fn parse(serialized: &str) -> Result<Self> {
        let decoded = STANDARD
            .decode(serialized.trim())
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok());

        match decoded {
            Some(value) => Self::from_envelope(value),
            None => Self::parse_legacy(serialized),
        }
    }

    /// Decode and validate a serialized session
    pub fn resume(serialized: &str, expected_did: Option<&str>) -> Result<Self> {
        let session = Self::parse(serialized)?;
        session.validate(expected_did)?;
        Ok(session)
    }

    fn from_envelope(value: Value) -> Result<Self> {
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| OrbisError::Session(format!("Invalid session envelope: {}", e)))?;

        match envelope {
            Envelope::KeyDid { did, seed } => Ok(Session::KeyDid(KeyDidSession {
                seed: session_seed(&seed)?,
                did,
            })),
            Envelope::CacaoDid { key_seed, cacao } => Ok(Session::Credentialed(
                CredentialedSession::new(session_seed(&key_seed)?, cacao),
            )),
        }
    }

    fn parse_legacy(serialized: &str) -> Result<Self> {
        let undecodable =
            || OrbisError::Session("Unable to decode the provided session".to_string());

        let legacy: Value = serde_json::from_str(serialized).map_err(|_| undecodable())?;
        let inner = legacy
            .get("session")
            .and_then(|session| session.get("session"))
            .and_then(Value::as_str)
            .ok_or_else(undecodable)?;

        warn!("Upgrading a legacy serialized session");

        if inner.starts_with(LEGACY_KEY_DID_PREFIX) {
            let seed = inner.rsplit(':').next().unwrap_or_default();
            debug!("Legacy session is a key DID session");
            return Ok(Session::KeyDid(KeyDidSession::from_seed(session_seed(seed)?)));
        }

        let decoded = STANDARD.decode(inner.trim()).map_err(|_| undecodable())?;
        Self::from_envelope(serde_json::from_slice(&decoded).map_err(|_| undecodable())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_seed;
    use crate::siwx::{SignedChallenge, SiwxChallenge, SiwxContext, SiwxOverrides, SiwxResource};
    use chrono::Duration;
    use rstest::rstest;

    fn credentialed(issued_at: DateTime<Utc>, validity: Duration) -> CredentialedSession {
        let seed = generate_seed();
        let overrides = SiwxOverrides {
            uri: Some(did_key_from_seed(&seed)),
            issued_at: Some(issued_at),
            expiration_time: Some(issued_at + validity),
            ..Default::default()
        };
        let challenge = SiwxChallenge::create(
            "0xabc",
            Chain::Evm,
            &[SiwxResource::storage()],
            &overrides,
            &SiwxContext::default(),
        )
        .unwrap();
        let cacao = Cacao::from_signed(&SignedChallenge {
            challenge,
            signature: "0xsig".to_string(),
        })
        .unwrap();

        CredentialedSession::new(seed, cacao)
    }

    #[test]
    fn test_key_did_round_trip() {
        let session = Session::KeyDid(KeyDidSession::from_seed(generate_seed()));
        let serialized = session.serialize().unwrap();

        let parsed = Session::resume(&serialized, Some(session.did())).unwrap();
        assert_eq!(parsed, session);
        assert_eq!(parsed.session_type(), SessionType::KeyDid);

        let identity = parsed.identity().unwrap();
        assert_eq!(identity.chain, Chain::Evm);
        assert!(session.did().ends_with(identity.public_key().unwrap()));
    }

    #[test]
    fn test_credentialed_round_trip() {
        let session = Session::Credentialed(credentialed(Utc::now(), Duration::days(1)));
        let serialized = session.serialize().unwrap();

        let parsed = Session::resume(&serialized, Some("did:pkh:eip155:1:0xabc")).unwrap();
        assert_eq!(parsed, session);
        assert_eq!(parsed.session_type(), SessionType::CacaoDid);
        assert_eq!(parsed.identity().unwrap().address(), Some("0xabc"));
    }

    #[test]
    fn test_jws_is_bound_to_the_session_key() {
        let payload = serde_json::json!({ "x-orbis-auth-did": "did:pkh:eip155:1:0xabc" });

        let credentialed = Session::Credentialed(credentialed(Utc::now(), Duration::days(1)));
        let jws = credentialed.create_jws(&payload).unwrap();
        assert_ne!(credentialed.signing_did(), credentialed.did());
        assert_eq!(credentialed.verify_jws(&jws).unwrap(), payload);

        let key_did = Session::KeyDid(KeyDidSession::from_seed(generate_seed()));
        assert_eq!(key_did.signing_did(), key_did.did());
        let err = key_did.verify_jws(&jws).unwrap_err();
        assert!(matches!(err, OrbisError::Validation(_)));
    }

    #[test]
    fn test_expired_session_is_rejected() {
        let session = credentialed(Utc::now() - Duration::days(2), Duration::days(1));
        assert!(session.is_expired().unwrap());
        assert!(session.has_session());

        let serialized = session.serialize().unwrap();
        let err = Session::resume(&serialized, None).unwrap_err();
        assert!(err.is_session_error());
    }

    #[test]
    fn test_mismatched_did_is_rejected() {
        let session = Session::Credentialed(credentialed(Utc::now(), Duration::days(1)));
        let err = session.validate(Some("did:pkh:eip155:1:0xdef")).unwrap_err();
        assert!(err.is_session_error());
    }

    #[test]
    fn test_tampered_sessions_are_rejected() {
        // Seed swapped under a foreign DID
        let forged = encode_envelope(&Envelope::KeyDid {
            did: did_key_from_seed(&[1u8; SEED_LENGTH]),
            seed: hex::encode([2u8; SEED_LENGTH]),
        })
        .unwrap();
        let err = Session::resume(&forged, None).unwrap_err();
        assert!(err.is_session_error());

        // Credential issued to another session key
        let original = credentialed(Utc::now(), Duration::days(1));
        let stolen = CredentialedSession::new(generate_seed(), original.cacao().clone());
        assert!(!stolen.has_session());
        assert!(Session::Credentialed(stolen).validate(None).is_err());
    }

    #[rstest]
    #[case("not a session")]
    #[case("e30=")]
    #[case("{\"session\": {}}")]
    #[case("eyJzZXNzaW9uVHlwZSI6Im90aGVyIn0=")]
    fn test_malformed_sessions(#[case] serialized: &str) {
        let err = Session::parse(serialized).unwrap_err();
        assert!(err.is_session_error(), "unexpected error {:?}", err);
    }

    #[test]
    fn test_legacy_key_did_session() {
        let seed = generate_seed();
        let legacy = serde_json::json!({
            "session": { "session": format!("did:key:session:{}", hex::encode(seed)) }
        })
        .to_string();

        let parsed = Session::parse(&legacy).unwrap();
        assert_eq!(parsed, Session::KeyDid(KeyDidSession::from_seed(seed)));
        parsed.validate(None).unwrap();
    }

    #[test]
    fn test_legacy_wrapped_session() {
        let session = Session::Credentialed(credentialed(Utc::now(), Duration::days(1)));
        let legacy = serde_json::json!({
            "session": { "session": session.serialize().unwrap() }
        })
        .to_string();

        assert_eq!(Session::parse(&legacy).unwrap(), session);
    }

    #[test]
    fn test_debug_hides_seed() {
        let session = KeyDidSession::from_seed([9u8; SEED_LENGTH]);
        let printed = format!("{:?}", session);
        assert!(!printed.contains(&session.seed_hex()));
        assert!(printed.contains(session.did()));
    }
}
