//! Compact EdDSA JWS signed by `did:key` session keys

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::key::{did_key_from_seed, verifying_key_from_did_key, SEED_LENGTH};
use crate::error::{OrbisError, Result};

const ALGORITHM: &str = "EdDSA";

#[derive(Debug, Serialize, Deserialize)]
struct ProtectedHeader {
    alg: String,
    kid: String,
}

/// Signed JSON payload, each part base64url encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactJws {
    /// Payload
    pub payload: String,
    /// Protected header
    pub protected: String,
    /// Signature over `protected.payload`
    pub signature: String,
}

/// Payload of a verified JWS and the key DID that signed it
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedJws {
    /// DID of the signing key, without fragment
    pub signer: String,
    /// Decoded payload
    pub payload: Value,
}

fn signing_input(protected: &str, payload: &str) -> String {
    format!("{}.{}", protected, payload)
}

fn malformed(reason: impl std::fmt::Display) -> OrbisError {
    OrbisError::Validation(format!("Malformed JWS: {}", reason))
}

impl CompactJws {
    /// Sign a JSON payload with a session seed
    ///
    /// The `kid` header is the `did:key` of the seed with its key fragment.
    pub fn sign(seed: &[u8; SEED_LENGTH], payload: &Value) -> Result<Self> {
        let did = did_key_from_seed(seed);
        let fragment = did.trim_start_matches("did:key:");
        let header = ProtectedHeader {
            alg: ALGORITHM.to_string(),
            kid: format!("{}#{}", did, fragment),
        };

        let protected = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);
        let signature =
            SigningKey::from_bytes(seed).sign(signing_input(&protected, &payload).as_bytes());

        Ok(Self {
            payload,
            protected,
            signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
        })
    }

    /// Check the signature against the key named by the header
    pub fn verify(&self) -> Result<VerifiedJws> {
        let header: ProtectedHeader =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(&self.protected)?)
                .map_err(malformed)?;
        if header.alg != ALGORITHM {
            return Err(malformed(format!("unsupported algorithm {}", header.alg)));
        }

        let key = verifying_key_from_did_key(&header.kid)?;
        let signature =
            Signature::from_slice(&URL_SAFE_NO_PAD.decode(&self.signature)?).map_err(malformed)?;

        key.verify(
            signing_input(&self.protected, &self.payload).as_bytes(),
            &signature,
        )
        .map_err(|_| OrbisError::Validation("JWS signature does not verify".to_string()))?;

        let payload = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(&self.payload)?)
            .map_err(malformed)?;
        let signer = header.kid.split('#').next().unwrap_or(&header.kid).to_string();

        Ok(VerifiedJws { signer, payload })
    }

    /// Parse the `payload.protected.signature` form
    pub fn from_payload_first(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split('.').collect();
        match parts.as_slice() {
            [payload, protected, signature] => Ok(Self {
                payload: payload.to_string(),
                protected: protected.to_string(),
                signature: signature.to_string(),
            }),
            _ => Err(malformed(format!("expected 3 parts, got {}", parts.len()))),
        }
    }

    /// Render as `payload.protected.signature`
    pub fn to_payload_first(&self) -> String {
        format!("{}.{}.{}", self.payload, self.protected, self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SEED: [u8; SEED_LENGTH] = [3u8; SEED_LENGTH];

    #[test]
    fn test_sign_and_verify() {
        let payload = json!({
            "x-orbis-auth-timestamp": "1700000000000",
            "x-orbis-auth-did": "did:key:z6Mk"
        });
        let jws = CompactJws::sign(&SEED, &payload).unwrap();

        let verified = jws.verify().unwrap();
        assert_eq!(verified.payload, payload);
        assert_eq!(verified.signer, did_key_from_seed(&SEED));

        let parsed = CompactJws::from_payload_first(&jws.to_payload_first()).unwrap();
        assert_eq!(parsed, jws);
    }

    #[test]
    fn test_tampering_is_detected() {
        let jws = CompactJws::sign(&SEED, &json!({ "did": "did:key:a" })).unwrap();

        let forged = CompactJws {
            payload: URL_SAFE_NO_PAD.encode(br#"{"did":"did:key:b"}"#),
            ..jws.clone()
        };
        assert!(matches!(forged.verify(), Err(OrbisError::Validation(_))));

        let other = CompactJws::sign(&[4u8; SEED_LENGTH], &json!({ "did": "did:key:a" })).unwrap();
        let swapped = CompactJws {
            signature: other.signature,
            ..jws
        };
        assert!(swapped.verify().is_err());
    }

    #[test]
    fn test_malformed_input() {
        assert!(CompactJws::from_payload_first("a.b").is_err());
        assert!(CompactJws::from_payload_first("a.b.c.d").is_err());

        let garbage = CompactJws::from_payload_first("e30.e30.AAAA").unwrap();
        assert!(garbage.verify().is_err());
    }
}
