//! Ed25519 `did:key` derivation

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;

use crate::error::{OrbisError, Result};

/// Length of a session key seed in bytes
pub const SEED_LENGTH: usize = 32;

/// Multicodec prefix of an Ed25519 public key
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Generate a fresh random seed
pub fn generate_seed() -> [u8; SEED_LENGTH] {
    let mut seed = [0u8; SEED_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    seed
}

/// Decode a hex encoded seed
pub fn seed_from_hex(seed: &str) -> Result<[u8; SEED_LENGTH]> {
    let bytes = hex::decode(seed.trim_start_matches("0x"))?;
    bytes.as_slice().try_into().map_err(|_| {
        OrbisError::Session(format!(
            "Invalid seed length {}, expected {} bytes",
            bytes.len(),
            SEED_LENGTH
        ))
    })
}

/// Derive the `did:key` DID controlled by a seed
pub fn did_key_from_seed(seed: &[u8; SEED_LENGTH]) -> String {
    let public_key = SigningKey::from_bytes(seed).verifying_key().to_bytes();

    let mut multicodec = Vec::with_capacity(ED25519_MULTICODEC.len() + public_key.len());
    multicodec.extend_from_slice(&ED25519_MULTICODEC);
    multicodec.extend_from_slice(&public_key);

    format!("did:key:z{}", bs58::encode(multicodec).into_string())
}

/// Ed25519 public key of a `did:key` DID, a `#fragment` is ignored
pub fn verifying_key_from_did_key(did: &str) -> Result<VerifyingKey> {
    let invalid =
        |reason: &str| OrbisError::Validation(format!("Invalid key DID {}: {}", did, reason));

    let did = did.split('#').next().unwrap_or(did);
    let encoded = did
        .strip_prefix("did:key:z")
        .ok_or_else(|| invalid("expected a base58btc did:key"))?;
    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| invalid(&e.to_string()))?;

    let public_key: [u8; 32] = decoded
        .strip_prefix(&ED25519_MULTICODEC[..])
        .and_then(|key| key.try_into().ok())
        .ok_or_else(|| invalid("not an Ed25519 key"))?;

    VerifyingKey::from_bytes(&public_key).map_err(|e| invalid(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_key_from_seed() {
        let seed = [7u8; SEED_LENGTH];
        let did = did_key_from_seed(&seed);

        assert!(did.starts_with("did:key:z6Mk"));
        assert_eq!(did, did_key_from_seed(&seed));
        assert_ne!(did, did_key_from_seed(&[8u8; SEED_LENGTH]));

        // The fragment decodes back to the multicodec public key
        let decoded = bs58::decode(&did["did:key:z".len()..]).into_vec().unwrap();
        assert_eq!(&decoded[..2], &ED25519_MULTICODEC);
        assert_eq!(decoded.len(), 34);
    }

    #[test]
    fn test_verifying_key_from_did_key() {
        let seed = [7u8; SEED_LENGTH];
        let did = did_key_from_seed(&seed);
        let expected = SigningKey::from_bytes(&seed).verifying_key();

        assert_eq!(verifying_key_from_did_key(&did).unwrap(), expected);

        let fragment = did.trim_start_matches("did:key:");
        let kid = format!("{}#{}", did, fragment);
        assert_eq!(verifying_key_from_did_key(&kid).unwrap(), expected);

        assert!(verifying_key_from_did_key("did:pkh:eip155:1:0xabc").is_err());
        assert!(verifying_key_from_did_key("did:key:z0OIl").is_err());
        assert!(verifying_key_from_did_key("did:key:z6Mk").is_err());
    }

    #[test]
    fn test_seed_hex() {
        let seed = generate_seed();
        assert_eq!(seed_from_hex(&hex::encode(seed)).unwrap(), seed);
        assert!(matches!(seed_from_hex("abcd"), Err(OrbisError::Session(_))));
        assert!(matches!(seed_from_hex("zz"), Err(OrbisError::Hex(_))));
        assert_ne!(generate_seed(), generate_seed());
    }
}
