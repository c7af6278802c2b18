//! Cryptographic helpers
//!
//! Only the input/output contracts the SDK needs: EIP-55 address
//! checksumming, `did:key` derivation from a session seed, EdDSA JWS for
//! request authentication, and random seeds and nonces. Wallet signatures
//! are verified by the node.

mod checksum;
mod jws;
mod key;

pub use checksum::to_checksum_address;
pub use jws::{CompactJws, VerifiedJws};
pub use key::{
    did_key_from_seed, generate_seed, seed_from_hex, verifying_key_from_did_key, SEED_LENGTH,
};

use constant_time_eq::constant_time_eq;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of challenge nonces
pub const NONCE_LENGTH: usize = 10;

/// Generate a random alphanumeric nonce
pub fn random_nonce(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Compare two identifiers in constant time
pub fn identifiers_match(expected: &str, actual: &str) -> bool {
    constant_time_eq(expected.as_bytes(), actual.as_bytes())
}
