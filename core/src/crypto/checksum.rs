//! EIP-55 mixed-case address checksum

use sha3::{Digest, Keccak256};

/// Checksum an EVM address
///
/// The address is lower-cased, the lowercase hex string (without `0x`) is
/// hashed with Keccak-256, and every character whose hash nibble is greater
/// than 7 is upper-cased. Input may be lowercase, uppercase or already
/// checksummed.
pub fn to_checksum_address(address: &str) -> String {
    let stripped = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address)
        .to_lowercase();

    let hash = hex::encode(Keccak256::digest(stripped.as_bytes()));

    let mut checksummed = String::with_capacity(stripped.len() + 2);
    checksummed.push_str("0x");

    for (character, nibble) in stripped.chars().zip(hash.chars()) {
        if nibble.to_digit(16).unwrap_or(0) > 7 {
            checksummed.push(character.to_ascii_uppercase());
        } else {
            checksummed.push(character);
        }
    }

    checksummed
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;
    use ethers::utils::to_checksum;
    use std::str::FromStr;

    const KNOWN: [&str; 4] = [
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
        "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
        "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
    ];

    #[test]
    fn test_known_vectors() {
        for expected in KNOWN {
            assert_eq!(to_checksum_address(&expected.to_lowercase()), expected);
            assert_eq!(to_checksum_address(expected), expected);
            assert_eq!(
                to_checksum_address(&expected[2..].to_uppercase()),
                expected
            );
        }
    }

    #[test]
    fn test_matches_ethers() {
        for address in [
            "0xdbcf111ca51572e2f924587faeab857f1e3b824f",
            "0x0000000000000000000000000000000000000000",
            "0xffffffffffffffffffffffffffffffffffffffff",
        ] {
            let parsed = Address::from_str(address).unwrap();
            assert_eq!(to_checksum_address(address), to_checksum(&parsed, None));
        }
    }
}
