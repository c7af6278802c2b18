//! Text rendering of challenges

use chrono::SecondsFormat;

use super::SiwxChallenge;
use crate::chain::Chain;

/// Encode a message as a Tezos micheline string payload
///
/// `05` (packed data) + `01` (string tag) + 4-byte big-endian length + bytes.
pub fn micheline_payload(message: &str) -> String {
    let bytes = message.as_bytes();
    format!("0501{:08x}{}", bytes.len(), hex::encode(bytes))
}

impl SiwxChallenge {
    /// Render the challenge as the multi-line sign-in message
    pub fn to_message(&self) -> String {
        let mut lines = vec![
            format!(
                "{} wants you to sign in with your {} account:",
                self.domain,
                self.chain.account_name()
            ),
            self.address.clone(),
            String::new(),
            self.statement.clone(),
            String::new(),
            format!("URI: {}", self.uri),
            format!("Version: {}", self.version),
            format!("Chain ID: {}", self.chain_id),
            format!("Nonce: {}", self.nonce),
            format!(
                "Issued At: {}",
                self.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            format!(
                "Expiration Time: {}",
                self.expiration_time
                    .to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
        ];

        if !self.resources.is_empty() {
            lines.push("Resources:".to_string());
            lines.extend(self.resources.iter().map(|resource| format!("- {}", resource)));
        }

        lines.join("\n")
    }

    /// Payload handed to the wallet for signing
    pub fn signable_payload(&self) -> String {
        match self.chain {
            Chain::Tezos => micheline_payload(&self.to_message()),
            _ => self.to_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::siwx::{SiwxContext, SiwxOverrides, SiwxResource};
    use chrono::{TimeZone, Utc};

    fn challenge(chain: Chain) -> SiwxChallenge {
        let overrides = SiwxOverrides {
            domain: Some("app.example".to_string()),
            uri: Some("did:key:z6Mkabc".to_string()),
            nonce: Some("abcdefghij".to_string()),
            issued_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            expiration_time: Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        SiwxChallenge::create(
            "0xabc",
            chain,
            &[SiwxResource::storage()],
            &overrides,
            &SiwxContext::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_message_text() {
        let expected = "app.example wants you to sign in with your Ethereum account:\n\
                        0xabc\n\
                        \n\
                        Give this application access to some of your data on Ceramic Network.\n\
                        \n\
                        URI: did:key:z6Mkabc\n\
                        Version: 1\n\
                        Chain ID: 1\n\
                        Nonce: abcdefghij\n\
                        Issued At: 2024-01-01T00:00:00.000Z\n\
                        Expiration Time: 2024-04-01T00:00:00.000Z\n\
                        Resources:\n\
                        - ceramic://*";

        let evm = challenge(Chain::Evm);
        assert_eq!(evm.to_message(), expected);
        assert_eq!(evm.signable_payload(), expected);

        let solana = challenge(Chain::Solana);
        assert!(solana
            .to_message()
            .starts_with("app.example wants you to sign in with your Solana account:"));
    }

    #[test]
    fn test_micheline_payload() {
        assert_eq!(micheline_payload("hi"), "0501000000026869");

        let tezos = challenge(Chain::Tezos);
        let payload = tezos.signable_payload();
        let message = tezos.to_message();
        assert!(payload.starts_with("0501"));
        assert_eq!(
            usize::from_str_radix(&payload[4..12], 16).unwrap(),
            message.len()
        );
        assert_eq!(hex::decode(&payload[12..]).unwrap(), message.as_bytes());
    }
}
