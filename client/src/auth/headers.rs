//! Signed request headers
//!
//! The timestamp and DID headers are signed together with the session key.
//! The signature header carries the JWS as `payload.protected.signature`.

use chrono::{DateTime, Utc};
use orbis_core::crypto::CompactJws;
use orbis_core::session::Session;
use orbis_core::OrbisError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;

/// Header holding the signing time in milliseconds
pub const AUTH_TIMESTAMP_HEADER: &str = "x-orbis-auth-timestamp";

/// Header holding the DID of the user
pub const AUTH_DID_HEADER: &str = "x-orbis-auth-did";

/// Header holding the JWS over the two other headers
pub const AUTH_SIGNATURE_HEADER: &str = "x-orbis-auth-signature";

/// Authentication headers of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthHeaders {
    /// Signing time in milliseconds since the epoch
    #[serde(rename = "x-orbis-auth-timestamp")]
    pub timestamp: String,

    /// DID of the user
    #[serde(rename = "x-orbis-auth-did")]
    pub did: String,

    /// JWS over timestamp and DID
    #[serde(rename = "x-orbis-auth-signature")]
    pub signature: String,
}

fn signed_payload(timestamp: &str, did: &str) -> Value {
    json!({
        AUTH_TIMESTAMP_HEADER: timestamp,
        AUTH_DID_HEADER: did,
    })
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        OrbisError::Validation(format!("Invalid auth header value {}: {}", value, e)).into()
    })
}

impl AuthHeaders {
    /// Sign headers for a DID with the session key
    pub fn sign(session: &Session, did: &str, at: DateTime<Utc>) -> Result<Self> {
        let timestamp = at.timestamp_millis().to_string();
        let jws = session.create_jws(&signed_payload(&timestamp, did))?;

        Ok(Self {
            timestamp,
            did: did.to_string(),
            signature: jws.to_payload_first(),
        })
    }

    /// Check that the session key signed exactly these header values
    pub fn verify(&self, session: &Session) -> Result<()> {
        let jws = CompactJws::from_payload_first(&self.signature)?;
        let payload = session.verify_jws(&jws)?;

        if payload != signed_payload(&self.timestamp, &self.did) {
            return Err(OrbisError::Validation(
                "Auth headers do not match their signature".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Headers ready to be attached to a request
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(AUTH_TIMESTAMP_HEADER),
            header_value(&self.timestamp)?,
        );
        headers.insert(HeaderName::from_static(AUTH_DID_HEADER), header_value(&self.did)?);
        headers.insert(
            HeaderName::from_static(AUTH_SIGNATURE_HEADER),
            header_value(&self.signature)?,
        );
        Ok(headers)
    }

    /// Read the headers of an incoming request
    pub fn from_header_map(headers: &HeaderMap) -> Result<Self> {
        let get = |name: &str| -> Result<String> {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    OrbisError::Validation(format!("Missing or invalid {} header", name)).into()
                })
        };

        Ok(Self {
            timestamp: get(AUTH_TIMESTAMP_HEADER)?,
            did: get(AUTH_DID_HEADER)?,
            signature: get(AUTH_SIGNATURE_HEADER)?,
        })
    }
}
