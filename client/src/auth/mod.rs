//! Authenticators
//!
//! An [`Authenticator`] is either wallet backed ([`SiwxAuthenticator`]),
//! producing a credentialed session through a signed challenge, or seed
//! backed ([`KeyDidAuthenticator`]), producing a `did:key` session directly.
//! The [`SessionManager`] drives both through the authentication states.
//! [`AuthHeaders`] authenticate requests made on behalf of a session.

mod headers;
mod state;

pub use headers::{AuthHeaders, AUTH_DID_HEADER, AUTH_SIGNATURE_HEADER, AUTH_TIMESTAMP_HEADER};
pub use state::{AuthState, SessionManager};

use log::debug;
use orbis_core::chain::{did_pkh, ChainIdentity};
use orbis_core::crypto::{generate_seed, seed_from_hex, SEED_LENGTH};
use orbis_core::session::{KeyDidSession, Session};
use orbis_core::siwx::{SignedChallenge, SiwxChallenge, SiwxResource};
use orbis_core::{Chain, OrbisError};
use std::sync::Arc;

use crate::error::{ClientError, Result};
use crate::providers::{normalize_provider, GenericSigner, WalletProvider};

/// Wallet backed authenticator
#[derive(Clone)]
pub struct SiwxAuthenticator {
    signer: Arc<dyn GenericSigner>,
    resources: Vec<SiwxResource>,
}

impl std::fmt::Debug for SiwxAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiwxAuthenticator")
            .field("chain", &self.chain())
            .field("resources", &self.resources)
            .finish()
    }
}

impl SiwxAuthenticator {
    /// Authenticate a wallet for document storage
    pub fn new(provider: WalletProvider) -> Self {
        Self {
            signer: normalize_provider(provider),
            resources: vec![SiwxResource::storage()],
        }
    }

    /// Replace the requested resources
    pub fn with_resources(mut self, resources: Vec<SiwxResource>) -> Self {
        self.resources = resources;
        self
    }

    /// Chain of the wallet
    pub fn chain(&self) -> Chain {
        self.signer.chain()
    }

    /// Requested resources
    pub fn resources(&self) -> &[SiwxResource] {
        &self.resources
    }

    /// Connect the wallet and derive the user identity
    pub async fn get_user_information(&self) -> Result<ChainIdentity> {
        self.signer.connect().await?;

        let chain = self.chain();
        let address = self.signer.get_address().await?;
        let mut identity =
            ChainIdentity::new(did_pkh(chain, &address), chain).with_metadata("address", address);

        if chain == Chain::Tezos {
            let public_key = self.signer.public_key().await?.ok_or_else(|| {
                ClientError::Provider("Tezos wallet did not expose a public key".to_string())
            })?;
            identity = identity.with_metadata("publicKey", public_key);
        }

        Ok(identity)
    }

    /// Have the wallet sign a challenge
    pub async fn sign_challenge(&self, challenge: SiwxChallenge) -> Result<SignedChallenge> {
        debug!("Requesting {} signature", challenge.chain);
        let signature = self
            .signer
            .sign_message(&challenge.signable_payload())
            .await?;

        Ok(SignedChallenge {
            challenge,
            signature,
        })
    }
}

/// Seed backed authenticator
#[derive(Debug, Clone)]
pub struct KeyDidAuthenticator {
    session: KeyDidSession,
}

impl KeyDidAuthenticator {
    /// Authenticate with a fresh random seed
    pub fn create_random() -> Self {
        Self::from_seed(generate_seed())
    }

    /// Authenticate with a known seed
    pub fn from_seed(seed: [u8; SEED_LENGTH]) -> Self {
        Self {
            session: KeyDidSession::from_seed(seed),
        }
    }

    /// Authenticate with a hex encoded seed
    pub fn from_seed_hex(seed: &str) -> Result<Self> {
        Ok(Self::from_seed(seed_from_hex(seed)?))
    }

    /// Authenticate with the seed of a serialized key DID session
    pub fn from_session(serialized: &str) -> Result<Self> {
        match Session::parse(serialized)? {
            Session::KeyDid(session) => {
                session.verify()?;
                Ok(Self { session })
            }
            other => Err(OrbisError::Session(format!(
                "Incorrect session type {}",
                other.session_type()
            ))
            .into()),
        }
    }

    /// DID of the authenticator
    pub fn did(&self) -> &str {
        self.session.did()
    }

    /// Identity of the authenticator
    pub fn identity(&self) -> ChainIdentity {
        ChainIdentity::new(self.session.did(), Chain::Evm)
            .with_metadata("publicKey", self.session.public_key())
    }

    /// Session of the authenticator
    pub fn authenticate(&self) -> Session {
        Session::KeyDid(self.session.clone())
    }
}

/// Any supported authenticator
#[derive(Debug, Clone)]
pub enum Authenticator {
    /// Wallet signed challenge
    Siwx(SiwxAuthenticator),
    /// Seed derived `did:key`
    KeyDid(KeyDidAuthenticator),
}

impl From<SiwxAuthenticator> for Authenticator {
    fn from(authenticator: SiwxAuthenticator) -> Self {
        Authenticator::Siwx(authenticator)
    }
}

impl From<KeyDidAuthenticator> for Authenticator {
    fn from(authenticator: KeyDidAuthenticator) -> Self {
        Authenticator::KeyDid(authenticator)
    }
}

impl Authenticator {
    /// Identity the authenticator would sign in as
    pub async fn get_user_information(&self) -> Result<ChainIdentity> {
        match self {
            Authenticator::Siwx(authenticator) => authenticator.get_user_information().await,
            Authenticator::KeyDid(authenticator) => Ok(authenticator.identity()),
        }
    }
}
