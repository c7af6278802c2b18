//! Authentication state machine
//!
//! ```text
//! Unauthenticated -> Connecting -> Challenged -> Signed -> Credentialed -> Active
//!        ^                                                                  |
//!        +------------------- clear / failure / abandon --------------------+
//! ```
//!
//! Key DID authentication goes from `Connecting` straight to `Active`.
//! At most one session is held at a time; switching identity requires
//! [`SessionManager::clear_session`] first.

use log::{debug, info, warn};
use orbis_core::chain::{did_to_address, ChainIdentity};
use orbis_core::crypto::{did_key_from_seed, generate_seed};
use orbis_core::session::{Cacao, CredentialedSession, Session};
use orbis_core::siwx::{SiwxChallenge, SiwxContext, SiwxOverrides};
use orbis_core::{Chain, OrbisError};
use std::fmt;

use super::Authenticator;
use crate::error::{ClientError, Result};

/// Authentication progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No session
    Unauthenticated,
    /// Wallet connection in progress
    Connecting,
    /// Challenge built, waiting for the signature
    Challenged,
    /// Challenge signed
    Signed,
    /// Credential derived
    Credentialed,
    /// Session usable
    Active,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks an in-flight authorization
///
/// Dropping it before [`Transition::complete`] (error or abandoned future)
/// puts the machine back to `Unauthenticated`.
struct Transition<'a> {
    state: &'a mut AuthState,
    completed: bool,
}

impl<'a> Transition<'a> {
    fn begin(state: &'a mut AuthState) -> Self {
        *state = AuthState::Connecting;
        debug!("Auth state: {}", state);
        Self {
            state,
            completed: false,
        }
    }

    fn advance(&mut self, next: AuthState) {
        debug!("Auth state: {} -> {}", self.state, next);
        *self.state = next;
    }

    fn complete(mut self) {
        self.advance(AuthState::Active);
        self.completed = true;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if !self.completed {
            warn!("Authorization interrupted in state {}", self.state);
            *self.state = AuthState::Unauthenticated;
        }
    }
}

/// Holds the single active session of a client
#[derive(Debug)]
pub struct SessionManager {
    state: AuthState,
    session: Option<Session>,
    identity: Option<ChainIdentity>,
    context: SiwxContext,
}

impl SessionManager {
    /// Create a manager issuing challenges with the given context
    pub fn new(context: SiwxContext) -> Self {
        Self {
            state: AuthState::Unauthenticated,
            session: None,
            identity: None,
            context,
        }
    }

    /// Current state
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Active session
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Identity of the active session
    pub fn identity(&self) -> Option<&ChainIdentity> {
        self.identity.as_ref()
    }

    /// Whether a session is active
    pub fn is_active(&self) -> bool {
        self.state == AuthState::Active && self.session.is_some()
    }

    /// Run an authenticator to obtain a session
    ///
    /// Fails if a session is already held.
    pub async fn authorize(
        &mut self,
        authenticator: &Authenticator,
        overrides: Option<&SiwxOverrides>,
    ) -> Result<&Session> {
        if self.session.is_some() {
            return Err(OrbisError::Session(
                "A session is already active, clear it before authorizing again".to_string(),
            )
            .into());
        }

        let mut transition = Transition::begin(&mut self.state);

        let (session, identity) = match authenticator {
            Authenticator::KeyDid(authenticator) => {
                (authenticator.authenticate(), authenticator.identity())
            }
            Authenticator::Siwx(authenticator) => {
                let identity = authenticator.get_user_information().await?;
                let chain = identity.chain;
                let address = identity
                    .address()
                    .ok_or_else(|| ClientError::Provider("Wallet returned no address".to_string()))?
                    .to_string();

                let key_seed = generate_seed();
                let mut overrides = overrides.cloned().unwrap_or_default();
                overrides.uri = Some(did_key_from_seed(&key_seed));
                if chain == Chain::Evm {
                    overrides.address = Some(address.to_lowercase());
                }

                let challenge = SiwxChallenge::create(
                    &address,
                    chain,
                    authenticator.resources(),
                    &overrides,
                    &self.context,
                )?;
                transition.advance(AuthState::Challenged);

                let mut signed = authenticator.sign_challenge(challenge).await?;
                if chain == Chain::Tezos {
                    let public_key = identity.public_key().ok_or_else(|| {
                        ClientError::Provider("Missing Tezos public key".to_string())
                    })?;
                    signed.append_public_key(public_key);
                }
                transition.advance(AuthState::Signed);

                let cacao = Cacao::from_signed(&signed)?;
                transition.advance(AuthState::Credentialed);

                let session = Session::Credentialed(CredentialedSession::new(key_seed, cacao));

                // The chain reference may be overridden, only chain and address must match
                let issuer = did_to_address(session.did())?;
                let same_address = match chain {
                    Chain::Evm => issuer.address.eq_ignore_ascii_case(&address),
                    _ => issuer.address == address,
                };
                if issuer.chain != chain || !same_address {
                    return Err(OrbisError::Session(format!(
                        "Credential issuer {} does not match {}",
                        session.did(),
                        identity.did
                    ))
                    .into());
                }

                let identity = ChainIdentity {
                    did: session.did().to_string(),
                    ..identity
                };
                (session, identity)
            }
        };

        transition.complete();
        info!("Authorized {} ({})", identity.did, identity.chain);

        self.identity = Some(identity);
        Ok(self.session.insert(session))
    }

    /// Resume a serialized session
    ///
    /// Any failure clears the held session before it is returned.
    pub fn set_session(&mut self, serialized: &str, expected_did: Option<&str>) -> Result<&Session> {
        let resumed = Session::resume(serialized, expected_did)
            .and_then(|session| Ok((session.identity()?, session)));

        match resumed {
            Ok((identity, session)) => {
                info!("Resumed {} session for {}", session.session_type(), identity.did);
                self.state = AuthState::Active;
                self.identity = Some(identity);
                Ok(self.session.insert(session))
            }
            Err(err) => {
                warn!("Rejected session: {}", err);
                self.clear_session();
                Err(err.into())
            }
        }
    }

    /// Drop the held session
    pub fn clear_session(&mut self) {
        if let Some(identity) = self.identity.take() {
            info!("Cleared session of {}", identity.did);
        }
        self.session = None;
        self.state = AuthState::Unauthenticated;
    }

    /// Whether the active session belongs to the DID
    pub fn assert_current_user(&self, did: &str) -> bool {
        self.is_active() && self.session.as_ref().map_or(false, |s| s.did() == did)
    }
}
