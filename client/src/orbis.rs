//! Application facing client
//!
//! [`OrbisClient`] ties the pieces together: it authenticates users into a
//! single session, hands that session to the document store, persists it
//! through a [`SessionStore`] and exposes the statement builders.

use chrono::Utc;
use log::{info, warn};
use orbis_core::session::Session;
use orbis_core::siwx::{SiwxContext, SiwxOverrides};
use orbis_core::{Chain, ChainIdentity, OrbisConfig};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::{AuthHeaders, Authenticator, SessionManager};
use crate::error::{ClientError, Result};
use crate::node::{OrbisNode, OrbisNodeManager};
use crate::statements::{
    BulkInsertStatement, InsertStatement, QueryBuilder, RawSelectStatement, SelectStatement,
    UpdateByIdStatement,
};
use crate::store::{DocumentStore, MemorySessionStore, SessionStore};

/// Options of [`OrbisClient::connect_user`]
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Persist the session through the session store
    pub save_session: bool,

    /// Challenge fields to force
    pub siwx_overrides: Option<SiwxOverrides>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            save_session: true,
            siwx_overrides: None,
        }
    }
}

/// Authenticated user and its session
#[derive(Debug, Clone)]
pub struct ConnectedUser {
    /// User identity
    pub user: ChainIdentity,

    /// Active session
    pub session: Session,
}

impl ConnectedUser {
    /// Chain of the user
    pub fn chain(&self) -> Chain {
        self.user.chain
    }

    /// DID of the user
    pub fn did(&self) -> &str {
        &self.user.did
    }
}

/// Whether an identity controls an address
fn identity_matches(identity: &ChainIdentity, address: &str) -> bool {
    match identity.address() {
        Some(own) if identity.chain == Chain::Evm => own.eq_ignore_ascii_case(address),
        Some(own) => own == address,
        None => false,
    }
}

/// Orbis SDK client
pub struct OrbisClient {
    config: OrbisConfig,
    nodes: Arc<OrbisNodeManager>,
    store: Arc<dyn DocumentStore>,
    session_store: Arc<dyn SessionStore>,
    sessions: Mutex<SessionManager>,
    query: QueryBuilder,
}

impl std::fmt::Debug for OrbisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrbisClient")
            .field("config", &self.config)
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

impl OrbisClient {
    /// Create a client writing to the given document store
    ///
    /// Sessions are kept in memory until [`OrbisClient::with_session_store`]
    /// installs a persistent store.
    pub fn new(config: OrbisConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        config.validate()?;

        let nodes = Arc::new(OrbisNodeManager::new(&config)?);
        let query = QueryBuilder::new(Arc::clone(&nodes), Arc::clone(&store));
        let sessions = Mutex::new(SessionManager::new(SiwxContext::from(&config.siwx)));

        Ok(Self {
            config,
            nodes,
            store,
            session_store: Arc::new(MemorySessionStore::new()),
            sessions,
            query,
        })
    }

    /// Persist sessions in another store
    pub fn with_session_store(mut self, session_store: Arc<dyn SessionStore>) -> Self {
        self.session_store = session_store;
        self
    }

    /// Configuration of the client
    pub fn config(&self) -> &OrbisConfig {
        &self.config
    }

    /// Every configured node
    pub fn nodes(&self) -> &[Arc<OrbisNode>] {
        self.nodes.nodes()
    }

    /// Active node
    pub fn node(&self) -> Arc<OrbisNode> {
        self.nodes.active()
    }

    /// Switch the active node
    pub fn set_active_node(&self, index: usize) -> Result<Arc<OrbisNode>> {
        self.nodes.set_active(index)
    }

    /// Document store of the client
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Statement builder
    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    fn storage_key(&self) -> &str {
        &self.config.session_storage_key
    }

    /// Authenticate a user
    ///
    /// Reuses the active session when it already belongs to the user,
    /// otherwise replaces it with a new one.
    pub async fn connect_user(
        &self,
        authenticator: &Authenticator,
        options: ConnectOptions,
    ) -> Result<ConnectedUser> {
        let user = authenticator.get_user_information().await?;
        let mut sessions = self.sessions.lock().await;

        if sessions.assert_current_user(&user.did) {
            info!("{} is already connected", user.did);
        } else {
            sessions.clear_session();
            sessions
                .authorize(authenticator, options.siwx_overrides.as_ref())
                .await?;
        }

        let session = sessions
            .session()
            .cloned()
            .ok_or_else(|| ClientError::NoSession("No session after authentication".to_string()))?;

        let user = sessions.identity().cloned().unwrap_or(user);

        self.store.set_session(Some(session.clone())).await?;

        if options.save_session {
            self.session_store
                .set_item(self.storage_key(), &session.serialize()?)
                .await?;
        }

        Ok(ConnectedUser { user, session })
    }

    /// Drop the session and its persisted copy
    pub async fn disconnect_user(&self) -> Result<()> {
        self.sessions.lock().await.clear_session();
        self.store.set_session(None).await?;
        self.session_store.remove_item(self.storage_key()).await
    }

    /// Whether a user is connected, optionally a specific address
    ///
    /// Without an active session the persisted one is resumed. Invalid
    /// persisted sessions are removed and reported as not connected.
    pub async fn is_user_connected(&self, address: Option<&str>) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;

        match sessions.session().map(|session| session.validate(None)) {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!("Active session is no longer valid: {}", e);
                sessions.clear_session();
                self.store.set_session(None).await?;
                self.session_store.remove_item(self.storage_key()).await?;
                return Ok(false);
            }
            None => {
                let Some(serialized) = self.session_store.get_item(self.storage_key()).await?
                else {
                    return Ok(false);
                };

                match sessions.set_session(&serialized, None) {
                    Ok(session) => {
                        let session = session.clone();
                        self.store.set_session(Some(session)).await?;
                    }
                    Err(e) => {
                        warn!("Removing persisted session: {}", e);
                        self.session_store.remove_item(self.storage_key()).await?;
                        return Ok(false);
                    }
                }
            }
        }

        Ok(match (address, sessions.identity()) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(address), Some(identity)) => identity_matches(identity, address),
        })
    }

    /// Connected user, resuming a persisted session if needed
    pub async fn get_connected_user(&self) -> Result<Option<ConnectedUser>> {
        if !self.is_user_connected(None).await? {
            return Ok(None);
        }

        let sessions = self.sessions.lock().await;
        Ok(match (sessions.identity(), sessions.session()) {
            (Some(user), Some(session)) => Some(ConnectedUser {
                user: user.clone(),
                session: session.clone(),
            }),
            _ => None,
        })
    }

    /// Connected user or a [`ClientError::NoSession`]
    pub async fn require_session(&self) -> Result<ConnectedUser> {
        self.get_connected_user().await?.ok_or_else(|| {
            ClientError::NoSession(
                "This method requires user authentication, no active user session found"
                    .to_string(),
            )
        })
    }

    /// Signed headers authenticating requests of the connected user
    pub async fn generate_auth_headers(&self) -> Result<AuthHeaders> {
        let connected = self.require_session().await?;
        AuthHeaders::sign(&connected.session, connected.did(), Utc::now())
    }

    /// Check headers signed by the connected user's session
    pub async fn verify_auth_headers(&self, headers: &AuthHeaders) -> Result<()> {
        let connected = self.require_session().await?;
        headers.verify(&connected.session)
    }

    /// Select rows, see [`QueryBuilder::select`]
    pub fn select(&self) -> SelectStatement {
        self.query.select()
    }

    /// Run raw SQL, see [`QueryBuilder::raw_select`]
    pub fn raw_select(&self, query: impl Into<String>, params: Vec<Value>) -> RawSelectStatement {
        self.query.raw_select(query, params)
    }

    /// Insert a document, see [`QueryBuilder::insert`]
    pub fn insert(&self, model: impl Into<String>) -> InsertStatement {
        self.query.insert(model)
    }

    /// Insert documents, see [`QueryBuilder::insert_bulk`]
    pub fn insert_bulk(&self, model: impl Into<String>) -> BulkInsertStatement {
        self.query.insert_bulk(model)
    }

    /// Update a document, see [`QueryBuilder::update`]
    pub fn update(&self, id: impl Into<String>) -> UpdateByIdStatement {
        self.query.update(id)
    }
}
