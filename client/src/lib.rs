//! # Orbis Client
//!
//! I/O side of the Orbis SDK: wallet providers, authentication into DID
//! sessions, the remote node client, document stores and the statement
//! builders, tied together by [`OrbisClient`].
//!
//! ```no_run
//! # async fn example(store: std::sync::Arc<dyn orbis_client::DocumentStore>) -> orbis_client::Result<()> {
//! use orbis_client::{ConnectOptions, KeyDidAuthenticator, OrbisClient};
//! use orbis_core::OrbisConfig;
//!
//! let client = OrbisClient::new(OrbisConfig::development(), store)?;
//! let user = client
//!     .connect_user(&KeyDidAuthenticator::create_random().into(), ConnectOptions::default())
//!     .await?;
//!
//! let rows = client.select().from("posts").limit(10).run().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod error;
pub mod node;
pub mod orbis;
pub mod providers;
pub mod statements;
pub mod store;

pub use auth::{
    AuthHeaders, AuthState, Authenticator, KeyDidAuthenticator, SessionManager, SiwxAuthenticator,
};
pub use error::{ClientError, Result};
pub use node::{ForceIndexingResult, OrbisNode, OrbisNodeManager, QueryResult};
pub use orbis::{ConnectOptions, ConnectedUser, OrbisClient};
pub use providers::{GenericSigner, WalletProvider};
pub use statements::{
    BulkInsertResult, BulkInsertStatement, InsertStatement, QueryBuilder, RawSelectStatement,
    SelectStatement, UpdateByIdStatement,
};
pub use store::{
    AccountRelation, Document, DocumentStore, MemorySessionStore, ModelDefinition, NewDocument,
    SessionStore,
};
