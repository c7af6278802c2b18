//! Orbis SDK
//!
//! Workspace level crate re-exporting the member crates:
//! - `orbis-core`: queries, chains, challenges, credentials and sessions
//! - `orbis-client`: providers, authentication, nodes, stores and statements

pub use orbis_client;
pub use orbis_core;

pub use orbis_client::{
    Authenticator, ClientError, ConnectOptions, KeyDidAuthenticator, OrbisClient,
    SiwxAuthenticator, WalletProvider,
};
pub use orbis_core::{Chain, OrbisConfig, OrbisError, Session};

/// Returns the version of the package.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
