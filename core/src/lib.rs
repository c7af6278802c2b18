//! # Orbis Core
//!
//! I/O free building blocks of the Orbis SDK: structured queries and their
//! SQL compilation, chain and DID helpers, sign-in challenges, credentials
//! and DID sessions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod query;
pub mod schema;
pub mod session;
pub mod siwx;

/// Re-export common types for ease of use
pub use chain::{Chain, ChainIdentity};
pub use config::{NodeConfig, OrbisConfig, SiwxConfig};
pub use error::{OrbisError, Result};
pub use query::{compile, CompiledQuery};
pub use session::{Cacao, CredentialedSession, KeyDidSession, Session};
pub use siwx::{SignedChallenge, SiwxChallenge, SiwxOverrides, SiwxResource};

/// Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
