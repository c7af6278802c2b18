//! Solana wallet adapter

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use orbis_core::Chain;
use std::sync::Arc;

use super::GenericSigner;
use crate::error::Result;

/// Solana wallet adapter interface
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SolanaWallet: Send + Sync {
    /// Whether the wallet is already connected
    fn is_connected(&self) -> bool;

    /// Ask the wallet for access
    async fn connect(&self) -> Result<()>;

    /// Base58 public key of the active account
    fn public_key(&self) -> Result<String>;

    /// Sign raw message bytes
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// [`GenericSigner`] over a [`SolanaWallet`]
pub struct OrbisSolanaSigner {
    wallet: Arc<dyn SolanaWallet>,
}

impl OrbisSolanaSigner {
    /// Wrap a wallet
    pub fn new(wallet: Arc<dyn SolanaWallet>) -> Self {
        Self { wallet }
    }
}

#[async_trait]
impl GenericSigner for OrbisSolanaSigner {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    async fn connect(&self) -> Result<()> {
        if self.wallet.is_connected() {
            return Ok(());
        }
        self.wallet.connect().await
    }

    async fn get_address(&self) -> Result<String> {
        self.wallet.public_key()
    }

    async fn sign_message(&self, message: &str) -> Result<String> {
        let signature = self.wallet.sign_message(message.as_bytes()).await?;
        Ok(bs58::encode(signature).into_string())
    }
}
