//! Wallet provider normalization
//!
//! Every chain exposes a different wallet interface. They are wrapped behind
//! [`GenericSigner`] so that authentication only needs `connect`,
//! `get_address` and `sign_message`. The chain of a provider is chosen by the
//! caller through the [`WalletProvider`] variant; signers that already
//! implement [`GenericSigner`] pass through untouched.

mod evm;
mod solana;
mod tezos;

pub use evm::{EvmMethod, EvmProvider, OrbisEvmSigner};
pub use solana::{OrbisSolanaSigner, SolanaWallet};
pub use tezos::{OrbisTezosSigner, SigningType, TezosAccount, TezosWallet};

#[cfg(test)]
pub use evm::MockEvmProvider;
#[cfg(test)]
pub use solana::MockSolanaWallet;
#[cfg(test)]
pub use tezos::MockTezosWallet;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use orbis_core::Chain;
use std::sync::Arc;

use crate::error::Result;

/// Chain agnostic signing capability
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GenericSigner: Send + Sync {
    /// Chain the signer belongs to
    fn chain(&self) -> Chain;

    /// Ask the wallet for access
    async fn connect(&self) -> Result<()>;

    /// Address of the active account
    async fn get_address(&self) -> Result<String>;

    /// Sign a message, returning the chain specific encoded signature
    async fn sign_message(&self, message: &str) -> Result<String>;

    /// Public key of the active account, when the chain exposes one
    async fn public_key(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A chain native wallet
#[derive(Clone)]
pub enum WalletProvider {
    /// EIP-1193 style provider
    Evm(Arc<dyn EvmProvider>),
    /// Solana wallet adapter
    Solana(Arc<dyn SolanaWallet>),
    /// Tezos (Beacon style) wallet
    Tezos(Arc<dyn TezosWallet>),
    /// Already conforming signer
    Generic(Arc<dyn GenericSigner>),
}

impl std::fmt::Debug for WalletProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WalletProvider").field(&self.chain()).finish()
    }
}

impl WalletProvider {
    /// Chain of the wrapped wallet
    pub fn chain(&self) -> Chain {
        match self {
            WalletProvider::Evm(_) => Chain::Evm,
            WalletProvider::Solana(_) => Chain::Solana,
            WalletProvider::Tezos(_) => Chain::Tezos,
            WalletProvider::Generic(signer) => signer.chain(),
        }
    }
}

/// Wrap a wallet behind the generic signing capability
pub fn normalize_provider(provider: WalletProvider) -> Arc<dyn GenericSigner> {
    match provider {
        WalletProvider::Evm(provider) => Arc::new(OrbisEvmSigner::new(provider)),
        WalletProvider::Solana(wallet) => Arc::new(OrbisSolanaSigner::new(wallet)),
        WalletProvider::Tezos(wallet) => Arc::new(OrbisTezosSigner::new(wallet)),
        WalletProvider::Generic(signer) => signer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generic_signer_passes_through() {
        let mut signer = MockGenericSigner::new();
        signer.expect_chain().return_const(Chain::Stacks);
        signer
            .expect_get_address()
            .returning(|| Ok("SP123".to_string()));

        let provider = WalletProvider::Generic(Arc::new(signer));
        assert_eq!(provider.chain(), Chain::Stacks);

        let normalized = normalize_provider(provider);
        assert_eq!(normalized.chain(), Chain::Stacks);
        assert_eq!(normalized.get_address().await.unwrap(), "SP123");
    }

    #[test]
    fn test_variant_selects_chain() {
        let provider = WalletProvider::Solana(Arc::new(MockSolanaWallet::new()));
        assert_eq!(provider.chain(), Chain::Solana);
        assert_eq!(normalize_provider(provider).chain(), Chain::Solana);

        let provider = WalletProvider::Tezos(Arc::new(MockTezosWallet::new()));
        assert_eq!(normalize_provider(provider).chain(), Chain::Tezos);

        let provider = WalletProvider::Evm(Arc::new(MockEvmProvider::new()));
        assert_eq!(normalize_provider(provider).chain(), Chain::Evm);
    }
}
