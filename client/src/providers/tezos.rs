//! Tezos wallet adapter

use async_trait::async_trait;
use log::debug;
#[cfg(test)]
use mockall::automock;
use orbis_core::Chain;
use std::sync::Arc;

use super::GenericSigner;
use crate::error::{ClientError, Result};

/// Permission scope needed to sign challenges
const SIGN_PAYLOAD_SCOPE: &str = "sign_payload_request";

/// Network permissions are requested for
const PERMISSION_NETWORK: &str = "mainnet";

/// Active Tezos account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TezosAccount {
    /// `tz` address
    pub address: String,
    /// `edpk` public key
    pub public_key: String,
}

/// Payload signing type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningType {
    /// Raw bytes
    Raw,
    /// Packed micheline data
    Micheline,
}

/// Beacon style Tezos wallet
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TezosWallet: Send + Sync {
    /// Currently active account, if any
    async fn get_active_account(&self) -> Result<Option<TezosAccount>>;

    /// Whether the wallet can check existing permissions
    fn supports_permission_check(&self) -> bool {
        false
    }

    /// Whether a permission scope is already granted
    async fn check_permissions(&self, _scope: &str) -> Result<bool> {
        Ok(false)
    }

    /// Prompt the user for permissions on a network
    async fn request_permissions(&self, network: &str) -> Result<()>;

    /// Sign a payload
    async fn request_sign_payload(&self, signing_type: SigningType, payload: &str) -> Result<String>;
}

/// [`GenericSigner`] over a [`TezosWallet`]
pub struct OrbisTezosSigner {
    wallet: Arc<dyn TezosWallet>,
}

impl OrbisTezosSigner {
    /// Wrap a wallet
    pub fn new(wallet: Arc<dyn TezosWallet>) -> Self {
        Self { wallet }
    }

    async fn active_account(&self) -> Result<TezosAccount> {
        self.wallet
            .get_active_account()
            .await?
            .ok_or_else(|| ClientError::Provider("No active Tezos account".to_string()))
    }

    async fn is_authorized(&self) -> bool {
        if !self.wallet.supports_permission_check() {
            return false;
        }

        match self.wallet.get_active_account().await {
            Ok(Some(account)) if !account.address.is_empty() => self
                .wallet
                .check_permissions(SIGN_PAYLOAD_SCOPE)
                .await
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[async_trait]
impl GenericSigner for OrbisTezosSigner {
    fn chain(&self) -> Chain {
        Chain::Tezos
    }

    async fn connect(&self) -> Result<()> {
        if self.is_authorized().await {
            debug!("Tezos wallet already authorized");
            return Ok(());
        }

        self.wallet.request_permissions(PERMISSION_NETWORK).await
    }

    async fn get_address(&self) -> Result<String> {
        Ok(self.active_account().await?.address)
    }

    /// Signs an already micheline encoded payload
    async fn sign_message(&self, message: &str) -> Result<String> {
        self.wallet
            .request_sign_payload(SigningType::Micheline, message)
            .await
    }

    async fn public_key(&self) -> Result<Option<String>> {
        Ok(Some(self.active_account().await?.public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> TezosAccount {
        TezosAccount {
            address: "tz1abc".to_string(),
            public_key: "edpkXYZ".to_string(),
        }
    }

    #[tokio::test]
    async fn test_existing_permission_skips_prompt() {
        let mut wallet = MockTezosWallet::new();
        wallet.expect_supports_permission_check().return_const(true);
        wallet
            .expect_get_active_account()
            .returning(|| Ok(Some(account())));
        wallet
            .expect_check_permissions()
            .withf(|scope| scope == SIGN_PAYLOAD_SCOPE)
            .returning(|_| Ok(true));
        wallet.expect_request_permissions().never();

        let signer = OrbisTezosSigner::new(Arc::new(wallet));
        signer.connect().await.unwrap();
        assert_eq!(signer.get_address().await.unwrap(), "tz1abc");
        assert_eq!(signer.public_key().await.unwrap().as_deref(), Some("edpkXYZ"));
    }

    #[tokio::test]
    async fn test_missing_permission_requests_it() {
        let mut wallet = MockTezosWallet::new();
        wallet.expect_supports_permission_check().return_const(true);
        wallet.expect_get_active_account().returning(|| Ok(None));
        wallet.expect_check_permissions().never();
        wallet
            .expect_request_permissions()
            .withf(|network| network == "mainnet")
            .times(1)
            .returning(|_| Ok(()));

        let signer = OrbisTezosSigner::new(Arc::new(wallet));
        signer.connect().await.unwrap();
        assert!(matches!(
            signer.get_address().await,
            Err(ClientError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_permission_check_requests_it() {
        let mut wallet = MockTezosWallet::new();
        wallet.expect_supports_permission_check().return_const(true);
        wallet
            .expect_get_active_account()
            .returning(|| Ok(Some(account())));
        wallet
            .expect_check_permissions()
            .returning(|_| Err(ClientError::Provider("not granted".to_string())));
        wallet
            .expect_request_permissions()
            .times(1)
            .returning(|_| Ok(()));

        OrbisTezosSigner::new(Arc::new(wallet)).connect().await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_uses_micheline() {
        let mut wallet = MockTezosWallet::new();
        wallet
            .expect_request_sign_payload()
            .withf(|signing_type, payload| {
                *signing_type == SigningType::Micheline && payload == "0501000000026869"
            })
            .returning(|_, _| Ok("edsig123".to_string()));

        let signer = OrbisTezosSigner::new(Arc::new(wallet));
        assert_eq!(signer.sign_message("0501000000026869").await.unwrap(), "edsig123");
    }
}
