//! EVM wallet adapter

use async_trait::async_trait;
use log::debug;
#[cfg(test)]
use mockall::automock;
use orbis_core::crypto::to_checksum_address;
use orbis_core::Chain;
use serde_json::{json, Value};
use std::sync::Arc;

use super::GenericSigner;
use crate::error::{ClientError, Result};

/// Native helpers an EVM provider may offer besides JSON-RPC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmMethod {
    /// `enable()`
    Enable,
    /// `getAddress()`
    GetAddress,
    /// `signMessage(message)`
    SignMessage,
}

/// EIP-1193 style provider
///
/// Only `request` is mandatory. Providers exposing native helpers report
/// them through [`EvmProvider::supports`] and they are preferred over the
/// JSON-RPC fallback.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EvmProvider: Send + Sync {
    /// Send a JSON-RPC request
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    /// Whether a native helper is available
    fn supports(&self, _method: EvmMethod) -> bool {
        false
    }

    /// Native connect
    async fn enable(&self) -> Result<()> {
        Err(ClientError::Provider("enable is not supported".to_string()))
    }

    /// Native account listing
    async fn get_address(&self) -> Result<Vec<String>> {
        Err(ClientError::Provider("getAddress is not supported".to_string()))
    }

    /// Native personal message signing
    async fn sign_message(&self, _message: &str) -> Result<String> {
        Err(ClientError::Provider("signMessage is not supported".to_string()))
    }
}

/// [`GenericSigner`] over an [`EvmProvider`]
pub struct OrbisEvmSigner {
    provider: Arc<dyn EvmProvider>,
}

impl OrbisEvmSigner {
    /// Wrap a provider
    pub fn new(provider: Arc<dyn EvmProvider>) -> Self {
        Self { provider }
    }

    async fn accounts(&self) -> Result<Vec<String>> {
        if self.provider.supports(EvmMethod::GetAddress) {
            return self.provider.get_address().await;
        }

        let accounts = self.provider.request("eth_accounts", json!([])).await?;
        let accounts = accounts
            .as_array()
            .ok_or_else(|| ClientError::Provider(format!("Invalid eth_accounts response {}", accounts)))?;

        Ok(accounts
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl GenericSigner for OrbisEvmSigner {
    fn chain(&self) -> Chain {
        Chain::Evm
    }

    async fn connect(&self) -> Result<()> {
        if self.provider.supports(EvmMethod::Enable) {
            return self.provider.enable().await;
        }

        debug!("Requesting eth accounts");
        self.provider
            .request("eth_requestAccounts", json!([]))
            .await?;
        Ok(())
    }

    async fn get_address(&self) -> Result<String> {
        let accounts = self.accounts().await?;
        let address = accounts
            .first()
            .ok_or_else(|| ClientError::Provider("No eth accounts found".to_string()))?;

        Ok(to_checksum_address(address))
    }

    async fn sign_message(&self, message: &str) -> Result<String> {
        if self.provider.supports(EvmMethod::SignMessage) {
            return self.provider.sign_message(message).await;
        }

        let address = self.get_address().await?;
        let signature = self
            .provider
            .request("personal_sign", json!([message, address]))
            .await?;

        signature
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Provider(format!("Invalid personal_sign response {}", signature)))
    }
}
