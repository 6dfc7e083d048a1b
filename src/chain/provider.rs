//! Chain provider with multi-RPC support and automatic failover

use super::Ledger;
use crate::config::ChainConfig;
use crate::error::{LedgerError, SenderError, SenderResult};
use crate::tx::classify::NOT_FOUND_MESSAGE;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, TransactionRequest, H256, U256};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> SenderResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider);
                    debug!("Added HTTP provider: {}", url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(SenderError::Config("No valid RPC providers".to_string()));
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Failover to provider {}", next);
    }

    /// Run `call` against the active provider, failing over on transport errors.
    ///
    /// A JSON-RPC error response is the node's answer and is returned as is.
    async fn with_failover<'a, T, F, Fut>(&'a self, operation: &str, call: F) -> Result<T, LedgerError>
    where
        F: Fn(&'a Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            match call(self.http()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_error_response() => return Err(raw_error(e)),
                Err(e) => {
                    warn!("{} failed: {}", operation, e);
                    last_error = Some(e);
                    self.failover();
                }
            }
        }

        Err(last_error
            .map(raw_error)
            .unwrap_or_else(|| LedgerError::new(format!("{}: all providers failed", operation))))
    }
}

/// Reduce a provider error to the text the node produced
fn raw_error(err: ProviderError) -> LedgerError {
    match err.as_error_response() {
        Some(response) => LedgerError::new(response.message.clone()),
        None => LedgerError::new(err.to_string()),
    }
}

#[async_trait]
impl Ledger for ChainProvider {
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<(), LedgerError> {
        let raw = Bytes::from(raw.to_vec());
        self.with_failover("send_raw_transaction", |p| p.send_raw_transaction(raw.clone()))
            .await
            .map(|_| ())
    }

    async fn nonce_at(&self, account: Address) -> Result<u64, LedgerError> {
        let nonce = self
            .with_failover("get_transaction_count", |p| {
                p.get_transaction_count(account, None)
            })
            .await?;
        Ok(nonce.as_u64())
    }

    async fn balance_at(&self, account: Address) -> Result<U256, LedgerError> {
        self.with_failover("get_balance", |p| p.get_balance(account, None))
            .await
    }

    async fn suggest_gas_price(&self) -> Result<U256, LedgerError> {
        let price = self.with_failover("get_gas_price", |p| p.get_gas_price()).await?;

        // Cap at configured max
        match self.config.max_gas_price_gwei {
            Some(max_gwei) => {
                let cap = U256::from(max_gwei) * U256::from(WEI_PER_GWEI);
                Ok(std::cmp::min(price, cap))
            }
            None => Ok(price),
        }
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<TransactionReceipt, LedgerError> {
        self.with_failover("get_transaction_receipt", |p| p.get_transaction_receipt(hash))
            .await?
            .ok_or_else(|| LedgerError::new(NOT_FOUND_MESSAGE))
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<U256, LedgerError> {
        let tx = TypedTransaction::Legacy(request.clone());
        self.with_failover("estimate_gas", |p| p.estimate_gas(&tx, None))
            .await
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        if let Some(chain_id) = self.config.chain_id {
            return Ok(chain_id);
        }
        let chain_id = self.with_failover("chain_id", |p| p.get_chainid()).await?;
        Ok(chain_id.as_u64())
    }
}
