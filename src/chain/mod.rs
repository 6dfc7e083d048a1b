//! Chain module - the ledger capability set consumed by the sender
//!
//! This module provides:
//! - The `Ledger` trait: the only network surface the sender depends on
//! - `ChainProvider`: an ethers HTTP implementation with multi-RPC failover

pub mod provider;

pub use provider::ChainProvider;

use crate::error::LedgerError;

use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, TransactionRequest, H256, U256};

/// Network calls used to submit and track transactions.
///
/// Errors are returned raw so the sender can classify them by their text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Broadcast an RLP-encoded signed transaction
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<(), LedgerError>;

    /// Current nonce of `account` at the latest block
    async fn nonce_at(&self, account: Address) -> Result<u64, LedgerError>;

    /// Balance of `account` at the latest block
    async fn balance_at(&self, account: Address) -> Result<U256, LedgerError>;

    /// Gas price suggested by the node
    async fn suggest_gas_price(&self) -> Result<U256, LedgerError>;

    /// Receipt of a mined transaction; a pending or unknown hash is an error
    async fn transaction_receipt(&self, hash: H256) -> Result<TransactionReceipt, LedgerError>;

    /// Gas needed to execute `request`
    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<U256, LedgerError>;

    /// Chain identifier of the network
    async fn chain_id(&self) -> Result<u64, LedgerError>;
}
