//! Transaction intents, signed transactions and submission control parameters

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Signature, TransactionRequest, H256, U256};
use serde::Serialize;
use std::time::Duration;

/// Unsigned transaction as produced by a builder.
///
/// Only `nonce` and `gas_price` change between submission attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionIntent {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas: U256,
    pub gas_price: U256,
    pub nonce: u64,
    pub data: Bytes,
}

impl TransactionIntent {
    /// Copy of this intent with a new nonce and gas price
    pub fn rebuild(&self, nonce: u64, gas_price: U256) -> Self {
        Self {
            nonce,
            gas_price,
            ..self.clone()
        }
    }

    /// Legacy (EIP-155) typed transaction bound to `chain_id`
    pub fn to_typed(&self, chain_id: u64) -> TypedTransaction {
        let mut request = TransactionRequest::new()
            .from(self.from)
            .value(self.value)
            .gas(self.gas)
            .gas_price(self.gas_price)
            .nonce(self.nonce)
            .data(self.data.clone())
            .chain_id(chain_id);
        if let Some(to) = self.to {
            request = request.to(to);
        }
        TypedTransaction::Legacy(request)
    }
}

/// A transaction with its signature, ready for broadcast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedTransaction {
    /// The intent that was signed
    pub intent: TransactionIntent,
    pub signature: Signature,
    /// RLP-encoded signed transaction
    pub raw: Bytes,
    pub hash: H256,
}

impl SignedTransaction {
    pub fn nonce(&self) -> u64 {
        self.intent.nonce
    }

    pub fn gas_price(&self) -> U256 {
        self.intent.gas_price
    }
}

/// Caller-supplied knobs for one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlParams {
    /// Spacing between nonce polls
    pub polling_interval: Duration,
    /// Budget shared by every corrective resubmission of a call
    pub max_retries: u32,
    /// How long to wait for a freshly accepted transaction
    pub expected_timeout: Duration,
    /// How long to wait for a competing transaction holding our nonce
    pub unexpected_timeout: Duration,
    /// Never change the nonce; situations requiring it fail instead
    pub nonce_immutable: bool,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(1),
            max_retries: 5,
            expected_timeout: Duration::from_secs(60),
            unexpected_timeout: Duration::from_secs(60),
            nonce_immutable: false,
        }
    }
}
