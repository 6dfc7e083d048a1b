//! Transaction resubmitter - drives EVM transactions to confirmation
//!
//! Signs and submits a transaction, watches the sender's nonce for inclusion,
//! and corrects course on mempool races: underpriced replacements, stale
//! nonces, duplicate submissions and transactions replaced by others. Every
//! correction re-prices the transaction and draws from one retry budget.

pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod tx;

pub use chain::{ChainProvider, Ledger};
pub use error::{LedgerError, SenderError, SenderResult, SignerError};
pub use tx::{
    ControlParams, LocalSigner, SignedTransaction, SubmissionOutcome, TransactionIntent,
    TransactionResubmitter, TxSigner,
};
