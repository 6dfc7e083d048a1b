//! Error types for transaction submission

use thiserror::Error;

/// Raw failure reported by a ledger call.
///
/// The message is kept verbatim: classification of submission and receipt
/// failures is an exact match on this text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct LedgerError {
    message: String,
}

impl LedgerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Raw error text as produced by the node
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure to produce a signature for a transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Signing error: {0}")]
pub struct SignerError(pub String);

/// Main error type for submission
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SenderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error(transparent)]
    Signing(#[from] SignerError),

    #[error("Submission failed: {0}")]
    Submission(LedgerError),

    #[error("Receipt fetch failed: {0}")]
    ReceiptFetch(LedgerError),

    #[error("Nonce query failed: {0}")]
    NonceQuery(LedgerError),

    #[error("nonce immutable: {nonce}")]
    NonceImmutable { nonce: u64 },

    #[error("Chain id resolution failed: {0}")]
    ChainId(LedgerError),

    #[error("Gas estimation error: {0}")]
    GasEstimation(LedgerError),

    #[error("Contract encoding error: {0}")]
    Abi(String),
}

impl SenderError {
    /// Underlying ledger error, when the failure came from the node
    pub fn ledger_error(&self) -> Option<&LedgerError> {
        match self {
            SenderError::Submission(e)
            | SenderError::ReceiptFetch(e)
            | SenderError::NonceQuery(e)
            | SenderError::ChainId(e)
            | SenderError::GasEstimation(e) => Some(e),
            _ => None,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SenderError::Config(_) => "config",
            SenderError::Wallet(_) => "wallet",
            SenderError::Signing(_) => "signing",
            SenderError::Submission(_) => "submission",
            SenderError::ReceiptFetch(_) => "receipt",
            SenderError::NonceQuery(_) => "nonce_query",
            SenderError::NonceImmutable { .. } => "nonce_immutable",
            SenderError::ChainId(_) => "chain_id",
            SenderError::GasEstimation(_) => "gas_estimation",
            SenderError::Abi(_) => "abi",
        }
    }
}

/// Result type for submission operations
pub type SenderResult<T> = Result<T, SenderError>;
