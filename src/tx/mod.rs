//! Transaction submission with nonce observation and gas escalation

pub mod builder;
pub mod classify;
mod gas;
mod nonce;
mod sender;
mod signer;
mod types;

pub use builder::{build_contract_call, build_transfer, CallRequest, ContractMethod, ContractTransactor};
pub use classify::{ErrorClass, ErrorTable};
pub use gas::GasPriceEscalator;
pub use nonce::{wait_for_nonce_above, NonceObservation};
pub use sender::{RetryBudget, SubmissionOutcome, TransactionResubmitter};
pub use signer::{LocalSigner, TxSigner};
pub use types::{ControlParams, SignedTransaction, TransactionIntent};
