//! Transaction resubmitter: sign, submit, wait for inclusion, and correct course
//!
//! One call drives a single intent to a terminal outcome. Every corrective
//! action (re-pricing, re-nonce, nonce query retry) draws from one retry budget;
//! only an "already known" answer moves on without spending it.

use super::classify::{ErrorClass, ErrorTable};
use super::gas::GasPriceEscalator;
use super::nonce::wait_for_nonce_above;
use super::signer::TxSigner;
use super::types::{ControlParams, SignedTransaction, TransactionIntent};
use crate::chain::Ledger;
use crate::error::SenderError;
use crate::metrics;

use ethers::types::{TransactionReceipt, U256};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Terminal result of one submission
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Mined, with its receipt
    Confirmed {
        signed: SignedTransaction,
        receipt: TransactionReceipt,
    },
    /// The nonce never moved within the expected timeout and the budget ran
    /// out. No error was observed; whether the transaction will be mined is
    /// unknown.
    Unconfirmed { signed: SignedTransaction },
    /// Hard failure, with the most recently signed transaction if any
    Failed {
        signed: Option<SignedTransaction>,
        error: SenderError,
    },
}

impl SubmissionOutcome {
    /// Most recently signed transaction, usable for out-of-band lookups
    pub fn signed_transaction(&self) -> Option<&SignedTransaction> {
        match self {
            SubmissionOutcome::Confirmed { signed, .. }
            | SubmissionOutcome::Unconfirmed { signed } => Some(signed),
            SubmissionOutcome::Failed { signed, .. } => signed.as_ref(),
        }
    }

    pub fn receipt(&self) -> Option<&TransactionReceipt> {
        match self {
            SubmissionOutcome::Confirmed { receipt, .. } => Some(receipt),
            _ => None,
        }
    }

    /// `None` for both confirmed and unconfirmed outcomes
    pub fn error(&self) -> Option<&SenderError> {
        match self {
            SubmissionOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, SubmissionOutcome::Confirmed { .. })
    }
}

/// Corrective actions left for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    pub fn new(max_retries: u32) -> Self {
        Self {
            remaining: max_retries,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    fn consume(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}

/// Mutable state threaded through every transition of one call
#[derive(Debug)]
struct Attempt {
    /// Working copy of the intent; only nonce and gas price change
    tx: TransactionIntent,
    budget: RetryBudget,
    last_signed: Option<SignedTransaction>,
}

impl Attempt {
    fn new(tx: TransactionIntent, params: &ControlParams) -> Self {
        Self {
            tx,
            budget: RetryBudget::new(params.max_retries),
            last_signed: None,
        }
    }

    fn fail(&self, error: SenderError) -> Stage {
        Stage::Done(SubmissionOutcome::Failed {
            signed: self.last_signed.clone(),
            error,
        })
    }
}

#[derive(Debug)]
enum Stage {
    Sign,
    Submit(SignedTransaction),
    Wait(SignedTransaction),
    Done(SubmissionOutcome),
}

/// Drives transactions to confirmation through mempool races
pub struct TransactionResubmitter {
    ledger: Arc<dyn Ledger>,
    signer: Arc<dyn TxSigner>,
    chain_id: u64,
    escalator: GasPriceEscalator,
    errors: ErrorTable,
}

impl TransactionResubmitter {
    /// Create a resubmitter using the default error table
    pub fn new(ledger: Arc<dyn Ledger>, signer: Arc<dyn TxSigner>, chain_id: u64) -> Self {
        Self {
            ledger,
            signer,
            chain_id,
            escalator: GasPriceEscalator::new(),
            errors: ErrorTable::default(),
        }
    }

    /// Use a ledger-specific classification table
    pub fn with_error_table(mut self, errors: ErrorTable) -> Self {
        self.errors = errors;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn account(&self) -> ethers::types::Address {
        self.signer.account()
    }

    /// Sign, submit and wait for `tx` until it is mined or the budget runs out
    pub async fn transact_with_receipt(
        &self,
        params: &ControlParams,
        tx: TransactionIntent,
    ) -> SubmissionOutcome {
        let started = Instant::now();
        let mut attempt = Attempt::new(tx, params);
        let mut stage = Stage::Sign;

        let outcome = loop {
            stage = match stage {
                Stage::Sign => self.sign(&mut attempt).await,
                Stage::Submit(signed) => self.submit(params, &mut attempt, signed).await,
                Stage::Wait(signed) => self.wait(params, &mut attempt, signed).await,
                Stage::Done(outcome) => break outcome,
            };
        };

        match &outcome {
            SubmissionOutcome::Confirmed { signed, receipt } => {
                info!(
                    "Transaction {:?} confirmed in block {:?} (nonce {}, status {:?})",
                    signed.hash,
                    receipt.block_number,
                    signed.nonce(),
                    receipt.status
                );
                metrics::record_confirmed(self.chain_id, started.elapsed().as_secs_f64());
            }
            SubmissionOutcome::Unconfirmed { signed } => {
                warn!(
                    "Transaction {:?} unconfirmed after retries exhausted (nonce {})",
                    signed.hash,
                    signed.nonce()
                );
                metrics::record_unconfirmed(self.chain_id);
            }
            SubmissionOutcome::Failed { signed, error } => {
                error!(
                    "Transaction failed: {} (last signed: {:?})",
                    error,
                    signed.as_ref().map(|s| s.hash)
                );
                metrics::record_failed(self.chain_id, error.kind());
            }
        }

        outcome
    }

    async fn sign(&self, attempt: &mut Attempt) -> Stage {
        match self.signer.sign(&attempt.tx, self.chain_id).await {
            Ok(signed) => {
                debug!(
                    "Signed {:?} (nonce {}, gas price {})",
                    signed.hash,
                    signed.nonce(),
                    signed.gas_price()
                );
                metrics::record_signed(self.chain_id, gwei(signed.gas_price()));
                attempt.last_signed = Some(signed.clone());
                Stage::Submit(signed)
            }
            Err(e) => attempt.fail(SenderError::Signing(e)),
        }
    }

    async fn submit(
        &self,
        params: &ControlParams,
        attempt: &mut Attempt,
        signed: SignedTransaction,
    ) -> Stage {
        let err = match self.ledger.send_raw_transaction(&signed.raw).await {
            Ok(()) => {
                info!(
                    "Transaction sent: {:?} (nonce {}, {} retries left)",
                    signed.hash,
                    signed.nonce(),
                    attempt.budget.remaining()
                );
                metrics::record_submission(self.chain_id, "accepted");
                return Stage::Wait(signed);
            }
            Err(e) => e,
        };

        let class = self.errors.classify(&err);
        metrics::record_submission(self.chain_id, class.as_str());

        if attempt.budget.is_exhausted() {
            warn!("Submission of {:?} failed with no retries left: {}", signed.hash, err);
            return attempt.fail(SenderError::Submission(err));
        }

        match class {
            ErrorClass::Underpriced => self.on_underpriced(params, attempt).await,
            ErrorClass::NonceTooLow => self.on_nonce_too_low(params, attempt).await,
            ErrorClass::AlreadyKnown => {
                debug!("Transaction {:?} already known, waiting", signed.hash);
                Stage::Wait(signed)
            }
            ErrorClass::NotFound | ErrorClass::Other => {
                attempt.fail(SenderError::Submission(err))
            }
        }
    }

    /// Our nonce is held by a competing transaction
    async fn on_underpriced(&self, params: &ControlParams, attempt: &mut Attempt) -> Stage {
        let nonce = attempt.tx.nonce;
        warn!("Nonce {} occupied by another transaction, waiting for it", nonce);

        let observed = wait_for_nonce_above(
            self.ledger.as_ref(),
            self.signer.account(),
            nonce,
            params.unexpected_timeout,
            params.polling_interval,
        )
        .await;

        if !observed.advanced {
            // Competitor not mined in time: outbid it
            return self.resubmit(attempt, nonce, "underpriced").await;
        }

        if params.nonce_immutable {
            return attempt.fail(SenderError::NonceImmutable { nonce });
        }
        self.resubmit(attempt, observed.nonce, "nonce_taken").await
    }

    async fn on_nonce_too_low(&self, params: &ControlParams, attempt: &mut Attempt) -> Stage {
        if params.nonce_immutable {
            return attempt.fail(SenderError::NonceImmutable {
                nonce: attempt.tx.nonce,
            });
        }

        let account = self.signer.account();
        let nonce = loop {
            match self.ledger.nonce_at(account).await {
                Ok(nonce) => break nonce,
                Err(e) if attempt.budget.is_exhausted() => {
                    return attempt.fail(SenderError::NonceQuery(e));
                }
                Err(e) => {
                    warn!("Nonce query failed, retrying: {}", e);
                    attempt.budget.consume();
                }
            }
        };

        self.resubmit(attempt, nonce, "nonce_too_low").await
    }

    async fn wait(
        &self,
        params: &ControlParams,
        attempt: &mut Attempt,
        signed: SignedTransaction,
    ) -> Stage {
        let observed = wait_for_nonce_above(
            self.ledger.as_ref(),
            self.signer.account(),
            signed.nonce(),
            params.expected_timeout,
            params.polling_interval,
        )
        .await;

        if !observed.advanced {
            if attempt.budget.is_exhausted() {
                return Stage::Done(SubmissionOutcome::Unconfirmed { signed });
            }
            warn!(
                "Transaction {:?} not mined within {:?}, re-pricing",
                signed.hash, params.expected_timeout
            );
            let nonce = attempt.tx.nonce;
            return self.resubmit(attempt, nonce, "stuck").await;
        }

        let err = match self.ledger.transaction_receipt(signed.hash).await {
            Ok(receipt) => return Stage::Done(SubmissionOutcome::Confirmed { signed, receipt }),
            Err(e) => e,
        };

        let failed = |error| {
            Stage::Done(SubmissionOutcome::Failed {
                signed: Some(signed.clone()),
                error,
            })
        };

        if attempt.budget.is_exhausted() {
            return failed(SenderError::ReceiptFetch(err));
        }

        match self.errors.classify(&err) {
            ErrorClass::NotFound if params.nonce_immutable => {
                failed(SenderError::NonceImmutable {
                    nonce: signed.nonce(),
                })
            }
            ErrorClass::NotFound => {
                warn!(
                    "Nonce {} mined without {:?}, transaction was replaced",
                    signed.nonce(),
                    signed.hash
                );
                self.resubmit(attempt, observed.nonce, "replaced").await
            }
            _ => failed(SenderError::ReceiptFetch(err)),
        }
    }

    /// Re-price the working transaction at `nonce` and spend one retry
    async fn resubmit(&self, attempt: &mut Attempt, nonce: u64, reason: &'static str) -> Stage {
        let gas_price = self
            .escalator
            .raise_with_market(attempt.tx.gas_price, self.ledger.as_ref())
            .await;

        info!(
            "Resubmitting ({}): nonce {} -> {}, gas price {} -> {}",
            reason, attempt.tx.nonce, nonce, attempt.tx.gas_price, gas_price
        );

        attempt.tx = attempt.tx.rebuild(nonce, gas_price);
        attempt.budget.consume();
        metrics::record_resubmission(self.chain_id, reason);
        Stage::Sign
    }
}

fn gwei(wei: U256) -> f64 {
    (wei / U256::exp10(9)).low_u64() as f64
}
