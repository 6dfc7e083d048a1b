//! Nonce observation for detecting inclusion of a transaction
//!
//! An account nonce moving past a transaction's nonce means some transaction
//! with that nonce was mined: ours, a replacement, or a competitor's.

use crate::chain::Ledger;

use ethers::types::Address;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// Result of waiting on an account nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceObservation {
    /// Most recently observed nonce, 0 if no poll succeeded
    pub nonce: u64,
    /// Whether the nonce moved past the target before the deadline
    pub advanced: bool,
}

/// Poll `account`'s nonce until it exceeds `target` or `timeout` elapses.
///
/// The first poll happens immediately. Query errors are skipped and do not
/// extend the deadline. Every unsatisfied poll is followed by a full
/// `poll_interval` sleep.
pub async fn wait_for_nonce_above<L>(
    ledger: &L,
    account: Address,
    target: u64,
    timeout: Duration,
    poll_interval: Duration,
) -> NonceObservation
where
    L: Ledger + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut last_seen = 0;

    while Instant::now() < deadline {
        match ledger.nonce_at(account).await {
            Ok(nonce) => {
                last_seen = nonce;
                if nonce > target {
                    debug!("Nonce of {:?} advanced to {} (target {})", account, nonce, target);
                    return NonceObservation {
                        nonce,
                        advanced: true,
                    };
                }
            }
            Err(e) => {
                trace!("Nonce poll for {:?} failed: {}", account, e);
            }
        }
        sleep(poll_interval).await;
    }

    debug!(
        "Nonce of {:?} still at {} after {:?} (target {})",
        account, last_seen, timeout, target
    );
    NonceObservation {
        nonce: last_seen,
        advanced: false,
    }
}
