//! Gas price escalation for replacement transactions

use crate::chain::Ledger;

use ethers::types::U256;
use tracing::debug;

/// Percentage applied to the previous gas price on every resubmission
pub const DEFAULT_BUMP_PERCENT: u64 = 110;

/// Raises gas prices for replacement transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPriceEscalator {
    bump_percent: u64,
}

impl GasPriceEscalator {
    /// Create an escalator using the default 10% bump
    pub fn new() -> Self {
        Self {
            bump_percent: DEFAULT_BUMP_PERCENT,
        }
    }

    /// `price * 110 / 100`, truncated. Zero stays zero.
    pub fn raise(&self, price: U256) -> U256 {
        let factor = U256::from(self.bump_percent);
        let hundred = U256::from(100u64);
        // Split so large prices saturate instead of overflowing
        (price / hundred)
            .saturating_mul(factor)
            .saturating_add((price % hundred) * factor / hundred)
    }

    /// Raised price, lifted to the node's suggestion when that is higher.
    ///
    /// A failed suggestion query falls back to the raised price.
    pub async fn raise_with_market<L>(&self, base_price: U256, ledger: &L) -> U256
    where
        L: Ledger + ?Sized,
    {
        let raised = self.raise(base_price);
        match ledger.suggest_gas_price().await {
            Ok(suggested) if suggested > raised => {
                debug!(
                    "Market gas price {} exceeds escalated {}, using market",
                    suggested, raised
                );
                suggested
            }
            Ok(_) => raised,
            Err(e) => {
                debug!("Gas price suggestion unavailable ({}), using escalated {}", e, raised);
                raised
            }
        }
    }
}

impl Default for GasPriceEscalator {
    fn default() -> Self {
        Self::new()
    }
}
