// Exchange rate source - injected collaborator
//
// The engine never fetches market data. Whoever hosts it supplies a rate
// source; tests and single-node deployments pin a fixed rate.

use super::PricingError;

/// Currency pair a rate can be quoted for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CurrencyPair {
    /// USD per 1 BSV
    BsvUsd,
}

/// Source of current exchange rates
pub trait ExchangeRateSource: Send + Sync {
    /// Get the current rate for a pair
    fn current_rate(&self, pair: CurrencyPair) -> Result<f64, PricingError>;
}

/// Rate source pinned to a fixed value
pub struct FixedRateSource {
    bsv_usd: f64,
}

impl FixedRateSource {
    /// Create a fixed source quoting `bsv_usd` USD per BSV
    pub fn new(bsv_usd: f64) -> Self {
        Self { bsv_usd }
    }
}

impl ExchangeRateSource for FixedRateSource {
    fn current_rate(&self, pair: CurrencyPair) -> Result<f64, PricingError> {
        match pair {
            CurrencyPair::BsvUsd => {
                if !self.bsv_usd.is_finite() || self.bsv_usd <= 0.0 {
                    return Err(PricingError::InvalidRate);
                }
                Ok(self.bsv_usd)
            }
        }
    }
}
