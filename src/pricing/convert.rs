// Price conversion - pure function from display prices to satoshis
//
// The settlement rail accounts in integer satoshis. Owners quote prices in
// USD, BSV, or satoshis directly; everything is normalized at write time so
// the ledger never touches floating point.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of satoshis in one BSV
pub const SATOSHIS_PER_BSV: u64 = 100_000_000;

/// Display currency a price can be quoted in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    Usd,
    Bsv,
    Sat,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Currency::Usd => "USD",
            Currency::Bsv => "BSV",
            Currency::Sat => "SAT",
        };
        write!(f, "{}", s)
    }
}

/// Errors that can occur during price conversion
#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Invalid amount: must be a finite, non-negative number")]
    InvalidAmount,

    #[error("Invalid exchange rate: must be a finite, positive number")]
    InvalidRate,

    #[error("Price too small: {amount} {currency} rounds to zero satoshis")]
    PriceTooSmall { amount: f64, currency: Currency },

    #[error("Price overflow: amount does not fit in the settlement unit")]
    Overflow,
}

/// Convert a display price into satoshis.
///
/// Rounding is half-up. A nonzero price that rounds to zero satoshis is an
/// error rather than a silent free grant (`PriceTooSmall`).
///
/// `rate` is the BSV/USD exchange rate (USD per 1 BSV). It is only consulted
/// for `Currency::Usd`; callers obtain it from an `ExchangeRateSource`, this
/// function never fetches anything.
pub fn to_satoshis(amount: f64, currency: Currency, rate: f64) -> Result<u64, PricingError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(PricingError::InvalidAmount);
    }

    let raw = match currency {
        Currency::Sat => amount,
        Currency::Bsv => amount * SATOSHIS_PER_BSV as f64,
        Currency::Usd => {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(PricingError::InvalidRate);
            }
            (amount / rate) * SATOSHIS_PER_BSV as f64
        }
    };

    let rounded = raw.round();
    if !rounded.is_finite() || rounded > u64::MAX as f64 {
        return Err(PricingError::Overflow);
    }

    let sats = rounded as u64;
    if sats == 0 && amount > 0.0 {
        return Err(PricingError::PriceTooSmall { amount, currency });
    }

    Ok(sats)
}
