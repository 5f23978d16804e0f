// Pricing module - Display-currency to settlement-unit conversion
// All internal accounting is in integer satoshis; floats never leave this module.

mod convert;
mod rate;

pub use convert::*;
pub use rate::*;
