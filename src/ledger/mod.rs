// Ledger module - Micropayments and access entitlements
// Append-only settlement records; confirmed payments become entitlements
// and drive the counters on the parent SharedResource.

mod entitlement;
mod model;

pub use entitlement::*;
pub use model::*;
