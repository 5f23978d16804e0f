// podshare - Resource sharing, micropayment settlement, and overlay sync
//
// Core engine modules:
// - identity: user identifiers
// - pricing:  display-currency to satoshi conversion
// - sharing:  sharing configurations (SharedResource) and their registry
// - ledger:   micropayments and access entitlements
// - overlay:  overlay network sync jobs and the retry supervisor
// - storage:  persistent snapshots (sled)
// - engine:   wires the components together and routes sync intents

pub mod engine;
pub mod identity;
pub mod ledger;
pub mod overlay;
pub mod pricing;
pub mod sharing;
pub mod storage;
