// Sharing module - Sharing configurations and their registry
// One SharedResource row per exposed resource; the registry is the source
// of truth read at request time and updated by the entitlement ledger.

mod lookup;
mod model;
mod policy;
mod registry;

pub use lookup::*;
pub use model::*;
pub use policy::*;
pub use registry::*;
