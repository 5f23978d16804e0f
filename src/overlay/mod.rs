// Overlay module - Propagation of sharing and attestation state
// Jobs are append-only OverlaySync rows driven to synced/failed by the
// supervisor; the overlay network itself is behind the OverlayTransport trait.

mod model;
mod supervisor;
mod transport;

pub use model::*;
pub use supervisor::*;
pub use transport::*;
