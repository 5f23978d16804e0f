// Storage module - persistent snapshots via sled

mod store;

pub use store::*;
