// Engine module - the assembled sharing/settlement/sync engine

mod facade;
mod scheduler;

pub use facade::*;
pub use scheduler::*;
