//! Luna's relationship core: the memory store, the affection engine, the
//! dialogue pools and the dispatcher that paces her reactions.

pub mod agent;
pub mod config;
pub mod fortune;
pub mod memory;
pub mod runtime;
