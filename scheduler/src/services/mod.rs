//! Service implementations
//!
//! In-process stand-ins for the external collaborators: a pub/sub bus and
//! a job store. The production deployment binds the real message broker
//! and the relational database behind the same traits; these keep local
//! runs and the test harness honest.

pub mod bus;
pub mod memory_store;

pub use bus::InProcessBus;
pub use memory_store::MemoryStore;

#[cfg(test)]
mod tests;
