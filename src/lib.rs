//! PayLink backend library
//!
//! Settlement core of the PayLink mobile-payment backend: provider adapters
//! for the supported payment rails, the provider registry/selector, the
//! payment entity and its state machine, the settlement orchestrator and the
//! fee calculator. HTTP routing lives in `api`, persistence in `database`.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod payments;
pub mod settlement;

pub use error::SettlementError;
