//! Settlement use-case layer.
//!
//! Turns a payment request plus payer-supplied settlement data into a
//! `Payment` row and an initialize call on the selected rail, then
//! reconciles asynchronous verify and webhook signals back into that row.

pub mod orchestrator;

pub use orchestrator::{Payer, SettlementData, SettlementOrchestrator};
