#![forbid(unsafe_code)]

//! Core domain model and inventory logic for the blood bank.
//!
//! This crate provides:
//! - Domain types (blood types, components, inventory records, requests, profiles)
//! - The inventory ledger and its mutation protocol
//! - Request fulfillment with donor compatibility fallback
//! - Blood typing test workflow
//! - Persistence (headerless CSV tables with file locking)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod table;
pub mod compat;
pub mod ledger;
pub mod requests;
pub mod directory;
pub mod fulfillment;
pub mod typing;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::{Config, DataPaths};
pub use compat::{compatible_donor_types, compatible_donor_types_for};
pub use ledger::{Dispense, Ledger, Outcome, Rejection, Snapshot, SnapshotEntry, StockWarning};
pub use requests::RequestLog;
pub use directory::{CsvProfileStore, DonorDirectory, ProfileDirectory, ProfileWriter};
pub use fulfillment::{BlockReason, DonorContact, FulfillmentEngine, FulfillmentOutcome, FulfillmentReport};
pub use typing::TypingWorkflow;
