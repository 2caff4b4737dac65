//! Core donation ledger for Tithe.
//!
//! This crate is the heart of the system. It provides:
//! - [`DonationLedger`]: per-(donor, recipient) principal/yield accounting
//!   with undo-journal transactions (begin/commit/rollback)
//! - [`RecipientRegistry`]: the derived recipient -> donors index that keeps
//!   recipient-side redemption O(donors of that recipient)
//! - [`IndexSource`] / [`RebasingToken`] trait boundaries to the external
//!   rebasing collaborator
//! - [`LedgerAuditor`]: full-rescan verification that the incremental
//!   aggregates match the raw records
//!
//! Yield is tracked as a difference of circulating-unit snapshots against a
//! per-record baseline, so no yield is ever paid twice and no yield is
//! fabricated from floor rounding.

pub mod audit;
pub mod donation;
pub mod error;
pub mod registry;
pub mod traits;

pub use audit::{AuditReport, LedgerAuditor, Violation, ViolationKind};
pub use donation::{DonationLedger, DonationRecord};
pub use error::LedgerError;
pub use registry::{RecipientEntry, RecipientRegistry};
pub use traits::{IndexSource, RebasingToken};
