//! Foundation types for Tithe, the yield-redirection ledger.
//!
//! This crate provides the identity and amount types used throughout the
//! system. Every other Tithe crate depends on `tithe-types`.
//!
//! # Key Types
//!
//! - [`AccountId`] — Persistent account identity derived from key material
//! - [`Principal`] — Amounts in the fixed, rebase-independent space
//! - [`Circulating`] — Amounts in the externally visible, rebase-adjusted space
//! - [`RebaseIndex`] — The global fixed-point multiplier between the two
//!
//! Principal and circulating amounts are distinct types on purpose: mixing
//! the two spaces is the primary bug class in rebasing-token accounting, so
//! every crossing goes through an explicit [`RebaseIndex`] conversion.

pub mod account;
pub mod amount;
pub mod error;
pub mod index;

pub use account::{AccountId, AccountMaterial};
pub use amount::{Circulating, Principal};
pub use error::TypeError;
pub use index::RebaseIndex;
