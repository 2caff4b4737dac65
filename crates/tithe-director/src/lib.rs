//! Externally callable facade over the donation ledger.
//!
//! [`YieldDirector`] binds a [`tithe_ledger::DonationLedger`] to a concrete
//! [`tithe_ledger::RebasingToken`] and exposes the five public operations:
//! deposit, withdraw, withdraw_all, redeem_yield and redeem_all. The crate
//! also ships [`StakedToken`], an in-process rebasing token used by the CLI
//! and by tests.

pub mod director;
pub mod error;
pub mod token;

pub use director::YieldDirector;
pub use error::{DirectorError, DirectorResult};
pub use token::StakedToken;
