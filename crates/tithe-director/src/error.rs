use thiserror::Error;
use tithe_ledger::LedgerError;
use tithe_types::{AccountId, RebaseIndex};

/// Errors produced by the director facade.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectorError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("re-entrant call for account {0}")]
    ReentrantCall(AccountId),

    #[error("rebase index may only increase: {next} < {current}")]
    IndexRegression {
        current: RebaseIndex,
        next: RebaseIndex,
    },
}

pub type DirectorResult<T> = Result<T, DirectorError>;
