use tithe_types::{Circulating, Principal};

/// Errors produced by ledger operations.
///
/// Every error aborts the entire call with no partial state mutation; nothing
/// is retried internally and nothing is silently clamped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Principal,
        requested: Principal,
    },

    #[error("invalid recipient: null account or self-donation")]
    InvalidRecipient,

    #[error("no donation record exists for this donor/recipient pair")]
    NoSuchDonation,

    #[error("insufficient donation: donated {donated}, requested {requested}")]
    InsufficientDonation {
        donated: Principal,
        requested: Principal,
    },

    #[error("token transfer failed: {0}")]
    TransferFailed(String),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("amount overflow during conversion or aggregation")]
    AmountOverflow,

    #[error("rebase index regressed below an existing yield baseline: {0} < {1}")]
    IndexRegression(Circulating, Circulating),

    #[error("corrupt ledger snapshot: {0}")]
    CorruptSnapshot(String),
}
