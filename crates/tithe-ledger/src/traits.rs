use tithe_types::{AccountId, Circulating, Principal, RebaseIndex};

use crate::error::LedgerError;

/// Read-only capability over the rebase index.
///
/// The index is owned and advanced exclusively by the external staking
/// collaborator; the ledger only ever converts through it. Both conversions
/// floor, and must match the receipt token's own rounding exactly for the
/// ledger's invariants to hold.
pub trait IndexSource: Send + Sync {
    fn current_index(&self) -> RebaseIndex;

    fn to_circulating(&self, amount: Principal) -> Result<Circulating, LedgerError> {
        self.current_index()
            .to_circulating(amount)
            .ok_or(LedgerError::AmountOverflow)
    }

    fn to_principal(&self, amount: Circulating) -> Result<Principal, LedgerError> {
        self.current_index()
            .to_principal(amount)
            .ok_or(LedgerError::AmountOverflow)
    }
}

/// Boundary to the external rebasing receipt token.
///
/// The ledger consumes the token only through its observable effects:
/// balances, transfers, and the conversion functions of [`IndexSource`].
pub trait RebasingToken: IndexSource {
    /// The account's visible (rebase-adjusted) balance.
    fn balance_of(&self, account: &AccountId) -> Circulating;

    /// Pull `amount` from `from` into `to`, subject to allowance.
    fn transfer_from(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Circulating,
    ) -> Result<(), LedgerError>;

    /// Push `amount` from `from` into `to`.
    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Circulating,
    ) -> Result<(), LedgerError>;
}

impl IndexSource for RebaseIndex {
    fn current_index(&self) -> RebaseIndex {
        *self
    }
}
