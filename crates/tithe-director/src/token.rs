use std::collections::BTreeMap;

use tithe_ledger::{IndexSource, LedgerError, RebasingToken};
use tithe_types::{AccountId, Circulating, Principal, RebaseIndex};
use tracing::debug;

use crate::error::{DirectorError, DirectorResult};

/// In-memory rebasing receipt token for tests, demos, and embedding.
///
/// Plays the external staking collaborator: balances are stored in principal
/// units (gons) so a rebase touches nothing but the index, and every visible
/// balance is a floor conversion through the current index, the same
/// rounding the ledger's conversions use. `transfer_from` is gated by an
/// allowance from the owner to the destination account, which makes the
/// transfer-failure paths of the facade reachable in tests.
#[derive(Clone, Debug)]
pub struct StakedToken {
    index: RebaseIndex,
    balances: BTreeMap<AccountId, Principal>,
    allowances: BTreeMap<(AccountId, AccountId), Circulating>,
}

impl StakedToken {
    pub fn new(index: RebaseIndex) -> Self {
        Self {
            index,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    /// Credit `amount` circulating units to `account`, converted to gons at
    /// the current index. Stands in for the out-of-scope staking entry point.
    pub fn mint(&mut self, account: &AccountId, amount: Circulating) -> DirectorResult<Principal> {
        let gons = IndexSource::to_principal(self, amount)?;
        let balance = self
            .balances
            .get(account)
            .copied()
            .unwrap_or(Principal::ZERO)
            .checked_add(gons)
            .ok_or(LedgerError::AmountOverflow)?;
        self.balances.insert(account.clone(), balance);
        debug!(%account, %amount, "staked balance minted");
        Ok(gons)
    }

    /// Advance the global index. Regression is rejected: the index is
    /// monotonically non-decreasing by contract.
    pub fn rebase(&mut self, next: RebaseIndex) -> DirectorResult<()> {
        if next < self.index {
            return Err(DirectorError::IndexRegression {
                current: self.index,
                next,
            });
        }
        debug!(current = %self.index, %next, "index rebased");
        self.index = next;
        Ok(())
    }

    /// Allow `spender` to pull up to `amount` from `owner` via
    /// [`RebasingToken::transfer_from`].
    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: Circulating) {
        self.allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Circulating {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(Circulating::ZERO)
    }

    /// Raw gons balance, for assertions and persistence.
    pub fn principal_balance_of(&self, account: &AccountId) -> Principal {
        self.balances
            .get(account)
            .copied()
            .unwrap_or(Principal::ZERO)
    }

    /// Decompose into (index, gons balances) for persistence.
    pub fn parts(&self) -> (RebaseIndex, Vec<(AccountId, Principal)>) {
        (
            self.index,
            self.balances
                .iter()
                .map(|(account, gons)| (account.clone(), *gons))
                .collect(),
        )
    }

    /// Rebuild from persisted parts. Allowances are not persisted.
    pub fn from_parts(index: RebaseIndex, balances: Vec<(AccountId, Principal)>) -> Self {
        Self {
            index,
            balances: balances.into_iter().collect(),
            allowances: BTreeMap::new(),
        }
    }

    fn move_gons(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Circulating,
    ) -> Result<(), LedgerError> {
        let gons = self
            .index
            .to_principal(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let from_balance = self.principal_balance_of(from);
        let Some(remaining) = from_balance.checked_sub(gons) else {
            return Err(LedgerError::TransferFailed(format!(
                "insufficient balance: {from} holds {from_balance} gons, needs {gons}"
            )));
        };
        let to_balance = self
            .principal_balance_of(to)
            .checked_add(gons)
            .ok_or(LedgerError::AmountOverflow)?;
        if remaining.is_zero() {
            self.balances.remove(from);
        } else {
            self.balances.insert(from.clone(), remaining);
        }
        self.balances.insert(to.clone(), to_balance);
        Ok(())
    }
}

impl IndexSource for StakedToken {
    fn current_index(&self) -> RebaseIndex {
        self.index
    }
}

impl RebasingToken for StakedToken {
    fn balance_of(&self, account: &AccountId) -> Circulating {
        self.index
            .to_circulating(self.principal_balance_of(account))
            .unwrap_or(Circulating::new(u128::MAX))
    }

    fn transfer_from(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Circulating,
    ) -> Result<(), LedgerError> {
        let key = (from.clone(), to.clone());
        let allowance = self.allowance(from, to);
        let Some(remaining) = allowance.checked_sub(amount) else {
            return Err(LedgerError::TransferFailed(format!(
                "allowance exceeded: {allowance} approved, {amount} requested"
            )));
        };
        self.move_gons(from, to, amount)?;
        self.allowances.insert(key, remaining);
        Ok(())
    }

    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Circulating,
    ) -> Result<(), LedgerError> {
        self.move_gons(from, to, amount)
    }
}
