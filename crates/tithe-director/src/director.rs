use std::collections::BTreeSet;

use tithe_ledger::{DonationLedger, IndexSource, LedgerError, RebasingToken};
use tithe_types::{AccountId, Circulating, Principal};
use tracing::info;

use crate::error::{DirectorError, DirectorResult};

/// The externally callable surface of the system.
///
/// The director validates caller balances against the rebasing token,
/// performs the actual asset transfers, and delegates all accounting to
/// [`DonationLedger`]. Each public operation is one atomic transition:
/// ledger mutation and transfers commit together or not at all, the ledger
/// side through its undo journal, the token side through compensating
/// transfers on late failure. A per-account in-flight set forbids nested
/// re-entry into deposit/withdraw/redeem for the same account.
///
/// Donated principal is held in the director's custody account; yield payouts
/// and principal returns are pushed from there.
pub struct YieldDirector<T: RebasingToken> {
    token: T,
    ledger: DonationLedger,
    custody: AccountId,
    pub(crate) in_flight: BTreeSet<AccountId>,
}

impl<T: RebasingToken> YieldDirector<T> {
    pub fn new(token: T, custody: AccountId) -> Self {
        Self {
            token,
            ledger: DonationLedger::new(),
            custody,
            in_flight: BTreeSet::new(),
        }
    }

    /// Rebuild a director around previously persisted ledger state.
    pub fn with_ledger(token: T, custody: AccountId, ledger: DonationLedger) -> Self {
        Self {
            token,
            ledger,
            custody,
            in_flight: BTreeSet::new(),
        }
    }

    // -- operations ---------------------------------------------------------

    /// Donate `amount` principal from `donor` to `recipient`.
    ///
    /// Checks the donor's spendable wallet balance in principal space, then
    /// pulls the corresponding circulating amount into custody. Requires an
    /// allowance from the donor to the custody account.
    pub fn deposit(
        &mut self,
        donor: &AccountId,
        recipient: &AccountId,
        amount: Principal,
    ) -> DirectorResult<()> {
        self.locked(donor.clone(), |this| {
            let custody = this.custody.clone();
            let available = this.token.to_principal(this.token.balance_of(donor))?;
            if available < amount {
                return Err(LedgerError::InsufficientBalance {
                    available,
                    requested: amount,
                }
                .into());
            }
            let pulled = this.token.to_circulating(amount)?;

            this.ledger.begin();
            if let Err(error) = this.ledger.deposit(donor, recipient, amount, &this.token) {
                this.ledger.rollback();
                return Err(error.into());
            }
            if let Err(error) = this.token.transfer_from(donor, &custody, pulled) {
                this.ledger.rollback();
                return Err(error.into());
            }
            this.ledger.commit();

            info!(%donor, %recipient, %amount, %pulled, "deposit");
            Ok(())
        })
    }

    /// Withdraw `amount` principal from the (donor, recipient) donation.
    ///
    /// Yield accrued on the full record is realized and paid to the recipient
    /// before the principal reduction; the withdrawn principal's current
    /// circulating value returns to the donor's wallet.
    pub fn withdraw(
        &mut self,
        donor: &AccountId,
        recipient: &AccountId,
        amount: Principal,
    ) -> DirectorResult<Circulating> {
        self.locked(donor.clone(), |this| {
            this.withdraw_unlocked(donor, recipient, amount)
        })
    }

    /// Withdraw every donation of `donor` across all recipients, returning
    /// the total principal withdrawn. Fails with `NoSuchDonation` when the
    /// donor has no active donations; on any failure nothing is withdrawn.
    pub fn withdraw_all(&mut self, donor: &AccountId) -> DirectorResult<Principal> {
        self.locked(donor.clone(), |this| {
            let custody = this.custody.clone();
            let donations = this.ledger.donations_of(donor);
            if donations.is_empty() {
                return Err(LedgerError::NoSuchDonation.into());
            }

            this.ledger.begin();
            let mut total_principal = Principal::ZERO;
            let mut returned = Circulating::ZERO;
            let mut payouts: Vec<(AccountId, Circulating)> = Vec::new();
            for (recipient, principal) in donations {
                let realized =
                    match this.ledger.withdraw(donor, &recipient, principal, &this.token) {
                        Ok(realized) => realized,
                        Err(error) => {
                            this.ledger.rollback();
                            return Err(error.into());
                        }
                    };
                let value = match this.token.to_circulating(principal) {
                    Ok(value) => value,
                    Err(error) => {
                        this.ledger.rollback();
                        return Err(error.into());
                    }
                };
                total_principal = total_principal
                    .checked_add(principal)
                    .ok_or(LedgerError::AmountOverflow)
                    .map_err(|error| {
                        this.ledger.rollback();
                        DirectorError::from(error)
                    })?;
                returned = returned
                    .checked_add(value)
                    .ok_or(LedgerError::AmountOverflow)
                    .map_err(|error| {
                        this.ledger.rollback();
                        DirectorError::from(error)
                    })?;
                if !realized.is_zero() {
                    payouts.push((recipient, realized));
                }
            }

            if let Err(error) = this.token.transfer(&custody, donor, returned) {
                this.ledger.rollback();
                return Err(error.into());
            }
            let mut paid: Vec<(AccountId, Circulating)> = Vec::new();
            for (recipient, payout) in &payouts {
                if let Err(error) = this.token.transfer(&custody, recipient, *payout) {
                    // Unwind the transfers already made, then the ledger.
                    for (done, value) in &paid {
                        let _ = this.token.transfer(done, &custody, *value);
                    }
                    let _ = this.token.transfer(donor, &custody, returned);
                    this.ledger.rollback();
                    return Err(error.into());
                }
                paid.push((recipient.clone(), *payout));
            }
            this.ledger.commit();

            info!(%donor, %total_principal, %returned, "withdraw_all");
            Ok(total_principal)
        })
    }

    /// Redeem the yield one donor's record owes `recipient`. The caller is
    /// the claiming recipient.
    pub fn redeem_yield(
        &mut self,
        recipient: &AccountId,
        donor: &AccountId,
    ) -> DirectorResult<Circulating> {
        self.locked(recipient.clone(), |this| {
            let custody = this.custody.clone();

            this.ledger.begin();
            let payout = match this.ledger.redeem_yield(recipient, donor, &this.token) {
                Ok(payout) => payout,
                Err(error) => {
                    this.ledger.rollback();
                    return Err(error.into());
                }
            };
            if payout.is_zero() {
                this.ledger.commit();
                return Ok(Circulating::ZERO);
            }
            if let Err(error) = this.token.transfer(&custody, recipient, payout) {
                this.ledger.rollback();
                return Err(error.into());
            }
            this.ledger.commit();

            info!(%recipient, %donor, %payout, "redeem_yield");
            Ok(payout)
        })
    }

    /// Redeem every donor's yield owed to `recipient` in one call, returning
    /// the aggregate payout. Zero-yield records are skipped silently.
    pub fn redeem_all(&mut self, recipient: &AccountId) -> DirectorResult<Circulating> {
        self.locked(recipient.clone(), |this| {
            let custody = this.custody.clone();

            this.ledger.begin();
            let total = match this.ledger.redeem_all(recipient, &this.token) {
                Ok(total) => total,
                Err(error) => {
                    this.ledger.rollback();
                    return Err(error.into());
                }
            };
            if total.is_zero() {
                this.ledger.commit();
                return Ok(Circulating::ZERO);
            }
            if let Err(error) = this.token.transfer(&custody, recipient, total) {
                this.ledger.rollback();
                return Err(error.into());
            }
            this.ledger.commit();

            info!(%recipient, %total, "redeem_all");
            Ok(total)
        })
    }

    // -- views --------------------------------------------------------------

    pub fn donated_balance_of(&self, donor: &AccountId, recipient: &AccountId) -> Principal {
        self.ledger.donated_balance_of(donor, recipient)
    }

    pub fn total_donated(&self, donor: &AccountId) -> Principal {
        self.ledger.total_donated(donor)
    }

    pub fn redeemable_balance_of(&self, recipient: &AccountId) -> DirectorResult<Circulating> {
        Ok(self.ledger.redeemable_balance_of(recipient, &self.token)?)
    }

    /// All active donations of `donor` as (recipient, principal) pairs.
    pub fn all_deposits(&self, donor: &AccountId) -> Vec<(AccountId, Principal)> {
        self.ledger.donations_of(donor)
    }

    pub fn custody(&self) -> &AccountId {
        &self.custody
    }

    pub fn ledger(&self) -> &DonationLedger {
        &self.ledger
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    /// Mutable token access for collaborator actions (mint, rebase, approve)
    /// in tests, demos, and the CLI.
    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    // -- internals ----------------------------------------------------------

    /// One private path guards every public operation: insert the acting
    /// account into the in-flight set, run, remove on every exit path.
    fn locked<R>(
        &mut self,
        account: AccountId,
        f: impl FnOnce(&mut Self) -> DirectorResult<R>,
    ) -> DirectorResult<R> {
        if !self.in_flight.insert(account.clone()) {
            return Err(DirectorError::ReentrantCall(account));
        }
        let result = f(self);
        self.in_flight.remove(&account);
        result
    }

    fn withdraw_unlocked(
        &mut self,
        donor: &AccountId,
        recipient: &AccountId,
        amount: Principal,
    ) -> DirectorResult<Circulating> {
        let custody = self.custody.clone();

        self.ledger.begin();
        let realized = match self.ledger.withdraw(donor, recipient, amount, &self.token) {
            Ok(realized) => realized,
            Err(error) => {
                self.ledger.rollback();
                return Err(error.into());
            }
        };
        let returned = match self.token.to_circulating(amount) {
            Ok(returned) => returned,
            Err(error) => {
                self.ledger.rollback();
                return Err(error.into());
            }
        };
        if let Err(error) = self.token.transfer(&custody, donor, returned) {
            self.ledger.rollback();
            return Err(error.into());
        }
        if !realized.is_zero() {
            if let Err(error) = self.token.transfer(&custody, recipient, realized) {
                // Compensate the principal return, then roll the ledger back.
                let _ = self.token.transfer(donor, &custody, returned);
                self.ledger.rollback();
                return Err(error.into());
            }
        }
        self.ledger.commit();

        info!(%donor, %recipient, %amount, %realized, "withdraw");
        Ok(realized)
    }
}

#[cfg(test)]
mod tests {
    use tithe_ledger::LedgerAuditor;
    use tithe_types::RebaseIndex;

    use crate::token::StakedToken;

    use super::*;

    fn account(label: &str) -> AccountId {
        AccountId::from_label(label)
    }

    fn index(decimal: &str) -> RebaseIndex {
        RebaseIndex::from_decimal_str(decimal).unwrap()
    }

    /// Director over a fresh token at index 1.0 with `alice` funded and
    /// approved. `reserve` is minted into custody to stand in for the staking
    /// pool emissions that back yield payouts in a real deployment.
    fn funded_director(balance: u128, reserve: u128) -> YieldDirector<StakedToken> {
        let custody = account("custody");
        let mut token = StakedToken::new(RebaseIndex::ONE);
        token
            .mint(&account("alice"), Circulating::new(balance))
            .unwrap();
        if reserve > 0 {
            token.mint(&custody, Circulating::new(reserve)).unwrap();
        }
        token.approve(&account("alice"), &custody, Circulating::new(u64::MAX as u128));
        YieldDirector::new(token, custody)
    }

    #[test]
    fn deposit_pulls_tokens_into_custody() {
        let mut director = funded_director(1_000, 0);
        let (alice, bob) = (account("alice"), account("bob"));

        director.deposit(&alice, &bob, Principal::new(400)).unwrap();

        assert_eq!(director.token().balance_of(&alice), Circulating::new(600));
        assert_eq!(
            director.token().balance_of(director.custody()),
            Circulating::new(400)
        );
        assert_eq!(director.donated_balance_of(&alice, &bob), Principal::new(400));
    }

    #[test]
    fn deposit_beyond_wallet_fails_with_insufficient_balance() {
        let mut director = funded_director(1_000, 0);
        let (alice, bob) = (account("alice"), account("bob"));

        let error = director
            .deposit(&alice, &bob, Principal::new(1_001))
            .unwrap_err();
        assert_eq!(
            error,
            DirectorError::Ledger(LedgerError::InsufficientBalance {
                available: Principal::new(1_000),
                requested: Principal::new(1_001),
            })
        );
        assert_eq!(director.total_donated(&alice), Principal::ZERO);
    }

    #[test]
    fn failed_transfer_rolls_the_ledger_back() {
        let custody = account("custody");
        let mut token = StakedToken::new(RebaseIndex::ONE);
        token.mint(&account("alice"), Circulating::new(1_000)).unwrap();
        // No allowance: the pull must fail after the ledger mutation.
        let mut director = YieldDirector::new(token, custody);
        let (alice, bob) = (account("alice"), account("bob"));

        let error = director
            .deposit(&alice, &bob, Principal::new(100))
            .unwrap_err();
        assert!(matches!(
            error,
            DirectorError::Ledger(LedgerError::TransferFailed(_))
        ));
        assert_eq!(director.total_donated(&alice), Principal::ZERO);
        assert_eq!(director.ledger().record_count(), 0);
        assert!(LedgerAuditor::audit(director.ledger()).is_valid());
    }

    #[test]
    fn rebase_then_redeem_pays_exact_yield_once() {
        let mut director = funded_director(1_000, 0);
        let (alice, bob) = (account("alice"), account("bob"));

        director.deposit(&alice, &bob, Principal::new(1_000)).unwrap();
        director.token_mut().rebase(index("1.25")).unwrap();

        assert_eq!(
            director.redeemable_balance_of(&bob).unwrap(),
            Circulating::new(250)
        );
        let payout = director.redeem_yield(&bob, &alice).unwrap();
        assert_eq!(payout, Circulating::new(250));
        assert_eq!(director.token().balance_of(&bob), Circulating::new(250));

        // Same index epoch: nothing further to redeem.
        let payout = director.redeem_yield(&bob, &alice).unwrap();
        assert_eq!(payout, Circulating::ZERO);

        // Principal stays untouched by redemption.
        assert_eq!(director.donated_balance_of(&alice, &bob), Principal::new(1_000));
    }

    #[test]
    fn withdraw_pays_yield_then_returns_principal() {
        let mut director = funded_director(1_000, 0);
        let (alice, bob) = (account("alice"), account("bob"));

        director.deposit(&alice, &bob, Principal::new(1_000)).unwrap();
        director.token_mut().rebase(index("1.25")).unwrap();

        let realized = director.withdraw(&alice, &bob, Principal::new(400)).unwrap();
        assert_eq!(realized, Circulating::new(250));
        // Bob got the yield on the full 1000.
        assert_eq!(director.token().balance_of(&bob), Circulating::new(250));
        // Alice got the 400 withdrawn principal back at its current value.
        assert_eq!(director.token().balance_of(&alice), Circulating::new(500));
        assert_eq!(director.donated_balance_of(&alice, &bob), Principal::new(600));

        // The remaining 600 keeps accruing from a fresh baseline.
        director.token_mut().rebase(index("1.5")).unwrap();
        assert_eq!(
            director.redeemable_balance_of(&bob).unwrap(),
            Circulating::new(150)
        );
    }

    #[test]
    fn withdraw_all_clears_every_donation() {
        // Reserve backs the yield payouts, standing in for pool emissions.
        let mut director = funded_director(1_000, 200);
        let (alice, bob, carol) = (account("alice"), account("bob"), account("carol"));

        director.deposit(&alice, &bob, Principal::new(600)).unwrap();
        director.deposit(&alice, &carol, Principal::new(400)).unwrap();
        director.token_mut().rebase(index("1.25")).unwrap();

        let withdrawn = director.withdraw_all(&alice).unwrap();
        assert_eq!(withdrawn, Principal::new(1_000));
        assert_eq!(director.total_donated(&alice), Principal::ZERO);
        assert!(director.all_deposits(&alice).is_empty());
        // Yield landed with the recipients, principal back with Alice.
        assert_eq!(director.token().balance_of(&bob), Circulating::new(150));
        assert_eq!(director.token().balance_of(&carol), Circulating::new(100));
        assert_eq!(director.token().balance_of(&alice), Circulating::new(1_250));
        assert!(LedgerAuditor::audit(director.ledger()).is_valid());
    }

    #[test]
    fn withdraw_all_without_donations_fails() {
        let mut director = funded_director(100, 0);
        let error = director.withdraw_all(&account("alice")).unwrap_err();
        assert_eq!(error, DirectorError::Ledger(LedgerError::NoSuchDonation));
    }

    #[test]
    fn redeem_all_aggregates_across_donors() {
        let custody = account("custody");
        let mut token = StakedToken::new(RebaseIndex::ONE);
        for donor in ["alice", "bob"] {
            token.mint(&account(donor), Circulating::new(1_000)).unwrap();
            token.approve(
                &account(donor),
                &custody,
                Circulating::new(u64::MAX as u128),
            );
        }
        let mut director = YieldDirector::new(token, custody);
        let carol = account("carol");

        director
            .deposit(&account("alice"), &carol, Principal::new(1_000))
            .unwrap();
        director
            .deposit(&account("bob"), &carol, Principal::new(400))
            .unwrap();
        director.token_mut().rebase(index("1.25")).unwrap();

        let total = director.redeem_all(&carol).unwrap();
        assert_eq!(total, Circulating::new(350));
        assert_eq!(director.token().balance_of(&carol), Circulating::new(350));

        // Nothing left in the same index epoch.
        assert_eq!(director.redeem_all(&carol).unwrap(), Circulating::ZERO);
    }

    #[test]
    fn nested_reentry_is_rejected() {
        let mut director = funded_director(1_000, 0);
        let alice = account("alice");

        director.in_flight.insert(alice.clone());
        let error = director
            .deposit(&alice, &account("bob"), Principal::new(1))
            .unwrap_err();
        assert_eq!(error, DirectorError::ReentrantCall(alice.clone()));

        // The lock belongs to the in-flight call; a released lock admits the
        // next call normally.
        director.in_flight.remove(&alice);
        director
            .deposit(&alice, &account("bob"), Principal::new(1))
            .unwrap();
    }

    #[test]
    fn repeated_redemption_tracks_total_growth() {
        let mut director = funded_director(800, 0);
        let (alice, bob) = (account("alice"), account("bob"));
        director.deposit(&alice, &bob, Principal::new(800)).unwrap();

        director.token_mut().rebase(index("1.25")).unwrap();
        let first = director.redeem_all(&bob).unwrap();
        assert_eq!(first, Circulating::new(200));

        director.token_mut().rebase(index("1.5")).unwrap();
        let second = director.redeem_all(&bob).unwrap();
        assert_eq!(second, Circulating::new(200));

        // Snapshot differencing: the sum of payouts equals the growth of the
        // donated principal, no yield is fabricated or lost across epochs.
        assert_eq!(first.checked_add(second), Some(Circulating::new(400)));
        assert_eq!(director.redeemable_balance_of(&bob).unwrap(), Circulating::ZERO);
    }
}
