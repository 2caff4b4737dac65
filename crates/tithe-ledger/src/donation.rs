use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tithe_types::{AccountId, Circulating, Principal};
use tracing::debug;

use crate::error::LedgerError;
use crate::registry::{RecipientEntry, RecipientRegistry};
use crate::traits::IndexSource;

/// The per-(donor, recipient) ledger entry.
///
/// `principal` is the donor's contribution in principal units; `agnostic` is
/// the circulating-unit mirror captured at deposit / last baseline. Yield is
/// always a **difference of circulating snapshots**:
/// `to_circulating(principal) - agnostic`. Never compute it as
/// `index delta x principal`: floor conversion makes that drift across
/// repeated partial operations, and snapshot differencing guarantees the sum
/// of individual yields never exceeds the rebase-induced growth of the
/// underlying balance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRecord {
    pub principal: Principal,
    pub agnostic: Circulating,
}

impl DonationRecord {
    /// Yield accrued since the last baseline, at the current index.
    ///
    /// Non-negative whenever the index is non-decreasing; a conversion below
    /// the stored baseline means the collaborator violated monotonicity and
    /// is reported as [`LedgerError::IndexRegression`].
    pub fn yield_owed(&self, index: &dyn IndexSource) -> Result<Circulating, LedgerError> {
        let current = index.to_circulating(self.principal)?;
        current
            .checked_sub(self.agnostic)
            .ok_or(LedgerError::IndexRegression(current, self.agnostic))
    }
}

/// (donor, recipient)
type PairKey = (AccountId, AccountId);

/// Prior value of one piece of touched state, for transaction rollback.
#[derive(Clone, Debug)]
enum UndoEntry {
    Record {
        donor: AccountId,
        recipient: AccountId,
        prev: Option<DonationRecord>,
    },
    DonorTotal {
        donor: AccountId,
        prev: Option<Principal>,
    },
    Recipient {
        recipient: AccountId,
        prev: Option<RecipientEntry>,
    },
}

/// The donation ledger: the sole mutator of donation records and their
/// donor/recipient aggregates.
///
/// Operations validate fully before mutating, so a returned error implies no
/// state change. For call-level atomicity spanning the external token
/// transfer, wrap a call in [`begin`](Self::begin) /
/// [`commit`](Self::commit) / [`rollback`](Self::rollback): while a
/// transaction is open, every touched value's prior state is journaled and
/// `rollback` restores all of it in reverse order.
#[derive(Clone, Debug, Default)]
pub struct DonationLedger {
    pub(crate) records: BTreeMap<PairKey, DonationRecord>,
    pub(crate) donor_totals: BTreeMap<AccountId, Principal>,
    pub(crate) registry: RecipientRegistry,
    journal: Option<Vec<UndoEntry>>,
}

impl DonationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // -- transactions -------------------------------------------------------

    /// Start journaling touched state. Panics in debug builds if a
    /// transaction is already open; transactions do not nest.
    pub fn begin(&mut self) {
        debug_assert!(self.journal.is_none(), "ledger transaction already open");
        self.journal = Some(Vec::new());
    }

    /// Discard the journal, keeping all mutations.
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Restore every value touched since `begin`, in reverse order.
    /// A no-op when no transaction is open.
    pub fn rollback(&mut self) {
        let Some(mut journal) = self.journal.take() else {
            return;
        };
        while let Some(entry) = journal.pop() {
            match entry {
                UndoEntry::Record {
                    donor,
                    recipient,
                    prev,
                } => match prev {
                    Some(record) => {
                        self.records.insert((donor, recipient), record);
                    }
                    None => {
                        self.records.remove(&(donor, recipient));
                    }
                },
                UndoEntry::DonorTotal { donor, prev } => match prev {
                    Some(total) => {
                        self.donor_totals.insert(donor, total);
                    }
                    None => {
                        self.donor_totals.remove(&donor);
                    }
                },
                UndoEntry::Recipient { recipient, prev } => {
                    self.registry.set(&recipient, prev);
                }
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }

    // -- operations ---------------------------------------------------------

    /// Record a donation of `amount` principal from `donor` to `recipient`.
    ///
    /// The newly added principal starts with zero yield: the circulating
    /// mirror grows by `to_circulating(amount)` at the current index. Yield
    /// already accrued on an existing record is untouched.
    pub fn deposit(
        &mut self,
        donor: &AccountId,
        recipient: &AccountId,
        amount: Principal,
        index: &dyn IndexSource,
    ) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if recipient.is_null() || recipient == donor {
            return Err(LedgerError::InvalidRecipient);
        }

        let added = index.to_circulating(amount)?;
        let record = self
            .records
            .get(&(donor.clone(), recipient.clone()))
            .cloned()
            .unwrap_or_default();
        let principal = record
            .principal
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let agnostic = record
            .agnostic
            .checked_add(added)
            .ok_or(LedgerError::AmountOverflow)?;
        let donor_total = self
            .total_donated(donor)
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let mut entry = self.registry.entry_or_default(recipient);
        entry.donors.insert(donor.clone());
        entry.total_principal = entry
            .total_principal
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;

        self.put_record(donor, recipient, Some(DonationRecord { principal, agnostic }));
        self.put_donor_total(donor, Some(donor_total));
        self.put_recipient(recipient, Some(entry));

        debug!(%donor, %recipient, %amount, "donation principal deposited");
        Ok(())
    }

    /// Remove `amount` principal from the (donor, recipient) record.
    ///
    /// All yield accrued on the full record up to the current index is
    /// realized first and returned for payment to the recipient; withdrawal
    /// must never destroy already-earned yield. The surviving principal is
    /// re-baselined at zero yield (`agnostic = to_circulating(remaining)`).
    /// A record whose principal reaches zero is deleted and the donor leaves
    /// the recipient's registry set.
    pub fn withdraw(
        &mut self,
        donor: &AccountId,
        recipient: &AccountId,
        amount: Principal,
        index: &dyn IndexSource,
    ) -> Result<Circulating, LedgerError> {
        let record = self
            .records
            .get(&(donor.clone(), recipient.clone()))
            .cloned()
            .ok_or(LedgerError::NoSuchDonation)?;
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if amount > record.principal {
            return Err(LedgerError::InsufficientDonation {
                donated: record.principal,
                requested: amount,
            });
        }

        let realized = record.yield_owed(index)?;
        let remaining = record
            .principal
            .checked_sub(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let new_record = if remaining.is_zero() {
            None
        } else {
            Some(DonationRecord {
                principal: remaining,
                agnostic: index.to_circulating(remaining)?,
            })
        };
        let donor_total = self
            .total_donated(donor)
            .checked_sub(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let mut entry = self.registry.entry_or_default(recipient);
        entry.total_principal = entry
            .total_principal
            .checked_sub(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        if remaining.is_zero() {
            entry.donors.remove(donor);
        }

        self.put_record(donor, recipient, new_record);
        self.put_donor_total(
            donor,
            if donor_total.is_zero() {
                None
            } else {
                Some(donor_total)
            },
        );
        self.put_recipient(
            recipient,
            if entry.donors.is_empty() {
                None
            } else {
                Some(entry)
            },
        );

        debug!(%donor, %recipient, %amount, %realized, "donation principal withdrawn");
        Ok(realized)
    }

    /// Realize the current yield of one record without touching principal.
    ///
    /// Returns the payout owed to the recipient and re-baselines the mirror
    /// so the same yield is never paid twice. Idempotent at a fixed index:
    /// with zero accrued yield this mutates nothing and pays zero.
    pub fn redeem_yield(
        &mut self,
        recipient: &AccountId,
        donor: &AccountId,
        index: &dyn IndexSource,
    ) -> Result<Circulating, LedgerError> {
        let record = self
            .records
            .get(&(donor.clone(), recipient.clone()))
            .cloned()
            .ok_or(LedgerError::NoSuchDonation)?;
        let payout = record.yield_owed(index)?;
        if payout.is_zero() {
            return Ok(Circulating::ZERO);
        }
        let current = record
            .agnostic
            .checked_add(payout)
            .ok_or(LedgerError::AmountOverflow)?;
        self.put_record(
            donor,
            recipient,
            Some(DonationRecord {
                principal: record.principal,
                agnostic: current,
            }),
        );

        debug!(%recipient, %donor, %payout, "yield redeemed");
        Ok(payout)
    }

    /// Redeem the yield of every record funding `recipient`, returning the
    /// aggregate payout. Zero-yield records are skipped silently; one empty
    /// record never fails the batch.
    pub fn redeem_all(
        &mut self,
        recipient: &AccountId,
        index: &dyn IndexSource,
    ) -> Result<Circulating, LedgerError> {
        let donors: Vec<AccountId> = self.registry.donors_of(recipient).cloned().collect();
        let mut total = Circulating::ZERO;
        for donor in &donors {
            let payout = self.redeem_yield(recipient, donor, index)?;
            total = total
                .checked_add(payout)
                .ok_or(LedgerError::AmountOverflow)?;
        }
        Ok(total)
    }

    // -- views --------------------------------------------------------------

    pub fn record(&self, donor: &AccountId, recipient: &AccountId) -> Option<&DonationRecord> {
        self.records.get(&(donor.clone(), recipient.clone()))
    }

    /// Principal donated by `donor` to `recipient`; zero if no record.
    pub fn donated_balance_of(&self, donor: &AccountId, recipient: &AccountId) -> Principal {
        self.record(donor, recipient)
            .map(|r| r.principal)
            .unwrap_or(Principal::ZERO)
    }

    /// Sum of `donor`'s principal across all recipients.
    pub fn total_donated(&self, donor: &AccountId) -> Principal {
        self.donor_totals
            .get(donor)
            .copied()
            .unwrap_or(Principal::ZERO)
    }

    /// Total yield currently redeemable by `recipient`, summed per record
    /// over exactly the recipient's donor set, O(donors of recipient).
    pub fn redeemable_balance_of(
        &self,
        recipient: &AccountId,
        index: &dyn IndexSource,
    ) -> Result<Circulating, LedgerError> {
        let mut total = Circulating::ZERO;
        for donor in self.registry.donors_of(recipient) {
            let record = self
                .records
                .get(&(donor.clone(), recipient.clone()))
                .ok_or(LedgerError::NoSuchDonation)?;
            total = total
                .checked_add(record.yield_owed(index)?)
                .ok_or(LedgerError::AmountOverflow)?;
        }
        Ok(total)
    }

    /// All of `donor`'s active donations as (recipient, principal) pairs.
    pub fn donations_of(&self, donor: &AccountId) -> Vec<(AccountId, Principal)> {
        self.records
            .iter()
            .filter(|((d, _), _)| d == donor)
            .map(|((_, recipient), record)| (recipient.clone(), record.principal))
            .collect()
    }

    pub fn registry(&self) -> &RecipientRegistry {
        &self.registry
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Iterate all records as (donor, recipient, record).
    pub fn entries(&self) -> impl Iterator<Item = (&AccountId, &AccountId, &DonationRecord)> {
        self.records
            .iter()
            .map(|((donor, recipient), record)| (donor, recipient, record))
    }

    /// Rebuild a ledger from raw record entries, recomputing every aggregate.
    /// Used when loading persisted state; rejects entries a live ledger could
    /// never contain.
    pub fn from_entries<I>(entries: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = (AccountId, AccountId, DonationRecord)>,
    {
        let mut ledger = Self::new();
        for (donor, recipient, record) in entries {
            if recipient.is_null() || recipient == donor {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "invalid pair {donor} -> {recipient}"
                )));
            }
            if record.principal.is_zero() {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "zero-principal record {donor} -> {recipient}"
                )));
            }
            let key = (donor.clone(), recipient.clone());
            if ledger.records.contains_key(&key) {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "duplicate record {donor} -> {recipient}"
                )));
            }

            let donor_total = ledger
                .total_donated(&donor)
                .checked_add(record.principal)
                .ok_or(LedgerError::AmountOverflow)?;
            let mut entry = ledger.registry.entry_or_default(&recipient);
            entry.donors.insert(donor.clone());
            entry.total_principal = entry
                .total_principal
                .checked_add(record.principal)
                .ok_or(LedgerError::AmountOverflow)?;

            ledger.records.insert(key, record);
            ledger.donor_totals.insert(donor, donor_total);
            ledger.registry.set(&recipient, Some(entry));
        }
        Ok(ledger)
    }

    // -- journaled mutation primitives --------------------------------------

    fn put_record(
        &mut self,
        donor: &AccountId,
        recipient: &AccountId,
        value: Option<DonationRecord>,
    ) {
        let key = (donor.clone(), recipient.clone());
        let prev = match value {
            Some(record) => self.records.insert(key, record),
            None => self.records.remove(&key),
        };
        if let Some(journal) = &mut self.journal {
            journal.push(UndoEntry::Record {
                donor: donor.clone(),
                recipient: recipient.clone(),
                prev,
            });
        }
    }

    fn put_donor_total(&mut self, donor: &AccountId, value: Option<Principal>) {
        let prev = match value {
            Some(total) => self.donor_totals.insert(donor.clone(), total),
            None => self.donor_totals.remove(donor),
        };
        if let Some(journal) = &mut self.journal {
            journal.push(UndoEntry::DonorTotal {
                donor: donor.clone(),
                prev,
            });
        }
    }

    fn put_recipient(&mut self, recipient: &AccountId, value: Option<RecipientEntry>) {
        let prev = self.registry.entry(recipient).cloned();
        self.registry.set(recipient, value);
        if let Some(journal) = &mut self.journal {
            journal.push(UndoEntry::Recipient {
                recipient: recipient.clone(),
                prev,
            });
        }
    }
}
