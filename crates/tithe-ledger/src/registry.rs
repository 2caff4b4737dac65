use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tithe_types::{AccountId, Principal};

/// Per-recipient denormalized state: the set of donors currently funding the
/// recipient plus the incremental sum of their donated principal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientEntry {
    pub donors: BTreeSet<AccountId>,
    pub total_principal: Principal,
}

/// Derived index from recipient to funding donors.
///
/// Exists so recipient-side redemption is O(donors of that recipient) rather
/// than O(all donation records). Maintained incrementally by the ledger's
/// mutating operations; the auditor recomputes it by full rescan to verify.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRegistry {
    entries: BTreeMap<AccountId, RecipientEntry>,
}

impl RecipientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for a recipient, if any donor currently funds it.
    pub fn entry(&self, recipient: &AccountId) -> Option<&RecipientEntry> {
        self.entries.get(recipient)
    }

    /// Donors currently funding `recipient`, in deterministic order.
    pub fn donors_of(&self, recipient: &AccountId) -> impl Iterator<Item = &AccountId> {
        self.entries
            .get(recipient)
            .into_iter()
            .flat_map(|entry| entry.donors.iter())
    }

    /// All recipients with at least one active donor.
    pub fn recipients(&self) -> impl Iterator<Item = &AccountId> {
        self.entries.keys()
    }

    pub fn recipient_count(&self) -> usize {
        self.entries.len()
    }

    /// Replace or remove a recipient's entry wholesale. The ledger journals
    /// the prior value before calling this, so transactions can restore it.
    pub(crate) fn set(&mut self, recipient: &AccountId, entry: Option<RecipientEntry>) {
        match entry {
            Some(entry) => {
                self.entries.insert(recipient.clone(), entry);
            }
            None => {
                self.entries.remove(recipient);
            }
        }
    }

    /// Current entry cloned for mutation, or a fresh empty one.
    pub(crate) fn entry_or_default(&self, recipient: &AccountId) -> RecipientEntry {
        self.entries.get(recipient).cloned().unwrap_or_default()
    }
}
