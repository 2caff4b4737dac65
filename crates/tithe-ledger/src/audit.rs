use std::collections::BTreeMap;
use std::fmt;

use tithe_types::{AccountId, Principal};

use crate::donation::DonationLedger;
use crate::registry::RecipientEntry;

/// Result of a full-rescan audit of the ledger's derived state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditReport {
    pub record_count: usize,
    pub donor_count: usize,
    pub recipient_count: usize,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific divergence between incremental aggregates and the raw records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub description: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.description)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    DonorTotalMismatch,
    RegistryMembershipMismatch,
    RecipientPrincipalMismatch,
    EmptyRecord,
    InvalidPair,
}

/// Full-rescan verifier for the ledger's incremental bookkeeping.
///
/// The ledger maintains donor totals and the recipient registry
/// incrementally; the auditor recomputes both from the raw donation records
/// and reports every divergence. Verification and testing only, never part of
/// the operation hot path.
pub struct LedgerAuditor;

impl LedgerAuditor {
    pub fn audit(ledger: &DonationLedger) -> AuditReport {
        let mut violations = Vec::new();
        let mut donor_totals: BTreeMap<AccountId, Principal> = BTreeMap::new();
        let mut recipients: BTreeMap<AccountId, RecipientEntry> = BTreeMap::new();

        for (donor, recipient, record) in ledger.entries() {
            if record.principal.is_zero() {
                violations.push(Violation {
                    kind: ViolationKind::EmptyRecord,
                    description: format!("zero-principal record {donor} -> {recipient}"),
                });
            }
            if recipient.is_null() || recipient == donor {
                violations.push(Violation {
                    kind: ViolationKind::InvalidPair,
                    description: format!("invalid pair {donor} -> {recipient}"),
                });
            }

            let total = donor_totals.entry(donor.clone()).or_insert(Principal::ZERO);
            *total = total
                .checked_add(record.principal)
                .unwrap_or(Principal::new(u128::MAX));

            let entry = recipients.entry(recipient.clone()).or_default();
            entry.donors.insert(donor.clone());
            entry.total_principal = entry
                .total_principal
                .checked_add(record.principal)
                .unwrap_or(Principal::new(u128::MAX));
        }

        // Donor totals: rescan vs incremental, both directions.
        for (donor, expected) in &donor_totals {
            let actual = ledger.total_donated(donor);
            if actual != *expected {
                violations.push(Violation {
                    kind: ViolationKind::DonorTotalMismatch,
                    description: format!(
                        "donor {donor}: incremental {actual}, rescan {expected}"
                    ),
                });
            }
        }
        for (donor, total) in &ledger.donor_totals {
            if !donor_totals.contains_key(donor) {
                violations.push(Violation {
                    kind: ViolationKind::DonorTotalMismatch,
                    description: format!("donor {donor}: stale total {total} with no records"),
                });
            }
        }

        // Registry: membership and principal aggregates, both directions.
        for (recipient, expected) in &recipients {
            match ledger.registry.entry(recipient) {
                None => violations.push(Violation {
                    kind: ViolationKind::RegistryMembershipMismatch,
                    description: format!("recipient {recipient} missing from registry"),
                }),
                Some(entry) => {
                    if entry.donors != expected.donors {
                        violations.push(Violation {
                            kind: ViolationKind::RegistryMembershipMismatch,
                            description: format!(
                                "recipient {recipient}: registry lists {} donors, rescan {}",
                                entry.donors.len(),
                                expected.donors.len()
                            ),
                        });
                    }
                    if entry.total_principal != expected.total_principal {
                        violations.push(Violation {
                            kind: ViolationKind::RecipientPrincipalMismatch,
                            description: format!(
                                "recipient {recipient}: incremental {}, rescan {}",
                                entry.total_principal, expected.total_principal
                            ),
                        });
                    }
                }
            }
        }
        for recipient in ledger.registry.recipients() {
            if !recipients.contains_key(recipient) {
                violations.push(Violation {
                    kind: ViolationKind::RegistryMembershipMismatch,
                    description: format!("recipient {recipient}: stale registry entry"),
                });
            }
        }

        AuditReport {
            record_count: ledger.record_count(),
            donor_count: donor_totals.len(),
            recipient_count: recipients.len(),
            violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use tithe_types::{Circulating, RebaseIndex};

    use crate::donation::DonationRecord;

    use super::*;

    fn account(label: &str) -> AccountId {
        AccountId::from_label(label)
    }

    fn populated_ledger() -> DonationLedger {
        let mut ledger = DonationLedger::new();
        let index = RebaseIndex::ONE;
        ledger
            .deposit(&account("alice"), &account("carol"), Principal::new(1_000), &index)
            .unwrap();
        ledger
            .deposit(&account("bob"), &account("carol"), Principal::new(500), &index)
            .unwrap();
        ledger
            .deposit(&account("alice"), &account("dave"), Principal::new(250), &index)
            .unwrap();
        ledger
    }

    #[test]
    fn clean_ledger_passes() {
        let ledger = populated_ledger();
        let report = LedgerAuditor::audit(&ledger);
        assert!(report.is_valid(), "{:?}", report.violations);
        assert_eq!(report.record_count, 3);
        assert_eq!(report.donor_count, 2);
        assert_eq!(report.recipient_count, 2);
    }

    #[test]
    fn empty_ledger_passes() {
        let report = LedgerAuditor::audit(&DonationLedger::new());
        assert!(report.is_valid());
        assert_eq!(report.record_count, 0);
    }

    #[test]
    fn tampered_donor_total_is_detected() {
        let mut ledger = populated_ledger();
        ledger
            .donor_totals
            .insert(account("alice"), Principal::new(999));

        let report = LedgerAuditor::audit(&ledger);
        assert!(!report.is_valid());
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::DonorTotalMismatch));
    }

    #[test]
    fn stale_registry_entry_is_detected() {
        let mut ledger = populated_ledger();
        ledger.registry.set(
            &account("nobody"),
            Some(RecipientEntry {
                donors: [account("alice")].into(),
                total_principal: Principal::new(1),
            }),
        );

        let report = LedgerAuditor::audit(&ledger);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::RegistryMembershipMismatch));
    }

    #[test]
    fn tampered_recipient_principal_is_detected() {
        let mut ledger = populated_ledger();
        let carol = account("carol");
        let mut entry = ledger.registry.entry(&carol).cloned().unwrap();
        entry.total_principal = Principal::new(1);
        ledger.registry.set(&carol, Some(entry));

        let report = LedgerAuditor::audit(&ledger);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::RecipientPrincipalMismatch));
    }

    #[test]
    fn zero_principal_record_is_flagged() {
        let mut ledger = populated_ledger();
        ledger.records.insert(
            (account("eve"), account("carol")),
            DonationRecord {
                principal: Principal::ZERO,
                agnostic: Circulating::ZERO,
            },
        );

        let report = LedgerAuditor::audit(&ledger);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::EmptyRecord));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// No double counting: after any sequence of operations the
            /// incremental aggregates equal a full rescan of the records.
            #[test]
            fn incremental_tracking_equals_rescan(
                ops in proptest::collection::vec(
                    (0..3usize, 0..3usize, 0..4u8, 1..5_000u64, 0..50_000_000u32),
                    1..50,
                )
            ) {
                let donors: Vec<AccountId> =
                    ["d0", "d1", "d2"].iter().map(|l| account(l)).collect();
                let recipients: Vec<AccountId> =
                    ["r0", "r1", "r2"].iter().map(|l| account(l)).collect();

                let mut ledger = DonationLedger::new();
                let mut index = RebaseIndex::ONE;

                for (d, r, kind, amount, bump) in ops {
                    index = RebaseIndex::from_raw(index.raw() + bump as u128).unwrap();
                    let amount = Principal::new(amount as u128);
                    match kind {
                        0 => {
                            let _ = ledger.deposit(&donors[d], &recipients[r], amount, &index);
                        }
                        1 => {
                            let _ = ledger.withdraw(&donors[d], &recipients[r], amount, &index);
                        }
                        2 => {
                            let _ = ledger.redeem_yield(&recipients[r], &donors[d], &index);
                        }
                        _ => {
                            let _ = ledger.redeem_all(&recipients[r], &index);
                        }
                    }

                    let report = LedgerAuditor::audit(&ledger);
                    prop_assert!(report.is_valid(), "{:?}", report.violations);
                }
            }
        }
    }
}
