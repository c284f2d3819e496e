use rust_decimal::Decimal;
use serde::Serialize;

use super::{AccountId, Entry};

/// Compute an account balance from its entries.
/// Balance = sum of credits - sum of debits
pub fn compute_balance(entries: &[Entry]) -> Decimal {
    entries.iter().map(Entry::net).sum()
}

/// A transaction group balances when its debits and credits cancel out.
pub fn is_balanced(entries: &[Entry]) -> bool {
    let debits: Decimal = entries.iter().map(|e| e.debit).sum();
    let credits: Decimal = entries.iter().map(|e| e.credit).sum();
    debits == credits
}

/// Outcome of comparing an account's cached balance with its entry log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub account_id: AccountId,
    pub stored: Decimal,
    pub computed: Decimal,
    pub matched: bool,
}

impl Reconciliation {
    pub fn new(account_id: AccountId, stored: Decimal, computed: Decimal) -> Self {
        Self {
            account_id,
            stored,
            computed,
            matched: stored == computed,
        }
    }

    /// Stored minus computed; zero when matched.
    pub fn drift(&self) -> Decimal {
        self.stored - self.computed
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::domain::OperationType;

    fn make_entry(account: AccountId, debit: Decimal, credit: Decimal) -> Entry {
        Entry {
            id: Uuid::new_v4(),
            sequence: 0,
            account_id: account,
            transaction_id: Uuid::new_v4(),
            debit,
            credit,
            operation_type: OperationType::Transfer,
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_compute_balance_empty() {
        assert_eq!(compute_balance(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_compute_balance_mixed() {
        let account = Uuid::new_v4();
        let entries = vec![
            make_entry(account, dec!(0), dec!(100)), // +100
            make_entry(account, dec!(30.5), dec!(0)), // -30.5
            make_entry(account, dec!(0), dec!(0.25)), // +0.25
        ];

        assert_eq!(compute_balance(&entries), dec!(69.75));
    }

    #[test]
    fn test_is_balanced() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let balanced = vec![make_entry(a, dec!(20), dec!(0)), make_entry(b, dec!(0), dec!(20))];
        assert!(is_balanced(&balanced));

        let lopsided = vec![make_entry(a, dec!(20), dec!(0)), make_entry(b, dec!(0), dec!(19))];
        assert!(!is_balanced(&lopsided));
    }

    #[test]
    fn test_reconciliation_reports_both_values() {
        let account = Uuid::new_v4();

        let ok = Reconciliation::new(account, dec!(100.0000), dec!(100));
        assert!(ok.matched);
        assert_eq!(ok.drift(), Decimal::ZERO);

        let drifted = Reconciliation::new(account, dec!(100), dec!(99.9999));
        assert!(!drifted.matched);
        assert_eq!(drifted.stored, dec!(100));
        assert_eq!(drifted.computed, dec!(99.9999));
        assert_eq!(drifted.drift(), dec!(0.0001));
    }
}
