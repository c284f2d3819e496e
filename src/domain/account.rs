use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AccountId = Uuid;

/// Identity of the user owning an account. Authentication happens upstream;
/// the ledger only compares identities.
pub type UserId = Uuid;

pub const SETTLEMENT_ACCOUNT_NAME: &str = "Settlement";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Absent for system accounts
    pub owner_id: Option<UserId>,
    pub name: String,
    /// ISO-like 3-letter code, always uppercase
    pub currency: String,
    pub is_system: bool,
    /// Cached balance; must equal SUM(credit) - SUM(debit) over the account's entries
    pub balance: Decimal,
    /// Bumped by every locking read, rolled back with the transaction
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new user account with a zero balance.
    pub fn new(name: String, currency: String, owner_id: Option<UserId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            currency: currency.to_ascii_uppercase(),
            is_system: false,
            balance: Decimal::ZERO,
            version: 0,
            created_at: Utc::now(),
        }
    }

    /// The settlement account stands in for money entering or leaving the ledger.
    pub fn settlement(currency: String) -> Self {
        Self {
            is_system: true,
            ..Self::new(SETTLEMENT_ACCOUNT_NAME.to_string(), currency, None)
        }
    }

    /// An account without owner is visible to every caller; otherwise only its owner.
    pub fn is_accessible_by(&self, caller: UserId) -> bool {
        self.owner_id.is_none_or(|owner| owner == caller)
    }
}

/// Currency codes are three ASCII letters ("NGN", "usd").
pub fn is_valid_currency(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_starts_empty() {
        let account = Account::new("Savings".into(), "ngn".into(), None);
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.currency, "NGN");
        assert!(!account.is_system);
    }

    #[test]
    fn test_settlement_is_system_without_owner() {
        let settlement = Account::settlement("NGN".into());
        assert!(settlement.is_system);
        assert!(settlement.owner_id.is_none());
        assert_eq!(settlement.name, SETTLEMENT_ACCOUNT_NAME);
    }

    #[test]
    fn test_ownership() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let account = Account::new("Checking".into(), "NGN".into(), Some(owner));

        assert!(account.is_accessible_by(owner));
        assert!(!account.is_accessible_by(stranger));
        assert!(Account::settlement("NGN".into()).is_accessible_by(stranger));
    }

    #[test]
    fn test_currency_validation() {
        assert!(is_valid_currency("NGN"));
        assert!(is_valid_currency("usd"));
        assert!(!is_valid_currency("US"));
        assert!(!is_valid_currency("EURO"));
        assert!(!is_valid_currency("U$D"));
        assert!(!is_valid_currency(""));
    }
}
