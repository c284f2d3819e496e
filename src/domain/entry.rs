use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, AmountError};

pub type EntryId = Uuid;

/// Shared by every entry belonging to one balanced ledger operation.
pub type TransactionGroupId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Money entering the ledger from outside
    Deposit,
    /// Money leaving the ledger
    Withdrawal,
    /// Money moving between two accounts inside the ledger
    Transfer,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Deposit => "deposit",
            OperationType::Withdrawal => "withdrawal",
            OperationType::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(OperationType::Deposit),
            "withdrawal" => Some(OperationType::Withdrawal),
            "transfer" => Some(OperationType::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable debit-or-credit row against an account.
/// Entries are append-only; there is no update or delete path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    /// Insertion order assigned by storage
    pub sequence: i64,
    pub account_id: AccountId,
    pub transaction_id: TransactionGroupId,
    pub debit: Decimal,
    pub credit: Decimal,
    pub operation_type: OperationType,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// Signed effect on the account balance: credit - debit.
    pub fn net(&self) -> Decimal {
        self.credit - self.debit
    }
}

/// An entry that has not been written yet.
///
/// Constructed only through [`NewEntry::debit`] and [`NewEntry::credit`], which
/// reject non-positive amounts, so a pending entry is always single-sided.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub transaction_id: TransactionGroupId,
    pub debit: Decimal,
    pub credit: Decimal,
    pub operation_type: OperationType,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewEntry {
    pub fn debit(
        account_id: AccountId,
        transaction_id: TransactionGroupId,
        amount: Decimal,
        operation_type: OperationType,
    ) -> Result<Self, AmountError> {
        Self::single_sided(account_id, transaction_id, amount, Decimal::ZERO, operation_type)
    }

    pub fn credit(
        account_id: AccountId,
        transaction_id: TransactionGroupId,
        amount: Decimal,
        operation_type: OperationType,
    ) -> Result<Self, AmountError> {
        Self::single_sided(account_id, transaction_id, Decimal::ZERO, amount, operation_type)
    }

    fn single_sided(
        account_id: AccountId,
        transaction_id: TransactionGroupId,
        debit: Decimal,
        credit: Decimal,
        operation_type: OperationType,
    ) -> Result<Self, AmountError> {
        if !is_single_sided(debit, credit) {
            return Err(AmountError::NotPositive(debit.max(credit).to_string()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            transaction_id,
            debit,
            credit,
            operation_type,
            description: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Exactly one side of an entry is strictly positive and the other is zero.
pub fn is_single_sided(debit: Decimal, credit: Decimal) -> bool {
    (debit > Decimal::ZERO && credit.is_zero()) || (debit.is_zero() && credit > Decimal::ZERO)
}
