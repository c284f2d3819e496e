use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{AccountId, AmountError, TransactionGroupId};
use crate::storage::TxError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("Currency mismatch: {expected} vs {found}")]
    CurrencyMismatch { expected: String, found: String },

    #[error("Insufficient funds in account {account_id}: balance {available}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Cannot transfer to the same account: {0}")]
    SameAccountTransfer(AccountId),

    #[error("Account {0} is a system account and cannot be used directly")]
    SystemAccount(AccountId),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Settlement account is missing; run init first")]
    SettlementAccountMissing,

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionGroupId),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Account name must not be empty")]
    EmptyAccountName,

    #[error("Access denied to account {0}")]
    AccessDenied(AccountId),

    #[error(transparent)]
    Transaction(#[from] TxError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Broad classes callers react to differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; retrying with the same input fails the same way
    ClientInput,
    NotFound,
    Forbidden,
    /// Storage failure; nothing was persisted, the same call may be retried
    Infrastructure,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidAmount(_)
            | AppError::CurrencyMismatch { .. }
            | AppError::InsufficientFunds { .. }
            | AppError::SameAccountTransfer(_)
            | AppError::SystemAccount(_)
            | AppError::InvalidCurrency(_)
            | AppError::EmptyAccountName => ErrorKind::ClientInput,
            AppError::AccountNotFound(_) | AppError::TransactionNotFound(_) => ErrorKind::NotFound,
            AppError::AccessDenied(_) => ErrorKind::Forbidden,
            AppError::SettlementAccountMissing
            | AppError::Transaction(_)
            | AppError::Database(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}
