use futures::FutureExt;
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{
    Account, AccountId, Entry, NewEntry, OperationType, Reconciliation, TransactionGroupId, UserId,
    format_amount, from_minor_units, is_valid_currency, parse_amount, to_minor_units,
};
use crate::storage::{IsolationLevel, Page, Queries, Repository, RowLock};

use super::AppError;

/// Application service providing the ledger operations.
/// This is the primary interface for any client (CLI, API, etc.).
///
/// Holds no mutable state of its own: concurrent callers are coordinated by
/// the storage transaction and its locks.
pub struct LedgerService {
    repo: Repository,
    config: Config,
}

impl LedgerService {
    pub fn new(repo: Repository, config: Config) -> Self {
        Self { repo, config }
    }

    /// Initialize the database and seed the settlement account if it does not exist yet.
    pub async fn init(config: Config) -> Result<Self, AppError> {
        if !is_valid_currency(&config.settlement_currency) {
            return Err(AppError::InvalidCurrency(config.settlement_currency));
        }

        let repo = Repository::init(&config).await?;
        let service = Self::new(repo, config);
        service.seed_settlement_account().await?;
        Ok(service)
    }

    /// Connect to an existing database.
    pub async fn connect(config: Config) -> Result<Self, AppError> {
        let repo = Repository::connect(&config).await?;
        Ok(Self::new(repo, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    async fn seed_settlement_account(&self) -> Result<Account, AppError> {
        let currency = self.config.settlement_currency.clone();
        self.repo
            .exec_tx(self.config.isolation, move |q| {
                seed_settlement(q, currency).boxed()
            })
            .await
    }

    // ========================
    // Money movement
    // ========================

    /// Move external money into an account: credit the account, debit settlement.
    #[instrument(skip(self))]
    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount: &str,
    ) -> Result<TransactionGroupId, AppError> {
        let amount = parse_amount(amount)?;
        self.repo
            .exec_tx(self.config.isolation, move |q| {
                post_deposit(q, account_id, amount).boxed()
            })
            .await
    }

    /// Move money out of the ledger: debit the account, credit settlement.
    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        account_id: AccountId,
        amount: &str,
    ) -> Result<TransactionGroupId, AppError> {
        let amount = parse_amount(amount)?;
        self.repo
            .exec_tx(self.config.isolation, move |q| {
                post_withdrawal(q, account_id, amount).boxed()
            })
            .await
    }

    /// Move money between two accounts of the same currency.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        from_id: AccountId,
        to_id: AccountId,
        amount: &str,
    ) -> Result<TransactionGroupId, AppError> {
        let amount = parse_amount(amount)?;
        if from_id == to_id {
            return Err(AppError::SameAccountTransfer(from_id));
        }

        self.repo
            .exec_tx(self.config.isolation, move |q| {
                post_transfer(q, from_id, to_id, amount).boxed()
            })
            .await
    }

    /// Compare the cached balance with SUM(credit) - SUM(debit) over the entry log.
    ///
    /// Drift is reported through `matched == false`, never as an error.
    #[instrument(skip(self))]
    pub async fn reconcile_account(
        &self,
        account_id: AccountId,
    ) -> Result<Reconciliation, AppError> {
        // Balance and entry sum must come from the same snapshot
        let result = self
            .repo
            .exec_tx(IsolationLevel::Deferred, move |q| {
                read_reconciliation(q, account_id).boxed()
            })
            .await?;

        if result.matched {
            info!(
                account_id = %account_id,
                balance = %format_amount(result.stored),
                "Account reconciled successfully"
            );
        } else {
            error!(
                account_id = %account_id,
                stored_balance = %format_amount(result.stored),
                calculated = %format_amount(result.computed),
                "Balance mismatch detected"
            );
        }

        Ok(result)
    }

    // ========================
    // Account operations
    // ========================

    /// Open a user account with a zero balance.
    pub async fn open_account(
        &self,
        name: &str,
        currency: &str,
        owner_id: Option<UserId>,
    ) -> Result<Account, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::EmptyAccountName);
        }
        if !is_valid_currency(currency) {
            return Err(AppError::InvalidCurrency(currency.to_string()));
        }

        let account = Account::new(name.to_string(), currency.to_string(), owner_id);

        let mut conn = self.repo.acquire().await?;
        Queries::new(&mut conn).create_account(&account).await?;

        info!(account_id = %account.id, currency = %account.currency, "Account opened");
        Ok(account)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        let mut conn = self.repo.acquire().await?;
        let account = Queries::new(&mut conn)
            .get_account(id, RowLock::None)
            .await?;
        account.ok_or(AppError::AccountNotFound(id))
    }

    pub async fn settlement_account(&self) -> Result<Account, AppError> {
        let mut conn = self.repo.acquire().await?;
        let settlement = Queries::new(&mut conn)
            .get_settlement_account(RowLock::None)
            .await?;
        settlement.ok_or(AppError::SettlementAccountMissing)
    }

    /// List user accounts, optionally only those of one owner.
    pub async fn list_accounts(&self, owner: Option<UserId>) -> Result<Vec<Account>, AppError> {
        let mut conn = self.repo.acquire().await?;
        let accounts = Queries::new(&mut conn).list_accounts(owner).await?;
        Ok(accounts)
    }

    /// Owned accounts are only visible to their owner.
    pub fn authorize(&self, account: &Account, caller: UserId) -> Result<(), AppError> {
        if account.is_accessible_by(caller) {
            Ok(())
        } else {
            warn!(account_id = %account.id, caller = %caller, "Access denied");
            Err(AppError::AccessDenied(account.id))
        }
    }

    /// Fetch an account, checking ownership when a caller identity is given.
    pub async fn get_account_as(
        &self,
        id: AccountId,
        caller: Option<UserId>,
    ) -> Result<Account, AppError> {
        let account = self.get_account(id).await?;
        if let Some(caller) = caller {
            self.authorize(&account, caller)?;
        }
        Ok(account)
    }

    /// Sum of all balances, settlement included. Zero on a consistent ledger.
    pub async fn ledger_total(&self) -> Result<Decimal, AppError> {
        let mut conn = self.repo.acquire().await?;
        let total = Queries::new(&mut conn).total_balance().await?;
        Ok(total)
    }

    // ========================
    // Entry queries
    // ========================

    /// Entries of an account, newest first.
    pub async fn list_entries(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>, AppError> {
        let mut conn = self.repo.acquire().await?;
        let mut q = Queries::new(&mut conn);

        if q.get_account(account_id, RowLock::None).await?.is_none() {
            return Err(AppError::AccountNotFound(account_id));
        }
        Ok(q.list_entries_by_account(account_id, page).await?)
    }

    /// All entries of one transaction group, in the order they were written.
    pub async fn get_transaction(
        &self,
        transaction_id: TransactionGroupId,
    ) -> Result<Vec<Entry>, AppError> {
        let mut conn = self.repo.acquire().await?;
        let entries = Queries::new(&mut conn)
            .list_entries_by_transaction(transaction_id)
            .await?;

        if entries.is_empty() {
            return Err(AppError::TransactionNotFound(transaction_id));
        }
        Ok(entries)
    }
}

// ========================
// Transaction bodies
// ========================
//
// Lock order is fixed: settlement first, then user accounts by ascending id.
// The settlement account is never the target of a user-facing operation.

async fn read_reconciliation(
    mut q: Queries<'_>,
    account_id: AccountId,
) -> Result<Reconciliation, AppError> {
    let account = q
        .get_account(account_id, RowLock::None)
        .await?
        .ok_or(AppError::AccountNotFound(account_id))?;
    let computed = q.calculated_balance(account_id).await?;

    Ok(Reconciliation::new(
        account_id,
        account.balance,
        from_minor_units(computed),
    ))
}

async fn seed_settlement(mut q: Queries<'_>, currency: String) -> Result<Account, AppError> {
    if let Some(existing) = q.get_settlement_account(RowLock::None).await? {
        if existing.currency != currency {
            warn!(
                configured = %currency,
                existing = %existing.currency,
                "Settlement account already exists with a different currency"
            );
        }
        return Ok(existing);
    }

    let settlement = Account::settlement(currency);
    q.create_account(&settlement).await?;
    info!(
        account_id = %settlement.id,
        currency = %settlement.currency,
        "Seeded settlement account"
    );
    Ok(settlement)
}

async fn post_deposit(
    mut q: Queries<'_>,
    account_id: AccountId,
    amount: Decimal,
) -> Result<TransactionGroupId, AppError> {
    let settlement = lock_settlement(&mut q).await?;
    let account = lock_user_account(&mut q, account_id).await?;
    ensure_same_currency(&settlement, &account)?;
    ensure_representable(account.balance + amount)?;
    ensure_representable(settlement.balance - amount)?;

    let group_id = Uuid::new_v4();

    q.create_entry(
        &NewEntry::credit(account.id, group_id, amount, OperationType::Deposit)?
            .with_description("External deposit"),
    )
    .await?;
    q.create_entry(
        &NewEntry::debit(settlement.id, group_id, amount, OperationType::Deposit)?
            .with_description(format!("Deposit to account {}", account.id)),
    )
    .await?;

    q.update_account_balance(account.id, amount).await?;
    q.update_account_balance(settlement.id, -amount).await?;

    info!(
        group_id = %group_id,
        account_id = %account.id,
        amount = %format_amount(amount),
        "Deposit completed"
    );
    Ok(group_id)
}

async fn post_withdrawal(
    mut q: Queries<'_>,
    account_id: AccountId,
    amount: Decimal,
) -> Result<TransactionGroupId, AppError> {
    let settlement = lock_settlement(&mut q).await?;
    let account = lock_user_account(&mut q, account_id).await?;
    ensure_same_currency(&settlement, &account)?;
    ensure_funds(&account, amount)?;
    ensure_representable(settlement.balance + amount)?;

    let group_id = Uuid::new_v4();

    q.create_entry(
        &NewEntry::debit(account.id, group_id, amount, OperationType::Withdrawal)?
            .with_description("External withdrawal"),
    )
    .await?;
    q.create_entry(
        &NewEntry::credit(settlement.id, group_id, amount, OperationType::Withdrawal)?
            .with_description(format!("Withdrawal from {}", account.id)),
    )
    .await?;

    q.update_account_balance(account.id, -amount).await?;
    q.update_account_balance(settlement.id, amount).await?;

    info!(
        group_id = %group_id,
        account_id = %account.id,
        amount = %format_amount(amount),
        "Withdrawal completed"
    );
    Ok(group_id)
}

async fn post_transfer(
    mut q: Queries<'_>,
    from_id: AccountId,
    to_id: AccountId,
    amount: Decimal,
) -> Result<TransactionGroupId, AppError> {
    let (first, second) = if from_id < to_id {
        (from_id, to_id)
    } else {
        (to_id, from_id)
    };
    let first = lock_user_account(&mut q, first).await?;
    let second = lock_user_account(&mut q, second).await?;
    let (from, to) = if first.id == from_id {
        (first, second)
    } else {
        (second, first)
    };

    ensure_same_currency(&from, &to)?;
    ensure_funds(&from, amount)?;
    ensure_representable(to.balance + amount)?;

    let group_id = Uuid::new_v4();

    q.create_entry(
        &NewEntry::debit(from.id, group_id, amount, OperationType::Transfer)?
            .with_description(format!("Transfer to {}", to.id)),
    )
    .await?;
    q.create_entry(
        &NewEntry::credit(to.id, group_id, amount, OperationType::Transfer)?
            .with_description(format!("Transfer from {}", from.id)),
    )
    .await?;

    q.update_account_balance(from.id, -amount).await?;
    q.update_account_balance(to.id, amount).await?;

    info!(
        group_id = %group_id,
        from_id = %from.id,
        to_id = %to.id,
        amount = %format_amount(amount),
        "Transfer completed"
    );
    Ok(group_id)
}

async fn lock_settlement(q: &mut Queries<'_>) -> Result<Account, AppError> {
    q.get_settlement_account(RowLock::ForUpdate)
        .await?
        .ok_or(AppError::SettlementAccountMissing)
}

/// Lock a user account. The system flag is checked on a plain read first so
/// the settlement row is never locked out of order.
async fn lock_user_account(q: &mut Queries<'_>, id: AccountId) -> Result<Account, AppError> {
    let account = q
        .get_account(id, RowLock::None)
        .await?
        .ok_or(AppError::AccountNotFound(id))?;
    if account.is_system {
        return Err(AppError::SystemAccount(id));
    }

    q.get_account(id, RowLock::ForUpdate)
        .await?
        .ok_or(AppError::AccountNotFound(id))
}

fn ensure_same_currency(expected: &Account, found: &Account) -> Result<(), AppError> {
    if expected.currency != found.currency {
        return Err(AppError::CurrencyMismatch {
            expected: expected.currency.clone(),
            found: found.currency.clone(),
        });
    }
    Ok(())
}

fn ensure_funds(account: &Account, amount: Decimal) -> Result<(), AppError> {
    if account.balance < amount {
        return Err(AppError::InsufficientFunds {
            account_id: account.id,
            available: account.balance,
            requested: amount,
        });
    }
    Ok(())
}

/// A resulting balance must still fit the stored integer column.
fn ensure_representable(balance: Decimal) -> Result<(), AppError> {
    to_minor_units(balance)?;
    Ok(())
}
