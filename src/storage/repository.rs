use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{
    Account, AccountId, Entry, MinorUnits, NewEntry, OperationType, TransactionGroupId, UserId,
    from_minor_units, to_minor_units,
};

use super::MIGRATION_001_INITIAL;

const ACCOUNT_COLUMNS: &str =
    "id, owner_id, name, currency, is_system, balance, version, created_at";

const ENTRY_COLUMNS: &str = "sequence, id, account_id, transaction_id, debit, credit, operation_type, description, created_at";

/// Whether a read should take the write lock on the rows it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    None,
    /// Held until the enclosing transaction commits or rolls back
    ForUpdate,
}

/// Window over a newest-first listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    /// Limit is clamped to 1..=100.
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}

/// Owns the connection pool and the schema.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to an existing database.
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(config, false).await
    }

    /// Initialize a database (create if missing + migrate).
    pub async fn init(config: &Config) -> Result<Self> {
        let repo = Self::open(config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    async fn open(config: &Config, create_if_missing: bool) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .context("Invalid database URL")?
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.lock_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check out a connection for reads outside a transaction.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire database connection")
    }
}

/// Account and entry data access bound to one connection, usually the one
/// owning the current transaction.
pub struct Queries<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> Queries<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    // ========================
    // Account operations
    // ========================

    pub async fn create_account(&mut self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, owner_id, name, currency, is_system, balance, version, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.owner_id.map(|id| id.to_string()))
        .bind(&account.name)
        .bind(&account.currency)
        .bind(account.is_system)
        .bind(to_minor_units(account.balance)?)
        .bind(account.version)
        .bind(account.created_at.to_rfc3339())
        .execute(&mut *self.conn)
        .await
        .context("Failed to create account")?;
        Ok(())
    }

    /// Get an account by ID.
    ///
    /// SQLite has no `SELECT ... FOR UPDATE`; a locking read bumps the row version
    /// instead, which takes the database write lock and returns the current row
    /// in the same statement.
    pub async fn get_account(&mut self, id: AccountId, lock: RowLock) -> Result<Option<Account>> {
        let sql = match lock {
            RowLock::None => format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"),
            RowLock::ForUpdate => format!(
                "UPDATE accounts SET version = version + 1 WHERE id = ? RETURNING {ACCOUNT_COLUMNS}"
            ),
        };

        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .context("Failed to fetch account")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Get the singleton settlement account.
    pub async fn get_settlement_account(&mut self, lock: RowLock) -> Result<Option<Account>> {
        let sql = match lock {
            RowLock::None => format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE is_system = 1"),
            RowLock::ForUpdate => format!(
                "UPDATE accounts SET version = version + 1 WHERE is_system = 1 RETURNING {ACCOUNT_COLUMNS}"
            ),
        };

        let row = sqlx::query(&sql)
            .fetch_optional(&mut *self.conn)
            .await
            .context("Failed to fetch settlement account")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// List user accounts, newest first, optionally restricted to one owner.
    pub async fn list_accounts(&mut self, owner: Option<UserId>) -> Result<Vec<Account>> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query(&format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner_id = ? ORDER BY created_at DESC"
                ))
                .bind(owner.to_string())
                .fetch_all(&mut *self.conn)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE is_system = 0 ORDER BY created_at DESC"
                ))
                .fetch_all(&mut *self.conn)
                .await
            }
        }
        .context("Failed to list accounts")?;

        rows.iter().map(row_to_account).collect()
    }

    /// Add a signed delta to the cached balance. Never overwrites the balance.
    pub async fn update_account_balance(&mut self, id: AccountId, delta: Decimal) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET balance = balance + ? WHERE id = ?")
            .bind(to_minor_units(delta)?)
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .context("Failed to update account balance")?;

        if result.rows_affected() != 1 {
            bail!("Balance update matched {} rows for account {}", result.rows_affected(), id);
        }
        Ok(())
    }

    /// Sum of every cached balance, settlement included.
    pub async fn total_balance(&mut self) -> Result<Decimal> {
        let total: MinorUnits =
            sqlx::query("SELECT COALESCE(SUM(balance), 0) AS total FROM accounts")
                .fetch_one(&mut *self.conn)
                .await
                .context("Failed to sum balances")?
                .get("total");

        Ok(from_minor_units(total))
    }

    // ========================
    // Entry operations
    // ========================

    /// Append an entry. Storage assigns the sequence number.
    pub async fn create_entry(&mut self, entry: &NewEntry) -> Result<Entry> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO entries (id, account_id, transaction_id, debit, credit, operation_type, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(entry.id.to_string())
        .bind(entry.account_id.to_string())
        .bind(entry.transaction_id.to_string())
        .bind(to_minor_units(entry.debit)?)
        .bind(to_minor_units(entry.credit)?)
        .bind(entry.operation_type.as_str())
        .bind(&entry.description)
        .bind(entry.created_at.to_rfc3339())
        .fetch_one(&mut *self.conn)
        .await
        .context("Failed to create entry")?;

        row_to_entry(&row)
    }

    /// Entries for an account, newest first.
    pub async fn list_entries_by_account(
        &mut self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<Entry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM entries
            WHERE account_id = ?
            ORDER BY sequence DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(account_id.to_string())
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&mut *self.conn)
        .await
        .context("Failed to list entries for account")?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Entries sharing a transaction group, in creation order.
    pub async fn list_entries_by_transaction(
        &mut self,
        transaction_id: TransactionGroupId,
    ) -> Result<Vec<Entry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE transaction_id = ? ORDER BY sequence"
        ))
        .bind(transaction_id.to_string())
        .fetch_all(&mut *self.conn)
        .await
        .context("Failed to list entries for transaction")?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Balance derived from the entry log: SUM(credit) - SUM(debit).
    pub async fn calculated_balance(&mut self, account_id: AccountId) -> Result<MinorUnits> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(credit), 0) - COALESCE(SUM(debit), 0) AS balance
            FROM entries
            WHERE account_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .fetch_one(&mut *self.conn)
        .await
        .context("Failed to calculate balance")?;

        Ok(row.get("balance"))
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp: {value}"))?
        .with_timezone(&Utc))
}

fn row_to_account(row: &SqliteRow) -> Result<Account> {
    let id_str: String = row.get("id");
    let owner_str: Option<String> = row.get("owner_id");
    let created_at_str: String = row.get("created_at");

    Ok(Account {
        id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
        owner_id: owner_str
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .context("Invalid owner ID")?,
        name: row.get("name"),
        currency: row.get("currency"),
        is_system: row.get("is_system"),
        balance: from_minor_units(row.get("balance")),
        version: row.get("version"),
        created_at: parse_timestamp(&created_at_str)?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<Entry> {
    let id_str: String = row.get("id");
    let account_str: String = row.get("account_id");
    let transaction_str: String = row.get("transaction_id");
    let operation_str: String = row.get("operation_type");
    let created_at_str: String = row.get("created_at");

    Ok(Entry {
        id: Uuid::parse_str(&id_str).context("Invalid entry ID")?,
        sequence: row.get("sequence"),
        account_id: Uuid::parse_str(&account_str).context("Invalid account ID")?,
        transaction_id: Uuid::parse_str(&transaction_str).context("Invalid transaction ID")?,
        debit: from_minor_units(row.get("debit")),
        credit: from_minor_units(row.get("credit")),
        operation_type: OperationType::from_str(&operation_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid operation type: {}", operation_str))?,
        description: row.get("description"),
        created_at: parse_timestamp(&created_at_str)?,
    })
}
