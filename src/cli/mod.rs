use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::application::LedgerService;
use crate::config::{Config, DEFAULT_DATABASE, DEFAULT_SETTLEMENT_CURRENCY};
use crate::domain::{Account, Entry, Reconciliation, UserId, format_amount};
use crate::storage::{IsolationLevel, Page};

/// Ledger - double-entry bank ledger
#[derive(Parser)]
#[command(name = "ledger")]
#[command(about = "A double-entry bank ledger with atomic deposits, withdrawals and transfers")]
#[command(version)]
pub struct Cli {
    /// Database file path (or sqlite: URL)
    #[arg(short, long, env = "LEDGER_DATABASE", default_value = DEFAULT_DATABASE, global = true)]
    pub database: String,

    /// How long to wait for a lock held by another operation, in milliseconds
    #[arg(long, env = "LEDGER_LOCK_TIMEOUT_MS", default_value_t = 5000, global = true)]
    pub lock_timeout_ms: u64,

    /// Isolation for money-moving operations: deferred, serializable, exclusive
    #[arg(long, env = "LEDGER_ISOLATION", default_value = "serializable", global = true)]
    pub isolation: String,

    /// Act as this user; account-scoped commands check ownership
    #[arg(long = "as", value_name = "USER_ID", global = true)]
    pub caller: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database and seed the settlement account
    Init {
        /// Settlement currency (3-letter code)
        #[arg(
            short,
            long,
            env = "LEDGER_SETTLEMENT_CURRENCY",
            default_value = DEFAULT_SETTLEMENT_CURRENCY
        )]
        currency: String,
    },

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Deposit external money into an account
    Deposit {
        /// Account ID
        account: String,

        /// Amount (e.g., "100.0000" or "100")
        amount: String,
    },

    /// Withdraw money from an account
    Withdraw {
        /// Account ID
        account: String,

        /// Amount (e.g., "50.0000" or "50")
        amount: String,
    },

    /// Transfer money between two accounts
    Transfer {
        /// Amount to transfer (e.g., "20.0000" or "20")
        amount: String,

        /// Source account ID
        #[arg(long)]
        from: String,

        /// Destination account ID
        #[arg(long)]
        to: String,
    },

    /// List entries of an account, newest first
    Entries {
        /// Account ID
        account: String,

        /// Maximum number of entries (1-100)
        #[arg(short, long, default_value_t = Page::DEFAULT_LIMIT)]
        limit: u32,

        /// Number of entries to skip
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Show all entries of one transaction
    Transaction {
        /// Transaction ID
        id: String,
    },

    /// Verify an account's balance against its entries
    Reconcile {
        /// Account ID
        account: String,
    },

    /// Show the settlement account
    Settlement,

    /// Reconcile every account and verify that all balances sum to zero
    Check,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Open {
        /// Account name
        name: String,

        /// Currency code (e.g., NGN, USD)
        #[arg(short, long, default_value = DEFAULT_SETTLEMENT_CURRENCY)]
        currency: String,

        /// Owner user ID (defaults to --as)
        #[arg(long)]
        owner: Option<String>,
    },

    /// List accounts
    List {
        /// Only accounts of this owner (defaults to --as)
        #[arg(long)]
        owner: Option<String>,
    },

    /// Show account details
    Show {
        /// Account ID
        id: String,
    },
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let isolation = IsolationLevel::from_str(&self.isolation).with_context(|| {
            format!(
                "Invalid isolation level '{}'. Valid levels: deferred, serializable, exclusive",
                self.isolation
            )
        })?;

        Ok(Config::new(&self.database)
            .with_isolation(isolation)
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms)))
    }

    fn caller(&self) -> Result<Option<UserId>> {
        self.caller
            .as_deref()
            .map(|s| parse_id(s, "user"))
            .transpose()
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config()?;
        let caller = self.caller()?;
        let json = self.json;

        match self.command {
            Commands::Init { currency } => {
                let service =
                    LedgerService::init(config.with_settlement_currency(currency)).await?;
                let settlement = service.settlement_account().await?;
                println!("Database initialized: {}", self.database);
                println!(
                    "Settlement account: {} ({})",
                    settlement.id, settlement.currency
                );
            }

            Commands::Account(account_cmd) => {
                let service = LedgerService::connect(config).await?;
                run_account_command(&service, account_cmd, caller, json).await?;
            }

            Commands::Deposit { account, amount } => {
                let service = LedgerService::connect(config).await?;
                let account = service
                    .get_account_as(parse_id(&account, "account")?, caller)
                    .await?;
                let group_id = service.deposit(account.id, &amount).await?;
                print_posting(&service, "Deposited", &amount, &account, group_id, json).await?;
            }

            Commands::Withdraw { account, amount } => {
                let service = LedgerService::connect(config).await?;
                let account = service
                    .get_account_as(parse_id(&account, "account")?, caller)
                    .await?;
                let group_id = service.withdraw(account.id, &amount).await?;
                print_posting(&service, "Withdrew", &amount, &account, group_id, json).await?;
            }

            Commands::Transfer { amount, from, to } => {
                let service = LedgerService::connect(config).await?;
                let from = service
                    .get_account_as(parse_id(&from, "account")?, caller)
                    .await?;
                let to_id = parse_id(&to, "account")?;
                let group_id = service.transfer(from.id, to_id, &amount).await?;

                if json {
                    print_json(&service.get_transaction(group_id).await?)?;
                } else {
                    println!(
                        "Transferred {} {} -> {} ({})",
                        amount, from.id, to_id, group_id
                    );
                }
            }

            Commands::Entries {
                account,
                limit,
                offset,
            } => {
                let service = LedgerService::connect(config).await?;
                let account = service
                    .get_account_as(parse_id(&account, "account")?, caller)
                    .await?;
                let entries = service
                    .list_entries(account.id, Page::new(limit, offset))
                    .await?;

                if json {
                    print_json(&entries)?;
                } else if entries.is_empty() {
                    println!("No entries found.");
                } else {
                    print_entries(&entries);
                }
            }

            Commands::Transaction { id } => {
                let service = LedgerService::connect(config).await?;
                let entries = service
                    .get_transaction(parse_id(&id, "transaction")?)
                    .await?;

                if json {
                    print_json(&entries)?;
                } else {
                    println!("Transaction: {}", id);
                    print_entries(&entries);
                }
            }

            Commands::Reconcile { account } => {
                let service = LedgerService::connect(config).await?;
                let account = service
                    .get_account_as(parse_id(&account, "account")?, caller)
                    .await?;
                let result = service.reconcile_account(account.id).await?;

                if json {
                    print_json(&result)?;
                } else {
                    print_reconciliation(&account, &result);
                }
                if !result.matched {
                    anyhow::bail!("Balance mismatch detected for account {}", account.id);
                }
            }

            Commands::Settlement => {
                let service = LedgerService::connect(config).await?;
                let settlement = service.settlement_account().await?;
                if json {
                    print_json(&settlement)?;
                } else {
                    print_account(&settlement);
                }
            }

            Commands::Check => {
                let service = LedgerService::connect(config).await?;
                run_check_command(&service).await?;
            }
        }

        Ok(())
    }
}

async fn run_account_command(
    service: &LedgerService,
    cmd: AccountCommands,
    caller: Option<UserId>,
    json: bool,
) -> Result<()> {
    match cmd {
        AccountCommands::Open {
            name,
            currency,
            owner,
        } => {
            let owner = match owner {
                Some(s) => Some(parse_id(&s, "owner")?),
                None => caller,
            };
            let account = service.open_account(&name, &currency, owner).await?;

            if json {
                print_json(&account)?;
            } else {
                println!(
                    "Opened account: {} ({}, {})",
                    account.name, account.currency, account.id
                );
            }
        }

        AccountCommands::List { owner } => {
            let owner = match owner {
                Some(s) => Some(parse_id(&s, "owner")?),
                None => caller,
            };
            let accounts = service.list_accounts(owner).await?;

            if json {
                print_json(&accounts)?;
            } else if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!(
                    "{:<36}  {:<20} {:>18} {:<8}",
                    "ID", "NAME", "BALANCE", "CURRENCY"
                );
                println!("{}", "-".repeat(86));
                for account in accounts {
                    println!(
                        "{:<36}  {:<20} {:>18} {:<8}",
                        account.id,
                        truncate(&account.name, 20),
                        format_amount(account.balance),
                        account.currency
                    );
                }
            }
        }

        AccountCommands::Show { id } => {
            let account = service
                .get_account_as(parse_id(&id, "account")?, caller)
                .await?;
            if json {
                print_json(&account)?;
            } else {
                print_account(&account);
            }
        }
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let mut accounts = vec![service.settlement_account().await?];
    accounts.extend(service.list_accounts(None).await?);

    let mut drifted = Vec::new();
    for account in &accounts {
        let result = service.reconcile_account(account.id).await?;
        if !result.matched {
            drifted.push(result);
        }
    }

    let total = service.ledger_total().await?;
    println!("Accounts:      {}", accounts.len());
    println!(
        "Ledger total:  {}  {}",
        format_amount(total),
        if total.is_zero() { "OK" } else { "UNBALANCED!" }
    );
    println!();

    if drifted.is_empty() && total.is_zero() {
        println!("Ledger is consistent.");
        return Ok(());
    }

    println!("Issues found:");
    for result in &drifted {
        println!(
            "  - {}: stored {}, calculated {}",
            result.account_id,
            format_amount(result.stored),
            format_amount(result.computed)
        );
    }
    if !total.is_zero() {
        println!("  - balances sum to {} instead of zero", format_amount(total));
    }
    anyhow::bail!("Ledger integrity check failed");
}

async fn print_posting(
    service: &LedgerService,
    verb: &str,
    amount: &str,
    account: &Account,
    group_id: Uuid,
    json: bool,
) -> Result<()> {
    if json {
        return print_json(&service.get_transaction(group_id).await?);
    }

    let updated = service.get_account(account.id).await?;
    println!(
        "{} {} {} ({}): balance {} {}",
        verb,
        amount,
        account.currency,
        group_id,
        format_amount(updated.balance),
        updated.currency
    );
    Ok(())
}

fn print_account(account: &Account) {
    println!("Account: {}", account.name);
    println!("  ID:        {}", account.id);
    if let Some(owner) = account.owner_id {
        println!("  Owner:     {}", owner);
    }
    println!("  Currency:  {}", account.currency);
    println!(
        "  System:    {}",
        if account.is_system { "yes" } else { "no" }
    );
    println!(
        "  Balance:   {} {}",
        format_amount(account.balance),
        account.currency
    );
    println!(
        "  Created:   {}",
        account.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_entries(entries: &[Entry]) {
    println!(
        "{:<20} {:<11} {:>16} {:>16}  {:<36} DESCRIPTION",
        "DATE", "TYPE", "DEBIT", "CREDIT", "TRANSACTION"
    );
    println!("{}", "-".repeat(130));
    for entry in entries {
        println!(
            "{:<20} {:<11} {:>16} {:>16}  {:<36} {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.operation_type,
            format_amount(entry.debit),
            format_amount(entry.credit),
            entry.transaction_id,
            truncate(entry.description.as_deref().unwrap_or(""), 50)
        );
    }
}

fn print_reconciliation(account: &Account, result: &Reconciliation) {
    println!("Account:    {} ({})", account.name, account.id);
    println!(
        "Stored:     {} {}",
        format_amount(result.stored),
        account.currency
    );
    println!(
        "Calculated: {} {}",
        format_amount(result.computed),
        account.currency
    );
    println!(
        "Status:     {}",
        if result.matched { "OK" } else { "MISMATCH" }
    );
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {what} ID '{value}' (expected UUID)"))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
