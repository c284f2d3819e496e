// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use ledgerbank::application::LedgerService;
use ledgerbank::{Account, Config};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(test_config(&temp_dir)).await?;
    Ok((service, temp_dir))
}

pub fn test_config(temp_dir: &TempDir) -> Config {
    let db_path = temp_dir.path().join("test.db");
    Config::new(db_path.to_string_lossy().to_string())
}

/// Open an NGN account with no owner.
pub async fn open(service: &LedgerService, name: &str) -> Result<Account> {
    Ok(service.open_account(name, "NGN", None).await?)
}

/// Open an NGN account and deposit `amount` into it.
pub async fn funded(service: &LedgerService, name: &str, amount: &str) -> Result<Account> {
    let account = open(service, name).await?;
    service.deposit(account.id, amount).await?;
    Ok(service.get_account(account.id).await?)
}
