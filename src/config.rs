use std::time::Duration;

use crate::storage::IsolationLevel;

pub const DEFAULT_DATABASE: &str = "ledger.db";
pub const DEFAULT_SETTLEMENT_CURRENCY: &str = "NGN";
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// Runtime configuration, built once and handed to the service.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite URL, e.g. `sqlite:ledger.db`
    pub database_url: String,
    /// Currency of the settlement account seeded on init
    pub settlement_currency: String,
    /// Isolation for money-moving transactions
    pub isolation: IsolationLevel,
    /// How long an operation waits for a lock held by another one
    pub lock_timeout: Duration,
    pub max_connections: u32,
}

impl Config {
    /// Accepts either a `sqlite:` URL or a plain file path.
    pub fn new(database: impl Into<String>) -> Self {
        let database = database.into();
        let database_url = if database.starts_with("sqlite:") {
            database
        } else {
            format!("sqlite:{}", database)
        };

        Self {
            database_url,
            settlement_currency: DEFAULT_SETTLEMENT_CURRENCY.to_string(),
            isolation: IsolationLevel::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn with_settlement_currency(mut self, currency: impl Into<String>) -> Self {
        self.settlement_currency = currency.into().to_ascii_uppercase();
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE)
    }
}
