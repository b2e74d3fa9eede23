//! Infrastructure layer: ledger storage backends, transactional stock
//! operations and configuration.

pub mod config;
pub mod ledger;
pub mod operations;

pub use config::{AppConfig, Backend, ConfigError, LogFormat};
pub use ledger::{InMemoryLedgerStore, IsolationLevel, LedgerError, LedgerStore, LedgerTx, PgLedgerStore};
pub use operations::{BookingReceipt, OperationError, RestockReport, StockOperations};
