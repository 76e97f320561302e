//! PostgreSQL backends for the ledger's storage and audit seams

pub mod audit;
pub mod postgres;

pub use audit::PostgresAuditSink;
pub use postgres::PostgresLedgerStore;
