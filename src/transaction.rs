//! Transactions over a single `may_postgres` connection.
//!
//! Every store request runs inside exactly one [`Transaction`]. It is committed
//! when the request succeeds and rolled back otherwise; a transaction dropped
//! while still open is rolled back too.

use crate::executor::{instrumented, DbError, Executor};
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use serde::Deserialize;
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction isolation level, configured as `database.isolation_level`
/// (`read_committed`, `repeatable_read` or `serializable`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read committed (Postgres default)
    #[default]
    ReadCommitted,
    /// Repeatable read
    RepeatableRead,
    /// Serializable
    Serializable,
}

impl IsolationLevel {
    fn to_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// PostgreSQL error from may_postgres
    PostgresError(PostgresError),
    /// Transaction already committed or rolled back
    TransactionClosed,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            TransactionError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<PostgresError> for TransactionError {
    fn from(err: PostgresError) -> Self {
        TransactionError::PostgresError(err)
    }
}

impl From<TransactionError> for DbError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::PostgresError(e) => DbError::PostgresError(e),
            TransactionError::TransactionClosed => DbError::Other("Transaction closed".to_string()),
        }
    }
}

/// An open database transaction
pub struct Transaction {
    client: Client,
    closed: bool,
}

impl Transaction {
    /// Issues `BEGIN`, then `SET TRANSACTION` unless the level is the
    /// server default.
    pub(crate) fn begin(
        client: Client,
        isolation_level: IsolationLevel,
    ) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        client.execute("BEGIN", &[])?;
        if isolation_level != IsolationLevel::ReadCommitted {
            let isolation_sql = format!(
                "SET TRANSACTION ISOLATION LEVEL {}",
                isolation_level.to_sql()
            );
            if let Err(e) = client.execute(isolation_sql.as_str(), &[]) {
                let _ = client.execute("ROLLBACK", &[]);
                return Err(e.into());
            }
        }

        Ok(Self {
            client,
            closed: false,
        })
    }

    /// Commit the transaction
    pub fn commit(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.closed = true;
        self.client.execute("COMMIT", &[])?;
        Ok(())
    }

    /// Roll back the transaction, discarding every change made through it
    pub fn rollback(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.closed = true;
        self.client.execute("ROLLBACK", &[])?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!("transaction dropped while open, rolling back");
            if let Err(e) = self.client.execute("ROLLBACK", &[]) {
                log::error!("rollback on drop failed: {e}");
            }
        }
    }
}

impl Executor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query(query, params))
    }
}
