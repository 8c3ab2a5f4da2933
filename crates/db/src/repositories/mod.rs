use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use outlay_core::errors::WorkflowError;
use outlay_core::workflow::WorkflowPorts;

use crate::DbPool;

pub mod decision;
pub mod directory;
pub mod expense;
pub mod memory;
pub mod rule;

pub use decision::SqlDecisionRepository;
pub use directory::SqlDirectoryRepository;
pub use expense::SqlExpenseRepository;
pub use memory::{
    InMemoryDecisionRepository, InMemoryDirectoryRepository, InMemoryExpenseRepository,
    InMemoryRuleRepository, in_memory_ports,
};
pub use rule::SqlRuleRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflicting write: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for WorkflowError {
    fn from(value: RepositoryError) -> Self {
        WorkflowError::Persistence(value.to_string())
    }
}

/// Every workflow port backed by the same SQLite pool.
pub fn sql_ports(pool: DbPool) -> WorkflowPorts {
    WorkflowPorts {
        directory: Arc::new(SqlDirectoryRepository::new(pool.clone())),
        rules: Arc::new(SqlRuleRepository::new(pool.clone())),
        decisions: Arc::new(SqlDecisionRepository::new(pool.clone())),
        expenses: Arc::new(SqlExpenseRepository::new(pool)),
    }
}

fn decode_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(decode_error)
}

fn parse_timestamp(column_name: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|at| at.with_timezone(&Utc)).map_err(|error| {
        RepositoryError::Decode(format!("{column_name} `{value}` is not RFC 3339: {error}"))
    })
}

fn parse_decimal(column_name: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("{column_name} `{value}` is not a decimal: {error}"))
    })
}

fn parse_date(column_name: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|error| {
        RepositoryError::Decode(format!("{column_name} `{value}` is not a date: {error}"))
    })
}

fn to_u32(column_name: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column_name} {value} is out of range")))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}
