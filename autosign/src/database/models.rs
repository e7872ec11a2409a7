//! Row types for the persistence layer.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

/// A stored account. `cookie` is the flat cookie string the operator imports
/// at construction and exports back after each work unit.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRecord {
    pub id: i64,
    pub name: String,
    pub cookie: String,
    pub paused: bool,
    pub last_list_refresh: Option<NaiveDate>,
}

/// A followed forum of one account. `cancelled` marks forums that dropped out
/// of the favorites list; `paused` is an operator override that the tasks
/// never modify.
#[derive(Debug, Clone, FromRow)]
pub struct ForumRecord {
    pub account_id: i64,
    pub name: String,
    pub paused: bool,
    pub cancelled: bool,
    pub last_sign_date: Option<NaiveDate>,
}

/// Append-only audit row.
#[derive(Debug, Clone, FromRow)]
pub struct LogRecord {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub content: String,
}
