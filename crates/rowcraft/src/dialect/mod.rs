//! Dialect abstraction: identifier quoting, placeholder style, cast
//! formatting, and the per-dialect SQL builders for INSERT/UPDATE/SELECT
//! (§4.4). Dispatch is static: a `DbBase` is assembled once against a
//! concrete `Dialect` + `SqlBuilder` pair (§9 "dialect dispatch" design
//! note) — there is no per-call `if dialect` branching once a base exists.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::error::OrmResult;
use crate::param::{DynValue, ParamList};

/// How a dialect expects bound parameters to be written inline in SQL text.
/// Grounded in the placeholder-style split used across real multi-backend
/// ORM workspaces: one numbered style for PostgreSQL, one repeated-mark
/// style for MySQL/SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`, `?`, `?`, ... (MySQL, SQLite).
    QuestionMark,
    /// `$1`, `$2`, `$3`, ... (PostgreSQL).
    DollarNumber,
}

/// `(placeholder, sql_type) -> rendered_placeholder`. PostgreSQL appends a
/// cast suffix (`$1::int`); MySQL/SQLite are identity.
pub type CastFormatter = fn(&str, &str) -> String;

/// Dialect-specific identifier quoting, placeholder style, and cast
/// rendering. Implemented once per dialect and referenced by both the value
/// AST (`value.rs`) and the SQL builders below.
/// Which of the three supported dialects a `Dialect` implementation is.
/// Used only by the relation loader (§4.7), which has genuinely different
/// SQL shapes per dialect (`LATERAL` vs `ROW_NUMBER() OVER (PARTITION BY
/// ...)`) that don't fit the `SqlBuilder` method set below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectKind {
    Postgres,
    MySql,
    Sqlite,
}

pub trait Dialect: Send + Sync {
    /// Quote a single identifier segment (column/table/alias). Callers that
    /// need dotted paths (`schema.table`) call this once per segment and
    /// join with `.`.
    fn quote_identifier(&self, name: &str) -> String;

    fn placeholder_style(&self) -> PlaceholderStyle;

    fn cast_formatter(&self) -> CastFormatter;

    /// Whether this dialect supports a native `RETURNING` clause.
    fn supports_returning(&self) -> bool;

    fn kind(&self) -> DialectKind;

    fn new_params(&self) -> ParamList {
        ParamList::with_style(self.placeholder_style())
    }
}

/// A record to insert/update: an ordered list of `(column, value)` pairs.
/// Update value lists may use `Value::Param`'s absence to signal SKIP — see
/// `condition::Skippable`.
pub type Row = Vec<(String, DynValue)>;

/// One column's SQL type tag, used to pick array/cast element types for
/// batch UNNEST/VALUES-ROW generation (e.g. `"int4"`, `"text"`, `"jsonb"`).
pub type ColumnType = &'static str;

/// Outcome of a write that requested `returning: true`: a compact
/// `(pkey-columns, matrix of values)` pair (the spec's `PkeyResult`).
#[derive(Debug, Clone, PartialEq)]
pub struct PkeyResult {
    pub key: Vec<String>,
    pub values: Vec<Vec<DynValue>>,
}

/// What to do on a unique-constraint conflict during INSERT.
#[derive(Debug, Clone)]
pub enum OnConflict {
    /// No conflict handling; let the driver raise a unique violation.
    None,
    /// `DO NOTHING` / `INSERT IGNORE`.
    Ignore { columns: Vec<String> },
    /// `DO UPDATE SET ...` / `ON DUPLICATE KEY UPDATE ...`, updating the
    /// given columns from the excluded/new row.
    Update {
        columns: Vec<String>,
        update_columns: Vec<String>,
    },
}

/// A built SQL statement plus its bound parameters, ready to hand to a
/// driver's `execute`/`query`.
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<DynValue>,
}

/// Per-dialect SQL generation for the write/find shapes described in §4.4.
/// Every builder is stateless; it is handed the data for one statement and
/// returns fully-rendered SQL + params.
pub trait SqlBuilder: Dialect {
    /// `INSERT INTO table (...) VALUES (...)` for a single row, or the
    /// dialect's batch form for 2+ rows (§4.4.1).
    fn build_insert(
        &self,
        table: &str,
        columns: &[String],
        column_types: &[ColumnType],
        rows: &[Vec<DynValue>],
        on_conflict: &OnConflict,
        returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery>;

    /// Single-row `UPDATE table SET ... WHERE ...` (§4.4.2).
    fn build_update(
        &self,
        table: &str,
        set_columns: &[(String, DynValue)],
        where_sql: &str,
        where_params: Vec<DynValue>,
        returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery>;

    /// Batch UPDATE of N rows keyed by `key_columns`, each row carrying its
    /// own values for `update_columns` (or `None` for SKIP, preserving the
    /// existing value) (§4.4.2).
    fn build_update_many(
        &self,
        table: &str,
        key_columns: &[String],
        update_columns: &[String],
        column_types: &[ColumnType],
        rows: &[(Vec<DynValue>, Vec<Option<DynValue>>)],
        returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery>;

    /// `DELETE FROM table WHERE ...`.
    fn build_delete(
        &self,
        table: &str,
        where_sql: &str,
        where_params: Vec<DynValue>,
        returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery>;

    /// Select the pkey columns matching a WHERE clause — used by MySQL to
    /// emulate RETURNING for UPDATE/DELETE via a pre-SELECT (§4.4.3).
    fn build_select_pkeys(
        &self,
        table: &str,
        pkey_columns: &[String],
        where_sql: &str,
        where_params: Vec<DynValue>,
    ) -> BuiltQuery;

    /// `SELECT <select_column> FROM table WHERE <pkey match>` for relation
    /// batch loading and `findById` (§4.4.4).
    fn build_find_by_pkeys(
        &self,
        table: &str,
        pkey_columns: &[String],
        column_types: &[ColumnType],
        pkey_values: &[Vec<DynValue>],
        select_columns: &[String],
    ) -> BuiltQuery;

    /// The `RETURNING <columns>` fragment, or `None` if unsupported.
    fn build_returning(&self, columns: &[String]) -> Option<String> {
        if !self.supports_returning() {
            return None;
        }
        let cols = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        Some(format!("RETURNING {cols}"))
    }
}

pub fn postgres_cast(placeholder: &str, sql_type: &str) -> String {
    format!("{placeholder}::{sql_type}")
}

pub fn identity_cast(placeholder: &str, _sql_type: &str) -> String {
    placeholder.to_string()
}
