//! # rowcraft
//!
//! A multi-dialect SQL ORM core: PostgreSQL, MySQL, and SQLite driven
//! through one `Value`/`Condition` AST, one set of dialect SQL builders, and
//! one query engine.
//!
//! ## Features
//!
//! - **SQL explicit**: every operation compiles to inspectable SQL text via
//!   `dialect::SqlBuilder` — no hidden query planner.
//! - **Type-safe mapping**: `Row` → struct via `FromRow`, generated by
//!   `#[derive(Model)]` (see `rowcraft-derive`).
//! - **Static dialect dispatch**: a `db::DbBase` is assembled once against a
//!   concrete dialect; there is no per-call `if dialect` branching.
//! - **Safe defaults**: writes are rejected outside a transaction scope,
//!   `find`/`hasMany` enforce a hard result-count ceiling.

pub mod codec;
pub mod condition;
pub mod db;
pub mod descriptor;
pub mod dialect;
pub mod driver;
pub mod engine;
pub mod error;
pub mod guards;
pub mod middleware;
pub mod param;
pub mod relation;
pub mod router;
pub mod row;
pub mod value;

pub mod changeset;

/// Re-exported so `#[derive(Model)]`-generated code can call
/// `rowcraft::inventory::submit!` without callers depending on `inventory`
/// themselves.
pub use inventory;

/// Re-exported so `#[derive(PgEnum)]`/`#[derive(PgComposite)]`-generated code
/// can implement `ToSql`/`FromSql` without callers depending on
/// `tokio-postgres` directly.
#[cfg(feature = "postgres")]
pub use tokio_postgres;

#[cfg(feature = "postgres")]
pub use bytes;

#[cfg(feature = "validate")]
pub mod validate;

pub use condition::Condition;
pub use db::{BaseConfig, BoundQuery, DbBase};
pub use descriptor::{Column, Direction, ModelDescriptor, Nulls, OrderSpec, registered_models};
pub use dialect::{BuiltQuery, Dialect, DialectKind, OnConflict, PkeyResult, SqlBuilder};
pub use driver::{Connection, Driver, ExecResult};
pub use engine::{FindOptions, Query, WriteOptions};
pub use error::{OrmError, OrmResult};
pub use param::{DynValue, Param, ParamList};
pub use relation::{relation_key, RelationSpec};
pub use router::{ConnectionPool, ConnectionRouter, RoutedConn, TransactionOptions};
pub use row::{FromRow, Row, RowExt};
pub use value::{PgType, Skip, Skippable, Value};

#[cfg(feature = "derive")]
pub use rowcraft_derive::{FromRow, Model, PgComposite, PgEnum, ViewModel};

pub mod prelude;
