//! Derive macros for rowcraft
//!
//! Provides `#[derive(FromRow)]` and `#[derive(Model)]` macros.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod from_row;
mod model;
mod pg_composite;
mod pg_enum;

/// Derive `FromRow` trait for a struct.
///
/// # Example
///
/// ```ignore
/// use rowcraft::FromRow;
///
/// #[derive(FromRow)]
/// struct User {
///     id: i64,
///     username: String,
///     #[orm(column = "email_address")]
///     email: Option<String>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(column = "name")]` - Map field to a different column name
#[proc_macro_derive(FromRow, attributes(orm))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_row::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `Model` metadata for a struct.
///
/// # Example
///
/// ```ignore
/// use rowcraft::Model;
///
/// #[derive(Model)]
/// #[orm(table = "users")]
/// struct User {
///     #[orm(id)]
///     user_id: i64,
///     username: String,
///     email: Option<String>,
/// }
/// ```
///
/// # Generated
///
/// - `TABLE: &'static str` - Table name
/// - `COL_*: &'static str` - Column name constants
/// - `SELECT_LIST: &'static str` - Comma-separated column list
/// - `fn select_list_as(alias: &str) -> String` - Aliased column list for JOINs
///
/// Relations (`hasMany`/`belongsTo`/`hasOne`) are not struct-level attributes
/// on this derive; they're declared where they're loaded, via
/// `RelationSpec::has_many`/`belongs_to`/`has_one` and run through
/// `relation::BatchContext` (see the `eager_loading` example). Joined read
/// models instead define a plain struct over the joined column set and mark
/// it with `#[derive(ViewModel)]`.
///
/// # Attributes
///
/// Struct-level:
///
/// - `#[orm(table = "name")]` - Specify table name (required)
///
/// Field-level:
///
/// - `#[orm(id)]` - Mark field as primary key
/// - `#[orm(column = "name")]` - Map field to a different column name
/// - `#[orm(table = "name")]` - Mark field as coming from a joined table (for view/join models)
#[proc_macro_derive(Model, attributes(orm))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `ViewModel` metadata for a struct.
///
/// This is an alias of `Model` intended to express that the type is a read/view model
/// (optionally including JOINs), while write models are derived separately.
#[proc_macro_derive(ViewModel, attributes(orm))]
pub fn derive_view_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `ToSql`/`FromSql` for a unit-variant enum backed by a PostgreSQL
/// `CREATE TYPE ... AS ENUM (...)`.
///
/// # Example
///
/// ```ignore
/// use rowcraft::PgEnum;
///
/// #[derive(PgEnum)]
/// #[orm(pg_type = "order_status")]
/// enum OrderStatus {
///     Pending,
///     #[orm(rename = "shipped_out")]
///     Shipped,
///     Delivered,
/// }
/// ```
///
/// # Attributes
///
/// Struct-level: `#[orm(pg_type = "name")]` - the PostgreSQL enum type name (required).
/// Variant-level: `#[orm(rename = "name")]` - override the default `snake_case` wire name.
#[proc_macro_derive(PgEnum, attributes(orm))]
pub fn derive_pg_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    pg_enum::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `ToSql`/`FromSql` for a struct backed by a PostgreSQL
/// `CREATE TYPE ... AS (...)` composite type.
///
/// # Example
///
/// ```ignore
/// use rowcraft::PgComposite;
///
/// #[derive(PgComposite)]
/// #[orm(pg_type = "address")]
/// struct Address {
///     street: String,
///     city: String,
/// }
/// ```
///
/// # Attributes
///
/// Struct-level: `#[orm(pg_type = "name")]` - the PostgreSQL composite type name (required).
#[proc_macro_derive(PgComposite, attributes(orm))]
pub fn derive_pg_composite(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    pg_composite::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
