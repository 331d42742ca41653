//! Example demonstrating the same two-row INSERT rendered through all three
//! dialect SQL builders, showing the batch-insert shape each one picks
//! (PostgreSQL UNNEST, MySQL multi-row VALUES, SQLite multi-row VALUES).
//!
//! Run with:
//!   cargo run --example multi_dialect -p rowcraft

use rowcraft::dialect::mysql::MySql;
use rowcraft::dialect::postgres::Postgres;
use rowcraft::dialect::sqlite::Sqlite;
use rowcraft::dialect::{OnConflict, SqlBuilder};
use rowcraft::param::DynValue;

fn two_row_insert(builder: &dyn SqlBuilder) -> rowcraft::error::OrmResult<rowcraft::dialect::BuiltQuery> {
    let columns = vec!["name".to_string(), "email".to_string()];
    let column_types = ["text", "text"];
    let rows = vec![
        vec![DynValue::Text("ada".into()), DynValue::Text("ada@example.com".into())],
        vec![DynValue::Text("grace".into()), DynValue::Text("grace@example.com".into())],
    ];
    builder.build_insert("users", &columns, &column_types, &rows, &OnConflict::None, Some(&["id".to_string()]))
}

fn main() -> rowcraft::error::OrmResult<()> {
    for (name, builder) in [
        ("postgres", &Postgres as &dyn SqlBuilder),
        ("mysql", &MySql as &dyn SqlBuilder),
        ("sqlite", &Sqlite as &dyn SqlBuilder),
    ] {
        let built = two_row_insert(builder)?;
        println!("[{name}]");
        println!("  SQL:    {}", built.sql);
        println!("  params: {}", built.params.len());
        println!();
    }
    Ok(())
}
