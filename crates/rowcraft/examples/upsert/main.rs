//! Example demonstrating ON CONFLICT / ON DUPLICATE KEY UPDATE rendering
//! across dialects.
//!
//! Run with:
//!   cargo run --example upsert -p rowcraft

use rowcraft::dialect::mysql::MySql;
use rowcraft::dialect::postgres::Postgres;
use rowcraft::dialect::{OnConflict, SqlBuilder};
use rowcraft::param::DynValue;

fn insert_row() -> Vec<DynValue> {
    vec![
        DynValue::Text("ada@example.com".into()),
        DynValue::Text("ada".into()),
        DynValue::I64(1),
    ]
}

fn main() -> rowcraft::error::OrmResult<()> {
    let columns = vec!["email".to_string(), "name".to_string(), "login_count".to_string()];
    let column_types = ["text", "text", "int4"];
    let rows = vec![insert_row()];

    let do_update = OnConflict::Update {
        columns: vec!["email".to_string()],
        update_columns: vec!["name".to_string(), "login_count".to_string()],
    };
    let built = Postgres.build_insert("users", &columns, &column_types, &rows, &do_update, None)?;
    println!("[postgres, DO UPDATE]");
    println!("  SQL:    {}", built.sql);
    println!();

    let do_nothing = OnConflict::Ignore {
        columns: vec!["email".to_string()],
    };
    let built = Postgres.build_insert("users", &columns, &column_types, &rows, &do_nothing, None)?;
    println!("[postgres, DO NOTHING]");
    println!("  SQL:    {}", built.sql);
    println!();

    let built = MySql.build_insert("users", &columns, &column_types, &rows, &do_update, None)?;
    println!("[mysql, ON DUPLICATE KEY UPDATE]");
    println!("  SQL:    {}", built.sql);

    Ok(())
}
