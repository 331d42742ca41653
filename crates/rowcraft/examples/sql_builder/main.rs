//! Example demonstrating rowcraft's Condition builder + PostgreSQL dialect
//! rendering.
//!
//! Run with:
//!   cargo run --example sql_builder -p rowcraft

use rowcraft::dialect::postgres::Postgres;
use rowcraft::dialect::Dialect;
use rowcraft::descriptor::{Direction, OrderSpec};
use rowcraft::Condition;

#[derive(Debug, Default)]
struct Filters {
    status: Option<String>,
    search: Option<String>,
    roles_any_of: Vec<String>,
    include_deleted: bool,
    page: i64,
    per_page: i64,
}

fn build_list_users_sql(filters: &Filters) -> (String, usize) {
    let mut cond = Condition::new();

    if let Some(status) = &filters.status {
        cond = cond.eq("status", status.clone());
    }

    if let Some(search) = &filters.search {
        cond = cond.fragment("name ILIKE ?", vec![format!("%{search}%").into()]);
    }

    if !filters.roles_any_of.is_empty() {
        let alternatives = filters
            .roles_any_of
            .iter()
            .cloned()
            .map(|role| Condition::new().eq("role", role))
            .collect();
        cond = cond.or(alternatives);
    }

    if !filters.include_deleted {
        cond = cond.is_null("deleted_at");
    }

    let (where_sql, params) = cond.compile(&Postgres);

    let order = OrderSpec::new().desc("created_at");
    let mut sql = "SELECT id, name, status, role, created_at FROM users".to_string();
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(&order.compile(|c| Postgres.quote_identifier(c)));
    sql.push_str(&format!(
        " LIMIT {} OFFSET {}",
        filters.per_page,
        (filters.page.max(1) - 1) * filters.per_page
    ));

    (sql, params.len())
}

fn main() {
    let filters = Filters {
        status: Some("active".to_string()),
        search: Some("ada".to_string()),
        roles_any_of: vec!["admin".to_string(), "mod".to_string()],
        include_deleted: false,
        page: 2,
        per_page: 25,
    };

    let (sql, param_count) = build_list_users_sql(&filters);
    println!("[list_users]");
    println!("  SQL:    {sql}");
    println!("  params: {param_count}");
    println!();

    let no_filters = Filters {
        page: 1,
        per_page: 50,
        ..Default::default()
    };
    let (sql, param_count) = build_list_users_sql(&no_filters);
    println!("[list_users, no filters]");
    println!("  SQL:    {sql}");
    println!("  params: {param_count}");
}
