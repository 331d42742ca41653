//! MySQL dialect: `?` placeholders, backtick-quoted identifiers, no native
//! `RETURNING` (emulated at the query-engine layer via pre/post SELECTs —
//! §4.4.3), `VALUES ROW(...)` batch forms (8.0.19+).

use crate::dialect::{
    BuiltQuery, CastFormatter, ColumnType, Dialect, DialectKind, OnConflict, PlaceholderStyle, SqlBuilder,
    identity_cast,
};
use crate::error::OrmResult;
use crate::param::DynValue;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn cast_formatter(&self) -> CastFormatter {
        identity_cast
    }

    fn supports_returning(&self) -> bool {
        false
    }

    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }
}

impl SqlBuilder for MySql {
    /// `returning` is unused: MySQL has no `RETURNING` clause to append.
    /// The engine (`engine.rs::run_insert_returning`) compensates by
    /// re-`SELECT`ing the `last_insert_id` range this statement's
    /// `ExecResult` reports (§4.4.3) — the plain, non-`RETURNING` SQL built
    /// here is exactly what that emulation needs to execute first.
    fn build_insert(
        &self,
        table: &str,
        columns: &[String],
        _column_types: &[ColumnType],
        rows: &[Vec<DynValue>],
        on_conflict: &OnConflict,
        _returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery> {
        let quoted_table = self.quote_identifier(table);
        let quoted_cols: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        let mut params = Vec::new();

        let values_rows: Vec<String> = rows
            .iter()
            .map(|row| {
                let ph: Vec<&str> = row.iter().map(|_| "?").collect();
                params.extend(row.iter().cloned());
                format!("({})", ph.join(", "))
            })
            .collect();

        let ignore = matches!(on_conflict, OnConflict::Ignore { .. });
        let verb = if ignore { "INSERT IGNORE" } else { "INSERT" };

        let mut sql = format!(
            "{verb} INTO {quoted_table} ({}) VALUES {}",
            quoted_cols.join(", "),
            values_rows.join(", ")
        );

        if let OnConflict::Update { update_columns, .. } = on_conflict {
            let set = update_columns
                .iter()
                .map(|c| {
                    let q = self.quote_identifier(c);
                    format!("{q} = VALUES({q})")
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ON DUPLICATE KEY UPDATE {set}"));
        }

        Ok(BuiltQuery { sql, params })
    }

    /// `returning` is unused: MySQL has no `RETURNING` clause. The engine
    /// (`engine.rs::run_mutate_returning`) compensates with a pre-`SELECT`
    /// of the matching pkeys, run against this same `where_sql` before this
    /// statement executes (§4.4.3).
    fn build_update(
        &self,
        table: &str,
        set_columns: &[(String, DynValue)],
        where_sql: &str,
        where_params: Vec<DynValue>,
        _returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery> {
        let mut params = Vec::new();
        let set = set_columns
            .iter()
            .map(|(c, v)| {
                params.push(v.clone());
                format!("{} = ?", self.quote_identifier(c))
            })
            .collect::<Vec<_>>()
            .join(", ");
        params.extend(where_params);

        let mut sql = format!("UPDATE {} SET {set}", self.quote_identifier(table));
        if !where_sql.is_empty() {
            sql.push_str(&format!(" WHERE {where_sql}"));
        }
        Ok(BuiltQuery { sql, params })
    }

    /// `returning` is unused: MySQL has no `RETURNING` clause. The engine
    /// (`engine.rs::update_many`) compensates with a pre-`SELECT` of the
    /// pkeys matching the batch's own `key_columns` tuples before this
    /// statement executes (§4.4.3).
    fn build_update_many(
        &self,
        table: &str,
        key_columns: &[String],
        update_columns: &[String],
        _column_types: &[ColumnType],
        rows: &[(Vec<DynValue>, Vec<Option<DynValue>>)],
        _returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery> {
        let quoted_table = self.quote_identifier(table);
        let mut params = Vec::new();

        let v_cols: Vec<String> = key_columns
            .iter()
            .chain(update_columns.iter())
            .cloned()
            .collect();

        let rows_sql: Vec<String> = rows
            .iter()
            .map(|(keys, vals)| {
                let mut ph = Vec::with_capacity(v_cols.len());
                for k in keys {
                    params.push(k.clone());
                    ph.push("?".to_string());
                }
                for v in vals {
                    params.push(v.clone().unwrap_or(DynValue::Null));
                    ph.push("?".to_string());
                }
                format!("ROW({})", ph.join(", "))
            })
            .collect();

        let join_cond = key_columns
            .iter()
            .map(|k| {
                let q = self.quote_identifier(k);
                format!("{quoted_table}.{q} = v.{q}")
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        let set_clause = update_columns
            .iter()
            .map(|c| {
                let q = self.quote_identifier(c);
                format!("{quoted_table}.{q} = v.{q}")
            })
            .collect::<Vec<_>>()
            .join(", ");

        let cols = v_cols
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "UPDATE {quoted_table} JOIN (VALUES {}) AS v({cols}) ON {join_cond} SET {set_clause}",
            rows_sql.join(", ")
        );

        Ok(BuiltQuery { sql, params })
    }

    /// `returning` is unused: MySQL has no `RETURNING` clause. The engine
    /// (`engine.rs::run_mutate_returning`) compensates with a pre-`SELECT`
    /// of the matching pkeys, run against this same `where_sql` before this
    /// statement executes — a post-delete `SELECT` would find nothing
    /// (§4.4.3).
    fn build_delete(
        &self,
        table: &str,
        where_sql: &str,
        where_params: Vec<DynValue>,
        _returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery> {
        let mut sql = format!("DELETE FROM {}", self.quote_identifier(table));
        if !where_sql.is_empty() {
            sql.push_str(&format!(" WHERE {where_sql}"));
        }
        Ok(BuiltQuery {
            sql,
            params: where_params,
        })
    }

    fn build_select_pkeys(
        &self,
        table: &str,
        pkey_columns: &[String],
        where_sql: &str,
        where_params: Vec<DynValue>,
    ) -> BuiltQuery {
        let cols = pkey_columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {cols} FROM {}", self.quote_identifier(table));
        if !where_sql.is_empty() {
            sql.push_str(&format!(" WHERE {where_sql}"));
        }
        BuiltQuery {
            sql,
            params: where_params,
        }
    }

    fn build_find_by_pkeys(
        &self,
        table: &str,
        pkey_columns: &[String],
        _column_types: &[ColumnType],
        pkey_values: &[Vec<DynValue>],
        select_columns: &[String],
    ) -> BuiltQuery {
        let quoted_table = self.quote_identifier(table);
        let select = if select_columns.is_empty() {
            "*".to_string()
        } else {
            select_columns
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        if pkey_columns.len() == 1 {
            let placeholders: Vec<&str> = pkey_values.iter().map(|_| "?").collect();
            let params: Vec<DynValue> = pkey_values.iter().map(|row| row[0].clone()).collect();
            let col = self.quote_identifier(&pkey_columns[0]);
            let sql = format!(
                "SELECT {select} FROM {quoted_table} WHERE {col} IN ({})",
                placeholders.join(", ")
            );
            return BuiltQuery { sql, params };
        }

        let mut params = Vec::new();
        let rows_sql: Vec<String> = pkey_values
            .iter()
            .map(|row| {
                let ph: Vec<&str> = row.iter().map(|_| "?").collect();
                params.extend(row.iter().cloned());
                format!("ROW({})", ph.join(", "))
            })
            .collect();
        let cols = pkey_columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let join_cond = pkey_columns
            .iter()
            .map(|c| {
                let q = self.quote_identifier(c);
                format!("{quoted_table}.{q} = v.{q}")
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "SELECT {select} FROM {quoted_table} JOIN (VALUES {}) AS v({cols}) ON {join_cond}",
            rows_sql.join(", ")
        );
        BuiltQuery { sql, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_pkeys_single_uses_in_list() {
        let d = MySql;
        let q = d.build_find_by_pkeys(
            "users",
            &["id".to_string()],
            &[],
            &[vec![DynValue::I64(1)], vec![DynValue::I64(2)]],
            &[],
        );
        assert_eq!(q.sql, "SELECT * FROM `users` WHERE `id` IN (?, ?)");
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn select_pkeys_matches_where_clause() {
        let d = MySql;
        let q = d.build_select_pkeys("posts", &["id".to_string()], "`id` BETWEEN ? AND ?", vec![DynValue::I64(10), DynValue::I64(12)]);
        assert_eq!(q.sql, "SELECT `id` FROM `posts` WHERE `id` BETWEEN ? AND ?");
        assert_eq!(q.params, vec![DynValue::I64(10), DynValue::I64(12)]);
    }

    #[test]
    fn select_pkeys_composite_key_with_empty_where() {
        let d = MySql;
        let q = d.build_select_pkeys("user_roles", &["user_id".to_string(), "role_id".to_string()], "", vec![]);
        assert_eq!(q.sql, "SELECT `user_id`, `role_id` FROM `user_roles`");
    }

    #[test]
    fn batch_insert_uses_values_rows() {
        let d = MySql;
        let q = d
            .build_insert(
                "posts",
                &["user_id".to_string(), "title".to_string()],
                &[],
                &[
                    vec![DynValue::I64(1), DynValue::Text("t1".into())],
                    vec![DynValue::I64(2), DynValue::Text("t2".into())],
                ],
                &OnConflict::None,
                None,
            )
            .unwrap();
        assert_eq!(
            q.sql,
            "INSERT INTO `posts` (`user_id`, `title`) VALUES (?, ?), (?, ?)"
        );
        assert_eq!(q.params.len(), 4);
    }
}
