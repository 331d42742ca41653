//! SQLite dialect: `?` placeholders, double-quoted identifiers, native
//! `RETURNING` (3.35+), `CASE WHEN` batch UPDATE, `WITH v(...) AS (VALUES
//! ...)` composite-key joins.

use crate::dialect::{
    BuiltQuery, CastFormatter, ColumnType, Dialect, DialectKind, OnConflict, PlaceholderStyle, SqlBuilder,
    identity_cast,
};
use crate::error::OrmResult;
use crate::param::DynValue;

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn cast_formatter(&self) -> CastFormatter {
        identity_cast
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }
}

impl SqlBuilder for Sqlite {
    fn build_insert(
        &self,
        table: &str,
        columns: &[String],
        _column_types: &[ColumnType],
        rows: &[Vec<DynValue>],
        on_conflict: &OnConflict,
        returning: Option<&[String]>,
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

        let mut sql = format!(
            "INSERT INTO {quoted_table} ({}) VALUES {}",
            quoted_cols.join(", "),
            values_rows.join(", ")
        );

        match on_conflict {
            OnConflict::None => {}
            OnConflict::Ignore { columns } => {
                let cols = columns
                    .iter()
                    .map(|c| self.quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                sql.push_str(&format!(" ON CONFLICT ({cols}) DO NOTHING"));
            }
            OnConflict::Update {
                columns,
                update_columns,
            } => {
                let cols = columns
                    .iter()
                    .map(|c| self.quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                let set = update_columns
                    .iter()
                    .map(|c| {
                        let q = self.quote_identifier(c);
                        format!("{q} = excluded.{q}")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                sql.push_str(&format!(" ON CONFLICT ({cols}) DO UPDATE SET {set}"));
            }
        }

        if let Some(cols) = returning {
            if let Some(r) = self.build_returning(cols) {
                sql.push(' ');
                sql.push_str(&r);
            }
        }

        Ok(BuiltQuery { sql, params })
    }

    fn build_update(
        &self,
        table: &str,
        set_columns: &[(String, DynValue)],
        where_sql: &str,
        where_params: Vec<DynValue>,
        returning: Option<&[String]>,
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
        if let Some(cols) = returning {
            if let Some(r) = self.build_returning(cols) {
                sql.push(' ');
                sql.push_str(&r);
            }
        }
        Ok(BuiltQuery { sql, params })
    }

    fn build_update_many(
        &self,
        table: &str,
        key_columns: &[String],
        update_columns: &[String],
        _column_types: &[ColumnType],
        rows: &[(Vec<DynValue>, Vec<Option<DynValue>>)],
        returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery> {
        let quoted_table = self.quote_identifier(table);
        let mut params = Vec::new();

        // One CASE chain per update column.
        let mut set_parts = Vec::with_capacity(update_columns.len());
        for (ci, col) in update_columns.iter().enumerate() {
            let q = self.quote_identifier(col);
            let mut case_sql = format!("{q} = CASE");
            for (keys, vals) in rows {
                let key_cond = key_columns
                    .iter()
                    .zip(keys)
                    .map(|(k, v)| {
                        params.push(v.clone());
                        format!("{} = ?", self.quote_identifier(k))
                    })
                    .collect::<Vec<_>>()
                    .join(" AND ");
                match &vals[ci] {
                    Some(v) => {
                        params.push(v.clone());
                        case_sql.push_str(&format!(" WHEN {key_cond} THEN ?"));
                    }
                    None => {
                        case_sql.push_str(&format!(" WHEN {key_cond} THEN {q}"));
                    }
                }
            }
            case_sql.push_str(&format!(" ELSE {q} END"));
            set_parts.push(case_sql);
        }

        let key_tuples: Vec<String> = rows
            .iter()
            .map(|(keys, _)| {
                let ph: Vec<&str> = keys.iter().map(|_| "?").collect();
                params.extend(keys.iter().cloned());
                format!("({})", ph.join(", "))
            })
            .collect();
        let key_cols = key_columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "UPDATE {quoted_table} SET {} WHERE ({key_cols}) IN ({})",
            set_parts.join(", "),
            key_tuples.join(", ")
        );

        if let Some(cols) = returning {
            if let Some(r) = self.build_returning(cols) {
                sql.push(' ');
                sql.push_str(&r);
            }
        }
        Ok(BuiltQuery { sql, params })
    }

    fn build_delete(
        &self,
        table: &str,
        where_sql: &str,
        where_params: Vec<DynValue>,
        returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery> {
        let mut sql = format!("DELETE FROM {}", self.quote_identifier(table));
        if !where_sql.is_empty() {
            sql.push_str(&format!(" WHERE {where_sql}"));
        }
        if let Some(cols) = returning {
            if let Some(r) = self.build_returning(cols) {
                sql.push(' ');
                sql.push_str(&r);
            }
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
        let value_rows: Vec<String> = pkey_values
            .iter()
            .map(|row| {
                let ph: Vec<&str> = row.iter().map(|_| "?").collect();
                params.extend(row.iter().cloned());
                format!("({})", ph.join(", "))
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
            "WITH v({cols}) AS (VALUES {}) SELECT {select} FROM {quoted_table} JOIN v ON {join_cond}",
            value_rows.join(", ")
        );
        BuiltQuery { sql, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_pkeys_single_uses_in_list() {
        let d = Sqlite;
        let q = d.build_find_by_pkeys(
            "users",
            &["id".to_string()],
            &[],
            &[vec![DynValue::I64(1)], vec![DynValue::I64(2)]],
            &[],
        );
        assert_eq!(q.sql, "SELECT * FROM \"users\" WHERE \"id\" IN (?, ?)");
    }

    #[test]
    fn find_by_pkeys_composite_uses_with_values() {
        let d = Sqlite;
        let q = d.build_find_by_pkeys(
            "memberships",
            &["org_id".to_string(), "user_id".to_string()],
            &[],
            &[vec![DynValue::I64(1), DynValue::I64(10)]],
            &[],
        );
        assert!(q.sql.starts_with("WITH v(\"org_id\", \"user_id\") AS (VALUES (?, ?))"));
    }

    #[test]
    fn batch_insert_uses_values_rows() {
        let d = Sqlite;
        let q = d
            .build_insert(
                "posts",
                &["title".to_string()],
                &[],
                &[
                    vec![DynValue::Text("t1".into())],
                    vec![DynValue::Text("t2".into())],
                ],
                &OnConflict::None,
                None,
            )
            .unwrap();
        assert_eq!(q.sql, "INSERT INTO \"posts\" (\"title\") VALUES (?), (?)");
    }
}
