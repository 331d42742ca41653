//! PostgreSQL dialect: `$N` placeholders, double-quoted identifiers,
//! `UNNEST`-based batch INSERT/UPDATE, native `RETURNING`.

use crate::codec::{array_to_json_text, dyn_value_to_json};
use crate::dialect::{
    BuiltQuery, CastFormatter, ColumnType, Dialect, DialectKind, OnConflict, PlaceholderStyle, SqlBuilder,
    postgres_cast,
};
use crate::error::OrmResult;
use crate::param::DynValue;

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::DollarNumber
    }

    fn cast_formatter(&self) -> CastFormatter {
        postgres_cast
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }
}

impl Postgres {
    fn push(&self, params: &mut Vec<DynValue>, v: DynValue) -> String {
        params.push(v);
        format!("${}", params.len())
    }
}

impl SqlBuilder for Postgres {
    fn build_insert(
        &self,
        table: &str,
        columns: &[String],
        column_types: &[ColumnType],
        rows: &[Vec<DynValue>],
        on_conflict: &OnConflict,
        returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery> {
        let quoted_table = self.quote_identifier(table);
        let quoted_cols: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        let mut params = Vec::new();

        let mut sql = if rows.len() <= 1 {
            let row = rows.first().cloned().unwrap_or_default();
            let placeholders: Vec<String> = row
                .into_iter()
                .map(|v| self.push(&mut params, v))
                .collect();
            format!(
                "INSERT INTO {quoted_table} ({}) VALUES ({})",
                quoted_cols.join(", "),
                placeholders.join(", ")
            )
        } else {
            // Batch insert: one array parameter per column via UNNEST. Plain
            // scalar columns pass a native `$N::ty[]` array straight through;
            // array-typed and JSON columns can't be UNNESTed element-wise as
            // `ty[][]`/`jsonb[]` bind params, so each row's value is instead
            // JSON-encoded into one `text[]` array slot and re-expanded in
            // the SELECT projection below (§4.4.1).
            let mut array_placeholders = Vec::with_capacity(columns.len());
            let mut select_cols = Vec::with_capacity(columns.len());
            for (i, ty) in column_types.iter().enumerate() {
                let quoted_col = &quoted_cols[i];
                if let Some(elem_ty) = ty.strip_suffix("[]") {
                    let column_values: Vec<DynValue> = rows
                        .iter()
                        .map(|r| match &r[i] {
                            DynValue::Null => DynValue::Null,
                            DynValue::Array(items) => DynValue::Text(array_to_json_text(items)),
                            other => DynValue::Text(dyn_value_to_json(other).to_string()),
                        })
                        .collect();
                    let ph = self.push(&mut params, DynValue::Array(column_values));
                    array_placeholders.push(format!("{ph}::text[]"));
                    select_cols.push(format!(
                        "CASE WHEN v.{quoted_col} IS NULL THEN NULL ELSE COALESCE((SELECT array_agg(x::{elem_ty}) FROM jsonb_array_elements_text(v.{quoted_col}::jsonb) AS x), ARRAY[]::{elem_ty}[]) END"
                    ));
                } else if *ty == "json" || *ty == "jsonb" {
                    let column_values: Vec<DynValue> = rows
                        .iter()
                        .map(|r| match &r[i] {
                            DynValue::Null => DynValue::Null,
                            other => DynValue::Text(dyn_value_to_json(other).to_string()),
                        })
                        .collect();
                    let ph = self.push(&mut params, DynValue::Array(column_values));
                    array_placeholders.push(format!("{ph}::text[]"));
                    select_cols.push(format!("v.{quoted_col}::{ty}"));
                } else {
                    let column_values: Vec<DynValue> = rows.iter().map(|r| r[i].clone()).collect();
                    let ph = self.push(&mut params, DynValue::Array(column_values));
                    array_placeholders.push(format!("{ph}::{ty}[]"));
                    select_cols.push(format!("v.{quoted_col}"));
                }
            }
            format!(
                "INSERT INTO {quoted_table} ({}) SELECT {} FROM UNNEST({}) AS v({})",
                quoted_cols.join(", "),
                select_cols.join(", "),
                array_placeholders.join(", "),
                quoted_cols.join(", ")
            )
        };

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
                        format!("{q} = EXCLUDED.{q}")
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
                let ph = self.push(&mut params, v.clone());
                format!("{} = {ph}", self.quote_identifier(c))
            })
            .collect::<Vec<_>>()
            .join(", ");

        let where_offset = params.len();
        params.extend(where_params);
        let where_sql = renumber(where_sql, where_offset);

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
        column_types: &[ColumnType],
        rows: &[(Vec<DynValue>, Vec<Option<DynValue>>)],
        returning: Option<&[String]>,
    ) -> OrmResult<BuiltQuery> {
        let quoted_table = self.quote_identifier(table);
        let mut params = Vec::new();

        // key arrays
        let mut value_cols = Vec::new();
        for (i, key) in key_columns.iter().enumerate() {
            let values: Vec<DynValue> = rows.iter().map(|(k, _)| k[i].clone()).collect();
            let ty = column_types.get(i).copied().unwrap_or("text");
            let ph = self.push(&mut params, DynValue::Array(values));
            value_cols.push((key.clone(), format!("{ph}::{ty}[]")));
        }

        // update-value arrays + per-column skip arrays
        let update_ty_offset = key_columns.len();
        for (i, col) in update_columns.iter().enumerate() {
            let values: Vec<DynValue> = rows
                .iter()
                .map(|(_, vals)| vals[i].clone().unwrap_or(DynValue::Null))
                .collect();
            let ty = column_types
                .get(update_ty_offset + i)
                .copied()
                .unwrap_or("text");
            let ph = self.push(&mut params, DynValue::Array(values));
            value_cols.push((col.clone(), format!("{ph}::{ty}[]")));

            let has_skip = rows.iter().any(|(_, vals)| vals[i].is_none());
            if has_skip {
                let skip_flags: Vec<DynValue> = rows
                    .iter()
                    .map(|(_, vals)| DynValue::Bool(vals[i].is_none()))
                    .collect();
                let skip_ph = self.push(&mut params, DynValue::Array(skip_flags));
                value_cols.push((format!("_skip_{col}"), format!("{skip_ph}::bool[]")));
            }
        }

        let v_cols: Vec<String> = value_cols.iter().map(|(c, _)| c.clone()).collect();
        let v_arrays: Vec<String> = value_cols.iter().map(|(_, a)| a.clone()).collect();

        let set_clause = update_columns
            .iter()
            .map(|c| {
                let q = self.quote_identifier(c);
                if v_cols.contains(&format!("_skip_{c}")) {
                    format!("{q} = CASE WHEN v.\"_skip_{c}\" THEN {}.{q} ELSE v.{q} END", quoted_table)
                } else {
                    format!("{q} = v.{q}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let join_cond = key_columns
            .iter()
            .map(|k| {
                let q = self.quote_identifier(k);
                format!("{}.{q} = v.{q}", quoted_table)
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        let mut sql = format!(
            "UPDATE {quoted_table} SET {set_clause} FROM UNNEST({}) AS v({}) WHERE {join_cond}",
            v_arrays.join(", "),
            v_cols
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
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
        let mut params = Vec::new();
        params.extend(where_params);
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
        Ok(BuiltQuery { sql, params })
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
        column_types: &[ColumnType],
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
            let ty = column_types.first().copied().unwrap_or("text");
            let values: Vec<DynValue> = pkey_values.iter().map(|row| row[0].clone()).collect();
            let mut params = Vec::new();
            let ph = self.push(&mut params, DynValue::Array(values));
            let col = self.quote_identifier(&pkey_columns[0]);
            let sql = format!(
                "SELECT {select} FROM {quoted_table} WHERE {col} = ANY({ph}::{ty}[])"
            );
            return BuiltQuery { sql, params };
        }

        let mut params = Vec::new();
        let mut array_placeholders = Vec::with_capacity(pkey_columns.len());
        for (i, ty) in column_types.iter().enumerate().take(pkey_columns.len()) {
            let values: Vec<DynValue> = pkey_values.iter().map(|row| row[i].clone()).collect();
            let ph = self.push(&mut params, DynValue::Array(values));
            array_placeholders.push(format!("{ph}::{ty}[]"));
        }
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
            "SELECT {select} FROM {quoted_table} JOIN UNNEST({}) AS v({cols}) ON {join_cond}",
            array_placeholders.join(", ")
        );
        BuiltQuery { sql, params }
    }
}

/// Rewrite `$1, $2, ...`-numbered placeholders in a WHERE fragment that was
/// compiled against a fresh `ParamList` so it lines up after `offset`
/// existing parameters (used when SET-clause params are pushed first).
fn renumber(sql: &str, offset: usize) -> String {
    if offset == 0 || sql.is_empty() {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek().is_some_and(|c| c.is_ascii_digit()) {
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let n: usize = digits.parse().unwrap_or(0);
            out.push('$');
            out.push_str(&(n + offset).to_string());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_pkeys_single_column_uses_any_array() {
        let d = Postgres;
        let q = d.build_find_by_pkeys(
            "users",
            &["id".to_string()],
            &["int4"],
            &[vec![DynValue::I64(1)], vec![DynValue::I64(2)], vec![DynValue::I64(3)]],
            &[],
        );
        assert_eq!(
            q.sql,
            "SELECT * FROM \"users\" WHERE \"id\" = ANY($1::int4[])"
        );
        assert_eq!(q.params.len(), 1);
        match &q.params[0] {
            DynValue::Array(a) => assert_eq!(a.len(), 3),
            _ => panic!("expected array param"),
        }
    }

    #[test]
    fn find_by_pkeys_composite_uses_unnest_join() {
        let d = Postgres;
        let q = d.build_find_by_pkeys(
            "memberships",
            &["org_id".to_string(), "user_id".to_string()],
            &["int4", "int4"],
            &[vec![DynValue::I64(1), DynValue::I64(10)]],
            &["org_id".to_string(), "user_id".to_string()],
        );
        assert!(q.sql.contains("JOIN UNNEST($1::int4[], $2::int4[]) AS v(\"org_id\", \"user_id\")"));
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn batch_insert_uses_unnest() {
        let d = Postgres;
        let q = d
            .build_insert(
                "posts",
                &["user_id".to_string(), "title".to_string()],
                &["int4", "text"],
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
            "INSERT INTO \"posts\" (\"user_id\", \"title\") SELECT v.\"user_id\", v.\"title\" FROM UNNEST($1::int4[], $2::text[]) AS v(\"user_id\", \"title\")"
        );
    }

    #[test]
    fn batch_insert_projects_array_and_json_columns() {
        let d = Postgres;
        let q = d
            .build_insert(
                "posts",
                &["id".to_string(), "tags".to_string(), "meta".to_string()],
                &["int4", "text[]", "jsonb"],
                &[
                    vec![
                        DynValue::I64(1),
                        DynValue::Array(vec![DynValue::Text("a".into()), DynValue::Text("b".into())]),
                        DynValue::Json(serde_json::json!({"k": 1})),
                    ],
                    vec![DynValue::I64(2), DynValue::Null, DynValue::Null],
                ],
                &OnConflict::None,
                None,
            )
            .unwrap();
        assert!(q.sql.contains("UNNEST($1::int4[], $2::text[], $3::text[])"));
        assert!(q.sql.contains(
            "CASE WHEN v.\"tags\" IS NULL THEN NULL ELSE COALESCE((SELECT array_agg(x::text) FROM jsonb_array_elements_text(v.\"tags\"::jsonb) AS x), ARRAY[]::text[]) END"
        ));
        assert!(q.sql.contains("v.\"meta\"::jsonb"));
        match &q.params[1] {
            DynValue::Array(vals) => {
                assert_eq!(vals[0], DynValue::Text("[\"a\",\"b\"]".to_string()));
                assert_eq!(vals[1], DynValue::Null);
            }
            _ => panic!("expected array param for tags column"),
        }
    }

    #[test]
    fn single_row_insert_uses_values() {
        let d = Postgres;
        let q = d
            .build_insert(
                "posts",
                &["title".to_string()],
                &["text"],
                &[vec![DynValue::Text("hello".into())]],
                &OnConflict::None,
                Some(&["id".to_string()]),
            )
            .unwrap();
        assert_eq!(
            q.sql,
            "INSERT INTO \"posts\" (\"title\") VALUES ($1) RETURNING \"id\""
        );
    }
}
