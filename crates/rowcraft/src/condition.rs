//! Condition AST (§4.2): an ordered list of WHERE/HAVING entries compiled
//! against a dialect. Conjunction (`AND`) is the default join; `Condition::or`
//! wraps a set of alternative condition lists in a single OR group with
//! explicit parenthesization so precedence never depends on the caller's
//! mental model of SQL operator binding.

use crate::dialect::Dialect;
use crate::param::{DynValue, ParamList};
use crate::value::{Skippable, Value};

/// One entry in a condition list, in the order it was added. Duplicate keys
/// are legal and render as redundant `AND` clauses (§4.2 "Duplicate keys").
#[derive(Debug, Clone)]
enum Entry {
    /// `(Column, Value)` — the common case; delegates to the value node.
    Column { column: String, value: Value },
    /// `(Fragment, values)` where `fragment` contains `?` placeholders that
    /// get substituted positionally, with IN-list expansion when the
    /// fragment has exactly one `IN (?)` and a single array value.
    Fragment {
        fragment: String,
        values: Vec<DynValue>,
    },
    /// A pure fragment with no parameters, emitted as-is.
    Raw(String),
    /// `(A) OR (B) OR ...`
    Or(Vec<Condition>),
}

/// An ordered, compilable condition list.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    entries: Vec<Entry>,
}

impl Condition {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Push a `(column, value)` entry. A `Skippable::Skip` value silently
    /// drops the entry — the SKIP idempotence property.
    pub fn column(mut self, column: impl Into<String>, value: impl Into<Skippable<Value>>) -> Self {
        match value.into() {
            Skippable::Skip => {}
            Skippable::Value(value) => self.entries.push(Entry::Column {
                column: column.into(),
                value,
            }),
        }
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<DynValue>) -> Self {
        self.column(column, Value::param(value))
    }

    pub fn in_list(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<DynValue>>,
    ) -> Self {
        self.column(column, Value::array(values))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.column(column, Value::Null)
    }

    pub fn is_not_null(self, column: impl Into<String>) -> Self {
        self.column(column, Value::NotNull)
    }

    /// `(template_with_?, values)`. If `values` is a single-element list
    /// whose value is `DynValue::Array` and the template contains exactly
    /// one `IN (?)` (case-insensitive), the array is expanded into an
    /// `IN (?, ?, ...)` list; otherwise placeholders are substituted
    /// positionally, one per value.
    pub fn fragment(
        mut self,
        template: impl Into<String>,
        values: impl Into<Skippable<Vec<DynValue>>>,
    ) -> Self {
        match values.into() {
            Skippable::Skip => {}
            Skippable::Value(values) => {
                self.entries.push(Entry::Fragment {
                    fragment: template.into(),
                    values,
                });
            }
        }
        self
    }

    /// A fragment with no parameters, emitted verbatim.
    pub fn raw(mut self, sql: impl Into<String>) -> Self {
        self.entries.push(Entry::Raw(sql.into()));
        self
    }

    /// `(A) OR (B) OR ...`, each alternative itself an AND-joined condition
    /// list.
    pub fn or(mut self, alternatives: Vec<Condition>) -> Self {
        self.entries.push(Entry::Or(alternatives));
        self
    }

    /// Append another condition's entries after this one's, preserving
    /// order (used to apply a model's `defaultFilter` ahead of a caller's
    /// own conditions, §4.6 precedence).
    pub fn append(mut self, other: Condition) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Compile to a SQL fragment (empty string if no entries compiled —
    /// callers must suppress the `WHERE`/`HAVING` keyword in that case) plus
    /// its bound parameters, in the dialect's placeholder style.
    pub fn compile(&self, dialect: &dyn Dialect) -> (String, ParamList) {
        let mut params = dialect.new_params();
        let sql = self.compile_into(&mut params, dialect);
        (sql, params)
    }

    fn compile_into(&self, params: &mut ParamList, dialect: &dyn Dialect) -> String {
        let mut clauses = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            match entry {
                Entry::Column { column, value } => {
                    clauses.push(value.compile(params, Some(column), dialect));
                }
                Entry::Raw(sql) => clauses.push(sql.clone()),
                Entry::Fragment { fragment, values } => {
                    clauses.push(compile_fragment(fragment, values, params));
                }
                Entry::Or(alternatives) => {
                    let rendered: Vec<String> = alternatives
                        .iter()
                        .filter(|c| !c.is_empty())
                        .map(|c| format!("({})", c.compile_into(params, dialect)))
                        .collect();
                    if !rendered.is_empty() {
                        clauses.push(format!("({})", rendered.join(" OR ")));
                    }
                }
            }
        }
        clauses.join(" AND ")
    }
}

fn compile_fragment(template: &str, values: &[DynValue], params: &mut ParamList) -> String {
    if values.len() == 1 {
        if let DynValue::Array(items) = &values[0] {
            if let Some(pos) = find_in_placeholder(template) {
                if items.is_empty() {
                    return format!("{}1 = 0{}", &template[..pos.0], &template[pos.1..]);
                }
                let placeholders: Vec<String> =
                    items.iter().cloned().map(|v| params.push(v)).collect();
                return format!(
                    "{}IN ({}){}",
                    &template[..pos.0],
                    placeholders.join(", "),
                    &template[pos.1..]
                );
            }
        }
    }

    let mut out = String::with_capacity(template.len());
    let mut values = values.iter();
    for ch in template.chars() {
        if ch == '?' {
            let v = values
                .next()
                .cloned()
                .expect("fragment placeholder count must match values length");
            out.push_str(&params.push(v));
        } else {
            out.push(ch);
        }
    }
    out
}

/// Find the byte range of an `IN (?)` clause (case-insensitive), returning
/// `(start_of_IN, end_after_closing_paren)` so the caller can splice an
/// expanded list in its place.
fn find_in_placeholder(template: &str) -> Option<(usize, usize)> {
    let lower = template.to_ascii_lowercase();
    let needle = "in (?)";
    let start = lower.find(needle)?;
    Some((start, start + needle.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::postgres::Postgres;

    #[test]
    fn and_join_of_eq_and_or_group() {
        let cond = Condition::new().eq("email", "a@b").or(vec![
            Condition::new().eq("role", "admin"),
            Condition::new()
                .eq("role", "mod")
                .fragment("level >= ?", vec![DynValue::I64(5)]),
        ]);
        let (sql, params) = cond.compile(&Postgres);
        assert_eq!(
            sql,
            "\"email\" = $1 AND ((\"role\" = $2) OR (\"role\" = $3 AND level >= $4))"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn skip_entry_is_dropped() {
        let cond = Condition::new()
            .column("name", Skippable::Skip)
            .eq("email", "x@y");
        let (sql, params) = cond.compile(&Postgres);
        assert_eq!(sql, "\"email\" = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn empty_condition_compiles_to_empty_string() {
        let cond = Condition::new();
        let (sql, params) = cond.compile(&Postgres);
        assert_eq!(sql, "");
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn in_list_compiles_stable_placeholders() {
        let cond = Condition::new().in_list("id", [1i64, 2, 3]);
        let (sql, params) = cond.compile(&Postgres);
        assert_eq!(sql, "\"id\" IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn fragment_expands_single_array_in_clause() {
        let cond = Condition::new().fragment(
            "tags.id IN (?)",
            vec![DynValue::Array(vec![DynValue::I64(1), DynValue::I64(2)])],
        );
        let (sql, _) = cond.compile(&Postgres);
        assert_eq!(sql, "tags.id IN ($1, $2)");
    }
}
