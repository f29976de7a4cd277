//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from argument maps and rows.

use crate::error::CrudError;
use crate::row::{value_text, ArgMap, Directive, Row};
use crate::sql::dialect::{interpolate, quote_ident, quote_path};
use serde_json::Value;

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Literal SQL text with every placeholder replaced by its value.
    pub fn render(&self) -> Result<String, CrudError> {
        interpolate(self)
    }
}

/// Comparison allowed in an explicit filter predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operand {
    pub fn parse(s: &str) -> Result<Self, CrudError> {
        Ok(match s {
            "=" => Operand::Eq,
            "<" => Operand::Lt,
            "<=" => Operand::Lte,
            ">" => Operand::Gt,
            ">=" => Operand::Gte,
            other => return Err(CrudError::UnknownOperator(other.to_string())),
        })
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Operand::Eq => "=",
            Operand::Lt => "<",
            Operand::Lte => "<=",
            Operand::Gt => ">",
            Operand::Gte => ">=",
        }
    }
}

/// (column, value, operand). The operand stays textual until the query is
/// built so an unsupported symbol is reported at that point.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterPredicate {
    pub column: String,
    pub value: Value,
    pub operand: String,
}

impl FilterPredicate {
    pub fn new(column: impl Into<String>, value: impl Into<Value>, operand: impl Into<String>) -> Self {
        FilterPredicate {
            column: column.into(),
            value: value.into(),
            operand: operand.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterPredicate::new(column, value, "=")
    }
}

/// `"col" = $n`, or `"col" IS NULL` for a null value (which would never compare equal).
fn equality(q: &mut QueryBuf, column_sql: String, value: &Value) -> String {
    if value.is_null() {
        format!("{} IS NULL", column_sql)
    } else {
        let n = q.push_param(value.clone());
        format!("{} = ${}", column_sql, n)
    }
}

fn where_clause(parts: &[String]) -> String {
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT over `relation` (an already-rendered FROM item).
///
/// Non-reserved keys of `args` become equality filters, bound in map order;
/// `predicates` follow, each with its own comparison. `projection` items are
/// trusted SQL expressions.
pub fn select(
    projection: &[&str],
    relation: &str,
    args: &ArgMap,
    predicates: &[FilterPredicate],
) -> Result<QueryBuf, CrudError> {
    let mut q = QueryBuf::new();
    let from = if args.has(Directive::Only) {
        format!("ONLY {}", relation)
    } else {
        relation.to_string()
    };

    let mut where_parts = Vec::new();
    for (col, val) in args.filters() {
        where_parts.push(equality(&mut q, quote_ident(col), val));
    }

    let mut order_clause = String::new();
    if let Some(col) = args.text(Directive::OrderBy) {
        let dir = match args.text(Directive::Order).as_deref() {
            None | Some("true") => "ASC",
            Some("false") => "DESC",
            Some(other) => return Err(CrudError::InvalidOrder(other.to_string())),
        };
        order_clause = format!(" ORDER BY {} {}", quote_ident(&col), dir);
    }

    let mut limit_clause = String::new();
    if let Some(raw) = args.text(Directive::Limit) {
        let n: u64 = raw.parse().map_err(|_| CrudError::InvalidLimit(raw.clone()))?;
        limit_clause = format!(" LIMIT {}", n);
    }

    for p in predicates {
        let op = Operand::parse(&p.operand)?;
        let n = q.push_param(p.value.clone());
        where_parts.push(format!("{} {} ${}", quote_path(&p.column), op.as_sql(), n));
    }

    let cols = if projection.is_empty() {
        "*".to_string()
    } else {
        projection.join(", ")
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        cols,
        from,
        where_clause(&where_parts),
        order_clause,
        limit_clause
    );
    Ok(q)
}

/// INSERT of one row using that row's own columns. An empty row inserts defaults.
pub fn insert(relation: &str, row: &Row, returning: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    for (k, v) in row {
        let n = q.push_param(v.clone());
        cols.push(quote_ident(k));
        placeholders.push(format!("${}", n));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", relation)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            relation,
            cols.join(", "),
            placeholders.join(", ")
        )
    };
    if let Some(col) = returning {
        q.sql.push_str(&format!(" RETURNING {}", quote_ident(col)));
    }
    q
}

/// UPDATE setting `sets` on the rows matching every `(column, value)` of `keys`.
pub fn update(relation: &str, sets: &[(&str, &Value)], keys: &[(&str, &Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut set_parts = Vec::with_capacity(sets.len());
    for (col, val) in sets {
        let n = q.push_param((*val).clone());
        set_parts.push(format!("{} = ${}", quote_ident(col), n));
    }
    let mut where_parts = Vec::with_capacity(keys.len());
    for (col, val) in keys {
        where_parts.push(equality(&mut q, quote_ident(col), val));
    }
    q.sql = format!(
        "UPDATE {} SET {}{}",
        relation,
        set_parts.join(", "),
        where_clause(&where_parts)
    );
    q
}

/// DELETE matching every filter, ANDed. Callers refuse an empty filter set.
pub fn delete<'a>(relation: &str, filters: impl IntoIterator<Item = (&'a String, &'a Value)>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut where_parts = Vec::new();
    for (col, val) in filters {
        where_parts.push(equality(&mut q, quote_ident(col), val));
    }
    q.sql = format!("DELETE FROM {}{}", relation, where_clause(&where_parts));
    q
}

/// Short description of a row for error messages.
pub fn describe_row(row: &Row) -> String {
    row.iter()
        .map(|(k, v)| format!("{}={}", k, value_text(v).unwrap_or_else(|| "NULL".into())))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const USERS: &str = "\"public\".\"users\"";

    #[test]
    fn every_plain_key_is_an_equality() {
        let args = ArgMap::new().with("name", "bob").with("age", "3").with("city", "Paris");
        let q = select(&["*"], USERS, &args, &[]).unwrap();
        assert_eq!(q.params.len(), args.len());
        assert_eq!(
            q.sql,
            "SELECT * FROM \"public\".\"users\" WHERE \"name\" = $1 AND \"age\" = $2 AND \"city\" = $3"
        );
        assert_eq!(q.params, vec![json!("bob"), json!("3"), json!("Paris")]);
    }

    #[test]
    fn limit_caps_rows() {
        let args = ArgMap::new().with_directive(Directive::Limit, "10");
        let q = select(&["*"], USERS, &args, &[]).unwrap();
        assert!(q.sql.ends_with(" LIMIT 10"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn bad_limit_names_the_value() {
        for bad in ["abc", "-1", "1.5"] {
            let args = ArgMap::new().with_directive(Directive::Limit, bad);
            match select(&["*"], USERS, &args, &[]) {
                Err(CrudError::InvalidLimit(v)) => assert_eq!(v, bad),
                other => panic!("expected InvalidLimit, got {:?}", other.map(|q| q.sql)),
            }
        }
    }

    #[test]
    fn ordering() {
        let asc = ArgMap::new().with_directive(Directive::OrderBy, "name");
        assert!(select(&["*"], USERS, &asc, &[]).unwrap().sql.ends_with("ORDER BY \"name\" ASC"));

        let desc = asc.clone().with_directive(Directive::Order, "false");
        assert!(select(&["*"], USERS, &desc, &[]).unwrap().sql.ends_with("ORDER BY \"name\" DESC"));

        let explicit = asc.clone().with_directive(Directive::Order, "true");
        assert!(select(&["*"], USERS, &explicit, &[]).unwrap().sql.ends_with("ASC"));

        let bad = asc.with_directive(Directive::Order, "up");
        assert!(matches!(select(&["*"], USERS, &bad, &[]), Err(CrudError::InvalidOrder(v)) if v == "up"));
    }

    #[test]
    fn order_then_limit() {
        let args = ArgMap::new()
            .with_directive(Directive::Limit, "5")
            .with_directive(Directive::OrderBy, "id");
        let q = select(&["*"], USERS, &args, &[]).unwrap();
        assert!(q.sql.ends_with("ORDER BY \"id\" ASC LIMIT 5"));
    }

    #[test]
    fn only_excludes_children() {
        let args = ArgMap::new().with_directive(Directive::Only, "");
        let q = select(&["*"], USERS, &args, &[]).unwrap();
        assert_eq!(q.sql, "SELECT * FROM ONLY \"public\".\"users\"");
    }

    #[test]
    fn predicates_follow_argument_filters() {
        let args = ArgMap::new().with("status", "open");
        let preds = [
            FilterPredicate::new("tc.table_name", "users", "="),
            FilterPredicate::new("age", 18, ">="),
        ];
        let q = select(&["kcu.column_name"], "t", &args, &preds).unwrap();
        assert_eq!(
            q.sql,
            "SELECT kcu.column_name FROM t WHERE \"status\" = $1 AND \"tc\".\"table_name\" = $2 AND \"age\" >= $3"
        );
        assert_eq!(q.params.len(), 3);
    }

    #[test]
    fn unknown_operand() {
        let preds = [FilterPredicate::new("id", 1, "!=")];
        match select(&["*"], USERS, &ArgMap::new(), &preds) {
            Err(CrudError::UnknownOperator(op)) => assert_eq!(op, "!="),
            other => panic!("expected UnknownOperator, got {:?}", other.map(|q| q.sql)),
        }
    }

    #[test]
    fn operand_symbols() {
        for s in ["=", "<", "<=", ">", ">="] {
            assert_eq!(Operand::parse(s).unwrap().as_sql(), s);
        }
        assert!(Operand::parse("LIKE").is_err());
    }

    #[test]
    fn null_filter_is_is_null() {
        let args = ArgMap::new().with("deleted_at", Value::Null);
        let q = select(&["*"], USERS, &args, &[]).unwrap();
        assert!(q.sql.ends_with("WHERE \"deleted_at\" IS NULL"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn insert_uses_row_columns() {
        let row: Row = serde_json::from_value(json!({"name": "a", "age": 3})).unwrap();
        let q = insert(USERS, &row, Some("id"));
        assert_eq!(
            q.sql,
            "INSERT INTO \"public\".\"users\" (\"name\", \"age\") VALUES ($1, $2) RETURNING \"id\""
        );
        assert_eq!(q.render().unwrap(), "INSERT INTO \"public\".\"users\" (\"name\", \"age\") VALUES ('a', '3') RETURNING \"id\"");
    }

    #[test]
    fn insert_empty_row_uses_defaults() {
        let q = insert(USERS, &Row::new(), None);
        assert_eq!(q.sql, "INSERT INTO \"public\".\"users\" DEFAULT VALUES");
    }

    #[test]
    fn update_sets_then_keys() {
        let name = json!("x");
        let id = json!(5);
        let q = update(USERS, &[("name", &name)], &[("id", &id)]);
        assert_eq!(q.sql, "UPDATE \"public\".\"users\" SET \"name\" = $1 WHERE \"id\" = $2");
        assert_eq!(q.params, vec![json!("x"), json!(5)]);
    }

    #[test]
    fn delete_single_predicate() {
        let row: Row = serde_json::from_value(json!({"id": 5})).unwrap();
        let q = delete(USERS, &row);
        assert_eq!(q.sql, "DELETE FROM \"public\".\"users\" WHERE \"id\" = $1");
        assert_eq!(q.params, vec![json!(5)]);
    }

    #[test]
    fn row_description() {
        let row: Row = serde_json::from_value(json!({"id": 5, "name": null})).unwrap();
        assert_eq!(describe_row(&row), "id=5, name=NULL");
    }
}
