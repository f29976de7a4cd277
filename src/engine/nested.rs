//! Nested objects: embed the single row each foreign key points at.
//!
//! For a row of `T` and a foreign key `T.c → F.fc`, the row of `F` whose `fc`
//! equals `row[c]` is embedded under `"<F>_obj"` when exactly one such row
//! exists. Embedded rows are hydrated the same way, except for tables already
//! on the current path and past the configured depth.

use super::{fetch_rows, Engine};
use crate::error::CrudError;
use crate::row::{ArgMap, Row};
use crate::schema::ForeignKeyEdge;
use crate::sql::{qualified_table, select, FilterPredicate};
use serde_json::Value;
use sqlx::PgConnection;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-call state: foreign keys fetched so far, and the tables being hydrated.
#[derive(Default)]
struct Hydration {
    edges: HashMap<(String, String), Vec<ForeignKeyEdge>>,
    path: Vec<(String, String)>,
}

impl Hydration {
    fn on_path(&self, schema: &str, table: &str) -> bool {
        self.path.iter().any(|(s, t)| s == schema && t == table)
    }
}

pub(crate) fn nested_key(foreign_table: &str) -> String {
    format!("{}_obj", foreign_table)
}

/// Equality on the referenced column. Kept out of the argument map so a column
/// named like a directive still filters.
fn key_lookup(edge: &ForeignKeyEdge, value: Value) -> FilterPredicate {
    FilterPredicate::eq(edge.foreign_column.clone(), value)
}

impl Engine {
    pub(crate) async fn hydrate(
        &self,
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
        rows: Vec<Row>,
    ) -> Result<Vec<Row>, CrudError> {
        let mut state = Hydration::default();
        self.hydrate_level(conn, &mut state, schema, table, rows, 0).await
    }

    fn hydrate_level<'a>(
        &'a self,
        conn: &'a mut PgConnection,
        state: &'a mut Hydration,
        schema: &'a str,
        table: &'a str,
        mut rows: Vec<Row>,
        depth: usize,
    ) -> BoxFuture<'a, Result<Vec<Row>, CrudError>> {
        Box::pin(async move {
            if rows.is_empty() || depth >= self.settings().max_nested_depth {
                return Ok(rows);
            }
            tracing::debug!(schema, table, depth, "adding nested objects");

            let key = (schema.to_string(), table.to_string());
            let edges = match state.edges.get(&key) {
                Some(edges) => edges.clone(),
                None => {
                    let edges = self.foreign_keys_on(conn, schema, table).await?;
                    state.edges.insert(key.clone(), edges.clone());
                    edges
                }
            };
            if edges.is_empty() {
                return Ok(rows);
            }

            state.path.push(key);
            for row in rows.iter_mut() {
                for edge in &edges {
                    let Some(value) = row.get(&edge.column).filter(|v| !v.is_null()).cloned() else {
                        continue;
                    };
                    let relation = qualified_table(&edge.foreign_schema, &edge.foreign_table);
                    let q = select(&["*"], &relation, &ArgMap::new(), &[key_lookup(edge, value)])?;
                    let found = fetch_rows(&mut *conn, &q).await?;
                    if found.len() != 1 {
                        continue;
                    }
                    let found = if state.on_path(&edge.foreign_schema, &edge.foreign_table) {
                        found
                    } else {
                        self.hydrate_level(
                            &mut *conn,
                            &mut *state,
                            &edge.foreign_schema,
                            &edge.foreign_table,
                            found,
                            depth + 1,
                        )
                        .await?
                    };
                    if let Some(obj) = found.into_iter().next() {
                        row.insert(nested_key(&edge.foreign_table), Value::Object(obj));
                    }
                }
            }
            state.path.pop();
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_membership_is_per_schema() {
        let mut h = Hydration::default();
        h.path.push(("public".into(), "a".into()));
        assert!(h.on_path("public", "a"));
        assert!(!h.on_path("other", "a"));
        assert!(!h.on_path("public", "b"));
    }

    #[test]
    fn key_lookup_filters_prefixed_columns() {
        let edge = ForeignKeyEdge {
            column: "parent".into(),
            foreign_schema: "public".into(),
            foreign_table: "nodes".into(),
            foreign_column: "_id".into(),
        };
        let q = select(&["*"], "\"public\".\"nodes\"", &ArgMap::new(), &[key_lookup(&edge, Value::from("7"))]).unwrap();
        assert_eq!(q.render().unwrap(), "SELECT * FROM \"public\".\"nodes\" WHERE \"_id\" = '7'");
    }

    #[test]
    fn nested_key_suffix() {
        assert_eq!(nested_key("customers"), "customers_obj");
    }
}
