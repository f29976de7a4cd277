//! Catalog introspection: exposed tables, primary keys, foreign keys.

use crate::engine::{fetch_rows, Engine};
use crate::error::CrudError;
use crate::row::{ArgMap, Row};
use crate::sql::{select, FilterPredicate, QueryBuf};
use serde_json::Value;
use sqlx::PgConnection;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Table name → table name.
pub type TableSet = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryKeyColumn {
    pub name: String,
    /// Declared type as `format_type` prints it, e.g. `integer`, `character varying(20)`.
    pub data_type: String,
}

/// `column` of the inspected table references `foreign_schema.foreign_table.foreign_column`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKeyEdge {
    pub column: String,
    pub foreign_schema: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

pub(crate) fn tables_query(schema: &str) -> Result<QueryBuf, CrudError> {
    let args = ArgMap::new()
        .with("table_schema", schema)
        .with("table_type", "BASE TABLE");
    select(&["table_name"], "information_schema.tables", &args, &[])
}

pub(crate) fn primary_keys_query(schema: &str, table: &str) -> QueryBuf {
    QueryBuf {
        sql: "SELECT a.attname AS column_name, format_type(a.atttypid, a.atttypmod) AS data_type \
              FROM pg_index i \
              JOIN pg_class c ON c.oid = i.indrelid \
              JOIN pg_namespace n ON n.oid = c.relnamespace \
              JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey) \
              WHERE i.indisprimary AND n.nspname = $1 AND c.relname = $2 \
              ORDER BY array_position(i.indkey::int2[], a.attnum)"
            .to_string(),
        params: vec![Value::from(schema), Value::from(table)],
    }
}

const FOREIGN_KEY_PROJECTION: &[&str] = &[
    "kcu.column_name",
    "ccu.table_schema AS foreign_table_schema",
    "ccu.table_name AS foreign_table_name",
    "ccu.column_name AS foreign_column_name",
];

const FOREIGN_KEY_RELATION: &str = "information_schema.table_constraints AS tc \
     JOIN information_schema.key_column_usage AS kcu \
       ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
     JOIN information_schema.constraint_column_usage AS ccu \
       ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema";

pub(crate) fn foreign_keys_query(schema: &str, table: &str) -> Result<QueryBuf, CrudError> {
    let predicates = [
        FilterPredicate::eq("tc.constraint_type", "FOREIGN KEY"),
        FilterPredicate::eq("tc.table_schema", schema),
        FilterPredicate::eq("tc.table_name", table),
    ];
    select(FOREIGN_KEY_PROJECTION, FOREIGN_KEY_RELATION, &ArgMap::new(), &predicates)
}

fn text(row: &Row, key: &str) -> String {
    row.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

impl Engine {
    /// Base tables of the exposed schema. Loaded on first call and cached until
    /// [`invalidate_tables`](Self::invalidate_tables).
    pub async fn list_tables(&self) -> Result<Arc<TableSet>, CrudError> {
        let mut cached = self.tables.lock().await;
        if let Some(tables) = cached.as_ref() {
            return Ok(tables.clone());
        }
        let pool = self.pool()?;
        let schema = &self.settings().schema;
        tracing::debug!(schema = %schema, "loading table names");
        let mut conn = pool.acquire().await?;
        let rows = fetch_rows(&mut conn, &tables_query(schema)?).await?;
        let tables: TableSet = rows
            .iter()
            .map(|r| text(r, "table_name"))
            .filter(|n| !n.is_empty())
            .map(|n| (n.clone(), n))
            .collect();
        if tables.is_empty() {
            return Err(CrudError::SchemaEmpty(schema.clone()));
        }
        tracing::info!(count = tables.len(), "table registry loaded");
        let tables = Arc::new(tables);
        *cached = Some(tables.clone());
        Ok(tables)
    }

    /// Forget the cached table names; the next access reloads them.
    pub async fn invalidate_tables(&self) {
        *self.tables.lock().await = None;
    }

    pub(crate) async fn ensure_table(&self, table: &str) -> Result<(), CrudError> {
        if self.list_tables().await?.contains_key(table) {
            Ok(())
        } else {
            Err(CrudError::UnknownTable(table.to_string()))
        }
    }

    /// Primary-key columns of `table`, in key order. Never cached.
    pub async fn primary_keys(&self, table: &str) -> Result<Vec<PrimaryKeyColumn>, CrudError> {
        let pool = self.pool()?;
        let mut conn = pool.acquire().await?;
        self.primary_keys_on(&mut conn, table).await
    }

    pub(crate) async fn primary_keys_on(
        &self,
        conn: &mut PgConnection,
        table: &str,
    ) -> Result<Vec<PrimaryKeyColumn>, CrudError> {
        tracing::debug!(table, "selecting primary keys");
        let rows = fetch_rows(conn, &primary_keys_query(&self.settings().schema, table)).await?;
        Ok(rows
            .iter()
            .map(|r| PrimaryKeyColumn {
                name: text(r, "column_name"),
                data_type: text(r, "data_type"),
            })
            .collect())
    }

    /// Foreign keys declared on `table`. Never cached.
    pub async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyEdge>, CrudError> {
        let pool = self.pool()?;
        let mut conn = pool.acquire().await?;
        self.foreign_keys_on(&mut conn, &self.settings().schema, table).await
    }

    pub(crate) async fn foreign_keys_on(
        &self,
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyEdge>, CrudError> {
        tracing::debug!(schema, table, "selecting foreign keys");
        let rows = fetch_rows(conn, &foreign_keys_query(schema, table)?).await?;
        Ok(rows
            .iter()
            .map(|r| ForeignKeyEdge {
                column: text(r, "column_name"),
                foreign_schema: text(r, "foreign_table_schema"),
                foreign_table: text(r, "foreign_table_name"),
                foreign_column: text(r, "foreign_column_name"),
            })
            .collect())
    }
}
