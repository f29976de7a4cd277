//! Generic CRUD execution. Multi-row writes share one transaction per call;
//! dropping the transaction on any early return rolls it back.

use super::{execute, fetch_optional_row, fetch_rows, Engine};
use crate::error::CrudError;
use crate::row::{ArgMap, Directive, Row};
use crate::sql::{delete, describe_row, insert, qualified_table, select, update};
use serde_json::Value;
use sqlx::PgConnection;

impl Engine {
    /// Rows of `table` matching `args`, with nested objects when `_nested` is set.
    pub async fn select(&self, table: &str, args: &ArgMap) -> Result<Vec<Row>, CrudError> {
        tracing::debug!(table, "selecting");
        let pool = self.pool()?;
        self.ensure_table(table).await?;
        let mut conn = pool.acquire().await?;
        let schema = self.settings().schema.clone();
        self.select_on(&mut conn, &schema, table, args).await
    }

    pub(crate) async fn select_on(
        &self,
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
        args: &ArgMap,
    ) -> Result<Vec<Row>, CrudError> {
        let q = select(&["*"], &qualified_table(schema, table), args, &[])?;
        let rows = fetch_rows(conn, &q).await?;
        if args.has(Directive::Nested) {
            return self.hydrate(conn, schema, table, rows).await;
        }
        Ok(rows)
    }

    /// Insert every row in one transaction. With `_returning=<column>` each
    /// statement hands back that column; a positive integer result is written
    /// into the row as `id` and the rows are returned.
    pub async fn insert(&self, table: &str, args: &ArgMap, mut rows: Vec<Row>) -> Result<Option<Vec<Row>>, CrudError> {
        tracing::debug!(table, count = rows.len(), "inserting");
        let pool = self.pool()?;
        if rows.is_empty() {
            return Err(CrudError::MissingData("no rows to insert".into()));
        }
        self.ensure_table(table).await?;
        let relation = self.relation(table);
        let returning = args.text(Directive::Returning);

        let mut tx = pool.begin().await?;
        for row in rows.iter_mut() {
            let q = insert(&relation, row, returning.as_deref());
            if returning.is_none() {
                execute(&mut tx, &q).await?;
                continue;
            }
            let generated = fetch_optional_row(&mut tx, &q)
                .await?
                .and_then(|r| r.values().next().and_then(Value::as_str).and_then(|s| s.parse::<i64>().ok()))
                .filter(|id| *id > 0);
            if let Some(id) = generated {
                row.insert("id".to_string(), Value::from(id));
            }
        }
        tx.commit().await?;
        Ok(returning.map(|_| rows))
    }

    /// Update rows matched by their full primary key, in one transaction.
    /// Returns the number of rows changed.
    ///
    /// Every row must carry all key columns and at least one other column: a
    /// row holding only its key is refused with `MissingData` instead of being
    /// written back unchanged. A table without a primary key is refused with
    /// `EmptyFilter`.
    pub async fn update(&self, table: &str, args: &ArgMap, rows: Vec<Row>) -> Result<u64, CrudError> {
        tracing::debug!(table, count = rows.len(), args = args.len(), "updating");
        let pool = self.pool()?;
        if rows.is_empty() {
            return Err(CrudError::MissingData("no rows to update".into()));
        }
        self.ensure_table(table).await?;
        let pk = self.primary_keys(table).await?;
        if pk.is_empty() {
            tracing::warn!(table, "update refused: table has no primary key");
            return Err(CrudError::EmptyFilter);
        }
        let relation = self.relation(table);

        let mut tx = pool.begin().await?;
        let mut total = 0;
        for row in &rows {
            let keys: Vec<(&str, &Value)> = pk
                .iter()
                .filter_map(|c| row.get(&c.name).map(|v| (c.name.as_str(), v)))
                .collect();
            if keys.len() < pk.len() {
                let missing = pk
                    .iter()
                    .filter(|c| !row.contains_key(&c.name))
                    .map(|c| c.name.clone())
                    .collect();
                return Err(CrudError::MissingPrimaryKeys(missing));
            }
            let sets: Vec<(&str, &Value)> = row
                .iter()
                .filter(|(k, _)| !pk.iter().any(|c| &c.name == *k))
                .map(|(k, v)| (k.as_str(), v))
                .collect();
            if sets.is_empty() {
                return Err(CrudError::MissingData(format!(
                    "nothing to update besides the primary key ({})",
                    describe_row(row)
                )));
            }
            let affected = execute(&mut tx, &update(&relation, &sets, &keys)).await?;
            if affected == 0 {
                return Err(CrudError::NoRowsAffected(describe_row(row)));
            }
            total += affected;
        }
        tx.commit().await?;
        Ok(total)
    }

    /// Delete rows matching every filter in `args`. Refuses an unfiltered delete.
    pub async fn delete(&self, table: &str, args: &ArgMap) -> Result<u64, CrudError> {
        tracing::debug!(table, "deleting");
        let pool = self.pool()?;
        if args.filter_count() == 0 {
            return Err(CrudError::EmptyFilter);
        }
        self.ensure_table(table).await?;
        let mut conn = pool.acquire().await?;
        execute(&mut conn, &delete(&self.relation(table), args.filters())).await
    }

    /// One DELETE per filter set, in one transaction. Empty sets are skipped.
    pub async fn delete_multiple(&self, table: &str, filters: Vec<Row>) -> Result<u64, CrudError> {
        tracing::debug!(table, count = filters.len(), "deleting multiple rows");
        let pool = self.pool()?;
        if filters.is_empty() {
            return Err(CrudError::MissingData("no filters to delete by".into()));
        }
        self.ensure_table(table).await?;
        let relation = self.relation(table);

        let mut tx = pool.begin().await?;
        let mut total = 0;
        for filter in filters.iter().filter(|f| !f.is_empty()) {
            total += execute(&mut tx, &delete(&relation, filter)).await?;
        }
        tx.commit().await?;
        Ok(total)
    }
}
