//! The engine: shared pool handle, table registry, and statement execution.
//!
//! Statements are rendered to literal SQL and sent over the simple-query
//! protocol, so every result column arrives as text (or NULL) whatever its
//! declared type.

mod crud;
mod nested;

use crate::error::CrudError;
use crate::row::{ArgMap, Row};
use crate::schema::TableSet;
use crate::settings::{DbSettings, EngineSettings, Settings};
use crate::sql::{qualified_table, QueryBuf};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, Executor, PgConnection, PgPool, Row as _};
use std::sync::{Arc, RwLock};

pub struct Engine {
    db: DbSettings,
    settings: EngineSettings,
    pool: RwLock<Option<PgPool>>,
    /// Loaded once on first use; the mutex is held across the load so concurrent
    /// first callers share a single catalog query.
    pub(crate) tables: tokio::sync::Mutex<Option<Arc<TableSet>>>,
}

impl Engine {
    /// An engine that is not connected yet; call [`connect`](Self::connect).
    pub fn new(settings: Settings) -> Self {
        Engine {
            db: settings.database,
            settings: settings.engine,
            pool: RwLock::new(None),
            tables: tokio::sync::Mutex::new(None),
        }
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: PgPool, settings: EngineSettings) -> Self {
        Engine {
            db: DbSettings::default(),
            settings,
            pool: RwLock::new(Some(pool)),
            tables: tokio::sync::Mutex::new(None),
        }
    }

    /// Open the pool and ping the server.
    pub async fn connect(&self) -> Result<(), CrudError> {
        let opts = self.db.connect_options()?;
        tracing::info!(target_db = %self.db, "connecting to database");
        let pool = PgPoolOptions::new().max_connections(5).connect_with(opts).await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        *self.pool.write().unwrap_or_else(|e| e.into_inner()) = Some(pool);
        tracing::info!(schema = %self.settings.schema, "connected");
        Ok(())
    }

    /// Close the pool. Later operations fail with `NotConnected` until reconnected.
    pub async fn close(&self) {
        let pool = self.pool.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pool) = pool {
            pool.close().await;
        }
        *self.tables.lock().await = None;
    }

    pub fn is_connected(&self) -> bool {
        self.pool.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// An empty argument map using this engine's reserved-key prefix.
    pub fn args(&self) -> ArgMap {
        ArgMap::with_prefix(self.settings.arg_prefix.clone())
    }

    pub(crate) fn pool(&self) -> Result<PgPool, CrudError> {
        self.pool
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(CrudError::NotConnected)
    }

    /// Schema-qualified name of a table in the exposed schema.
    pub(crate) fn relation(&self, table: &str) -> String {
        qualified_table(&self.settings.schema, table)
    }
}

pub(crate) async fn fetch_rows(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<Row>, CrudError> {
    let sql = q.render()?;
    tracing::debug!(sql = %sql, "query");
    let rows = conn.fetch_all(sqlx::raw_sql(&sql)).await?;
    rows.iter().map(row_to_map).collect()
}

pub(crate) async fn fetch_optional_row(conn: &mut PgConnection, q: &QueryBuf) -> Result<Option<Row>, CrudError> {
    let sql = q.render()?;
    tracing::debug!(sql = %sql, "query (one)");
    let row = conn.fetch_optional(sqlx::raw_sql(&sql)).await?;
    row.as_ref().map(row_to_map).transpose()
}

/// Run a statement and return the affected row count.
pub(crate) async fn execute(conn: &mut PgConnection, q: &QueryBuf) -> Result<u64, CrudError> {
    let sql = q.render()?;
    tracing::debug!(sql = %sql, "execute");
    let done = conn.execute(sqlx::raw_sql(&sql)).await?;
    Ok(done.rows_affected())
}

/// Each column as its text form, or null.
fn row_to_map(row: &PgRow) -> Result<Row, CrudError> {
    let mut map = Row::new();
    for (i, col) in row.columns().iter().enumerate() {
        let text: Option<String> = row.try_get_unchecked(i)?;
        map.insert(col.name().to_string(), text.map(Value::String).unwrap_or(Value::Null));
    }
    Ok(map)
}
