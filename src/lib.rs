//! crudify: generic CRUD over arbitrary PostgreSQL tables.
//!
//! Callers name a table and pass an [`ArgMap`] (equality filters plus `_limit`,
//! `_orderby`, `_order`, `_only`, `_nested`, `_returning`) and/or JSON rows; the
//! [`Engine`] builds the SQL, runs it, and hands back generic [`Row`]s.

pub mod engine;
pub mod error;
pub mod logging;
pub mod response;
pub mod row;
pub mod schema;
pub mod settings;
pub mod sql;

pub use engine::Engine;
pub use error::{CrudError, ErrorKind};
pub use response::{success_created, success_ok, Envelope};
pub use row::{rows_from_json, ArgMap, Directive, Row, DEFAULT_ARG_PREFIX};
pub use schema::{ForeignKeyEdge, PrimaryKeyColumn, TableSet};
pub use settings::{DbSettings, EngineSettings, Settings};
pub use sql::{FilterPredicate, Operand, QueryBuf};
