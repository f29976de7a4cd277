//! Connection and engine settings, from the environment (`.env` honoured) or JSON.

use crate::error::CrudError;
use crate::row::DEFAULT_ARG_PREFIX;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::fmt;
use std::str::FromStr;

/// Where to connect. `url`, when present, wins over the discrete fields.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub dbname: String,
    pub password: String,
    pub sslmode: String,
    pub url: Option<String>,
}

impl Default for DbSettings {
    fn default() -> Self {
        DbSettings {
            host: "localhost".into(),
            port: 5432,
            user: "postgres".into(),
            dbname: "postgres".into(),
            password: String::new(),
            sslmode: "prefer".into(),
            url: None,
        }
    }
}

impl DbSettings {
    /// Key/value pairs in the order they appear in the connection string.
    fn fields(&self) -> [(&'static str, String); 6] {
        [
            ("host", self.host.clone()),
            ("port", self.port.to_string()),
            ("user", self.user.clone()),
            ("dbname", self.dbname.clone()),
            ("password", self.password.clone()),
            ("sslmode", self.sslmode.clone()),
        ]
    }

    /// libpq-style `key=value` string: `host=localhost port=5432 user=... sslmode=prefer`.
    pub fn connection_string(&self) -> String {
        self.fields()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions, CrudError> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url)
                .map_err(|e| CrudError::Config(format!("invalid database url: {}", e)));
        }
        let ssl_mode = PgSslMode::from_str(&self.sslmode)
            .map_err(|e| CrudError::Config(format!("invalid sslmode '{}': {}", self.sslmode, e)))?;
        let mut opts = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.dbname)
            .ssl_mode(ssl_mode);
        if !self.password.is_empty() {
            opts = opts.password(&self.password);
        }
        Ok(opts)
    }
}

/// Connection string with the password masked, for logs.
impl fmt::Display for DbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.url.is_some() {
            return write!(f, "database url from environment");
        }
        let masked: Vec<String> = self
            .fields()
            .iter()
            .map(|(k, v)| match *k {
                "password" if !v.is_empty() => format!("{}=***", k),
                _ => format!("{}={}", k, v),
            })
            .collect();
        write!(f, "{}", masked.join(" "))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Schema whose base tables are exposed.
    pub schema: String,
    /// Prefix marking reserved argument keys.
    pub arg_prefix: String,
    /// How many foreign-key hops nested hydration may follow.
    pub max_nested_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            schema: "public".into(),
            arg_prefix: DEFAULT_ARG_PREFIX.into(),
            max_nested_depth: 4,
        }
    }
}

impl EngineSettings {
    /// An empty prefix would make every directive name a column filter as well.
    pub fn validate(&self) -> Result<(), CrudError> {
        if self.arg_prefix.is_empty() {
            return Err(CrudError::Config("arg_prefix must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub database: DbSettings,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl Settings {
    /// Reads `CRUDIFY_*` variables (and `DATABASE_URL`) after loading `.env` if present.
    pub fn from_env() -> Result<Self, CrudError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_json_str(s: &str) -> Result<Self, CrudError> {
        let settings: Settings =
            serde_json::from_str(s).map_err(|e| CrudError::Config(format!("settings json: {}", e)))?;
        settings.engine.validate()?;
        Ok(settings)
    }

    /// Unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CrudError> {
        let mut s = Settings::default();
        let db = &mut s.database;
        if let Some(v) = lookup("CRUDIFY_DB_HOST") {
            db.host = v;
        }
        if let Some(v) = lookup("CRUDIFY_DB_PORT") {
            db.port = v
                .parse()
                .map_err(|_| CrudError::Config(format!("CRUDIFY_DB_PORT '{}' is not a port number", v)))?;
        }
        if let Some(v) = lookup("CRUDIFY_DB_USER") {
            db.user = v;
        }
        if let Some(v) = lookup("CRUDIFY_DB_NAME") {
            db.dbname = v;
        }
        if let Some(v) = lookup("CRUDIFY_DB_PASSWORD") {
            db.password = v;
        }
        if let Some(v) = lookup("CRUDIFY_DB_SSLMODE") {
            db.sslmode = v;
        }
        db.url = lookup("DATABASE_URL").filter(|u| !u.is_empty());

        let engine = &mut s.engine;
        if let Some(v) = lookup("CRUDIFY_SCHEMA") {
            engine.schema = v;
        }
        if let Some(v) = lookup("CRUDIFY_ARG_PREFIX") {
            engine.arg_prefix = v;
        }
        if let Some(v) = lookup("CRUDIFY_MAX_NESTED_DEPTH") {
            engine.max_nested_depth = v
                .parse()
                .map_err(|_| CrudError::Config(format!("CRUDIFY_MAX_NESTED_DEPTH '{}' is not a number", v)))?;
        }
        s.engine.validate()?;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn connection_string_field_order_is_fixed() {
        let db = DbSettings {
            host: "db".into(),
            port: 6543,
            user: "app".into(),
            dbname: "shop".into(),
            password: "s3cret".into(),
            sslmode: "disable".into(),
            url: None,
        };
        assert_eq!(
            db.connection_string(),
            "host=db port=6543 user=app dbname=shop password=s3cret sslmode=disable"
        );
        assert_eq!(db.to_string(), "host=db port=6543 user=app dbname=shop password=*** sslmode=disable");
    }

    #[test]
    fn env_overrides_defaults() {
        let s = Settings::from_lookup(lookup(&[
            ("CRUDIFY_DB_HOST", "pg"),
            ("CRUDIFY_DB_PORT", "5433"),
            ("CRUDIFY_SCHEMA", "app"),
            ("CRUDIFY_MAX_NESTED_DEPTH", "2"),
        ]))
        .unwrap();
        assert_eq!(s.database.host, "pg");
        assert_eq!(s.database.port, 5433);
        assert_eq!(s.database.user, "postgres");
        assert_eq!(s.engine.schema, "app");
        assert_eq!(s.engine.arg_prefix, "_");
        assert_eq!(s.engine.max_nested_depth, 2);
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let err = Settings::from_lookup(lookup(&[("CRUDIFY_DB_PORT", "high")])).unwrap_err();
        assert!(matches!(err, CrudError::Config(ref m) if m.contains("high")));
        assert!(Settings::from_lookup(lookup(&[("CRUDIFY_MAX_NESTED_DEPTH", "-1")])).is_err());
    }

    #[test]
    fn json_settings_fill_defaults() {
        let s = Settings::from_json_str(r#"{"database": {"host": "h"}, "engine": {"arg_prefix": "$"}}"#).unwrap();
        assert_eq!(s.database.host, "h");
        assert_eq!(s.database.port, 5432);
        assert_eq!(s.engine.arg_prefix, "$");
        assert_eq!(s.engine.schema, "public");
    }

    #[test]
    fn connect_options_reject_bad_sslmode() {
        let db = DbSettings {
            sslmode: "sometimes".into(),
            ..DbSettings::default()
        };
        assert!(matches!(db.connect_options(), Err(CrudError::Config(_))));
        assert!(DbSettings::default().connect_options().is_ok());
    }

    #[test]
    fn empty_arg_prefix_is_rejected() {
        let err = Settings::from_lookup(lookup(&[("CRUDIFY_ARG_PREFIX", "")])).unwrap_err();
        assert!(matches!(err, CrudError::Config(ref m) if m.contains("arg_prefix")));
        assert!(matches!(
            Settings::from_json_str(r#"{"engine": {"arg_prefix": ""}}"#),
            Err(CrudError::Config(_))
        ));
        assert!(Settings::from_lookup(lookup(&[("CRUDIFY_ARG_PREFIX", "$")])).is_ok());
    }

    #[test]
    fn url_wins() {
        let s = Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://u@h/db")])).unwrap();
        assert!(s.database.connect_options().is_ok());
        assert_eq!(s.database.to_string(), "database url from environment");
    }
}
