//! PostgreSQL quoting and placeholder interpolation.
//!
//! Statements are built with `$n` placeholders and rendered into literal SQL
//! text before execution. Every non-null value becomes a quoted string literal,
//! which PostgreSQL resolves against the column type it is compared with or
//! assigned to, so no per-column type knowledge is needed.

use crate::error::CrudError;
use crate::sql::QueryBuf;
use serde_json::Value;

/// Quote an identifier: `users` → `"users"`.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote a dotted path segment by segment: `tc.table_name` → `"tc"."table_name"`.
pub fn quote_path(s: &str) -> String {
    s.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

/// Schema-qualified relation name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Render one bound value as a literal.
pub fn quote_literal(v: &Value) -> Result<String, CrudError> {
    let text = match v {
        Value::Null => return Ok("NULL".to_string()),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => v.to_string(),
    };
    if text.contains('\0') {
        return Err(CrudError::Build("value contains a NUL byte".into()));
    }
    let escaped = text.replace('\'', "''");
    if escaped.contains('\\') {
        // E'' form reads the same whatever standard_conforming_strings is set to.
        return Ok(format!("E'{}'", escaped.replace('\\', "\\\\")));
    }
    Ok(format!("'{}'", escaped))
}

/// Replace each `$n` outside of quoted identifiers and string literals with the
/// literal form of `q.params[n - 1]`.
pub fn interpolate(q: &QueryBuf) -> Result<String, CrudError> {
    let mut out = String::with_capacity(q.sql.len() + q.params.len() * 8);
    let mut chars = q.sql.chars().peekable();
    let mut in_ident = false;
    let mut in_string = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if !in_string => {
                in_ident = !in_ident;
                out.push(c);
            }
            '\'' if !in_ident => {
                in_string = !in_string;
                out.push(c);
            }
            '$' if !in_ident && !in_string && chars.peek().map_or(false, |d| d.is_ascii_digit()) => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                let n: usize = digits
                    .parse()
                    .map_err(|_| CrudError::Build(format!("bad placeholder ${}", digits)))?;
                let value = n
                    .checked_sub(1)
                    .and_then(|i| q.params.get(i))
                    .ok_or_else(|| CrudError::Build(format!("no value bound for placeholder ${}", n)))?;
                out.push_str(&quote_literal(value)?);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn buf(sql: &str, params: Vec<Value>) -> QueryBuf {
        QueryBuf {
            sql: sql.to_string(),
            params,
        }
    }

    #[test]
    fn identifiers() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_path("tc.table_name"), "\"tc\".\"table_name\"");
        assert_eq!(qualified_table("public", "t"), "\"public\".\"t\"");
    }

    #[test]
    fn literals() {
        assert_eq!(quote_literal(&json!(null)).unwrap(), "NULL");
        assert_eq!(quote_literal(&json!(5)).unwrap(), "'5'");
        assert_eq!(quote_literal(&json!(false)).unwrap(), "'false'");
        assert_eq!(quote_literal(&json!("o'neil")).unwrap(), "'o''neil'");
        assert_eq!(quote_literal(&json!("c:\\tmp")).unwrap(), "E'c:\\\\tmp'");
        assert!(matches!(quote_literal(&json!("a\0b")), Err(CrudError::Build(_))));
    }

    #[test]
    fn interpolates_in_order() {
        let q = buf("SELECT * FROM \"t\" WHERE \"a\" = $1 AND \"b\" = $2", vec![json!("x"), json!(2)]);
        assert_eq!(
            interpolate(&q).unwrap(),
            "SELECT * FROM \"t\" WHERE \"a\" = 'x' AND \"b\" = '2'"
        );
    }

    #[test]
    fn double_digit_placeholders() {
        let params: Vec<Value> = (1..=11).map(|i| json!(i)).collect();
        let q = buf("$1,$10,$11", params);
        assert_eq!(interpolate(&q).unwrap(), "'1','10','11'");
    }

    #[test]
    fn leaves_quoted_dollars_alone() {
        let q = buf("SELECT \"col$1\", '$1' FROM t WHERE x = $1", vec![json!("v")]);
        assert_eq!(interpolate(&q).unwrap(), "SELECT \"col$1\", '$1' FROM t WHERE x = 'v'");
    }

    #[test]
    fn missing_value_is_a_build_error() {
        let q = buf("x = $2", vec![json!(1)]);
        let err = interpolate(&q).unwrap_err();
        assert!(matches!(err, CrudError::Build(ref m) if m.contains("$2")));
        assert!(interpolate(&buf("x = $0", vec![json!(1)])).is_err());
    }

    #[test]
    fn injection_stays_inside_literal() {
        let q = buf("WHERE a = $1", vec![json!("'; DROP TABLE t; --")]);
        assert_eq!(interpolate(&q).unwrap(), "WHERE a = '''; DROP TABLE t; --'");
    }
}
