//! # Creation Statements
//!
//! A creation statement is a JSON object template for the record sent to the store. Supported
//! placeholders:
//!
//! - `{{name}}` / `{{username}}`, `{{password}}`, `{{role}}`, `{{display_name}}`: JSON-escaped
//!   strings, meant to sit inside quotes
//! - `{{expiration}}`: integer epoch seconds, 0 = never
//!
//! Each statement is rendered in a single pass, so substituted values are never re-expanded.
//! Rendered objects are merged left to right; `user` and `pass` are always forced to the
//! generated identifier and the requested password.

use super::IssuerError;
use crate::store::UserRecord;
use serde_json::{Map, Value};

/// Statement used when the host supplies none
pub const DEFAULT_CREATION_STATEMENT: &str = r#"{"user": "{{name}}", "pass": "{{password}}", "groups": ["{{role}}"], "exp_date": {{expiration}}}"#;

/// Values available to creation statements
#[derive(Clone, Copy)]
pub struct StatementValues<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub role: &'a str,
    pub display_name: &'a str,
    pub expiration: i64,
}

impl std::fmt::Debug for StatementValues<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementValues")
            .field("username", &self.username)
            .field("role", &self.role)
            .field("display_name", &self.display_name)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// Render `statements` (or the default statement if there are none) into one record
///
/// Blank statements are skipped. Empty group names are dropped.
///
/// # Errors
///
/// [`IssuerError::Statement`] for an unknown placeholder, invalid JSON, a non-object
/// statement or a field of the wrong type.
pub fn render_creation(
    statements: &[String],
    values: &StatementValues<'_>,
) -> Result<UserRecord, IssuerError> {
    let mut statements: Vec<&str> = statements
        .iter()
        .map(String::as_str)
        .filter(|s| !s.trim().is_empty())
        .collect();
    if statements.is_empty() {
        statements.push(DEFAULT_CREATION_STATEMENT);
    }

    let mut merged = Map::new();
    for (index, statement) in statements.iter().enumerate() {
        let rendered = render_statement(statement, values)?;
        match serde_json::from_str::<Value>(&rendered) {
            Ok(Value::Object(fields)) => merged.extend(fields),
            Ok(_) => {
                return Err(IssuerError::Statement(format!(
                    "statement {index} is not a JSON object"
                )));
            }
            Err(e) => {
                return Err(IssuerError::Statement(format!(
                    "statement {index} is not valid JSON: {e}"
                )));
            }
        }
    }

    merged.insert("user".to_string(), Value::from(values.username));
    merged.insert("pass".to_string(), Value::from(values.password));

    let mut record: UserRecord = serde_json::from_value(Value::Object(merged))
        .map_err(|e| IssuerError::Statement(format!("rendered record is invalid: {e}")))?;
    record.groups.retain(|group| !group.is_empty());
    Ok(record)
}

fn render_statement(statement: &str, values: &StatementValues<'_>) -> Result<String, IssuerError> {
    let mut out = String::with_capacity(statement.len());
    let mut rest = statement;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let end = body
            .find("}}")
            .ok_or_else(|| IssuerError::Statement("unclosed placeholder".to_string()))?;
        let key = body[..end].trim();
        match key {
            "name" | "username" => out.push_str(&json_escape(values.username)),
            "password" => out.push_str(&json_escape(values.password)),
            "role" => out.push_str(&json_escape(values.role)),
            "display_name" => out.push_str(&json_escape(values.display_name)),
            "expiration" => out.push_str(&values.expiration.to_string()),
            other => {
                return Err(IssuerError::Statement(format!(
                    "unknown placeholder {{{{{other}}}}}"
                )));
            }
        }
        rest = &body[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// JSON string escaping without the surrounding quotes
fn json_escape(value: &str) -> String {
    let quoted = Value::from(value).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
