//! # Issuer Errors
//!
//! Every variant carries its message as owned text so that [`IssuerError::redact`] can rewrite
//! it before it leaves the issuer.

use std::collections::HashMap;

/// Credential issuer failure
#[derive(Debug, thiserror::Error)]
pub enum IssuerError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("connection producer is not initialized")]
    NotInitialized,

    #[error("user {0} not found")]
    NotFound(String),

    #[error("user {0} already exists")]
    AlreadyExists(String),

    #[error("{}", describe_transport(.operation, *.status, .body))]
    Transport {
        operation: String,
        /// `None` when no response was received
        status: Option<u16>,
        body: String,
    },

    #[error("unable to initialize username template: {0}")]
    TemplateResolution(String),

    #[error("invalid username template: {0}")]
    TemplateValidation(String),

    #[error("error initializing connection producer: {0}")]
    ProducerInitialization(String),

    #[error("invalid creation statement: {0}")]
    Statement(String),

    #[error("no changes requested")]
    NoChanges,

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("{}", describe_aggregate(.context, .errors))]
    Aggregate {
        context: String,
        errors: Vec<IssuerError>,
    },
}

impl IssuerError {
    /// `Ok` for an empty list, otherwise an [`IssuerError::Aggregate`] under `context`
    ///
    /// # Errors
    ///
    /// Whenever `errors` is non-empty.
    pub fn aggregate(context: &str, errors: Vec<IssuerError>) -> Result<(), IssuerError> {
        if errors.is_empty() {
            return Ok(());
        }
        Err(IssuerError::Aggregate {
            context: context.to_string(),
            errors,
        })
    }

    /// Replace every occurrence of each secret (map key) with its marker (map value)
    #[must_use]
    pub fn redact(self, secrets: &HashMap<String, String>) -> Self {
        let r = |text: String| redact_text(text, secrets);
        match self {
            IssuerError::Configuration(m) => IssuerError::Configuration(r(m)),
            IssuerError::NotFound(m) => IssuerError::NotFound(r(m)),
            IssuerError::AlreadyExists(m) => IssuerError::AlreadyExists(r(m)),
            IssuerError::Transport {
                operation,
                status,
                body,
            } => IssuerError::Transport {
                operation: r(operation),
                status,
                body: r(body),
            },
            IssuerError::TemplateResolution(m) => IssuerError::TemplateResolution(r(m)),
            IssuerError::TemplateValidation(m) => IssuerError::TemplateValidation(r(m)),
            IssuerError::ProducerInitialization(m) => IssuerError::ProducerInitialization(r(m)),
            IssuerError::Statement(m) => IssuerError::Statement(r(m)),
            IssuerError::InvalidUsername(m) => IssuerError::InvalidUsername(r(m)),
            IssuerError::Aggregate { context, errors } => IssuerError::Aggregate {
                context: r(context),
                errors: errors.into_iter().map(|e| e.redact(secrets)).collect(),
            },
            e @ (IssuerError::NotInitialized | IssuerError::NoChanges) => e,
        }
    }
}

fn redact_text(mut text: String, secrets: &HashMap<String, String>) -> String {
    for (secret, marker) in secrets {
        if !secret.is_empty() && text.contains(secret.as_str()) {
            text = text.replace(secret.as_str(), marker);
        }
    }
    text
}

fn describe_transport(operation: &str, status: Option<u16>, body: &str) -> String {
    match status {
        Some(status) if body.is_empty() => format!("{operation}: status code {status}"),
        Some(status) => format!("{operation}: status code {status}, response: {body}"),
        None => format!("{operation}: {body}"),
    }
}

fn describe_aggregate(context: &str, errors: &[IssuerError]) -> String {
    let plural = if errors.len() == 1 { "" } else { "s" };
    let mut text = format!("{context}: {} error{plural} occurred:", errors.len());
    for error in errors {
        text.push_str("\n\t* ");
        text.push_str(&error.to_string());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_ok() {
        assert!(IssuerError::aggregate("unable to create user cleanly", Vec::new()).is_ok());
    }

    #[test]
    fn test_aggregate_display() {
        let err = IssuerError::aggregate(
            "unable to update user cleanly",
            vec![
                IssuerError::NotInitialized,
                IssuerError::Transport {
                    operation: "PATCH /api/v1/users/bob".to_string(),
                    status: Some(500),
                    body: "boom".to_string(),
                },
            ],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to update user cleanly: 2 errors occurred:\n\t* connection producer is not initialized\n\t* PATCH /api/v1/users/bob: status code 500, response: boom"
        );
    }

    #[test]
    fn test_redact_nested() {
        let secrets = HashMap::from([("s3cret".to_string(), "[password]".to_string())]);
        let err = IssuerError::Aggregate {
            context: "ctx".to_string(),
            errors: vec![IssuerError::Configuration("bad password s3cret".to_string())],
        }
        .redact(&secrets);
        let text = err.to_string();
        assert!(!text.contains("s3cret"));
        assert!(text.contains("bad password [password]"));
    }

    #[test]
    fn test_redact_ignores_empty_secret() {
        let secrets = HashMap::from([(String::new(), "[password]".to_string())]);
        let err = IssuerError::Statement("unchanged".to_string()).redact(&secrets);
        assert_eq!(err.to_string(), "invalid creation statement: unchanged");
    }
}
