use crate::message::{is_truthy, status_of, Reply};
use serde_json::Value;
use thiserror::Error;

/// Every way a request can settle in the rejected state
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SparError {
    /// The peer answered with `errors` or a non-200 `status`, or an
    /// interceptor rejected with a reply-shaped payload
    #[error("Request rejected: {0}")]
    Rejected(Reply),
    /// An interceptor rejected with an arbitrary payload
    #[error("Interceptor rejected request: {0}")]
    Interceptor(Value),
    /// The HTTP fallback received a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: Value },
    /// The HTTP fallback could not complete the exchange
    #[error("HTTP transport error: {0}")]
    HttpTransport(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unknown interceptor: {0}")]
    UnknownInterceptor(String),
    /// The task driving the request panicked or was cancelled by the runtime
    #[error("Request task aborted: {0}")]
    Aborted(String),
}

impl SparError {
    /// The `errors` payload carried by the rejection, if any
    pub fn errors(&self) -> Option<&Value> {
        match self {
            SparError::Rejected(reply) => reply.errors(),
            SparError::Interceptor(value) | SparError::Http { body: value, .. } => {
                value.get("errors").filter(|errors| is_truthy(errors))
            }
            _ => None,
        }
    }

    /// The status code carried by the rejection, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            SparError::Rejected(reply) => reply.status(),
            SparError::Interceptor(value) => status_of(value),
            SparError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn reply(&self) -> Option<&Reply> {
        match self {
            SparError::Rejected(reply) => Some(reply),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejected_unpacks_reply() {
        let err = SparError::Rejected(Reply::new(json!({"errors": ["bad"], "status": 422})));
        assert_eq!(err.errors(), Some(&json!(["bad"])));
        assert_eq!(err.status(), Some(422));
        assert!(err.reply().is_some());
    }

    #[test]
    fn test_interceptor_payload() {
        let err = SparError::Interceptor(json!({"status": 401}));
        assert_eq!(err.errors(), None);
        assert_eq!(err.status(), Some(401));

        let opaque = SparError::Interceptor(json!("denied"));
        assert_eq!(opaque.status(), None);
        assert!(opaque.to_string().contains("denied"));
    }

    #[test]
    fn test_http_status_is_always_present() {
        let err = SparError::Http {
            status: 404,
            body: json!({"errors": "missing"}),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.errors(), Some(&json!("missing")));
        assert_eq!(err.to_string(), "HTTP 404: {\"errors\":\"missing\"}");
    }

    #[test]
    fn test_plain_errors_carry_nothing() {
        let err = SparError::Transport("Connection closed".to_string());
        assert_eq!(err.errors(), None);
        assert_eq!(err.status(), None);
    }
}
