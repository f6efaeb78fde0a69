use serde::{Deserialize, Serialize};

/// Prefix prepended to forwarded event names unless configured otherwise
pub const DEFAULT_PREFIX: &str = "spar:";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prepended to every forwarded event name
    pub prefix: String,
    /// Socket server to connect to when no transport is supplied
    pub socket_url: Option<String>,
    /// Base URL the HTTP fallback resolves relative request URLs against
    pub fallback_base_url: Option<String>,
    /// HTTP fallback timeout in milliseconds
    pub fallback_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            socket_url: None,
            fallback_base_url: None,
            fallback_timeout_ms: 30000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.prefix, "spar:");
        assert_eq!(config.fallback_timeout_ms, 30000);
        assert!(config.socket_url.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"prefix": "app:", "fallback_base_url": "http://localhost:1337"}"#)
                .unwrap();
        assert_eq!(config.prefix, "app:");
        assert_eq!(config.fallback_base_url.as_deref(), Some("http://localhost:1337"));
        assert_eq!(config.fallback_timeout_ms, 30000);
    }
}
