// Conventional HTTP client used while the socket is unavailable

use crate::config::ClientConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Url};
use serde_json::{json, Value};
use spar_core::{Method, Params, Reply, ReplyResult, SparError};
use std::time::Duration;
use tracing::{debug, trace};

/// The request/response client the executor falls back to.
///
/// Its results are returned to the caller as-is; they never pass through
/// the socket client's interceptor chain.
#[async_trait]
pub trait HttpFallback: Send + Sync {
    async fn request(
        &self,
        method: Method,
        url: &str,
        data: Option<Value>,
        params: Option<Params>,
    ) -> ReplyResult;

    async fn get(&self, url: &str, params: Option<Params>) -> ReplyResult {
        self.request(Method::Get, url, None, params).await
    }

    async fn post(&self, url: &str, data: Value, params: Option<Params>) -> ReplyResult {
        self.request(Method::Post, url, Some(data), params).await
    }

    async fn put(&self, url: &str, data: Value, params: Option<Params>) -> ReplyResult {
        self.request(Method::Put, url, Some(data), params).await
    }

    async fn delete(&self, url: &str, params: Option<Params>) -> ReplyResult {
        self.request(Method::Delete, url, None, params).await
    }
}

/// [`HttpFallback`] backed by reqwest.
///
/// Fulfils with `{"data": <body>, "status": <code>}` on a 2xx response and
/// rejects with [`SparError::Http`] otherwise.
#[derive(Debug, Clone)]
pub struct ReqwestFallback {
    http_client: HttpClient,
    base_url: Option<Url>,
}

impl ReqwestFallback {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_millis(config.fallback_timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = config
            .fallback_base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .context("Invalid fallback base URL")?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn resolve(&self, url: &str) -> Result<Url, SparError> {
        let resolved = match &self.base_url {
            Some(base) => base.join(url),
            None => Url::parse(url),
        };
        resolved.map_err(|e| SparError::HttpTransport(format!("Invalid URL '{}': {}", url, e)))
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Flatten params into query pairs; strings are sent without JSON quoting
fn query_pairs(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

#[async_trait]
impl HttpFallback for ReqwestFallback {
    async fn request(
        &self,
        method: Method,
        url: &str,
        data: Option<Value>,
        params: Option<Params>,
    ) -> ReplyResult {
        let target = self.resolve(url)?;
        debug!("HTTP fallback {} {}", method, target);

        let mut request = self.http_client.request(http_method(method), target);
        if let Some(params) = &params {
            request = request.query(&query_pairs(params));
        }
        if let Some(data) = &data {
            request = request.json(data);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SparError::HttpTransport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SparError::HttpTransport(e.to_string()))?;
        trace!("HTTP fallback response {}: {}", status, text);

        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if status.is_success() {
            Ok(Reply::new(json!({"data": body, "status": status.as_u16()})))
        } else {
            Err(SparError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn fallback_for(server: &mockito::ServerGuard) -> ReqwestFallback {
        let config = ClientConfig {
            fallback_base_url: Some(server.url()),
            ..Default::default()
        };
        ReqwestFallback::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_sends_params_as_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/orders")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "2".into()),
                Matcher::UrlEncoded("state".into(), "open".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"id": 1}]"#)
            .create_async()
            .await;

        let mut params = Params::new();
        params.insert("page".to_string(), json!(2));
        params.insert("state".to_string(), json!("open"));

        let reply = fallback_for(&server).get("/orders", Some(params)).await.unwrap();
        assert_eq!(reply.status(), Some(200));
        assert_eq!(reply.get("data"), Some(&json!([{"id": 1}])));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders")
            .match_body(Matcher::Json(json!({"qty": 3})))
            .with_status(201)
            .with_body(r#"{"id": 9}"#)
            .create_async()
            .await;

        let reply = fallback_for(&server)
            .post("/orders", json!({"qty": 3}), None)
            .await
            .unwrap();
        assert_eq!(reply.status(), Some(201));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_rejects() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/orders/1")
            .with_status(404)
            .with_body(r#"{"errors": ["not found"]}"#)
            .create_async()
            .await;

        let err = fallback_for(&server).delete("/orders/1", None).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.errors(), Some(&json!(["not found"])));
    }

    #[test]
    fn test_invalid_base_url_fails_construction() {
        let config = ClientConfig {
            fallback_base_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(ReqwestFallback::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_relative_url_without_base_rejects() {
        let fallback = ReqwestFallback::new(&ClientConfig::default()).unwrap();
        let err = fallback.get("/orders", None).await.unwrap_err();
        assert!(matches!(err, SparError::HttpTransport(_)));
    }
}
