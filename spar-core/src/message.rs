// Request and reply model shared by the pipeline, the transports and the client facade

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Query parameters attached to a request
pub type Params = Map<String, Value>;

/// The four verbs a socket request can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Delete => "delete",
        }
    }

    /// GET and DELETE send their query parameters as the request data
    pub fn data_from_params(&self) -> bool {
        matches!(self, Method::Get | Method::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single outgoing request.
///
/// Built fresh for every call by the client facade and then handed through
/// the interceptor chain, which may rewrite any field before the transport
/// sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl RequestDescriptor {
    pub fn get(url: impl Into<String>, params: Option<Params>) -> Self {
        Self::from_params(Method::Get, url, params)
    }

    pub fn delete(url: impl Into<String>, params: Option<Params>) -> Self {
        Self::from_params(Method::Delete, url, params)
    }

    pub fn post(url: impl Into<String>, data: Value, params: Option<Params>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            data,
            params,
        }
    }

    pub fn put(url: impl Into<String>, data: Value, params: Option<Params>) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            data,
            params,
        }
    }

    fn from_params(method: Method, url: impl Into<String>, params: Option<Params>) -> Self {
        let data = Value::Object(params.clone().unwrap_or_default());
        Self {
            method,
            url: url.into(),
            data,
            params,
        }
    }
}

/// Opaque result payload delivered by a transport or the HTTP fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reply(Value);

impl Reply {
    pub fn new(body: Value) -> Self {
        Reply(body)
    }

    pub fn body(&self) -> &Value {
        &self.0
    }

    pub fn into_body(self) -> Value {
        self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The `errors` field, if present and truthy
    pub fn errors(&self) -> Option<&Value> {
        self.0.get("errors").filter(|errors| is_truthy(errors))
    }

    /// The numeric `status` field, if present
    pub fn status(&self) -> Option<u16> {
        status_of(&self.0)
    }

    /// True when the reply carries errors, or a truthy `status` that is not
    /// the number 200. Any JSON shape counts, not only `u16` codes.
    pub fn is_failure(&self) -> bool {
        let bad_status = self
            .0
            .get("status")
            .is_some_and(|status| is_truthy(status) && status.as_f64() != Some(200.0));
        self.errors().is_some() || bad_status
    }
}

impl From<Value> for Reply {
    fn from(body: Value) -> Self {
        Reply(body)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) fn status_of(value: &Value) -> Option<u16> {
    value
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|status| u16::try_from(status).ok())
}

/// Loose truthiness used for `errors` fields and correlation ids.
///
/// Null, `false`, zero and the empty string are falsy; arrays and objects
/// are always truthy, even when empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_uses_params_as_data() {
        let mut params = Params::new();
        params.insert("page".to_string(), json!(2));

        let request = RequestDescriptor::get("/orders", Some(params.clone()));
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.data, Value::Object(params));

        let bare = RequestDescriptor::delete("/orders/1", None);
        assert_eq!(bare.data, json!({}));
        assert!(bare.params.is_none());
    }

    #[test]
    fn test_post_keeps_explicit_data() {
        let request = RequestDescriptor::post("/orders", json!({"qty": 3}), None);
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.data, json!({"qty": 3}));
    }

    #[test]
    fn test_reply_failure_policy() {
        assert!(!Reply::new(json!({"status": 200})).is_failure());
        assert!(!Reply::new(json!({"name": "no status"})).is_failure());
        assert!(!Reply::new(json!({"status": 0})).is_failure());
        assert!(Reply::new(json!({"status": 500})).is_failure());
        assert!(Reply::new(json!({"errors": ["bad"], "status": 200})).is_failure());
        assert!(Reply::new(json!({"errors": []})).is_failure());
        assert!(!Reply::new(json!({"errors": null, "status": 200})).is_failure());
        assert!(!Reply::new(json!({"errors": false})).is_failure());
    }

    #[test]
    fn test_non_u16_statuses_still_reject() {
        assert!(Reply::new(json!({"status": 500.0})).is_failure());
        assert!(Reply::new(json!({"status": -1})).is_failure());
        assert!(Reply::new(json!({"status": 70000})).is_failure());
        assert!(Reply::new(json!({"status": "500"})).is_failure());
        assert!(Reply::new(json!({"status": "200"})).is_failure());
        assert!(!Reply::new(json!({"status": 200.0})).is_failure());
        assert!(!Reply::new(json!({"status": ""})).is_failure());
        assert!(!Reply::new(json!({"status": null})).is_failure());
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
        assert!(is_truthy(&json!(42)));
        assert!(is_truthy(&json!("abc")));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn test_method_serialization() {
        assert_eq!(serde_json::to_string(&Method::Delete).unwrap(), "\"delete\"");
        assert_eq!(Method::Put.to_string(), "put");
        assert!(Method::Get.data_from_params());
        assert!(!Method::Post.data_from_params());
    }
}
