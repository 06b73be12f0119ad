//! The fetch primitives the listing and tree engines are written against.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Query or form parameters, in the order they should be sent.
pub type Params = Vec<(String, String)>;

/// Asynchronous access to the remote API.
///
/// `RedditClient` is the production implementation; it gates every call
/// through its rate limiter and reports response headers back to it.
/// Tests drive the engines with scripted in-memory implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET against `path` with the given query parameters and
    /// decode the response body as JSON.
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value>;

    /// Issue a form-encoded POST against `path`. `body` must be a JSON
    /// object; each field becomes one form parameter.
    async fn post(&self, path: &str, body: &Value) -> Result<Value>;
}

/// Turn a JSON object into form parameters. Strings are sent verbatim,
/// nulls are skipped and everything else uses its JSON text.
pub fn form_params(body: &Value) -> Params {
    match body {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect(),
        _ => Vec::new(),
    }
}
