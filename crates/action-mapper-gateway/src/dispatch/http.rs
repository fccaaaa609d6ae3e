//! Dispatcher backed by reqwest.
//!
//! Handles redirects and timeouts, retries idempotent requests on 5xx and
//! connection errors with exponential backoff, and honours `retry-after` on 429.

use std::time::Duration;

use action_mapper::{RequestDescriptor, ResponseEnvelope};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{Map, Value};

use super::HttpDispatch;
use crate::config::GatewayConfig;
use crate::types::{GatewayError, GatewayResult};

/// Longest wait honoured from a `retry-after` header.
const MAX_RETRY_AFTER_SECS: u64 = 10;

#[derive(Clone)]
pub struct ReqwestDispatcher {
    client: reqwest::Client,
    max_retries: u32,
}

impl ReqwestDispatcher {
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    fn build(&self, method: &Method, request: &RequestDescriptor) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method.clone(), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        match &request.body {
            None => builder,
            Some(Value::String(text)) => builder.body(text.clone()),
            Some(body) => builder.json(body),
        }
    }
}

#[async_trait]
impl HttpDispatch for ReqwestDispatcher {
    async fn send(&self, request: &RequestDescriptor) -> GatewayResult<ResponseEnvelope> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| GatewayError::InvalidParams(format!("bad method `{}`", request.method)))?;
        let max_retries = if method.is_idempotent() {
            self.max_retries
        } else {
            0
        };
        let mut retries = 0u32;

        loop {
            match self.build(&method, request).send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status >= 500 && retries < max_retries {
                        retries += 1;
                        tracing::debug!(status, retries, url = %request.url, "retrying upstream");
                        tokio::time::sleep(backoff(retries)).await;
                        continue;
                    }

                    if status == 429 && retries < max_retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        let delay = Duration::from_secs(retry_after.min(MAX_RETRY_AFTER_SECS));
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let headers = header_map(r.headers());
                    let content_type = r
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let text = r.text().await?;

                    return Ok(ResponseEnvelope::new(
                        status,
                        headers,
                        parse_body(content_type.as_deref(), text),
                    ));
                }
                Err(e) => {
                    if retries < max_retries && (e.is_connect() || e.is_timeout()) {
                        retries += 1;
                        tokio::time::sleep(backoff(retries)).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

fn backoff(retries: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(retries - 1))
}

/// Lowercased header map; repeated headers are joined with `, `.
fn header_map(headers: &HeaderMap) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        let key = name.as_str().to_ascii_lowercase();
        match out.get_mut(&key) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                out.insert(key, Value::String(value));
            }
        }
    }
    out
}

/// JSON bodies become trees, everything else stays a string. Empty bodies are null.
fn parse_body(content_type: Option<&str>, text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    let is_json = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    if is_json {
        if let Ok(tree) = serde_json::from_str(&text) {
            return tree;
        }
        tracing::debug!("upstream declared JSON but body did not parse");
    }
    Value::String(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(
            parse_body(Some("application/json; charset=utf-8"), r#"{"a":1}"#.into()),
            json!({"a": 1})
        );
        assert_eq!(
            parse_body(Some("application/ld+json"), "[1,2]".into()),
            json!([1, 2])
        );
        assert_eq!(parse_body(Some("text/plain"), "{\"a\":1}".into()), json!("{\"a\":1}"));
        assert_eq!(parse_body(Some("application/json"), "oops".into()), json!("oops"));
        assert_eq!(parse_body(None, "  ".into()), Value::Null);
    }

    #[test]
    fn test_header_map_joins_repeats() {
        let mut headers = HeaderMap::new();
        headers.append("X-Trace", HeaderValue::from_static("a"));
        headers.append("x-trace", HeaderValue::from_static("b"));
        headers.insert("Content-Type", HeaderValue::from_static("text/plain"));

        let map = header_map(&headers);
        assert_eq!(map["x-trace"], "a, b");
        assert_eq!(map["content-type"], "text/plain");
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_millis(1000));
        assert_eq!(backoff(3), Duration::from_millis(2000));
    }
}
