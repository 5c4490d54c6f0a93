use async_trait::async_trait;
use flowcore::{ExecutionError, ExecutorMetadata, TaskEnvelope, TaskExecutor, TaskResult, Value};
use std::collections::HashMap;

/// Longest slice of an error response body quoted in the error message
const ERROR_BODY_LIMIT: usize = 200;

/// HTTP request executor
///
/// Config: `url` (required), `method` (default GET), `headers` (object of
/// strings) and `body` (strings are sent as-is, anything else as JSON).
/// Non-2xx responses fail the node.
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskExecutor for HttpExecutor {
    fn node_type(&self) -> &str {
        "http"
    }

    async fn execute(&self, envelope: &TaskEnvelope) -> Result<TaskResult, ExecutionError> {
        let url = envelope.require_str("url")?;
        let method = envelope.str_or("method", "GET").to_uppercase();

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            other => {
                return Err(ExecutionError::InvalidConfig {
                    field: "method".to_string(),
                    expected: format!("one of GET, POST, PUT, PATCH, DELETE, got {}", other),
                })
            }
        };

        if let Some(Value::Object(headers)) = envelope.node_config.get("headers") {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key.as_str(), value);
                }
            }
        }

        match envelope.node_config.get("body") {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => request = request.body(text.clone()),
            Some(body) => request = request.json(&body.to_json()),
        }

        tracing::info!("{} {}", method, url);

        let response = request
            .send()
            .await
            .map_err(|e| ExecutionError::Failed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let headers: HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(v.to_str().unwrap_or(""))))
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| ExecutionError::Failed(format!("Failed to read response: {}", e)))?;

        tracing::debug!("Response status: {}", status);

        if !status.is_success() {
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(ExecutionError::Failed(format!(
                "HTTP {} from {}: {}",
                status.as_u16(),
                url,
                excerpt
            )));
        }

        Ok(TaskResult::success(body)
            .with_detail("statusCode", status.as_u16())
            .with_detail("headers", Value::Object(headers)))
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
        }
    }
}
