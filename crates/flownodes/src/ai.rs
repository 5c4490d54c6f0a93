use async_trait::async_trait;
use flowcore::{ExecutionError, ExecutorMetadata, TaskEnvelope, TaskExecutor, TaskResult};
use serde::{Deserialize, Serialize};

const DEFAULT_PROMPT: &str = "default prompt";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Completion service the `ai` executor calls.
#[derive(Debug, Clone)]
pub struct AiEndpoint {
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct CompletionReply {
    output: String,
}

/// Generative model call.
///
/// Without an endpoint the executor answers with a canned completion, which
/// keeps workflows runnable offline.
pub struct AiExecutor {
    client: reqwest::Client,
    endpoint: Option<AiEndpoint>,
}

impl AiExecutor {
    pub fn new(client: reqwest::Client, endpoint: Option<AiEndpoint>) -> Self {
        Self { client, endpoint }
    }

    async fn complete(
        &self,
        endpoint: &AiEndpoint,
        request: &CompletionRequest<'_>,
    ) -> Result<String, ExecutionError> {
        let mut call = self.client.post(&endpoint.url).json(request);
        if let Some(key) = &endpoint.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|e| ExecutionError::Failed(format!("AI request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExecutionError::Failed(format!("Failed to read AI reply: {}", e)))?;

        if !status.is_success() {
            return Err(ExecutionError::Failed(format!(
                "AI endpoint returned {}",
                status.as_u16()
            )));
        }

        // Services that do not wrap their answer are taken verbatim.
        Ok(serde_json::from_str::<CompletionReply>(&body)
            .map(|reply| reply.output)
            .unwrap_or(body))
    }
}

#[async_trait]
impl TaskExecutor for AiExecutor {
    fn node_type(&self) -> &str {
        "ai"
    }

    async fn execute(&self, envelope: &TaskEnvelope) -> Result<TaskResult, ExecutionError> {
        let prompt = envelope.str_or("prompt", DEFAULT_PROMPT);
        let model = envelope.str_or("model", DEFAULT_MODEL);

        let output = match &self.endpoint {
            Some(endpoint) => {
                tracing::info!("Calling model {} at {}", model, endpoint.url);
                let request = CompletionRequest {
                    model,
                    prompt,
                    input: envelope.input_or_empty(),
                };
                self.complete(endpoint, &request).await?
            }
            None => {
                tracing::info!("No AI endpoint configured, simulating model {}", model);
                format!("AI result: {} (model: {})", prompt, model)
            }
        };

        Ok(TaskResult::success(output).with_detail("model", model))
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Call a generative model".to_string(),
            category: "ai".to_string(),
        }
    }
}
