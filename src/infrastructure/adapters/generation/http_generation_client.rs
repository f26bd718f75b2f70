//! HTTP Generation Client - 调用 OpenAI 兼容的文本生成服务
//!
//! 实现 GenerationEnginePort trait；推理深度映射到 reasoning_effort

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::application::ports::{
    GenerationEnginePort, GenerationError, GenerationRequest, GenerationResponse,
};
use crate::domain::segment_classifier::ReasoningDepth;
use crate::infrastructure::adapters::chat_completion::{
    classify_failure, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, HttpFailure,
};

/// HTTP Generation 客户端配置
#[derive(Debug, Clone)]
pub struct HttpGenerationClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for HttpGenerationClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: None,
            model: "text-model".to_string(),
            timeout_secs: 120,
            temperature: 0.7,
        }
    }
}

/// HTTP Generation 客户端
pub struct HttpGenerationClient {
    client: Client,
    config: HttpGenerationClientConfig,
}

impl HttpGenerationClient {
    pub fn new(config: HttpGenerationClientConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::NetworkError(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn reasoning_effort(depth: ReasoningDepth) -> Option<String> {
        match depth {
            ReasoningDepth::None => None,
            ReasoningDepth::Light => Some("low".to_string()),
            ReasoningDepth::Deep => Some("high".to_string()),
        }
    }
}

#[async_trait]
impl GenerationEnginePort for HttpGenerationClient {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(request.system.clone()),
                ChatMessage::user(request.prompt.clone()),
            ],
            temperature: self.config.temperature,
            response_format: None,
            reasoning_effort: Self::reasoning_effort(request.depth),
        };

        tracing::debug!(
            url = %self.completions_url(),
            depth = request.depth.as_str(),
            prompt_len = request.prompt.len(),
            "Sending generation request"
        );

        let mut builder = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match classify_failure(status, &error_text) {
                HttpFailure::RateLimited(m) => GenerationError::RateLimited(m),
                HttpFailure::ServerError(m) => GenerationError::ServiceUnavailable(m),
                HttpFailure::ContentPolicy(m) | HttpFailure::Client(m) => {
                    GenerationError::ServiceError(m)
                }
            });
        }

        let data = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::InvalidResponse("no choices".to_string()))?;

        Ok(GenerationResponse {
            text: choice.message.content.unwrap_or_default(),
            reasoning: choice.message.reasoning_content,
        })
    }
}
