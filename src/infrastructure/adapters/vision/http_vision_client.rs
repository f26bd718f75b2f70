//! HTTP Vision Client - 调用 OpenAI 兼容的视觉模型服务
//!
//! 实现 VisionEnginePort trait
//!
//! POST {base_url}/chat/completions
//! Request: system + user(text, image_url=data:...;base64,...), response_format=json_object
//! Response: choices[0].message.content 为 VisualAnalysis JSON
//!
//! 安全拒绝的三种信号：message.refusal、finish_reason=content_filter、400 + 内容策略错误码

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::application::ports::{VisionEnginePort, VisionError, VisionRequest};
use crate::domain::analysis::VisualAnalysis;
use crate::infrastructure::adapters::chat_completion::{
    classify_failure, strip_code_fence, ChatCompletionRequest, ChatCompletionResponse,
    ChatMessage, HttpFailure, ResponseFormat,
};

const SYSTEM_PROMPT: &str = "You analyse illustrations from a novel for its translators. \
Answer with a single JSON object with the keys composition, emotional_delta, \
observed_details (object of name to description), directives (array of strings) \
and spoiler_prevention (array of facts that must not be revealed before the illustration).";

/// HTTP Vision 客户端配置
#[derive(Debug, Clone)]
pub struct HttpVisionClientConfig {
    /// 服务基础 URL（含 /v1）
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// 进入 CacheKey 的版本字符串，为空时使用 model
    pub model_version: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpVisionClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: None,
            model: "vision-model".to_string(),
            model_version: String::new(),
            timeout_secs: 120,
        }
    }
}

/// HTTP Vision 客户端
pub struct HttpVisionClient {
    client: Client,
    config: HttpVisionClientConfig,
}

impl HttpVisionClient {
    pub fn new(mut config: HttpVisionClientConfig) -> Result<Self, VisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VisionError::NetworkError(e.to_string()))?;

        if config.model_version.trim().is_empty() {
            config.model_version = config.model.clone();
        }
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// 解析响应；拒绝信号优先于内容
    fn parse_response(response: ChatCompletionResponse) -> Result<VisualAnalysis, VisionError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| VisionError::InvalidResponse("no choices".to_string()))?;

        if let Some(refusal) = choice.message.refusal.filter(|r| !r.trim().is_empty()) {
            return Err(VisionError::SafetyRefusal(refusal));
        }
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(VisionError::SafetyRefusal(
                "finish_reason=content_filter".to_string(),
            ));
        }

        let content = choice
            .message
            .content
            .ok_or_else(|| VisionError::InvalidResponse("empty content".to_string()))?;
        serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| VisionError::InvalidResponse(format!("analysis is not valid JSON: {}", e)))
    }
}

#[async_trait]
impl VisionEnginePort for HttpVisionClient {
    async fn analyze(&self, request: VisionRequest) -> Result<VisualAnalysis, VisionError> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user_with_image(
                    request.instruction.clone(),
                    &request.media_type,
                    &request.image,
                ),
            ],
            temperature: 0.2,
            response_format: Some(ResponseFormat::json_object()),
            reasoning_effort: None,
        };

        tracing::debug!(
            url = %self.completions_url(),
            asset_key = %request.asset_key,
            image_size = request.image.len(),
            "Sending vision analysis request"
        );

        let mut builder = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                VisionError::Timeout
            } else if e.is_connect() {
                VisionError::NetworkError(format!("Cannot connect to vision service: {}", e))
            } else {
                VisionError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match classify_failure(status, &error_text) {
                HttpFailure::RateLimited(m) => VisionError::RateLimited(m),
                HttpFailure::ServerError(m) => VisionError::ServiceUnavailable(m),
                HttpFailure::ContentPolicy(m) => VisionError::SafetyRefusal(m),
                HttpFailure::Client(m) => VisionError::ServiceError(m),
            });
        }

        let data = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| VisionError::InvalidResponse(e.to_string()))?;
        let analysis = Self::parse_response(data)?;

        tracing::info!(
            asset_key = %request.asset_key,
            directives = analysis.directives.len(),
            "Vision analysis completed"
        );
        Ok(analysis)
    }

    fn model_version(&self) -> &str {
        &self.config.model_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> ChatCompletionResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_model_version_defaults_to_model() {
        let client = HttpVisionClient::new(HttpVisionClientConfig {
            model: "vl-large".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.model_version(), "vl-large");
        assert_eq!(client.completions_url(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_parse_analysis() {
        let data = response(
            r#"{"choices":[{"finish_reason":"stop","message":{"content":"```json\n{\"composition\":\"wide shot\",\"directives\":[\"slow down\"]}\n```"}}]}"#,
        );
        let analysis = HttpVisionClient::parse_response(data).unwrap();
        assert_eq!(analysis.composition, "wide shot");
        assert_eq!(analysis.directives, vec!["slow down".to_string()]);
    }

    #[test]
    fn test_refusal_signals() {
        let refused = response(r#"{"choices":[{"message":{"content":null,"refusal":"I can't help with that."}}]}"#);
        assert!(matches!(
            HttpVisionClient::parse_response(refused),
            Err(VisionError::SafetyRefusal(_))
        ));

        let filtered = response(r#"{"choices":[{"finish_reason":"content_filter","message":{"content":""}}]}"#);
        assert!(matches!(
            HttpVisionClient::parse_response(filtered),
            Err(VisionError::SafetyRefusal(_))
        ));
    }

    #[test]
    fn test_invalid_json_is_not_transient() {
        let data = response(r#"{"choices":[{"message":{"content":"a lovely picture"}}]}"#);
        let err = HttpVisionClient::parse_response(data).unwrap_err();
        assert!(matches!(err, VisionError::InvalidResponse(_)));
        assert!(!err.is_transient());
    }
}
