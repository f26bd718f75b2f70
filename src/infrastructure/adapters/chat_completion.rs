//! OpenAI 兼容的 chat completions 报文
//!
//! 视觉层和生成层共用同一套请求/响应结构：
//! POST {base_url}/chat/completions

use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.into()),
        }
    }

    /// 文本 + 图片（base64 data URL）
    pub fn user_with_image(text: impl Into<String>, media_type: &str, image: &[u8]) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url(media_type, image),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            format_type: "json_object",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub refusal: Option<String>,
    #[serde(default, alias = "reasoning")]
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// 非 2xx 响应的分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HttpFailure {
    RateLimited(String),
    ServerError(String),
    /// 400 且错误码指向内容策略
    ContentPolicy(String),
    Client(String),
}

/// 按状态码和错误体分类失败
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> HttpFailure {
    let detail = serde_json::from_str::<ErrorBody>(body).ok().map(|b| b.error);
    let message = detail
        .as_ref()
        .map(|d| d.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());
    let summary = format!("HTTP {}: {}", status, message);

    if status == StatusCode::TOO_MANY_REQUESTS {
        return HttpFailure::RateLimited(summary);
    }
    if status.is_server_error() {
        return HttpFailure::ServerError(summary);
    }

    let policy = detail
        .as_ref()
        .map(|d| {
            [d.code.as_deref(), d.kind.as_deref()]
                .into_iter()
                .flatten()
                .any(is_policy_code)
        })
        .unwrap_or(false);
    if status == StatusCode::BAD_REQUEST && policy {
        return HttpFailure::ContentPolicy(summary);
    }

    HttpFailure::Client(summary)
}

fn is_policy_code(code: &str) -> bool {
    let code = code.to_lowercase();
    code.contains("content_policy") || code.contains("content_filter") || code.contains("safety")
}

/// image/png -> data:image/png;base64,...
pub(crate) fn data_url(media_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        media_type,
        general_purpose::STANDARD.encode(bytes)
    )
}

/// 去掉模型有时包裹在 JSON 外面的 ``` 代码块
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
