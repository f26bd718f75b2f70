//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 视觉层配置
    #[serde(default)]
    pub vision: VisionConfig,

    /// 生成层配置
    #[serde(default)]
    pub generation: GenerationConfig,

    /// 视觉缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 片段分类配置
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// 编排器配置
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// 翻译配置
    #[serde(default)]
    pub translation: TranslationConfig,

    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 重试配置（指数退避）
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// 视觉层配置
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    /// OpenAI 兼容服务的基础 URL
    #[serde(default = "default_service_url")]
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_vision_model")]
    pub model: String,

    /// 写入 CacheKey 的模型版本；为空时使用 model
    #[serde(default)]
    pub model_version: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// 视觉层并发上限
    #[serde(default = "default_vision_concurrency")]
    pub concurrency: usize,

    /// 覆盖默认分析指令（修改会使全部缓存失效）
    #[serde(default)]
    pub instruction: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_service_url() -> String {
    "http://localhost:8000/v1".to_string()
}

fn default_vision_model() -> String {
    "vision-large".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_vision_concurrency() -> usize {
    2
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            api_key: None,
            model: default_vision_model(),
            model_version: String::new(),
            timeout_secs: default_timeout(),
            concurrency: default_vision_concurrency(),
            instruction: None,
            retry: RetryConfig::default(),
        }
    }
}

/// 生成层配置
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_service_url")]
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// STANDARD 片段并发上限
    #[serde(default = "default_generation_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_generation_retry")]
    pub retry: RetryConfig,
}

fn default_generation_model() -> String {
    "text-fast".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_generation_concurrency() -> usize {
    8
}

fn default_generation_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        ..RetryConfig::default()
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            api_key: None,
            model: default_generation_model(),
            timeout_secs: default_timeout(),
            temperature: default_temperature(),
            concurrency: default_generation_concurrency(),
            retry: default_generation_retry(),
        }
    }
}

/// 视觉缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 缓存文件目录（每卷一个 JSON 文件）
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// 陈旧上限（天）
    #[serde(default = "default_staleness_days")]
    pub staleness_days: u32,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/visual_cache")
}

fn default_staleness_days() -> u32 {
    90
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            staleness_days: default_staleness_days(),
        }
    }
}

/// 片段分类配置
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// 前瞻窗口（含当前片段）
    #[serde(default = "default_lookahead_window")]
    pub lookahead_window: usize,

    /// 单个片段最大字符数（0 表示不限制）
    #[serde(default = "default_max_segment_chars")]
    pub max_segment_chars: usize,
}

fn default_lookahead_window() -> usize {
    3
}

fn default_max_segment_chars() -> usize {
    2000
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            lookahead_window: default_lookahead_window(),
            max_segment_chars: default_max_segment_chars(),
        }
    }
}

/// 编排器配置
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    /// 单章超时（秒）
    #[serde(default = "default_chapter_timeout")]
    pub chapter_timeout_secs: u64,
}

fn default_chapter_timeout() -> u64 {
    900
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            chapter_timeout_secs: default_chapter_timeout(),
        }
    }
}

/// 翻译配置
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

fn default_target_language() -> String {
    "English".to_string()
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            target_language: default_target_language(),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 翻译结果 sled 库路径
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,

    /// 默认输出目录
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_results_path() -> PathBuf {
    PathBuf::from("data/results.sled")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_path: default_results_path(),
            output_dir: default_output_dir(),
        }
    }
}

/// 数据库配置（审计日志）
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/audit.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
