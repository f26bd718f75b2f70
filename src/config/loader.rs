//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（illustra.toml / illustra.local.toml，或 --config 指定）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["illustra", "illustra.local"];

/// 加载应用配置
///
/// # 环境变量示例
/// - `ILLUSTRA_VISION__URL=http://vision:8000/v1`
/// - `ILLUSTRA_GENERATION__CONCURRENCY=16`
/// - `ILLUSTRA_CLASSIFIER__LOOKAHEAD_WINDOW=5`
/// - `ILLUSTRA_CACHE__STALENESS_DAYS=30`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("vision.concurrency", 2)?
        .set_default("vision.timeout_secs", 120)?
        .set_default("generation.concurrency", 8)?
        .set_default("generation.timeout_secs", 120)?
        .set_default("cache.dir", "data/visual_cache")?
        .set_default("cache.staleness_days", 90)?
        .set_default("classifier.lookahead_window", 3)?
        .set_default("orchestrator.chapter_timeout_secs", 900)?
        .set_default("translation.target_language", "English")?
        .set_default("storage.results_path", "data/results.sled")?
        .set_default("storage.output_dir", "output")?
        .set_default("database.path", "data/audit.db")?
        .set_default("database.max_connections", 5)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 前缀: ILLUSTRA_，层级分隔符: __
    builder = builder.add_source(
        Environment::with_prefix("ILLUSTRA")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let invalid = |msg: &str| -> Result<(), ConfigError> {
        Err(ConfigError::ValidationError(msg.to_string()))
    };

    if config.vision.url.is_empty() || config.vision.model.is_empty() {
        return invalid("Vision URL and model cannot be empty");
    }
    if config.generation.url.is_empty() || config.generation.model.is_empty() {
        return invalid("Generation URL and model cannot be empty");
    }
    if config.vision.concurrency == 0 || config.generation.concurrency == 0 {
        return invalid("Concurrency cannot be 0");
    }
    if config.cache.staleness_days == 0 {
        return invalid("Cache staleness ceiling cannot be 0 days");
    }
    if config.orchestrator.chapter_timeout_secs == 0 {
        return invalid("Chapter timeout cannot be 0");
    }
    if config
        .vision
        .instruction
        .as_deref()
        .is_some_and(|s| s.trim().is_empty())
    {
        return invalid("Vision instruction override cannot be blank");
    }
    if config.database.path.is_empty() {
        return invalid("Database path cannot be empty");
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Vision: {} ({})", config.vision.url, config.vision.model);
    tracing::info!(
        "Vision Concurrency: {}, Retries: {}",
        config.vision.concurrency,
        config.vision.retry.max_retries
    );
    tracing::info!("Generation: {} ({})", config.generation.url, config.generation.model);
    tracing::info!(
        "Generation Concurrency: {}, Retries: {}",
        config.generation.concurrency,
        config.generation.retry.max_retries
    );
    tracing::info!("Cache Directory: {:?}", config.cache.dir);
    tracing::info!("Cache Staleness: {} days", config.cache.staleness_days);
    tracing::info!("Lookahead Window: {}", config.classifier.lookahead_window);
    tracing::info!("Chapter Timeout: {}s", config.orchestrator.chapter_timeout_secs);
    tracing::info!("Target Language: {}", config.translation.target_language);
    tracing::info!("Results: {:?}", config.storage.results_path);
    tracing::info!("Audit Database: {}", config.database.path);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_concurrency() {
        let mut config = AppConfig::default();
        config.generation.concurrency = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_staleness() {
        let mut config = AppConfig::default();
        config.cache.staleness_days = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_vision_model() {
        let mut config = AppConfig::default();
        config.vision.model = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(
            &path,
            "[classifier]\nlookahead_window = 5\n\n[vision]\nmodel = \"vlm-2\"\n",
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert_eq!(config.classifier.lookahead_window, 5);
        assert_eq!(config.vision.model, "vlm-2");
        assert_eq!(config.generation.concurrency, 8);
    }
}
