//! Illustra - 插图长篇文档的双层翻译系统
//!
//! 子命令:
//! - precompute: 为整卷插图预计算视觉分析（幂等）
//! - translate: 翻译整卷，插图缺少缓存分析时直接失败
//! - status: 缓存与翻译进度摘要

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use illustra::application::{
    DualTierOrchestrator, GetVolumeStatus, GetVolumeStatusHandler, LeakGuard, OrchestratorConfig,
    PrecomputeConfig, PrecomputeVisualCache, PrecomputeVisualCacheHandler, PromptBuilder,
    RetryPolicy, SafetyGuard, TranslateVolume, TranslateVolumeHandler, ANALYSIS_INSTRUCTION,
};
use illustra::application::ports::{GenerationEnginePort, VisionEnginePort};
use illustra::config::{load_config_from_path, print_config, AppConfig, RetryConfig};
use illustra::domain::analysis::InvalidationPolicy;
use illustra::domain::SegmentConfig;
use illustra::infrastructure::adapters::{
    FakeGenerationClient, FakeGenerationClientConfig, FakeVisionClient, FileVolumeStorage,
    HttpGenerationClient, HttpGenerationClientConfig, HttpVisionClient, HttpVisionClientConfig,
};
use illustra::infrastructure::persistence::sled::SledTranslationStore;
use illustra::infrastructure::persistence::sqlite::{create_pool, run_migrations, DatabaseConfig};
use illustra::infrastructure::{JsonVisualCacheFactory, SqliteAuditLog};

/// Illustra - translate illustrated volumes with a cached vision tier and a fast text tier.
#[derive(Parser)]
#[command(name = "illustra", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to ./illustra.toml and ./illustra.local.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use deterministic fake model clients instead of the configured services.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute or reuse the visual analysis of every illustration in a volume.
    ///
    /// Idempotent: a second run on an unchanged volume makes no vision calls.
    Precompute {
        /// Volume directory containing volume.toml.
        volume_dir: PathBuf,
    },

    /// Translate a volume. Fails when a referenced illustration has no cached analysis.
    Translate {
        /// Volume directory containing volume.toml.
        volume_dir: PathBuf,

        /// Output directory (defaults to storage.output_dir).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Keep stored results that are still valid and re-run the rest.
        #[arg(long)]
        only_failed: bool,

        /// Only translate this chapter (numbered from 1).
        #[arg(long)]
        chapter: Option<usize>,
    },

    /// Show cache and translation status of a volume.
    Status {
        /// Volume directory containing volume.toml.
        volume_dir: PathBuf,

        /// Include the per-segment audit trail of this chapter (numbered from 1).
        #[arg(long)]
        chapter: Option<usize>,
    },
}

fn retry_policy(config: &RetryConfig) -> RetryPolicy {
    RetryPolicy::new(config.max_retries, config.initial_delay_ms, config.max_delay_ms)
}

fn init_tracing(config: &AppConfig) {
    let log_filter = format!("{},illustra={}", config.log.level, config.log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn vision_engine(config: &AppConfig, offline: bool) -> anyhow::Result<Arc<dyn VisionEnginePort>> {
    if offline {
        return Ok(Arc::new(FakeVisionClient::with_defaults()));
    }
    let client = HttpVisionClient::new(HttpVisionClientConfig {
        base_url: config.vision.url.clone(),
        api_key: config.vision.api_key.clone(),
        model: config.vision.model.clone(),
        model_version: config.vision.model_version.clone(),
        timeout_secs: config.vision.timeout_secs,
    })?;
    Ok(Arc::new(client))
}

fn generation_engine(
    config: &AppConfig,
    offline: bool,
) -> anyhow::Result<Arc<dyn GenerationEnginePort>> {
    if offline {
        return Ok(Arc::new(FakeGenerationClient::new(FakeGenerationClientConfig {
            with_reasoning: true,
            ..Default::default()
        })));
    }
    let client = HttpGenerationClient::new(HttpGenerationClientConfig {
        base_url: config.generation.url.clone(),
        api_key: config.generation.api_key.clone(),
        model: config.generation.model.clone(),
        timeout_secs: config.generation.timeout_secs,
        temperature: config.generation.temperature,
    })?;
    Ok(Arc::new(client))
}

async fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn open_audit_log(config: &AppConfig) -> anyhow::Result<Arc<SqliteAuditLog>> {
    ensure_parent(Path::new(&config.database.path)).await?;
    let pool = create_pool(&DatabaseConfig {
        database_url: config.database.database_url(),
        max_connections: config.database.max_connections,
    })
    .await?;
    run_migrations(&pool).await?;
    Ok(Arc::new(SqliteAuditLog::new(pool)))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config_from_path(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);
    print_config(&config);
    if cli.offline {
        tracing::warn!("Offline mode: using fake vision and generation clients");
    }

    let volume_source = Arc::new(FileVolumeStorage::new(SegmentConfig {
        max_chars: config.classifier.max_segment_chars,
    }));
    let cache_factory = Arc::new(JsonVisualCacheFactory::new(
        config.cache.dir.clone(),
        InvalidationPolicy::with_staleness_days(config.cache.staleness_days),
    ));
    let instruction = config
        .vision
        .instruction
        .clone()
        .unwrap_or_else(|| ANALYSIS_INSTRUCTION.to_string());

    // Ctrl-C 取消进行中的章节
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            signal_token.cancel();
        }
    });

    match cli.command {
        Commands::Precompute { volume_dir } => {
            let guard = Arc::new(SafetyGuard::new(
                vision_engine(&config, cli.offline)?,
                retry_policy(&config.vision.retry),
            ));
            let handler = PrecomputeVisualCacheHandler::new(
                volume_source,
                cache_factory,
                guard,
                PrecomputeConfig {
                    instruction,
                    concurrency: config.vision.concurrency,
                },
            );
            let report = handler.handle(PrecomputeVisualCache { volume_dir }).await?;
            print_json(&report)?;
            if !report.failed.is_empty() {
                tracing::warn!(failed = report.failed.len(), "Some illustrations could not be analysed");
            }
        }

        Commands::Translate {
            volume_dir,
            output,
            only_failed,
            chapter,
        } => {
            ensure_parent(&config.storage.results_path).await?;
            let audit = open_audit_log(&config).await?;
            let store = Arc::new(SledTranslationStore::open(&config.storage.results_path)?);

            let guard = Arc::new(LeakGuard::new(
                generation_engine(&config, cli.offline)?,
                retry_policy(&config.generation.retry),
            ));
            let orchestrator = Arc::new(DualTierOrchestrator::new(
                guard,
                audit,
                PromptBuilder::new(&config.translation.target_language),
                OrchestratorConfig {
                    concurrency: config.generation.concurrency,
                    chapter_timeout: Duration::from_secs(config.orchestrator.chapter_timeout_secs),
                },
            ));
            let handler = TranslateVolumeHandler::new(
                volume_source,
                cache_factory,
                store,
                orchestrator,
                config.classifier.lookahead_window,
            );

            let report = handler
                .handle(
                    TranslateVolume {
                        volume_dir,
                        output_dir: output.unwrap_or_else(|| config.storage.output_dir.clone()),
                        only_failed,
                        chapter,
                    },
                    &shutdown,
                )
                .await?;
            print_json(&report)?;
            if !report.is_complete() {
                tracing::warn!(
                    failed = report.failed_segments.len(),
                    "Translation incomplete; re-run with --only-failed"
                );
            }
        }

        Commands::Status {
            volume_dir,
            chapter,
        } => {
            ensure_parent(&config.storage.results_path).await?;
            let store = Arc::new(SledTranslationStore::open(&config.storage.results_path)?);
            let audit = open_audit_log(&config).await?;
            let model_version = vision_engine(&config, cli.offline)?.model_version().to_string();
            let handler = GetVolumeStatusHandler::new(
                volume_source,
                cache_factory,
                store,
                audit,
                &instruction,
                model_version,
            );
            let status = handler
                .handle(GetVolumeStatus {
                    volume_dir,
                    chapter,
                })
                .await?;
            print_json(&status)?;
        }
    }

    Ok(())
}
