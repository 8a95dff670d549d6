//! Postvid worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use postvid_media::{
    CommandRenderer, FfmpegEditor, HttpSpeechClient, HttpTranslator, LocalMediaStorage,
    MediaStorage, R2Config, R2MediaStorage, RenderConfig, StorageConfig, TranslateConfig,
    Translator, YtDlpFetcher,
};
use postvid_queue::{QueueConfig, RedisJobQueue, RedisProgressChannel};
use postvid_store::{RedisJobStore, StoreConfig};
use postvid_worker::{Collaborators, JobExecutor, RenderPipeline, WorkerConfig};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("postvid=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn build_collaborators() -> anyhow::Result<Collaborators> {
    let speech = HttpSpeechClient::from_env().context("speech client")?;

    let translator: Option<Arc<dyn Translator>> = match TranslateConfig::from_env() {
        Some(config) => Some(Arc::new(
            HttpTranslator::new(config).context("translation client")?,
        )),
        None => {
            warn!("TRANSLATE_SERVICE_URL not set, non-English jobs are narrated untranslated");
            None
        }
    };

    let storage: Arc<dyn MediaStorage> = match R2Config::from_env() {
        Some(r2) => {
            info!("Storing outputs in R2 bucket {}", r2.bucket_name);
            Arc::new(R2MediaStorage::new(r2, StorageConfig::from_env()))
        }
        None => Arc::new(LocalMediaStorage::new(StorageConfig::from_env())),
    };

    if let Err(e) = postvid_media::check_ffmpeg() {
        warn!("{}; probing and trimming will fail", e);
    }
    if let Err(e) = postvid_media::check_ytdlp() {
        warn!("{}; remote sources will fail", e);
    }

    Ok(Collaborators {
        speech: Arc::new(speech),
        translator,
        fetcher: Arc::new(YtDlpFetcher::from_env()),
        renderer: Arc::new(CommandRenderer::new(RenderConfig::from_env()).context("renderer")?),
        editor: Arc::new(FfmpegEditor::new()),
        storage,
    })
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    let store_config = StoreConfig::from_env();
    info!("Worker config: {:?}", config);
    config
        .validate(store_config.lease_ttl)
        .context("invalid worker configuration")?;

    if let Some(addr) = std::env::var("METRICS_ADDR").ok().and_then(|a| a.parse().ok()) {
        postvid_worker::metrics::init_metrics(addr).context("metrics exporter")?;
        info!("Serving metrics on {}", addr);
    }

    let queue_config = QueueConfig::from_env();
    let store = Arc::new(RedisJobStore::new(&store_config).context("job store")?);
    let queue = Arc::new(RedisJobQueue::new(queue_config.clone()).context("job queue")?);
    let progress = Arc::new(RedisProgressChannel::new(&queue_config).context("progress channel")?);

    let pipeline = RenderPipeline::new(config.clone(), build_collaborators()?, progress.clone());
    let executor = Arc::new(JobExecutor::new(config, store, queue, progress, pipeline));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    executor.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting postvid-worker");

    if let Err(e) = run().await {
        error!("Worker error: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
