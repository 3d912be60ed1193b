use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zade::integration::{AssistantConfig, Orchestrator};
use zade::speech::LineRecognizer;

const CONFIG_ENV: &str = "ZADE_CONFIG";

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zade=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Zade voice assistant");

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    let config = AssistantConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let mut orchestrator = Orchestrator::from_config(config, Box::new(LineRecognizer::stdin()))
        .context("Failed to initialize assistant")?;
    let pipeline = orchestrator.pipeline();

    println!("System Ready - Listening...");
    let end = orchestrator.run();

    pipeline.shutdown().context("Failed to stop speech pipeline")?;
    let stats = pipeline.stats();
    info!(
        "Spoke {} of {} utterances ({} synthesis failures, {} playback failures)",
        stats.played, stats.enqueued, stats.synthesis_failures, stats.playback_failures
    );

    end.context("Session failed")?;
    Ok(())
}
