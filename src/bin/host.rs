//! Headless search host for stdin/stdout JSON communication.
//!
//! Reads `CommandEnvelope` messages as newline-delimited JSON from stdin and
//! writes `ResponseEnvelope` and `EventEnvelope` messages to stdout. The
//! config file is `config.toml` in the config directory
//! (`HUBCOMPLETE_CONFIG_DIR` overrides it); `GITHUB_TOKEN` supplies the
//! credential.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use hubcomplete::AppConfig;
use hubcomplete::host::stdio::run_stdio_bridge;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = AppConfig::default_config_path();
    let mut config = AppConfig::load_or_default(&config_path)?;
    config.apply_env();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .init();

    tracing::info!(config = %config_path.display(), "hubcomplete-host starting");

    let orchestrator = hubcomplete::initialize(&config)?;

    run_stdio_bridge(orchestrator).await.map_err(|e| {
        tracing::error!(error = %e, "hubcomplete-host exited with error");
        anyhow::anyhow!("hubcomplete-host failed: {e}")
    })?;

    tracing::info!("hubcomplete-host shut down cleanly");
    Ok(())
}
