use clap::Parser;
use smoothllm::{telemetry, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = smoothllm::config::Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    // Initialize telemetry
    telemetry::init_telemetry()?;

    tracing::debug!("{:?}", args);

    // Run the application
    smoothllm::run(config).await
}
