mod cli;
mod output;
mod scenarios;

use clap::Parser;
use cli::{Cli, Commands};
use kanban_core::AppConfig;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match AppConfig::load_from(path) {
            Ok(config) => config,
            Err(e) => output::output_error(&format!(
                "Failed to load config {}: {}",
                path.display(),
                e
            )),
        },
        None => AppConfig::load(),
    };

    if let Ok(log_path) = std::env::var("KANBAN_DEBUG_LOG") {
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .init();
    } else {
        kanban_core::init_tracing(config.effective_log_filter());
    }

    match cli.command {
        Commands::Run { scenario } => {
            let latency = Duration::from_millis(cli.latency_ms);
            match scenarios::run(scenario, &config, latency).await {
                Ok(report) => output::output_success(report)?,
                Err(e) => output::output_error(&format!("{:#}", e)),
            }
        }
        Commands::List => output::output_list(scenarios::catalogue())?,
        Commands::Config => output::output_success(&config)?,
    }

    Ok(())
}
