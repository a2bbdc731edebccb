use clap::Parser;
use common::logger::init_logger;
use monitor::AppConfig;
use monitor::cli::{Cli, Command, execute};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = AppConfig::from_env()?;
    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }

    let _log_guard = init_logger("market-monitor", cfg.production, cfg.log_dir.as_deref());

    tracing::info!(database = %cfg.database_url, "starting market monitor");

    execute(cli.command.unwrap_or(Command::Run), &cfg).await
}
