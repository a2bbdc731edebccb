use std::sync::Arc;

use alerting::{AlertDecision, AlertDispatcher, Direction};
use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use storage::{Db, InstrumentRegistry};
use tracing::info;

use crate::config::AppConfig;
use crate::poller::run_polling_loop;
use crate::scanner::{CycleReport, MarketScanner};
use crate::wiring::{build_channel, build_source_registry};

#[derive(Debug, Parser)]
#[command(name = "market-monitor", version, about = "Market volatility monitor")]
pub struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Poll every configured interval until Ctrl-C (default)
    Run,
    /// Run a single scan cycle
    Once,
    /// Fetch and evaluate one instrument
    Fetch {
        /// Instrument code, e.g. BTCUSDT
        code: String,
    },
    /// Re-evaluate stored prices without fetching
    Scan,
    /// Create the schema and seed default instruments
    InitDb,
    /// List registered instruments
    Instruments,
    /// Send a sample alert through the configured channel
    TestAlert,
}

pub async fn execute(command: Command, cfg: &AppConfig) -> anyhow::Result<()> {
    match command {
        Command::TestAlert => send_test_alert(cfg).await,
        Command::InitDb => {
            let db = open_db(cfg).await?;
            let inserted = db.seed_defaults().await?;
            println!("database ready at {} ({inserted} instruments added)", cfg.database_url);
            db.close().await;
            Ok(())
        }
        Command::Instruments => {
            let db = open_db(cfg).await?;
            print_instruments(&db).await?;
            db.close().await;
            Ok(())
        }
        Command::Run | Command::Once | Command::Fetch { .. } | Command::Scan => {
            let db = open_db(cfg).await?;
            db.seed_defaults().await?;
            let scanner = build_scanner(&db, cfg)?;

            let result = run_scan_command(&scanner, command, cfg).await;
            db.close().await;
            result
        }
    }
}

async fn run_scan_command(
    scanner: &MarketScanner,
    command: Command,
    cfg: &AppConfig,
) -> anyhow::Result<()> {
    let report = match command {
        Command::Once => scanner.run_cycle(Utc::now()).await?,
        Command::Fetch { code } => scanner.fetch_single(&code.to_uppercase(), Utc::now()).await?,
        Command::Scan => scanner.scan_stored(Utc::now()).await?,
        _ => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = ?e, "failed to listen for ctrl-c");
                }
            };
            let cycles = run_polling_loop(scanner, cfg.poll_interval, shutdown).await;
            info!(cycles, "poller stopped");
            return Ok(());
        }
    };

    print_report(&report);
    Ok(())
}

async fn open_db(cfg: &AppConfig) -> anyhow::Result<Db> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await.context("migration failed")?;
    Ok(db)
}

fn build_scanner(db: &Db, cfg: &AppConfig) -> anyhow::Result<MarketScanner> {
    let sources = build_source_registry(cfg)?;
    let dispatcher = AlertDispatcher::new(build_channel(cfg)?);

    Ok(MarketScanner::with_store(Arc::new(db.store()), sources, dispatcher))
}

async fn print_instruments(db: &Db) -> anyhow::Result<()> {
    let instruments = db.store().all_instruments().await?;

    println!("{:<10} {:<10} {:<11} {:>9}  {:<6} name", "code", "source", "category", "threshold", "active");
    for i in instruments {
        let threshold = i
            .alert_threshold
            .map_or_else(|| "unset".to_string(), |t| format!("{:.2}%", t * 100.0));
        println!(
            "{:<10} {:<10} {:<11} {:>9}  {:<6} {}",
            i.code,
            i.source,
            i.category.to_string(),
            threshold,
            i.active,
            i.name
        );
    }

    Ok(())
}

async fn send_test_alert(cfg: &AppConfig) -> anyhow::Result<()> {
    let dispatcher = AlertDispatcher::new(build_channel(cfg)?);

    let sample = |code: &str, c5: f64, c30: f64, c2h: f64| AlertDecision {
        instrument_id: 0,
        code: code.to_string(),
        name: code.to_string(),
        threshold: 0.01,
        change_5m: c5,
        change_30m: c30,
        change_2h: c2h,
        triggered_5m: true,
        triggered_30m: false,
        triggered_2h: false,
        direction: Direction::of_change(c5),
    };

    let batch = [
        sample("BTCUSDT", 0.023, 0.051, 0.085),
        sample("SPY", -0.012, -0.008, -0.015),
    ];

    dispatcher.dispatch(&batch, Utc::now()).await?;
    println!("test alert sent via {}", dispatcher.channel_name());
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!(
        "instruments: {} | ok: {} | failed: {} | skipped: {} | alerts: {} | delivered: {}",
        report.total, report.succeeded, report.failed, report.skipped, report.alerts, report.delivered
    );
    for e in &report.errors {
        println!("  ! {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::parse_from(["market-monitor"]);
        assert!(cli.command.is_none());
        assert!(cli.database_url.is_none());
    }

    #[test]
    fn fetch_takes_a_code_and_global_flag_anywhere() {
        let cli = Cli::parse_from([
            "market-monitor",
            "fetch",
            "BTCUSDT",
            "--database-url",
            "sqlite::memory:",
        ]);

        assert_eq!(cli.command, Some(Command::Fetch { code: "BTCUSDT".into() }));
        assert_eq!(cli.database_url.as_deref(), Some("sqlite::memory:"));
    }

    #[test]
    fn kebab_case_subcommands() {
        let cli = Cli::parse_from(["market-monitor", "init-db"]);
        assert_eq!(cli.command, Some(Command::InitDb));

        let cli = Cli::parse_from(["market-monitor", "test-alert"]);
        assert_eq!(cli.command, Some(Command::TestAlert));
    }
}
