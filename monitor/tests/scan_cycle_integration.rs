use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing_test::traced_test;

use alerting::{AlertDispatcher, DeliveryChannel};
use market::{InstrumentCategory, NewInstrument, PriceSource, Quote, SourceError, SourceRegistry};
use monitor::poller::run_polling_loop;
use monitor::{MarketScanner, MonitorError};
use storage::{Db, InstrumentRegistry, PriceHistoryStore, SqliteStore};

// -----------------------
// Stubs
// -----------------------

/// Serves whatever price and market time it was last given.
struct StubSource {
    id: &'static str,
    quote: Mutex<(f64, DateTime<Utc>)>,
}

impl StubSource {
    fn new(id: &'static str, price: f64, at: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            id,
            quote: Mutex::new((price, at)),
        })
    }

    fn set(&self, price: f64, at: DateTime<Utc>) {
        *self.quote.lock().unwrap() = (price, at);
    }
}

#[async_trait]
impl PriceSource for StubSource {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn fetch_quote(&self, code: &str) -> Result<Quote, SourceError> {
        let (price, market_time) = *self.quote.lock().unwrap();
        Ok(Quote {
            code: code.to_string(),
            price,
            volume: None,
            market_time,
            source: self.id.to_string(),
        })
    }
}

struct DownSource;

#[async_trait]
impl PriceSource for DownSource {
    fn id(&self) -> &'static str {
        "finnhub"
    }

    async fn fetch_quote(&self, _code: &str) -> Result<Quote, SourceError> {
        Err(SourceError::Api {
            source_id: "finnhub",
            message: "quota exhausted".into(),
        })
    }
}

#[derive(Default)]
struct Inbox {
    messages: Mutex<Vec<String>>,
    fail: AtomicBool,
}

#[async_trait]
impl DeliveryChannel for Inbox {
    fn name(&self) -> &'static str {
        "inbox"
    }

    async fn deliver(&self, message: &str) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("inbox full");
        }
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

// -----------------------
// DB + helpers
// -----------------------

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 14, 0, 0).unwrap()
}

async fn setup() -> (Db, Arc<SqliteStore>) {
    let db = Db::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    let store = Arc::new(db.store());

    store
        .upsert_instrument(&NewInstrument::new(
            "BTCUSDT",
            "Bitcoin",
            InstrumentCategory::Crypto,
            "binance",
            Some(0.02),
        ))
        .await
        .unwrap();
    store
        .upsert_instrument(&NewInstrument::new(
            "SPY",
            "S&P 500 ETF",
            InstrumentCategory::Index,
            "finnhub",
            Some(0.008),
        ))
        .await
        .unwrap();

    (db, store)
}

fn scanner(store: &Arc<SqliteStore>, sources: SourceRegistry, inbox: &Arc<Inbox>) -> MarketScanner {
    MarketScanner::with_store(store.clone(), sources, AlertDispatcher::new(inbox.clone()))
}

// -----------------------
// Tests
// -----------------------

#[tokio::test]
#[traced_test]
async fn failing_instrument_is_logged_and_cycle_continues() {
    let (_db, store) = setup().await;
    let inbox = Arc::new(Inbox::default());

    let binance = StubSource::new("binance", 60_000.0, t0());
    let mut sources = SourceRegistry::new();
    sources.register(binance.clone()).register(Arc::new(DownSource));
    let scanner = scanner(&store, sources, &inbox);

    let report = scanner.run_cycle(t0()).await.unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("SPY: "));
    assert!(report.errors[0].contains("quota exhausted"));
    assert_eq!(report.alerts, 0);
    assert!(!report.delivered);
    assert!(inbox.messages.lock().unwrap().is_empty());

    assert!(logs_contain("instrument scan failed"));
    assert!(logs_contain("scan cycle finished"));

    let btc = store.find_by_code("BTCUSDT").await.unwrap().unwrap();
    assert_eq!(store.latest_price(btc.id).await.unwrap(), Some(60_000.0));
}

#[tokio::test]
async fn move_across_cycles_raises_one_batched_alert() {
    let (_db, store) = setup().await;
    let inbox = Arc::new(Inbox::default());

    let binance = StubSource::new("binance", 60_000.0, t0());
    let mut sources = SourceRegistry::new();
    sources.register(binance.clone()).register(Arc::new(DownSource));
    let scanner = scanner(&store, sources, &inbox);

    scanner.run_cycle(t0()).await.unwrap();

    let later = t0() + Duration::minutes(5);
    binance.set(61_800.0, later);
    let report = scanner.run_cycle(later).await.unwrap();

    assert_eq!(report.alerts, 1);
    assert!(report.delivered);

    let messages = inbox.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("📊 Market alert "));
    assert!(messages[0].contains("🔴 BTCUSDT: 5m +3.00%"));
}

#[tokio::test]
async fn sample_stamped_after_cycle_start_is_found_by_next_poll() {
    let (_db, store) = setup().await;
    let inbox = Arc::new(Inbox::default());

    // the exchange reports a close time slightly after the cycle started
    let lag = Duration::milliseconds(300);
    let binance = StubSource::new("binance", 100.0, t0() + lag);
    let mut sources = SourceRegistry::new();
    sources.register(binance.clone()).register(Arc::new(DownSource));
    let scanner = scanner(&store, sources, &inbox);

    scanner.run_cycle(t0()).await.unwrap();

    let next_poll = t0() + Duration::minutes(5);
    binance.set(103.0, next_poll + lag);
    let report = scanner.run_cycle(next_poll).await.unwrap();

    assert_eq!(report.alerts, 1);
    let messages = inbox.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("🔴 BTCUSDT: 5m +3.00%"));
}

#[tokio::test]
async fn unregistered_source_is_a_per_instrument_failure() {
    let (_db, store) = setup().await;
    let inbox = Arc::new(Inbox::default());

    let mut sources = SourceRegistry::new();
    sources.register(StubSource::new("binance", 1.0, t0()));
    let scanner = scanner(&store, sources, &inbox);

    let report = scanner.run_cycle(t0()).await.unwrap();

    assert_eq!((report.succeeded, report.failed), (1, 1));
    assert!(report.errors[0].contains("price source not available: finnhub"));
}

#[tokio::test]
async fn delivery_failure_is_reported_without_losing_evaluations() {
    let (_db, store) = setup().await;
    let inbox = Arc::new(Inbox::default());

    let binance = StubSource::new("binance", 100.0, t0());
    let mut sources = SourceRegistry::new();
    sources.register(binance.clone()).register(Arc::new(DownSource));
    let scanner = scanner(&store, sources, &inbox);

    scanner.run_cycle(t0()).await.unwrap();

    inbox.fail.store(true, Ordering::SeqCst);
    let later = t0() + Duration::minutes(5);
    binance.set(90.0, later);
    let report = scanner.run_cycle(later).await.unwrap();

    assert_eq!(report.alerts, 1);
    assert!(!report.delivered);
    assert!(report.errors.iter().any(|e| e.starts_with("dispatch: ")));
}

#[tokio::test]
async fn fetch_single_targets_one_code() {
    let (_db, store) = setup().await;
    let inbox = Arc::new(Inbox::default());

    let mut sources = SourceRegistry::new();
    sources
        .register(StubSource::new("binance", 100.0, t0()))
        .register(Arc::new(DownSource));
    let scanner = scanner(&store, sources, &inbox);

    let report = scanner.fetch_single("BTCUSDT", t0()).await.unwrap();
    assert_eq!((report.total, report.succeeded, report.failed), (1, 1, 0));

    let err = scanner.fetch_single("DOGEUSDT", t0()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MonitorError>(),
        Some(MonitorError::UnknownInstrument(code)) if code == "DOGEUSDT"
    ));
}

#[tokio::test]
async fn stored_scan_skips_instruments_without_history() {
    let (_db, store) = setup().await;
    let inbox = Arc::new(Inbox::default());

    let binance = StubSource::new("binance", 100.0, t0());
    let mut sources = SourceRegistry::new();
    sources.register(binance.clone());
    let scanner = scanner(&store, sources, &inbox);

    scanner.fetch_single("BTCUSDT", t0()).await.unwrap();
    binance.set(110.0, t0() + Duration::minutes(5));
    scanner
        .fetch_single("BTCUSDT", t0() + Duration::minutes(5))
        .await
        .unwrap();
    let sent_before = inbox.messages.lock().unwrap().len();

    // re-evaluates 110 against the stored 100 from five minutes earlier
    binance.set(0.0, t0());
    let report = scanner
        .scan_stored(t0() + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.alerts, 1);
    assert_eq!(inbox.messages.lock().unwrap().len(), sent_before + 1);

    let btc = store.find_by_code("BTCUSDT").await.unwrap().unwrap();
    assert_eq!(store.latest_price(btc.id).await.unwrap(), Some(110.0));
}

#[tokio::test]
#[traced_test]
async fn polling_loop_runs_immediately_and_stops_on_shutdown() {
    let (_db, store) = setup().await;
    let inbox = Arc::new(Inbox::default());

    let mut sources = SourceRegistry::new();
    sources.register(StubSource::new("binance", 100.0, Utc::now()));
    let scanner = scanner(&store, sources, &inbox);

    let cycles = run_polling_loop(
        &scanner,
        StdDuration::from_millis(40),
        tokio::time::sleep(StdDuration::from_millis(100)),
    )
    .await;

    assert!(cycles >= 2, "expected at least two cycles, got {cycles}");
    assert!(logs_contain("market poller started"));
    assert!(logs_contain("cycle finished with failures"));
    assert!(logs_contain("shutdown signal received"));
}
