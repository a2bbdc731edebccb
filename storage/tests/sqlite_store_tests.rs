use chrono::{DateTime, Duration, TimeZone, Utc};

use market::{InstrumentCategory, NewInstrument};
use storage::{
    AlertStateStore, Db, Direction, InstrumentRegistry, PriceHistoryStore, PriceObservation,
    SqliteStore,
};

///
/// Test suite for SqliteStore.
///
/// Every test runs against its own private in-memory database with the real
/// schema applied.
///
async fn setup() -> (Db, SqliteStore) {
    let db = Db::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    let store = db.store();
    (db, store)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
}

fn btc() -> NewInstrument {
    NewInstrument::new("BTCUSDT", "Bitcoin", InstrumentCategory::Crypto, "binance", Some(0.02))
}

fn obs(instrument_id: i64, market_time: DateTime<Utc>, price: f64) -> PriceObservation {
    PriceObservation {
        instrument_id,
        market_time,
        local_time: market_time + Duration::seconds(1),
        price,
        volume: Some(10.0),
        source: "binance".into(),
    }
}

#[tokio::test]
async fn migrate_is_idempotent_and_seed_only_adds_missing_codes() -> anyhow::Result<()> {
    let (db, store) = setup().await;
    db.migrate().await?;

    assert_eq!(db.seed_defaults().await?, 8);
    assert_eq!(db.seed_defaults().await?, 0);

    let all = store.all_instruments().await?;
    assert_eq!(all.len(), 8);

    let gld = store.find_by_code("GLD").await?.unwrap();
    assert_eq!(gld.alert_threshold, None);
    assert_eq!(gld.effective_threshold(), 1.0);
    assert_eq!(gld.category, InstrumentCategory::Commodity);

    Ok(())
}

#[tokio::test]
async fn upsert_updates_by_code_and_inactive_rows_are_hidden() -> anyhow::Result<()> {
    let (_db, store) = setup().await;

    let id = store.upsert_instrument(&btc()).await?;

    let mut changed = btc();
    changed.alert_threshold = Some(0.05);
    changed.active = false;
    let same_id = store.upsert_instrument(&changed).await?;
    assert_eq!(id, same_id);

    assert!(store.active_instruments().await?.is_empty());

    let all = store.all_instruments().await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].alert_threshold, Some(0.05));
    assert!(!all[0].active);

    Ok(())
}

#[tokio::test]
async fn malformed_instrument_rows_are_skipped() -> anyhow::Result<()> {
    let (db, store) = setup().await;
    store.upsert_instrument(&btc()).await?;

    sqlx::query(
        "INSERT INTO instruments (code, name, category, source, active, created_ms) VALUES ('XBOND', 'Bond', 'bond', 'finnhub', 1, 0)",
    )
    .execute(&db.pool)
    .await?;

    let active = store.active_instruments().await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].code, "BTCUSDT");

    Ok(())
}

#[tokio::test]
async fn price_at_or_before_orders_by_market_time() -> anyhow::Result<()> {
    let (_db, store) = setup().await;
    let id = store.upsert_instrument(&btc()).await?;

    // inserted out of market-time order on purpose
    store.append(&obs(id, t0(), 100.0)).await?;
    store.append(&obs(id, t0() + Duration::minutes(10), 110.0)).await?;
    store.append(&obs(id, t0() + Duration::minutes(5), 105.0)).await?;

    assert_eq!(store.price_at_or_before(id, t0() - Duration::seconds(1)).await?, None);
    assert_eq!(store.price_at_or_before(id, t0()).await?, Some(100.0));
    assert_eq!(store.price_at_or_before(id, t0() + Duration::minutes(7)).await?, Some(105.0));
    assert_eq!(store.price_at_or_before(id, t0() + Duration::hours(1)).await?, Some(110.0));
    assert_eq!(store.latest_price(id).await?, Some(110.0));

    let recent = store.recent(id, 2).await?;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].price, 110.0);
    assert_eq!(recent[1].price, 105.0);
    assert_eq!(recent[0].local_time, recent[0].market_time + Duration::seconds(1));

    Ok(())
}

#[tokio::test]
async fn history_is_per_instrument() -> anyhow::Result<()> {
    let (_db, store) = setup().await;
    let btc_id = store.upsert_instrument(&btc()).await?;
    let eth_id = store
        .upsert_instrument(&NewInstrument::new(
            "ETHUSDT",
            "Ethereum",
            InstrumentCategory::Crypto,
            "binance",
            Some(0.02),
        ))
        .await?;

    store.append(&obs(btc_id, t0(), 100.0)).await?;

    assert_eq!(store.latest_price(eth_id).await?, None);
    assert!(store.recent(eth_id, 10).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn get_or_create_persists_a_zeroed_row() -> anyhow::Result<()> {
    let (_db, store) = setup().await;
    let id = store.upsert_instrument(&btc()).await?;

    assert!(store.peek_state(id).await?.is_none());

    let state = store.get_or_create(id).await?;
    assert_eq!(state.instrument_id, id);
    assert_eq!((state.medium.up, state.medium.down), (0, 0));
    assert_eq!((state.long.up, state.long.down), (0, 0));
    assert!(state.medium.last_trigger_at.is_none());

    let persisted = store.peek_state(id).await?.unwrap();
    assert_eq!(persisted, state);

    Ok(())
}

#[tokio::test]
async fn save_overwrites_and_round_trips_both_tracks() -> anyhow::Result<()> {
    let (_db, store) = setup().await;
    let id = store.upsert_instrument(&btc()).await?;

    let mut state = store.get_or_create(id).await?;
    state.medium.record(Direction::Up, t0());
    state.medium.record(Direction::Up, t0() + Duration::minutes(5));
    state.long.record(Direction::Down, t0());

    store.save(&state).await?;
    store.save(&state).await?;

    let loaded = store.get_or_create(id).await?;
    assert_eq!(loaded, state);
    assert_eq!(loaded.medium.up, 2);
    assert_eq!(loaded.medium.last_trigger_at, Some(t0() + Duration::minutes(5)));
    assert_eq!(loaded.medium.last_direction, Some(Direction::Up));
    assert_eq!(loaded.long.down, 1);
    assert_eq!(loaded.long.last_direction, Some(Direction::Down));

    Ok(())
}

#[tokio::test]
async fn save_without_prior_row_inserts() -> anyhow::Result<()> {
    let (_db, store) = setup().await;
    let id = store.upsert_instrument(&btc()).await?;

    let mut state = storage::AlertState::new(id);
    state.long.record(Direction::Up, t0());
    store.save(&state).await?;

    assert_eq!(store.peek_state(id).await?, Some(state));

    Ok(())
}
