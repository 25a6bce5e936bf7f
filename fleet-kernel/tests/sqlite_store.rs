use fleet_devkit::FleetFixture;
use fleet_kernel::store::AccessMode;
use fleet_kernel::{FleetStore, SensorLinkStore, SessionPool, SqliteStore, StoreError};
use time::macros::datetime;

fn seeded() -> anyhow::Result<FleetFixture> {
    let fx = FleetFixture::new()?;
    fx.vessel(2, "Zephyr", None)?
        .vessel(1, "Aurora", Some((60.1, 24.9)))?
        .vessel(3, "Borealis", None)?
        .sensor(10, 1, "engine")?
        .sensor(11, 1, "ballast")?
        .sensor(20, 2, "engine")?;
    Ok(fx)
}

#[tokio::test]
async fn vessels_come_back_sorted_by_name() -> anyhow::Result<()> {
    let fx = seeded()?;
    let vessels = fx.store().load_vessels().await?;
    let names: Vec<&str> = vessels.iter().map(|v| v.vessel_name.as_str()).collect();
    assert_eq!(names, vec!["Aurora", "Borealis", "Zephyr"]);
    assert_eq!(vessels[0].latitude, Some(60.1));
    assert_eq!(vessels[0].created_at.as_deref(), Some("2024-01-01T00:00:00Z"));
    Ok(())
}

#[tokio::test]
async fn sensors_filtered_by_vessel_set() -> anyhow::Result<()> {
    let fx = seeded()?;
    let store = fx.store();
    let mut ids: Vec<i64> = store.load_sensors(&[1, 3]).await?.iter().map(|s| s.sensor_id).collect();
    ids.sort();
    assert_eq!(ids, vec![10, 11]);
    assert!(store.load_sensors(&[]).await?.is_empty());

    let detail: Vec<i64> = store.load_sensors_for_vessel(1).await?.iter().map(|s| s.sensor_id).collect();
    assert_eq!(detail, vec![11, 10]); // ballast < engine
    assert!(store.load_vessel(42).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn samples_newest_first_across_offsets_and_capped() -> anyhow::Result<()> {
    let fx = seeded()?;
    fx.sample(10, Some(0.9), datetime!(2025-06-01 10:00 UTC))?
        .sample(11, Some(40.0), datetime!(2025-06-01 09:00 UTC))?
        .sample(10, Some(0.8), datetime!(2025-06-01 08:00 UTC))?
        .sample(20, Some(0.1), datetime!(2025-06-01 11:00 UTC))?;
    // 11:30+02:00 == 09:30Z : doit se classer entre 10:00Z et 09:00Z
    fx.raw_sample(11, "55", "2025-06-01T11:30:00+02:00")?;

    let store = fx.store();
    let samples = store.recent_samples(&[10, 11], 500).await?;
    let scores: Vec<Option<f64>> = samples.iter().map(|s| s.health_score).collect();
    assert_eq!(scores, vec![Some(0.9), Some(55.0), Some(40.0), Some(0.8)]);

    let capped = store.recent_samples(&[10, 11], 2).await?;
    assert_eq!(capped.len(), 2);
    assert_eq!(capped[0].timestamp, datetime!(2025-06-01 10:00 UTC));
    assert!(store.recent_samples(&[], 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn null_stays_missing_and_garbage_becomes_nan() -> anyhow::Result<()> {
    let fx = seeded()?;
    fx.raw_sample(10, "n/a", "2025-06-01T10:00:00Z")?;
    fx.sample(10, None, datetime!(2025-06-01 09:00 UTC))?;
    let samples = fx.store().recent_samples(&[10], 10).await?;
    assert_eq!(samples.len(), 2);
    assert!(samples[0].health_score.is_some_and(f64::is_nan));
    assert_eq!(samples[1].health_score, None);
    Ok(())
}

#[tokio::test]
async fn unreadable_timestamps_are_skipped_without_eating_the_cap() -> anyhow::Result<()> {
    let fx = seeded()?;
    fx.sample(10, Some(0.9), datetime!(2025-06-01 10:00 UTC))?
        .sample(10, Some(0.8), datetime!(2025-06-01 09:00 UTC))?;
    fx.raw_sample(10, "0.5", "last tuesday")?
        .raw_sample(10, "0.5", "")?
        // lisible par SQLite mais pas RFC 3339
        .raw_sample(10, "0.1", "2025-06-01 11:00:00")?;

    let store = fx.store();
    let samples = store.recent_samples(&[10], 10).await?;
    let scores: Vec<Option<f64>> = samples.iter().map(|s| s.health_score).collect();
    assert_eq!(scores, vec![Some(0.9), Some(0.8)]);

    let capped = store.recent_samples(&[10], 2).await?;
    assert_eq!(capped.len(), 1);
    assert_eq!(capped[0].health_score, Some(0.9));
    Ok(())
}

#[tokio::test]
async fn sessions_are_released_and_recycled() -> anyhow::Result<()> {
    let fx = seeded()?;
    let pool = SessionPool::new(&fx.store_conf(2));
    let store = SqliteStore::new(pool.clone());

    for _ in 0..5 {
        store.load_vessels().await?;
    }
    assert_eq!(pool.available_sessions(), 2);
    assert_eq!(pool.idle_connections(AccessMode::ReadOnly), 1);

    let a = pool.acquire(AccessMode::ReadOnly).await?;
    let b = pool.acquire(AccessMode::ReadOnly).await?;
    assert_eq!(pool.available_sessions(), 0);
    drop(a);
    drop(b);
    assert_eq!(pool.available_sessions(), 2);
    assert_eq!(pool.idle_connections(AccessMode::ReadOnly), 2);
    assert_eq!(pool.idle_connections(AccessMode::ReadWrite), 0);
    Ok(())
}

#[tokio::test]
async fn one_write_connection_serves_consecutive_updates() -> anyhow::Result<()> {
    let fx = seeded()?;
    let ts = datetime!(2025-06-01 00:00 UTC);
    let rows = [fx.orphan(Some("a"), ts)?, fx.orphan(Some("b"), ts)?, fx.orphan(Some("c"), ts)?];
    let pool = SessionPool::new(&fx.store_conf(2));
    let store = SqliteStore::new(pool.clone());

    for row in rows {
        store.link_row(row, 10).await?;
        assert_eq!(pool.idle_connections(AccessMode::ReadWrite), 1);
    }
    for row in rows {
        assert_eq!(fx.linked_sensor(row)?, Some(10));
    }

    // deux écrivains simultanés : un seul est gardé au repos
    let a = pool.acquire(AccessMode::ReadWrite).await?;
    let b = pool.acquire(AccessMode::ReadWrite).await?;
    drop(a);
    drop(b);
    assert_eq!(pool.idle_connections(AccessMode::ReadWrite), 1);

    pool.close();
    assert_eq!(pool.idle_connections(AccessMode::ReadWrite), 0);
    Ok(())
}

#[tokio::test]
async fn read_only_sessions_refuse_writes() -> anyhow::Result<()> {
    let fx = seeded()?;
    let pool = fx.pool();
    let session = pool.acquire(AccessMode::ReadOnly).await?;
    let res = session
        .connection()
        .execute("DELETE FROM vessels", []);
    assert!(res.is_err());
    Ok(())
}

#[tokio::test]
async fn closed_pool_fails_fast() -> anyhow::Result<()> {
    let fx = seeded()?;
    let pool = fx.pool();
    pool.close();
    let err = SqliteStore::new(pool).load_vessels().await.unwrap_err();
    assert!(matches!(err, StoreError::PoolClosed));
    Ok(())
}

#[tokio::test]
async fn missing_database_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let conf = fleet_kernel::config::StoreConf {
        path: dir.path().join("absent.sqlite"),
        ..Default::default()
    };
    let err = SqliteStore::new(SessionPool::new(&conf)).load_vessels().await.unwrap_err();
    assert!(matches!(err, StoreError::Sqlite(_)));
}

#[tokio::test]
async fn link_queries_round_trip() -> anyhow::Result<()> {
    let fx = seeded()?;
    fx.tagged_sensor(30, 3, Some("raw-ct12.04"), None)?
        .tagged_sensor(31, 3, None, Some("PI.CT7.1.PV"))?;
    let ts = datetime!(2025-06-01 00:00 UTC);
    let a = fx.orphan(Some("ENGINE CT12.04"), ts)?;
    let b = fx.orphan(None, ts)?;

    let store = fx.store();
    let rows = store.orphan_rows(0, 10).await?;
    assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);
    assert_eq!(store.orphan_rows(a, 10).await?.len(), 1);

    assert_eq!(store.find_sensor_by_token("CT12.04").await?, Some(30));
    assert_eq!(store.find_sensor_by_token("ct7.1").await?, Some(31));
    assert_eq!(store.find_sensor_by_token("CT1.0").await?, None);

    store.link_row(a, 30).await?;
    assert_eq!(fx.linked_sensor(a)?, Some(30));
    assert_eq!(store.orphan_rows(0, 10).await?.len(), 1);
    Ok(())
}
