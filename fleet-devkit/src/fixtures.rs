/*!
Fixtures SQLite pour les tests du kernel.

Le schéma reproduit les tables lues par l'agrégation ; en production elles sont
créées et remplies hors de FleetWatch.
*/

use anyhow::Result;
use fleet_kernel::config::StoreConf;
use fleet_kernel::{BandedFallback, FallbackPolicy, SessionPool, SqliteStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const SCHEMA: &str = "
CREATE TABLE vessels(
    vessel_id INTEGER PRIMARY KEY,
    vessel_name TEXT NOT NULL,
    latitude REAL,
    longitude REAL,
    created_at TEXT
);
CREATE TABLE sensors(
    sensor_id INTEGER PRIMARY KEY,
    vessel_id INTEGER NOT NULL,
    subsystem TEXT,
    raw_sensor_id TEXT,
    pi_point_name TEXT,
    created_at TEXT
);
CREATE TABLE hybrid_health(
    id INTEGER PRIMARY KEY,
    sensor_id INTEGER,
    sensor_name TEXT,
    health_score,
    timestamp TEXT NOT NULL
);
CREATE INDEX idx_sensors_vessel ON sensors(vessel_id);
CREATE INDEX idx_hybrid_health_sensor ON hybrid_health(sensor_id, timestamp);
";

/// Fallback à bandes par défaut, jitter constant.
pub fn pinned_fallback(jitter: f64) -> Arc<BandedFallback> {
    Arc::new(BandedFallback::with_jitter(FallbackPolicy::default(), move || jitter))
}

/// Base SQLite temporaire, supprimée au drop.
pub struct FleetFixture {
    _dir: TempDir,
    path: PathBuf,
    conn: Connection,
}

impl FleetFixture {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fleet.sqlite");
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { _dir: dir, path, conn })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store_conf(&self, max_sessions: usize) -> StoreConf {
        StoreConf {
            path: self.path.clone(),
            max_sessions,
            ..StoreConf::default()
        }
    }

    pub fn pool(&self) -> SessionPool {
        SessionPool::new(&self.store_conf(4))
    }

    pub fn store(&self) -> SqliteStore {
        SqliteStore::new(self.pool())
    }

    pub fn vessel(&self, vessel_id: i64, name: &str, coords: Option<(f64, f64)>) -> Result<&Self> {
        self.conn.execute(
            "INSERT INTO vessels(vessel_id, vessel_name, latitude, longitude, created_at) \
             VALUES (?1, ?2, ?3, ?4, '2024-01-01T00:00:00Z')",
            params![vessel_id, name, coords.map(|c| c.0), coords.map(|c| c.1)],
        )?;
        Ok(self)
    }

    pub fn sensor(&self, sensor_id: i64, vessel_id: i64, subsystem: &str) -> Result<&Self> {
        self.conn.execute(
            "INSERT INTO sensors(sensor_id, vessel_id, subsystem) VALUES (?1, ?2, ?3)",
            params![sensor_id, vessel_id, subsystem],
        )?;
        Ok(self)
    }

    pub fn tagged_sensor(
        &self,
        sensor_id: i64,
        vessel_id: i64,
        raw_sensor_id: Option<&str>,
        pi_point_name: Option<&str>,
    ) -> Result<&Self> {
        self.conn.execute(
            "INSERT INTO sensors(sensor_id, vessel_id, subsystem, raw_sensor_id, pi_point_name) \
             VALUES (?1, ?2, 'tagged', ?3, ?4)",
            params![sensor_id, vessel_id, raw_sensor_id, pi_point_name],
        )?;
        Ok(self)
    }

    pub fn sample(&self, sensor_id: i64, score: Option<f64>, ts: OffsetDateTime) -> Result<&Self> {
        self.conn.execute(
            "INSERT INTO hybrid_health(sensor_id, health_score, timestamp) VALUES (?1, ?2, ?3)",
            params![sensor_id, score, ts.format(&Rfc3339)?],
        )?;
        Ok(self)
    }

    /// Ligne brute, valeurs texte telles quelles (scores ou dates malformés).
    pub fn raw_sample(&self, sensor_id: i64, score: &str, ts: &str) -> Result<&Self> {
        self.conn.execute(
            "INSERT INTO hybrid_health(sensor_id, health_score, timestamp) VALUES (?1, ?2, ?3)",
            params![sensor_id, score, ts],
        )?;
        Ok(self)
    }

    pub fn orphan(&self, sensor_name: Option<&str>, ts: OffsetDateTime) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO hybrid_health(sensor_id, sensor_name, health_score, timestamp) \
             VALUES (NULL, ?1, 0.5, ?2)",
            params![sensor_name, ts.format(&Rfc3339)?],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn linked_sensor(&self, row_id: i64) -> Result<Option<i64>> {
        let linked = self
            .conn
            .query_row(
                "SELECT sensor_id FROM hybrid_health WHERE id = ?1",
                params![row_id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(linked.flatten())
    }
}
