use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

use super::{AccessMode, FleetStore, SensorLinkStore, SessionPool, StoreError};
use crate::models::{HealthSample, OrphanRow, Sensor, SensorId, Vessel, VesselId};

const VESSEL_COLUMNS: &str = "vessel_id, vessel_name, latitude, longitude, created_at";
const SENSOR_COLUMNS: &str = "sensor_id, vessel_id, subsystem, raw_sensor_id, pi_point_name, created_at";

/// Store SQLite : chaque opération prend sa propre session dans le pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SessionPool,
}

impl SqliteStore {
    pub fn new(pool: SessionPool) -> Self {
        Self { pool }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

fn vessel_from_row(row: &Row<'_>) -> rusqlite::Result<Vessel> {
    Ok(Vessel {
        vessel_id: row.get(0)?,
        vessel_name: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn sensor_from_row(row: &Row<'_>) -> rusqlite::Result<Sensor> {
    Ok(Sensor {
        sensor_id: row.get(0)?,
        vessel_id: row.get(1)?,
        subsystem: row.get(2)?,
        raw_sensor_id: row.get(3)?,
        pi_point_name: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Score brut tel que stocké : REAL, INTEGER ou TEXT numérique.
/// NULL reste `None` ; un texte illisible ou un blob devient NaN, écarté à l'agrégation.
fn score_from_ref(value: ValueRef<'_>) -> Option<f64> {
    match value {
        ValueRef::Null => None,
        ValueRef::Real(f) => Some(f),
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Text(t) => Some(
            std::str::from_utf8(t)
                .ok()
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(f64::NAN),
        ),
        ValueRef::Blob(_) => Some(f64::NAN),
    }
}

fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}

fn query_samples(
    conn: &Connection,
    sensor_ids: &[SensorId],
    limit: usize,
) -> Result<Vec<HealthSample>, StoreError> {
    let sql = format!(
        "SELECT sensor_id, health_score, timestamp FROM hybrid_health \
         WHERE sensor_id IN ({}) AND julianday(timestamp) IS NOT NULL \
         ORDER BY julianday(timestamp) DESC, id DESC LIMIT ?",
        placeholders(sensor_ids.len())
    );
    let mut values: Vec<i64> = sensor_ids.to_vec();
    values.push(i64::try_from(limit).unwrap_or(i64::MAX));

    let mut stmt = conn.prepare_cached(&sql)?;
    let raw = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok((
                row.get::<_, SensorId>(0)?,
                score_from_ref(row.get_ref(1)?),
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // ligne à date illisible : écartée, les autres échantillons du navire restent
    let samples = raw
        .into_iter()
        .filter_map(|(sensor_id, health_score, ts)| match parse_timestamp(&ts) {
            Some(timestamp) => Some(HealthSample { sensor_id, health_score, timestamp }),
            None => {
                warn!(sensor_id, timestamp = %ts, "[store] skipping sample with unreadable timestamp");
                None
            }
        })
        .collect();
    Ok(samples)
}

#[async_trait]
impl FleetStore for SqliteStore {
    async fn load_vessels(&self) -> Result<Vec<Vessel>, StoreError> {
        self.pool
            .run(AccessMode::ReadOnly, |conn| {
                let sql = format!("SELECT {VESSEL_COLUMNS} FROM vessels ORDER BY vessel_name, vessel_id");
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map([], vessel_from_row)?.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn load_vessel(&self, vessel_id: VesselId) -> Result<Option<Vessel>, StoreError> {
        self.pool
            .run(AccessMode::ReadOnly, move |conn| {
                let sql = format!("SELECT {VESSEL_COLUMNS} FROM vessels WHERE vessel_id = ?1");
                let vessel = conn
                    .query_row(&sql, params![vessel_id], vessel_from_row)
                    .optional()?;
                Ok(vessel)
            })
            .await
    }

    async fn load_sensors(&self, vessel_ids: &[VesselId]) -> Result<Vec<Sensor>, StoreError> {
        if vessel_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = vessel_ids.to_vec();
        self.pool
            .run(AccessMode::ReadOnly, move |conn| {
                let sql = format!(
                    "SELECT {SENSOR_COLUMNS} FROM sensors WHERE vessel_id IN ({})",
                    placeholders(ids.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(ids.iter()), sensor_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn load_sensors_for_vessel(&self, vessel_id: VesselId) -> Result<Vec<Sensor>, StoreError> {
        self.pool
            .run(AccessMode::ReadOnly, move |conn| {
                let sql = format!(
                    "SELECT {SENSOR_COLUMNS} FROM sensors WHERE vessel_id = ?1 ORDER BY subsystem, sensor_id"
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt
                    .query_map(params![vessel_id], sensor_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn recent_samples(
        &self,
        sensor_ids: &[SensorId],
        limit: usize,
    ) -> Result<Vec<HealthSample>, StoreError> {
        if sensor_ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let ids = sensor_ids.to_vec();
        self.pool
            .run(AccessMode::ReadOnly, move |conn| query_samples(conn, &ids, limit))
            .await
    }
}

#[async_trait]
impl SensorLinkStore for SqliteStore {
    async fn orphan_rows(&self, after_id: i64, limit: usize) -> Result<Vec<OrphanRow>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.pool
            .run(AccessMode::ReadOnly, move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, sensor_name FROM hybrid_health \
                     WHERE sensor_id IS NULL AND id > ?1 ORDER BY id LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![after_id, limit], |row| {
                        Ok(OrphanRow { id: row.get(0)?, sensor_name: row.get(1)? })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn find_sensor_by_token(&self, token: &str) -> Result<Option<SensorId>, StoreError> {
        let token = token.to_string();
        self.pool
            .run(AccessMode::ReadOnly, move |conn| {
                // LIKE ignore la casse ASCII ; le token ne contient ni % ni _
                let found = conn
                    .query_row(
                        "SELECT sensor_id FROM sensors \
                         WHERE pi_point_name LIKE '%' || ?1 || '%' \
                            OR raw_sensor_id LIKE '%' || ?1 || '%' \
                         ORDER BY sensor_id LIMIT 1",
                        params![token],
                        |row| row.get::<_, SensorId>(0),
                    )
                    .optional()?;
                Ok(found)
            })
            .await
    }

    async fn link_row(&self, row_id: i64, sensor_id: SensorId) -> Result<(), StoreError> {
        self.pool
            .run(AccessMode::ReadWrite, move |conn| {
                conn.execute(
                    "UPDATE hybrid_health SET sensor_id = ?1 WHERE id = ?2",
                    params![sensor_id, row_id],
                )?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_match_arity() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?,?,?");
    }

    #[test]
    fn score_decoding_accepts_numeric_text() {
        assert_eq!(score_from_ref(ValueRef::Real(0.5)), Some(0.5));
        assert_eq!(score_from_ref(ValueRef::Integer(80)), Some(80.0));
        assert_eq!(score_from_ref(ValueRef::Text(b" 42.5 ")), Some(42.5));
        assert_eq!(score_from_ref(ValueRef::Null), None);
    }

    #[test]
    fn unreadable_scores_become_nan() {
        assert!(score_from_ref(ValueRef::Text(b"n/a")).is_some_and(f64::is_nan));
        assert!(score_from_ref(ValueRef::Blob(&[1, 2])).is_some_and(f64::is_nan));
    }

    #[test]
    fn timestamps_must_be_rfc3339() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2025-03-01 10:00:00").is_none());
        assert!(parse_timestamp("2025-03-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2025-03-01T12:00:00+02:00").is_some());
    }
}
