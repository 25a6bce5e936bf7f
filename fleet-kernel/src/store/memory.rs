use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

use super::{FleetStore, SensorLinkStore, StoreError};
use crate::models::{HealthSample, OrphanRow, Sensor, SensorId, Vessel, VesselId};

#[derive(Debug, Clone)]
struct SampleRow {
    id: i64,
    sensor_id: Option<SensorId>,
    sensor_name: Option<String>,
    health_score: Option<f64>,
    timestamp: OffsetDateTime,
}

/// Store en mémoire : mêmes contrats que SqliteStore, pannes injectables.
#[derive(Default)]
pub struct MemoryStore {
    vessels: Mutex<Vec<Vessel>>,
    sensors: Mutex<Vec<Sensor>>,
    samples: Mutex<Vec<SampleRow>>,
    failing_sensors: Mutex<HashSet<SensorId>>,
    unavailable: Mutex<bool>,
    pub sample_fetches: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vessel(&self, vessel_id: VesselId, name: &str, coords: Option<(f64, f64)>) -> &Self {
        self.vessels.lock().push(Vessel {
            vessel_id,
            vessel_name: name.to_string(),
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            created_at: None,
        });
        self
    }

    pub fn add_sensor(&self, sensor_id: SensorId, vessel_id: VesselId, subsystem: &str) -> &Self {
        self.sensors.lock().push(Sensor {
            sensor_id,
            vessel_id,
            subsystem: Some(subsystem.to_string()),
            raw_sensor_id: None,
            pi_point_name: None,
            created_at: None,
        });
        self
    }

    pub fn add_tagged_sensor(
        &self,
        sensor_id: SensorId,
        vessel_id: VesselId,
        raw_sensor_id: Option<&str>,
        pi_point_name: Option<&str>,
    ) -> &Self {
        self.sensors.lock().push(Sensor {
            sensor_id,
            vessel_id,
            subsystem: None,
            raw_sensor_id: raw_sensor_id.map(str::to_string),
            pi_point_name: pi_point_name.map(str::to_string),
            created_at: None,
        });
        self
    }

    pub fn add_sample(&self, sensor_id: SensorId, score: Option<f64>, timestamp: OffsetDateTime) -> &Self {
        self.push_row(Some(sensor_id), None, score, timestamp);
        self
    }

    /// Ligne hybrid_health sans sensor_id, seulement un nom brut.
    pub fn add_orphan(&self, sensor_name: Option<&str>, score: Option<f64>, timestamp: OffsetDateTime) -> i64 {
        self.push_row(None, sensor_name.map(str::to_string), score, timestamp)
    }

    fn push_row(
        &self,
        sensor_id: Option<SensorId>,
        sensor_name: Option<String>,
        health_score: Option<f64>,
        timestamp: OffsetDateTime,
    ) -> i64 {
        let mut samples = self.samples.lock();
        let id = samples.len() as i64 + 1;
        samples.push(SampleRow { id, sensor_id, sensor_name, health_score, timestamp });
        id
    }

    /// Toute lecture d'échantillons touchant ce capteur échoue.
    pub fn fail_samples_for(&self, sensor_id: SensorId) -> &Self {
        self.failing_sensors.lock().insert(sensor_id);
        self
    }

    /// Toutes les opérations échouent tant que le drapeau est levé.
    pub fn set_unavailable(&self, down: bool) {
        *self.unavailable.lock() = down;
    }

    pub fn linked_sensor(&self, row_id: i64) -> Option<SensorId> {
        self.samples.lock().iter().find(|r| r.id == row_id).and_then(|r| r.sensor_id)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if *self.unavailable.lock() {
            return Err(StoreError::Unavailable("memory store marked down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl FleetStore for MemoryStore {
    async fn load_vessels(&self) -> Result<Vec<Vessel>, StoreError> {
        self.check_available()?;
        let mut vessels = self.vessels.lock().clone();
        vessels.sort_by(|a, b| a.vessel_name.cmp(&b.vessel_name).then(a.vessel_id.cmp(&b.vessel_id)));
        Ok(vessels)
    }

    async fn load_vessel(&self, vessel_id: VesselId) -> Result<Option<Vessel>, StoreError> {
        self.check_available()?;
        Ok(self.vessels.lock().iter().find(|v| v.vessel_id == vessel_id).cloned())
    }

    async fn load_sensors(&self, vessel_ids: &[VesselId]) -> Result<Vec<Sensor>, StoreError> {
        self.check_available()?;
        let wanted: HashSet<VesselId> = vessel_ids.iter().copied().collect();
        Ok(self
            .sensors
            .lock()
            .iter()
            .filter(|s| wanted.contains(&s.vessel_id))
            .cloned()
            .collect())
    }

    async fn load_sensors_for_vessel(&self, vessel_id: VesselId) -> Result<Vec<Sensor>, StoreError> {
        self.check_available()?;
        let mut sensors: Vec<Sensor> = self
            .sensors
            .lock()
            .iter()
            .filter(|s| s.vessel_id == vessel_id)
            .cloned()
            .collect();
        sensors.sort_by(|a, b| a.subsystem.cmp(&b.subsystem).then(a.sensor_id.cmp(&b.sensor_id)));
        Ok(sensors)
    }

    async fn recent_samples(
        &self,
        sensor_ids: &[SensorId],
        limit: usize,
    ) -> Result<Vec<HealthSample>, StoreError> {
        self.sample_fetches.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        {
            let failing = self.failing_sensors.lock();
            if let Some(id) = sensor_ids.iter().find(|id| failing.contains(id)) {
                return Err(StoreError::Unavailable(format!("sample fetch failed for sensor {id}")));
            }
        }
        let wanted: HashSet<SensorId> = sensor_ids.iter().copied().collect();
        let mut rows: Vec<SampleRow> = self
            .samples
            .lock()
            .iter()
            .filter(|r| r.sensor_id.is_some_and(|id| wanted.contains(&id)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                r.sensor_id.map(|sensor_id| HealthSample {
                    sensor_id,
                    health_score: r.health_score,
                    timestamp: r.timestamp,
                })
            })
            .collect())
    }
}

#[async_trait]
impl SensorLinkStore for MemoryStore {
    async fn orphan_rows(&self, after_id: i64, limit: usize) -> Result<Vec<OrphanRow>, StoreError> {
        self.check_available()?;
        let mut rows: Vec<OrphanRow> = self
            .samples
            .lock()
            .iter()
            .filter(|r| r.sensor_id.is_none() && r.id > after_id)
            .map(|r| OrphanRow { id: r.id, sensor_name: r.sensor_name.clone() })
            .collect();
        rows.sort_by_key(|r| r.id);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn find_sensor_by_token(&self, token: &str) -> Result<Option<SensorId>, StoreError> {
        self.check_available()?;
        let needle = token.to_ascii_lowercase();
        let contains = |field: &Option<String>| {
            field.as_deref().is_some_and(|f| f.to_ascii_lowercase().contains(&needle))
        };
        Ok(self
            .sensors
            .lock()
            .iter()
            .filter(|s| contains(&s.pi_point_name) || contains(&s.raw_sensor_id))
            .map(|s| s.sensor_id)
            .min())
    }

    async fn link_row(&self, row_id: i64, sensor_id: SensorId) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(row) = self.samples.lock().iter_mut().find(|r| r.id == row_id) {
            row.sensor_id = Some(sensor_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn samples_come_newest_first_and_capped() {
        let store = MemoryStore::new();
        store
            .add_sample(1, Some(0.1), datetime!(2025-01-01 00:00 UTC))
            .add_sample(2, Some(0.2), datetime!(2025-01-03 00:00 UTC))
            .add_sample(1, Some(0.3), datetime!(2025-01-02 00:00 UTC))
            .add_sample(9, Some(0.9), datetime!(2025-01-04 00:00 UTC));

        let samples = store.recent_samples(&[1, 2], 2).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].health_score, Some(0.2));
        assert_eq!(samples[1].health_score, Some(0.3));
    }

    #[tokio::test]
    async fn injected_failure_only_hits_that_sensor() {
        let store = MemoryStore::new();
        store.add_sample(1, Some(0.5), datetime!(2025-01-01 00:00 UTC)).fail_samples_for(2);
        assert!(store.recent_samples(&[1, 2], 10).await.is_err());
        assert_eq!(store.recent_samples(&[1], 10).await.unwrap().len(), 1);
        assert_eq!(store.sample_fetches.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn vessels_sorted_by_name() {
        let store = MemoryStore::new();
        store.add_vessel(2, "Zephyr", None).add_vessel(1, "Aurora", Some((1.0, 2.0)));
        let names: Vec<String> = store.load_vessels().await.unwrap().into_iter().map(|v| v.vessel_name).collect();
        assert_eq!(names, vec!["Aurora", "Zephyr"]);
    }
}
