/**
 * FLEET LISTING - Assemblage des résumés santé de toute la flotte
 *
 * RÔLE : charge les navires, mappe leurs capteurs, agrège chaque navire
 * puis fusionne identité + score dans l'ordre d'entrée des navires.
 *
 * CONCURRENCE : une agrégation par navire, `concurrency` en vol au maximum,
 * le tout borné par un timeout de requête. L'échec d'un navire n'annule pas les autres.
 */

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::health::{HealthAggregator, HealthSource, VesselHealth};
use crate::models::{SensorId, Vessel, VesselDetail, VesselHealthSummary, VesselId};
use crate::sensors::{group_by_vessel, sensors_of};
use crate::store::{FleetStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("listing timed out after {0:?}")]
    Timeout(Duration),
}

pub fn assemble(vessel: &Vessel, health: &VesselHealth) -> VesselHealthSummary {
    VesselHealthSummary {
        id: vessel.vessel_id,
        name: vessel.vessel_name.clone(),
        health: health.score,
        last_update: health.last_update,
        latitude: vessel.latitude,
        longitude: vessel.longitude,
    }
}

#[derive(Clone)]
pub struct FleetHealthService {
    store: Arc<dyn FleetStore>,
    aggregator: HealthAggregator,
    concurrency: usize,
    request_timeout: Duration,
}

impl FleetHealthService {
    pub fn new(
        store: Arc<dyn FleetStore>,
        aggregator: HealthAggregator,
        concurrency: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            aggregator,
            concurrency: concurrency.max(1),
            request_timeout,
        }
    }

    /// Un résumé par navire, dans l'ordre renvoyé par le store (tri par nom).
    pub async fn list(&self) -> Result<Vec<VesselHealthSummary>, ListingError> {
        tokio::time::timeout(self.request_timeout, self.list_inner())
            .await
            .map_err(|_| ListingError::Timeout(self.request_timeout))?
    }

    async fn list_inner(&self) -> Result<Vec<VesselHealthSummary>, ListingError> {
        let vessels = self.store.load_vessels().await?;
        if vessels.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<VesselId> = vessels.iter().map(|v| v.vessel_id).collect();
        let sensors = self.store.load_sensors(&ids).await?;
        let map = group_by_vessel(&sensors);

        // jobs possédés : aucune future du stream n'emprunte la liste
        let jobs: Vec<(Vessel, Vec<SensorId>)> = vessels
            .into_iter()
            .map(|vessel| {
                let ids = sensors_of(&map, vessel.vessel_id).to_vec();
                (vessel, ids)
            })
            .collect();

        let results: Vec<(VesselHealthSummary, HealthSource)> = stream::iter(jobs)
            .map(|(vessel, ids)| {
                let aggregator = self.aggregator.clone();
                async move {
                    let health = aggregator.aggregate(vessel.vessel_id, &ids).await;
                    (assemble(&vessel, &health), health.source)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let synthesized = results.iter().filter(|(_, s)| *s == HealthSource::Synthesized).count();
        let sensorless = results.iter().filter(|(_, s)| *s == HealthSource::NoSensors).count();
        info!(
            vessels = results.len(),
            sensors = sensors.len(),
            synthesized,
            sensorless,
            "[fleet] listing assembled"
        );

        Ok(results.into_iter().map(|(summary, _)| summary).collect())
    }

    /// Navire + capteurs (triés par sous-système puis id), `None` si inconnu.
    pub async fn vessel_detail(&self, vessel_id: VesselId) -> Result<Option<VesselDetail>, ListingError> {
        let Some(vessel) = self.store.load_vessel(vessel_id).await? else {
            return Ok(None);
        };
        let sensors = self.store.load_sensors_for_vessel(vessel_id).await?;
        Ok(Some(VesselDetail { vessel, sensors }))
    }
}
