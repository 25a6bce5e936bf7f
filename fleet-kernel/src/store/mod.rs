/**
 * STORE - Accès au stock relationnel de la flotte
 *
 * RÔLE :
 * Ce module définit les lectures dont l'agrégation santé a besoin, et les quelques
 * écritures du job de backfill, derrière deux traits.
 *
 * FONCTIONNEMENT :
 * - FleetStore = lectures navires / capteurs / échantillons (bornées, triées)
 * - SensorLinkStore = lignes orphelines de hybrid_health + rattachement capteur
 * - SqliteStore = implémentation réelle, sessions poolées (voir pool.rs)
 * - MemoryStore = implémentation en mémoire, pannes injectables pour les tests
 *
 * Aucune poignée globale : le store est construit une fois puis passé explicitement.
 */

mod memory;
mod pool;
mod sqlite;

pub use memory::MemoryStore;
pub use pool::{AccessMode, Session, SessionPool};
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::models::{HealthSample, OrphanRow, Sensor, SensorId, Vessel, VesselId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("session pool closed")]
    PoolClosed,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Lectures de l'agrégation santé.
#[async_trait]
pub trait FleetStore: Send + Sync {
    /// Tous les navires, triés par nom.
    async fn load_vessels(&self) -> Result<Vec<Vessel>, StoreError>;

    async fn load_vessel(&self, vessel_id: VesselId) -> Result<Option<Vessel>, StoreError>;

    /// Capteurs appartenant à l'un des navires donnés.
    async fn load_sensors(&self, vessel_ids: &[VesselId]) -> Result<Vec<Sensor>, StoreError>;

    /// Capteurs d'un navire, triés par sous-système puis identifiant.
    async fn load_sensors_for_vessel(&self, vessel_id: VesselId) -> Result<Vec<Sensor>, StoreError>;

    /// Au plus `limit` échantillons des capteurs donnés, du plus récent au plus ancien.
    async fn recent_samples(
        &self,
        sensor_ids: &[SensorId],
        limit: usize,
    ) -> Result<Vec<HealthSample>, StoreError>;
}

/// Accès du backfill aux lignes hybrid_health sans capteur.
#[async_trait]
pub trait SensorLinkStore: Send + Sync {
    /// Lignes orphelines d'id strictement supérieur à `after_id`, triées par id.
    async fn orphan_rows(&self, after_id: i64, limit: usize) -> Result<Vec<OrphanRow>, StoreError>;

    /// Premier capteur dont pi_point_name ou raw_sensor_id contient le token (casse ignorée).
    async fn find_sensor_by_token(&self, token: &str) -> Result<Option<SensorId>, StoreError>;

    async fn link_row(&self, row_id: i64, sensor_id: SensorId) -> Result<(), StoreError>;
}
