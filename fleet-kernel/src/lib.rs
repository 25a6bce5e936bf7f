//! FleetWatch kernel - agrégation santé de flotte.
//!
//! Navires, capteurs et échantillons hybrid_health sont lus depuis un store
//! relationnel ; chaque navire est réduit à un score dans [0,1] et servi en JSON.

pub mod backfill;
pub mod config;
pub mod fallback;
pub mod health;
pub mod http;
pub mod models;
pub mod sensors;
pub mod state;
pub mod store;
pub mod summary;

pub use backfill::{BackfillReport, SensorLinkBackfill};
pub use config::{load_config, KernelConfig};
pub use fallback::{BandedFallback, FallbackPolicy, FallbackScorer};
pub use health::{HealthAggregator, HealthSource, VesselHealth};
pub use http::{build_router, AppState};
pub use store::{FleetStore, MemoryStore, SensorLinkStore, SessionPool, SqliteStore, StoreError};
pub use summary::{FleetHealthService, ListingError};

use std::sync::Arc;

/// Câble store, fallback, agrégateur et backfill selon la config.
pub fn build_state(cfg: &KernelConfig, store: SqliteStore) -> AppState {
    let fallback = Arc::new(BandedFallback::new(cfg.fallback.clone()));
    build_state_with(cfg, store, fallback)
}

/// Variante à fallback injecté (jitter figé dans les tests).
pub fn build_state_with(
    cfg: &KernelConfig,
    store: SqliteStore,
    fallback: Arc<dyn FallbackScorer>,
) -> AppState {
    let store = Arc::new(store);
    let aggregator = HealthAggregator::new(store.clone(), fallback, cfg.aggregation.sample_limit);
    let fleet = FleetHealthService::new(
        store.clone(),
        aggregator,
        cfg.aggregation.concurrency,
        cfg.aggregation.request_timeout(),
    );
    let backfill = SensorLinkBackfill::new(store, cfg.backfill.batch_size, cfg.backfill.pause());
    AppState::new(fleet, backfill)
}
