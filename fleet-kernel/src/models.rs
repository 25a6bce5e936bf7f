use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type VesselId = i64;
pub type SensorId = i64;

/// Ligne `vessels` : identité d'un navire, créée hors de ce service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub vessel_id: VesselId,
    pub vessel_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Ligne `sensors` : un capteur appartient à exactement un navire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub sensor_id: SensorId,
    pub vessel_id: VesselId,
    pub subsystem: Option<String>,
    pub raw_sensor_id: Option<String>,
    pub pi_point_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Échantillon de la série `hybrid_health`, score brut sur 0–1 ou 0–100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub sensor_id: SensorId,
    pub health_score: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Résumé renvoyé par `GET /api/vessels`, une entrée par navire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselHealthSummary {
    pub id: VesselId,
    pub name: String,
    pub health: f64, // 0–1
    #[serde(rename = "lastUpdate", default, with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Réponse de `GET /api/vessels/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct VesselDetail {
    pub vessel: Vessel,
    pub sensors: Vec<Sensor>,
}

/// Ligne `hybrid_health` sans capteur rattaché (cible du backfill).
#[derive(Debug, Clone, PartialEq)]
pub struct OrphanRow {
    pub id: i64,
    pub sensor_name: Option<String>,
}
