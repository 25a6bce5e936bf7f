/**
 * HEALTH AGGREGATOR - Score de santé d'un navire à partir de ses capteurs
 *
 * RÔLE :
 * Réduit les échantillons récents des capteurs d'un navire à un score unique
 * dans [0,1] et à un horodatage représentatif.
 *
 * FONCTIONNEMENT :
 * - Lecture des `sample_limit` échantillons les plus récents (tous capteurs confondus)
 * - Normalisation : [0,1] inchangé, sinon échelle 0–100 divisée par 100
 * - Score NULL compté comme 0, valeurs non finies écartées
 * - Score = moyenne des valeurs retenues ; horodatage = plus récent de l'ensemble lu
 * - Aucun échantillon valide (ou lecture en échec) : score de fallback + horloge murale
 * - Aucun capteur : score 0, horodatage nul
 *
 * Une lecture en échec n'interrompt jamais la liste : elle est journalisée puis
 * traitée comme "zéro échantillon".
 */

use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::fallback::FallbackScorer;
use crate::models::{HealthSample, SensorId, VesselId};
use crate::store::FleetStore;

/// Origine du score, pour les logs uniquement : le résumé renvoyé ne la porte pas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthSource {
    Samples,
    Synthesized,
    NoSensors,
}

impl fmt::Display for HealthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthSource::Samples => "samples",
            HealthSource::Synthesized => "synthesized",
            HealthSource::NoSensors => "no_sensors",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VesselHealth {
    pub score: f64,
    pub last_update: Option<OffsetDateTime>,
    pub source: HealthSource,
    pub samples_used: usize,
}

/// r si 0 ≤ r ≤ 1, sinon r / 100.
pub fn normalize(raw: f64) -> f64 {
    if (0.0..=1.0).contains(&raw) {
        raw
    } else {
        raw / 100.0
    }
}

/// Moyenne des scores normalisés finis (NULL vaut 0) et horodatage le plus récent
/// de l'ensemble lu. `None` si aucune valeur n'est retenue.
pub fn reduce_samples(samples: &[HealthSample]) -> Option<(f64, OffsetDateTime, usize)> {
    let newest = samples.iter().map(|s| s.timestamp).max()?;
    let (sum, count) = samples
        .iter()
        .map(|s| normalize(s.health_score.unwrap_or(0.0)))
        .filter(|v| v.is_finite())
        .fold((0.0_f64, 0_usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        return None;
    }
    let mean = sum / count as f64;
    let mean = if mean.is_finite() { mean.clamp(0.0, 1.0) } else { return None };
    Some((mean, newest, count))
}

#[derive(Clone)]
pub struct HealthAggregator {
    store: Arc<dyn FleetStore>,
    fallback: Arc<dyn FallbackScorer>,
    sample_limit: usize,
}

impl HealthAggregator {
    pub fn new(store: Arc<dyn FleetStore>, fallback: Arc<dyn FallbackScorer>, sample_limit: usize) -> Self {
        Self { store, fallback, sample_limit: sample_limit.max(1) }
    }

    pub async fn aggregate(&self, vessel_id: VesselId, sensor_ids: &[SensorId]) -> VesselHealth {
        if sensor_ids.is_empty() {
            return VesselHealth {
                score: 0.0,
                last_update: None,
                source: HealthSource::NoSensors,
                samples_used: 0,
            };
        }

        let samples = match self.store.recent_samples(sensor_ids, self.sample_limit).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!(vessel_id, error = %e, "[health] sample fetch failed, using fallback");
                Vec::new()
            }
        };

        let health = match reduce_samples(&samples) {
            Some((score, newest, used)) => VesselHealth {
                score,
                last_update: Some(newest),
                source: HealthSource::Samples,
                samples_used: used,
            },
            None => VesselHealth {
                score: self.fallback.score(vessel_id).clamp(0.0, 1.0),
                last_update: Some(OffsetDateTime::now_utc()),
                source: HealthSource::Synthesized,
                samples_used: 0,
            },
        };
        debug!(
            vessel_id,
            fetched = samples.len(),
            used = health.samples_used,
            score = health.score,
            source = %health.source,
            "[health] aggregated"
        );
        health
    }
}
