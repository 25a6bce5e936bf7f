/**
 * FALLBACK SCORE - Score synthétique quand un navire n'a aucun échantillon exploitable
 *
 * RÔLE :
 * Fournit un score de santé de remplacement pour un navire qui possède des capteurs
 * mais aucun échantillon valide (table vide, ou lecture en échec).
 *
 * FONCTIONNEMENT :
 * - seed = vessel_id mod 100 choisit une bande (critical / watch / healthy)
 * - score = min + jitter * span, jitter dans [0,1) tiré d'une source non reproductible
 * - Les bandes viennent de la config (section `fallback`), pas du code
 *
 * La source de jitter est injectable : les tests la figent pour vérifier les bornes.
 */

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::VesselId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackBand {
    pub name: String,
    /// La bande s'applique aux seeds strictement inférieurs à cette borne
    pub seed_below: u8,
    pub min: f64,
    pub span: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    pub bands: Vec<FallbackBand>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            bands: vec![
                FallbackBand { name: "critical".into(), seed_below: 5, min: 0.25, span: 0.15 },
                FallbackBand { name: "watch".into(), seed_below: 15, min: 0.45, span: 0.25 },
                FallbackBand { name: "healthy".into(), seed_below: 100, min: 0.75, span: 0.20 },
            ],
        }
    }
}

impl FallbackPolicy {
    pub fn seed(vessel_id: VesselId) -> u8 {
        vessel_id.rem_euclid(100) as u8
    }

    /// Première bande dont la borne dépasse le seed, sinon la dernière.
    pub fn band_for(&self, vessel_id: VesselId) -> Option<&FallbackBand> {
        let seed = Self::seed(vessel_id);
        self.bands
            .iter()
            .find(|b| seed < b.seed_below)
            .or_else(|| self.bands.last())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bands.is_empty() {
            return Err("fallback.bands must not be empty".into());
        }
        for band in &self.bands {
            let in_unit = |x: f64| x.is_finite() && (0.0..=1.0).contains(&x);
            if !in_unit(band.min) || !in_unit(band.span) || band.min + band.span > 1.0 {
                return Err(format!(
                    "fallback band '{}' must stay inside [0,1] (min={}, span={})",
                    band.name, band.min, band.span
                ));
            }
        }
        Ok(())
    }
}

/// Stratégie de score de remplacement.
pub trait FallbackScorer: Send + Sync {
    fn score(&self, vessel_id: VesselId) -> f64;
}

type JitterFn = Box<dyn Fn() -> f64 + Send + Sync>;

// Borne haute des bandes exclue, même après arrondi flottant
const MAX_JITTER: f64 = 1.0 - 1e-9;

/// Politique à bandes, jitter aléatoire par défaut.
pub struct BandedFallback {
    policy: FallbackPolicy,
    jitter: JitterFn,
}

impl BandedFallback {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self { policy, jitter: Box::new(random_unit) }
    }

    pub fn with_jitter<F>(policy: FallbackPolicy, jitter: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self { policy, jitter: Box::new(jitter) }
    }
}

impl FallbackScorer for BandedFallback {
    fn score(&self, vessel_id: VesselId) -> f64 {
        let Some(band) = self.policy.band_for(vessel_id) else { return 0.0; };
        let j = (self.jitter)();
        let j = if j.is_finite() { j.clamp(0.0, MAX_JITTER) } else { 0.0 };
        (band.min + j * band.span).clamp(0.0, 1.0)
    }
}

/// Tirage uniforme dans [0,1) à partir des 48 bits de tête d'un UUID v4.
pub fn random_unit() -> f64 {
    let bits = (Uuid::new_v4().as_u128() >> 80) as u64;
    bits as f64 / (1u64 << 48) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinned(j: f64) -> BandedFallback {
        BandedFallback::with_jitter(FallbackPolicy::default(), move || j)
    }

    #[test]
    fn seed_wraps_negative_ids() {
        assert_eq!(FallbackPolicy::seed(203), 3);
        assert_eq!(FallbackPolicy::seed(-1), 99);
        assert_eq!(FallbackPolicy::seed(0), 0);
    }

    #[test]
    fn band_selection_follows_seed() {
        let policy = FallbackPolicy::default();
        assert_eq!(policy.band_for(4).unwrap().name, "critical");
        assert_eq!(policy.band_for(105).unwrap().name, "watch");
        assert_eq!(policy.band_for(14).unwrap().name, "watch");
        assert_eq!(policy.band_for(15).unwrap().name, "healthy");
        assert_eq!(policy.band_for(99).unwrap().name, "healthy");
    }

    #[test]
    fn pinned_jitter_hits_band_edges() {
        assert!((pinned(0.0).score(3) - 0.25).abs() < 1e-12);
        assert!((pinned(0.0).score(10) - 0.45).abs() < 1e-12);
        assert!((pinned(0.0).score(42) - 0.75).abs() < 1e-12);
        assert!(pinned(1.0).score(3) < 0.40);
        assert!(pinned(1.0).score(10) < 0.70);
        assert!(pinned(1.0).score(42) < 0.95);
    }

    #[test]
    fn nan_jitter_is_neutralized() {
        assert!((pinned(f64::NAN).score(42) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn random_scores_stay_in_band() {
        let fallback = BandedFallback::new(FallbackPolicy::default());
        for _ in 0..200 {
            let s = fallback.score(2);
            assert!((0.25..0.40).contains(&s), "critical out of band: {s}");
            let s = fallback.score(7);
            assert!((0.45..0.70).contains(&s), "watch out of band: {s}");
            let s = fallback.score(77);
            assert!((0.75..0.95).contains(&s), "healthy out of band: {s}");
        }
    }

    #[test]
    fn random_unit_is_half_open() {
        for _ in 0..500 {
            let u = random_unit();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn empty_policy_scores_zero_and_fails_validation() {
        let policy = FallbackPolicy { bands: Vec::new() };
        assert!(policy.validate().is_err());
        assert_eq!(BandedFallback::new(policy).score(1), 0.0);
    }

    #[test]
    fn default_policy_is_valid() {
        assert!(FallbackPolicy::default().validate().is_ok());
    }
}
