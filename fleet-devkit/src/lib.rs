/*!
# FleetWatch DevKit - Fixtures et utilitaires de test

Bibliothèque facilitant les tests du kernel avec:
- Base SQLite jetable au schéma vessels / sensors / hybrid_health
- Fallback à jitter figé pour des scores synthétiques reproductibles
- Harness HTTP qui sert le router sur un port éphémère
*/

pub mod fixtures;
pub mod test_utils;

pub use fixtures::{pinned_fallback, FleetFixture, SCHEMA};
pub use test_utils::TestHarness;
