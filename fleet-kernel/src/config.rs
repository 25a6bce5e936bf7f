use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};
use tokio::fs;
use tracing::{info, warn};

use crate::fallback::FallbackPolicy;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub store: StoreConf,
    pub aggregation: AggregationConf,
    pub fallback: FallbackPolicy,
    pub backfill: BackfillConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String, // ex: "0.0.0.0:8080"
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConf {
    pub path: PathBuf,
    pub max_sessions: usize,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AggregationConf {
    /// Nombre max d'échantillons lus par navire (les plus récents)
    pub sample_limit: usize,
    /// Agrégations par navire menées en parallèle
    pub concurrency: usize,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BackfillConf {
    pub batch_size: usize,
    pub pause_ms: u64,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl Default for StoreConf {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/fleet.sqlite"),
            max_sessions: 4,
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for AggregationConf {
    fn default() -> Self {
        Self {
            sample_limit: 500,
            concurrency: 8,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for BackfillConf {
    fn default() -> Self {
        Self { batch_size: 5_000, pause_ms: 100 }
    }
}

impl StoreConf {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_sessions == 0 {
            return Err("store.max_sessions must be >= 1".into());
        }
        Ok(())
    }
}

impl AggregationConf {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.sample_limit == 0 {
            return Err("aggregation.sample_limit must be >= 1".into());
        }
        if self.concurrency == 0 {
            return Err("aggregation.concurrency must be >= 1".into());
        }
        Ok(())
    }
}

impl BackfillConf {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("backfill.batch_size must be >= 1".into());
        }
        Ok(())
    }
}

impl KernelConfig {
    /// Remplace chaque section invalide par sa valeur par défaut.
    pub fn sanitized(mut self) -> Self {
        if let Err(e) = self.store.validate() {
            warn!("[config] {e}, using store defaults");
            self.store = StoreConf::default();
        }
        if let Err(e) = self.aggregation.validate() {
            warn!("[config] {e}, using aggregation defaults");
            self.aggregation = AggregationConf::default();
        }
        if let Err(e) = self.fallback.validate() {
            warn!("[config] {e}, using fallback defaults");
            self.fallback = FallbackPolicy::default();
        }
        if let Err(e) = self.backfill.validate() {
            warn!("[config] {e}, using backfill defaults");
            self.backfill = BackfillConf::default();
        }
        self
    }

    fn apply_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("FLEETWATCH_DB_PATH") {
            if !path.trim().is_empty() {
                self.store.path = PathBuf::from(path);
            }
        }
        if let Ok(bind) = std::env::var("FLEETWATCH_BIND") {
            if !bind.trim().is_empty() {
                self.http.bind = bind;
            }
        }
        self
    }
}

pub fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str::<KernelConfig>(txt)
        .unwrap_or_else(|e| {
            warn!("[config] config invalide: {e}");
            KernelConfig::default()
        })
        .sanitized()
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("FLEETWATCH_CONFIG").unwrap_or_else(|_| "fleetwatch.yaml".into());
    let cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        info!("[config] loaded {path}");
        parse_config(&txt)
    } else {
        warn!("[config] pas de {path}, usage config par défaut");
        KernelConfig::default()
    };
    cfg.apply_env_overrides()
}
