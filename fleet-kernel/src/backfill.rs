/**
 * SENSOR LINK BACKFILL - Rattache les lignes hybrid_health orphelines à leur capteur
 *
 * RÔLE :
 * Les lignes produites par le scoring externe arrivent parfois avec un simple nom
 * brut (`sensor_name`) et sans `sensor_id`. Ce job retrouve le capteur via le
 * token CT présent dans le nom (ex: "PORT ENGINE CT12.04 TEMP" -> "CT12.04").
 *
 * FONCTIONNEMENT :
 * - Lots de `batch_size` lignes orphelines, parcourues par id croissant
 * - Token absent ou capteur introuvable : ligne comptée "skipped" et laissée telle quelle
 * - Pause `pause` entre deux lots pour ne pas saturer la base
 * - Fin quand un lot revient vide
 */

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::store::{SensorLinkStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error("backfill aborted in batch #{batch}: {source}")]
    Store {
        batch: u64,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillReport {
    pub total_updated: u64,
    pub total_skipped: u64,
    pub batches_processed: u64,
}

/// Premier token `CT<chiffres>.<chiffres>` du nom, casse ignorée, texte d'origine conservé.
pub fn extract_ct_token(name: &str) -> Option<&str> {
    let bytes = name.as_bytes();
    let digits_from = |mut i: usize| {
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        (i > start).then_some(i)
    };

    for start in 0..bytes.len().saturating_sub(1) {
        if !bytes[start].eq_ignore_ascii_case(&b'c') || !bytes[start + 1].eq_ignore_ascii_case(&b't') {
            continue;
        }
        let Some(dot) = digits_from(start + 2) else { continue };
        if bytes.get(dot) != Some(&b'.') {
            continue;
        }
        if let Some(end) = digits_from(dot + 1) {
            return Some(&name[start..end]);
        }
    }
    None
}

pub struct SensorLinkBackfill {
    store: Arc<dyn SensorLinkStore>,
    batch_size: usize,
    pause: Duration,
}

impl SensorLinkBackfill {
    pub fn new(store: Arc<dyn SensorLinkStore>, batch_size: usize, pause: Duration) -> Self {
        Self { store, batch_size: batch_size.max(1), pause }
    }

    pub async fn run(&self) -> Result<BackfillReport, BackfillError> {
        let mut report = BackfillReport::default();
        let mut cursor = 0_i64;
        let mut batch = 1_u64;
        info!(batch_size = self.batch_size, "[backfill] starting sensor link backfill");

        loop {
            let fail = |source| BackfillError::Store { batch, source };
            let rows = self.store.orphan_rows(cursor, self.batch_size).await.map_err(fail)?;
            if rows.is_empty() {
                info!("[backfill] all rows processed");
                break;
            }
            debug!(batch, rows = rows.len(), "[backfill] processing batch");

            let (mut updated, mut skipped) = (0_u64, 0_u64);
            for row in &rows {
                cursor = cursor.max(row.id);
                let Some(token) = row.sensor_name.as_deref().and_then(extract_ct_token) else {
                    skipped += 1;
                    continue;
                };
                match self.store.find_sensor_by_token(token).await.map_err(fail)? {
                    Some(sensor_id) => {
                        self.store.link_row(row.id, sensor_id).await.map_err(fail)?;
                        updated += 1;
                    }
                    None => skipped += 1,
                }
            }

            report.total_updated += updated;
            report.total_skipped += skipped;
            report.batches_processed = batch;
            info!(
                batch,
                updated,
                skipped,
                total_updated = report.total_updated,
                total_skipped = report.total_skipped,
                "[backfill] batch complete"
            );

            batch += 1;
            tokio::time::sleep(self.pause).await;
        }

        Ok(report)
    }
}
