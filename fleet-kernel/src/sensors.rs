use std::collections::HashMap;

use crate::models::{Sensor, SensorId, VesselId};

pub type SensorMap = HashMap<VesselId, Vec<SensorId>>;

/// Regroupe les identifiants de capteurs par navire propriétaire.
/// Pas d'ordre garanti dans un groupe, pas de dédoublonnage.
pub fn group_by_vessel(sensors: &[Sensor]) -> SensorMap {
    let mut map = SensorMap::new();
    for sensor in sensors {
        map.entry(sensor.vessel_id).or_default().push(sensor.sensor_id);
    }
    map
}

/// Capteurs d'un navire, slice vide s'il n'en a aucun.
pub fn sensors_of(map: &SensorMap, vessel_id: VesselId) -> &[SensorId] {
    map.get(&vessel_id).map(Vec::as_slice).unwrap_or(&[])
}
