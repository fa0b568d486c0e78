//! Call-station configuration sources
//!
//! The entity store pulls the configured stations from a [`StationSource`]
//! on every recomputation pass.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Deserialize;

use crate::errors::{BrokerError, BrokerResult};

/// One configured call station
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StationConfig {
    pub station_id: String,
    pub display_name: String,
    pub camera_entity_id: String,
    pub media_player_entity_id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Pull source for configured stations
pub trait StationSource: Send + Sync {
    fn load(&self) -> BrokerResult<Vec<StationConfig>>;
}

/// Stations read from a YAML file on every load
///
/// ```yaml
/// stations:
///   - station_id: "kitchen"
///     display_name: "Kitchen"
///     camera_entity_id: "camera.kitchen"
///     media_player_entity_id: "media_player.kitchen_display"
///     enabled: true
/// ```
#[derive(Debug, Clone)]
pub struct YamlStationSource {
    path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StationsFile {
    stations: Vec<StationConfig>,
}

impl YamlStationSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StationSource for YamlStationSource {
    fn load(&self) -> BrokerResult<Vec<StationConfig>> {
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| BrokerError::StationSourceIo {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let file: StationsFile = serde_yaml::from_str(&contents)
            .map_err(|e| BrokerError::StationSourceParse(e.to_string()))?;
        Ok(file.stations)
    }
}

/// In-memory station list
#[derive(Debug, Default)]
pub struct StaticStationSource {
    stations: RwLock<Vec<StationConfig>>,
}

impl StaticStationSource {
    pub fn new(stations: Vec<StationConfig>) -> Self {
        Self {
            stations: RwLock::new(stations),
        }
    }

    /// Replace the whole list; takes effect on the next recomputation
    pub fn replace(&self, stations: Vec<StationConfig>) {
        *self.stations.write() = stations;
    }
}

impl StationSource for StaticStationSource {
    fn load(&self) -> BrokerResult<Vec<StationConfig>> {
        Ok(self.stations.read().clone())
    }
}
