//! Entity types shared by the store, broadcaster and orchestrator

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Icon hint for call-station entities
pub const STATION_ICON: &str = "mdi:video-account";

/// Icon hint for the broker status entity
pub const BROKER_STATUS_ICON: &str = "mdi:video-switch";

/// Entity id of the synthetic broker status entity
pub const BROKER_STATUS_ID: &str = "broker_status";

/// Domain of camera-like devices
pub const CAMERA_DOMAIN: &str = "camera";

/// Domain of player-like devices
pub const MEDIA_PLAYER_DOMAIN: &str = "media_player";

/// Current UTC time as RFC 3339
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// An externally supplied device entity
///
/// Each ingest replaces the stored record with the same `entity_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaEntity {
    pub entity_id: String,
    pub domain: String,
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default = "default_available")]
    pub available: bool,
    /// RFC 3339; filled with the ingest time when empty
    #[serde(default)]
    pub last_updated: String,
}

fn default_available() -> bool {
    true
}

/// Call state of a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    #[default]
    Idle,
    Calling,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallState::Idle => write!(f, "idle"),
            CallState::Calling => write!(f, "calling"),
        }
    }
}

/// A camera + media player pairing derived from station configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallStation {
    pub station_id: String,
    pub name: String,
    pub camera_entity_id: String,
    pub media_player_entity_id: String,
    pub state: CallState,
    pub available: bool,
}

impl CallStation {
    pub fn attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("camera_entity".to_string(), self.camera_entity_id.clone()),
            (
                "media_player_entity".to_string(),
                self.media_player_entity_id.clone(),
            ),
            ("station_type".to_string(), "call_station".to_string()),
        ])
    }
}

/// Kind of outbound broker entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerEntityType {
    CallStation,
    BrokerStatus,
}

/// Outbound entity record pushed to stream subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerEntityUpdate {
    pub entity_id: String,
    pub name: String,
    pub entity_type: BrokerEntityType,
    pub state: String,
    pub attributes: BTreeMap<String, String>,
    pub icon: String,
    pub available: bool,
    pub capabilities: Vec<String>,
    pub last_updated: String,
}

impl From<&CallStation> for BrokerEntityUpdate {
    fn from(station: &CallStation) -> Self {
        Self {
            entity_id: station.station_id.clone(),
            name: station.name.clone(),
            entity_type: BrokerEntityType::CallStation,
            state: station.state.to_string(),
            attributes: station.attributes(),
            icon: STATION_ICON.to_string(),
            available: station.available,
            capabilities: vec!["make_call".to_string()],
            last_updated: now_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_defaults_from_json() {
        let entity: HaEntity = serde_json::from_str(
            r#"{"entity_id": "camera.door", "domain": "camera", "name": "Door"}"#,
        )
        .unwrap();

        assert!(entity.available);
        assert!(entity.attributes.is_empty());
        assert_eq!(entity.state, "");
    }

    #[test]
    fn test_station_update() {
        let station = CallStation {
            station_id: "kitchen".to_string(),
            name: "Kitchen".to_string(),
            camera_entity_id: "camera.kitchen".to_string(),
            media_player_entity_id: "media_player.kitchen".to_string(),
            state: CallState::Calling,
            available: true,
        };

        let update = BrokerEntityUpdate::from(&station);

        assert_eq!(update.entity_id, "kitchen");
        assert_eq!(update.entity_type, BrokerEntityType::CallStation);
        assert_eq!(update.state, "calling");
        assert_eq!(update.icon, "mdi:video-account");
        assert_eq!(update.capabilities, vec!["make_call"]);
        assert_eq!(update.attributes["camera_entity"], "camera.kitchen");
        assert_eq!(update.attributes["station_type"], "call_station");
        assert!(!update.last_updated.is_empty());
    }

    #[test]
    fn test_entity_type_serialization() {
        let json = serde_json::to_string(&BrokerEntityType::BrokerStatus).unwrap();
        assert_eq!(json, "\"broker_status\"");
        assert_eq!(CallState::Idle.to_string(), "idle");
    }
}
