//! Entity Store
//!
//! Holds the ingested device entities and the derived call stations. Every
//! ingest re-reads the station configuration and recomputes the station set;
//! subscribers are notified only when that set actually changed.
//!
//! Broadcasts and snapshot subscriptions run under the store lock, so a new
//! subscriber never misses or duplicates an update relative to its snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::broadcast::{Broadcaster, EntitySubscription};
use super::entities::{
    BROKER_STATUS_ICON, BROKER_STATUS_ID, BrokerEntityType, BrokerEntityUpdate, CAMERA_DOMAIN,
    CallState, CallStation, HaEntity, MEDIA_PLAYER_DOMAIN, now_rfc3339,
};
use super::stations::StationSource;
use crate::errors::{BrokerError, BrokerResult};

/// Broker liveness report
#[derive(Debug, Clone, Serialize)]
pub struct BrokerHealth {
    pub healthy: bool,
    pub message: String,
    pub timestamp: String,
}

/// Why a station could not enter a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationUnavailable {
    NotFound,
    Unavailable,
    Busy,
}

#[derive(Default)]
struct StoreState {
    entities: HashMap<String, HaEntity>,
    stations: BTreeMap<String, CallStation>,
}

/// Device inventory, derived call stations and their subscribers
pub struct EntityStore {
    state: Mutex<StoreState>,
    source: Arc<dyn StationSource>,
    broadcaster: Broadcaster,
    started: Instant,
}

impl EntityStore {
    pub fn new(source: Arc<dyn StationSource>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            source,
            broadcaster: Broadcaster::new(),
            started: Instant::now(),
        }
    }

    /// Store an entity update and recompute stations
    ///
    /// Returns `true` if the station set changed and was broadcast.
    pub fn ingest(&self, mut entity: HaEntity) -> bool {
        if entity.last_updated.is_empty() {
            entity.last_updated = now_rfc3339();
        }
        debug!(
            entity_id = %entity.entity_id,
            domain = %entity.domain,
            state = %entity.state,
            available = entity.available,
            "Received entity update"
        );

        self.state
            .lock()
            .entities
            .insert(entity.entity_id.clone(), entity);

        self.recompute()
    }

    /// Re-derive the station set from configuration and entity availability
    ///
    /// A station that survives keeps its call state. If the source cannot
    /// be read the previous set stays in place. Returns `true` if the set
    /// changed and was broadcast.
    pub fn recompute(&self) -> bool {
        let configs = match self.source.load() {
            Ok(configs) => configs,
            Err(e) => {
                warn!(error = %e, "Failed to load call stations, keeping previous set");
                return false;
            }
        };

        let mut state = self.state.lock();

        let is_available = |entity_id: &str| {
            state
                .entities
                .get(entity_id)
                .map(|entity| entity.available)
                .unwrap_or(false)
        };

        let stations: BTreeMap<String, CallStation> = configs
            .into_iter()
            .map(|config| {
                let available = config.enabled
                    && is_available(&config.camera_entity_id)
                    && is_available(&config.media_player_entity_id);
                let call_state = state
                    .stations
                    .get(&config.station_id)
                    .map(|existing| existing.state)
                    .unwrap_or_default();

                let station = CallStation {
                    station_id: config.station_id.clone(),
                    name: config.display_name,
                    camera_entity_id: config.camera_entity_id,
                    media_player_entity_id: config.media_player_entity_id,
                    state: call_state,
                    available,
                };
                (config.station_id, station)
            })
            .collect();

        if stations == state.stations {
            return false;
        }

        state.stations = stations;
        info!(count = state.stations.len(), "Updated call stations");
        self.broadcast_locked(&state);
        true
    }

    /// Subscribe to the entity stream
    ///
    /// The queue starts with every call station followed by the broker
    /// status entity, then receives each later broadcast.
    pub fn subscribe(&self) -> EntitySubscription {
        let state = self.state.lock();
        let mut snapshot: Vec<BrokerEntityUpdate> =
            state.stations.values().map(BrokerEntityUpdate::from).collect();
        snapshot.push(self.status_for(&state));
        self.broadcaster.subscribe(snapshot)
    }

    /// Push the current station set to every subscriber
    pub fn broadcast(&self) -> usize {
        let state = self.state.lock();
        self.broadcast_locked(&state)
    }

    fn broadcast_locked(&self, state: &StoreState) -> usize {
        let updates: Vec<BrokerEntityUpdate> =
            state.stations.values().map(BrokerEntityUpdate::from).collect();
        self.broadcaster.broadcast(&updates)
    }

    /// Move an idle, available station into `calling` and broadcast
    pub fn begin_call(&self, station_id: &str) -> Result<CallStation, StationUnavailable> {
        let mut state = self.state.lock();
        let station = state
            .stations
            .get_mut(station_id)
            .ok_or(StationUnavailable::NotFound)?;

        if !station.available {
            return Err(StationUnavailable::Unavailable);
        }
        if station.state != CallState::Idle {
            return Err(StationUnavailable::Busy);
        }

        station.state = CallState::Calling;
        let station = station.clone();
        self.broadcast_locked(&state);
        Ok(station)
    }

    /// Set a station's call state and broadcast if it changed
    pub fn set_station_state(&self, station_id: &str, call_state: CallState) -> BrokerResult<()> {
        let mut state = self.state.lock();
        let station = state
            .stations
            .get_mut(station_id)
            .ok_or_else(|| BrokerError::StationNotFound(station_id.to_string()))?;

        if station.state != call_state {
            station.state = call_state;
            self.broadcast_locked(&state);
        }
        Ok(())
    }

    pub fn station(&self, station_id: &str) -> Option<CallStation> {
        self.state.lock().stations.get(station_id).cloned()
    }

    /// Every station, ordered by id
    pub fn stations(&self) -> Vec<CallStation> {
        self.state.lock().stations.values().cloned().collect()
    }

    pub fn entity(&self, entity_id: &str) -> Option<HaEntity> {
        self.state.lock().entities.get(entity_id).cloned()
    }

    /// The synthetic broker status entity
    pub fn broker_status(&self) -> BrokerEntityUpdate {
        let state = self.state.lock();
        self.status_for(&state)
    }

    fn status_for(&self, state: &StoreState) -> BrokerEntityUpdate {
        let count_domain = |domain: &str| {
            state
                .entities
                .values()
                .filter(|entity| entity.domain == domain)
                .count()
        };

        let attributes = BTreeMap::from([
            (
                "monitored_cameras".to_string(),
                count_domain(CAMERA_DOMAIN).to_string(),
            ),
            (
                "monitored_players".to_string(),
                count_domain(MEDIA_PLAYER_DOMAIN).to_string(),
            ),
            (
                "call_stations".to_string(),
                state.stations.len().to_string(),
            ),
            (
                "uptime_seconds".to_string(),
                self.started.elapsed().as_secs().to_string(),
            ),
        ]);

        BrokerEntityUpdate {
            entity_id: BROKER_STATUS_ID.to_string(),
            name: "Call Assist Broker".to_string(),
            entity_type: BrokerEntityType::BrokerStatus,
            state: "online".to_string(),
            attributes,
            icon: BROKER_STATUS_ICON.to_string(),
            available: true,
            capabilities: Vec::new(),
            last_updated: now_rfc3339(),
        }
    }

    pub fn health(&self) -> BrokerHealth {
        BrokerHealth {
            healthy: true,
            message: format!(
                "Broker running for {} seconds",
                self.started.elapsed().as_secs()
            ),
            timestamp: now_rfc3339(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }
}
