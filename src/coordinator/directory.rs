//! Directory: volume id → serving address
//!
//! Records are ephemeral. Nothing is persisted; after a restart the
//! directory is empty until storage servers register again.

use crate::common::{Error, Result, VolumeId};
use crate::coordinator::placement::{PlacementPolicy, RandomPlacement};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Liveness of a registered server as seen by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Registering,
    Alive,
    Dead,
    Reregistering,
}

impl ServerState {
    /// May new writes be placed on this server?
    pub fn is_eligible(&self) -> bool {
        matches!(self, ServerState::Alive)
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerState::Registering => write!(f, "registering"),
            ServerState::Alive => write!(f, "alive"),
            ServerState::Dead => write!(f, "dead"),
            ServerState::Reregistering => write!(f, "reregistering"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub volume_id: VolumeId,
    pub address: String,
    pub state: ServerState,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Set when the server is watched by the liveness monitor
    pub heartbeat_addr: Option<String>,
    /// Bumped by every registration of this volume id
    #[serde(skip)]
    pub generation: u64,
}

pub struct Directory {
    servers: RwLock<HashMap<VolumeId, ServerRecord>>,
    placement: Box<dyn PlacementPolicy>,
    generations: AtomicU64,
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Internal("directory lock poisoned".into())
}

impl Default for Directory {
    fn default() -> Self {
        Self::new(Box::new(RandomPlacement))
    }
}

impl Directory {
    pub fn new(placement: Box<dyn PlacementPolicy>) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            placement,
            generations: AtomicU64::new(0),
        }
    }

    /// Upsert `id → address`. Last write wins; the record becomes eligible.
    pub fn register_volume(&self, id: VolumeId, address: impl Into<String>) -> Result<()> {
        self.register_monitored(id, address, None).map(|_| ())
    }

    /// `register_volume` that also records where heartbeats are sent.
    ///
    /// Returns the generation of the new record. Only the holder of the
    /// current generation may publish liveness changes for it.
    pub fn register_monitored(
        &self,
        id: VolumeId,
        address: impl Into<String>,
        heartbeat_addr: Option<String>,
    ) -> Result<u64> {
        let address = address.into();
        let mut servers = self.servers.write().map_err(poisoned)?;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!("Volume {} registered at {}", id, address);
        servers.insert(
            id,
            ServerRecord {
                volume_id: id,
                address,
                state: ServerState::Alive,
                last_heartbeat: Some(Utc::now()),
                heartbeat_addr,
                generation,
            },
        );
        Ok(generation)
    }

    /// Pick a volume for a new write among the eligible servers
    pub fn assign_volume(&self) -> Result<(VolumeId, String)> {
        let servers = self.servers.read().map_err(poisoned)?;
        let eligible: Vec<VolumeId> = servers
            .values()
            .filter(|r| r.state.is_eligible())
            .map(|r| r.volume_id)
            .collect();

        let chosen = self
            .placement
            .choose(&eligible)
            .ok_or_else(|| Error::Unavailable("no volume servers available".into()))?;
        let record = servers
            .get(&chosen)
            .ok_or_else(|| Error::Internal(format!("placement chose unknown volume {}", chosen)))?;

        Ok((chosen, record.address.clone()))
    }

    /// Serving address of a registered volume, alive or not
    pub fn get_volume_location(&self, id: &VolumeId) -> Result<String> {
        self.servers
            .read()
            .map_err(poisoned)?
            .get(id)
            .map(|r| r.address.clone())
            .ok_or_else(|| Error::NotFound(format!("volume {}", id)))
    }

    /// Move a record to `state`. Returns the previous state.
    pub fn set_state(&self, id: &VolumeId, state: ServerState) -> Result<ServerState> {
        let mut servers = self.servers.write().map_err(poisoned)?;
        let record = servers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("volume {}", id)))?;
        let previous = std::mem::replace(&mut record.state, state);
        if previous != state {
            tracing::info!("Volume {} at {}: {} -> {}", id, record.address, previous, state);
        }
        Ok(previous)
    }

    /// Successful ping: refresh the timestamp and make the record eligible
    pub fn record_heartbeat(&self, id: &VolumeId) -> Result<()> {
        let mut servers = self.servers.write().map_err(poisoned)?;
        let record = servers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("volume {}", id)))?;
        record.last_heartbeat = Some(Utc::now());
        record.state = ServerState::Alive;
        Ok(())
    }

    /// `set_state` from the monitor holding `generation`. Returns `false`,
    /// leaving the record untouched, once a newer registration replaced it.
    pub fn set_state_for(
        &self,
        id: &VolumeId,
        generation: u64,
        state: ServerState,
    ) -> Result<bool> {
        let mut servers = self.servers.write().map_err(poisoned)?;
        let record = servers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("volume {}", id)))?;
        if record.generation != generation {
            return Ok(false);
        }
        let previous = std::mem::replace(&mut record.state, state);
        if previous != state {
            tracing::info!("Volume {} at {}: {} -> {}", id, record.address, previous, state);
        }
        Ok(true)
    }

    /// `record_heartbeat` from the monitor holding `generation`
    pub fn record_heartbeat_for(&self, id: &VolumeId, generation: u64) -> Result<bool> {
        let mut servers = self.servers.write().map_err(poisoned)?;
        let record = servers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("volume {}", id)))?;
        if record.generation != generation {
            return Ok(false);
        }
        record.last_heartbeat = Some(Utc::now());
        record.state = ServerState::Alive;
        Ok(true)
    }

    pub fn state(&self, id: &VolumeId) -> Result<ServerState> {
        self.servers
            .read()
            .map_err(poisoned)?
            .get(id)
            .map(|r| r.state)
            .ok_or_else(|| Error::NotFound(format!("volume {}", id)))
    }

    /// Snapshot of every record, sorted by volume id
    pub fn servers(&self) -> Result<Vec<ServerRecord>> {
        let mut records: Vec<_> = self
            .servers
            .read()
            .map_err(poisoned)?
            .values()
            .cloned()
            .collect();
        records.sort_by_key(|r| r.volume_id);
        Ok(records)
    }

    pub fn placement_name(&self) -> &'static str {
        self.placement.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_directory_is_unavailable() {
        let directory = Directory::default();
        assert!(matches!(
            directory.assign_volume(),
            Err(Error::Unavailable(_))
        ));
    }

    #[test]
    fn test_single_volume_always_assigned() {
        let directory = Directory::default();
        let v = VolumeId::generate();
        directory.register_volume(v, "host:1").unwrap();

        for _ in 0..20 {
            assert_eq!(directory.assign_volume().unwrap(), (v, "host:1".to_string()));
        }
        assert_eq!(directory.get_volume_location(&v).unwrap(), "host:1");
        assert!(matches!(
            directory.get_volume_location(&VolumeId::generate()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_register_is_last_write_wins() {
        let directory = Directory::default();
        let v = VolumeId::generate();
        directory.register_volume(v, "host:1").unwrap();
        directory.register_volume(v, "host:2").unwrap();
        directory.register_volume(v, "host:2").unwrap();

        assert_eq!(directory.servers().unwrap().len(), 1);
        assert_eq!(directory.get_volume_location(&v).unwrap(), "host:2");
    }

    #[test]
    fn test_dead_servers_are_not_assigned() {
        let directory = Directory::default();
        let alive = VolumeId::generate();
        let dead = VolumeId::generate();
        directory.register_volume(alive, "host:1").unwrap();
        directory.register_volume(dead, "host:2").unwrap();

        directory.set_state(&dead, ServerState::Dead).unwrap();
        for _ in 0..50 {
            assert_eq!(directory.assign_volume().unwrap().0, alive);
        }
        // lookups still resolve
        assert_eq!(directory.get_volume_location(&dead).unwrap(), "host:2");

        directory.set_state(&alive, ServerState::Reregistering).unwrap();
        assert!(matches!(
            directory.assign_volume(),
            Err(Error::Unavailable(_))
        ));

        directory.record_heartbeat(&dead).unwrap();
        assert_eq!(directory.assign_volume().unwrap().0, dead);
    }

    #[test]
    fn test_stale_generation_cannot_publish() {
        let directory = Directory::default();
        let v = VolumeId::generate();
        let old = directory
            .register_monitored(v, "host:1", Some("host:9".into()))
            .unwrap();
        directory.register_volume(v, "host:2").unwrap();

        assert!(!directory.set_state_for(&v, old, ServerState::Dead).unwrap());
        assert!(!directory.record_heartbeat_for(&v, old).unwrap());
        assert_eq!(directory.state(&v).unwrap(), ServerState::Alive);
        assert_eq!(directory.assign_volume().unwrap(), (v, "host:2".to_string()));

        let current = directory.register_monitored(v, "host:3", None).unwrap();
        assert!(current > old);
        assert!(directory.set_state_for(&v, current, ServerState::Dead).unwrap());
        assert_eq!(directory.state(&v).unwrap(), ServerState::Dead);
    }

    #[test]
    fn test_set_state_unknown_volume() {
        let directory = Directory::default();
        assert!(matches!(
            directory.set_state(&VolumeId::generate(), ServerState::Dead),
            Err(Error::NotFound(_))
        ));
    }
}
