//! Liveness monitor
//!
//! One task per registered storage server drives an explicit state machine:
//!
//! ```text
//! Registering --ok--> Alive --ping failure--> Dead --> Reregistering --ok--> Alive
//!      |                                                    |
//!      +--fail--> (registration rejected)                   +--fail--> Dead
//! ```
//!
//! Every tick of a fixed interval performs exactly one transition attempt.
//! There is no backoff and no retry limit: a dead server is redialed at the
//! same interval forever. The directory lock is only taken to publish a state
//! change, never across a network exchange.
//!
//! Each registration gets a generation from the directory. A monitor only
//! publishes under its own generation and stops once the volume has been
//! registered again, so a replaced loop can never touch the newer record.

use crate::common::protocol::{read_frame, write_frame, Frame, MessageType};
use crate::common::{Error, Result, VolumeId};
use crate::coordinator::directory::{Directory, ServerState};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};

/// Timing knobs for heartbeats
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSettings {
    /// Time between two transition attempts
    pub interval: Duration,
    /// Deadline for one dial or one request/reply exchange
    pub io_timeout: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            io_timeout: Duration::from_secs(5),
        }
    }
}

async fn with_deadline<T>(
    deadline: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Error::Network(format!("{}: {}", what, e))),
        Err(_) => Err(Error::Network(format!("{}: timed out after {:?}", what, deadline))),
    }
}

/// Heartbeat state machine for a single storage server
pub struct ServerMonitor {
    volume_id: VolumeId,
    address: String,
    heartbeat_addr: String,
    directory: Arc<Directory>,
    settings: HeartbeatSettings,
    state: ServerState,
    conn: Option<TcpStream>,
    generation: u64,
    superseded: bool,
}

impl ServerMonitor {
    pub fn new(
        volume_id: VolumeId,
        address: String,
        heartbeat_addr: String,
        directory: Arc<Directory>,
        settings: HeartbeatSettings,
    ) -> Self {
        Self {
            volume_id,
            address,
            heartbeat_addr,
            directory,
            settings,
            state: ServerState::Registering,
            conn: None,
            generation: 0,
            superseded: false,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// `false` once the volume was registered again by someone else
    pub fn is_current(&self) -> bool {
        !self.superseded
    }

    /// Dial, send `Register`, expect `Success`
    async fn handshake(&self) -> Result<TcpStream> {
        let mut conn = with_deadline(self.settings.io_timeout, "dial", async {
            TcpStream::connect(&self.heartbeat_addr)
                .await
                .map_err(Error::from)
        })
        .await?;

        let reply = with_deadline(self.settings.io_timeout, "register", async {
            write_frame(&mut conn, &Frame::register(&self.address)).await?;
            read_frame(&mut conn).await
        })
        .await?;

        if reply.kind != MessageType::Success {
            return Err(Error::Network(format!(
                "register answered with {:?}",
                reply.kind
            )));
        }
        Ok(conn)
    }

    async fn ping(&mut self) -> Result<()> {
        let deadline = self.settings.io_timeout;
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::Network("no heartbeat connection".into()))?;

        let reply = with_deadline(deadline, "ping", async {
            write_frame(&mut *conn, &Frame::ping()).await?;
            read_frame(&mut *conn).await
        })
        .await?;

        if !reply.is_ok() {
            return Err(Error::Network(format!(
                "ping answered with {:?} {:?}",
                reply.kind,
                String::from_utf8_lossy(&reply.payload)
            )));
        }
        Ok(())
    }

    fn transition(&mut self, state: ServerState) {
        self.state = state;
        if self.superseded {
            return;
        }
        let published = if state == ServerState::Alive {
            self.directory
                .record_heartbeat_for(&self.volume_id, self.generation)
        } else {
            self.directory
                .set_state_for(&self.volume_id, self.generation, state)
        };
        match published {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    "Volume {} was registered again, dropping monitor for {}",
                    self.volume_id,
                    self.address
                );
                self.superseded = true;
                self.conn = None;
            }
            Err(e) => {
                tracing::error!("Failed to publish state of volume {}: {}", self.volume_id, e)
            }
        }
    }

    /// First registration. On failure the server never becomes eligible.
    pub async fn register(&mut self) -> Result<()> {
        self.state = ServerState::Registering;
        let conn = self.handshake().await?;
        self.conn = Some(conn);
        self.generation = self.directory.register_monitored(
            self.volume_id,
            self.address.clone(),
            Some(self.heartbeat_addr.clone()),
        )?;
        self.superseded = false;
        self.state = ServerState::Alive;
        Ok(())
    }

    /// Perform one transition attempt and return the resulting state
    pub async fn step(&mut self) -> ServerState {
        match self.state {
            ServerState::Alive => match self.ping().await {
                Ok(()) => self.transition(ServerState::Alive),
                Err(e) => {
                    tracing::warn!(
                        "Volume {} at {} failed heartbeat: {}",
                        self.volume_id,
                        self.address,
                        e
                    );
                    self.conn = None;
                    self.transition(ServerState::Dead);
                }
            },
            ServerState::Registering | ServerState::Dead | ServerState::Reregistering => {
                self.transition(ServerState::Reregistering);
                match self.handshake().await {
                    Ok(conn) => {
                        self.conn = Some(conn);
                        self.transition(ServerState::Alive);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Volume {} at {} re-registration failed: {}",
                            self.volume_id,
                            self.address,
                            e
                        );
                        self.transition(ServerState::Dead);
                    }
                }
            }
        }
        self.state
    }

    /// Drive the state machine at the configured interval until the volume
    /// is registered again
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        while self.is_current() {
            ticker.tick().await;
            self.step().await;
        }
    }
}

/// Owns one monitor task per registered volume
pub struct LivenessMonitor {
    directory: Arc<Directory>,
    settings: HeartbeatSettings,
    tasks: Mutex<HashMap<VolumeId, JoinHandle<()>>>,
}

impl LivenessMonitor {
    pub fn new(directory: Arc<Directory>, settings: HeartbeatSettings) -> Self {
        Self {
            directory,
            settings,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Handshake with the server and start monitoring it.
    ///
    /// Registering an id that is already monitored replaces its task, so there
    /// is never more than one heartbeat loop per volume.
    pub async fn register(
        &self,
        volume_id: VolumeId,
        address: String,
        heartbeat_addr: String,
    ) -> Result<()> {
        let mut monitor = ServerMonitor::new(
            volume_id,
            address,
            heartbeat_addr,
            self.directory.clone(),
            self.settings,
        );
        monitor.register().await?;

        let handle = tokio::spawn(monitor.run());
        let previous = self
            .tasks
            .lock()
            .map_err(|_| Error::Internal("monitor table poisoned".into()))?
            .insert(volume_id, handle);
        if let Some(previous) = previous {
            tracing::debug!("Replacing heartbeat loop for volume {}", volume_id);
            previous.abort();
        }
        Ok(())
    }

    /// Stop monitoring `volume_id`, if it is monitored
    pub fn forget(&self, volume_id: &VolumeId) {
        let previous = self.tasks.lock().ok().and_then(|mut t| t.remove(volume_id));
        if let Some(handle) = previous {
            tracing::debug!("Stopping heartbeat loop for volume {}", volume_id);
            handle.abort();
        }
    }

    /// Number of running monitor tasks
    pub fn monitored(&self) -> usize {
        self.tasks
            .lock()
            .map(|t| t.values().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Stop every monitor task
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for (_, handle) in tasks.drain() {
                handle.abort();
            }
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
