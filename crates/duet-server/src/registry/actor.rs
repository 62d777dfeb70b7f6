//! Registry actor: a single task owns the [`Registry`] and applies commands
//! strictly in arrival order. Connection tasks talk to it through a
//! cloneable [`RegistryHandle`].

use std::sync::Arc;

use duet_core::{ClientEvent, ClientId, Session};
use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::{Dispatch, Registry};
use crate::errors::RegistryError;
use crate::metrics::{SESSIONS_ACTIVE, VALUE_UPDATES_TOTAL, WS_REJECTIONS_TOTAL};
use crate::websocket::connection::ClientConnection;

/// Default command queue depth.
pub const DEFAULT_COMMAND_BUFFER: usize = 1024;

/// Point-in-time view of the registry.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    /// Live sessions, oldest first.
    pub sessions: Vec<Session>,
    /// Session cap.
    pub capacity: usize,
}

impl RegistrySnapshot {
    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

/// Commands processed by the registry actor.
pub enum RegistryCommand {
    /// A new connection asks to be admitted.
    Connect {
        /// Outbound half of the connection.
        connection: Arc<ClientConnection>,
        /// Admission outcome.
        reply: oneshot::Sender<Result<Session, duet_core::AdmissionError>>,
    },
    /// A decoded event from an admitted connection.
    Event {
        /// Sender.
        client_id: ClientId,
        /// The event.
        event: ClientEvent,
    },
    /// The connection closed.
    Disconnect {
        /// Closing connection.
        client_id: ClientId,
        /// Receives the removed session, if any.
        reply: oneshot::Sender<Option<Session>>,
    },
    /// Read-only query.
    Snapshot {
        /// Receives the snapshot.
        reply: oneshot::Sender<RegistrySnapshot>,
    },
}

/// Cloneable handle to the registry actor.
#[derive(Clone, Debug)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Ask the registry to admit `connection`.
    pub async fn connect(&self, connection: Arc<ClientConnection>) -> Result<Session, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Connect { connection, reply }).await?;
        rx.await
            .map_err(|_| RegistryError::Closed)?
            .map_err(RegistryError::Rejected)
    }

    /// Forward an event from `client_id`. Does not wait for it to be applied.
    pub async fn dispatch(&self, client_id: ClientId, event: ClientEvent) -> Result<(), RegistryError> {
        self.send(RegistryCommand::Event { client_id, event }).await
    }

    /// Remove `client_id`, waiting until the removal is applied.
    pub async fn disconnect(&self, client_id: ClientId) -> Result<Option<Session>, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Disconnect { client_id, reply }).await?;
        rx.await.map_err(|_| RegistryError::Closed)
    }

    /// Take a snapshot of all live sessions.
    pub async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| RegistryError::Closed)
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> Result<usize, RegistryError> {
        Ok(self.snapshot().await?.count())
    }

    async fn send(&self, command: RegistryCommand) -> Result<(), RegistryError> {
        self.tx.send(command).await.map_err(|_| RegistryError::Closed)
    }
}

/// Owns the registry and its command queue.
pub struct RegistryActor {
    registry: Registry,
    rx: mpsc::Receiver<RegistryCommand>,
}

impl RegistryActor {
    /// Create an actor and its handle.
    pub fn new(buffer: usize) -> (Self, RegistryHandle) {
        let (tx, rx) = mpsc::channel(buffer);
        let actor = Self {
            registry: Registry::new(),
            rx,
        };
        (actor, RegistryHandle { tx })
    }

    /// Process commands until every handle is dropped.
    pub async fn run(mut self) {
        debug!(capacity = self.registry.capacity(), "registry actor started");
        while let Some(command) = self.rx.recv().await {
            self.apply(command);
        }
        debug!("registry actor stopped");
    }

    fn apply(&mut self, command: RegistryCommand) {
        match command {
            RegistryCommand::Connect { connection, reply } => {
                let client_id = connection.id.clone();
                let outcome = self.registry.admit(connection).cloned();
                match &outcome {
                    Ok(_) => self.record_count(),
                    Err(e) => {
                        info!(client_id = %client_id, reason = e.kind(), sessions = self.registry.count(), "connection not admitted");
                        counter!(WS_REJECTIONS_TOTAL, "reason" => e.kind()).increment(1);
                    }
                }
                if reply.send(outcome).is_err() {
                    // Caller went away before hearing back; undo the admission.
                    if self.registry.remove(&client_id).is_some() {
                        self.record_count();
                    }
                }
            }
            RegistryCommand::Event { client_id, event } => {
                let name = event.name();
                match self.registry.handle_event(&client_id, event) {
                    Dispatch::Replied { delivered } => {
                        debug!(client_id = %client_id, event = name, delivered, "replied");
                    }
                    Dispatch::Relayed {
                        recipients,
                        delivered,
                    } => {
                        counter!(VALUE_UPDATES_TOTAL).increment(1);
                        debug!(client_id = %client_id, recipients, delivered, "value relayed");
                    }
                    Dispatch::UnknownSender => {
                        warn!(client_id = %client_id, event = name, "event from client without a session");
                    }
                }
            }
            RegistryCommand::Disconnect { client_id, reply } => {
                let removed = self.registry.remove(&client_id);
                if removed.is_some() {
                    self.record_count();
                }
                let _ = reply.send(removed);
            }
            RegistryCommand::Snapshot { reply } => {
                let _ = reply.send(RegistrySnapshot {
                    sessions: self.registry.sessions(),
                    capacity: self.registry.capacity(),
                });
            }
        }
    }

    fn record_count(&self) {
        gauge!(SESSIONS_ACTIVE).set(self.registry.count() as f64);
    }
}

/// Spawn the registry actor on the current runtime.
pub fn spawn_registry(buffer: usize) -> (RegistryHandle, JoinHandle<()>) {
    let (actor, handle) = RegistryActor::new(buffer);
    let task = tokio::spawn(actor.run());
    (handle, task)
}
