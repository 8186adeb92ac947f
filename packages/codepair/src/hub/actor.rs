//! Hub actor
//!
//! One tokio task owns the [`SessionHub`] and handles commands in arrival
//! order. Cleanup deadlines are folded into the same loop, so a fire-time
//! check never races a join or an edit.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use super::engine::{HubConfig, HubStats, SessionHub};
use super::membership::{Departure, JoinOutcome};
use super::router::{Delivery, Outbox};
use super::session::SessionSnapshot;
use crate::error::HubError;
use crate::metrics::ServerMetrics;

/// Commands that can be sent to the hub actor
#[derive(Debug)]
pub enum HubCommand {
    CreateSession {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    GetSession {
        session_id: String,
        respond_to: oneshot::Sender<Result<SessionSnapshot, HubError>>,
    },
    Connect {
        connection_id: String,
        outbox: Outbox,
        respond_to: oneshot::Sender<()>,
    },
    Join {
        connection_id: String,
        session_id: String,
        display_name: Option<String>,
        respond_to: oneshot::Sender<Result<JoinOutcome, HubError>>,
    },
    ContentChange {
        connection_id: String,
        session_id: String,
        content: String,
        respond_to: oneshot::Sender<Result<Delivery, HubError>>,
    },
    ModeChange {
        connection_id: String,
        session_id: String,
        mode: String,
        respond_to: oneshot::Sender<Result<Delivery, HubError>>,
    },
    Leave {
        connection_id: String,
        session_id: String,
        respond_to: oneshot::Sender<Option<Departure>>,
    },
    Disconnect {
        connection_id: String,
        respond_to: oneshot::Sender<Vec<Departure>>,
    },
    Stats {
        respond_to: oneshot::Sender<HubStats>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to communicate with the hub actor
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> HubCommand,
    ) -> Result<R, HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| HubError::HubUnavailable)?;
        rx.await.map_err(|_| HubError::HubUnavailable)
    }

    pub async fn create_session(&self) -> Result<SessionSnapshot, HubError> {
        self.request(|respond_to| HubCommand::CreateSession { respond_to })
            .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionSnapshot, HubError> {
        self.request(|respond_to| HubCommand::GetSession {
            session_id: session_id.to_string(),
            respond_to,
        })
        .await?
    }

    pub async fn connect(&self, connection_id: &str, outbox: Outbox) -> Result<(), HubError> {
        self.request(|respond_to| HubCommand::Connect {
            connection_id: connection_id.to_string(),
            outbox,
            respond_to,
        })
        .await
    }

    pub async fn join(
        &self,
        connection_id: &str,
        session_id: &str,
        display_name: Option<String>,
    ) -> Result<JoinOutcome, HubError> {
        self.request(|respond_to| HubCommand::Join {
            connection_id: connection_id.to_string(),
            session_id: session_id.to_string(),
            display_name,
            respond_to,
        })
        .await?
    }

    pub async fn change_content(
        &self,
        connection_id: &str,
        session_id: &str,
        content: String,
    ) -> Result<Delivery, HubError> {
        self.request(|respond_to| HubCommand::ContentChange {
            connection_id: connection_id.to_string(),
            session_id: session_id.to_string(),
            content,
            respond_to,
        })
        .await?
    }

    pub async fn change_mode(
        &self,
        connection_id: &str,
        session_id: &str,
        mode: String,
    ) -> Result<Delivery, HubError> {
        self.request(|respond_to| HubCommand::ModeChange {
            connection_id: connection_id.to_string(),
            session_id: session_id.to_string(),
            mode,
            respond_to,
        })
        .await?
    }

    pub async fn leave(
        &self,
        connection_id: &str,
        session_id: &str,
    ) -> Result<Option<Departure>, HubError> {
        self.request(|respond_to| HubCommand::Leave {
            connection_id: connection_id.to_string(),
            session_id: session_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn disconnect(&self, connection_id: &str) -> Result<Vec<Departure>, HubError> {
        self.request(|respond_to| HubCommand::Disconnect {
            connection_id: connection_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.request(|respond_to| HubCommand::Stats { respond_to })
            .await
    }

    /// Stop the actor. The session store is dropped with it.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.request(|respond_to| HubCommand::Shutdown { respond_to })
            .await
    }
}

struct HubActor {
    hub: SessionHub,
    receiver: mpsc::Receiver<HubCommand>,
}

impl HubActor {
    async fn run(mut self) {
        info!("Session hub started");

        loop {
            let deadline = self.hub.next_cleanup();
            let cmd = tokio::select! {
                cmd = self.receiver.recv() => cmd,
                _ = wait_until(deadline) => {
                    self.hub.reap_due(Instant::now());
                    continue;
                }
            };

            let Some(cmd) = cmd else {
                debug!("All hub handles dropped");
                break;
            };

            // Anything already due is settled before the command sees the store.
            self.hub.reap_due(Instant::now());

            if !self.handle(cmd) {
                break;
            }
        }

        if self.hub.is_idle() {
            info!("Session hub stopped");
        } else {
            let remaining = self.hub.session_ids();
            info!(
                "Session hub stopped ({} live session(s) discarded)",
                remaining.len()
            );
            debug!("Discarded sessions: {:?}", remaining);
        }
    }

    /// Returns false when the actor should stop.
    fn handle(&mut self, cmd: HubCommand) -> bool {
        match cmd {
            HubCommand::CreateSession { respond_to } => {
                let _ = respond_to.send(self.hub.create_session());
            }

            HubCommand::GetSession {
                session_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.hub.get_session(&session_id));
            }

            HubCommand::Connect {
                connection_id,
                outbox,
                respond_to,
            } => {
                self.hub.connect(&connection_id, outbox);
                let _ = respond_to.send(());
            }

            HubCommand::Join {
                connection_id,
                session_id,
                display_name,
                respond_to,
            } => {
                let result = self
                    .hub
                    .join(&connection_id, &session_id, display_name.as_deref());
                let _ = respond_to.send(result);
            }

            HubCommand::ContentChange {
                connection_id,
                session_id,
                content,
                respond_to,
            } => {
                let result = self
                    .hub
                    .content_change(&connection_id, &session_id, content);
                let _ = respond_to.send(result);
            }

            HubCommand::ModeChange {
                connection_id,
                session_id,
                mode,
                respond_to,
            } => {
                let result = self.hub.mode_change(&connection_id, &session_id, mode);
                let _ = respond_to.send(result);
            }

            HubCommand::Leave {
                connection_id,
                session_id,
                respond_to,
            } => {
                let departure = self
                    .hub
                    .leave_session(&connection_id, &session_id, Instant::now());
                let _ = respond_to.send(departure);
            }

            HubCommand::Disconnect {
                connection_id,
                respond_to,
            } => {
                let departures = self.hub.disconnect(&connection_id, Instant::now());
                let _ = respond_to.send(departures);
            }

            HubCommand::Stats { respond_to } => {
                let _ = respond_to.send(self.hub.stats());
            }

            HubCommand::Shutdown { respond_to } => {
                debug!("Stopping session hub");
                let _ = respond_to.send(());
                return false;
            }
        }
        true
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Spawn the hub actor and return its handle
pub fn spawn_hub(config: HubConfig, capacity: usize, metrics: Arc<ServerMetrics>) -> HubHandle {
    let (sender, receiver) = mpsc::channel(capacity);
    let actor = HubActor {
        hub: SessionHub::new(config, metrics),
        receiver,
    };

    tokio::spawn(async move {
        actor.run().await;
    });

    HubHandle { sender }
}
