//! Node actor: the single owner of a MeshCore and its transport.
//!
//! User commands and transport events share one ordered queue, so every state
//! change happens on the actor task. Notifications leave on a separate channel
//! and never block the actor.

use meshlink_core::transport::execute;
use meshlink_core::{
    ChannelStats, MeshCore, Message, Notification, OutboundAction, PeerId, PeerIdentity, Role,
    TransportCommand, TransportEvent, TransportProvider,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Request from the presentation layer.
#[derive(Debug)]
pub enum Command {
    StartBrowsing,
    StartAdvertising,
    StopAll,
    DisconnectAll,
    /// Cancel connections and go back to browsing.
    Reset,
    /// Leave the session and advertise.
    Connect,
    Send { text: String, to: Vec<PeerId> },
    Broadcast(String),
    SendGreeting,
    Status(oneshot::Sender<NodeStatus>),
    Shutdown,
}

/// Snapshot of the actor's state.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub identity: PeerIdentity,
    pub role: Role,
    pub connected: Vec<PeerIdentity>,
    pub stats: ChannelStats,
}

enum Input {
    Command(Command),
    Transport(TransportEvent),
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("node stopped")]
    Stopped,
}

/// Handle for sending commands to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    tx: mpsc::UnboundedSender<Input>,
}

impl NodeHandle {
    pub fn command(&self, command: Command) -> Result<(), NodeError> {
        self.tx
            .send(Input::Command(command))
            .map_err(|_| NodeError::Stopped)
    }

    pub fn start_browsing(&self) -> Result<(), NodeError> {
        self.command(Command::StartBrowsing)
    }

    pub fn start_advertising(&self) -> Result<(), NodeError> {
        self.command(Command::StartAdvertising)
    }

    pub fn disconnect_all(&self) -> Result<(), NodeError> {
        self.command(Command::DisconnectAll)
    }

    pub fn send_greeting(&self) -> Result<(), NodeError> {
        self.command(Command::SendGreeting)
    }

    pub fn shutdown(&self) -> Result<(), NodeError> {
        self.command(Command::Shutdown)
    }

    pub async fn status(&self) -> Result<NodeStatus, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Status(tx))?;
        rx.await.map_err(|_| NodeError::Stopped)
    }
}

/// Where a transport delivers its events. Events land on the node's queue behind
/// whatever was queued before them.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Input>,
}

impl EventSink {
    /// Returns false once the node has stopped.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send(Input::Transport(event)).is_ok()
    }
}

#[cfg(test)]
impl EventSink {
    /// Sink with no node behind it; events are discarded.
    pub(crate) fn detached() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }
}

/// Running node: command handle, notification stream and the actor task.
pub struct Spawned {
    pub handle: NodeHandle,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
    pub task: JoinHandle<()>,
}

/// Start the actor. `make_transport` receives the sink its events must go to.
/// The actor runs until [`Command::Shutdown`]; the transport holds a sender of
/// its own, so dropping every handle is not enough.
pub fn spawn<T, F>(core: MeshCore, make_transport: F) -> Spawned
where
    T: TransportProvider + Send + 'static,
    F: FnOnce(EventSink) -> T,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (notify_tx, notifications) = mpsc::unbounded_channel();
    let transport = make_transport(EventSink { tx: tx.clone() });
    let node = Node {
        core,
        transport,
        rx,
        notify_tx,
    };
    let task = tokio::spawn(node.run());
    Spawned {
        handle: NodeHandle { tx },
        notifications,
        task,
    }
}

struct Node<T> {
    core: MeshCore,
    transport: T,
    rx: mpsc::UnboundedReceiver<Input>,
    notify_tx: mpsc::UnboundedSender<Notification>,
}

impl<T: TransportProvider> Node<T> {
    async fn run(mut self) {
        info!(node = %self.core.identity(), "node started");
        while let Some(input) = self.rx.recv().await {
            let actions = match input {
                Input::Command(Command::Shutdown) => break,
                Input::Command(command) => self.on_command(command),
                Input::Transport(event) => self.core.on_transport_event(event),
            };
            self.perform(actions);
        }
        let actions = self.core.stop_all();
        self.perform(actions);
        info!(node = %self.core.identity(), "node stopped");
    }

    fn on_command(&mut self, command: Command) -> Vec<OutboundAction> {
        debug!(?command, "command");
        let sent = match command {
            Command::StartBrowsing => return self.core.start_browsing(),
            Command::StartAdvertising => return self.core.start_advertising(),
            Command::StopAll => return self.core.stop_all(),
            Command::DisconnectAll => return self.core.disconnect_all(),
            Command::Reset => return self.core.reset(),
            Command::Connect => return self.core.connect(),
            Command::Send { text, to } => self.core.send(&Message::new(text), &to),
            Command::Broadcast(text) => self.core.broadcast(&Message::new(text)),
            Command::SendGreeting => self.core.send_greeting(),
            Command::Status(reply) => {
                let _ = reply.send(NodeStatus {
                    identity: self.core.identity().clone(),
                    role: self.core.role(),
                    connected: self.core.session().connected_identities(),
                    stats: self.core.channel_stats(),
                });
                return vec![];
            }
            Command::Shutdown => return vec![],
        };
        sent.unwrap_or_else(|e| {
            warn!(error = %e, "message not sent");
            vec![]
        })
    }

    fn perform(&mut self, actions: Vec<OutboundAction>) {
        for action in actions {
            match action {
                OutboundAction::Transport(command) => {
                    if let Err(e) = execute(&mut self.transport, &command) {
                        warn!(error = %e, ?command, "transport call failed");
                        if let TransportCommand::Invite { peer, .. } = &command {
                            self.core.on_invite_failed(peer.id());
                        }
                    }
                }
                OutboundAction::Notify(notification) => {
                    // Nobody listening is fine.
                    let _ = self.notify_tx.send(notification);
                }
            }
        }
    }
}
