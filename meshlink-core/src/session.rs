//! Session state machine: the node's discovery role, the advertiser/browser
//! lifecycles and the per-peer connectivity of the session.
//!
//! Every operation returns the actions the host must carry out; nothing here
//! touches the transport directly.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::core::{Notification, OutboundAction};
use crate::identity::{PeerId, PeerIdentity, ServiceTag};
use crate::transport::{ReportedState, TransportCommand};

/// Node-level discovery posture. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Role {
    Idle,
    Browsing,
    Advertising,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Idle => "idle",
            Role::Browsing => "browsing",
            Role::Advertising => "advertising",
        })
    }
}

/// Connectivity of one remote peer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PeerState {
    NotConnected,
    Connecting,
    Connected,
}

/// Lifecycle of the advertiser or the browser.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ListenerState {
    NotStarted,
    Active,
    Stopped,
}

/// Connection status as shown to the user.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DisplayState {
    NotConnected,
    Connecting,
    Connected,
    FatalError,
}

impl From<PeerState> for DisplayState {
    fn from(state: PeerState) -> Self {
        match state {
            PeerState::NotConnected => DisplayState::NotConnected,
            PeerState::Connecting => DisplayState::Connecting,
            PeerState::Connected => DisplayState::Connected,
        }
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DisplayState::NotConnected => "Not connected",
            DisplayState::Connecting => "Connecting",
            DisplayState::Connected => "Connected",
            DisplayState::FatalError => "Fatal error",
        })
    }
}

struct TrackedPeer {
    identity: PeerIdentity,
    state: PeerState,
}

/// Owns the role and the session. Created once per node; the peer map mutates,
/// the machine itself is never replaced.
pub struct SessionStateMachine {
    identity: PeerIdentity,
    service_tag: ServiceTag,
    role: Role,
    advertiser: ListenerState,
    browser: ListenerState,
    peers: HashMap<PeerId, TrackedPeer>,
}

impl SessionStateMachine {
    pub fn new(identity: PeerIdentity, service_tag: ServiceTag) -> Self {
        Self {
            identity,
            service_tag,
            role: Role::Idle,
            advertiser: ListenerState::NotStarted,
            browser: ListenerState::NotStarted,
            peers: HashMap::new(),
        }
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    pub fn service_tag(&self) -> &ServiceTag {
        &self.service_tag
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn advertiser_state(&self) -> ListenerState {
        self.advertiser
    }

    pub fn browser_state(&self) -> ListenerState {
        self.browser
    }

    /// State of `peer`; peers never seen are NotConnected.
    pub fn peer_state(&self, peer: PeerId) -> PeerState {
        self.peers
            .get(&peer)
            .map(|p| p.state)
            .unwrap_or(PeerState::NotConnected)
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.peer_state(peer) == PeerState::Connected
    }

    /// Peers currently in Connected, sorted by ID.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.peers_in(&[PeerState::Connected])
    }

    /// Identities of connected peers, sorted by ID.
    pub fn connected_identities(&self) -> Vec<PeerIdentity> {
        let mut out: Vec<PeerIdentity> = self
            .peers
            .values()
            .filter(|p| p.state == PeerState::Connected)
            .map(|p| p.identity.clone())
            .collect();
        out.sort_by_key(|p| p.id());
        out
    }

    fn peers_in(&self, states: &[PeerState]) -> Vec<PeerId> {
        let mut out: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, p)| states.contains(&p.state))
            .map(|(id, _)| *id)
            .collect();
        out.sort();
        out
    }

    /// Switch to browsing. Tears down advertising first; no-op when already browsing.
    pub fn start_browsing(&mut self) -> Vec<OutboundAction> {
        let mut actions = match self.role {
            Role::Browsing => {
                debug!("already browsing");
                return vec![];
            }
            Role::Advertising => self.stop_all(),
            Role::Idle => Vec::new(),
        };
        self.role = Role::Browsing;
        self.browser = ListenerState::Active;
        info!(service_tag = %self.service_tag, "start browsing");
        actions.push(OutboundAction::Transport(TransportCommand::Browse {
            identity: self.identity.clone(),
            service_tag: self.service_tag.clone(),
        }));
        actions.push(OutboundAction::Notify(Notification::RoleChanged(Role::Browsing)));
        actions
    }

    /// Switch to advertising. Tears down browsing first; no-op when already advertising.
    pub fn start_advertising(&mut self) -> Vec<OutboundAction> {
        let mut actions = match self.role {
            Role::Advertising => {
                debug!("already advertising");
                return vec![];
            }
            Role::Browsing => self.stop_all(),
            Role::Idle => Vec::new(),
        };
        self.role = Role::Advertising;
        self.advertiser = ListenerState::Active;
        info!(service_tag = %self.service_tag, "start advertising");
        actions.push(OutboundAction::Transport(TransportCommand::Advertise {
            identity: self.identity.clone(),
            service_tag: self.service_tag.clone(),
        }));
        actions.push(OutboundAction::Notify(Notification::RoleChanged(
            Role::Advertising,
        )));
        actions
    }

    /// Stop whichever listeners are active and leave the session. Role becomes Idle.
    pub fn stop_all(&mut self) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        if self.browser == ListenerState::Active {
            self.browser = ListenerState::Stopped;
            actions.push(OutboundAction::Transport(TransportCommand::StopBrowse));
        }
        if self.advertiser == ListenerState::Active {
            self.advertiser = ListenerState::Stopped;
            actions.push(OutboundAction::Transport(TransportCommand::StopAdvertise));
        }
        actions.push(OutboundAction::Transport(TransportCommand::DisconnectAll));
        if self.mark_all_not_connected() > 0 {
            actions.push(OutboundAction::Notify(Notification::StateChanged(
                DisplayState::NotConnected,
            )));
        }
        if self.role != Role::Idle {
            debug!(from = %self.role, "role -> idle");
            self.role = Role::Idle;
            actions.push(OutboundAction::Notify(Notification::RoleChanged(Role::Idle)));
        }
        actions
    }

    /// Cancel every pending or established connection. Role is unchanged.
    pub fn disconnect_all(&mut self) -> Vec<OutboundAction> {
        let targets = self.peers_in(&[PeerState::Connecting, PeerState::Connected]);
        if targets.is_empty() {
            return vec![];
        }
        info!(peers = targets.len(), "disconnecting all peers");
        let mut actions: Vec<OutboundAction> = targets
            .iter()
            .map(|p| OutboundAction::Transport(TransportCommand::DisconnectPeer(*p)))
            .collect();
        self.mark_all_not_connected();
        actions.push(OutboundAction::Notify(Notification::StateChanged(
            DisplayState::NotConnected,
        )));
        actions
    }

    /// Cancel every connection, stop both roles and go back to browsing.
    pub fn reset(&mut self) -> Vec<OutboundAction> {
        let mut actions = self.disconnect_all();
        actions.extend(self.stop_all());
        actions.extend(self.start_browsing());
        actions
    }

    /// Restart as advertiser from any role, leaving the current session first.
    pub fn connect(&mut self) -> Vec<OutboundAction> {
        let mut actions = self.stop_all();
        actions.extend(self.start_advertising());
        actions
    }

    /// Transport reported a new state for `peer`. Last write wins; no transition is refused.
    pub fn on_peer_state_changed(
        &mut self,
        peer: PeerIdentity,
        state: ReportedState,
    ) -> Vec<OutboundAction> {
        let state = match state {
            ReportedState::NotConnected => PeerState::NotConnected,
            ReportedState::Connecting => PeerState::Connecting,
            ReportedState::Connected => PeerState::Connected,
            ReportedState::Unrecognized(code) => {
                warn!(peer = %peer.id(), code, "unrecognized peer state");
                return vec![OutboundAction::Notify(Notification::StateChanged(
                    DisplayState::FatalError,
                ))];
            }
        };
        let id = peer.id();
        let previous = self.peer_state(id);
        self.peers.insert(
            id,
            TrackedPeer {
                identity: peer,
                state,
            },
        );
        debug!(peer = %id, ?previous, ?state, "peer state changed");
        vec![OutboundAction::Notify(Notification::StateChanged(
            state.into(),
        ))]
    }

    /// Record an outgoing or accepted invitation. Only a NotConnected peer moves to
    /// Connecting; returns false if the peer was already Connecting or Connected.
    pub(crate) fn mark_connecting(&mut self, peer: &PeerIdentity) -> bool {
        match self.peer_state(peer.id()) {
            PeerState::NotConnected => {
                self.peers.insert(
                    peer.id(),
                    TrackedPeer {
                        identity: peer.clone(),
                        state: PeerState::Connecting,
                    },
                );
                true
            }
            PeerState::Connecting | PeerState::Connected => false,
        }
    }

    /// The transport refused an invite outright: let the peer be invited again.
    pub(crate) fn revert_connecting(&mut self, peer: PeerId) -> bool {
        match self.peers.get_mut(&peer) {
            Some(p) if p.state == PeerState::Connecting => {
                p.state = PeerState::NotConnected;
                true
            }
            _ => false,
        }
    }

    fn mark_all_not_connected(&mut self) -> usize {
        let mut changed = 0;
        for p in self.peers.values_mut() {
            if p.state != PeerState::NotConnected {
                p.state = PeerState::NotConnected;
                changed += 1;
            }
        }
        changed
    }
}
