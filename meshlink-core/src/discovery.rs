//! Discovery coordinator: turns discovery events into invitations and decides
//! incoming invitations.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::core::OutboundAction;
use crate::identity::{PeerId, PeerIdentity};
use crate::session::{Role, SessionStateMachine};
use crate::transport::{DiscoveryInfo, Invitation, TransportCommand, INVITE_TIMEOUT};

/// Decides whether an invitation received while advertising is accepted.
pub trait InvitationPolicy: Send {
    fn accept(&self, invitation: &Invitation) -> bool;
}

/// Accept every invitation. Only suitable on a trusted local network.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl InvitationPolicy for AcceptAll {
    fn accept(&self, _invitation: &Invitation) -> bool {
        true
    }
}

/// Accept invitations only from listed peers.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: HashSet<PeerId>,
}

impl AllowList {
    pub fn new(peers: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            allowed: peers.into_iter().collect(),
        }
    }

    pub fn allow(&mut self, peer: PeerId) {
        self.allowed.insert(peer);
    }

    pub fn contains(&self, peer: PeerId) -> bool {
        self.allowed.contains(&peer)
    }
}

impl InvitationPolicy for AllowList {
    fn accept(&self, invitation: &Invitation) -> bool {
        self.contains(invitation.from.id())
    }
}

pub struct DiscoveryCoordinator {
    policy: Box<dyn InvitationPolicy>,
}

impl DiscoveryCoordinator {
    pub fn new(policy: Box<dyn InvitationPolicy>) -> Self {
        Self { policy }
    }

    /// While browsing, invite a newly found peer into the session. Peers already
    /// Connecting or Connected are not invited again.
    pub fn on_peer_found(
        &self,
        session: &mut SessionStateMachine,
        peer: PeerIdentity,
        info: Option<&DiscoveryInfo>,
    ) -> Vec<OutboundAction> {
        if session.role() != Role::Browsing {
            debug!(peer = %peer.id(), role = %session.role(), "peer found while not browsing");
            return vec![];
        }
        if peer == *session.identity() {
            return vec![];
        }
        if !session.mark_connecting(&peer) {
            debug!(
                peer = %peer.id(),
                state = ?session.peer_state(peer.id()),
                "peer found again, invite already in progress"
            );
            return vec![];
        }
        info!(
            peer = %peer.id(),
            name = peer.display_name(),
            info_keys = info.map(|i| i.len()).unwrap_or(0),
            "inviting peer"
        );
        vec![OutboundAction::Transport(TransportCommand::Invite {
            peer,
            context: None,
            timeout: INVITE_TIMEOUT,
        })]
    }

    /// Lost-peer events do not change the session; the transport's own state
    /// change removes a peer from the connected set.
    pub fn on_peer_lost(&self, session: &SessionStateMachine, peer: PeerId) -> Vec<OutboundAction> {
        debug!(peer = %peer, state = ?session.peer_state(peer), "peer lost");
        vec![]
    }

    /// Resolve an invitation in the same reaction that received it: accepted only
    /// while advertising and when the policy agrees, declined otherwise.
    pub fn on_invitation_received(
        &self,
        session: &mut SessionStateMachine,
        invitation: Invitation,
    ) -> Vec<OutboundAction> {
        let accept = if session.role() != Role::Advertising {
            debug!(from = %invitation.from.id(), role = %session.role(), "invitation while not advertising");
            false
        } else if !self.policy.accept(&invitation) {
            info!(from = %invitation.from.id(), "invitation declined by policy");
            false
        } else {
            true
        };
        if accept {
            session.mark_connecting(&invitation.from);
            info!(from = %invitation.from.id(), name = invitation.from.display_name(), "accepting invitation");
        }
        vec![OutboundAction::Transport(
            TransportCommand::RespondToInvitation {
                invitation: invitation.id,
                accept,
            },
        )]
    }
}

impl Default for DiscoveryCoordinator {
    fn default() -> Self {
        Self::new(Box::new(AcceptAll))
    }
}
