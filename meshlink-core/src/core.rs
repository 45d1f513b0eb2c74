//! Host-driven API: MeshCore receives commands and transport events from the host,
//! returns actions.

use tracing::{debug, warn};

use crate::channel::{ChannelStats, MessageChannel, SendError};
use crate::discovery::{DiscoveryCoordinator, InvitationPolicy};
use crate::identity::{PeerId, PeerIdentity, ServiceTag};
use crate::protocol::Message;
use crate::session::{DisplayState, Role, SessionStateMachine};
use crate::transport::{TransportCommand, TransportEvent};

/// Main coordinator. Host passes events; core returns actions.
pub struct MeshCore {
    session: SessionStateMachine,
    discovery: DiscoveryCoordinator,
    channel: MessageChannel,
}

impl MeshCore {
    /// Core with the accept-all invitation policy.
    pub fn new(identity: PeerIdentity, service_tag: ServiceTag) -> Self {
        Self::with_discovery(identity, service_tag, DiscoveryCoordinator::default())
    }

    pub fn with_policy(
        identity: PeerIdentity,
        service_tag: ServiceTag,
        policy: Box<dyn InvitationPolicy>,
    ) -> Self {
        Self::with_discovery(identity, service_tag, DiscoveryCoordinator::new(policy))
    }

    fn with_discovery(
        identity: PeerIdentity,
        service_tag: ServiceTag,
        discovery: DiscoveryCoordinator,
    ) -> Self {
        Self {
            session: SessionStateMachine::new(identity, service_tag),
            discovery,
            channel: MessageChannel::new(),
        }
    }

    pub fn identity(&self) -> &PeerIdentity {
        self.session.identity()
    }

    pub fn role(&self) -> Role {
        self.session.role()
    }

    pub fn session(&self) -> &SessionStateMachine {
        &self.session
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.session.connected_peers()
    }

    pub fn channel_stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    pub fn start_browsing(&mut self) -> Vec<OutboundAction> {
        self.session.start_browsing()
    }

    pub fn start_advertising(&mut self) -> Vec<OutboundAction> {
        self.session.start_advertising()
    }

    pub fn stop_all(&mut self) -> Vec<OutboundAction> {
        self.session.stop_all()
    }

    pub fn disconnect_all(&mut self) -> Vec<OutboundAction> {
        self.session.disconnect_all()
    }

    pub fn reset(&mut self) -> Vec<OutboundAction> {
        self.session.reset()
    }

    pub fn connect(&mut self) -> Vec<OutboundAction> {
        self.session.connect()
    }

    pub fn send(
        &mut self,
        message: &Message,
        to: &[PeerId],
    ) -> Result<Vec<OutboundAction>, SendError> {
        self.channel.send(&self.session, message, to)
    }

    pub fn broadcast(&mut self, message: &Message) -> Result<Vec<OutboundAction>, SendError> {
        self.channel.broadcast(&self.session, message)
    }

    /// Broadcast "Hello from <display name>".
    pub fn send_greeting(&mut self) -> Result<Vec<OutboundAction>, SendError> {
        let greeting = MessageChannel::greeting(self.session.identity());
        self.broadcast(&greeting)
    }

    /// Dispatch one transport event to the component that owns it.
    pub fn on_transport_event(&mut self, event: TransportEvent) -> Vec<OutboundAction> {
        match event {
            TransportEvent::PeerFound { peer, info } => {
                self.discovery
                    .on_peer_found(&mut self.session, peer, info.as_ref())
            }
            TransportEvent::PeerLost { peer } => self.discovery.on_peer_lost(&self.session, peer),
            TransportEvent::PeerStateChanged { peer, state } => {
                self.session.on_peer_state_changed(peer, state)
            }
            TransportEvent::InvitationReceived(invitation) => self
                .discovery
                .on_invitation_received(&mut self.session, invitation),
            TransportEvent::DataReceived { peer, bytes } => {
                self.channel.on_data_received(peer, &bytes)
            }
        }
    }

    /// The host could not hand an invite to the transport. The peer goes back to
    /// NotConnected so the next discovery of it invites again.
    pub fn on_invite_failed(&mut self, peer: PeerId) {
        if self.session.revert_connecting(peer) {
            warn!(peer = %peer, "invite failed, peer can be invited again");
        } else {
            debug!(peer = %peer, "invite failed for peer not pending");
        }
    }
}

/// Presentation-facing event. Advisory; the presentation layer consumes these on
/// its own schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    StateChanged(DisplayState),
    RoleChanged(Role),
    MessageReceived { from: PeerIdentity, text: String },
}

/// Action for host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    Transport(TransportCommand),
    Notify(Notification),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Invitation, InvitationId, ReportedState};
    use crate::wire;

    fn core(name: &str) -> MeshCore {
        MeshCore::new(PeerIdentity::new(name), ServiceTag::default())
    }

    #[test]
    fn found_then_connected_then_send() {
        let mut b = core("B");
        b.start_browsing();
        let a = PeerIdentity::new("A");
        let actions = b.on_transport_event(TransportEvent::PeerFound {
            peer: a.clone(),
            info: None,
        });
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::Transport(TransportCommand::Invite { .. })]
        ));
        b.on_transport_event(TransportEvent::PeerStateChanged {
            peer: a.clone(),
            state: ReportedState::Connected,
        });
        assert_eq!(b.connected_peers(), vec![a.id()]);

        let actions = b.send_greeting().unwrap();
        match actions.as_slice() {
            [OutboundAction::Transport(TransportCommand::SendReliable { bytes, to })] => {
                assert_eq!(to, &vec![a.id()]);
                assert_eq!(wire::decode_message(bytes).unwrap().text(), "Hello from B");
            }
            _ => panic!("expected SendReliable"),
        }
    }

    #[test]
    fn state_change_notifies_display_label() {
        let mut c = core("A");
        let actions = c.on_transport_event(TransportEvent::PeerStateChanged {
            peer: PeerIdentity::new("B"),
            state: ReportedState::Connecting,
        });
        assert_eq!(
            actions,
            vec![OutboundAction::Notify(Notification::StateChanged(
                DisplayState::Connecting
            ))]
        );
    }

    #[test]
    fn invitation_with_policy_hook() {
        let trusted = PeerIdentity::new("trusted");
        let mut c = MeshCore::with_policy(
            PeerIdentity::new("A"),
            ServiceTag::default(),
            Box::new(crate::discovery::AllowList::new([trusted.id()])),
        );
        c.start_advertising();
        let actions = c.on_transport_event(TransportEvent::InvitationReceived(Invitation {
            id: InvitationId(9),
            from: PeerIdentity::new("stranger"),
            context: Some(b"hi".to_vec()),
        }));
        assert_eq!(
            actions,
            vec![OutboundAction::Transport(
                TransportCommand::RespondToInvitation {
                    invitation: InvitationId(9),
                    accept: false,
                }
            )]
        );
    }

    #[test]
    fn invite_failure_allows_reinvite() {
        let mut b = core("B");
        b.start_browsing();
        let a = PeerIdentity::new("A");
        let found = TransportEvent::PeerFound {
            peer: a.clone(),
            info: None,
        };
        assert_eq!(b.on_transport_event(found.clone()).len(), 1);
        assert!(b.on_transport_event(found.clone()).is_empty());
        b.on_invite_failed(a.id());
        assert_eq!(b.on_transport_event(found).len(), 1);
    }

    #[test]
    fn data_from_peer_decoded() {
        let mut c = core("A");
        let from = PeerIdentity::new("B");
        let bytes = wire::encode_frame(&Message::from("ping")).unwrap();
        let actions = c.on_transport_event(TransportEvent::DataReceived {
            peer: from.clone(),
            bytes,
        });
        assert_eq!(
            actions,
            vec![OutboundAction::Notify(Notification::MessageReceived {
                from,
                text: "ping".into(),
            })]
        );
        assert_eq!(c.channel_stats().received, 1);
    }
}
