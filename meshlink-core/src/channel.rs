//! Message channel: text messages to and from connected peers.

use tracing::{debug, info};

use crate::core::{Notification, OutboundAction};
use crate::identity::{PeerId, PeerIdentity};
use crate::protocol::Message;
use crate::session::SessionStateMachine;
use crate::transport::TransportCommand;
use crate::wire;

/// Counters for traffic through the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub sent: u64,
    pub received: u64,
    /// Inbound payloads that failed to decode.
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub struct MessageChannel {
    stats: ChannelStats,
}

impl MessageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// The greeting a node sends to its peers.
    pub fn greeting(identity: &PeerIdentity) -> Message {
        Message::new(format!("Hello from {}", identity.display_name()))
    }

    /// Send `message` reliably to `to`. Every recipient must be in the connected set;
    /// nothing is transmitted otherwise.
    pub fn send(
        &mut self,
        session: &SessionStateMachine,
        message: &Message,
        to: &[PeerId],
    ) -> Result<Vec<OutboundAction>, SendError> {
        if to.is_empty() {
            return Err(SendError::NoRecipients);
        }
        if let Some(peer) = to.iter().find(|p| !session.is_connected(**p)) {
            return Err(SendError::NotConnected(*peer));
        }
        let bytes = wire::encode_frame(message)?;
        let mut recipients = to.to_vec();
        recipients.sort();
        recipients.dedup();
        debug!(bytes = bytes.len(), peers = recipients.len(), "sending message");
        self.stats.sent += 1;
        Ok(vec![OutboundAction::Transport(TransportCommand::SendReliable {
            bytes,
            to: recipients,
        })])
    }

    /// Send `message` to every connected peer.
    pub fn broadcast(
        &mut self,
        session: &SessionStateMachine,
        message: &Message,
    ) -> Result<Vec<OutboundAction>, SendError> {
        let to = session.connected_peers();
        self.send(session, message, &to)
    }

    /// Decode an inbound payload and surface it. Undecodable payloads are dropped.
    pub fn on_data_received(&mut self, peer: PeerIdentity, bytes: &[u8]) -> Vec<OutboundAction> {
        match wire::decode_message(bytes) {
            Ok(message) => {
                self.stats.received += 1;
                info!(from = %peer.id(), len = message.text().len(), "message received");
                vec![OutboundAction::Notify(Notification::MessageReceived {
                    from: peer,
                    text: message.into_text(),
                })]
            }
            Err(e) => {
                self.stats.dropped += 1;
                debug!(from = %peer.id(), error = %e, "dropping undecodable payload");
                vec![]
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("no recipients")]
    NoRecipients,
    #[error("peer {0} is not connected")]
    NotConnected(PeerId),
    #[error(transparent)]
    Encode(#[from] wire::FrameEncodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ServiceTag;
    use crate::transport::ReportedState;

    fn session_with(peers: &[&PeerIdentity]) -> SessionStateMachine {
        let mut s = SessionStateMachine::new(PeerIdentity::new("me"), ServiceTag::default());
        for p in peers {
            s.on_peer_state_changed((*p).clone(), ReportedState::Connected);
        }
        s
    }

    #[test]
    fn send_to_connected_peer() {
        let peer = PeerIdentity::new("a");
        let session = session_with(&[&peer]);
        let mut ch = MessageChannel::new();
        let actions = ch.send(&session, &Message::from("hi"), &[peer.id()]).unwrap();
        match actions.as_slice() {
            [OutboundAction::Transport(TransportCommand::SendReliable { bytes, to })] => {
                assert_eq!(to, &vec![peer.id()]);
                assert_eq!(wire::decode_message(bytes).unwrap().text(), "hi");
            }
            _ => panic!("expected SendReliable"),
        }
        assert_eq!(ch.stats().sent, 1);
    }

    #[test]
    fn send_requires_recipients() {
        let session = session_with(&[]);
        let mut ch = MessageChannel::new();
        assert!(matches!(
            ch.send(&session, &Message::from("hi"), &[]),
            Err(SendError::NoRecipients)
        ));
        assert_eq!(ch.stats().sent, 0);
    }

    #[test]
    fn send_rejects_unconnected_recipient() {
        let peer = PeerIdentity::new("a");
        let stranger = PeerIdentity::new("b");
        let session = session_with(&[&peer]);
        let mut ch = MessageChannel::new();
        let err = ch
            .send(&session, &Message::from("hi"), &[peer.id(), stranger.id()])
            .unwrap_err();
        assert!(matches!(err, SendError::NotConnected(p) if p == stranger.id()));
    }

    #[test]
    fn send_dedups_recipients() {
        let peer = PeerIdentity::new("a");
        let session = session_with(&[&peer]);
        let mut ch = MessageChannel::new();
        let actions = ch
            .send(&session, &Message::from("hi"), &[peer.id(), peer.id()])
            .unwrap();
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::Transport(TransportCommand::SendReliable { to, .. })] if to.len() == 1
        ));
    }

    #[test]
    fn broadcast_without_peers_fails() {
        let session = session_with(&[]);
        let mut ch = MessageChannel::new();
        assert!(matches!(
            ch.broadcast(&session, &Message::from("hi")),
            Err(SendError::NoRecipients)
        ));
    }

    #[test]
    fn broadcast_reaches_all_connected() {
        let a = PeerIdentity::new("a");
        let b = PeerIdentity::new("b");
        let session = session_with(&[&a, &b]);
        let mut ch = MessageChannel::new();
        let actions = ch.broadcast(&session, &Message::from("all")).unwrap();
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::Transport(TransportCommand::SendReliable { to, .. })] if to.len() == 2
        ));
    }

    #[test]
    fn received_message_surfaces_unchanged() {
        let peer = PeerIdentity::new("b");
        let mut ch = MessageChannel::new();
        let bytes = wire::encode_frame(&Message::from("Hello from B")).unwrap();
        let actions = ch.on_data_received(peer.clone(), &bytes);
        match actions.as_slice() {
            [OutboundAction::Notify(Notification::MessageReceived { from, text })] => {
                assert_eq!(*from, peer);
                assert_eq!(text, "Hello from B");
            }
            _ => panic!("expected MessageReceived"),
        }
        assert_eq!(ch.stats().received, 1);
    }

    #[test]
    fn garbage_dropped_silently() {
        let mut ch = MessageChannel::new();
        assert!(ch
            .on_data_received(PeerIdentity::new("b"), &[1, 2, 3])
            .is_empty());
        assert!(ch
            .on_data_received(PeerIdentity::new("b"), b"{\"not\":\"a frame\"}")
            .is_empty());
        assert_eq!(ch.stats().dropped, 2);
        assert_eq!(ch.stats().received, 0);
    }

    #[test]
    fn greeting_uses_display_name() {
        let me = PeerIdentity::new("B");
        assert_eq!(MessageChannel::greeting(&me).text(), "Hello from B");
    }
}
