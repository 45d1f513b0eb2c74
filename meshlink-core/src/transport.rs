//! Contract with the platform peer transport: the primitives the core drives and
//! the events the transport reports back.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::identity::{PeerId, PeerIdentity, ServiceTag};

/// How long an outgoing invitation stays open on the transport.
pub const INVITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Key/value pairs a peer publishes while advertising.
pub type DiscoveryInfo = BTreeMap<String, String>;

/// Transport-assigned handle for an incoming invitation.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct InvitationId(pub u64);

impl fmt::Display for InvitationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inv-{}", self.0)
    }
}

/// Incoming request from a peer to join its session. Lives until the core responds.
#[derive(Debug, Clone)]
pub struct Invitation {
    pub id: InvitationId,
    pub from: PeerIdentity,
    pub context: Option<Vec<u8>>,
}

/// Per-peer session state as the transport reports it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReportedState {
    NotConnected,
    Connecting,
    Connected,
    /// A state code this core does not know.
    Unrecognized(u32),
}

/// Events the transport emits. The host feeds them to the core in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    PeerFound {
        peer: PeerIdentity,
        info: Option<DiscoveryInfo>,
    },
    PeerLost {
        peer: PeerId,
    },
    PeerStateChanged {
        peer: PeerIdentity,
        state: ReportedState,
    },
    InvitationReceived(Invitation),
    DataReceived {
        peer: PeerIdentity,
        bytes: Vec<u8>,
    },
}

/// Primitive the core asks the host to run against its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Advertise {
        identity: PeerIdentity,
        service_tag: ServiceTag,
    },
    StopAdvertise,
    Browse {
        identity: PeerIdentity,
        service_tag: ServiceTag,
    },
    StopBrowse,
    /// Invite `peer` into the local session.
    Invite {
        peer: PeerIdentity,
        context: Option<Vec<u8>>,
        timeout: Duration,
    },
    RespondToInvitation {
        invitation: InvitationId,
        accept: bool,
    },
    DisconnectPeer(PeerId),
    /// Leave the session: drops every peer.
    DisconnectAll,
    SendReliable {
        bytes: Vec<u8>,
        to: Vec<PeerId>,
    },
}

/// Platform peer transport. Calls return as soon as the request is issued; outcomes
/// arrive later as [`TransportEvent`]s.
pub trait TransportProvider {
    fn advertise(&mut self, identity: &PeerIdentity, service_tag: &ServiceTag)
        -> Result<(), TransportError>;
    fn stop_advertise(&mut self);
    fn browse(&mut self, identity: &PeerIdentity, service_tag: &ServiceTag)
        -> Result<(), TransportError>;
    fn stop_browse(&mut self);
    fn invite(
        &mut self,
        peer: &PeerIdentity,
        context: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<(), TransportError>;
    fn respond_to_invitation(
        &mut self,
        invitation: InvitationId,
        accept: bool,
    ) -> Result<(), TransportError>;
    fn disconnect_peer(&mut self, peer: PeerId);
    fn disconnect_all(&mut self);
    fn send_reliable(&mut self, bytes: &[u8], to: &[PeerId]) -> Result<(), TransportError>;
}

/// Run one command against a transport.
pub fn execute<T: TransportProvider + ?Sized>(
    transport: &mut T,
    command: &TransportCommand,
) -> Result<(), TransportError> {
    match command {
        TransportCommand::Advertise {
            identity,
            service_tag,
        } => transport.advertise(identity, service_tag),
        TransportCommand::StopAdvertise => {
            transport.stop_advertise();
            Ok(())
        }
        TransportCommand::Browse {
            identity,
            service_tag,
        } => transport.browse(identity, service_tag),
        TransportCommand::StopBrowse => {
            transport.stop_browse();
            Ok(())
        }
        TransportCommand::Invite {
            peer,
            context,
            timeout,
        } => transport.invite(peer, context.as_deref(), *timeout),
        TransportCommand::RespondToInvitation { invitation, accept } => {
            transport.respond_to_invitation(*invitation, *accept)
        }
        TransportCommand::DisconnectPeer(peer) => {
            transport.disconnect_peer(*peer);
            Ok(())
        }
        TransportCommand::DisconnectAll => {
            transport.disconnect_all();
            Ok(())
        }
        TransportCommand::SendReliable { bytes, to } => transport.send_reliable(bytes, to),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0} is not reachable")]
    Unreachable(PeerId),
    #[error("unknown invitation {0}")]
    UnknownInvitation(InvitationId),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}
