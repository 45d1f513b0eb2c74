//! Recording transport for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use meshlink_core::transport::execute;
use meshlink_core::{
    InvitationId, Notification, OutboundAction, PeerId, PeerIdentity, ServiceTag,
    TransportCommand, TransportError, TransportProvider,
};

/// Transport that records every call as the equivalent command.
#[derive(Default)]
pub struct Recorder {
    pub calls: Vec<TransportCommand>,
    /// Refuse every invite with `Unreachable`.
    pub refuse_invites: bool,
}

impl Recorder {
    pub fn take(&mut self) -> Vec<TransportCommand> {
        std::mem::take(&mut self.calls)
    }
}

impl TransportProvider for Recorder {
    fn advertise(
        &mut self,
        identity: &PeerIdentity,
        service_tag: &ServiceTag,
    ) -> Result<(), TransportError> {
        self.calls.push(TransportCommand::Advertise {
            identity: identity.clone(),
            service_tag: service_tag.clone(),
        });
        Ok(())
    }

    fn stop_advertise(&mut self) {
        self.calls.push(TransportCommand::StopAdvertise);
    }

    fn browse(
        &mut self,
        identity: &PeerIdentity,
        service_tag: &ServiceTag,
    ) -> Result<(), TransportError> {
        self.calls.push(TransportCommand::Browse {
            identity: identity.clone(),
            service_tag: service_tag.clone(),
        });
        Ok(())
    }

    fn stop_browse(&mut self) {
        self.calls.push(TransportCommand::StopBrowse);
    }

    fn invite(
        &mut self,
        peer: &PeerIdentity,
        context: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        if self.refuse_invites {
            return Err(TransportError::Unreachable(peer.id()));
        }
        self.calls.push(TransportCommand::Invite {
            peer: peer.clone(),
            context: context.map(|c| c.to_vec()),
            timeout,
        });
        Ok(())
    }

    fn respond_to_invitation(
        &mut self,
        invitation: InvitationId,
        accept: bool,
    ) -> Result<(), TransportError> {
        self.calls
            .push(TransportCommand::RespondToInvitation { invitation, accept });
        Ok(())
    }

    fn disconnect_peer(&mut self, peer: PeerId) {
        self.calls.push(TransportCommand::DisconnectPeer(peer));
    }

    fn disconnect_all(&mut self) {
        self.calls.push(TransportCommand::DisconnectAll);
    }

    fn send_reliable(&mut self, bytes: &[u8], to: &[PeerId]) -> Result<(), TransportError> {
        self.calls.push(TransportCommand::SendReliable {
            bytes: bytes.to_vec(),
            to: to.to_vec(),
        });
        Ok(())
    }
}

/// Run transport actions against `transport` the way a host would; return the
/// notifications and any transport errors.
pub fn apply(
    actions: Vec<OutboundAction>,
    transport: &mut Recorder,
) -> (Vec<Notification>, Vec<TransportError>) {
    let mut notes = Vec::new();
    let mut errors = Vec::new();
    for action in actions {
        match action {
            OutboundAction::Transport(cmd) => {
                if let Err(e) = execute(transport, &cmd) {
                    errors.push(e);
                }
            }
            OutboundAction::Notify(n) => notes.push(n),
        }
    }
    (notes, errors)
}
