//! In-process mesh: a TransportProvider that connects nodes living in the same
//! process. Discovery is scoped by service tag; invitations resolve as soon as the
//! invitee responds; reliable sends are delivered in order per sender.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use meshlink_core::{
    Invitation, InvitationId, PeerId, PeerIdentity, ReportedState, ServiceTag, TransportError,
    TransportEvent, TransportProvider,
};
use tracing::debug;

use crate::node::EventSink;

struct Member {
    identity: PeerIdentity,
    sink: EventSink,
    advertising: Option<ServiceTag>,
    browsing: Option<ServiceTag>,
}

struct PendingInvite {
    inviter: PeerId,
    invitee: PeerId,
}

#[derive(Default)]
struct MeshState {
    members: HashMap<PeerId, Member>,
    invitations: HashMap<InvitationId, PendingInvite>,
    next_invitation: u64,
    /// Connected pairs, stored with the smaller ID first.
    links: HashSet<(PeerId, PeerId)>,
}

fn link(a: PeerId, b: PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl MeshState {
    fn emit(&self, to: PeerId, event: TransportEvent) {
        if let Some(m) = self.members.get(&to) {
            m.sink.emit(event);
        }
    }

    fn identity(&self, id: PeerId) -> Option<PeerIdentity> {
        self.members.get(&id).map(|m| m.identity.clone())
    }

    /// Tell both ends of a link about a state change of the other end.
    fn emit_pair(&self, a: PeerId, b: PeerId, state: ReportedState) {
        if let (Some(a_id), Some(b_id)) = (self.identity(a), self.identity(b)) {
            self.emit(a, TransportEvent::PeerStateChanged { peer: b_id, state });
            self.emit(b, TransportEvent::PeerStateChanged { peer: a_id, state });
        }
    }

    fn drop_link(&mut self, a: PeerId, b: PeerId) -> bool {
        let removed = self.links.remove(&link(a, b));
        if removed {
            self.emit_pair(a, b, ReportedState::NotConnected);
        }
        removed
    }

    /// Cancel invitations `me` sent to `to` (or to anyone when `to` is None).
    fn cancel_invites(&mut self, me: PeerId, to: Option<PeerId>) {
        let cancelled: Vec<InvitationId> = self
            .invitations
            .iter()
            .filter(|(_, p)| p.inviter == me && to.map_or(true, |t| p.invitee == t))
            .map(|(id, _)| *id)
            .collect();
        for id in cancelled {
            if let Some(p) = self.invitations.remove(&id) {
                if let Some(invitee) = self.identity(p.invitee) {
                    self.emit(
                        me,
                        TransportEvent::PeerStateChanged {
                            peer: invitee,
                            state: ReportedState::NotConnected,
                        },
                    );
                }
            }
        }
    }
}

/// Shared rendezvous for every node attached to it.
#[derive(Clone, Default)]
pub struct LocalMesh {
    state: Arc<Mutex<MeshState>>,
}

impl LocalMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the mesh as `identity`; events for this node go to `sink`.
    pub fn attach(&self, identity: PeerIdentity, sink: EventSink) -> LocalTransport {
        let me = identity.id();
        self.lock().members.insert(
            me,
            Member {
                identity,
                sink,
                advertising: None,
                browsing: None,
            },
        );
        LocalTransport {
            mesh: self.clone(),
            me,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MeshState> {
        // State stays consistent between calls; a panicked holder leaves nothing half-done.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One node's view of a [`LocalMesh`].
pub struct LocalTransport {
    mesh: LocalMesh,
    me: PeerId,
}

impl TransportProvider for LocalTransport {
    fn advertise(
        &mut self,
        identity: &PeerIdentity,
        service_tag: &ServiceTag,
    ) -> Result<(), TransportError> {
        let mut state = self.mesh.lock();
        let member = state
            .members
            .get_mut(&self.me)
            .ok_or_else(|| TransportError::Unavailable("not attached".into()))?;
        member.advertising = Some(service_tag.clone());
        let browsers: Vec<PeerId> = state
            .members
            .iter()
            .filter(|(id, m)| **id != self.me && m.browsing.as_ref() == Some(service_tag))
            .map(|(id, _)| *id)
            .collect();
        for b in browsers {
            state.emit(
                b,
                TransportEvent::PeerFound {
                    peer: identity.clone(),
                    info: None,
                },
            );
        }
        Ok(())
    }

    fn stop_advertise(&mut self) {
        let mut state = self.mesh.lock();
        let Some(tag) = state
            .members
            .get_mut(&self.me)
            .and_then(|m| m.advertising.take())
        else {
            return;
        };
        let browsers: Vec<PeerId> = state
            .members
            .iter()
            .filter(|(id, m)| **id != self.me && m.browsing.as_ref() == Some(&tag))
            .map(|(id, _)| *id)
            .collect();
        for b in browsers {
            state.emit(b, TransportEvent::PeerLost { peer: self.me });
        }
    }

    fn browse(
        &mut self,
        _identity: &PeerIdentity,
        service_tag: &ServiceTag,
    ) -> Result<(), TransportError> {
        let mut state = self.mesh.lock();
        let member = state
            .members
            .get_mut(&self.me)
            .ok_or_else(|| TransportError::Unavailable("not attached".into()))?;
        member.browsing = Some(service_tag.clone());
        let found: Vec<PeerIdentity> = state
            .members
            .iter()
            .filter(|(id, m)| **id != self.me && m.advertising.as_ref() == Some(service_tag))
            .map(|(_, m)| m.identity.clone())
            .collect();
        for peer in found {
            state.emit(self.me, TransportEvent::PeerFound { peer, info: None });
        }
        Ok(())
    }

    fn stop_browse(&mut self) {
        if let Some(m) = self.mesh.lock().members.get_mut(&self.me) {
            m.browsing = None;
        }
    }

    fn invite(
        &mut self,
        peer: &PeerIdentity,
        context: Option<&[u8]>,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut state = self.mesh.lock();
        let reachable = state
            .members
            .get(&peer.id())
            .map_or(false, |m| m.advertising.is_some());
        let Some(me) = state.identity(self.me).filter(|_| reachable) else {
            return Err(TransportError::Unreachable(peer.id()));
        };
        state.next_invitation += 1;
        let id = InvitationId(state.next_invitation);
        state.invitations.insert(
            id,
            PendingInvite {
                inviter: self.me,
                invitee: peer.id(),
            },
        );
        debug!(%id, from = %self.me, to = %peer.id(), "invitation sent");
        state.emit(
            self.me,
            TransportEvent::PeerStateChanged {
                peer: peer.clone(),
                state: ReportedState::Connecting,
            },
        );
        state.emit(
            peer.id(),
            TransportEvent::InvitationReceived(Invitation {
                id,
                from: me,
                context: context.map(|c| c.to_vec()),
            }),
        );
        Ok(())
    }

    fn respond_to_invitation(
        &mut self,
        invitation: InvitationId,
        accept: bool,
    ) -> Result<(), TransportError> {
        let mut state = self.mesh.lock();
        let addressed_to_me = state
            .invitations
            .get(&invitation)
            .map_or(false, |p| p.invitee == self.me);
        let pending = if addressed_to_me {
            state.invitations.remove(&invitation)
        } else {
            None
        };
        let Some(pending) = pending else {
            return Err(TransportError::UnknownInvitation(invitation));
        };
        if accept {
            state.links.insert(link(pending.inviter, pending.invitee));
            state.emit_pair(pending.inviter, pending.invitee, ReportedState::Connected);
        } else if let Some(invitee) = state.identity(pending.invitee) {
            state.emit(
                pending.inviter,
                TransportEvent::PeerStateChanged {
                    peer: invitee,
                    state: ReportedState::NotConnected,
                },
            );
        }
        Ok(())
    }

    fn disconnect_peer(&mut self, peer: PeerId) {
        let mut state = self.mesh.lock();
        if !state.drop_link(self.me, peer) {
            state.cancel_invites(self.me, Some(peer));
        }
    }

    fn disconnect_all(&mut self) {
        let mut state = self.mesh.lock();
        let me = self.me;
        let linked: Vec<PeerId> = state
            .links
            .iter()
            .filter_map(|(a, b)| {
                if *a == me {
                    Some(*b)
                } else if *b == me {
                    Some(*a)
                } else {
                    None
                }
            })
            .collect();
        for peer in linked {
            state.drop_link(me, peer);
        }
        state.cancel_invites(me, None);
    }

    fn send_reliable(&mut self, bytes: &[u8], to: &[PeerId]) -> Result<(), TransportError> {
        let state = self.mesh.lock();
        if let Some(peer) = to
            .iter()
            .find(|p| !state.links.contains(&link(self.me, **p)))
        {
            return Err(TransportError::Unreachable(*peer));
        }
        let Some(me) = state.identity(self.me) else {
            return Err(TransportError::Unavailable("not attached".into()));
        };
        for peer in to {
            state.emit(
                *peer,
                TransportEvent::DataReceived {
                    peer: me.clone(),
                    bytes: bytes.to_vec(),
                },
            );
        }
        Ok(())
    }
}
