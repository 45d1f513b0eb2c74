//! Meshlink peer-connectivity policy.
//! Host-driven: no I/O; host passes commands and transport events and receives actions.

pub mod channel;
pub mod core;
pub mod discovery;
pub mod identity;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod wire;

pub use crate::core::{MeshCore, Notification, OutboundAction};
pub use channel::{ChannelStats, MessageChannel, SendError};
pub use discovery::{AcceptAll, AllowList, DiscoveryCoordinator, InvitationPolicy};
pub use identity::{PeerId, PeerIdentity, ServiceTag, ServiceTagError, DEFAULT_SERVICE_TAG};
pub use protocol::Message;
pub use session::{DisplayState, ListenerState, PeerState, Role, SessionStateMachine};
pub use transport::{
    DiscoveryInfo, Invitation, InvitationId, ReportedState, TransportCommand, TransportError,
    TransportEvent, TransportProvider, INVITE_TIMEOUT,
};
pub use wire::{decode_frame, decode_message, encode_frame, FrameDecodeError, FrameEncodeError};
