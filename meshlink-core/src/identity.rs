//! Node identity and the service tag that scopes discovery.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Peer ID: 16 random bytes. Used as the session key for every remote peer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(#[serde(with = "bytes_16")] [u8; 16]);

mod bytes_16 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    pub fn serialize<S: Serializer>(v: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error> {
        v.as_slice().serialize(serializer)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 16], D::Error> {
        let buf: Vec<u8> = Deserialize::deserialize(d)?;
        buf.try_into()
            .map_err(|_| serde::de::Error::custom("expected 16 bytes"))
    }
}

impl PeerId {
    /// Fresh random ID (UUID v4 bytes).
    pub fn random() -> Self {
        PeerId(uuid::Uuid::new_v4().into_bytes())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        PeerId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell peers apart in logs.
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Identity of a node: stable ID plus the name shown to other peers.
/// Equality and hashing use the ID only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerIdentity {
    id: PeerId,
    display_name: String,
}

impl PeerIdentity {
    /// New identity with a random ID.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self::with_id(PeerId::random(), display_name)
    }

    pub fn with_id(id: PeerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerIdentity {}

impl Hash for PeerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// Maximum service tag length.
pub const MAX_SERVICE_TAG_LEN: usize = 15;

/// Default service tag shared by every meshlink node.
pub const DEFAULT_SERVICE_TAG: &str = "mesh-chat";

/// Namespace scoping discovery: peers only see peers advertising the same tag.
/// 1-15 chars of `[a-z0-9-]`, no leading, trailing or doubled hyphen.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceTag(String);

impl ServiceTag {
    pub fn parse(s: &str) -> Result<Self, ServiceTagError> {
        if s.is_empty() {
            return Err(ServiceTagError::Empty);
        }
        if s.len() > MAX_SERVICE_TAG_LEN {
            return Err(ServiceTagError::TooLong(s.len()));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(ServiceTagError::InvalidChar(c));
        }
        if s.starts_with('-') || s.ends_with('-') || s.contains("--") {
            return Err(ServiceTagError::MisplacedHyphen);
        }
        Ok(ServiceTag(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ServiceTag {
    fn default() -> Self {
        ServiceTag(DEFAULT_SERVICE_TAG.to_string())
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ServiceTag {
    type Err = ServiceTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ServiceTag {
    type Error = ServiceTagError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ServiceTag> for String {
    fn from(tag: ServiceTag) -> Self {
        tag.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceTagError {
    #[error("service tag is empty")]
    Empty,
    #[error("service tag too long: {0} chars (max {MAX_SERVICE_TAG_LEN})")]
    TooLong(usize),
    #[error("invalid character in service tag: {0:?}")]
    InvalidChar(char),
    #[error("service tag must not start or end with a hyphen or contain \"--\"")]
    MisplacedHyphen,
}
