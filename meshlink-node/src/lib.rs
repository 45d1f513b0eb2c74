//! Meshlink node: the actor that owns a MeshCore, its configuration, and an
//! in-process mesh transport for running several nodes in one process.

pub mod config;
pub mod mesh;
pub mod node;

pub use mesh::{LocalMesh, LocalTransport};
pub use node::{spawn, Command, EventSink, NodeError, NodeHandle, NodeStatus, Spawned};
