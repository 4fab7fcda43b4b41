//! cc-link: the connection core for driving ComputerCraft devices over a websocket.
//!
//! Responsibilities:
//! - pumping websocket frames into bounded inbound/outbound queues
//! - the handshake that identifies a device and its type
//! - the strictly serialized execute protocol (one in-flight command per connection)
//! - reconnect-tolerant clients keyed by `host#id`, with an offline no-op fallback
//! - classifying devices by probing their capability globals

pub mod actions;
pub mod classify;
pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod device;
pub mod error;
pub mod registry;
pub mod transport;
pub mod value;

pub use classify::{classify, resolve_device_type};
pub use client::Client;
pub use config::LinkConfig;
pub use connection::{
    Connection, HandshakeData, NopConnection, RemoteConnection, SharedConnection,
};
pub use context::Context;
pub use device::DeviceType;
pub use error::{ContextError, HandshakeError, RpcError, TransportError};
pub use registry::Registry;
pub use transport::{FrameSink, FrameSource, Outbound, TransportAdapter};
pub use value::{Response, Table, Value};
