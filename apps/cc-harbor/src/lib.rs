//! cc-harbor: accepts ComputerCraft devices over websockets and keeps a registry of them.

pub mod config;
pub mod server;
pub mod socket;
pub mod telemetry;

pub use config::{Cli, ServerConfig};
pub use server::{DeviceEvent, DeviceSummary, Harbor};
