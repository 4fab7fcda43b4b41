use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::device::DeviceType;
use crate::error::HandshakeError;

/// Identity announced by a device in the first frame of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct HandshakeData {
    pub remote_id: String,
    pub remote_host: String,
    pub device_type: DeviceType,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HandshakeFrame {
    id: f64,
    #[serde(default)]
    label: Option<Json>,
    #[serde(default, rename = "type")]
    kind: Option<Json>,
}

impl HandshakeData {
    pub fn parse(frame: &[u8], remote_host: &str) -> Result<Self, serde_json::Error> {
        let frame: HandshakeFrame = serde_json::from_slice(frame)?;
        Ok(Self {
            remote_id: (frame.id as i64).to_string(),
            remote_host: remote_host.to_string(),
            device_type: frame
                .kind
                .as_ref()
                .and_then(Json::as_str)
                .map(DeviceType::from_tag)
                .unwrap_or_default(),
            label: frame
                .label
                .as_ref()
                .and_then(Json::as_str)
                .filter(|label| !label.is_empty())
                .map(str::to_string),
        })
    }

    /// Zero-value identity used when the handshake frame cannot be decoded.
    pub fn degraded(remote_host: &str) -> Self {
        Self {
            remote_id: "0".to_string(),
            remote_host: remote_host.to_string(),
            device_type: DeviceType::Unknown,
            label: None,
        }
    }

    /// Registry key, `<host>#<id>`.
    pub fn key(&self) -> String {
        format!("{}#{}", self.remote_host, self.remote_id)
    }
}

/// Reads exactly one frame. Only a missing frame is fatal; an undecodable one is not.
pub(crate) async fn perform(
    inbound: &mut mpsc::Receiver<Bytes>,
    remote_host: &str,
    timeout: Duration,
) -> Result<HandshakeData, HandshakeError> {
    let frame = match tokio::time::timeout(timeout, inbound.recv()).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return Err(HandshakeError::Closed),
        Err(_) => return Err(HandshakeError::Timeout(timeout)),
    };

    match HandshakeData::parse(&frame, remote_host) {
        Ok(handshake) => {
            debug!(
                remote_host,
                remote_id = %handshake.remote_id,
                device_type = %handshake.device_type,
                "handshake decoded"
            );
            Ok(handshake)
        }
        Err(err) => {
            warn!(
                remote_host,
                payload_size = frame.len(),
                error = %err,
                "handshake frame could not be decoded; continuing with unknown identity"
            );
            Ok(HandshakeData::degraded(remote_host))
        }
    }
}
