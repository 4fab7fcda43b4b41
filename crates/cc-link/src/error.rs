use std::time::Duration;

use thiserror::Error;

use crate::value::DecodeError;

/// Why a [`crate::Context`] stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send on closed channel")]
    SendOnClosed,
    #[error("outbound frame is not valid utf-8")]
    NotUtf8,
    #[error("websocket error: {0}")]
    WebSocket(String),
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("transport closed before the handshake frame arrived")]
    Closed,
    #[error("no handshake frame within {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by [`crate::Connection::execute`] and the typed response accessors.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The inbound queue closed before a response arrived.
    #[error("channel is closed")]
    ChannelClosed,
    #[error("send on closed channel")]
    SendOnClosed,
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("failed to decode response: {0}")]
    Decode(#[from] DecodeError),
    /// The call succeeded but the response had the wrong shape.
    #[error("unexpected datatype at position {index}: expected {expected}, found {found}")]
    UnexpectedDatatype {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("response has no value at position {index}")]
    MissingValue { index: usize },
    /// The device answered `(false|nil, reason)`.
    #[error("remote error: {0}")]
    Remote(String),
}

impl RpcError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Context(ContextError::DeadlineExceeded))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, RpcError::ChannelClosed | RpcError::SendOnClosed)
    }

    pub fn is_shape(&self) -> bool {
        matches!(
            self,
            RpcError::UnexpectedDatatype { .. } | RpcError::MissingValue { .. }
        )
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::SendOnClosed => RpcError::SendOnClosed,
            TransportError::NotUtf8 | TransportError::WebSocket(_) => RpcError::ChannelClosed,
        }
    }
}
