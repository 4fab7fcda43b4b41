use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Connection, HandshakeData, SharedConnection};
use crate::context::Context;
use crate::error::RpcError;
use crate::value::{Response, Value};

/// Stand-in used while a client has no live device. Every command "succeeds" with `[0]`.
#[derive(Debug)]
pub struct NopConnection {
    handshake: HandshakeData,
    context: CancellationToken,
}

impl NopConnection {
    pub fn new() -> Self {
        Self {
            handshake: HandshakeData::default(),
            context: CancellationToken::new(),
        }
    }

    /// Process-wide instance.
    pub fn shared() -> SharedConnection {
        static NOP: OnceLock<Arc<NopConnection>> = OnceLock::new();
        let nop = NOP.get_or_init(|| Arc::new(NopConnection::new()));
        Arc::clone(nop) as SharedConnection
    }
}

impl Default for NopConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for NopConnection {
    fn id(&self) -> Uuid {
        Uuid::nil()
    }

    fn handshake(&self) -> &HandshakeData {
        &self.handshake
    }

    async fn execute(&self, _cx: &Context, _command: &str) -> Result<Response, RpcError> {
        Ok(Response::new(vec![Value::Number(0.0)]))
    }

    fn context(&self) -> CancellationToken {
        self.context.clone()
    }

    fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }

    fn is_nop(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::tokio_timeout_test]
    async fn answers_zero_even_with_a_cancelled_context() {
        let nop = NopConnection::shared();
        let cx = Context::background();
        cx.cancel();
        let response = nop.execute(&cx, "os.shutdown()").await.expect("nop");
        assert_eq!(response.values(), &[Value::Number(0.0)]);
        assert_eq!(response.int_at(0).expect("int"), 0);
    }

    #[test_timeout::tokio_timeout_test]
    async fn close_is_a_no_op() {
        let nop = NopConnection::shared();
        nop.close();
        assert!(!nop.is_closed());
        assert!(!nop.context().is_cancelled());
        assert!(Arc::ptr_eq(&nop, &NopConnection::shared()));
    }
}
