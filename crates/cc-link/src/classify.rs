use tracing::{debug, info};

use crate::connection::Connection;
use crate::context::Context;
use crate::device::DeviceType;

const TURTLE_PROBE: &str = "turtle ~= nil";
const POCKET_PROBE: &str = "pocket ~= nil";

/// Probes the device's capability globals. Never fails; errors read as "absent".
pub async fn classify(cx: &Context, conn: &dyn Connection) -> DeviceType {
    let device_type = if probe(cx, conn, TURTLE_PROBE).await {
        DeviceType::Turtle
    } else if probe(cx, conn, POCKET_PROBE).await {
        DeviceType::Pocket
    } else {
        DeviceType::Computer
    };
    info!(
        connection_id = %conn.id(),
        device_key = %conn.handshake().key(),
        %device_type,
        "device classified"
    );
    device_type
}

/// The handshake's type when it announced one, otherwise [`classify`].
pub async fn resolve_device_type(cx: &Context, conn: &dyn Connection) -> DeviceType {
    let announced = conn.handshake().device_type;
    if announced.is_known() {
        return announced;
    }
    classify(cx, conn).await
}

async fn probe(cx: &Context, conn: &dyn Connection, expression: &str) -> bool {
    match conn.execute(cx, expression).await {
        Ok(response) => matches!(response.get(0).and_then(|value| value.as_bool()), Some(true)),
        Err(err) => {
            debug!(connection_id = %conn.id(), probe = expression, error = %err, "probe failed");
            false
        }
    }
}
