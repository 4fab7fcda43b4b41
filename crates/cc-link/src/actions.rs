//! Typed helpers for commands that follow the `(result, reason?)` return convention.

use crate::connection::Connection;
use crate::context::Context;
use crate::error::RpcError;
use crate::value::Response;

/// Executes `command`, turning a `(false|nil, reason)` return into [`RpcError::Remote`].
pub async fn execute_checked(
    cx: &Context,
    conn: &dyn Connection,
    command: &str,
) -> Result<Response, RpcError> {
    let response = conn.execute(cx, command).await?;
    if let Some(reason) = response.remote_error() {
        return Err(RpcError::Remote(reason.to_string()));
    }
    Ok(response)
}

pub async fn action_bool(cx: &Context, conn: &dyn Connection, command: &str) -> Result<bool, RpcError> {
    execute_checked(cx, conn, command).await?.bool_at(0)
}

pub async fn action_int(cx: &Context, conn: &dyn Connection, command: &str) -> Result<i64, RpcError> {
    execute_checked(cx, conn, command).await?.int_at(0)
}

pub async fn action_string(
    cx: &Context,
    conn: &dyn Connection,
    command: &str,
) -> Result<String, RpcError> {
    Ok(execute_checked(cx, conn, command).await?.string_at(0)?.to_string())
}

/// For commands whose only interesting outcome is failure.
pub async fn action_unit(cx: &Context, conn: &dyn Connection, command: &str) -> Result<(), RpcError> {
    execute_checked(cx, conn, command).await.map(|_| ())
}
