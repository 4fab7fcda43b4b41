//! Attached peripherals and optional APIs.

use cc_link::actions::{action_bool, execute_checked};
use cc_link::{Context, Response, RpcError, Value};
use tracing::debug;

use crate::computer::Computer;
use crate::error::ModuleNotPresent;
use crate::lua;

impl Computer {
    /// Names of every attached peripheral: sides and wired-network names alike.
    pub async fn peripheral_names(&self, cx: &Context) -> Result<Vec<String>, RpcError> {
        execute_checked(cx, self.conn().as_ref(), "peripheral.getNames()")
            .await?
            .strings_at(0)
    }

    pub async fn peripheral_present(&self, cx: &Context, name: &str) -> Result<bool, RpcError> {
        let command = format!("peripheral.isPresent({})", lua::quote(name));
        action_bool(cx, self.conn().as_ref(), &command).await
    }

    /// Every type the peripheral reports, primary type first. Empty when nothing is attached.
    pub async fn peripheral_types(&self, cx: &Context, name: &str) -> Result<Vec<String>, RpcError> {
        let command = format!("peripheral.getType({})", lua::quote(name));
        let response = self.conn().execute(cx, &command).await?;
        Ok(response
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    /// `false` when nothing is attached under `name`.
    pub async fn peripheral_has_type(
        &self,
        cx: &Context,
        name: &str,
        kind: &str,
    ) -> Result<bool, RpcError> {
        let command = format!(
            "peripheral.hasType({}, {})",
            lua::quote(name),
            lua::quote(kind)
        );
        let response = self.conn().execute(cx, &command).await?;
        Ok(matches!(response.get(0), Some(Value::Bool(true))))
    }

    pub async fn peripheral_methods(&self, cx: &Context, name: &str) -> Result<Vec<String>, RpcError> {
        let command = format!("peripheral.getMethods({})", lua::quote(name));
        self.conn().execute(cx, &command).await?.strings_at(0)
    }

    /// Invokes `method` on a peripheral. The return values are passed through untouched.
    pub async fn peripheral_call(
        &self,
        cx: &Context,
        name: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Response, RpcError> {
        let mut command = format!("peripheral.call({}, {}", lua::quote(name), lua::quote(method));
        for arg in args {
            command.push_str(", ");
            command.push_str(&lua::literal(arg));
        }
        command.push(')');
        self.conn().execute(cx, &command).await
    }

    /// Whether the global API `module` is loaded. Errors read as absent.
    pub async fn has_module(&self, cx: &Context, module: &str) -> bool {
        if !is_global_path(module) {
            debug!(module, "not a global name");
            return false;
        }
        let command = format!("{module} ~= nil");
        match self.conn().execute(cx, &command).await {
            Ok(response) => matches!(response.get(0), Some(Value::Bool(true))),
            Err(err) => {
                debug!(device_key = %self.client().key(), module, error = %err, "module probe failed");
                false
            }
        }
    }

    pub async fn require_module(&self, cx: &Context, module: &str) -> Result<(), ModuleNotPresent> {
        if self.has_module(cx, module).await {
            Ok(())
        } else {
            Err(ModuleNotPresent(module.to_string()))
        }
    }
}

/// `name` or `name.field`, made of Lua identifiers only.
fn is_global_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
