use std::time::Duration;

use cc_link::actions::{action_bool, action_int, action_string, action_unit, execute_checked};
use cc_link::{Client, Context, RpcError, SharedConnection, Value};
use serde::Serialize;
use tracing::debug;

use crate::lua;
use crate::side::Side;

/// World coordinates reported by GPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

/// Value type a defined setting is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    String,
    Number,
    Boolean,
    Table,
}

impl SettingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKind::String => "string",
            SettingKind::Number => "number",
            SettingKind::Boolean => "boolean",
            SettingKind::Table => "table",
        }
    }
}

/// The optional fields of `settings.define`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingOptions {
    pub description: Option<String>,
    pub default: Option<Value>,
    pub kind: Option<SettingKind>,
}

impl SettingOptions {
    fn to_lua(&self) -> Option<String> {
        let mut fields = Vec::new();
        if let Some(description) = &self.description {
            fields.push(format!("description = {}", lua::quote(description)));
        }
        if let Some(default) = &self.default {
            fields.push(format!("default = {}", lua::literal(default)));
        }
        if let Some(kind) = self.kind {
            fields.push(format!("type = {}", lua::quote(kind.as_str())));
        }
        if fields.is_empty() {
            None
        } else {
            Some(format!("{{{}}}", fields.join(", ")))
        }
    }
}

/// Commands every ComputerCraft computer understands.
///
/// Each call looks up the client's current connection, so a `Computer` survives reconnects.
/// While the device is offline every call succeeds against the no-op connection.
#[derive(Debug, Clone)]
pub struct Computer {
    client: Client,
}

impl Computer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn conn(&self) -> SharedConnection {
        self.client.connection()
    }

    pub async fn version(&self, cx: &Context) -> Result<String, RpcError> {
        action_string(cx, self.conn().as_ref(), "os.version()").await
    }

    pub async fn computer_id(&self, cx: &Context) -> Result<i64, RpcError> {
        action_int(cx, self.conn().as_ref(), "os.getComputerID()").await
    }

    /// `None` when no label is set.
    pub async fn computer_label(&self, cx: &Context) -> Result<Option<String>, RpcError> {
        let response = execute_checked(cx, self.conn().as_ref(), "os.getComputerLabel()").await?;
        match response.get(0) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => response.string_at(0).map(|label| Some(label.to_string())),
        }
    }

    /// An empty label clears it.
    pub async fn set_computer_label(&self, cx: &Context, label: &str) -> Result<(), RpcError> {
        let command = if label.is_empty() {
            "os.setComputerLabel()".to_string()
        } else {
            format!("os.setComputerLabel({})", lua::quote(label))
        };
        action_unit(cx, self.conn().as_ref(), &command).await
    }

    pub async fn shutdown(&self, cx: &Context) -> Result<(), RpcError> {
        action_unit(cx, self.conn().as_ref(), "os.shutdown()").await
    }

    pub async fn reboot(&self, cx: &Context) -> Result<(), RpcError> {
        action_unit(cx, self.conn().as_ref(), "os.reboot()").await
    }

    /// Time since the computer booted.
    pub async fn uptime(&self, cx: &Context) -> Result<Duration, RpcError> {
        let response = execute_checked(cx, self.conn().as_ref(), "os.clock()").await?;
        let secs = response.number_at(0)?;
        Ok(Duration::try_from_secs_f64(secs).unwrap_or_default())
    }

    /// In-game time of day, in hours.
    pub async fn time(&self, cx: &Context) -> Result<f64, RpcError> {
        execute_checked(cx, self.conn().as_ref(), "os.time()")
            .await?
            .number_at(0)
    }

    /// Asks GPS hosts for this computer's position. `None` if it could not be determined.
    pub async fn locate(&self, cx: &Context, timeout: Duration) -> Result<Option<Position>, RpcError> {
        let command = format!("gps.locate({}, false)", lua::number(timeout.as_secs_f64()));
        let response = self.conn().execute(cx, &command).await?;
        if response.len() < 3 || response[0].is_null() {
            debug!(device_key = %self.client.key(), "gps position unavailable");
            return Ok(None);
        }
        Ok(Some(Position {
            x: response.int_at(0)?,
            y: response.int_at(1)?,
            z: response.int_at(2)?,
        }))
    }

    pub async fn input(&self, cx: &Context, side: Side) -> Result<bool, RpcError> {
        let command = format!("redstone.getInput({})", lua::quote(side.as_str()));
        action_bool(cx, self.conn().as_ref(), &command).await
    }

    pub async fn set_output(&self, cx: &Context, side: Side, on: bool) -> Result<(), RpcError> {
        let command = format!("redstone.setOutput({}, {on})", lua::quote(side.as_str()));
        action_unit(cx, self.conn().as_ref(), &command).await
    }

    pub async fn analog_input(&self, cx: &Context, side: Side) -> Result<u8, RpcError> {
        let command = format!("redstone.getAnalogInput({})", lua::quote(side.as_str()));
        let strength = action_int(cx, self.conn().as_ref(), &command).await?;
        Ok(strength.clamp(0, 15) as u8)
    }

    /// Signal strength is clamped to 0..=15.
    pub async fn set_analog_output(&self, cx: &Context, side: Side, strength: u8) -> Result<(), RpcError> {
        let command = format!(
            "redstone.setAnalogOutput({}, {})",
            lua::quote(side.as_str()),
            strength.min(15)
        );
        action_unit(cx, self.conn().as_ref(), &command).await
    }

    /// `None` when the setting is unset and has no default.
    pub async fn setting_get(&self, cx: &Context, name: &str) -> Result<Option<Value>, RpcError> {
        let command = format!("settings.get({})", lua::quote(name));
        let response = execute_checked(cx, self.conn().as_ref(), &command).await?;
        Ok(response.into_values().into_iter().next().filter(|value| !value.is_null()))
    }

    pub async fn setting_set(
        &self,
        cx: &Context,
        name: &str,
        value: impl Into<Value> + Send,
    ) -> Result<(), RpcError> {
        let command = format!("settings.set({}, {})", lua::quote(name), lua::literal(&value.into()));
        action_unit(cx, self.conn().as_ref(), &command).await
    }

    pub async fn setting_unset(&self, cx: &Context, name: &str) -> Result<(), RpcError> {
        let command = format!("settings.unset({})", lua::quote(name));
        action_unit(cx, self.conn().as_ref(), &command).await
    }

    pub async fn setting_define(
        &self,
        cx: &Context,
        name: &str,
        options: &SettingOptions,
    ) -> Result<(), RpcError> {
        let command = match options.to_lua() {
            Some(table) => format!("settings.define({}, {table})", lua::quote(name)),
            None => format!("settings.define({})", lua::quote(name)),
        };
        action_unit(cx, self.conn().as_ref(), &command).await
    }

    /// Drops the definition; a value that was set stays.
    pub async fn setting_undefine(&self, cx: &Context, name: &str) -> Result<(), RpcError> {
        let command = format!("settings.undefine({})", lua::quote(name));
        action_unit(cx, self.conn().as_ref(), &command).await
    }

    /// Unsets every setting.
    pub async fn settings_clear(&self, cx: &Context) -> Result<(), RpcError> {
        action_unit(cx, self.conn().as_ref(), "settings.clear()").await
    }

    /// Names of every setting that is set or defined, sorted by the device.
    pub async fn setting_names(&self, cx: &Context) -> Result<Vec<String>, RpcError> {
        execute_checked(cx, self.conn().as_ref(), "settings.getNames()")
            .await?
            .strings_at(0)
    }

    /// Merges settings from `path`, or from `.settings` when `None`. `false` if the file is unreadable.
    pub async fn settings_load(&self, cx: &Context, path: Option<&str>) -> Result<bool, RpcError> {
        let command = match path {
            Some(path) => format!("settings.load({})", lua::quote(path)),
            None => "settings.load()".to_string(),
        };
        action_bool(cx, self.conn().as_ref(), &command).await
    }

    /// Writes settings to `path`, or to `.settings` when `None`.
    pub async fn settings_save(&self, cx: &Context, path: Option<&str>) -> Result<bool, RpcError> {
        let command = match path {
            Some(path) => format!("settings.save({})", lua::quote(path)),
            None => "settings.save()".to_string(),
        };
        action_bool(cx, self.conn().as_ref(), &command).await
    }
}

impl From<Client> for Computer {
    fn from(client: Client) -> Self {
        Self::new(client)
    }
}
