use thiserror::Error;

/// An optional API (`turtle`, `peripheral`, `gps`, ...) is not loaded on the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("module ({0}) not present")]
pub struct ModuleNotPresent(pub String);
