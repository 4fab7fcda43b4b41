use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a connected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Computer,
    Turtle,
    Pocket,
    #[default]
    Unknown,
}

impl DeviceType {
    /// Parses the optional `type` tag of a handshake frame. Unrecognised tags map to `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "computer" => DeviceType::Computer,
            "turtle" => DeviceType::Turtle,
            "pocket" => DeviceType::Pocket,
            _ => DeviceType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Computer => "computer",
            DeviceType::Turtle => "turtle",
            DeviceType::Pocket => "pocket",
            DeviceType::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, DeviceType::Unknown)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn tags_are_case_insensitive() {
        assert_eq!(DeviceType::from_tag("Turtle"), DeviceType::Turtle);
        assert_eq!(DeviceType::from_tag(" pocket "), DeviceType::Pocket);
        assert_eq!(DeviceType::from_tag("command"), DeviceType::Unknown);
    }
}
