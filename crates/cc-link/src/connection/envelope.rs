use bytes::Bytes;
use serde_json::{json, Value as Json};

const PREFIX: &str = "return {";
const SUFFIX: &str = "}";

/// Wraps a command as `{"func":"return {<command>}"}` so its return values come back as one array.
pub fn encode_command(command: &str) -> Bytes {
    let func = format!("{PREFIX}{command}{SUFFIX}");
    Bytes::from(json!({ "func": func }).to_string())
}

/// Inverse of [`encode_command`]; used by device simulators.
pub fn decode_command(frame: &[u8]) -> Option<String> {
    let envelope: Json = serde_json::from_slice(frame).ok()?;
    let func = envelope.get("func")?.as_str()?;
    func.strip_prefix(PREFIX)?
        .strip_suffix(SUFFIX)
        .map(str::to_string)
}
