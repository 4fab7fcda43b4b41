use std::collections::BTreeMap;
use std::ops::Index;

use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::error::RpcError;

/// Largest position accepted when a response arrives as a sparse `{"<n>": ..}` object.
const MAX_SPARSE_POSITION: usize = 255;

pub type Table = BTreeMap<String, Value>;

/// One decoded return value of a remote command.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Table(Table),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Lua truthiness: only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Numbers truncate toward zero.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|value| value as i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Looks up `key` when this value is a table.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_table().and_then(|table| table.get(key))
    }

    /// The Lua sequence part of a table: values at keys `1..n`, stopping at the first gap.
    pub fn as_sequence(&self) -> Option<Vec<&Value>> {
        let table = self.as_table()?;
        Some(
            (1..)
                .map_while(|position: usize| table.get(&position.to_string()))
                .collect(),
        )
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(value) => Value::Bool(value),
            Json::Number(number) => Value::Number(number.as_f64().unwrap_or(f64::NAN)),
            Json::String(value) => Value::String(value),
            // Lua sequences: 1-based keys.
            Json::Array(items) => Value::Table(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(idx, item)| ((idx + 1).to_string(), Value::from(item)))
                    .collect(),
            ),
            Json::Object(map) => Value::Table(
                map.into_iter()
                    .map(|(key, item)| (key, Value::from(item)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a positional array, found {0}")]
    NotPositional(&'static str),
    #[error("sparse position {0} is out of range")]
    PositionOutOfRange(usize),
}

/// Ordered return values of one command, exactly as the remote script produced them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response(Vec<Value>);

impl Response {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Decodes one inbound response frame.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        match serde_json::from_slice::<Json>(frame)? {
            Json::Array(items) => Ok(Self(items.into_iter().map(Value::from).collect())),
            Json::Object(map) => positional_from_object(map).map(Self),
            other => Err(DecodeError::NotPositional(json_kind(&other))),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn value_at(&self, index: usize) -> Result<&Value, RpcError> {
        self.0.get(index).ok_or(RpcError::MissingValue { index })
    }

    pub fn bool_at(&self, index: usize) -> Result<bool, RpcError> {
        let value = self.value_at(index)?;
        value
            .as_bool()
            .ok_or_else(|| mismatch(index, "boolean", value))
    }

    pub fn number_at(&self, index: usize) -> Result<f64, RpcError> {
        let value = self.value_at(index)?;
        value.as_f64().ok_or_else(|| mismatch(index, "number", value))
    }

    pub fn int_at(&self, index: usize) -> Result<i64, RpcError> {
        let value = self.value_at(index)?;
        value.as_i64().ok_or_else(|| mismatch(index, "number", value))
    }

    pub fn string_at(&self, index: usize) -> Result<&str, RpcError> {
        let value = self.value_at(index)?;
        value.as_str().ok_or_else(|| mismatch(index, "string", value))
    }

    pub fn table_at(&self, index: usize) -> Result<&Table, RpcError> {
        let value = self.value_at(index)?;
        value.as_table().ok_or_else(|| mismatch(index, "table", value))
    }

    /// A list of strings at `index`. A `nil` there reads as an empty list.
    pub fn strings_at(&self, index: usize) -> Result<Vec<String>, RpcError> {
        let value = self.value_at(index)?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        let items = value
            .as_sequence()
            .ok_or_else(|| mismatch(index, "table", value))?;
        items
            .into_iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| mismatch(index, "string list", item))
            })
            .collect()
    }

    /// The `reason` of a `(false|nil, reason)` failure return, if that is what this is.
    pub fn remote_error(&self) -> Option<&str> {
        match (self.0.first(), self.0.get(1)) {
            (Some(first), Some(Value::String(reason))) if !first.is_truthy() => Some(reason),
            _ => None,
        }
    }
}

impl From<Vec<Value>> for Response {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl Index<usize> for Response {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IntoIterator for Response {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn mismatch(index: usize, expected: &'static str, found: &Value) -> RpcError {
    RpcError::UnexpectedDatatype {
        index,
        expected,
        found: found.kind(),
    }
}

// Lua tables with nil holes serialize as objects keyed by position.
fn positional_from_object(map: Map<String, Json>) -> Result<Vec<Value>, DecodeError> {
    let mut slots = Vec::with_capacity(map.len());
    for (key, item) in map {
        let position = key
            .parse::<usize>()
            .ok()
            .filter(|position| *position >= 1)
            .ok_or(DecodeError::NotPositional("object"))?;
        if position > MAX_SPARSE_POSITION {
            return Err(DecodeError::PositionOutOfRange(position));
        }
        slots.push((position, Value::from(item)));
    }

    let len = slots.iter().map(|(position, _)| *position).max().unwrap_or(0);
    let mut values = vec![Value::Null; len];
    for (position, value) in slots {
        values[position - 1] = value;
    }
    Ok(values)
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn decodes_heterogeneous_array_in_order() {
        let response =
            Response::decode(br#"[true, 3.5, "dirt", null, {"name": "minecraft:stone"}]"#)
                .expect("decode");
        assert_eq!(response.len(), 5);
        assert!(response.bool_at(0).expect("bool"));
        assert_eq!(response.number_at(1).expect("number"), 3.5);
        assert_eq!(response.string_at(2).expect("string"), "dirt");
        assert!(response[3].is_null());
        assert_eq!(
            response[4].get("name").and_then(Value::as_str),
            Some("minecraft:stone")
        );
    }

    #[test_timeout::timeout]
    fn nested_arrays_become_one_based_tables() {
        let response = Response::decode(br#"[["a", "b"]]"#).expect("decode");
        let table = response.table_at(0).expect("table");
        assert_eq!(table.get("1"), Some(&Value::from("a")));
        assert_eq!(table.get("2"), Some(&Value::from("b")));
    }

    #[test_timeout::timeout]
    fn string_lists_keep_sequence_order() {
        let names: Vec<String> = (1..=12).map(|n| format!("chest_{n}")).collect();
        let frame = serde_json::to_vec(&serde_json::json!([names, null, {"1": "a", "3": "c"}]))
            .expect("encode");
        let response = Response::decode(&frame).expect("decode");
        assert_eq!(response.strings_at(0).expect("names"), names);
        assert!(response.strings_at(1).expect("nil").is_empty());
        // a gap ends the sequence
        assert_eq!(response.strings_at(2).expect("prefix"), vec!["a".to_string()]);
    }

    #[test_timeout::timeout]
    fn sparse_object_fills_holes_with_null() {
        let response = Response::decode(br#"{"2": "No fuel"}"#).expect("decode");
        assert_eq!(response.values(), &[Value::Null, Value::from("No fuel")]);
        assert_eq!(response.remote_error(), Some("No fuel"));
    }

    #[test_timeout::timeout]
    fn empty_object_is_empty_response() {
        let response = Response::decode(b"{}").expect("decode");
        assert!(response.is_empty());
    }

    #[test_timeout::timeout]
    fn rejects_non_positional_payloads() {
        assert!(matches!(
            Response::decode(br#"{"name": "x"}"#),
            Err(DecodeError::NotPositional("object"))
        ));
        assert!(matches!(
            Response::decode(b"\"text\""),
            Err(DecodeError::NotPositional("string"))
        ));
        assert!(matches!(
            Response::decode(b"not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            Response::decode(br#"{"4096": 1}"#),
            Err(DecodeError::PositionOutOfRange(4096))
        ));
    }

    #[test_timeout::timeout]
    fn accessor_mismatch_is_typed() {
        let response = Response::decode(br#"[0]"#).expect("decode");
        match response.bool_at(0) {
            Err(RpcError::UnexpectedDatatype {
                index,
                expected,
                found,
            }) => {
                assert_eq!(index, 0);
                assert_eq!(expected, "boolean");
                assert_eq!(found, "number");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            response.string_at(1),
            Err(RpcError::MissingValue { index: 1 })
        ));
    }

    #[test_timeout::timeout]
    fn truthy_first_value_is_not_a_remote_error() {
        let response = Response::decode(br#"[true, "minecraft:stone"]"#).expect("decode");
        assert_eq!(response.remote_error(), None);
        let response = Response::decode(br#"[false, "Movement obstructed"]"#).expect("decode");
        assert_eq!(response.remote_error(), Some("Movement obstructed"));
    }

    #[test_timeout::timeout]
    fn int_truncates_toward_zero() {
        let response = Response::decode(br#"[-2.7, 20000]"#).expect("decode");
        assert_eq!(response.int_at(0).expect("int"), -2);
        assert_eq!(response.int_at(1).expect("int"), 20000);
    }
}
