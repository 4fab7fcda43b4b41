use std::fmt;

use cc_link::{Table, Value};

/// What `turtle.inspect` reports about a block in the world.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block(Table);

impl Block {
    pub fn new(data: Table) -> Self {
        Self(data)
    }

    /// Registry name such as `minecraft:stone`; empty when absent.
    pub fn name(&self) -> &str {
        self.0.get("name").and_then(Value::as_str).unwrap_or_default()
    }

    /// Growth stage of crops, or -1 for blocks without an age.
    pub fn age(&self) -> i64 {
        self.0
            .get("state")
            .and_then(|state| state.get("age"))
            .and_then(Value::as_i64)
            .unwrap_or(-1)
    }

    pub fn tags(&self) -> Vec<&str> {
        match self.0.get("tags").and_then(Value::as_table) {
            Some(tags) => tags.keys().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }

    pub fn contains_tag(&self, tag: &str) -> bool {
        self.0
            .get("tags")
            .and_then(Value::as_table)
            .is_some_and(|tags| tags.contains_key(tag))
    }

    pub fn data(&self) -> &Table {
        &self.0
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[age={},tags={}]", self.name(), self.age(), self.tags().len())
    }
}
