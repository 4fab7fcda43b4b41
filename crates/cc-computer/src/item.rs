use std::fmt;

use cc_link::{Table, Value};

/// What `turtle.getItemDetail` reports about an inventory slot.
///
/// Detailed reads add fields such as `displayName`, `maxCount` and `tags`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemDetail(Table);

impl ItemDetail {
    pub fn new(data: Table) -> Self {
        Self(data)
    }

    pub fn name(&self) -> &str {
        self.0.get("name").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn count(&self) -> i64 {
        self.0.get("count").and_then(Value::as_i64).unwrap_or(0)
    }

    /// Only present on detailed reads.
    pub fn display_name(&self) -> Option<&str> {
        self.0.get("displayName").and_then(Value::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.0
            .get("tags")
            .and_then(Value::as_table)
            .is_some_and(|tags| tags.contains_key(tag))
    }

    pub fn data(&self) -> &Table {
        &self.0
    }
}

impl fmt::Display for ItemDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.count(), self.name())
    }
}
