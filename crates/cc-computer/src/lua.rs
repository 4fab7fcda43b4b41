//! Rendering Rust values as Lua source for command strings.

use std::fmt::Write;

use cc_link::Value;

/// A double-quoted Lua string literal.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                // decimal escapes must be zero-padded so a following digit is not absorbed
                let _ = write!(out, "\\{:03}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn number(value: f64) -> String {
    if value.is_nan() {
        "(0/0)".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "math.huge" } else { "-math.huge" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Any [`Value`] as a Lua expression. Tables become `{["key"]=value,...}`.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(n) => number(*n),
        Value::String(text) => quote(text),
        Value::Table(table) => {
            let fields: Vec<String> = table
                .iter()
                .map(|(key, value)| format!("[{}]={}", quote(key), literal(value)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
    }
}
