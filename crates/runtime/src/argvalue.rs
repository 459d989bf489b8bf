// SPDX-License-Identifier: MIT

//! Conversions from `serde_json::Value` properties to the bare strings qemu
//! and docker argv assembly expect (no surrounding quotes for strings).

use serde_json::Value;

pub fn value_to_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

pub fn get_u64(properties: &zd_core::PropertyMap, key: &str, default: u64) -> u64 {
    properties.get(key).and_then(Value::as_u64).unwrap_or(default)
}

pub fn get_str<'a>(properties: &'a zd_core::PropertyMap, key: &str) -> Option<&'a str> {
    properties.get(key).and_then(Value::as_str)
}
