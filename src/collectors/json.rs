//! Shared JSON-path helpers for projecting `DynamicObject`s (CRDs this
//! crate has no compiled Rust type for) into the uniform envelope structs.
//! Every accessor is defensive: a missing or mistyped field yields the
//! empty/default value rather than an error, matching the tolerant posture
//! `spec.md` §9 calls for around dynamic/version-variable CRDs.

use serde_json::Value;
use std::collections::BTreeMap;

pub fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cursor = value;
    for segment in path {
        cursor = cursor.get(segment)?;
    }
    cursor.as_str()
}

pub fn string_map_at(value: &Value, path: &[&str]) -> BTreeMap<String, String> {
    let mut cursor = value;
    for segment in path {
        match cursor.get(segment) {
            Some(v) => cursor = v,
            None => return BTreeMap::new(),
        }
    }
    cursor
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub fn string_array_at(value: &Value, path: &[&str]) -> Vec<String> {
    let mut cursor = value;
    for segment in path {
        match cursor.get(segment) {
            Some(v) => cursor = v,
            None => return Vec::new(),
        }
    }
    cursor
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

pub fn i64_at(value: &Value, path: &[&str]) -> Option<i64> {
    let mut cursor = value;
    for segment in path {
        cursor = cursor.get(segment)?;
    }
    cursor.as_i64()
}
