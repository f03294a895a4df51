//! Dotted paths into JSON business objects
//!
//! Path parts are separated by `.`; a trailing `[]` on a part is ignored
//! when reading and marks an array when writing. Numeric parts index into
//! arrays.

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Key under which parse stores one view per segment
pub const SEGMENTS_KEY: &str = "_segments";
/// Key under which parse stores occurrences per tag
pub const SEGMENT_COUNTS_KEY: &str = "_segment_counts";
/// Tag field inside a segment view
pub const TAG_KEY: &str = "_tag";
/// Scan index field inside a segment view
pub const POSITION_KEY: &str = "_position";

fn parts(path: &str) -> impl Iterator<Item = &str> {
    path.split('.')
        .map(|p| p.trim().trim_end_matches("[]"))
        .filter(|p| !p.is_empty())
}

/// Value at a dotted path
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in parts(path) {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Object at a dotted path, created on the way when missing
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] when a part already holds a non-object.
pub fn object_at<'a>(root: &'a mut Map<String, Value>, path: &str) -> Result<&'a mut Map<String, Value>> {
    let mut current = root;
    for part in parts(path) {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => return Err(Error::invalid_path(path, format!("'{part}' is not an object"))),
        };
    }
    Ok(current)
}

/// Array at a dotted path, created on the way when missing
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] when the path is empty or a part holds a
/// value of the wrong kind.
pub fn array_at<'a>(root: &'a mut Map<String, Value>, path: &str) -> Result<&'a mut Vec<Value>> {
    let trimmed = path.trim().trim_end_matches("[]");
    let (parent, key) = match trimmed.rsplit_once('.') {
        Some((parent, key)) => (parent, key),
        None => ("", trimmed),
    };
    let key = key.trim_end_matches("[]");
    if key.is_empty() {
        return Err(Error::invalid_path(path, "empty array key"));
    }
    let parent = object_at(root, parent)?;
    match parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(items) => Ok(items),
        _ => Err(Error::invalid_path(path, format!("'{key}' is not an array"))),
    }
}

/// Items of a loop collection; a scalar or object counts as one item
pub fn array_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Check if a value carries data
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Segment views recorded by parse
pub fn segment_views(root: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    root.get(SEGMENTS_KEY)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Tag of a segment view
pub fn view_tag(view: &Map<String, Value>) -> &str {
    view.get(TAG_KEY).and_then(Value::as_str).unwrap_or_default()
}

/// Scalar element value of a segment view; composites yield `C01`
pub fn view_element(view: &Map<String, Value>, key: &str) -> Option<String> {
    match view.get(key)? {
        Value::Object(comps) => comps.get("C01").map(x12_schema::config::value_to_string),
        other => Some(x12_schema::config::value_to_string(other)),
    }
}

/// Copy of an object without keys starting with `_`
///
/// Parse records segment views next to the mapped fields; this strips
/// them so two business objects can be compared.
pub fn business_view(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .map(|(k, v)| (k.clone(), business_view(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(business_view).collect()),
        other => other.clone(),
    }
}
