//! Dotted-path traversal over JSON objects.
//!
//! A path like `users.alice.age` addresses the `age` field of the object at
//! `alice` inside the object at `users`. The first segment is the *root key*,
//! which determines shard-file placement; the rest walk nested objects.

use serde_json::{Map, Value};

use crate::error::{DbError, Result};

/// Returns the first dot-separated segment of `path`, which decides the
/// owning shard file.
pub fn root_key(path: &str) -> &str {
    match path.find('.') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Sets `value` at `path` inside `doc`, creating empty objects for missing
/// intermediate segments.
///
/// # Errors
/// Returns [`DbError::PathConflict`] if an intermediate segment exists but is
/// not an object; `doc` is left with any intermediates created so far.
pub fn nested_set(doc: &mut Map<String, Value>, path: &str, value: Value) -> Result<()> {
    let parts: Vec<&str> = path.split('.').collect();
    let last = parts.len() - 1;

    let mut current = doc;
    for (i, part) in parts.iter().enumerate() {
        if i == last {
            current.insert((*part).to_string(), value);
            break;
        }
        let slot = current
            .entry((*part).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match slot {
            Value::Object(map) => current = map,
            _ => return Err(DbError::PathConflict((*part).to_string())),
        }
    }
    Ok(())
}

/// Resolves `path` inside `doc`. Returns `None` if any segment is missing or
/// an intermediate is not an object.
pub fn nested_get<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Removes the value at `path` inside `doc`. Returns `true` if something was
/// removed. Intermediate objects emptied by the removal are left in place.
pub fn nested_remove(doc: &mut Map<String, Value>, path: &str) -> bool {
    let parts: Vec<&str> = path.split('.').collect();
    let last = parts.len() - 1;

    let mut current = doc;
    for (i, part) in parts.iter().enumerate() {
        if i == last {
            return current.remove(*part).is_some();
        }
        current = match current.get_mut(*part) {
            Some(Value::Object(map)) => map,
            _ => return false,
        };
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_key_of_plain_and_dotted_paths() {
        assert_eq!(root_key("users"), "users");
        assert_eq!(root_key("users.alice.age"), "users");
    }

    #[test]
    fn set_creates_intermediates() {
        let mut doc = Map::new();
        nested_set(&mut doc, "a.b.c", json!(1)).unwrap();
        assert_eq!(Value::Object(doc), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn set_overwrites_terminal() {
        let mut doc = Map::new();
        nested_set(&mut doc, "a.b", json!(1)).unwrap();
        nested_set(&mut doc, "a.b", json!({"x": true})).unwrap();
        assert_eq!(Value::Object(doc), json!({"a": {"b": {"x": true}}}));
    }

    #[test]
    fn set_fails_on_non_object_intermediate() {
        let mut doc = Map::new();
        nested_set(&mut doc, "a", json!(7)).unwrap();
        let err = nested_set(&mut doc, "a.b", json!(1)).unwrap_err();
        assert!(matches!(err, DbError::PathConflict(seg) if seg == "a"));
    }

    #[test]
    fn get_walks_nested_objects() {
        let doc = match json!({"users": {"alice": {"age": 30}}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert_eq!(nested_get(&doc, "users.alice.age"), Some(&json!(30)));
        assert_eq!(nested_get(&doc, "users.alice"), Some(&json!({"age": 30})));
        assert_eq!(nested_get(&doc, "users.bob"), None);
        // intermediate is a number, not an object
        assert_eq!(nested_get(&doc, "users.alice.age.x"), None);
    }

    #[test]
    fn remove_deletes_leaf_only() {
        let mut doc = match json!({"users": {"alice": {"age": 30}, "bob": 1}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(nested_remove(&mut doc, "users.alice.age"));
        assert!(!nested_remove(&mut doc, "users.alice.age"));
        assert_eq!(
            Value::Object(doc),
            json!({"users": {"alice": {}, "bob": 1}})
        );
    }
}
