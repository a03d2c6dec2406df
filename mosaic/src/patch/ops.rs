//! Structured operation-list patches.
//!
//! An operation list is a JSON array whose elements are either operation
//! objects (`{"op": "...", "path": "/json/pointer", "value": ...}`) or
//! nested arrays, which recurse. Supported operations: `add`, `remove`,
//! `replace`, `test`.
//!
//! Failure scope: any failing operation — a `test` mismatch, a dangling
//! pointer — aborts the remainder of **its own list only**. Mutations
//! already applied by that list are kept, not rolled back, and enclosing
//! lists continue with their next element.

use serde_json::Value;
use tracing::warn;

/// Applies one operation list to `doc`, in place.
pub(crate) fn apply_operation_list(doc: &mut Value, list: &[Value], patch_path: &str) {
    for (index, element) in list.iter().enumerate() {
        match element {
            Value::Array(nested) => apply_operation_list(doc, nested, patch_path),
            Value::Object(_) => {
                if let Err(reason) = apply_operation(doc, element) {
                    warn!(patch = %patch_path, index, reason = %reason,
                        "operation failed, aborting remainder of list");
                    return;
                }
            }
            other => {
                warn!(patch = %patch_path, index, element = %other,
                    "malformed operation element, aborting remainder of list");
                return;
            }
        }
    }
}

fn apply_operation(doc: &mut Value, op: &Value) -> Result<(), String> {
    let name = op
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'op' field".to_string())?;
    let pointer = op
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'path' field".to_string())?;

    match name {
        "add" => {
            let value = op.get("value").ok_or("'add' requires a value")?.clone();
            add(doc, pointer, value)
        }
        "remove" => remove(doc, pointer),
        "replace" => {
            let value = op.get("value").ok_or("'replace' requires a value")?.clone();
            replace(doc, pointer, value)
        }
        "test" => {
            let expected = op.get("value").ok_or("'test' requires a value")?;
            let actual = doc
                .pointer(pointer)
                .ok_or_else(|| format!("test pointer '{pointer}' not found"))?;
            if actual == expected {
                Ok(())
            } else {
                Err(format!("test failed at '{pointer}'"))
            }
        }
        other => Err(format!("unsupported op '{other}'")),
    }
}

fn add(doc: &mut Value, pointer: &str, value: Value) -> Result<(), String> {
    if pointer.is_empty() {
        *doc = value;
        return Ok(());
    }
    let (parent_ptr, token) = split_pointer(pointer)?;
    let parent = doc
        .pointer_mut(&parent_ptr)
        .ok_or_else(|| format!("parent of '{pointer}' not found"))?;
    match parent {
        Value::Object(map) => {
            map.insert(token, value);
            Ok(())
        }
        Value::Array(items) => {
            if token == "-" {
                items.push(value);
                return Ok(());
            }
            let index: usize = token
                .parse()
                .map_err(|_| format!("bad array index '{token}'"))?;
            if index > items.len() {
                return Err(format!("array index {index} out of bounds"));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(format!("parent of '{pointer}' is not a container")),
    }
}

fn remove(doc: &mut Value, pointer: &str) -> Result<(), String> {
    if pointer.is_empty() {
        return Err("cannot remove the document root".to_string());
    }
    let (parent_ptr, token) = split_pointer(pointer)?;
    let parent = doc
        .pointer_mut(&parent_ptr)
        .ok_or_else(|| format!("parent of '{pointer}' not found"))?;
    match parent {
        Value::Object(map) => map
            .remove(&token)
            .map(|_| ())
            .ok_or_else(|| format!("key '{token}' not found")),
        Value::Array(items) => {
            let index: usize = token
                .parse()
                .map_err(|_| format!("bad array index '{token}'"))?;
            if index >= items.len() {
                return Err(format!("array index {index} out of bounds"));
            }
            items.remove(index);
            Ok(())
        }
        _ => Err(format!("parent of '{pointer}' is not a container")),
    }
}

fn replace(doc: &mut Value, pointer: &str, value: Value) -> Result<(), String> {
    let slot = doc
        .pointer_mut(pointer)
        .ok_or_else(|| format!("pointer '{pointer}' not found"))?;
    *slot = value;
    Ok(())
}

/// Splits a JSON pointer into its parent pointer and final, unescaped
/// reference token.
fn split_pointer(pointer: &str) -> Result<(String, String), String> {
    if !pointer.starts_with('/') {
        return Err(format!("'{pointer}' is not a JSON pointer"));
    }
    let idx = pointer.rfind('/').unwrap_or(0);
    let parent = pointer[..idx].to_string();
    let token = pointer[idx + 1..].replace("~1", "/").replace("~0", "~");
    Ok((parent, token))
}
