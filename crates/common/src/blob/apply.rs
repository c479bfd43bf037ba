//! Pointer-addressed mutation of a JSON document
//!
//! Traversal semantics:
//!
//! - scalars and `null` along the path make the operation a silent no-op
//! - a missing object key is created as `{}` by `set` and as `[]` by
//!   `unshift`; every other operation stops there as a no-op
//! - array segments are non-negative integers or `-` (one past the end);
//!   descending into a missing array element is a no-op

use serde_json::{Map, Value};

use super::error::PatchError;
use super::ops::Op;
use super::patch::{normalize_subcommands, Patch};
use super::pointer;

/// Apply one patch to `data` in place.
///
/// On error `data` may be partially modified; callers that need atomicity
/// apply to a copy.
pub fn apply(data: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    apply_op(data, patch.op, &patch.pointer, &patch.params)
}

pub fn apply_op(
    data: &mut Value,
    op: Op,
    pointer: &str,
    params: &[Value],
) -> Result<(), PatchError> {
    let tokens = pointer::parse(pointer)?;
    if op == Op::Noop {
        return Ok(());
    }
    traverse(data, &tokens, pointer, op, params)
}

fn param<'a>(params: &'a [Value], op: Op) -> Result<&'a Value, PatchError> {
    params
        .first()
        .ok_or_else(|| PatchError::Malformed(format!("'{op}' requires a value")))
}

fn mismatch(op: Op, pointer: &str) -> PatchError {
    PatchError::TargetTypeMismatch {
        op: op.name().to_string(),
        pointer: pointer.to_string(),
    }
}

fn traverse(
    context: &mut Value,
    tokens: &[String],
    pointer: &str,
    op: Op,
    params: &[Value],
) -> Result<(), PatchError> {
    let Some((token, rest)) = tokens.split_first() else {
        return Err(PatchError::invalid_pointer(pointer, "empty pointer"));
    };

    match context {
        Value::Array(items) => {
            let index = pointer::array_index(token, items.len(), pointer)?;
            if !rest.is_empty() {
                return match items.get_mut(index) {
                    Some(child) => traverse(child, rest, pointer, op, params),
                    None => Ok(()),
                };
            }
            apply_in_array(items, index, pointer, op, params)
        }
        Value::Object(map) => {
            if !map.contains_key(token.as_str()) {
                match op {
                    Op::Set => {
                        map.insert(token.clone(), Value::Object(Map::new()));
                    }
                    Op::Unshift => {
                        map.insert(token.clone(), Value::Array(Vec::new()));
                    }
                    _ => return Ok(()),
                }
            }
            if !rest.is_empty() {
                return match map.get_mut(token.as_str()) {
                    Some(child) => traverse(child, rest, pointer, op, params),
                    None => Ok(()),
                };
            }
            apply_in_object(map, token, pointer, op, params)
        }
        _ => Ok(()),
    }
}

fn apply_in_object(
    map: &mut Map<String, Value>,
    key: &str,
    pointer: &str,
    op: Op,
    params: &[Value],
) -> Result<(), PatchError> {
    match op {
        Op::Set => {
            map.insert(key.to_string(), param(params, op)?.clone());
            Ok(())
        }
        Op::Unset => {
            map.remove(key);
            Ok(())
        }
        _ => match map.get_mut(key) {
            Some(target) => apply_to_target(target, pointer, op, params),
            None => Ok(()),
        },
    }
}

fn apply_in_array(
    items: &mut Vec<Value>,
    index: usize,
    pointer: &str,
    op: Op,
    params: &[Value],
) -> Result<(), PatchError> {
    let len = items.len();
    match op {
        Op::Set if index < len => {
            items[index] = param(params, op)?.clone();
            Ok(())
        }
        Op::Set if index == len => {
            items.push(param(params, op)?.clone());
            Ok(())
        }
        Op::Unshift if index == len => {
            items.push(Value::Array(vec![param(params, op)?.clone()]));
            Ok(())
        }
        Op::Set | Op::Unshift if index > len => Err(PatchError::invalid_pointer(
            pointer,
            format!("index {index} is past the end of an array of length {len}"),
        )),
        Op::Unset => {
            if index < len {
                items.remove(index);
            }
            Ok(())
        }
        _ => match items.get_mut(index) {
            Some(target) => apply_to_target(target, pointer, op, params),
            None => Ok(()),
        },
    }
}

/// Operations that act on an existing value rather than on its slot
fn apply_to_target(
    target: &mut Value,
    pointer: &str,
    op: Op,
    params: &[Value],
) -> Result<(), PatchError> {
    match op {
        Op::Extend => {
            let source = param(params, op)?;
            if !target.is_object() || !source.is_object() {
                return Err(mismatch(op, pointer));
            }
            deep_extend(target, source);
            Ok(())
        }
        Op::Unshift => {
            let value = param(params, op)?.clone();
            let Value::Array(items) = target else {
                return Err(mismatch(op, pointer));
            };
            items.insert(0, value);
            Ok(())
        }
        Op::Push => {
            let value = param(params, op)?.clone();
            let Value::Array(items) = target else {
                return Err(mismatch(op, pointer));
            };
            items.push(value);
            Ok(())
        }
        Op::Pop | Op::Shift => {
            let Value::Array(items) = target else {
                return Err(mismatch(op, pointer));
            };
            if op == Op::Pop {
                items.pop();
            } else if !items.is_empty() {
                items.remove(0);
            }
            Ok(())
        }
        Op::Filter => filter(target, pointer, params),
        Op::Noop => Ok(()),
        // slot operations are handled by the caller
        Op::Set | Op::Unset => Err(PatchError::UnsupportedOperation(op.name().to_string())),
    }
}

/// Apply the subcommands to every array element whose `field` equals `value`.
///
/// Subcommand pointers are relative to the matched element. A failing
/// subcommand does not stop the others.
fn filter(target: &mut Value, pointer: &str, params: &[Value]) -> Result<(), PatchError> {
    let field = match params.first() {
        Some(Value::String(field)) => field.clone(),
        _ => return Err(PatchError::Malformed("filter field must be a string".into())),
    };
    let value = params
        .get(1)
        .ok_or_else(|| PatchError::Malformed("filter requires a value to match".into()))?;
    let subcommands = normalize_subcommands(&params[2..])?;

    let Value::Array(items) = target else {
        return Ok(());
    };

    let matches: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, element)| element.get(&field).is_some_and(|v| v == value) && element.is_object())
        .map(|(i, _)| i)
        .collect();

    // descending, so removals do not shift the indices still to visit
    for index in matches.into_iter().rev() {
        let element_pointer = format!("{pointer}/{index}");
        for sub in &subcommands {
            let sub_pointer = format!("{element_pointer}{}", sub.pointer);
            let result = pointer::parse(&format!("/{index}{}", sub.pointer)).and_then(|tokens| {
                if sub.op == Op::Noop {
                    return Ok(());
                }
                traverse(target, &tokens, &sub_pointer, sub.op, &sub.params)
            });
            if let Err(e) = result {
                tracing::debug!(pointer = %sub_pointer, op = %sub.op, "filter subcommand skipped: {e}");
            }
        }
    }
    Ok(())
}

/// Deep merge of `source` into `target`: nested objects and arrays merge
/// key by key (index by index), anything else is overwritten.
pub fn deep_extend(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) if same_container(existing, value) => deep_extend(existing, value),
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(source)) => {
            for (i, value) in source.iter().enumerate() {
                match target.get_mut(i) {
                    Some(existing) if same_container(existing, value) => deep_extend(existing, value),
                    Some(existing) => *existing = value.clone(),
                    None => target.push(value.clone()),
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

fn same_container(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
    )
}
