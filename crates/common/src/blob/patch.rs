use serde_json::Value;

use super::error::PatchError;
use super::ops::Op;

/// One operation: `[opcode, pointer, ...params]` on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub op: Op,
    pub pointer: String,
    pub params: Vec<Value>,
}

impl Patch {
    pub fn new(op: Op, pointer: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            op,
            pointer: pointer.into(),
            params,
        }
    }

    /// A `filter` patch with its subcommands in the most compact shape
    pub fn filter(
        pointer: impl Into<String>,
        field: impl Into<String>,
        value: Value,
        subcommands: &[Subcommand],
    ) -> Self {
        let mut params = vec![Value::String(field.into()), value];
        params.extend(compress(subcommands));
        Self::new(Op::Filter, pointer, params)
    }

    pub fn to_json(&self) -> Value {
        let mut out = Vec::with_capacity(self.params.len() + 2);
        out.push(Value::from(self.op.code()));
        out.push(Value::String(self.pointer.clone()));
        out.extend(self.params.iter().cloned());
        Value::Array(out)
    }

    /// Parse `[opcode, pointer, ...params]`; the opcode may also be an op name
    pub fn from_json(value: Value) -> Result<Self, PatchError> {
        let Value::Array(items) = value else {
            return Err(PatchError::Malformed("patch is not an array".into()));
        };
        let mut items = items.into_iter();
        let op = match items.next() {
            Some(op) => Op::from_value(&op)?,
            None => return Err(PatchError::Malformed("patch is empty".into())),
        };
        let pointer = match items.next() {
            Some(Value::String(pointer)) => pointer,
            _ => return Err(PatchError::Malformed("patch pointer is not a string".into())),
        };
        Ok(Self {
            op,
            pointer,
            params: items.collect(),
        })
    }
}

/// A filter subcommand; `pointer` is relative to the matched element
#[derive(Debug, Clone, PartialEq)]
pub struct Subcommand {
    pub op: Op,
    pub pointer: String,
    pub params: Vec<Value>,
}

impl Subcommand {
    pub fn new(op: Op, pointer: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            op,
            pointer: pointer.into(),
            params,
        }
    }

    fn to_json(&self) -> Value {
        Patch::new(self.op, self.pointer.clone(), self.params.clone()).to_json()
    }

    fn from_json(items: &[Value]) -> Result<Self, PatchError> {
        let op = items
            .first()
            .ok_or_else(|| PatchError::Malformed("empty subcommand".into()))
            .and_then(Op::from_value)?;
        let pointer = match items.get(1) {
            Some(Value::String(pointer)) => pointer.clone(),
            _ => return Err(PatchError::Malformed("invalid path in subcommand".into())),
        };
        Ok(Self {
            op,
            pointer,
            params: items[2..].to_vec(),
        })
    }
}

/// The three shapes subcommands arrive in
#[derive(Debug, PartialEq)]
pub enum SubcommandShape<'a> {
    /// `op, pointer, ...params` spread inline
    Bare(&'a [Value]),
    /// `[op, pointer, ...params]` as the only element
    Wrapped(&'a [Value]),
    /// `[[op, pointer, ...], [op, pointer, ...], ...]` as the only element
    Many(&'a [Value]),
}

fn is_op_like(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::String(_))
}

impl<'a> SubcommandShape<'a> {
    pub fn classify(raw: &'a [Value]) -> Result<Self, PatchError> {
        match raw {
            [] => Ok(SubcommandShape::Many(&[])),
            [first, ..] if is_op_like(first) => Ok(SubcommandShape::Bare(raw)),
            [Value::Array(inner)] if inner.first().map(is_op_like).unwrap_or(false) => {
                Ok(SubcommandShape::Wrapped(inner))
            }
            [Value::Array(inner)] => Ok(SubcommandShape::Many(inner)),
            _ => Err(PatchError::Malformed("unrecognized subcommand layout".into())),
        }
    }

    pub fn normalize(self) -> Result<Vec<Subcommand>, PatchError> {
        match self {
            SubcommandShape::Bare(items) | SubcommandShape::Wrapped(items) => {
                Ok(vec![Subcommand::from_json(items)?])
            }
            SubcommandShape::Many(list) => list
                .iter()
                .map(|item| match item {
                    Value::Array(items) => Subcommand::from_json(items),
                    _ => Err(PatchError::Malformed("subcommand is not an array".into())),
                })
                .collect(),
        }
    }
}

/// Normalize the subcommand tail of a filter patch
pub fn normalize_subcommands(raw: &[Value]) -> Result<Vec<Subcommand>, PatchError> {
    SubcommandShape::classify(raw)?.normalize()
}

/// Minimal shape for emitting: one subcommand inline, several as a list
pub fn compress(subcommands: &[Subcommand]) -> Vec<Value> {
    match subcommands {
        [single] => match single.to_json() {
            Value::Array(items) => items,
            other => vec![other],
        },
        many => vec![Value::Array(many.iter().map(Subcommand::to_json).collect())],
    }
}
