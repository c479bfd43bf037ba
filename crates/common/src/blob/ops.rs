use std::fmt;

use serde_json::Value;

use super::error::PatchError;

/// Blob patch operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Noop,
    Set,
    Unset,
    Extend,
    Push,
    Pop,
    Shift,
    Unshift,
    Filter,
}

/// Wire codes for every operation. Append only: existing codes never change.
pub const OPS: [(Op, &str, u8); 9] = [
    // special
    (Op::Noop, "noop", 0),
    // simple ops
    (Op::Set, "set", 16),
    (Op::Unset, "unset", 17),
    (Op::Extend, "extend", 18),
    // meta ops
    (Op::Push, "push", 32),
    (Op::Pop, "pop", 33),
    (Op::Shift, "shift", 34),
    (Op::Unshift, "unshift", 35),
    (Op::Filter, "filter", 36),
];

impl Op {
    pub fn code(self) -> u8 {
        OPS.iter()
            .find(|(op, _, _)| *op == self)
            .map(|(_, _, code)| *code)
            .unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        OPS.iter()
            .find(|(op, _, _)| *op == self)
            .map(|(_, name, _)| *name)
            .unwrap_or("noop")
    }

    pub fn from_code(code: u8) -> Result<Op, PatchError> {
        OPS.iter()
            .find(|(_, _, c)| *c == code)
            .map(|(op, _, _)| *op)
            .ok_or_else(|| PatchError::UnsupportedOperation(code.to_string()))
    }

    pub fn from_name(name: &str) -> Result<Op, PatchError> {
        OPS.iter()
            .find(|(_, n, _)| *n == name)
            .map(|(op, _, _)| *op)
            .ok_or_else(|| PatchError::UnsupportedOperation(name.to_string()))
    }

    /// Read an op from a patch element: a numeric code or an op name
    pub fn from_value(value: &Value) -> Result<Op, PatchError> {
        match value {
            Value::Number(n) => match n.as_u64() {
                Some(code) if code <= u8::MAX as u64 => Op::from_code(code as u8),
                _ => Err(PatchError::UnsupportedOperation(n.to_string())),
            },
            Value::String(name) => Op::from_name(name),
            other => Err(PatchError::UnsupportedOperation(other.to_string())),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
