//! RFC 6901 JSON pointers

use super::error::PatchError;

/// Split a pointer into its unescaped reference tokens.
///
/// The pointer must start with `/`; `~0` and `~1` decode to `~` and `/`, and
/// any other `~` sequence is rejected.
pub fn parse(pointer: &str) -> Result<Vec<String>, PatchError> {
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PatchError::invalid_pointer(pointer, "must start with '/'"));
    };
    rest.split('/')
        .map(|token| unescape(token).ok_or_else(|| PatchError::invalid_pointer(pointer, "invalid tilde escape")))
        .collect()
}

fn unescape(token: &str) -> Option<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return None,
        }
    }
    Some(out)
}

/// Escape a single token for use inside a pointer
pub fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Resolve an array segment: `-` is one past the end, otherwise a
/// non-negative decimal integer
pub fn array_index(token: &str, len: usize, pointer: &str) -> Result<usize, PatchError> {
    if token == "-" {
        return Ok(len);
    }
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PatchError::invalid_pointer(
            pointer,
            "array element segments must be a non-negative integer or '-'",
        ));
    }
    token
        .parse()
        .map_err(|_| PatchError::invalid_pointer(pointer, "array index out of range"))
}
