//! Nesting-depth ceiling shared by decode and encode.
//!
//! Depth counts nested containers: `1` is depth 0, `[1]` depth 1, `{"a":[1]}`
//! depth 2. A requested ceiling of 0 lifts the ceiling to `NESTING_HARD_LIMIT`;
//! nothing deeper than that is ever parsed or generated.

use serde_json::Value;

use crate::core::error::{Error, ErrorKind};

/// Ceiling applied when the caller does not set `max_nesting`.
pub const DEFAULT_MAX_NESTING: usize = 1000;

/// Largest ceiling a caller may request; also what `max_nesting(0)` means.
pub const NESTING_HARD_LIMIT: usize = 10_000;

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_SEGMENT: usize = 1024 * 1024;
const STACK_PER_LEVEL: usize = 4 * 1024;

/// Turn a requested ceiling into the one enforced.
pub fn effective_ceiling(requested: Option<usize>) -> Result<usize, Error> {
    match requested.unwrap_or(DEFAULT_MAX_NESTING) {
        0 => Ok(NESTING_HARD_LIMIT),
        max_nesting if max_nesting > NESTING_HARD_LIMIT => Err(Error::new(ErrorKind::Usage)
            .with_message(format!(
                "max_nesting {max_nesting} is above the supported limit {NESTING_HARD_LIMIT}"
            ))
            .with_hint("Pass 0 for the largest supported ceiling.")),
        max_nesting => Ok(max_nesting),
    }
}

/// Reject `input` if any container opens deeper than `max_nesting`.
///
/// Brackets inside string literals are ignored. The scan does not validate
/// the rest of the grammar; malformed text that stays under the ceiling is
/// left for the backend to reject.
pub fn check_text(input: &[u8], max_nesting: usize) -> Result<(), Error> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in input.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > max_nesting {
                    return Err(too_deep(depth, max_nesting).with_offset(offset));
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// Run one level of a recursive walk, switching to a fresh stack segment
/// when the current one is nearly spent.
pub(crate) fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, f)
}

/// Run a walk that recurses `depth` levels without checkpoints of its own.
pub(crate) fn with_stack_for_depth<R>(depth: usize, f: impl FnOnce() -> R) -> R {
    let needed = STACK_SEGMENT + depth * STACK_PER_LEVEL;
    stacker::maybe_grow(needed, needed, f)
}

/// Drop a `Value` without recursing once per nesting level.
pub(crate) fn dispose(value: Value) {
    let mut pending = vec![value];
    while let Some(value) = pending.pop() {
        match value {
            Value::Array(items) => pending.extend(items),
            Value::Object(map) => pending.extend(map.into_iter().map(|(_, value)| value)),
            _ => {}
        }
    }
}

pub(crate) fn too_deep(depth: usize, max_nesting: usize) -> Error {
    Error::new(ErrorKind::NestingLimit)
        .with_message(format!("nesting of {depth} is too deep"))
        .with_hint(format!(
            "max_nesting is {max_nesting}; raise it (up to {NESTING_HARD_LIMIT}) or pass 0"
        ))
        .with_depth(depth)
}
