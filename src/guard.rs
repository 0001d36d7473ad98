//! Checked string repetition.
//!
//! Repeating a string a negative number of times is always a bug upstream
//! (usually a width computed from a column that is wider than its budget).
//! [`repeat`] reports it with a warning and an error instead of panicking or
//! silently producing an empty string, and every caller decides how to
//! degrade. The evaluator's `String.prototype.repeat` and
//! the column padding in [`crate::output`] go through it.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("repeat count must be non-negative, got {count}")]
pub struct NegativeRepeat {
    pub count: i64,
}

/// `s` repeated `count` times; a negative count is logged and rejected.
pub fn repeat(s: &str, count: i64) -> Result<String, NegativeRepeat> {
    if count < 0 {
        tracing::warn!(value = s, count, "negative repeat count");
        return Err(NegativeRepeat { count });
    }
    Ok(s.repeat(count as usize))
}
