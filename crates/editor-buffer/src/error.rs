//! Error type shared by [`crate::Rope`] and [`crate::TextBuffer`].

use thiserror::Error;

/// Errors returned by rope and buffer operations.
///
/// All offsets are character offsets. Range errors are raised synchronously at the call that
/// violates the precondition; nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// A single offset lies outside the valid range for the operation.
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange {
        /// Requested character offset.
        index: usize,
        /// Document length at the time of the call.
        len: usize,
    },
    /// A `[start, end)` range extends past the end of the document.
    #[error("range {start}..{end} is out of bounds for length {len}")]
    RangeOutOfBounds {
        /// Inclusive start character offset.
        start: usize,
        /// Exclusive end character offset (saturated on overflow).
        end: usize,
        /// Document length at the time of the call.
        len: usize,
    },
    /// A line index lies past the last line.
    #[error("line {line} is out of range for {line_count} lines")]
    LineOutOfRange {
        /// Requested zero-based line index.
        line: usize,
        /// Number of lines in the document.
        line_count: usize,
    },
    /// The buffer has been disposed and no longer accepts operations.
    #[error("text buffer has been disposed")]
    Disposed,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BufferError>;
