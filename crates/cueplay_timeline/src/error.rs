// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the timeline crate.

use thiserror::Error;

/// Errors raised while parsing an enable expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// Expression string was empty
    #[error("Empty expression")]
    Empty,

    /// Character that cannot start a token
    #[error("Unexpected character '{ch}' at {position}")]
    UnexpectedChar {
        /// Offending character
        ch: char,
        /// Byte offset in the input
        position: usize,
    },

    /// A token appeared where it is not allowed
    #[error("Unexpected token at {position}")]
    UnexpectedToken {
        /// Byte offset in the input
        position: usize,
    },

    /// Input ended in the middle of an expression
    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    /// Numeric literal failed to parse
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    /// Reference without an object id (`#.end`)
    #[error("Reference is missing an object id at {position}")]
    MissingReference {
        /// Byte offset in the input
        position: usize,
    },

    /// Reference property other than start/end/duration
    #[error("Unknown reference property: {0}")]
    UnknownProperty(String),
}
