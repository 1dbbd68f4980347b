//! IR error types.

use thiserror::Error;

/// Structural errors raised by the IR container.
///
/// These indicate malformed IR or a buggy transformation; compilation
/// aborts with the location carried here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IrError {
    #[error("invariant violation in {func}: {detail}")]
    Invariant { func: String, detail: String },

    #[error("unresolved placeholder {label} in {func}")]
    UnresolvedPlaceholder { func: String, label: String },

    #[error("use list walk did not terminate in {func} while replacing {value}")]
    ReplaceLoop { func: String, value: String },

    #[error("duplicate name {0}")]
    DuplicateName(String),
}
