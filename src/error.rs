//! Configuration-time errors.
//!
//! Every variant is fatal: startup aborts and the operator fixes the
//! configuration. Request-time code has no error path.

use thiserror::Error;

use crate::region::RegionError;

/// Errors raised while registering or resolving the defence configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The control region was declared more than once.
    #[error("control region is already declared")]
    DuplicateRegion,

    /// An offset or action was declared before the control region.
    #[error("control region must be declared before `{directive}`")]
    RegionNotDeclared {
        /// The directive that needed the region.
        directive: &'static str,
    },

    /// The shared memory key is negative or does not fit a System V key.
    #[error("invalid region key {0}, must be between 0 and 2147483647")]
    InvalidRegionKey(i64),

    /// The region length is outside 1..=255.
    #[error("invalid region length {0}, must be between 1 and 255")]
    InvalidRegionLength(i64),

    /// The offset does not address a byte inside the region.
    #[error("offset {offset} out of range, must be between 0 and {length}")]
    InvalidOffset {
        /// Offset as configured.
        offset: i64,
        /// Region length the offset was checked against.
        length: u8,
    },

    /// The same scope declared `offset` twice.
    #[error("offset is duplicate in scope `{scope}`")]
    DuplicateOffset {
        /// Display name of the scope.
        scope: String,
    },

    /// Trigger value is not a byte.
    #[error("invalid trigger value {0}, must be between 0 and 255")]
    InvalidTriggerValue(i64),

    /// Target does not start with `@` or `/`.
    #[error("invalid action target \"{0}\", must start with '@' or '/'")]
    InvalidTarget(String),

    /// Sampling ratio is outside 0..=100.
    #[error("invalid sampling ratio {0}, must be between 0 and 100")]
    InvalidRatio(i64),

    /// Two servers share a name, or two locations in one server share a path.
    #[error("scope `{0}` is declared twice")]
    DuplicateScope(String),

    /// A scope handle did not come from this builder, or has the wrong kind.
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    /// Attaching the shared memory segment failed.
    #[error(transparent)]
    Region(#[from] RegionError),
}
