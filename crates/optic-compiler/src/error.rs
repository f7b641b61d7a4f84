//! Compile-time error taxonomy.
//!
//! Structural faults abort the one class being compiled; batch drivers
//! collect them per class and keep going. Faults the compiler decides at
//! build time but that only matter at use time (mutating a non-mutable
//! property) are not errors here: they are compiled into the artifact as
//! throw operations.

use thiserror::Error;

/// A structural fault while compiling one class.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A property name was visited twice
    #[error("Duplicate property [{property}] on type: {class}")]
    DuplicateProperty {
        /// Offending property name
        property: String,
        /// The class under compilation
        class: String,
    },

    /// An index declaration referenced a property that was never visited
    #[error("Property [{property}] referenced by an index does not exist on type: {class}")]
    PropertyNotFound {
        /// The missing property name
        property: String,
        /// The class under compilation
        class: String,
    },

    /// The output sink failed
    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
}
