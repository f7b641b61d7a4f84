//! Optic data model: annotation metadata, dispatch tables, and the binary
//! introspection artifact format.
//!
//! This crate is shared between the compile side (`optic-compiler`), which
//! assembles and encodes [`artifact::IntrospectionArtifact`]s, and hosts that
//! load artifacts back into [`introspection::BeanIntrospection`]s and drive
//! them against a [`object::FunctionRegistry`].

pub mod artifact;
pub mod defaults;
pub mod dispatch;
pub mod introspection;
pub mod metadata;
pub mod object;
pub mod value;

pub use artifact::{ArtifactError, DecodeError, IntrospectionArtifact};
pub use defaults::AnnotationDefaultsRegistry;
pub use dispatch::{DispatchOp, DispatchTable, NO_DISPATCH};
pub use introspection::{
    AnnotationIndex, Argument, BeanIntrospection, ConstructorRef, EnumConstantRef, MethodRef,
    PropertyRef,
};
pub use metadata::{AnnotationMetadata, AnnotationTable, MergeStrategy, RetentionLookup};
pub use object::{FunctionRegistry, Instance, NativeFn, RuntimeError, Value};
pub use value::AnnotationValue;
