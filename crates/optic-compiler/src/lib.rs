//! Optic introspection compiler.
//!
//! Consumes prepared class descriptions ([`element`]), compiles property and
//! method descriptors with dense dispatch indices ([`compiler`],
//! [`dispatch`]), synthesizes copy-constructor mutation for immutable types
//! ([`copy_ctor`]), and emits one binary artifact plus a service registration
//! per class ([`emitter`], [`sink`]).

pub mod compiler;
pub mod copy_ctor;
pub mod dispatch;
pub mod element;
pub mod emitter;
pub mod error;
pub mod sink;

pub use compiler::{CompilerOptions, IntrospectionCompiler, PropertyData};
pub use dispatch::DispatchTableBuilder;
pub use element::{
    ClassElement, ClassKind, ConstructorElement, ElementId, EnumConstantElement, FieldElement,
    MemberRef, MethodElement, ParameterElement, TypeRef,
};
pub use emitter::{
    compile_batch, introspection_name, qualified_introspection_name, BatchOutcome, EmittedClasses,
    IntrospectionEmitter, INTROSPECTION_SUFFIX, SERVICE_DESCRIPTOR,
};
pub use error::CompileError;
pub use sink::{ClassSink, DirSink, MemorySink, ServiceRegistration};
