//! Emission semantics: idempotence, determinism, defaults deduplication,
//! batch recovery, and the directory sink.

use std::sync::Arc;

use optic_compiler::{
    compile_batch, ClassElement, ClassKind, CompilerOptions, ConstructorElement, DirSink,
    EmittedClasses, FieldElement, IntrospectionCompiler, IntrospectionEmitter, MemberRef,
    MemorySink, ParameterElement, TypeRef, CompileError, SERVICE_DESCRIPTOR,
};
use optic_model::artifact::IntrospectionArtifact;
use optic_model::defaults::AnnotationDefaultsRegistry;
use optic_model::dispatch::DispatchOp;
use optic_model::introspection::BeanIntrospection;
use optic_model::metadata::{AnnotationMetadata, AnnotationTable, RetentionLookup};
use optic_model::object::{FunctionRegistry, Instance, RuntimeError, Value};
use optic_model::value::AnnotationValue;

fn int() -> TypeRef {
    TypeRef::new("int")
}

fn field(name: &str, class: &str, slot: usize) -> MemberRef {
    MemberRef::Field(FieldElement::new(name, class, int(), slot))
}

fn id_metadata() -> AnnotationMetadata {
    let mut table = AnnotationTable::new();
    table.add_declared(
        "optic.Id",
        vec![("value".to_string(), AnnotationValue::string("set"))],
    );
    table.add_defaults(
        "optic.Id",
        vec![("value".to_string(), AnnotationValue::string(""))],
    );
    AnnotationMetadata::table(table)
}

fn point_compiler(metadata_per_property: bool) -> IntrospectionCompiler {
    let class = ClassElement::new("geom.Point", ClassKind::Record);
    let mut compiler = IntrospectionCompiler::new(class, CompilerOptions::default());
    compiler.visit_constructor(ConstructorElement::new(
        0,
        vec![
            ParameterElement::new("x", int()),
            ParameterElement::new("y", int()),
        ],
    ));
    for (slot, name) in ["x", "y"].iter().enumerate() {
        let metadata = if metadata_per_property {
            id_metadata()
        } else {
            AnnotationMetadata::Empty
        };
        compiler
            .visit_property(
                int(),
                int(),
                *name,
                Some(field(name, "geom.Point", slot)),
                None,
                None,
                None,
                metadata,
                true,
            )
            .unwrap();
    }
    compiler
}

#[test]
fn test_emission_is_idempotent() {
    let sink = MemorySink::new();
    let emitted = EmittedClasses::new();
    let defaults = AnnotationDefaultsRegistry::new();
    let retention = RetentionLookup::new();
    let emitter = IntrospectionEmitter::new(&sink, &emitted, &defaults, &retention);

    let first = emitter.emit(&point_compiler(false)).unwrap();
    assert_eq!(first.as_deref(), Some("geom.$Point$Introspection"));
    // A second request for the same class is a no-op
    let second = emitter.emit(&point_compiler(false)).unwrap();
    assert_eq!(second, None);

    assert_eq!(sink.class_count(), 1);
    let services = sink.service_registrations();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].service, SERVICE_DESCRIPTOR);
    assert_eq!(services[0].implementation, "geom.$Point$Introspection");
    assert_eq!(services[0].originating, "geom.Point");
}

#[test]
fn test_index_assignment_is_deterministic() {
    let emit = || {
        let sink = MemorySink::new();
        let emitted = EmittedClasses::new();
        let defaults = AnnotationDefaultsRegistry::new();
        let retention = RetentionLookup::new();
        let emitter = IntrospectionEmitter::new(&sink, &emitted, &defaults, &retention);
        let name = emitter.emit(&point_compiler(false)).unwrap().unwrap();
        sink.class_bytes(&name).unwrap()
    };
    // Fresh compiler instances visiting in the same order produce identical
    // artifacts, byte for byte
    assert_eq!(emit(), emit());

    let artifact = IntrospectionArtifact::decode(&emit()).unwrap();
    let x = &artifact.properties[0];
    let y = &artifact.properties[1];
    assert_eq!(x.get_index, 0);
    assert_eq!(y.get_index, 1);
    assert_ne!(x.with_index, y.with_index);
}

#[test]
fn test_annotation_defaults_registered_once_per_artifact() {
    let sink = MemorySink::new();
    let emitted = EmittedClasses::new();
    let defaults = AnnotationDefaultsRegistry::new();
    let retention = RetentionLookup::new();
    let emitter = IntrospectionEmitter::new(&sink, &emitted, &defaults, &retention);

    // Both properties carry optic.Id defaults; only one registration lands
    let name = emitter.emit(&point_compiler(true)).unwrap().unwrap();
    assert_eq!(defaults.len(), 1);
    assert!(defaults.has_defaults("optic.Id"));

    // The artifact itself carries the defaults once, on the class table
    let artifact = IntrospectionArtifact::decode(&sink.class_bytes(&name).unwrap()).unwrap();
    assert_eq!(artifact.metadata.defaults().len(), 1);
    for property in &artifact.properties {
        assert!(property.argument.metadata.defaults().is_empty());
    }

    // Loading registers into a fresh registry, again at most once
    let loaded = AnnotationDefaultsRegistry::new();
    let registry = Arc::new(FunctionRegistry::new());
    let bytes = sink.class_bytes(&name).unwrap();
    let _ = BeanIntrospection::load(&bytes, registry, &loaded).unwrap();
    assert_eq!(loaded.len(), 1);
}

#[test]
fn test_unbindable_constructor_degrades_to_throw() {
    // Constructor argument `z` is not a readable property, so the whole
    // copy plan is invalid and mutation of `x` surfaces the bind diagnostic.
    let class = ClassElement::new("geom.Broken", ClassKind::Class);
    let mut compiler = IntrospectionCompiler::new(class, CompilerOptions::default());
    compiler.visit_constructor(ConstructorElement::new(
        0,
        vec![
            ParameterElement::new("x", int()),
            ParameterElement::new("z", int()),
        ],
    ));
    compiler
        .visit_property(
            int(),
            int(),
            "x",
            Some(field("x", "geom.Broken", 0)),
            None,
            None,
            None,
            AnnotationMetadata::Empty,
            true,
        )
        .unwrap();

    let sink = MemorySink::new();
    let emitted = EmittedClasses::new();
    let defaults = AnnotationDefaultsRegistry::new();
    let retention = RetentionLookup::new();
    let emitter = IntrospectionEmitter::new(&sink, &emitted, &defaults, &retention);
    let name = emitter.emit(&compiler).unwrap().unwrap();

    let artifact = IntrospectionArtifact::decode(&sink.class_bytes(&name).unwrap()).unwrap();
    let with_index = artifact.properties[0].with_index as usize;
    let DispatchOp::Throw { message } = &artifact.dispatch[with_index] else {
        panic!("expected throw op, got {:?}", artifact.dispatch[with_index]);
    };
    assert_eq!(
        message,
        "Cannot create copy of type [geom.Broken]. Constructor contains argument [z] that is not a readable property"
    );

    let registry = Arc::new(FunctionRegistry::new());
    let loaded = AnnotationDefaultsRegistry::new();
    let bytes = sink.class_bytes(&name).unwrap();
    let introspection = BeanIntrospection::load(&bytes, registry, &loaded).unwrap();
    let target = Value::object(Instance::new("geom.Broken", vec![Value::Int(1)]));
    assert!(matches!(
        introspection.with_value(&target, "x", Value::Int(2)),
        Err(RuntimeError::UnsupportedOperation(_))
    ));
}

#[test]
fn test_failed_emit_does_not_suppress_retry() {
    let sink = MemorySink::new();
    let emitted = EmittedClasses::new();
    let defaults = AnnotationDefaultsRegistry::new();
    let retention = RetentionLookup::new();
    let emitter = IntrospectionEmitter::new(&sink, &emitted, &defaults, &retention);

    // A structural fault aborts the emission and must leave nothing behind,
    // including the done-set claim
    let mut bad = point_compiler(false);
    bad.index_property("optic.Id", "missing", None);
    assert!(matches!(
        emitter.emit(&bad),
        Err(CompileError::PropertyNotFound { .. })
    ));
    assert_eq!(sink.class_count(), 0);
    assert!(!emitted.contains("geom.$Point$Introspection"));

    // The same class compiled correctly afterwards emits normally
    let name = emitter.emit(&point_compiler(false)).unwrap();
    assert_eq!(name.as_deref(), Some("geom.$Point$Introspection"));
    assert_eq!(sink.class_count(), 1);
    assert_eq!(sink.service_registrations().len(), 1);
}

#[test]
fn test_batch_recovers_per_class() {
    // One good class, one with an index referencing a missing property
    let good = point_compiler(false);
    let mut bad = IntrospectionCompiler::new(
        ClassElement::new("geom.Bad", ClassKind::Class),
        CompilerOptions::default(),
    );
    bad.index_property("optic.Id", "missing", None);

    let sink = MemorySink::new();
    let emitted = EmittedClasses::new();
    let defaults = AnnotationDefaultsRegistry::new();
    let retention = RetentionLookup::new();
    let emitter = IntrospectionEmitter::new(&sink, &emitted, &defaults, &retention);

    let outcome = compile_batch(&emitter, &[good, bad]);
    assert_eq!(outcome.emitted, vec!["geom.$Point$Introspection".to_string()]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, "geom.Bad");
    assert!(matches!(
        outcome.failures[0].1,
        CompileError::PropertyNotFound { .. }
    ));
}

#[test]
fn test_dir_sink_writes_artifact_and_service_file() {
    let dir = tempfile::tempdir().unwrap();
    let sink = DirSink::new(dir.path());
    let emitted = EmittedClasses::new();
    let defaults = AnnotationDefaultsRegistry::new();
    let retention = RetentionLookup::new();
    let emitter = IntrospectionEmitter::new(&sink, &emitted, &defaults, &retention);

    let name = emitter.emit(&point_compiler(false)).unwrap().unwrap();

    let bytes = std::fs::read(sink.class_path(&name)).unwrap();
    let registry = Arc::new(FunctionRegistry::new());
    let loaded = AnnotationDefaultsRegistry::new();
    let introspection = BeanIntrospection::load(&bytes, registry, &loaded).unwrap();
    assert_eq!(introspection.class_name(), "geom.Point");
    assert_eq!(introspection.property_names(), vec!["x", "y"]);

    let services = std::fs::read_to_string(sink.service_path(SERVICE_DESCRIPTOR)).unwrap();
    assert_eq!(services.trim(), name);
}
