//! End-to-end compile, emit, load, and dispatch behavior for small classes.

use std::sync::Arc;

use optic_compiler::{
    ClassElement, ClassKind, CompilerOptions, ConstructorElement, FieldElement,
    IntrospectionCompiler, IntrospectionEmitter, EmittedClasses, MemberRef, MethodElement,
    ParameterElement, MemorySink, TypeRef,
};
use optic_model::defaults::AnnotationDefaultsRegistry;
use optic_model::introspection::BeanIntrospection;
use optic_model::metadata::{AnnotationMetadata, RetentionLookup};
use optic_model::object::{FunctionRegistry, Instance, RuntimeError, Value};

fn int() -> TypeRef {
    TypeRef::new("int")
}

fn field(name: &str, class: &str, slot: usize) -> MemberRef {
    MemberRef::Field(FieldElement::new(name, class, int(), slot))
}

/// `geom.Point(x, y)`: constructor only, field-backed reads, no setters.
fn point_compiler() -> IntrospectionCompiler {
    let class = ClassElement::new("geom.Point", ClassKind::Record);
    let mut compiler = IntrospectionCompiler::new(class, CompilerOptions::default());
    compiler.visit_constructor(ConstructorElement::new(
        0,
        vec![
            ParameterElement::new("x", int()),
            ParameterElement::new("y", int()),
        ],
    ));
    compiler
        .visit_property(
            int(),
            int(),
            "x",
            Some(field("x", "geom.Point", 0)),
            None,
            None,
            None,
            AnnotationMetadata::Empty,
            true,
        )
        .unwrap();
    compiler
        .visit_property(
            int(),
            int(),
            "y",
            Some(field("y", "geom.Point", 1)),
            None,
            None,
            None,
            AnnotationMetadata::Empty,
            true,
        )
        .unwrap();
    compiler.index_property("optic.Id", "x", Some("a".to_string()));
    compiler.index_property("optic.Id", "y", Some("b".to_string()));
    compiler
}

fn point_registry() -> Arc<FunctionRegistry> {
    let mut registry = FunctionRegistry::new();
    registry.register_fn(|_, args| Ok(Value::object(Instance::new("geom.Point", args.to_vec()))));
    Arc::new(registry)
}

fn emit_and_load(
    compiler: &IntrospectionCompiler,
    registry: Arc<FunctionRegistry>,
) -> BeanIntrospection {
    let sink = MemorySink::new();
    let emitted = EmittedClasses::new();
    let defaults = AnnotationDefaultsRegistry::new();
    let retention = RetentionLookup::new();
    let emitter = IntrospectionEmitter::new(&sink, &emitted, &defaults, &retention);
    let name = emitter.emit(compiler).unwrap().unwrap();
    let bytes = sink.class_bytes(&name).unwrap();
    let loaded_defaults = AnnotationDefaultsRegistry::new();
    BeanIntrospection::load(&bytes, registry, &loaded_defaults).unwrap()
}

#[test]
fn test_point_copy_construct_mutation() {
    let introspection = emit_and_load(&point_compiler(), point_registry());
    let point = introspection
        .instantiate_with(&[Value::Int(1), Value::Int(2)])
        .unwrap();

    let mutated = introspection
        .with_value(&point, "x", Value::Int(9))
        .unwrap();
    assert_eq!(introspection.get(&mutated, "x").unwrap(), Value::Int(9));
    assert_eq!(introspection.get(&mutated, "y").unwrap(), Value::Int(2));

    let mutated = introspection
        .with_value(&point, "y", Value::Int(9))
        .unwrap();
    assert_eq!(introspection.get(&mutated, "x").unwrap(), Value::Int(1));
    assert_eq!(introspection.get(&mutated, "y").unwrap(), Value::Int(9));

    // The original instance never changes
    assert_eq!(introspection.get(&point, "x").unwrap(), Value::Int(1));
    assert_eq!(introspection.get(&point, "y").unwrap(), Value::Int(2));
}

#[test]
fn test_point_direct_set_is_rejected() {
    let introspection = emit_and_load(&point_compiler(), point_registry());
    let point = introspection
        .instantiate_with(&[Value::Int(1), Value::Int(2)])
        .unwrap();
    assert!(matches!(
        introspection.set(&point, "x", Value::Int(9)),
        Err(RuntimeError::UnsupportedOperation(_))
    ));
}

#[test]
fn test_indexed_lookup_with_discriminators() {
    let introspection = emit_and_load(&point_compiler(), point_registry());
    assert_eq!(
        introspection
            .find_indexed_property("optic.Id", Some("a"))
            .map(|p| p.name()),
        Some("x")
    );
    assert_eq!(
        introspection
            .find_indexed_property("optic.Id", Some("b"))
            .map(|p| p.name()),
        Some("y")
    );
    // No unconditional entry was declared, so an unknown value is no match
    assert!(introspection
        .find_indexed_property("optic.Id", Some("c"))
        .is_none());
    assert_eq!(introspection.get_indexed_properties("optic.Id").len(), 2);
}

#[test]
fn test_read_only_property_mutation_throws() {
    // `name` has no setter and no constructor argument
    let class = ClassElement::new("geom.Named", ClassKind::Class);
    let mut compiler = IntrospectionCompiler::new(class, CompilerOptions::default());
    compiler.visit_default_constructor(0);
    compiler
        .visit_property(
            TypeRef::new("str"),
            TypeRef::new("str"),
            "name",
            Some(MemberRef::Field(FieldElement::new(
                "name",
                "geom.Named",
                TypeRef::new("str"),
                0,
            ))),
            None,
            None,
            None,
            AnnotationMetadata::Empty,
            true,
        )
        .unwrap();

    let mut registry = FunctionRegistry::new();
    registry.register_fn(|_, _| {
        Ok(Value::object(Instance::new(
            "geom.Named",
            vec![Value::Str("anon".to_string())],
        )))
    });
    let introspection = emit_and_load(&compiler, Arc::new(registry));

    let target = introspection.instantiate().unwrap();
    let err = introspection
        .with_value(&target, "name", Value::Str("other".to_string()))
        .unwrap_err();
    let RuntimeError::UnsupportedOperation(message) = err else {
        panic!("expected unsupported operation, got {err:?}");
    };
    assert_eq!(
        message,
        "Cannot mutate property [name] that is not mutable via a setter method, field or constructor argument for type: geom.Named"
    );
}

#[test]
fn test_copy_construct_carries_sibling_setter_property() {
    // `geom.Labeled(x)` plus a read-write `label` not covered by the
    // constructor: mutating `x` must carry `label` over to the copy.
    let class = ClassElement::new("geom.Labeled", ClassKind::Class);
    let mut compiler = IntrospectionCompiler::new(class, CompilerOptions::default());
    compiler.visit_constructor(ConstructorElement::new(
        0,
        vec![ParameterElement::new("x", int())],
    ));
    compiler
        .visit_property(
            int(),
            int(),
            "x",
            Some(field("x", "geom.Labeled", 0)),
            None,
            None,
            None,
            AnnotationMetadata::Empty,
            true,
        )
        .unwrap();
    compiler
        .visit_property(
            TypeRef::new("str"),
            TypeRef::new("str"),
            "label",
            Some(MemberRef::Field(FieldElement::new(
                "label",
                "geom.Labeled",
                TypeRef::new("str"),
                1,
            ))),
            Some(MemberRef::Field(FieldElement::new(
                "label",
                "geom.Labeled",
                TypeRef::new("str"),
                1,
            ))),
            None,
            None,
            AnnotationMetadata::Empty,
            false,
        )
        .unwrap();

    let mut registry = FunctionRegistry::new();
    registry.register_fn(|_, args| {
        // The constructor only sets x; label starts empty
        let mut fields = args.to_vec();
        fields.push(Value::Null);
        Ok(Value::object(Instance::new("geom.Labeled", fields)))
    });
    let introspection = emit_and_load(&compiler, Arc::new(registry));

    let target = introspection.instantiate_with(&[Value::Int(1)]).unwrap();
    introspection
        .set(&target, "label", Value::Str("tag".to_string()))
        .unwrap();

    let mutated = introspection
        .with_value(&target, "x", Value::Int(5))
        .unwrap();
    assert_eq!(introspection.get(&mutated, "x").unwrap(), Value::Int(5));
    assert_eq!(
        introspection.get(&mutated, "label").unwrap(),
        Value::Str("tag".to_string())
    );
    // Setter-backed mutation returns the same instance
    let same = introspection
        .with_value(&mutated, "label", Value::Str("renamed".to_string()))
        .unwrap();
    assert_eq!(same, mutated);
}

#[test]
fn test_wither_method_preferred_over_copy_construct() {
    let wither = MethodElement::new("withX", "geom.Point", TypeRef::new("geom.Point"), 1)
        .with_parameters(vec![ParameterElement::new("x", int())]);
    let class =
        ClassElement::new("geom.Point", ClassKind::Record).with_declared_methods(vec![wither]);
    let mut compiler = IntrospectionCompiler::new(class, CompilerOptions::default());
    compiler.visit_constructor(ConstructorElement::new(
        0,
        vec![ParameterElement::new("x", int())],
    ));
    compiler
        .visit_property(
            int(),
            int(),
            "x",
            Some(field("x", "geom.Point", 0)),
            None,
            None,
            None,
            AnnotationMetadata::Empty,
            true,
        )
        .unwrap();

    let mut registry = FunctionRegistry::new();
    registry.register_fn(|_, args| Ok(Value::object(Instance::new("geom.Point", args.to_vec()))));
    registry.register_fn(|target, args| {
        // The wither marks its output so the test can tell it ran
        let _ = target.as_object()?;
        Ok(Value::object(Instance::new(
            "geom.Point",
            vec![args[0].clone(), Value::Str("via-wither".to_string())],
        )))
    });
    let introspection = emit_and_load(&compiler, Arc::new(registry));

    let target = introspection.instantiate_with(&[Value::Int(1)]).unwrap();
    let mutated = introspection
        .with_value(&target, "x", Value::Int(3))
        .unwrap();
    assert_eq!(introspection.get(&mutated, "x").unwrap(), Value::Int(3));
    let instance = mutated.as_object().unwrap().read();
    assert_eq!(instance.fields[1], Value::Str("via-wither".to_string()));
}

#[test]
fn test_bean_method_invocation() {
    let scale = MethodElement::new("scale", "geom.Point", TypeRef::new("geom.Point"), 1)
        .with_parameters(vec![
            ParameterElement::new("sx", int()),
            ParameterElement::new("sy", int()),
        ]);
    let class = ClassElement::new("geom.Point", ClassKind::Record);
    let mut compiler = IntrospectionCompiler::new(class, CompilerOptions::default());
    compiler.visit_constructor(ConstructorElement::new(
        0,
        vec![
            ParameterElement::new("x", int()),
            ParameterElement::new("y", int()),
        ],
    ));
    compiler
        .visit_property(
            int(),
            int(),
            "x",
            Some(field("x", "geom.Point", 0)),
            None,
            None,
            None,
            AnnotationMetadata::Empty,
            true,
        )
        .unwrap();
    compiler
        .visit_property(
            int(),
            int(),
            "y",
            Some(field("y", "geom.Point", 1)),
            None,
            None,
            None,
            AnnotationMetadata::Empty,
            true,
        )
        .unwrap();
    assert!(compiler.visit_bean_method(scale));

    let mut registry = FunctionRegistry::new();
    registry.register_fn(|_, args| Ok(Value::object(Instance::new("geom.Point", args.to_vec()))));
    registry.register_fn(|target, args| {
        let instance = target.as_object()?.read();
        let (Value::Int(x), Value::Int(y)) = (&instance.fields[0], &instance.fields[1]) else {
            return Err(RuntimeError::NotAnObject);
        };
        let (Value::Int(sx), Value::Int(sy)) = (&args[0], &args[1]) else {
            return Err(RuntimeError::NotAnObject);
        };
        Ok(Value::object(Instance::new(
            "geom.Point",
            vec![Value::Int(x * sx), Value::Int(y * sy)],
        )))
    });
    let introspection = emit_and_load(&compiler, Arc::new(registry));

    let target = introspection
        .instantiate_with(&[Value::Int(2), Value::Int(3)])
        .unwrap();
    let scaled = introspection
        .call_method(&target, "scale", &[Value::Int(10), Value::Int(100)])
        .unwrap();
    assert_eq!(introspection.get(&scaled, "x").unwrap(), Value::Int(20));
    assert_eq!(introspection.get(&scaled, "y").unwrap(), Value::Int(300));
}
