//! Introspection artifact emitter.
//!
//! Freezes a compiled class into one binary artifact and a service
//! registration, exactly once per generated name. The done-set is shared
//! across the whole build invocation so concurrent compilations of the same
//! class stay idempotent.

use std::io::Write;

use dashmap::DashSet;
use rustc_hash::FxHashMap;

use optic_model::artifact::{flags, IntrospectionArtifact};
use optic_model::defaults::AnnotationDefaultsRegistry;
use optic_model::introspection::{
    AnnotationIndex, Argument, ConstructorRef, EnumConstantRef, MethodRef, PropertyRef,
};
use optic_model::metadata::{
    AnnotationMetadata, AnnotationTable, MergeStrategy, RetentionLookup,
};
use optic_model::value::AnnotationValue;

use crate::compiler::IntrospectionCompiler;
use crate::element::{ClassElement, ClassKind};
use crate::error::CompileError;
use crate::sink::ClassSink;

/// Service contract generated introspections are registered under.
pub const SERVICE_DESCRIPTOR: &str = "optic.BeanIntrospectionReference";

/// Suffix of generated introspection class names.
pub const INTROSPECTION_SUFFIX: &str = "$Introspection";

/// Generated name for a class introspected in its own compilation unit:
/// `<package>.$<Simple>$Introspection`.
pub fn introspection_name(package: &str, simple_name: &str) -> String {
    if package.is_empty() {
        format!("${simple_name}{INTROSPECTION_SUFFIX}")
    } else {
        format!("{package}.${simple_name}{INTROSPECTION_SUFFIX}")
    }
}

/// Generated name for a reference emitted from a different compilation unit:
/// the full dotted name with dots replaced by underscores.
pub fn qualified_introspection_name(package: &str, full_name: &str) -> String {
    let flattened = full_name.replace('.', "_");
    if package.is_empty() {
        format!("${flattened}{INTROSPECTION_SUFFIX}")
    } else {
        format!("{package}.${flattened}{INTROSPECTION_SUFFIX}")
    }
}

/// Build-scoped done-set of generated names.
#[derive(Debug, Default)]
pub struct EmittedClasses {
    names: DashSet<String>,
}

impl EmittedClasses {
    /// Create an empty done-set
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a generated name; false when it was already claimed
    pub fn claim(&self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    /// Release a claimed name after a failed emission
    pub fn release(&self, name: &str) {
        self.names.remove(name);
    }

    /// True when the name was emitted
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Emits introspection artifacts into a sink.
pub struct IntrospectionEmitter<'a, S: ClassSink> {
    sink: &'a S,
    emitted: &'a EmittedClasses,
    defaults: &'a AnnotationDefaultsRegistry,
    retention: &'a RetentionLookup,
    strategy: MergeStrategy,
}

impl<'a, S: ClassSink> IntrospectionEmitter<'a, S> {
    /// Create an emitter over shared build state
    pub fn new(
        sink: &'a S,
        emitted: &'a EmittedClasses,
        defaults: &'a AnnotationDefaultsRegistry,
        retention: &'a RetentionLookup,
    ) -> Self {
        Self {
            sink,
            emitted,
            defaults,
            retention,
            strategy: MergeStrategy::default(),
        }
    }

    /// Override the metadata merge strategy
    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    fn freeze(&self, metadata: &AnnotationMetadata) -> AnnotationMetadata {
        metadata
            .flatten(self.strategy)
            .strip_source_only(self.retention)
    }

    /// Freeze member metadata: pull its defaults into `collected` and
    /// substitute a reference when it equals the frozen class metadata.
    fn freeze_member(
        &self,
        metadata: &AnnotationMetadata,
        class_metadata: &AnnotationMetadata,
        generated_name: &str,
        collected: &mut DefaultsCollector,
    ) -> AnnotationMetadata {
        let mut frozen = self.freeze(metadata);
        collected.extend(frozen.take_defaults());
        if !frozen.is_empty() && frozen == *class_metadata {
            return AnnotationMetadata::as_reference(generated_name);
        }
        frozen
    }

    /// Emit the artifact for a compiled class.
    ///
    /// Returns the generated name, or `None` when the class was already
    /// emitted (repeated requests are no-ops). Only a successful emission
    /// stays in the done-set; a failed one releases its claim so a later
    /// valid request for the same class is not suppressed.
    pub fn emit(&self, compiler: &IntrospectionCompiler) -> Result<Option<String>, CompileError> {
        let class = compiler.class();
        let name = introspection_name(class.package(), class.simple_name());
        if !self.emitted.claim(&name) {
            return Ok(None);
        }
        match self.emit_claimed(compiler, &name) {
            Ok(()) => Ok(Some(name)),
            Err(error) => {
                self.emitted.release(&name);
                Err(error)
            }
        }
    }

    fn emit_claimed(
        &self,
        compiler: &IntrospectionCompiler,
        name: &str,
    ) -> Result<(), CompileError> {
        let class = compiler.class();
        let mut collected = DefaultsCollector::default();
        let mut class_metadata = self.freeze(&class.metadata);
        collected.extend(class_metadata.take_defaults());

        let constructor = compiler.constructor().map(|ctor| ConstructorRef {
            function: ctor.function,
            arguments: ctor
                .parameters
                .iter()
                .map(|p| Argument {
                    name: p.name.clone(),
                    type_name: p.type_ref.name.clone(),
                    metadata: self.freeze_member(
                        &p.metadata,
                        &class_metadata,
                        name,
                        &mut collected,
                    ),
                })
                .collect(),
            metadata: self.freeze_member(
                &ctor.metadata,
                &class_metadata,
                name,
                &mut collected,
            ),
        });

        let properties: Vec<PropertyRef> = compiler
            .properties()
            .iter()
            .map(|p| PropertyRef {
                argument: Argument {
                    name: p.name.clone(),
                    type_name: p.type_ref.name.clone(),
                    metadata: self.freeze_member(
                        &p.metadata,
                        &class_metadata,
                        name,
                        &mut collected,
                    ),
                },
                read_type: p.read_type.as_ref().map(|t| t.name.clone()),
                write_type: p.write_type.as_ref().map(|t| t.name.clone()),
                get_index: p.get_index,
                set_index: p.set_index,
                with_index: p.with_index,
                read_only: p.read_only,
                mutable: p.mutable,
            })
            .collect();

        let methods: Vec<MethodRef> = compiler
            .methods()
            .iter()
            .map(|m| MethodRef {
                name: m.element.name.clone(),
                arguments: m
                    .element
                    .parameters
                    .iter()
                    .map(|p| Argument {
                        name: p.name.clone(),
                        type_name: p.type_ref.name.clone(),
                        metadata: self.freeze_member(
                            &p.metadata,
                            &class_metadata,
                            name,
                            &mut collected,
                        ),
                    })
                    .collect(),
                return_type: m.element.return_type.name.clone(),
                metadata: self.freeze_member(
                    &m.element.metadata,
                    &class_metadata,
                    name,
                    &mut collected,
                ),
                dispatch_index: m.dispatch_index,
            })
            .collect();

        let enum_constants: Vec<EnumConstantRef> = if class.kind == ClassKind::Enum {
            class
                .enum_constants
                .iter()
                .map(|c| EnumConstantRef {
                    name: c.name.clone(),
                    metadata: self.freeze_member(
                        &c.metadata,
                        &class_metadata,
                        name,
                        &mut collected,
                    ),
                })
                .collect()
        } else {
            Vec::new()
        };

        let indexes = build_indexes(compiler, class)?;
        let dispatch = compiler.builder.build(compiler.copy_binding());

        // Consolidated defaults live once on the class table; the global
        // registry sees each annotation type at most once.
        for (annotation, values) in &collected.defaults {
            self.defaults.register_once(annotation.clone(), values.clone());
        }
        class_metadata = attach_defaults(class_metadata, collected.defaults);

        let artifact = IntrospectionArtifact {
            class_name: class.name.clone(),
            flags: if class.kind == ClassKind::Enum {
                flags::IS_ENUM
            } else {
                0
            },
            metadata: class_metadata,
            constructor,
            default_constructor: compiler.default_constructor,
            properties,
            methods,
            enum_constants,
            indexes,
            dispatch,
        };

        let bytes = artifact.encode();
        {
            let mut output = self.sink.visit_class(name, &class.name)?;
            output.write_all(&bytes)?;
        }
        self.sink
            .visit_service_descriptor(SERVICE_DESCRIPTOR, name, &class.name)?;

        Ok(())
    }
}

#[derive(Debug, Default)]
struct DefaultsCollector {
    defaults: Vec<(String, Vec<(String, AnnotationValue)>)>,
}

impl DefaultsCollector {
    fn extend(&mut self, entries: Vec<(String, Vec<(String, AnnotationValue)>)>) {
        for (annotation, values) in entries {
            if !self.defaults.iter().any(|(name, _)| *name == annotation) {
                self.defaults.push((annotation, values));
            }
        }
    }
}

fn attach_defaults(
    metadata: AnnotationMetadata,
    defaults: Vec<(String, Vec<(String, AnnotationValue)>)>,
) -> AnnotationMetadata {
    if defaults.is_empty() {
        return metadata;
    }
    match metadata {
        AnnotationMetadata::Table(mut table) => {
            for (annotation, values) in defaults {
                table.add_defaults(annotation, values);
            }
            AnnotationMetadata::Table(table)
        }
        AnnotationMetadata::Empty => {
            let mut table = AnnotationTable::new();
            for (annotation, values) in defaults {
                table.add_defaults(annotation, values);
            }
            AnnotationMetadata::table(table)
        }
        other => {
            let mut table = AnnotationTable::new();
            for (annotation, values) in defaults {
                table.add_defaults(annotation, values);
            }
            AnnotationMetadata::merge(other, AnnotationMetadata::table(table))
        }
    }
}

/// Compile `index_property` declarations into per-annotation lookup tables.
///
/// An index referencing a property that was never visited is a fatal fault
/// for this class. Later declarations win for a repeated discriminator.
fn build_indexes(
    compiler: &IntrospectionCompiler,
    class: &ClassElement,
) -> Result<Vec<AnnotationIndex>, CompileError> {
    let mut order: Vec<String> = Vec::new();
    let mut tables: FxHashMap<String, AnnotationIndex> = FxHashMap::default();

    for decl in &compiler.index_decls {
        if !compiler.properties().iter().any(|p| p.name == decl.property) {
            return Err(CompileError::PropertyNotFound {
                property: decl.property.clone(),
                class: class.name.clone(),
            });
        }
        let index = tables.entry(decl.annotation.clone()).or_insert_with(|| {
            order.push(decl.annotation.clone());
            AnnotationIndex {
                annotation: decl.annotation.clone(),
                properties: Vec::new(),
                unconditional: None,
                by_value: Vec::new(),
            }
        });
        if !index.properties.contains(&decl.property) {
            index.properties.push(decl.property.clone());
        }
        match &decl.value {
            None => index.unconditional = Some(decl.property.clone()),
            Some(value) => {
                match index.by_value.iter_mut().find(|(v, _)| v == value) {
                    Some((_, property)) => *property = decl.property.clone(),
                    None => index.by_value.push((value.clone(), decl.property.clone())),
                }
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|annotation| tables.remove(&annotation))
        .collect())
}

/// Outcome of compiling a batch of classes.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Generated names, in emission order (duplicates suppressed)
    pub emitted: Vec<String>,
    /// Per-class failures, keyed by source class name
    pub failures: Vec<(String, CompileError)>,
}

/// Emit many classes, recovering per-class: one bad class never aborts the
/// rest of the batch.
pub fn compile_batch<S: ClassSink>(
    emitter: &IntrospectionEmitter<'_, S>,
    compilers: &[IntrospectionCompiler],
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for compiler in compilers {
        match emitter.emit(compiler) {
            Ok(Some(name)) => outcome.emitted.push(name),
            Ok(None) => {}
            Err(error) => outcome
                .failures
                .push((compiler.class().name.clone(), error)),
        }
    }
    outcome
}
