//! Runtime introspection descriptors.
//!
//! These are the public data model decoded from an artifact: argument,
//! property, method, and enum-constant descriptors plus the annotation index
//! tables, assembled into a [`BeanIntrospection`] bound to a host function
//! registry.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::artifact::{
    ArtifactError, ArtifactReader, ArtifactWriter, ClassValuePool, DecodeError,
    IntrospectionArtifact,
};
use crate::defaults::AnnotationDefaultsRegistry;
use crate::dispatch::{DispatchTable, NO_DISPATCH};
use crate::metadata::AnnotationMetadata;
use crate::object::{FunctionRegistry, RuntimeError, Value};

/// A named, typed element: constructor parameter, property, or method
/// parameter, with its annotation metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// Element name
    pub name: String,
    /// Fully qualified type name
    pub type_name: String,
    /// Annotation metadata of the element
    pub metadata: AnnotationMetadata,
}

impl Argument {
    /// Create an argument with empty metadata
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            metadata: AnnotationMetadata::Empty,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: AnnotationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub(crate) fn encode(&self, writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
        writer.emit_string(&self.name);
        writer.emit_u32(pool.intern(&self.type_name));
        self.metadata.encode(writer, pool);
    }

    pub(crate) fn decode(
        reader: &mut ArtifactReader<'_>,
        pool: &ClassValuePool,
    ) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let offset = reader.offset();
        let type_name = pool.resolve(reader.read_u32()?, offset)?;
        let metadata = AnnotationMetadata::decode(reader, pool)?;
        Ok(Self {
            name,
            type_name,
            metadata,
        })
    }
}

/// The instantiating constructor of an introspected class.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorRef {
    /// Registry id of the constructor function
    pub function: usize,
    /// Parameter descriptors in declaration order
    pub arguments: Vec<Argument>,
    /// Annotation metadata of the constructor
    pub metadata: AnnotationMetadata,
}

impl ConstructorRef {
    pub(crate) fn encode(&self, writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
        writer.emit_u32(self.function as u32);
        writer.emit_u32(self.arguments.len() as u32);
        for argument in &self.arguments {
            argument.encode(writer, pool);
        }
        self.metadata.encode(writer, pool);
    }

    pub(crate) fn decode(
        reader: &mut ArtifactReader<'_>,
        pool: &ClassValuePool,
    ) -> Result<Self, DecodeError> {
        let function = reader.read_u32()? as usize;
        let count = reader.read_u32()? as usize;
        let mut arguments = Vec::with_capacity(count);
        for _ in 0..count {
            arguments.push(Argument::decode(reader, pool)?);
        }
        let metadata = AnnotationMetadata::decode(reader, pool)?;
        Ok(Self {
            function,
            arguments,
            metadata,
        })
    }
}

/// A compiled bean property descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRef {
    /// Name, declared type, and metadata of the property
    pub argument: Argument,
    /// Distinct covariant read type, when it differs from the declared type
    pub read_type: Option<String>,
    /// Distinct contravariant write type, when it differs from the declared type
    pub write_type: Option<String>,
    /// Dispatch index of the read accessor, [`NO_DISPATCH`] if absent
    pub get_index: i32,
    /// Dispatch index of the write accessor, [`NO_DISPATCH`] if absent
    pub set_index: i32,
    /// Dispatch index of the mutate path (wither, copy-construct, or throw),
    /// [`NO_DISPATCH`] if absent
    pub with_index: i32,
    /// True when the property has no direct writer
    pub read_only: bool,
    /// True when the property can be mutated via setter, field, or
    /// constructor argument
    pub mutable: bool,
}

impl PropertyRef {
    /// Property name
    pub fn name(&self) -> &str {
        &self.argument.name
    }

    /// Declared type name
    pub fn type_name(&self) -> &str {
        &self.argument.type_name
    }

    /// True when the property can be read
    pub fn is_readable(&self) -> bool {
        self.get_index != NO_DISPATCH
    }

    fn encode_option(value: &Option<String>, writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
        match value {
            None => writer.emit_u8(0),
            Some(name) => {
                writer.emit_u8(1);
                writer.emit_u32(pool.intern(name));
            }
        }
    }

    fn decode_option(
        reader: &mut ArtifactReader<'_>,
        pool: &ClassValuePool,
    ) -> Result<Option<String>, DecodeError> {
        match reader.read_u8()? {
            0 => Ok(None),
            _ => {
                let offset = reader.offset();
                Ok(Some(pool.resolve(reader.read_u32()?, offset)?))
            }
        }
    }

    pub(crate) fn encode(&self, writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
        self.argument.encode(writer, pool);
        Self::encode_option(&self.read_type, writer, pool);
        Self::encode_option(&self.write_type, writer, pool);
        writer.emit_i32(self.get_index);
        writer.emit_i32(self.set_index);
        writer.emit_i32(self.with_index);
        writer.emit_u8(u8::from(self.read_only));
        writer.emit_u8(u8::from(self.mutable));
    }

    pub(crate) fn decode(
        reader: &mut ArtifactReader<'_>,
        pool: &ClassValuePool,
    ) -> Result<Self, DecodeError> {
        Ok(Self {
            argument: Argument::decode(reader, pool)?,
            read_type: Self::decode_option(reader, pool)?,
            write_type: Self::decode_option(reader, pool)?,
            get_index: reader.read_i32()?,
            set_index: reader.read_i32()?,
            with_index: reader.read_i32()?,
            read_only: reader.read_u8()? != 0,
            mutable: reader.read_u8()? != 0,
        })
    }
}

/// A compiled bean method descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    /// Method name
    pub name: String,
    /// Parameter descriptors
    pub arguments: Vec<Argument>,
    /// Fully qualified return type name
    pub return_type: String,
    /// Annotation metadata of the method
    pub metadata: AnnotationMetadata,
    /// Dispatch index of the invocation
    pub dispatch_index: u32,
}

impl MethodRef {
    pub(crate) fn encode(&self, writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.arguments.len() as u32);
        for argument in &self.arguments {
            argument.encode(writer, pool);
        }
        writer.emit_u32(pool.intern(&self.return_type));
        self.metadata.encode(writer, pool);
        writer.emit_u32(self.dispatch_index);
    }

    pub(crate) fn decode(
        reader: &mut ArtifactReader<'_>,
        pool: &ClassValuePool,
    ) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let count = reader.read_u32()? as usize;
        let mut arguments = Vec::with_capacity(count);
        for _ in 0..count {
            arguments.push(Argument::decode(reader, pool)?);
        }
        let offset = reader.offset();
        let return_type = pool.resolve(reader.read_u32()?, offset)?;
        let metadata = AnnotationMetadata::decode(reader, pool)?;
        let dispatch_index = reader.read_u32()?;
        Ok(Self {
            name,
            arguments,
            return_type,
            metadata,
            dispatch_index,
        })
    }
}

/// One enum constant of an introspected enum type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumConstantRef {
    /// Constant name
    pub name: String,
    /// Annotation metadata of the constant
    pub metadata: AnnotationMetadata,
}

impl EnumConstantRef {
    pub(crate) fn encode(&self, writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
        writer.emit_string(&self.name);
        self.metadata.encode(writer, pool);
    }

    pub(crate) fn decode(
        reader: &mut ArtifactReader<'_>,
        pool: &ClassValuePool,
    ) -> Result<Self, DecodeError> {
        Ok(Self {
            name: reader.read_string()?,
            metadata: AnnotationMetadata::decode(reader, pool)?,
        })
    }
}

/// Compiled property lookup table for one indexed annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationIndex {
    /// The indexed annotation name
    pub annotation: String,
    /// All indexed property names, insertion order
    pub properties: Vec<String>,
    /// Property matched when no discriminator value applies
    pub unconditional: Option<String>,
    /// Discriminator value to property name
    pub by_value: Vec<(String, String)>,
}

impl AnnotationIndex {
    pub(crate) fn encode(&self, writer: &mut ArtifactWriter) {
        writer.emit_string(&self.annotation);
        writer.emit_string_list(&self.properties);
        match &self.unconditional {
            None => writer.emit_u8(0),
            Some(property) => {
                writer.emit_u8(1);
                writer.emit_string(property);
            }
        }
        writer.emit_u32(self.by_value.len() as u32);
        for (value, property) in &self.by_value {
            writer.emit_string(value);
            writer.emit_string(property);
        }
    }

    pub(crate) fn decode(reader: &mut ArtifactReader<'_>) -> Result<Self, DecodeError> {
        let annotation = reader.read_string()?;
        let properties = reader.read_string_list()?;
        let unconditional = match reader.read_u8()? {
            0 => None,
            _ => Some(reader.read_string()?),
        };
        let count = reader.read_u32()? as usize;
        let mut by_value = Vec::with_capacity(count);
        for _ in 0..count {
            let value = reader.read_string()?;
            let property = reader.read_string()?;
            by_value.push((value, property));
        }
        Ok(Self {
            annotation,
            properties,
            unconditional,
            by_value,
        })
    }
}

/// A loaded introspection: descriptor tables plus the dispatch table, bound
/// to the host's function registry.
#[derive(Debug)]
pub struct BeanIntrospection {
    class_name: String,
    flags: u32,
    metadata: AnnotationMetadata,
    constructor: Option<ConstructorRef>,
    default_constructor: Option<usize>,
    properties: Vec<PropertyRef>,
    property_index: FxHashMap<String, usize>,
    methods: Vec<MethodRef>,
    enum_constants: Vec<EnumConstantRef>,
    indexes: Vec<AnnotationIndex>,
    dispatch: DispatchTable,
    registry: Arc<FunctionRegistry>,
}

impl BeanIntrospection {
    /// Decode an artifact and bind it to `registry`, registering the
    /// artifact's annotation defaults at most once.
    pub fn load(
        data: &[u8],
        registry: Arc<FunctionRegistry>,
        defaults: &AnnotationDefaultsRegistry,
    ) -> Result<Self, ArtifactError> {
        let artifact = IntrospectionArtifact::decode(data)?;
        Ok(Self::from_artifact(artifact, registry, defaults))
    }

    /// Bind a decoded artifact to `registry`.
    pub fn from_artifact(
        artifact: IntrospectionArtifact,
        registry: Arc<FunctionRegistry>,
        defaults: &AnnotationDefaultsRegistry,
    ) -> Self {
        register_defaults(&artifact.metadata, defaults);
        if let Some(constructor) = &artifact.constructor {
            register_defaults(&constructor.metadata, defaults);
            for argument in &constructor.arguments {
                register_defaults(&argument.metadata, defaults);
            }
        }
        for property in &artifact.properties {
            register_defaults(&property.argument.metadata, defaults);
        }
        for method in &artifact.methods {
            register_defaults(&method.metadata, defaults);
            for argument in &method.arguments {
                register_defaults(&argument.metadata, defaults);
            }
        }
        for constant in &artifact.enum_constants {
            register_defaults(&constant.metadata, defaults);
        }

        let property_index = artifact
            .properties
            .iter()
            .enumerate()
            .map(|(i, p)| (p.argument.name.clone(), i))
            .collect();
        Self {
            class_name: artifact.class_name,
            flags: artifact.flags,
            metadata: artifact.metadata,
            constructor: artifact.constructor,
            default_constructor: artifact.default_constructor,
            properties: artifact.properties,
            property_index,
            methods: artifact.methods,
            enum_constants: artifact.enum_constants,
            indexes: artifact.indexes,
            dispatch: DispatchTable::new(artifact.dispatch),
            registry,
        }
    }

    /// Fully qualified name of the introspected class
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Artifact flags
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Class-level annotation metadata
    pub fn metadata(&self) -> &AnnotationMetadata {
        &self.metadata
    }

    /// The instantiating constructor, if any
    pub fn constructor(&self) -> Option<&ConstructorRef> {
        self.constructor.as_ref()
    }

    /// Property descriptors in compilation order
    pub fn properties(&self) -> &[PropertyRef] {
        &self.properties
    }

    /// Property names in compilation order
    pub fn property_names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name()).collect()
    }

    /// Look up a property by name
    pub fn get_property(&self, name: &str) -> Option<&PropertyRef> {
        self.property_index.get(name).map(|i| &self.properties[*i])
    }

    /// Bean method descriptors
    pub fn methods(&self) -> &[MethodRef] {
        &self.methods
    }

    /// Enum constants (empty unless the class is an enum)
    pub fn enum_constants(&self) -> &[EnumConstantRef] {
        &self.enum_constants
    }

    fn required_property(&self, name: &str) -> Result<&PropertyRef, RuntimeError> {
        self.get_property(name)
            .ok_or_else(|| RuntimeError::NoSuchProperty(name.to_string()))
    }

    /// Read a property value off an instance.
    pub fn get(&self, target: &Value, name: &str) -> Result<Value, RuntimeError> {
        let property = self.required_property(name)?;
        if property.get_index == NO_DISPATCH {
            return Err(RuntimeError::UnsupportedOperation(format!(
                "Cannot read property [{}] for type: {}",
                name, self.class_name
            )));
        }
        self.dispatch
            .dispatch_one(&self.registry, property.get_index as u32, target, None)
    }

    /// Write a property value onto an instance through its direct writer.
    pub fn set(&self, target: &Value, name: &str, value: Value) -> Result<(), RuntimeError> {
        let property = self.required_property(name)?;
        if property.set_index == NO_DISPATCH {
            return Err(RuntimeError::UnsupportedOperation(format!(
                "Cannot write read-only property: {name}"
            )));
        }
        self.dispatch.dispatch_one(
            &self.registry,
            property.set_index as u32,
            target,
            Some(&value),
        )?;
        Ok(())
    }

    /// Mutate a property, returning the instance carrying the new value.
    ///
    /// Setter-backed properties are mutated in place and the same instance
    /// is returned; copy-constructor-backed and wither-backed properties
    /// return a fresh instance. Non-mutable properties fail with the
    /// compiled diagnostic.
    pub fn with_value(&self, target: &Value, name: &str, value: Value) -> Result<Value, RuntimeError> {
        let property = self.required_property(name)?;
        if property.with_index != NO_DISPATCH {
            return self.dispatch.dispatch_one(
                &self.registry,
                property.with_index as u32,
                target,
                Some(&value),
            );
        }
        if property.set_index != NO_DISPATCH {
            self.dispatch.dispatch_one(
                &self.registry,
                property.set_index as u32,
                target,
                Some(&value),
            )?;
            return Ok(target.clone());
        }
        Err(RuntimeError::UnsupportedOperation(format!(
            "Cannot mutate property [{}] that is not mutable via a setter method, field or constructor argument for type: {}",
            name, self.class_name
        )))
    }

    /// Instantiate through the no-argument path.
    ///
    /// Uses the dedicated no-argument constructor when one was emitted,
    /// otherwise the designated constructor if it takes no arguments.
    pub fn instantiate(&self) -> Result<Value, RuntimeError> {
        if let Some(function) = self.default_constructor {
            return self.registry.invoke(function, &Value::Null, &[]);
        }
        match &self.constructor {
            None => Err(RuntimeError::Instantiation(
                self.class_name.clone(),
                "No accessible constructor".to_string(),
            )),
            Some(constructor) if constructor.arguments.is_empty() => {
                self.registry.invoke(constructor.function, &Value::Null, &[])
            }
            Some(constructor) => Err(RuntimeError::Instantiation(
                self.class_name.clone(),
                format!(
                    "Constructor requires {} arguments",
                    constructor.arguments.len()
                ),
            )),
        }
    }

    /// Instantiate through the positional-arguments path.
    pub fn instantiate_with(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let Some(constructor) = &self.constructor else {
            return Err(RuntimeError::Instantiation(
                self.class_name.clone(),
                "No accessible constructor".to_string(),
            ));
        };
        if args.len() != constructor.arguments.len() {
            return Err(RuntimeError::Instantiation(
                self.class_name.clone(),
                format!(
                    "Expected {} arguments, got {}",
                    constructor.arguments.len(),
                    args.len()
                ),
            ));
        }
        self.registry.invoke(constructor.function, &Value::Null, args)
    }

    /// Invoke a bean method by name.
    pub fn call_method(
        &self,
        target: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let method = self
            .methods
            .iter()
            .find(|m| m.name == name && m.arguments.len() == args.len())
            .ok_or_else(|| RuntimeError::NoSuchProperty(name.to_string()))?;
        self.dispatch
            .dispatch_multi(&self.registry, method.dispatch_index, target, args)
    }

    /// Find the property indexed under `annotation`, optionally matching a
    /// discriminator value, falling back to the unconditional entry.
    pub fn find_indexed_property(
        &self,
        annotation: &str,
        value: Option<&str>,
    ) -> Option<&PropertyRef> {
        let index = self.indexes.iter().find(|i| i.annotation == annotation)?;
        let name = match value {
            Some(value) => index
                .by_value
                .iter()
                .find(|(v, _)| v == value)
                .map(|(_, property)| property)
                .or(index.unconditional.as_ref())?,
            None => index.unconditional.as_ref()?,
        };
        self.get_property(name)
    }

    /// All properties indexed under `annotation`, in index order.
    pub fn get_indexed_properties(&self, annotation: &str) -> Vec<&PropertyRef> {
        self.indexes
            .iter()
            .find(|i| i.annotation == annotation)
            .map(|index| {
                index
                    .properties
                    .iter()
                    .filter_map(|name| self.get_property(name))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn register_defaults(metadata: &AnnotationMetadata, defaults: &AnnotationDefaultsRegistry) {
    for (annotation, values) in metadata.defaults() {
        defaults.register_once(annotation, values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchOp;
    use crate::object::Instance;

    fn labeled_introspection() -> BeanIntrospection {
        // geom.Labeled { value: int (field 0, read/write), label: str (field 1, read only) }
        let mut registry = FunctionRegistry::new();
        let ctor = registry.register_fn(|_, args| {
            let mut fields = args.to_vec();
            fields.resize(2, Value::Null);
            Ok(Value::object(Instance::new("geom.Labeled", fields)))
        });
        let artifact = IntrospectionArtifact {
            class_name: "geom.Labeled".to_string(),
            flags: 0,
            metadata: AnnotationMetadata::Empty,
            constructor: Some(ConstructorRef {
                function: ctor,
                arguments: vec![Argument::new("value", "int"), Argument::new("label", "str")],
                metadata: AnnotationMetadata::Empty,
            }),
            default_constructor: None,
            properties: vec![
                PropertyRef {
                    argument: Argument::new("value", "int"),
                    read_type: None,
                    write_type: None,
                    get_index: 0,
                    set_index: 1,
                    with_index: NO_DISPATCH,
                    read_only: false,
                    mutable: true,
                },
                PropertyRef {
                    argument: Argument::new("label", "str"),
                    read_type: None,
                    write_type: None,
                    get_index: 2,
                    set_index: NO_DISPATCH,
                    with_index: 3,
                    read_only: true,
                    mutable: false,
                },
            ],
            methods: Vec::new(),
            enum_constants: Vec::new(),
            indexes: vec![AnnotationIndex {
                annotation: "optic.Id".to_string(),
                properties: vec!["value".to_string()],
                unconditional: Some("value".to_string()),
                by_value: vec![("v".to_string(), "value".to_string())],
            }],
            dispatch: vec![
                DispatchOp::GetField { slot: 0 },
                DispatchOp::SetField { slot: 0 },
                DispatchOp::GetField { slot: 1 },
                DispatchOp::Throw {
                    message: "Cannot mutate property [label] that is not mutable via a setter method, field or constructor argument for type: geom.Labeled".to_string(),
                },
            ],
        };
        let defaults = AnnotationDefaultsRegistry::new();
        BeanIntrospection::from_artifact(artifact, Arc::new(registry), &defaults)
    }

    #[test]
    fn test_get_set_roundtrip() {
        let introspection = labeled_introspection();
        let target = introspection
            .instantiate_with(&[Value::Int(5), Value::Str("tag".to_string())])
            .unwrap();
        assert_eq!(introspection.get(&target, "value").unwrap(), Value::Int(5));
        introspection.set(&target, "value", Value::Int(9)).unwrap();
        assert_eq!(introspection.get(&target, "value").unwrap(), Value::Int(9));
        // Sibling property untouched
        assert_eq!(
            introspection.get(&target, "label").unwrap(),
            Value::Str("tag".to_string())
        );
    }

    #[test]
    fn test_set_read_only_fails() {
        let introspection = labeled_introspection();
        let target = introspection
            .instantiate_with(&[Value::Int(1), Value::Str("x".to_string())])
            .unwrap();
        let err = introspection
            .set(&target, "label", Value::Str("y".to_string()))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_with_value_surfaces_compiled_throw() {
        let introspection = labeled_introspection();
        let target = introspection
            .instantiate_with(&[Value::Int(1), Value::Str("x".to_string())])
            .unwrap();
        let err = introspection
            .with_value(&target, "label", Value::Str("y".to_string()))
            .unwrap_err();
        let RuntimeError::UnsupportedOperation(message) = err else {
            panic!("expected unsupported operation");
        };
        assert!(message.contains("Cannot mutate property [label]"));
        assert!(message.contains("for type: geom.Labeled"));
    }

    #[test]
    fn test_with_value_setter_backed_returns_same_instance() {
        let introspection = labeled_introspection();
        let target = introspection
            .instantiate_with(&[Value::Int(1), Value::Str("x".to_string())])
            .unwrap();
        let mutated = introspection
            .with_value(&target, "value", Value::Int(7))
            .unwrap();
        assert_eq!(mutated, target);
        assert_eq!(introspection.get(&mutated, "value").unwrap(), Value::Int(7));
    }

    #[test]
    fn test_unknown_property() {
        let introspection = labeled_introspection();
        assert!(matches!(
            introspection.get(&Value::Null, "missing"),
            Err(RuntimeError::NoSuchProperty(_))
        ));
    }

    #[test]
    fn test_indexed_lookup() {
        let introspection = labeled_introspection();
        let by_value = introspection.find_indexed_property("optic.Id", Some("v"));
        assert_eq!(by_value.map(|p| p.name()), Some("value"));
        // Unknown discriminator falls back to the unconditional entry
        let fallback = introspection.find_indexed_property("optic.Id", Some("zzz"));
        assert_eq!(fallback.map(|p| p.name()), Some("value"));
        assert!(introspection.find_indexed_property("optic.Other", None).is_none());
        assert_eq!(introspection.get_indexed_properties("optic.Id").len(), 1);
    }

    #[test]
    fn test_instantiate_requires_arguments() {
        let introspection = labeled_introspection();
        assert!(matches!(
            introspection.instantiate(),
            Err(RuntimeError::Instantiation(..))
        ));
        assert!(matches!(
            introspection.instantiate_with(&[Value::Int(1)]),
            Err(RuntimeError::Instantiation(..))
        ));
    }
}
