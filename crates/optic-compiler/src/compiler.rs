//! Property and method descriptor compiler.
//!
//! One [`IntrospectionCompiler`] handles one class. Visitation registers
//! dispatch targets as members are seen and accumulates the descriptor
//! tables the emitter later freezes into an artifact. Property order is
//! visitation order and defines emitted array order and index numbering.

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;

use optic_model::dispatch::{ReadAccessor, WriteAccessor, NO_DISPATCH};
use optic_model::metadata::AnnotationMetadata;

use crate::copy_ctor::{self, BoundCopyConstructor};
use crate::dispatch::DispatchTableBuilder;
use crate::element::{ClassElement, ConstructorElement, MemberRef, MethodElement, TypeRef};
use crate::error::CompileError;

/// Annotation carrying compiler configuration on the introspected class.
pub const INTROSPECTED_ANNOTATION: &str = "optic.Introspected";

/// Attribute overriding the wither method prefix.
const WITH_PREFIX_ATTRIBUTE: &str = "withPrefix";

/// Compiler configuration.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Default prefix for mutate-style methods (`withX`)
    pub with_prefix: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            with_prefix: "with".to_string(),
        }
    }
}

/// The compiled, pre-emission form of one property.
#[derive(Debug, Clone)]
pub struct PropertyData {
    /// Property name, unique within the class
    pub name: String,
    /// Declared type
    pub type_ref: TypeRef,
    /// Generic (unerased) type used for constructor-argument matching
    pub generic_type: TypeRef,
    /// How to read the current value, if readable
    pub read_accessor: Option<ReadAccessor>,
    /// How to write a value directly, if writable
    pub write_accessor: Option<WriteAccessor>,
    /// Covariant read type when distinct from the declared type
    pub read_type: Option<TypeRef>,
    /// Contravariant write type when distinct from the declared type
    pub write_type: Option<TypeRef>,
    /// Property annotation metadata
    pub metadata: AnnotationMetadata,
    /// True when no direct writer exists
    pub read_only: bool,
    /// Derived: `!read_only` or backed by a constructor argument
    pub mutable: bool,
    /// Read dispatch index, [`NO_DISPATCH`] if absent
    pub get_index: i32,
    /// Write dispatch index, [`NO_DISPATCH`] if absent
    pub set_index: i32,
    /// Mutate dispatch index (wither, copy-construct, or throw),
    /// [`NO_DISPATCH`] if absent
    pub with_index: i32,
}

impl PropertyData {
    /// The type a read accessor actually yields
    pub fn effective_read_type(&self) -> &TypeRef {
        self.read_type.as_ref().unwrap_or(&self.type_ref)
    }
}

/// A bean method recorded for invocation.
#[derive(Debug, Clone)]
pub struct BeanMethodData {
    /// The declared method
    pub element: MethodElement,
    /// Its multi-dispatch index
    pub dispatch_index: u32,
}

/// An `index_property` declaration, compiled into lookup tables at emission.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDeclaration {
    /// The indexed annotation name
    pub annotation: String,
    /// The indexed property name
    pub property: String,
    /// Optional discriminator value; `None` is the unconditional entry
    pub value: Option<String>,
}

/// Compiles the descriptor tables for one class.
#[derive(Debug)]
pub struct IntrospectionCompiler {
    pub(crate) class: ClassElement,
    options: CompilerOptions,
    pub(crate) builder: DispatchTableBuilder,
    pub(crate) constructor: Option<ConstructorElement>,
    pub(crate) default_constructor: Option<usize>,
    pub(crate) properties: Vec<PropertyData>,
    property_names: FxHashMap<String, usize>,
    pub(crate) methods: Vec<BeanMethodData>,
    pub(crate) index_decls: Vec<IndexDeclaration>,
    copy_binding: OnceCell<Result<BoundCopyConstructor, String>>,
}

impl IntrospectionCompiler {
    /// Create a compiler for `class`
    pub fn new(class: ClassElement, options: CompilerOptions) -> Self {
        Self {
            class,
            options,
            builder: DispatchTableBuilder::new(),
            constructor: None,
            default_constructor: None,
            properties: Vec::new(),
            property_names: FxHashMap::default(),
            methods: Vec::new(),
            index_decls: Vec::new(),
            copy_binding: OnceCell::new(),
        }
    }

    /// The class under compilation
    pub fn class(&self) -> &ClassElement {
        &self.class
    }

    /// The designated constructor, if visited
    pub fn constructor(&self) -> Option<&ConstructorElement> {
        self.constructor.as_ref()
    }

    /// Compiled properties in visitation order
    pub fn properties(&self) -> &[PropertyData] {
        &self.properties
    }

    /// Recorded bean methods
    pub fn methods(&self) -> &[BeanMethodData] {
        &self.methods
    }

    /// Record the designated (instantiating) constructor
    pub fn visit_constructor(&mut self, constructor: ConstructorElement) {
        self.constructor = Some(constructor);
    }

    /// Record a no-argument constructor, kept alongside any designated
    /// constructor so both instantiation paths are emitted
    pub fn visit_default_constructor(&mut self, function: usize) {
        self.default_constructor = Some(function);
    }

    /// The wither prefix, overridable per class through the
    /// `optic.Introspected` annotation
    fn with_prefix(&self) -> &str {
        self.class
            .metadata
            .string_value(INTROSPECTED_ANNOTATION, WITH_PREFIX_ATTRIBUTE)
            .unwrap_or(&self.options.with_prefix)
    }

    /// True when the designated constructor has a same-named parameter the
    /// property's type can be assigned to
    fn has_constructor_argument(&self, name: &str, generic_type: &TypeRef) -> bool {
        self.constructor
            .as_ref()
            .map(|ctor| {
                ctor.parameters
                    .iter()
                    .any(|p| p.name == name && p.type_ref.is_assignable_from(generic_type))
            })
            .unwrap_or(false)
    }

    /// Search declared instance methods for a wither: prefix + capitalized
    /// property name, exactly one assignable parameter, returning the
    /// owning type.
    fn find_wither(&self, name: &str, generic_type: &TypeRef) -> Option<MethodElement> {
        let expected = format!("{}{}", self.with_prefix(), capitalize(name));
        self.class
            .declared_methods
            .iter()
            .find(|m| {
                !m.is_private
                    && !m.is_static
                    && m.name == expected
                    && m.parameters.len() == 1
                    && m.parameters[0].type_ref.is_assignable_from(generic_type)
                    && m.return_type == self.class.type_ref()
            })
            .cloned()
    }

    /// Visit one bean property.
    #[allow(clippy::too_many_arguments)]
    pub fn visit_property(
        &mut self,
        type_ref: TypeRef,
        generic_type: TypeRef,
        name: impl Into<String>,
        read_member: Option<MemberRef>,
        write_member: Option<MemberRef>,
        read_type: Option<TypeRef>,
        write_type: Option<TypeRef>,
        metadata: AnnotationMetadata,
        is_read_only: bool,
    ) -> Result<(), CompileError> {
        let name = name.into();
        if self.property_names.contains_key(&name) {
            return Err(CompileError::DuplicateProperty {
                property: name,
                class: self.class.name.clone(),
            });
        }

        let (get_index, read_accessor) = match &read_member {
            None => (NO_DISPATCH, None),
            Some(MemberRef::Method(method)) => (
                self.builder.add_method(method, true) as i32,
                Some(ReadAccessor::Method {
                    function: method.function,
                }),
            ),
            Some(MemberRef::Field(field)) => (
                self.builder.add_get_field(field) as i32,
                Some(ReadAccessor::Field { slot: field.slot }),
            ),
        };

        let (set_index, write_accessor) = match &write_member {
            None => (NO_DISPATCH, None),
            Some(MemberRef::Method(method)) => (
                self.builder.add_method(method, true) as i32,
                Some(WriteAccessor::Method {
                    function: method.function,
                }),
            ),
            Some(MemberRef::Field(field)) => (
                self.builder.add_set_field(field) as i32,
                Some(WriteAccessor::Field { slot: field.slot }),
            ),
        };

        let mutable = !is_read_only || self.has_constructor_argument(&name, &generic_type);

        let with_index = if mutable {
            if write_member.is_none() {
                match self.find_wither(&name, &generic_type) {
                    Some(wither) => self.builder.add_method(&wither, true) as i32,
                    None => self.builder.add_copy_construct(name.clone()) as i32,
                }
            } else {
                // Direct writers double as the mutate path
                NO_DISPATCH
            }
        } else {
            self.builder.add_throw(format!(
                "Cannot mutate property [{}] that is not mutable via a setter method, field or constructor argument for type: {}",
                name, self.class.name
            )) as i32
        };

        self.property_names.insert(name.clone(), self.properties.len());
        self.properties.push(PropertyData {
            name,
            type_ref,
            generic_type,
            read_accessor,
            write_accessor,
            read_type,
            write_type,
            metadata,
            read_only: is_read_only,
            mutable,
            get_index,
            set_index,
            with_index,
        });
        Ok(())
    }

    /// Visit a non-property bean method. Private methods are skipped;
    /// returns false when skipped.
    pub fn visit_bean_method(&mut self, method: MethodElement) -> bool {
        if method.is_private {
            return false;
        }
        let dispatch_index = self.builder.add_method(&method, false);
        self.methods.push(BeanMethodData {
            element: method,
            dispatch_index,
        });
        true
    }

    /// Record an annotation index entry for a property.
    ///
    /// Multiple entries per annotation with distinct discriminator values are
    /// allowed; a `None` value is the unconditional match. Validation against
    /// visited properties happens at emission.
    pub fn index_property(
        &mut self,
        annotation: impl Into<String>,
        property: impl Into<String>,
        value: Option<String>,
    ) {
        self.index_decls.push(IndexDeclaration {
            annotation: annotation.into(),
            property: property.into(),
            value,
        });
    }

    /// The copy-constructor bind outcome, materialized once on first need.
    ///
    /// Without a designated constructor the plan binds against the
    /// no-argument constructor: zero parameters always bind, and uncovered
    /// read-write properties are carried over after construction.
    pub(crate) fn copy_binding(&self) -> Option<&Result<BoundCopyConstructor, String>> {
        if !self.builder.has_copy_construct() {
            return None;
        }
        Some(self.copy_binding.get_or_init(|| {
            match (&self.constructor, self.default_constructor) {
                (Some(constructor), _) => {
                    copy_ctor::bind(&self.class.name, constructor, &self.properties)
                }
                (None, Some(function)) => copy_ctor::bind(
                    &self.class.name,
                    &ConstructorElement::new(function, Vec::new()),
                    &self.properties,
                ),
                (None, None) => Err(format!(
                    "Cannot create copy of type [{}]. No accessible constructor",
                    self.class.name
                )),
            }
        }))
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}
