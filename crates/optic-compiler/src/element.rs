//! Class descriptions consumed by the compiler.
//!
//! The host build system prepares these elements (it owns parsing and source
//! visitation); the compiler only reads them. Every member element carries a
//! unique identity so dispatch registration can deduplicate repeated
//! registrations of the *same* declaration while keeping structural twins
//! distinct.

use std::sync::atomic::{AtomicU64, Ordering};

use optic_model::metadata::AnnotationMetadata;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one declared element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(u64);

impl ElementId {
    fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Wildcard type name assignable to and from everything.
const ANY: &str = "any";

/// A named type reference.
///
/// Assignability is nominal: equal names are assignable, plus the `any`
/// wildcard in either position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Fully qualified type name
    pub name: String,
}

impl TypeRef {
    /// Create a type reference
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The wildcard type
    pub fn any() -> Self {
        Self::new(ANY)
    }

    /// True when a value of type `other` can be used where `self` is expected
    pub fn is_assignable_from(&self, other: &TypeRef) -> bool {
        self.name == ANY || other.name == ANY || self.name == other.name
    }
}

/// A method or constructor parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterElement {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub type_ref: TypeRef,
    /// Annotation metadata
    pub metadata: AnnotationMetadata,
}

impl ParameterElement {
    /// Create a parameter with empty metadata
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_ref,
            metadata: AnnotationMetadata::Empty,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: AnnotationMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A declared method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodElement {
    /// Element identity
    pub id: ElementId,
    /// Method name
    pub name: String,
    /// Fully qualified name of the declaring class
    pub declaring_class: String,
    /// Parameters in declaration order
    pub parameters: Vec<ParameterElement>,
    /// Return type
    pub return_type: TypeRef,
    /// Registry id of the host function implementing the method
    pub function: usize,
    /// Declared private
    pub is_private: bool,
    /// Declared static
    pub is_static: bool,
    /// True when the method returns nothing useful
    pub is_void: bool,
    /// Annotation metadata
    pub metadata: AnnotationMetadata,
}

impl MethodElement {
    /// Create a public instance method
    pub fn new(
        name: impl Into<String>,
        declaring_class: impl Into<String>,
        return_type: TypeRef,
        function: usize,
    ) -> Self {
        Self {
            id: ElementId::next(),
            name: name.into(),
            declaring_class: declaring_class.into(),
            parameters: Vec::new(),
            return_type,
            function,
            is_private: false,
            is_static: false,
            is_void: false,
            metadata: AnnotationMetadata::Empty,
        }
    }

    /// Set the parameter list
    pub fn with_parameters(mut self, parameters: Vec<ParameterElement>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Mark the method private
    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    /// Mark the method static
    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Mark the method as returning nothing
    pub fn void(mut self) -> Self {
        self.is_void = true;
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: AnnotationMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A declared field, addressed by slot.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldElement {
    /// Element identity
    pub id: ElementId,
    /// Field name
    pub name: String,
    /// Fully qualified name of the declaring class
    pub declaring_class: String,
    /// Field type
    pub type_ref: TypeRef,
    /// Dense slot in the instance field vector
    pub slot: usize,
    /// Annotation metadata
    pub metadata: AnnotationMetadata,
}

impl FieldElement {
    /// Create a field
    pub fn new(
        name: impl Into<String>,
        declaring_class: impl Into<String>,
        type_ref: TypeRef,
        slot: usize,
    ) -> Self {
        Self {
            id: ElementId::next(),
            name: name.into(),
            declaring_class: declaring_class.into(),
            type_ref,
            slot,
            metadata: AnnotationMetadata::Empty,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: AnnotationMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A member usable as a property read or write accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberRef {
    /// A getter or setter method
    Method(MethodElement),
    /// A directly accessible field
    Field(FieldElement),
}

/// A declared constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorElement {
    /// Registry id of the host constructor function
    pub function: usize,
    /// Parameters in declaration order
    pub parameters: Vec<ParameterElement>,
    /// Annotation metadata
    pub metadata: AnnotationMetadata,
}

impl ConstructorElement {
    /// Create a constructor
    pub fn new(function: usize, parameters: Vec<ParameterElement>) -> Self {
        Self {
            function,
            parameters,
            metadata: AnnotationMetadata::Empty,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: AnnotationMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One constant of an enum class.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumConstantElement {
    /// Constant name
    pub name: String,
    /// Annotation metadata
    pub metadata: AnnotationMetadata,
}

impl EnumConstantElement {
    /// Create an enum constant with empty metadata
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: AnnotationMetadata::Empty,
        }
    }
}

/// Kind of the introspected class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassKind {
    /// An ordinary class
    #[default]
    Class,
    /// A record / value type
    Record,
    /// An enumerated type
    Enum,
}

/// The class under compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassElement {
    /// Fully qualified class name
    pub name: String,
    /// Class kind
    pub kind: ClassKind,
    /// Annotation metadata of the class, merged own-over-inherited
    pub metadata: AnnotationMetadata,
    /// Declared instance methods, searched for wither candidates
    pub declared_methods: Vec<MethodElement>,
    /// Enum constants (enum kind only)
    pub enum_constants: Vec<EnumConstantElement>,
}

impl ClassElement {
    /// Create a class description
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            metadata: AnnotationMetadata::Empty,
            declared_methods: Vec::new(),
            enum_constants: Vec::new(),
        }
    }

    /// Attach class metadata
    pub fn with_metadata(mut self, metadata: AnnotationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the declared methods
    pub fn with_declared_methods(mut self, methods: Vec<MethodElement>) -> Self {
        self.declared_methods = methods;
        self
    }

    /// Set the enum constants
    pub fn with_enum_constants(mut self, constants: Vec<EnumConstantElement>) -> Self {
        self.enum_constants = constants;
        self
    }

    /// The package portion of the name, empty for the default package
    pub fn package(&self) -> &str {
        self.name.rsplit_once('.').map(|(p, _)| p).unwrap_or("")
    }

    /// The simple name
    pub fn simple_name(&self) -> &str {
        self.name.rsplit_once('.').map(|(_, s)| s).unwrap_or(&self.name)
    }

    /// The owning type as a type reference
    pub fn type_ref(&self) -> TypeRef {
        TypeRef::new(self.name.clone())
    }
}
