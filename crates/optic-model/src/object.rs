//! Runtime values, instances, and the native function registry.
//!
//! Introspections never touch concrete host types directly. The host models
//! its objects as slot-based [`Instance`]s and registers accessor and
//! constructor closures in a [`FunctionRegistry`]; dispatch operations refer
//! to those closures by dense id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Error raised while dispatching against an instance.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A dispatch op referenced a function id the registry does not have
    #[error("Unknown function id {0}")]
    UnknownFunction(usize),

    /// A field slot was out of range for the instance
    #[error("Field slot {slot} out of bounds (instance has {len} fields)")]
    FieldOutOfBounds {
        /// The requested slot
        slot: usize,
        /// Number of fields on the instance
        len: usize,
    },

    /// A field access was attempted on a non-object value
    #[error("Target value is not an object")]
    NotAnObject,

    /// No property with the given name exists on the introspected class
    #[error("No property found for name: {0}")]
    NoSuchProperty(String),

    /// The operation is not supported for this property
    #[error("{0}")]
    UnsupportedOperation(String),

    /// The class cannot be instantiated
    #[error("Cannot instantiate type [{0}]: {1}")]
    Instantiation(String, String),
}

/// A host object, held behind a lock so copies and mutations are atomic
/// with respect to concurrent readers.
#[derive(Debug)]
pub struct Instance {
    /// Unique instance id
    pub id: u64,
    /// Fully qualified class name
    pub class_name: String,
    /// Field values by slot
    pub fields: Vec<Value>,
}

impl Instance {
    /// Create an instance of `class_name` with the given field values
    pub fn new(class_name: impl Into<String>, fields: Vec<Value>) -> Self {
        Self {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            class_name: class_name.into(),
            fields,
        }
    }

    /// Read a field by slot
    pub fn get_field(&self, slot: usize) -> Result<Value, RuntimeError> {
        self.fields
            .get(slot)
            .cloned()
            .ok_or(RuntimeError::FieldOutOfBounds {
                slot,
                len: self.fields.len(),
            })
    }

    /// Write a field by slot
    pub fn set_field(&mut self, slot: usize, value: Value) -> Result<(), RuntimeError> {
        let len = self.fields.len();
        match self.fields.get_mut(slot) {
            Some(field) => {
                *field = value;
                Ok(())
            }
            None => Err(RuntimeError::FieldOutOfBounds { slot, len }),
        }
    }
}

/// A runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// String
    Str(String),
    /// A shared object reference
    Object(Arc<RwLock<Instance>>),
}

impl Value {
    /// Wrap a fresh instance as an object value
    pub fn object(instance: Instance) -> Self {
        Value::Object(Arc::new(RwLock::new(instance)))
    }

    /// Borrow the instance handle, if this is an object
    pub fn as_object(&self) -> Result<&Arc<RwLock<Instance>>, RuntimeError> {
        match self {
            Value::Object(instance) => Ok(instance),
            _ => Err(RuntimeError::NotAnObject),
        }
    }
}

// Objects compare by identity, everything else by value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A host-supplied native function.
///
/// The first argument is the dispatch target (the receiver, or `Null` for
/// constructors), the second the call arguments.
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Dense table of native functions, invoked by id.
///
/// Ids are assigned in registration order and must match the ids recorded in
/// the compiled dispatch table, so the host registers functions in the same
/// order the compiler numbered the class members.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: Vec<NativeFn>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, returning its id
    pub fn register(&mut self, function: NativeFn) -> usize {
        let id = self.functions.len();
        self.functions.push(function);
        id
    }

    /// Register a plain closure, returning its id
    pub fn register_fn<F>(&mut self, function: F) -> usize
    where
        F: Fn(&Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.register(Arc::new(function))
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// True when no functions are registered
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Invoke a function by id
    pub fn invoke(&self, id: usize, target: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let function = self
            .functions
            .get(id)
            .ok_or(RuntimeError::UnknownFunction(id))?;
        function(target, args)
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("len", &self.functions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_fields() {
        let mut instance = Instance::new("geom.Point", vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(instance.get_field(0).unwrap(), Value::Int(1));
        instance.set_field(1, Value::Int(5)).unwrap();
        assert_eq!(instance.get_field(1).unwrap(), Value::Int(5));
        assert!(matches!(
            instance.get_field(2),
            Err(RuntimeError::FieldOutOfBounds { slot: 2, len: 2 })
        ));
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let a = Instance::new("geom.Point", Vec::new());
        let b = Instance::new("geom.Point", Vec::new());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_object_equality_is_identity() {
        let a = Value::object(Instance::new("geom.Point", vec![Value::Int(1)]));
        let b = Value::object(Instance::new("geom.Point", vec![Value::Int(1)]));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_registry_invoke() {
        let mut registry = FunctionRegistry::new();
        let id = registry.register_fn(|_, args| Ok(args[0].clone()));
        assert_eq!(
            registry.invoke(id, &Value::Null, &[Value::Int(9)]).unwrap(),
            Value::Int(9)
        );
        assert!(matches!(
            registry.invoke(id + 1, &Value::Null, &[]),
            Err(RuntimeError::UnknownFunction(_))
        ));
    }
}
