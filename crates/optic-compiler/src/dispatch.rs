//! Dispatch table builder.
//!
//! Assigns dense integer indices to access targets in registration order.
//! Indices are stable for the lifetime of one compiled class and never
//! reused. Registration deduplicates by element identity, so registering the
//! same declaration twice returns the same index while structural twins get
//! distinct indices.

use rustc_hash::FxHashMap;

use optic_model::dispatch::DispatchOp;

use crate::copy_ctor::BoundCopyConstructor;
use crate::element::{ElementId, FieldElement, MethodElement};

/// An access target pending lowering into a [`DispatchOp`].
#[derive(Debug, Clone, PartialEq)]
enum DispatchTarget {
    Method {
        function: usize,
        arity: usize,
        void: bool,
    },
    GetField {
        slot: usize,
    },
    SetField {
        slot: usize,
    },
    Throw {
        message: String,
    },
    /// Copy-construct entry for one property; resolved against the shared
    /// plan (or degraded to a throw) at build time.
    CopyConstruct {
        property: String,
    },
}

/// Builds the dispatch table for one class.
#[derive(Debug, Default)]
pub struct DispatchTableBuilder {
    targets: Vec<DispatchTarget>,
    method_index: FxHashMap<(ElementId, bool), u32>,
    get_field_index: FxHashMap<ElementId, u32>,
    set_field_index: FxHashMap<ElementId, u32>,
}

impl DispatchTableBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, target: DispatchTarget) -> u32 {
        let index = self.targets.len() as u32;
        self.targets.push(target);
        index
    }

    /// Register a method invocation target.
    ///
    /// `one_dispatch` marks accessor-style targets taking at most one
    /// argument; the same method can hold both a one-dispatch and a
    /// multi-dispatch entry.
    pub fn add_method(&mut self, method: &MethodElement, one_dispatch: bool) -> u32 {
        if let Some(index) = self.method_index.get(&(method.id, one_dispatch)) {
            return *index;
        }
        let index = self.push(DispatchTarget::Method {
            function: method.function,
            arity: method.parameters.len(),
            void: method.is_void,
        });
        self.method_index.insert((method.id, one_dispatch), index);
        index
    }

    /// Register a direct field read target
    pub fn add_get_field(&mut self, field: &FieldElement) -> u32 {
        if let Some(index) = self.get_field_index.get(&field.id) {
            return *index;
        }
        let index = self.push(DispatchTarget::GetField { slot: field.slot });
        self.get_field_index.insert(field.id, index);
        index
    }

    /// Register a direct field write target
    pub fn add_set_field(&mut self, field: &FieldElement) -> u32 {
        if let Some(index) = self.set_field_index.get(&field.id) {
            return *index;
        }
        let index = self.push(DispatchTarget::SetField { slot: field.slot });
        self.set_field_index.insert(field.id, index);
        index
    }

    /// Register a target that always fails with `message`
    pub fn add_throw(&mut self, message: impl Into<String>) -> u32 {
        let message = message.into();
        self.push(DispatchTarget::Throw { message })
    }

    /// Register a copy-construct entry for `property`.
    ///
    /// Every relying property gets its own index; the construction plan is
    /// shared and the index selects which constructor argument to replace.
    pub fn add_copy_construct(&mut self, property: impl Into<String>) -> u32 {
        let property = property.into();
        self.push(DispatchTarget::CopyConstruct { property })
    }

    /// True when any copy-construct entry was registered
    pub fn has_copy_construct(&self) -> bool {
        self.targets
            .iter()
            .any(|t| matches!(t, DispatchTarget::CopyConstruct { .. }))
    }

    /// Number of registered targets
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True when no targets are registered
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Lower all targets into dispatch operations.
    ///
    /// `binding` is the copy-constructor bind outcome for the class: bound
    /// plans resolve each copy-construct entry to its constructor argument;
    /// a failed bind degrades every relying entry to an individual throw
    /// carrying the bind diagnostic, so a broken plan is never partially
    /// materialized.
    pub fn build(&self, binding: Option<&Result<BoundCopyConstructor, String>>) -> Vec<DispatchOp> {
        self.targets
            .iter()
            .map(|target| match target {
                DispatchTarget::Method {
                    function,
                    arity,
                    void,
                } => DispatchOp::InvokeMethod {
                    function: *function,
                    arity: *arity,
                    void: *void,
                },
                DispatchTarget::GetField { slot } => DispatchOp::GetField { slot: *slot },
                DispatchTarget::SetField { slot } => DispatchOp::SetField { slot: *slot },
                DispatchTarget::Throw { message } => DispatchOp::Throw {
                    message: message.clone(),
                },
                DispatchTarget::CopyConstruct { property } => match binding {
                    Some(Ok(bound)) => match bound.param_for(property) {
                        Some(param) => DispatchOp::CopyConstruct {
                            plan: bound.plan().clone(),
                            param,
                        },
                        None => DispatchOp::Throw {
                            message: bound.unbound_message(property),
                        },
                    },
                    Some(Err(message)) => DispatchOp::Throw {
                        message: message.clone(),
                    },
                    None => DispatchOp::Throw {
                        message: format!(
                            "Cannot create copy of type for property [{property}]: no constructor available"
                        ),
                    },
                },
            })
            .collect()
    }
}
