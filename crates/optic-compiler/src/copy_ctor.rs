//! Copy-constructor synthesis.
//!
//! For immutable types with no setters, mutation is synthesized by rebuilding
//! the instance through its constructor. Binding traces every constructor
//! parameter to a previously visited property's read accessor of assignable
//! type; one bound plan is shared by the whole class and each relying
//! property selects its constructor argument by dispatch entry. Binding is
//! all-or-nothing: a single untraceable parameter invalidates the plan.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use optic_model::dispatch::{CopyConstructPlan, PostCopy};

use crate::compiler::PropertyData;
use crate::element::ConstructorElement;

/// A successfully bound copy-constructor plan for one class.
#[derive(Debug)]
pub struct BoundCopyConstructor {
    class_name: String,
    plan: Arc<CopyConstructPlan>,
    param_for_property: FxHashMap<String, usize>,
}

impl BoundCopyConstructor {
    /// The shared construction plan
    pub fn plan(&self) -> &Arc<CopyConstructPlan> {
        &self.plan
    }

    /// Constructor argument position backing `property`, if any
    pub fn param_for(&self, property: &str) -> Option<usize> {
        self.param_for_property.get(property).copied()
    }

    /// Diagnostic for a property that relies on the plan without a backing
    /// constructor argument
    pub fn unbound_message(&self, property: &str) -> String {
        format!(
            "Cannot create copy of type [{}]. Constructor does not contain argument [{}]",
            self.class_name, property
        )
    }
}

/// Bind every constructor parameter to a readable property of assignable
/// type. On failure the returned message names the first offending
/// parameter; the caller degrades all relying dispatch entries to throws.
pub fn bind(
    class_name: &str,
    constructor: &ConstructorElement,
    properties: &[PropertyData],
) -> Result<BoundCopyConstructor, String> {
    let mut args = Vec::with_capacity(constructor.parameters.len());
    let mut param_for_property = FxHashMap::default();

    for (position, parameter) in constructor.parameters.iter().enumerate() {
        let property = properties.iter().find(|p| p.name == parameter.name);
        let Some(property) = property else {
            return Err(not_readable(class_name, &parameter.name));
        };
        let Some(read) = property.read_accessor else {
            return Err(not_readable(class_name, &parameter.name));
        };
        let read_type = property.effective_read_type();
        if !parameter.type_ref.is_assignable_from(read_type) {
            return Err(format!(
                "Cannot create copy of type [{}]. Property of type [{}] is not assignable to constructor argument [{}]",
                class_name, read_type.name, parameter.name
            ));
        }
        args.push(read);
        param_for_property.insert(property.name.clone(), position);
    }

    // Read-write properties the constructor does not cover are carried over
    // via their setters after construction.
    let post_copies = properties
        .iter()
        .filter(|p| !param_for_property.contains_key(&p.name))
        .filter_map(|p| {
            let read = p.read_accessor?;
            let write = p.write_accessor?;
            Some(PostCopy { read, write })
        })
        .collect();

    Ok(BoundCopyConstructor {
        class_name: class_name.to_string(),
        plan: Arc::new(CopyConstructPlan {
            class_name: class_name.to_string(),
            constructor: constructor.function,
            args,
            post_copies,
        }),
        param_for_property,
    })
}

fn not_readable(class_name: &str, parameter: &str) -> String {
    format!(
        "Cannot create copy of type [{class_name}]. Constructor contains argument [{parameter}] that is not a readable property"
    )
}
