//! Process-wide registry of annotation default values.
//!
//! Defaults are keyed by annotation type name and registered at most once:
//! many artifacts may carry defaults for the same annotation, but only the
//! first registration sticks.

use dashmap::DashMap;

use crate::value::AnnotationValue;

/// Concurrent annotation-defaults registry.
#[derive(Debug, Default)]
pub struct AnnotationDefaultsRegistry {
    defaults: DashMap<String, Vec<(String, AnnotationValue)>>,
}

impl AnnotationDefaultsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register defaults for an annotation type.
    ///
    /// Returns true when this call installed them; false when the annotation
    /// already had defaults, which are kept unchanged.
    pub fn register_once(
        &self,
        annotation: impl Into<String>,
        values: Vec<(String, AnnotationValue)>,
    ) -> bool {
        match self.defaults.entry(annotation.into()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(values);
                true
            }
        }
    }

    /// Get the default value of one attribute
    pub fn default_value(&self, annotation: &str, attribute: &str) -> Option<AnnotationValue> {
        self.defaults.get(annotation).and_then(|values| {
            values
                .iter()
                .find(|(name, _)| name == attribute)
                .map(|(_, value)| value.clone())
        })
    }

    /// True when defaults are registered for the annotation
    pub fn has_defaults(&self, annotation: &str) -> bool {
        self.defaults.contains_key(annotation)
    }

    /// Number of annotation types with registered defaults
    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_registration_wins() {
        let registry = AnnotationDefaultsRegistry::new();
        assert!(registry.register_once(
            "optic.Id",
            vec![("value".to_string(), AnnotationValue::string("first"))],
        ));
        assert!(!registry.register_once(
            "optic.Id",
            vec![("value".to_string(), AnnotationValue::string("second"))],
        ));
        assert_eq!(
            registry.default_value("optic.Id", "value"),
            Some(AnnotationValue::string("first"))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_defaults() {
        let registry = AnnotationDefaultsRegistry::new();
        assert!(!registry.has_defaults("optic.Id"));
        assert_eq!(registry.default_value("optic.Id", "value"), None);
    }
}
