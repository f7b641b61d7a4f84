//! Annotation metadata model.
//!
//! Metadata attached to a program element is one of a small closed set of
//! shapes: an empty marker, a flat table, a reference to a table emitted for
//! another class, or a two-level hierarchy (own + inherited) that can be
//! flattened on demand. Merging is always an explicit function.
//!
//! Tables track four overlapping views of the annotations on an element:
//! declared, declared stereotypes, all stereotypes, and all annotations
//! (the transitive closure), plus an index from stereotype name to the
//! annotations carrying it. Names are kept in insertion order with a map
//! from name to slot for lookups.

use rustc_hash::FxHashMap;

use crate::artifact::{ArtifactReader, ArtifactWriter, ClassValuePool, DecodeError};
use crate::value::AnnotationValue;

/// How long an annotation survives past compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// Present in source descriptions only; stripped before freezing
    Source,
    /// Retained in the emitted artifact
    #[default]
    Runtime,
}

/// Lookup of retention policies by annotation name.
///
/// Annotations without a registered policy default to [`RetentionPolicy::Runtime`].
#[derive(Debug, Default)]
pub struct RetentionLookup {
    policies: FxHashMap<String, RetentionPolicy>,
}

impl RetentionLookup {
    /// Create an empty lookup (everything retained)
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the retention policy for an annotation
    pub fn set(&mut self, annotation: impl Into<String>, policy: RetentionPolicy) {
        self.policies.insert(annotation.into(), policy);
    }

    /// Get the policy for an annotation
    pub fn get(&self, annotation: &str) -> RetentionPolicy {
        self.policies.get(annotation).copied().unwrap_or_default()
    }
}

/// Tie-break policy when both sides of a merge carry a retained value for the
/// same (annotation, attribute) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// The merge direction wins: declared overrides inherited (default contract)
    #[default]
    LastWins,
    /// The previously present value is kept
    FirstWins,
}

type AttributeList = Vec<(String, AnnotationValue)>;

/// A flat annotation table for one program element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationTable {
    /// All annotation names in the transitive closure, insertion order
    all: Vec<String>,
    /// Name to slot in `all`
    all_index: FxHashMap<String, usize>,
    /// Names directly present on the element (subset of `all`)
    declared: Vec<String>,
    /// Stereotype names in the closure (subset of `all`)
    all_stereotypes: Vec<String>,
    /// Stereotypes of directly present annotations (subset of `all_stereotypes`)
    declared_stereotypes: Vec<String>,
    /// Attribute values per annotation name
    attributes: FxHashMap<String, AttributeList>,
    /// Stereotype name to the annotations carrying it, insertion order
    by_stereotype: Vec<(String, Vec<String>)>,
    by_stereotype_index: FxHashMap<String, usize>,
    /// Declared default attribute values per annotation type.
    ///
    /// Contributed by whoever builds the table from annotation definitions;
    /// the emitter registers each annotation's defaults once per artifact.
    default_values: Vec<(String, AttributeList)>,
}

impl AnnotationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn push_name(&mut self, name: &str) {
        if !self.all_index.contains_key(name) {
            self.all_index.insert(name.to_string(), self.all.len());
            self.all.push(name.to_string());
        }
    }

    /// Add an annotation directly present on the element
    pub fn add_declared(&mut self, name: impl Into<String>, values: AttributeList) {
        let name = name.into();
        self.push_name(&name);
        if !self.declared.contains(&name) {
            self.declared.push(name.clone());
        }
        self.attributes.insert(name, values);
    }

    /// Add an annotation present in the closure but not directly declared
    pub fn add_annotation(&mut self, name: impl Into<String>, values: AttributeList) {
        let name = name.into();
        self.push_name(&name);
        self.attributes.entry(name).or_insert(values);
    }

    /// Add a stereotype (meta-annotation) carried by `parent`.
    ///
    /// `declared` marks stereotypes of directly present annotations.
    pub fn add_stereotype(
        &mut self,
        parent: &str,
        name: impl Into<String>,
        values: AttributeList,
        declared: bool,
    ) {
        let name = name.into();
        self.push_name(&name);
        if !self.all_stereotypes.contains(&name) {
            self.all_stereotypes.push(name.clone());
        }
        if declared && !self.declared_stereotypes.contains(&name) {
            self.declared_stereotypes.push(name.clone());
        }
        self.attributes.entry(name.clone()).or_insert(values);
        let slot = match self.by_stereotype_index.get(&name) {
            Some(slot) => *slot,
            None => {
                let slot = self.by_stereotype.len();
                self.by_stereotype_index.insert(name.clone(), slot);
                self.by_stereotype.push((name, Vec::new()));
                slot
            }
        };
        let carriers = &mut self.by_stereotype[slot].1;
        if !carriers.iter().any(|c| c == parent) {
            carriers.push(parent.to_string());
        }
    }

    /// Register default attribute values for an annotation type
    pub fn add_defaults(&mut self, annotation: impl Into<String>, values: AttributeList) {
        let annotation = annotation.into();
        if !self.default_values.iter().any(|(name, _)| *name == annotation) {
            self.default_values.push((annotation, values));
        }
    }

    /// True when no annotations are present at all
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// All annotation names in the closure, insertion order
    pub fn annotation_names(&self) -> &[String] {
        &self.all
    }

    /// Directly declared annotation names
    pub fn declared_names(&self) -> &[String] {
        &self.declared
    }

    /// All stereotype names in the closure
    pub fn stereotype_names(&self) -> &[String] {
        &self.all_stereotypes
    }

    /// Stereotypes of directly declared annotations
    pub fn declared_stereotype_names(&self) -> &[String] {
        &self.declared_stereotypes
    }

    /// True when the annotation is in the closure
    pub fn has_annotation(&self, name: &str) -> bool {
        self.all_index.contains_key(name)
    }

    /// True when the annotation is directly declared
    pub fn has_declared_annotation(&self, name: &str) -> bool {
        self.declared.iter().any(|n| n == name)
    }

    /// True when the stereotype is carried anywhere in the closure
    pub fn has_stereotype(&self, name: &str) -> bool {
        self.by_stereotype_index.contains_key(name)
    }

    /// Annotations carrying the given stereotype
    pub fn annotations_by_stereotype(&self, stereotype: &str) -> &[String] {
        self.by_stereotype_index
            .get(stereotype)
            .map(|slot| self.by_stereotype[*slot].1.as_slice())
            .unwrap_or(&[])
    }

    /// Attribute values of an annotation
    pub fn values(&self, annotation: &str) -> Option<&[(String, AnnotationValue)]> {
        self.attributes.get(annotation).map(|v| v.as_slice())
    }

    /// One attribute value of an annotation
    pub fn value(&self, annotation: &str, attribute: &str) -> Option<&AnnotationValue> {
        self.attributes.get(annotation).and_then(|values| {
            values
                .iter()
                .find(|(name, _)| name == attribute)
                .map(|(_, value)| value)
        })
    }

    /// One string attribute value of an annotation
    pub fn string_value(&self, annotation: &str, attribute: &str) -> Option<&str> {
        self.value(annotation, attribute).and_then(|v| v.as_str())
    }

    /// Declared default values, one entry per annotation type
    pub fn defaults(&self) -> &[(String, AttributeList)] {
        &self.default_values
    }

    /// True when default values are registered
    pub fn has_defaults(&self) -> bool {
        !self.default_values.is_empty()
    }

    /// Remove and return the default values.
    ///
    /// The emitter pulls member defaults up to the class table so each
    /// annotation type's defaults are carried once per artifact.
    pub fn take_defaults(&mut self) -> Vec<(String, AttributeList)> {
        std::mem::take(&mut self.default_values)
    }

    /// Remove every annotation whose retention does not survive compile time
    fn strip_source_only(&mut self, retention: &RetentionLookup) {
        let stripped: Vec<String> = self
            .all
            .iter()
            .filter(|name| retention.get(name) == RetentionPolicy::Source)
            .cloned()
            .collect();
        if stripped.is_empty() {
            return;
        }
        let keep = |name: &String| !stripped.contains(name);
        self.all.retain(keep);
        self.declared.retain(keep);
        self.all_stereotypes.retain(keep);
        self.declared_stereotypes.retain(keep);
        for name in &stripped {
            self.attributes.remove(name);
            self.by_stereotype_index.remove(name);
            self.default_values.retain(|(n, _)| n != name);
        }
        self.by_stereotype.retain(|(name, _)| keep(name));
        for (_, carriers) in &mut self.by_stereotype {
            carriers.retain(keep);
        }
        // Rebuild the slot maps after compaction
        self.all_index = self
            .all
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        self.by_stereotype_index = self
            .by_stereotype
            .iter()
            .enumerate()
            .map(|(i, (n, _))| (n.clone(), i))
            .collect();
    }

    /// Merge `other` into `self`, `other` winning per `strategy`
    fn merge_from(&mut self, other: &AnnotationTable, strategy: MergeStrategy) {
        for name in &other.all {
            self.push_name(name);
        }
        for name in &other.declared {
            if !self.declared.contains(name) {
                self.declared.push(name.clone());
            }
        }
        for name in &other.all_stereotypes {
            if !self.all_stereotypes.contains(name) {
                self.all_stereotypes.push(name.clone());
            }
        }
        for name in &other.declared_stereotypes {
            if !self.declared_stereotypes.contains(name) {
                self.declared_stereotypes.push(name.clone());
            }
        }
        for (name, values) in &other.attributes {
            match self.attributes.get_mut(name) {
                None => {
                    self.attributes.insert(name.clone(), values.clone());
                }
                Some(existing) => {
                    for (attribute, value) in values {
                        match existing.iter_mut().find(|(a, _)| a == attribute) {
                            None => existing.push((attribute.clone(), value.clone())),
                            Some((_, slot)) => {
                                if strategy == MergeStrategy::LastWins {
                                    *slot = value.clone();
                                }
                            }
                        }
                    }
                }
            }
        }
        for (stereotype, carriers) in &other.by_stereotype {
            for carrier in carriers {
                self.add_stereotype(carrier, stereotype.clone(), Vec::new(), false);
            }
        }
        for (annotation, values) in &other.default_values {
            self.add_defaults(annotation.clone(), values.clone());
        }
    }

    fn encode(&self, writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
        writer.emit_string_list(&self.all);
        writer.emit_string_list(&self.declared);
        writer.emit_string_list(&self.all_stereotypes);
        writer.emit_string_list(&self.declared_stereotypes);
        // Attributes follow `all` order so the encoding is deterministic
        for name in &self.all {
            let values = self.attributes.get(name).map(|v| v.as_slice()).unwrap_or(&[]);
            writer.emit_u32(values.len() as u32);
            for (attribute, value) in values {
                writer.emit_string(attribute);
                value.encode(writer, pool);
            }
        }
        writer.emit_u32(self.by_stereotype.len() as u32);
        for (stereotype, carriers) in &self.by_stereotype {
            writer.emit_string(stereotype);
            writer.emit_string_list(carriers);
        }
        writer.emit_u32(self.default_values.len() as u32);
        for (annotation, values) in &self.default_values {
            writer.emit_string(annotation);
            writer.emit_u32(values.len() as u32);
            for (attribute, value) in values {
                writer.emit_string(attribute);
                value.encode(writer, pool);
            }
        }
    }

    fn decode(reader: &mut ArtifactReader<'_>, pool: &ClassValuePool) -> Result<Self, DecodeError> {
        let all = reader.read_string_list()?;
        let declared = reader.read_string_list()?;
        let all_stereotypes = reader.read_string_list()?;
        let declared_stereotypes = reader.read_string_list()?;
        let mut attributes = FxHashMap::default();
        for name in &all {
            let count = reader.read_u32()? as usize;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let attribute = reader.read_string()?;
                values.push((attribute, AnnotationValue::decode(reader, pool)?));
            }
            attributes.insert(name.clone(), values);
        }
        let stereo_count = reader.read_u32()? as usize;
        let mut by_stereotype = Vec::with_capacity(stereo_count);
        for _ in 0..stereo_count {
            let stereotype = reader.read_string()?;
            let carriers = reader.read_string_list()?;
            by_stereotype.push((stereotype, carriers));
        }
        let defaults_count = reader.read_u32()? as usize;
        let mut default_values = Vec::with_capacity(defaults_count);
        for _ in 0..defaults_count {
            let annotation = reader.read_string()?;
            let count = reader.read_u32()? as usize;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let attribute = reader.read_string()?;
                values.push((attribute, AnnotationValue::decode(reader, pool)?));
            }
            default_values.push((annotation, values));
        }
        let all_index = all
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let by_stereotype_index = by_stereotype
            .iter()
            .enumerate()
            .map(|(i, (n, _)): (usize, &(String, Vec<String>))| (n.clone(), i))
            .collect();
        Ok(Self {
            all,
            all_index,
            declared,
            all_stereotypes,
            declared_stereotypes,
            attributes,
            by_stereotype,
            by_stereotype_index,
            default_values,
        })
    }
}

/// A pointer to a metadata table already emitted for another class.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataReference {
    /// Generated name of the artifact holding the table
    pub class_name: String,
}

/// Two-level metadata: the element's own table plus inherited metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataHierarchy {
    /// Metadata of the element itself
    pub own: AnnotationMetadata,
    /// Metadata inherited from ancestors
    pub inherited: AnnotationMetadata,
}

/// Annotation metadata attached to one program element.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AnnotationMetadata {
    /// No metadata at all
    #[default]
    Empty,
    /// A flat table
    Table(Box<AnnotationTable>),
    /// A reference to a table emitted for another class
    Reference(MetadataReference),
    /// Own + inherited metadata, flattened on demand
    Hierarchy(Box<MetadataHierarchy>),
}

// Shape tags used by the binary encoding.
const TAG_EMPTY: u8 = 0;
const TAG_TABLE: u8 = 1;
const TAG_REFERENCE: u8 = 2;
const TAG_HIERARCHY: u8 = 3;

impl AnnotationMetadata {
    /// Wrap a table, collapsing a table with no entries and no defaults to
    /// `Empty`
    pub fn table(table: AnnotationTable) -> Self {
        if table.is_empty() && !table.has_defaults() {
            AnnotationMetadata::Empty
        } else {
            AnnotationMetadata::Table(Box::new(table))
        }
    }

    /// A lightweight pointer to the table already emitted under `class_name`
    pub fn as_reference(class_name: impl Into<String>) -> Self {
        AnnotationMetadata::Reference(MetadataReference {
            class_name: class_name.into(),
        })
    }

    /// Merge own metadata over inherited metadata.
    ///
    /// When one side is empty the other is returned as-is; otherwise the
    /// result is a hierarchy the consumer can [`flatten`](Self::flatten)
    /// when a single table is needed.
    pub fn merge(own: AnnotationMetadata, inherited: AnnotationMetadata) -> AnnotationMetadata {
        match (own.is_empty(), inherited.is_empty()) {
            (true, true) => AnnotationMetadata::Empty,
            (false, true) => own,
            (true, false) => inherited,
            (false, false) => {
                AnnotationMetadata::Hierarchy(Box::new(MetadataHierarchy { own, inherited }))
            }
        }
    }

    /// True when no declared, stereotype, or inherited entries exist
    pub fn is_empty(&self) -> bool {
        match self {
            AnnotationMetadata::Empty => true,
            AnnotationMetadata::Table(table) => table.is_empty(),
            AnnotationMetadata::Reference(_) => false,
            AnnotationMetadata::Hierarchy(h) => h.own.is_empty() && h.inherited.is_empty(),
        }
    }

    /// Flatten to a single table, own entries overriding inherited per `strategy`.
    ///
    /// References cannot be flattened (their table lives elsewhere) and are
    /// returned unchanged inside a hierarchy.
    pub fn flatten(&self, strategy: MergeStrategy) -> AnnotationMetadata {
        match self {
            AnnotationMetadata::Hierarchy(h) => {
                let own = h.own.flatten(strategy);
                let inherited = h.inherited.flatten(strategy);
                match (own, inherited) {
                    (AnnotationMetadata::Table(own), AnnotationMetadata::Table(inherited)) => {
                        let mut merged = (*inherited).clone();
                        merged.merge_from(&own, strategy);
                        AnnotationMetadata::Table(Box::new(merged))
                    }
                    (own, inherited) => AnnotationMetadata::merge(own, inherited),
                }
            }
            other => other.clone(),
        }
    }

    /// Strip annotations that do not survive past compile time.
    ///
    /// Applied exactly once before freezing a class for emission.
    pub fn strip_source_only(self, retention: &RetentionLookup) -> AnnotationMetadata {
        match self {
            AnnotationMetadata::Table(mut table) => {
                table.strip_source_only(retention);
                AnnotationMetadata::table(*table)
            }
            AnnotationMetadata::Hierarchy(h) => AnnotationMetadata::merge(
                h.own.strip_source_only(retention),
                h.inherited.strip_source_only(retention),
            ),
            other => other,
        }
    }

    /// View as a table, if it is one
    pub fn as_table(&self) -> Option<&AnnotationTable> {
        match self {
            AnnotationMetadata::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Look up one string attribute, searching own before inherited
    pub fn string_value(&self, annotation: &str, attribute: &str) -> Option<&str> {
        match self {
            AnnotationMetadata::Table(table) => table.string_value(annotation, attribute),
            AnnotationMetadata::Hierarchy(h) => h
                .own
                .string_value(annotation, attribute)
                .or_else(|| h.inherited.string_value(annotation, attribute)),
            _ => None,
        }
    }

    /// True when the annotation is in the closure
    pub fn has_annotation(&self, name: &str) -> bool {
        match self {
            AnnotationMetadata::Table(table) => table.has_annotation(name),
            AnnotationMetadata::Hierarchy(h) => {
                h.own.has_annotation(name) || h.inherited.has_annotation(name)
            }
            _ => false,
        }
    }

    /// Remove and return default values from every table in this metadata
    pub fn take_defaults(&mut self) -> Vec<(String, AttributeList)> {
        match self {
            AnnotationMetadata::Table(table) => table.take_defaults(),
            AnnotationMetadata::Hierarchy(h) => {
                let mut defaults = h.own.take_defaults();
                for (annotation, values) in h.inherited.take_defaults() {
                    if !defaults.iter().any(|(name, _)| *name == annotation) {
                        defaults.push((annotation, values));
                    }
                }
                defaults
            }
            _ => Vec::new(),
        }
    }

    /// Declared default values contributed by every table in this metadata
    pub fn defaults(&self) -> Vec<(String, AttributeList)> {
        match self {
            AnnotationMetadata::Table(table) => table.defaults().to_vec(),
            AnnotationMetadata::Hierarchy(h) => {
                let mut defaults = h.own.defaults();
                for (annotation, values) in h.inherited.defaults() {
                    if !defaults.iter().any(|(name, _)| *name == annotation) {
                        defaults.push((annotation, values));
                    }
                }
                defaults
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn encode(&self, writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
        match self {
            AnnotationMetadata::Empty => writer.emit_u8(TAG_EMPTY),
            AnnotationMetadata::Table(table) => {
                writer.emit_u8(TAG_TABLE);
                table.encode(writer, pool);
            }
            AnnotationMetadata::Reference(reference) => {
                writer.emit_u8(TAG_REFERENCE);
                writer.emit_u32(pool.intern(&reference.class_name));
            }
            AnnotationMetadata::Hierarchy(h) => {
                writer.emit_u8(TAG_HIERARCHY);
                h.own.encode(writer, pool);
                h.inherited.encode(writer, pool);
            }
        }
    }

    pub(crate) fn decode(
        reader: &mut ArtifactReader<'_>,
        pool: &ClassValuePool,
    ) -> Result<Self, DecodeError> {
        let offset = reader.offset();
        let tag = reader.read_u8()?;
        match tag {
            TAG_EMPTY => Ok(AnnotationMetadata::Empty),
            TAG_TABLE => Ok(AnnotationMetadata::Table(Box::new(AnnotationTable::decode(
                reader, pool,
            )?))),
            TAG_REFERENCE => {
                let index = reader.read_u32()?;
                Ok(AnnotationMetadata::as_reference(pool.resolve(index, offset)?))
            }
            TAG_HIERARCHY => {
                let own = AnnotationMetadata::decode(reader, pool)?;
                let inherited = AnnotationMetadata::decode(reader, pool)?;
                Ok(AnnotationMetadata::Hierarchy(Box::new(MetadataHierarchy {
                    own,
                    inherited,
                })))
            }
            other => Err(DecodeError::UnknownTag {
                tag: other,
                what: "annotation metadata",
                offset,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(name: &str, attribute: &str, value: AnnotationValue) -> AnnotationTable {
        let mut table = AnnotationTable::new();
        table.add_declared(name, vec![(attribute.to_string(), value)]);
        table
    }

    #[test]
    fn test_declared_is_subset_of_all() {
        let mut table = AnnotationTable::new();
        table.add_declared("optic.Id", Vec::new());
        table.add_annotation("optic.Inherited", Vec::new());
        table.add_stereotype("optic.Id", "optic.Indexed", Vec::new(), true);

        assert_eq!(table.annotation_names().len(), 3);
        assert_eq!(table.declared_names(), &["optic.Id".to_string()]);
        for declared in table.declared_names() {
            assert!(table.has_annotation(declared));
        }
        assert!(table.has_stereotype("optic.Indexed"));
        assert_eq!(
            table.annotations_by_stereotype("optic.Indexed"),
            &["optic.Id".to_string()]
        );
    }

    #[test]
    fn test_merge_empty_sides_flatten() {
        let own = AnnotationMetadata::table(table_with(
            "optic.Id",
            "value",
            AnnotationValue::string("a"),
        ));
        let merged = AnnotationMetadata::merge(own.clone(), AnnotationMetadata::Empty);
        assert_eq!(merged, own);

        let merged = AnnotationMetadata::merge(AnnotationMetadata::Empty, own.clone());
        assert_eq!(merged, own);

        assert!(AnnotationMetadata::merge(AnnotationMetadata::Empty, AnnotationMetadata::Empty)
            .is_empty());
    }

    #[test]
    fn test_hierarchy_flatten_declared_overrides_inherited() {
        let own = AnnotationMetadata::table(table_with(
            "optic.Named",
            "value",
            AnnotationValue::string("own"),
        ));
        let inherited = AnnotationMetadata::table(table_with(
            "optic.Named",
            "value",
            AnnotationValue::string("parent"),
        ));
        let merged = AnnotationMetadata::merge(own, inherited);
        assert!(matches!(merged, AnnotationMetadata::Hierarchy(_)));

        let flat = merged.flatten(MergeStrategy::LastWins);
        assert_eq!(flat.string_value("optic.Named", "value"), Some("own"));

        let flat = merged.flatten(MergeStrategy::FirstWins);
        assert_eq!(flat.string_value("optic.Named", "value"), Some("parent"));
    }

    #[test]
    fn test_strip_source_only() {
        let mut table = AnnotationTable::new();
        table.add_declared("optic.Id", Vec::new());
        table.add_declared("optic.SourceOnly", Vec::new());
        let mut retention = RetentionLookup::new();
        retention.set("optic.SourceOnly", RetentionPolicy::Source);

        let stripped = AnnotationMetadata::table(table).strip_source_only(&retention);
        assert!(stripped.has_annotation("optic.Id"));
        assert!(!stripped.has_annotation("optic.SourceOnly"));
    }

    #[test]
    fn test_table_roundtrip() {
        let mut table = AnnotationTable::new();
        table.add_declared(
            "optic.Id",
            vec![("value".to_string(), AnnotationValue::string("a"))],
        );
        table.add_stereotype("optic.Id", "optic.Indexed", Vec::new(), true);
        table.add_defaults(
            "optic.Id",
            vec![("value".to_string(), AnnotationValue::string(""))],
        );
        let metadata = AnnotationMetadata::table(table);

        let mut pool = ClassValuePool::new();
        let mut writer = ArtifactWriter::new();
        metadata.encode(&mut writer, &mut pool);
        let bytes = writer.into_bytes();
        let mut reader = ArtifactReader::new(&bytes);
        let decoded = AnnotationMetadata::decode(&mut reader, &pool).unwrap();
        assert_eq!(decoded, metadata);
    }

    #[test]
    fn test_reference_roundtrip() {
        let metadata = AnnotationMetadata::as_reference("geom.$Point$Introspection");
        let mut pool = ClassValuePool::new();
        let mut writer = ArtifactWriter::new();
        metadata.encode(&mut writer, &mut pool);
        let bytes = writer.into_bytes();
        let mut reader = ArtifactReader::new(&bytes);
        assert_eq!(
            AnnotationMetadata::decode(&mut reader, &pool).unwrap(),
            metadata
        );
    }
}
