//! Annotation attribute values.
//!
//! Every value that can appear in an annotation attribute is one of a small
//! closed set of variants. Decoding an unrecognized variant tag is a hard
//! error, never a silent fallthrough.

use crate::artifact::{ArtifactReader, ArtifactWriter, ClassValuePool, DecodeError};

/// A reference to a class by name.
///
/// Class references are kept as names and resolved lazily so that reading an
/// artifact never forces the referenced type to be loaded. Within one artifact
/// all class values are pooled and referenced by index.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassValue {
    /// Fully qualified class name
    pub name: String,
}

impl ClassValue {
    /// Create a class value for the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A deferred expression embedded in an annotation attribute.
///
/// The expression is compiled separately; the metadata only carries the name
/// of the compiled expression class, resolved against a runtime context.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionRef {
    /// Name of the compiled expression class
    pub expression_class: String,
}

impl ExpressionRef {
    /// Create an expression reference
    pub fn new(expression_class: impl Into<String>) -> Self {
        Self {
            expression_class: expression_class.into(),
        }
    }
}

/// An annotation used as an attribute value of another annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedAnnotation {
    /// The annotation name
    pub annotation: String,
    /// Attribute values in declaration order
    pub values: Vec<(String, AnnotationValue)>,
}

/// An annotation attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// Boolean constant
    Bool(bool),
    /// Integer constant
    Int(i64),
    /// Floating point constant
    Double(f64),
    /// String constant
    Str(String),
    /// The name of an enum constant
    EnumName(String),
    /// A class reference (resolved lazily by name)
    Class(ClassValue),
    /// A nested annotation
    Annotation(Box<NestedAnnotation>),
    /// An array of values
    Array(Vec<AnnotationValue>),
    /// A deferred evaluated expression
    Expression(ExpressionRef),
}

// Variant tags used by the binary encoding.
const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_DOUBLE: u8 = 2;
const TAG_STR: u8 = 3;
const TAG_ENUM: u8 = 4;
const TAG_CLASS: u8 = 5;
const TAG_ANNOTATION: u8 = 6;
const TAG_ARRAY: u8 = 7;
const TAG_EXPRESSION: u8 = 8;

impl AnnotationValue {
    /// Convenience constructor for string values
    pub fn string(value: impl Into<String>) -> Self {
        AnnotationValue::Str(value.into())
    }

    /// Get the value as a string slice, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Encode the value into a writer, interning class names into the pool
    pub(crate) fn encode(&self, writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
        match self {
            AnnotationValue::Bool(b) => {
                writer.emit_u8(TAG_BOOL);
                writer.emit_u8(u8::from(*b));
            }
            AnnotationValue::Int(i) => {
                writer.emit_u8(TAG_INT);
                writer.emit_i64(*i);
            }
            AnnotationValue::Double(d) => {
                writer.emit_u8(TAG_DOUBLE);
                writer.emit_u64(d.to_bits());
            }
            AnnotationValue::Str(s) => {
                writer.emit_u8(TAG_STR);
                writer.emit_string(s);
            }
            AnnotationValue::EnumName(s) => {
                writer.emit_u8(TAG_ENUM);
                writer.emit_string(s);
            }
            AnnotationValue::Class(class_value) => {
                writer.emit_u8(TAG_CLASS);
                writer.emit_u32(pool.intern(&class_value.name));
            }
            AnnotationValue::Annotation(nested) => {
                writer.emit_u8(TAG_ANNOTATION);
                writer.emit_string(&nested.annotation);
                writer.emit_u32(nested.values.len() as u32);
                for (attribute, value) in &nested.values {
                    writer.emit_string(attribute);
                    value.encode(writer, pool);
                }
            }
            AnnotationValue::Array(values) => {
                writer.emit_u8(TAG_ARRAY);
                writer.emit_u32(values.len() as u32);
                for value in values {
                    value.encode(writer, pool);
                }
            }
            AnnotationValue::Expression(expr) => {
                writer.emit_u8(TAG_EXPRESSION);
                writer.emit_string(&expr.expression_class);
            }
        }
    }

    /// Decode a value, resolving class references through the pool
    pub(crate) fn decode(
        reader: &mut ArtifactReader<'_>,
        pool: &ClassValuePool,
    ) -> Result<Self, DecodeError> {
        let offset = reader.offset();
        let tag = reader.read_u8()?;
        match tag {
            TAG_BOOL => Ok(AnnotationValue::Bool(reader.read_u8()? != 0)),
            TAG_INT => Ok(AnnotationValue::Int(reader.read_i64()?)),
            TAG_DOUBLE => Ok(AnnotationValue::Double(f64::from_bits(reader.read_u64()?))),
            TAG_STR => Ok(AnnotationValue::Str(reader.read_string()?)),
            TAG_ENUM => Ok(AnnotationValue::EnumName(reader.read_string()?)),
            TAG_CLASS => {
                let index = reader.read_u32()?;
                let name = pool.resolve(index, offset)?;
                Ok(AnnotationValue::Class(ClassValue::new(name)))
            }
            TAG_ANNOTATION => {
                let annotation = reader.read_string()?;
                let count = reader.read_u32()? as usize;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    let attribute = reader.read_string()?;
                    let value = AnnotationValue::decode(reader, pool)?;
                    values.push((attribute, value));
                }
                Ok(AnnotationValue::Annotation(Box::new(NestedAnnotation {
                    annotation,
                    values,
                })))
            }
            TAG_ARRAY => {
                let count = reader.read_u32()? as usize;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(AnnotationValue::decode(reader, pool)?);
                }
                Ok(AnnotationValue::Array(values))
            }
            TAG_EXPRESSION => Ok(AnnotationValue::Expression(ExpressionRef::new(
                reader.read_string()?,
            ))),
            other => Err(DecodeError::UnknownTag {
                tag: other,
                what: "annotation value",
                offset,
            }),
        }
    }
}
