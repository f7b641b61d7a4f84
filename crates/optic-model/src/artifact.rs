//! Binary introspection artifact format (.optb).
//!
//! One artifact per introspected class. The layout is a fixed header
//! (magic + version + flags + crc32 + sha256), a class-value pool, and the
//! body tables: metadata, constructor, properties, methods, enum constants,
//! annotation indexes, and the dispatch table. Both checksums cover
//! everything after the header.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::dispatch::{self, DispatchOp};
use crate::introspection::{
    AnnotationIndex, ConstructorRef, EnumConstantRef, MethodRef, PropertyRef,
};
use crate::metadata::AnnotationMetadata;

/// Magic bytes identifying an introspection artifact
pub const MAGIC: [u8; 4] = *b"OPTB";

/// Current format version
pub const VERSION: u32 = 1;

/// Header length: magic + version + flags + crc32 + sha256
const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 32;

/// Artifact flags
pub mod flags {
    /// The introspected class is an enum
    pub const IS_ENUM: u32 = 1 << 0;
}

/// Error while decoding artifact bytes.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// Ran past the end of the buffer
    #[error("Unexpected end of data: needed {needed} bytes at offset {offset}")]
    UnexpectedEof {
        /// Bytes needed
        needed: usize,
        /// Offset of the read
        offset: usize,
    },

    /// A length-prefixed string was not valid UTF-8
    #[error("Invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the string data
        offset: usize,
    },

    /// Unrecognized variant tag
    #[error("Unknown {what} tag {tag:#x} at offset {offset}")]
    UnknownTag {
        /// The tag byte
        tag: u8,
        /// What was being decoded
        what: &'static str,
        /// Offset of the tag
        offset: usize,
    },

    /// Class-value pool reference out of range
    #[error("Invalid class pool reference: index {index} at offset {offset}")]
    InvalidClassRef {
        /// The pool index
        index: u32,
        /// Offset of the reference
        offset: usize,
    },
}

/// Error while reading a whole artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected OPTB, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Calculated checksum
        actual: u32,
    },
}

/// Little-endian byte writer for artifact encoding.
#[derive(Debug, Default)]
pub struct ArtifactWriter {
    buffer: Vec<u8>,
}

impl ArtifactWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write offset
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Emit a single byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a u16
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a u32
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a u64
    pub fn emit_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit an i32
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit an i64
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit raw bytes
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Emit a length-prefixed UTF-8 string
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Emit a count-prefixed list of strings
    pub fn emit_string_list(&mut self, values: &[String]) {
        self.emit_u32(values.len() as u32);
        for value in values {
            self.emit_string(value);
        }
    }

    /// Overwrite a u32 written earlier at `offset`
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrite bytes written earlier at `offset`
    pub fn patch_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Borrow the bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and take the buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Little-endian byte reader over artifact data.
#[derive(Debug)]
pub struct ArtifactReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ArtifactReader<'a> {
    /// Create a reader over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current read offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Read `count` raw bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        if self.offset + count > self.data.len() {
            return Err(DecodeError::UnexpectedEof {
                needed: count,
                offset: self.offset,
            });
        }
        let bytes = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(bytes)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a u16
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a u32
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a u64
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read an i32
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_u32()? as i32)
    }

    /// Read an i64
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_u64()? as i64)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let offset = self.offset;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    /// Read a count-prefixed list of strings
    pub fn read_string_list(&mut self) -> Result<Vec<String>, DecodeError> {
        let count = self.read_u32()? as usize;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_string()?);
        }
        Ok(values)
    }
}

/// Interned class names referenced by index throughout one artifact.
///
/// Class values recur (the introspected type, attribute classes, metadata
/// references), so the body stores pool indexes and the pool is written once
/// after the header.
#[derive(Debug, Default)]
pub struct ClassValuePool {
    names: Vec<String>,
    index: FxHashMap<String, u32>,
}

impl ClassValuePool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a class name, returning its pool index
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(index) = self.index.get(name) {
            return *index;
        }
        let index = self.names.len() as u32;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), index);
        index
    }

    /// Resolve a pool index read at `offset` back to a class name
    pub fn resolve(&self, index: u32, offset: usize) -> Result<String, DecodeError> {
        self.names
            .get(index as usize)
            .cloned()
            .ok_or(DecodeError::InvalidClassRef { index, offset })
    }

    /// Number of interned names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nothing is interned
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn encode(&self, writer: &mut ArtifactWriter) {
        writer.emit_string_list(&self.names);
    }

    fn decode(reader: &mut ArtifactReader<'_>) -> Result<Self, DecodeError> {
        let names = reader.read_string_list()?;
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as u32))
            .collect();
        Ok(Self { names, index })
    }
}

/// The complete serialized description of one introspected class.
#[derive(Debug)]
pub struct IntrospectionArtifact {
    /// Fully qualified name of the introspected class
    pub class_name: String,
    /// Artifact flags (see [`flags`])
    pub flags: u32,
    /// Class-level annotation metadata
    pub metadata: AnnotationMetadata,
    /// The designated instantiating constructor, if the class has an
    /// accessible one
    pub constructor: Option<ConstructorRef>,
    /// Registry id of a no-argument constructor, emitted alongside the
    /// designated constructor when both exist
    pub default_constructor: Option<usize>,
    /// Property descriptors in compilation order
    pub properties: Vec<PropertyRef>,
    /// Bean method descriptors in compilation order
    pub methods: Vec<MethodRef>,
    /// Enum constants when [`flags::IS_ENUM`] is set
    pub enum_constants: Vec<EnumConstantRef>,
    /// Annotation index tables
    pub indexes: Vec<AnnotationIndex>,
    /// Dispatch table operations, densely indexed
    pub dispatch: Vec<DispatchOp>,
}

impl IntrospectionArtifact {
    /// Encode the artifact to binary format (.optb)
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + crc32 (u32) + checksum (32 bytes SHA-256)
    /// - Class-value pool
    /// - Class name + metadata
    /// - Constructor
    /// - Property table
    /// - Method table
    /// - Enum constant table
    /// - Annotation indexes
    /// - Dispatch table
    pub fn encode(&self) -> Vec<u8> {
        use sha2::{Digest, Sha256};

        // The body is written first so the pool is complete before it is
        // emitted ahead of the body.
        let mut pool = ClassValuePool::new();
        let mut body = ArtifactWriter::new();
        body.emit_u32(pool.intern(&self.class_name));
        self.metadata.encode(&mut body, &mut pool);

        match &self.constructor {
            None => body.emit_u8(0),
            Some(constructor) => {
                body.emit_u8(1);
                constructor.encode(&mut body, &mut pool);
            }
        }
        match self.default_constructor {
            None => body.emit_u8(0),
            Some(function) => {
                body.emit_u8(1);
                body.emit_u32(function as u32);
            }
        }

        body.emit_u32(self.properties.len() as u32);
        for property in &self.properties {
            property.encode(&mut body, &mut pool);
        }

        body.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(&mut body, &mut pool);
        }

        body.emit_u32(self.enum_constants.len() as u32);
        for constant in &self.enum_constants {
            constant.encode(&mut body, &mut pool);
        }

        body.emit_u32(self.indexes.len() as u32);
        for index in &self.indexes {
            index.encode(&mut body);
        }

        dispatch::encode_ops(&self.dispatch, &mut body, &mut pool);

        let mut writer = ArtifactWriter::new();
        writer.emit_bytes(&MAGIC);
        writer.emit_u32(VERSION);
        writer.emit_u32(self.flags);
        let crc32_offset = writer.offset();
        writer.emit_u32(0); // Placeholder for CRC32
        let sha256_offset = writer.offset();
        writer.emit_bytes(&[0u8; 32]); // Placeholder for SHA-256

        pool.encode(&mut writer);
        writer.emit_bytes(body.as_bytes());

        // Checksums cover everything after the header
        let payload = writer.as_bytes()[HEADER_LEN..].to_vec();
        let crc32 = crc32fast::hash(&payload);
        let hash: [u8; 32] = Sha256::digest(&payload).into();
        writer.patch_u32(crc32_offset, crc32);
        writer.patch_bytes(sha256_offset, &hash);

        writer.into_bytes()
    }

    /// Decode an artifact from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ArtifactError> {
        use sha2::{Digest, Sha256};

        let mut reader = ArtifactReader::new(data);

        let magic = reader.read_bytes(4)?;
        let magic: [u8; 4] = [magic[0], magic[1], magic[2], magic[3]];
        if magic != MAGIC {
            return Err(ArtifactError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ArtifactError::UnsupportedVersion(version));
        }

        let artifact_flags = reader.read_u32()?;
        let stored_crc32 = reader.read_u32()?;
        let stored_sha256 = reader.read_bytes(32)?.to_vec();

        let payload = &data[HEADER_LEN..];
        let calculated_crc32 = crc32fast::hash(payload);
        if stored_crc32 != calculated_crc32 {
            return Err(ArtifactError::ChecksumMismatch {
                expected: stored_crc32,
                actual: calculated_crc32,
            });
        }
        let calculated_sha256 = Sha256::digest(payload);
        if stored_sha256 != calculated_sha256.as_slice() {
            return Err(ArtifactError::ChecksumMismatch {
                expected: stored_crc32,
                actual: calculated_crc32,
            });
        }

        let pool = ClassValuePool::decode(&mut reader)?;

        let name_offset = reader.offset();
        let name_index = reader.read_u32()?;
        let class_name = pool.resolve(name_index, name_offset)?;
        let metadata = AnnotationMetadata::decode(&mut reader, &pool)?;

        let constructor = match reader.read_u8()? {
            0 => None,
            _ => Some(ConstructorRef::decode(&mut reader, &pool)?),
        };
        let default_constructor = match reader.read_u8()? {
            0 => None,
            _ => Some(reader.read_u32()? as usize),
        };

        let property_count = reader.read_u32()? as usize;
        let mut properties = Vec::with_capacity(property_count);
        for _ in 0..property_count {
            properties.push(PropertyRef::decode(&mut reader, &pool)?);
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count);
        for _ in 0..method_count {
            methods.push(MethodRef::decode(&mut reader, &pool)?);
        }

        let constant_count = reader.read_u32()? as usize;
        let mut enum_constants = Vec::with_capacity(constant_count);
        for _ in 0..constant_count {
            enum_constants.push(EnumConstantRef::decode(&mut reader, &pool)?);
        }

        let index_count = reader.read_u32()? as usize;
        let mut indexes = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            indexes.push(AnnotationIndex::decode(&mut reader)?);
        }

        let dispatch = dispatch::decode_ops(&mut reader, &pool)?;

        Ok(Self {
            class_name,
            flags: artifact_flags,
            metadata,
            constructor,
            default_constructor,
            properties,
            methods,
            enum_constants,
            indexes,
            dispatch,
        })
    }
}
