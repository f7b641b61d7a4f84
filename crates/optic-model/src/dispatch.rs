//! Dispatch table operations and their runtime interpretation.
//!
//! A dispatch table is a dense vector of operations; descriptors refer into
//! it by index, with [`NO_DISPATCH`] marking an absent accessor. The set of
//! operations is closed: method invocation, direct field access, a
//! compile-time-decided throw, and copy construction for immutable types.

use std::sync::Arc;

use crate::artifact::{ArtifactReader, ArtifactWriter, ClassValuePool, DecodeError};
use crate::object::{FunctionRegistry, RuntimeError, Value};

/// Index value meaning "no dispatch entry".
pub const NO_DISPATCH: i32 = -1;

/// How to read a property's current value off an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAccessor {
    /// Invoke a getter function
    Method {
        /// Registry id of the getter
        function: usize,
    },
    /// Read a field slot directly
    Field {
        /// Field slot
        slot: usize,
    },
}

impl ReadAccessor {
    fn read(&self, registry: &FunctionRegistry, target: &Value) -> Result<Value, RuntimeError> {
        match self {
            ReadAccessor::Method { function } => registry.invoke(*function, target, &[]),
            ReadAccessor::Field { slot } => target.as_object()?.read().get_field(*slot),
        }
    }

    fn encode(&self, writer: &mut ArtifactWriter) {
        match self {
            ReadAccessor::Method { function } => {
                writer.emit_u8(0);
                writer.emit_u32(*function as u32);
            }
            ReadAccessor::Field { slot } => {
                writer.emit_u8(1);
                writer.emit_u32(*slot as u32);
            }
        }
    }

    fn decode(reader: &mut ArtifactReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.offset();
        match reader.read_u8()? {
            0 => Ok(ReadAccessor::Method {
                function: reader.read_u32()? as usize,
            }),
            1 => Ok(ReadAccessor::Field {
                slot: reader.read_u32()? as usize,
            }),
            tag => Err(DecodeError::UnknownTag {
                tag,
                what: "read accessor",
                offset,
            }),
        }
    }
}

/// How to write a property value onto an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAccessor {
    /// Invoke a setter function
    Method {
        /// Registry id of the setter
        function: usize,
    },
    /// Write a field slot directly
    Field {
        /// Field slot
        slot: usize,
    },
}

impl WriteAccessor {
    fn write(
        &self,
        registry: &FunctionRegistry,
        target: &Value,
        value: &Value,
    ) -> Result<(), RuntimeError> {
        match self {
            WriteAccessor::Method { function } => {
                registry.invoke(*function, target, std::slice::from_ref(value))?;
                Ok(())
            }
            WriteAccessor::Field { slot } => {
                target.as_object()?.write().set_field(*slot, value.clone())
            }
        }
    }

    fn encode(&self, writer: &mut ArtifactWriter) {
        match self {
            WriteAccessor::Method { function } => {
                writer.emit_u8(0);
                writer.emit_u32(*function as u32);
            }
            WriteAccessor::Field { slot } => {
                writer.emit_u8(1);
                writer.emit_u32(*slot as u32);
            }
        }
    }

    fn decode(reader: &mut ArtifactReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.offset();
        match reader.read_u8()? {
            0 => Ok(WriteAccessor::Method {
                function: reader.read_u32()? as usize,
            }),
            1 => Ok(WriteAccessor::Field {
                slot: reader.read_u32()? as usize,
            }),
            tag => Err(DecodeError::UnknownTag {
                tag,
                what: "write accessor",
                offset,
            }),
        }
    }
}

/// A property copied from the old instance to the new one after copy
/// construction, for writable properties not covered by a constructor
/// argument.
#[derive(Debug, Clone, PartialEq)]
pub struct PostCopy {
    /// How to read the value off the old instance
    pub read: ReadAccessor,
    /// How to write it onto the new instance
    pub write: WriteAccessor,
}

/// The bound recipe for rebuilding an immutable instance through its
/// constructor. One plan is shared by every copy-construct entry of a class;
/// each entry selects which constructor argument it substitutes.
#[derive(Debug, PartialEq)]
pub struct CopyConstructPlan {
    /// Fully qualified name of the constructed class
    pub class_name: String,
    /// Registry id of the constructor
    pub constructor: usize,
    /// Per constructor argument, how to read its current value
    pub args: Vec<ReadAccessor>,
    /// Writable properties carried over after construction
    pub post_copies: Vec<PostCopy>,
}

impl CopyConstructPlan {
    fn encode(&self, writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
        writer.emit_u32(pool.intern(&self.class_name));
        writer.emit_u32(self.constructor as u32);
        writer.emit_u32(self.args.len() as u32);
        for arg in &self.args {
            arg.encode(writer);
        }
        writer.emit_u32(self.post_copies.len() as u32);
        for copy in &self.post_copies {
            copy.read.encode(writer);
            copy.write.encode(writer);
        }
    }

    fn decode(reader: &mut ArtifactReader<'_>, pool: &ClassValuePool) -> Result<Self, DecodeError> {
        let offset = reader.offset();
        let class_name = pool.resolve(reader.read_u32()?, offset)?;
        let constructor = reader.read_u32()? as usize;
        let arg_count = reader.read_u32()? as usize;
        let mut args = Vec::with_capacity(arg_count);
        for _ in 0..arg_count {
            args.push(ReadAccessor::decode(reader)?);
        }
        let copy_count = reader.read_u32()? as usize;
        let mut post_copies = Vec::with_capacity(copy_count);
        for _ in 0..copy_count {
            let read = ReadAccessor::decode(reader)?;
            let write = WriteAccessor::decode(reader)?;
            post_copies.push(PostCopy { read, write });
        }
        Ok(Self {
            class_name,
            constructor,
            args,
            post_copies,
        })
    }
}

/// One dispatch table operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOp {
    /// Invoke a registered function on the target
    InvokeMethod {
        /// Registry id
        function: usize,
        /// Number of arguments the method takes
        arity: usize,
        /// True when the method returns nothing useful
        void: bool,
    },
    /// Read a field slot off the target
    GetField {
        /// Field slot
        slot: usize,
    },
    /// Write a field slot on the target
    SetField {
        /// Field slot
        slot: usize,
    },
    /// Fail with a message decided at compile time
    Throw {
        /// The failure message
        message: String,
    },
    /// Rebuild the target through its constructor, substituting one argument
    CopyConstruct {
        /// The shared construction plan
        plan: Arc<CopyConstructPlan>,
        /// Position of the constructor argument this entry replaces
        param: usize,
    },
}

// Operation tags used by the binary encoding.
const TAG_INVOKE: u8 = 0;
const TAG_GET_FIELD: u8 = 1;
const TAG_SET_FIELD: u8 = 2;
const TAG_THROW: u8 = 3;
const TAG_COPY_CONSTRUCT: u8 = 4;

/// A dense dispatch table interpreted against a function registry.
#[derive(Debug, Default)]
pub struct DispatchTable {
    ops: Vec<DispatchOp>,
}

impl DispatchTable {
    /// Create a table over the given operations
    pub fn new(ops: Vec<DispatchOp>) -> Self {
        Self { ops }
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when the table is empty
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The operations, in index order
    pub fn ops(&self) -> &[DispatchOp] {
        &self.ops
    }

    /// Dispatch an entry that takes at most one argument.
    ///
    /// Panics if `index` is out of range: descriptors and table are emitted
    /// together, so a bad index is a corrupt artifact, not a caller error.
    pub fn dispatch_one(
        &self,
        registry: &FunctionRegistry,
        index: u32,
        target: &Value,
        value: Option<&Value>,
    ) -> Result<Value, RuntimeError> {
        let args = match value {
            Some(value) => std::slice::from_ref(value),
            None => &[],
        };
        self.dispatch_multi(registry, index, target, args)
    }

    /// Dispatch an entry with an argument list.
    pub fn dispatch_multi(
        &self,
        registry: &FunctionRegistry,
        index: u32,
        target: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let Some(op) = self.ops.get(index as usize) else {
            panic!("unknown dispatch at index {index}");
        };
        match op {
            DispatchOp::InvokeMethod { function, void, .. } => {
                let result = registry.invoke(*function, target, args)?;
                Ok(if *void { Value::Null } else { result })
            }
            DispatchOp::GetField { slot } => target.as_object()?.read().get_field(*slot),
            DispatchOp::SetField { slot } => {
                let value = args.first().cloned().unwrap_or_default();
                target.as_object()?.write().set_field(*slot, value)?;
                Ok(Value::Null)
            }
            DispatchOp::Throw { message } => {
                Err(RuntimeError::UnsupportedOperation(message.clone()))
            }
            DispatchOp::CopyConstruct { plan, param } => {
                let value = args.first().cloned().unwrap_or_default();
                copy_construct(registry, plan, *param, target, value)
            }
        }
    }
}

/// Rebuild `target` through the plan's constructor with the argument at
/// `param` replaced by `value`, then carry writable properties over.
fn copy_construct(
    registry: &FunctionRegistry,
    plan: &CopyConstructPlan,
    param: usize,
    target: &Value,
    value: Value,
) -> Result<Value, RuntimeError> {
    let mut ctor_args = Vec::with_capacity(plan.args.len());
    for (position, accessor) in plan.args.iter().enumerate() {
        if position == param {
            ctor_args.push(value.clone());
        } else {
            ctor_args.push(accessor.read(registry, target)?);
        }
    }
    let copy = registry.invoke(plan.constructor, &Value::Null, &ctor_args)?;
    for post in &plan.post_copies {
        let carried = post.read.read(registry, target)?;
        post.write.write(registry, &copy, &carried)?;
    }
    Ok(copy)
}

/// Encode a dispatch op vector, writing shared plans once.
pub(crate) fn encode_ops(ops: &[DispatchOp], writer: &mut ArtifactWriter, pool: &mut ClassValuePool) {
    let mut plans: Vec<Arc<CopyConstructPlan>> = Vec::new();
    for op in ops {
        if let DispatchOp::CopyConstruct { plan, .. } = op {
            if !plans.iter().any(|p| Arc::ptr_eq(p, plan)) {
                plans.push(plan.clone());
            }
        }
    }
    writer.emit_u32(plans.len() as u32);
    for plan in &plans {
        plan.encode(writer, pool);
    }

    writer.emit_u32(ops.len() as u32);
    for op in ops {
        match op {
            DispatchOp::InvokeMethod {
                function,
                arity,
                void,
            } => {
                writer.emit_u8(TAG_INVOKE);
                writer.emit_u32(*function as u32);
                writer.emit_u32(*arity as u32);
                writer.emit_u8(u8::from(*void));
            }
            DispatchOp::GetField { slot } => {
                writer.emit_u8(TAG_GET_FIELD);
                writer.emit_u32(*slot as u32);
            }
            DispatchOp::SetField { slot } => {
                writer.emit_u8(TAG_SET_FIELD);
                writer.emit_u32(*slot as u32);
            }
            DispatchOp::Throw { message } => {
                writer.emit_u8(TAG_THROW);
                writer.emit_string(message);
            }
            DispatchOp::CopyConstruct { plan, param } => {
                writer.emit_u8(TAG_COPY_CONSTRUCT);
                let plan_index = plans
                    .iter()
                    .position(|p| Arc::ptr_eq(p, plan))
                    .unwrap_or_default();
                writer.emit_u32(plan_index as u32);
                writer.emit_u32(*param as u32);
            }
        }
    }
}

/// Decode a dispatch op vector, resharing plans by table index.
pub(crate) fn decode_ops(
    reader: &mut ArtifactReader<'_>,
    pool: &ClassValuePool,
) -> Result<Vec<DispatchOp>, DecodeError> {
    let plan_count = reader.read_u32()? as usize;
    let mut plans = Vec::with_capacity(plan_count);
    for _ in 0..plan_count {
        plans.push(Arc::new(CopyConstructPlan::decode(reader, pool)?));
    }

    let op_count = reader.read_u32()? as usize;
    let mut ops = Vec::with_capacity(op_count);
    for _ in 0..op_count {
        let offset = reader.offset();
        let tag = reader.read_u8()?;
        let op = match tag {
            TAG_INVOKE => DispatchOp::InvokeMethod {
                function: reader.read_u32()? as usize,
                arity: reader.read_u32()? as usize,
                void: reader.read_u8()? != 0,
            },
            TAG_GET_FIELD => DispatchOp::GetField {
                slot: reader.read_u32()? as usize,
            },
            TAG_SET_FIELD => DispatchOp::SetField {
                slot: reader.read_u32()? as usize,
            },
            TAG_THROW => DispatchOp::Throw {
                message: reader.read_string()?,
            },
            TAG_COPY_CONSTRUCT => {
                let plan_offset = reader.offset();
                let plan_index = reader.read_u32()? as usize;
                let param = reader.read_u32()? as usize;
                let plan = plans.get(plan_index).cloned().ok_or({
                    DecodeError::UnknownTag {
                        tag: plan_index as u8,
                        what: "copy construct plan",
                        offset: plan_offset,
                    }
                })?;
                DispatchOp::CopyConstruct { plan, param }
            }
            tag => {
                return Err(DecodeError::UnknownTag {
                    tag,
                    what: "dispatch op",
                    offset,
                })
            }
        };
        ops.push(op);
    }
    Ok(ops)
}
