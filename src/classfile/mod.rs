//! Minimal JVM class-file codec.
//!
//! Only the parts a symbol remapper needs are decoded: the constant pool,
//! the class header, field and method declarations, and the attributes that
//! carry names or descriptors. Everything else (bytecode, stack map frames,
//! bootstrap methods, ...) is kept as raw bytes. Constant pool indices are
//! stable: entries are appended, never renumbered, so raw bytes that refer to
//! the pool stay valid after a rewrite.

pub mod attribute;
pub mod constant_pool;
pub mod descriptor;
pub mod mutf8;
pub mod node;
pub mod reader;
pub mod writer;

pub use attribute::{Annotation, Attribute, AttributeInfo, ElementValue, TypeAnnotation};
pub use constant_pool::{Constant, ConstantPool};
pub use node::ClassNode;
pub use reader::{ClassHeader, ClassReader, ClassSink, ClassVisitor, MemberInfo};
pub use writer::ClassWriter;

use crate::error::{Error, Result};

pub const MAGIC: u32 = 0xCAFE_BABE;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;

        const VISIBILITY = Self::PUBLIC.bits() | Self::PRIVATE.bits() | Self::PROTECTED.bits();
    }
}

bitflags::bitflags! {
    /// Options for decoding a class.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReaderFlags: u8 {
        /// Drop `SourceFile`, `SourceDebugExtension`, `LineNumberTable`,
        /// `LocalVariableTable` and `LocalVariableTypeTable`.
        const SKIP_DEBUG = 0b0000_0001;
        /// Frames are always handed over verbatim, which already satisfies
        /// stages that ask for expanded frames.
        const EXPAND_FRAMES = 0b0000_0010;
    }
}

bitflags::bitflags! {
    /// Requests to the writer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WriterFlags: u8 {
        const COMPUTE_MAXS = 0b0000_0001;
        const COMPUTE_FRAMES = 0b0000_0010;
    }
}

/// Big-endian cursor over class bytes.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                Error::class_format(format!(
                    "truncated class data: wanted {len} bytes at offset {}",
                    self.pos
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }
}

pub(crate) fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn checked_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::unsupported(format!("too many {what}: {len}")))
}

pub(crate) fn checked_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::unsupported(format!("{what} too large: {len}")))
}
