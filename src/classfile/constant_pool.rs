use std::collections::HashMap;

use super::{ByteReader, mutf8, put_u16, put_u32};
use crate::error::{Error, Result};

const CONSTANT_UTF8: u8 = 1;
const CONSTANT_INTEGER: u8 = 3;
const CONSTANT_FLOAT: u8 = 4;
const CONSTANT_LONG: u8 = 5;
const CONSTANT_DOUBLE: u8 = 6;
const CONSTANT_CLASS: u8 = 7;
const CONSTANT_STRING: u8 = 8;
const CONSTANT_FIELDREF: u8 = 9;
const CONSTANT_METHODREF: u8 = 10;
const CONSTANT_INTERFACEMETHODREF: u8 = 11;
const CONSTANT_NAMEANDTYPE: u8 = 12;
const CONSTANT_METHODHANDLE: u8 = 15;
const CONSTANT_METHODTYPE: u8 = 16;
const CONSTANT_DYNAMIC: u8 = 17;
const CONSTANT_INVOKEDYNAMIC: u8 = 18;
const CONSTANT_MODULE: u8 = 19;
const CONSTANT_PACKAGE: u8 = 20;

/// A constant pool entry. `Utf8` keeps the raw modified UTF-8 bytes so
/// untouched strings are written back exactly as read; floating point values
/// are kept as bit patterns for the same reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
    /// Slot 0 and the second slot taken by a long or double.
    Unusable,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

/// Pools are equal when their slots are; the lookup index is derived.
impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ConstantPool {}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            lookup: HashMap::new(),
        }
    }

    pub(crate) fn parse(reader: &mut ByteReader<'_>) -> Result<Self> {
        let count = reader.u16()?;
        if count == 0 {
            return Err(Error::class_format("constant pool count is zero"));
        }

        let mut pool = Self::new();
        pool.entries.reserve(usize::from(count));
        while pool.entries.len() < usize::from(count) {
            let constant = read_constant(reader)?;
            let wide = constant.is_wide();
            let index = pool.entries.len() as u16;
            pool.lookup.entry(constant.clone()).or_insert(index);
            pool.entries.push(constant);
            if wide {
                pool.entries.push(Constant::Unusable);
            }
        }

        if pool.entries.len() != usize::from(count) {
            return Err(Error::class_format(
                "wide constant overruns the constant pool",
            ));
        }
        Ok(pool)
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u16(out, self.count());
        for constant in self.entries.iter().skip(1) {
            write_constant(out, constant)?;
        }
        Ok(())
    }

    /// The `constant_pool_count` field: number of slots including slot 0.
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(Error::class_format(format!(
                "invalid constant pool index {index}"
            ))),
            Some(constant) => Ok(constant),
        }
    }

    /// Replaces the entry at `index`. The slot must already hold an entry of
    /// the same width.
    pub fn set(&mut self, index: u16, constant: Constant) -> Result<()> {
        let current = self.get(index)?;
        if current.is_wide() != constant.is_wide() {
            return Err(Error::unsupported(format!(
                "cannot change the width of constant {index}"
            )));
        }
        let previous = std::mem::replace(&mut self.entries[usize::from(index)], constant.clone());
        if self.lookup.get(&previous) == Some(&index) {
            self.lookup.remove(&previous);
        }
        self.lookup.entry(constant).or_insert(index);
        Ok(())
    }

    pub fn push(&mut self, constant: Constant) -> Result<u16> {
        let needed = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + needed > usize::from(u16::MAX) {
            return Err(Error::unsupported("constant pool overflow"));
        }
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.lookup.insert(constant.clone(), index);
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    /// Returns the index of an equal entry, appending one if none exists.
    pub fn intern(&mut self, constant: Constant) -> Result<u16> {
        if let Some(index) = self.lookup.get(&constant) {
            return Ok(*index);
        }
        self.push(constant)
    }

    pub fn intern_utf8(&mut self, value: &str) -> Result<u16> {
        self.intern(Constant::Utf8(mutf8::encode(value)))
    }

    pub fn intern_class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.intern_utf8(internal_name)?;
        self.intern(Constant::Class(name))
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    pub fn intern_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    pub fn intern_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::MethodRef {
            class,
            name_and_type,
        })
    }

    pub fn utf8(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Utf8(bytes) => mutf8::decode(bytes),
            other => Err(unexpected(index, "Utf8", other)),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(unexpected(index, "Class", other)),
        }
    }

    /// Like [`class_name`](Self::class_name) but treats index 0 as absent,
    /// as used by `super_class` and `InnerClasses.outer_class_info_index`.
    pub fn optional_class_name(&self, index: u16) -> Result<Option<String>> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(Some)
    }

    pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(unexpected(index, "NameAndType", other)),
        }
    }

    /// Owner, name and descriptor of a field, method or interface method ref.
    pub fn member_ref(&self, index: u16) -> Result<(String, String, String)> {
        match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                let owner = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((owner, name, descriptor))
            }
            other => Err(unexpected(index, "member ref", other)),
        }
    }

    /// Indices of all usable slots, in pool order.
    pub fn indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, _)| i as u16)
    }
}

fn unexpected(index: u16, wanted: &str, found: &Constant) -> Error {
    Error::class_format(format!(
        "constant {index}: expected {wanted}, found {found:?}"
    ))
}

fn read_constant(reader: &mut ByteReader<'_>) -> Result<Constant> {
    let tag = reader.u8()?;
    let constant = match tag {
        CONSTANT_UTF8 => {
            let len = reader.u16()?;
            Constant::Utf8(reader.take(usize::from(len))?.to_vec())
        }
        CONSTANT_INTEGER => Constant::Integer(reader.u32()? as i32),
        CONSTANT_FLOAT => Constant::Float(reader.u32()?),
        CONSTANT_LONG => Constant::Long(reader.u64()? as i64),
        CONSTANT_DOUBLE => Constant::Double(reader.u64()?),
        CONSTANT_CLASS => Constant::Class(reader.u16()?),
        CONSTANT_STRING => Constant::String(reader.u16()?),
        CONSTANT_FIELDREF => Constant::FieldRef {
            class: reader.u16()?,
            name_and_type: reader.u16()?,
        },
        CONSTANT_METHODREF => Constant::MethodRef {
            class: reader.u16()?,
            name_and_type: reader.u16()?,
        },
        CONSTANT_INTERFACEMETHODREF => Constant::InterfaceMethodRef {
            class: reader.u16()?,
            name_and_type: reader.u16()?,
        },
        CONSTANT_NAMEANDTYPE => Constant::NameAndType {
            name: reader.u16()?,
            descriptor: reader.u16()?,
        },
        CONSTANT_METHODHANDLE => Constant::MethodHandle {
            kind: reader.u8()?,
            reference: reader.u16()?,
        },
        CONSTANT_METHODTYPE => Constant::MethodType(reader.u16()?),
        CONSTANT_DYNAMIC => Constant::Dynamic {
            bootstrap: reader.u16()?,
            name_and_type: reader.u16()?,
        },
        CONSTANT_INVOKEDYNAMIC => Constant::InvokeDynamic {
            bootstrap: reader.u16()?,
            name_and_type: reader.u16()?,
        },
        CONSTANT_MODULE => Constant::Module(reader.u16()?),
        CONSTANT_PACKAGE => Constant::Package(reader.u16()?),
        other => {
            return Err(Error::class_format(format!(
                "unknown constant pool tag {other} at offset {}",
                reader.position() - 1
            )));
        }
    };
    Ok(constant)
}

fn write_constant(out: &mut Vec<u8>, constant: &Constant) -> Result<()> {
    match constant {
        Constant::Utf8(bytes) => {
            out.push(CONSTANT_UTF8);
            let len = u16::try_from(bytes.len())
                .map_err(|_| Error::unsupported("utf8 constant longer than 65535 bytes"))?;
            put_u16(out, len);
            out.extend_from_slice(bytes);
        }
        Constant::Integer(value) => {
            out.push(CONSTANT_INTEGER);
            put_u32(out, *value as u32);
        }
        Constant::Float(bits) => {
            out.push(CONSTANT_FLOAT);
            put_u32(out, *bits);
        }
        Constant::Long(value) => {
            out.push(CONSTANT_LONG);
            out.extend_from_slice(&value.to_be_bytes());
        }
        Constant::Double(bits) => {
            out.push(CONSTANT_DOUBLE);
            out.extend_from_slice(&bits.to_be_bytes());
        }
        Constant::Class(name) => {
            out.push(CONSTANT_CLASS);
            put_u16(out, *name);
        }
        Constant::String(value) => {
            out.push(CONSTANT_STRING);
            put_u16(out, *value);
        }
        Constant::FieldRef {
            class,
            name_and_type,
        } => {
            out.push(CONSTANT_FIELDREF);
            put_u16(out, *class);
            put_u16(out, *name_and_type);
        }
        Constant::MethodRef {
            class,
            name_and_type,
        } => {
            out.push(CONSTANT_METHODREF);
            put_u16(out, *class);
            put_u16(out, *name_and_type);
        }
        Constant::InterfaceMethodRef {
            class,
            name_and_type,
        } => {
            out.push(CONSTANT_INTERFACEMETHODREF);
            put_u16(out, *class);
            put_u16(out, *name_and_type);
        }
        Constant::NameAndType { name, descriptor } => {
            out.push(CONSTANT_NAMEANDTYPE);
            put_u16(out, *name);
            put_u16(out, *descriptor);
        }
        Constant::MethodHandle { kind, reference } => {
            out.push(CONSTANT_METHODHANDLE);
            out.push(*kind);
            put_u16(out, *reference);
        }
        Constant::MethodType(descriptor) => {
            out.push(CONSTANT_METHODTYPE);
            put_u16(out, *descriptor);
        }
        Constant::Dynamic {
            bootstrap,
            name_and_type,
        } => {
            out.push(CONSTANT_DYNAMIC);
            put_u16(out, *bootstrap);
            put_u16(out, *name_and_type);
        }
        Constant::InvokeDynamic {
            bootstrap,
            name_and_type,
        } => {
            out.push(CONSTANT_INVOKEDYNAMIC);
            put_u16(out, *bootstrap);
            put_u16(out, *name_and_type);
        }
        Constant::Module(name) => {
            out.push(CONSTANT_MODULE);
            put_u16(out, *name);
        }
        Constant::Package(name) => {
            out.push(CONSTANT_PACKAGE);
            put_u16(out, *name);
        }
        // The second slot of a wide constant is implicit.
        Constant::Unusable => {}
    }
    Ok(())
}
