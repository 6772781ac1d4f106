use super::attribute::{Attribute, write_attributes};
use super::reader::{ClassHeader, ClassSink, MemberInfo};
use super::{ConstantPool, MAGIC, WriterFlags, checked_u16, put_u16, put_u32};
use crate::error::{Error, Result};

/// Sink that encodes a class as events arrive. Member and attribute bodies
/// are encoded immediately; the pool is only known at `end`, so the output is
/// stitched together there.
///
/// Bytecode is never re-encoded, which keeps `max_stack`, `max_locals` and
/// stack map frames valid. The flags are recorded for callers that want to
/// know what was requested.
#[derive(Debug, Default)]
pub struct ClassWriter {
    flags: WriterFlags,
    header: Option<ClassHeader>,
    fields: Vec<u8>,
    field_count: usize,
    methods: Vec<u8>,
    method_count: usize,
    attributes: Vec<Attribute>,
    name: Option<String>,
    output: Option<Vec<u8>>,
}

impl ClassWriter {
    pub fn new(flags: WriterFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    pub fn flags(&self) -> WriterFlags {
        self.flags
    }

    /// Internal name of the written class, available once `end` has been
    /// received.
    pub fn class_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The encoded class, available once `end` has been received.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.output
            .ok_or_else(|| Error::class_format("class writer did not receive a complete class"))
    }
}

pub(crate) fn write_member(out: &mut Vec<u8>, member: &MemberInfo) -> Result<()> {
    put_u16(out, member.access_flags);
    put_u16(out, member.name_index);
    put_u16(out, member.descriptor_index);
    write_attributes(out, &member.attributes)
}

pub(crate) fn encode_class(
    pool: &ConstantPool,
    header: &ClassHeader,
    field_count: usize,
    fields: &[u8],
    method_count: usize,
    methods: &[u8],
    attributes: &[Attribute],
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(fields.len() + methods.len() + 1024);
    put_u32(&mut out, MAGIC);
    put_u16(&mut out, header.minor_version);
    put_u16(&mut out, header.major_version);
    pool.encode(&mut out)?;
    put_u16(&mut out, header.access_flags);
    put_u16(&mut out, header.this_class);
    put_u16(&mut out, header.super_class);
    put_u16(&mut out, checked_u16(header.interfaces.len(), "interfaces")?);
    for interface in &header.interfaces {
        put_u16(&mut out, *interface);
    }
    put_u16(&mut out, checked_u16(field_count, "fields")?);
    out.extend_from_slice(fields);
    put_u16(&mut out, checked_u16(method_count, "methods")?);
    out.extend_from_slice(methods);
    write_attributes(&mut out, attributes)?;
    Ok(out)
}

impl ClassSink for ClassWriter {
    fn header(&mut self, header: ClassHeader) -> Result<()> {
        self.header = Some(header);
        Ok(())
    }

    fn field(&mut self, field: MemberInfo) -> Result<()> {
        self.field_count += 1;
        write_member(&mut self.fields, &field)
    }

    fn method(&mut self, method: MemberInfo) -> Result<()> {
        self.method_count += 1;
        write_member(&mut self.methods, &method)
    }

    fn attribute(&mut self, attribute: Attribute) -> Result<()> {
        self.attributes.push(attribute);
        Ok(())
    }

    fn end(&mut self, pool: ConstantPool) -> Result<()> {
        let header = self
            .header
            .take()
            .ok_or_else(|| Error::class_format("class ended before its header"))?;
        let bytes = encode_class(
            &pool,
            &header,
            self.field_count,
            &self.fields,
            self.method_count,
            &self.methods,
            &self.attributes,
        )?;
        self.name = Some(header.name(&pool)?);
        self.output = Some(bytes);
        Ok(())
    }
}
