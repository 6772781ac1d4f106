use super::attribute::{Attribute, read_attributes};
use super::{ByteReader, ConstantPool, MAGIC, ReaderFlags};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassHeader {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    pub this_class: u16,
    /// Zero only for `java/lang/Object` and module-info.
    pub super_class: u16,
    pub interfaces: Vec<u16>,
}

impl ClassHeader {
    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.class_name(self.this_class)
    }

    pub fn super_name(&self, pool: &ConstantPool) -> Result<Option<String>> {
        pool.optional_class_name(self.super_class)
    }

    pub fn interface_names(&self, pool: &ConstantPool) -> Result<Vec<String>> {
        self.interfaces
            .iter()
            .map(|index| pool.class_name(*index))
            .collect()
    }
}

/// A field or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.descriptor_index)
    }
}

/// One stage of a single-pass transformation. Every event may rewrite the
/// element in place and may append to the pool; the element is then handed
/// to the next stage.
///
/// Events arrive in class-file order: `visit` once, every field, every
/// method, every class attribute, then `visit_end`.
pub trait ClassVisitor {
    fn visit(&mut self, _pool: &mut ConstantPool, _header: &mut ClassHeader) -> Result<()> {
        Ok(())
    }

    fn visit_field(&mut self, _pool: &mut ConstantPool, _field: &mut MemberInfo) -> Result<()> {
        Ok(())
    }

    fn visit_method(&mut self, _pool: &mut ConstantPool, _method: &mut MemberInfo) -> Result<()> {
        Ok(())
    }

    fn visit_attribute(
        &mut self,
        _pool: &mut ConstantPool,
        _attribute: &mut Attribute,
    ) -> Result<()> {
        Ok(())
    }

    fn visit_end(&mut self, _pool: &mut ConstantPool) -> Result<()> {
        Ok(())
    }
}

/// Terminal consumer of a visitor chain. The pool is handed over last since
/// stages may keep appending to it until the end of the class.
pub trait ClassSink {
    fn header(&mut self, header: ClassHeader) -> Result<()>;
    fn field(&mut self, field: MemberInfo) -> Result<()>;
    fn method(&mut self, method: MemberInfo) -> Result<()>;
    fn attribute(&mut self, attribute: Attribute) -> Result<()>;
    fn end(&mut self, pool: ConstantPool) -> Result<()>;
}

/// Parses the constant pool and header up front; fields, methods and
/// attributes are decoded one at a time while [`accept`](Self::accept) runs.
#[derive(Debug, Clone)]
pub struct ClassReader {
    bytes: Vec<u8>,
    pool: ConstantPool,
    header: ClassHeader,
    body_offset: usize,
}

impl ClassReader {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        let mut r = ByteReader::new(&bytes);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(Error::class_format(format!(
                "bad magic 0x{magic:08x}, not a class file"
            )));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let pool = ConstantPool::parse(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;
        let interface_count = r.u16()?;
        let mut interfaces = Vec::with_capacity(usize::from(interface_count));
        for _ in 0..interface_count {
            interfaces.push(r.u16()?);
        }
        let body_offset = r.position();

        let header = ClassHeader {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
        };
        // Fail early on a header that does not point at Class entries.
        header.name(&pool)?;

        Ok(Self {
            bytes,
            pool,
            header,
            body_offset,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn header(&self) -> &ClassHeader {
        &self.header
    }

    pub fn class_name(&self) -> Result<String> {
        self.header.name(&self.pool)
    }

    pub fn super_name(&self) -> Result<Option<String>> {
        self.header.super_name(&self.pool)
    }

    pub fn interfaces(&self) -> Result<Vec<String>> {
        self.header.interface_names(&self.pool)
    }

    /// Streams the class through `stages` in order and into `sink`.
    pub fn accept(
        &self,
        stages: &mut [Box<dyn ClassVisitor + '_>],
        sink: &mut dyn ClassSink,
        flags: ReaderFlags,
    ) -> Result<()> {
        let mut pool = self.pool.clone();
        let mut header = self.header.clone();
        for stage in stages.iter_mut() {
            stage.visit(&mut pool, &mut header)?;
        }
        sink.header(header)?;

        let mut r = ByteReader::at(&self.bytes, self.body_offset);

        let field_count = r.u16()?;
        for _ in 0..field_count {
            let mut field = read_member(&mut r, &self.pool, flags)?;
            for stage in stages.iter_mut() {
                stage.visit_field(&mut pool, &mut field)?;
            }
            sink.field(field)?;
        }

        let method_count = r.u16()?;
        for _ in 0..method_count {
            let mut method = read_member(&mut r, &self.pool, flags)?;
            for stage in stages.iter_mut() {
                stage.visit_method(&mut pool, &mut method)?;
            }
            sink.method(method)?;
        }

        for mut attribute in read_attributes(&mut r, &self.pool, flags)? {
            for stage in stages.iter_mut() {
                stage.visit_attribute(&mut pool, &mut attribute)?;
            }
            sink.attribute(attribute)?;
        }

        if r.remaining() != 0 {
            return Err(Error::class_format(format!(
                "{} trailing bytes after class body",
                r.remaining()
            )));
        }

        for stage in stages.iter_mut() {
            stage.visit_end(&mut pool)?;
        }
        sink.end(pool)
    }
}

fn read_member(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    flags: ReaderFlags,
) -> Result<MemberInfo> {
    Ok(MemberInfo {
        access_flags: r.u16()?,
        name_index: r.u16()?,
        descriptor_index: r.u16()?,
        attributes: read_attributes(r, pool, flags)?,
    })
}
