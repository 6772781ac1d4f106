use super::attribute::{Attribute, AttributeInfo, CODE, Code};
use super::reader::{ClassHeader, ClassReader, ClassSink, ClassVisitor, MemberInfo};
use super::writer::{encode_class, write_member};
use super::{AccessFlags, ConstantPool, ReaderFlags};
use crate::error::Result;

/// Java 8 class file version, used for classes built from scratch.
const DEFAULT_MAJOR_VERSION: u16 = 52;

/// A fully materialized class. Tree transformers receive one of these and may
/// mutate or replace it; it is also the sink for streaming stages that run
/// ahead of a tree transformer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNode {
    pub pool: ConstantPool,
    pub header: ClassHeader,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassNode {
    /// An empty public class with the given hierarchy.
    pub fn new(name: &str, super_name: Option<&str>, interfaces: &[&str]) -> Result<Self> {
        let mut pool = ConstantPool::new();
        let this_class = pool.intern_class(name)?;
        let super_class = match super_name {
            Some(super_name) => pool.intern_class(super_name)?,
            None => 0,
        };
        let interfaces = interfaces
            .iter()
            .map(|interface| pool.intern_class(interface))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            pool,
            header: ClassHeader {
                minor_version: 0,
                major_version: DEFAULT_MAJOR_VERSION,
                access_flags: (AccessFlags::PUBLIC | AccessFlags::SUPER).bits(),
                this_class,
                super_class,
                interfaces,
            },
            ..Self::default()
        })
    }

    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        Self::read(&ClassReader::new(bytes)?, &mut [], ReaderFlags::empty())
    }

    /// Materializes `reader` after running it through `stages`.
    pub fn read(
        reader: &ClassReader,
        stages: &mut [Box<dyn ClassVisitor + '_>],
        flags: ReaderFlags,
    ) -> Result<Self> {
        let mut node = Self::default();
        reader.accept(stages, &mut node, flags)?;
        Ok(node)
    }

    pub fn name(&self) -> Result<String> {
        self.header.name(&self.pool)
    }

    pub fn super_name(&self) -> Result<Option<String>> {
        self.header.super_name(&self.pool)
    }

    pub fn interfaces(&self) -> Result<Vec<String>> {
        self.header.interface_names(&self.pool)
    }

    pub fn access(&self) -> AccessFlags {
        AccessFlags::from_bits_retain(self.header.access_flags)
    }

    pub fn add_field(&mut self, access: AccessFlags, name: &str, descriptor: &str) -> Result<()> {
        let field = self.member(access, name, descriptor)?;
        self.fields.push(field);
        Ok(())
    }

    /// Adds an abstract-style method with no `Code` attribute.
    pub fn add_method(&mut self, access: AccessFlags, name: &str, descriptor: &str) -> Result<()> {
        let method = self.member(access, name, descriptor)?;
        self.methods.push(method);
        Ok(())
    }

    pub fn add_method_with_code(
        &mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: Vec<u8>,
    ) -> Result<()> {
        let mut method = self.member(access, name, descriptor)?;
        let code_name = self.pool.intern_utf8(CODE)?;
        method.attributes.push(Attribute::new(
            code_name,
            AttributeInfo::Code(Code {
                max_stack,
                max_locals,
                code,
                exception_table: Vec::new(),
                attributes: Vec::new(),
            }),
        ));
        self.methods.push(method);
        Ok(())
    }

    pub fn add_attribute(&mut self, name: &str, info: AttributeInfo) -> Result<()> {
        let name_index = self.pool.intern_utf8(name)?;
        self.attributes.push(Attribute::new(name_index, info));
        Ok(())
    }

    fn member(&mut self, access: AccessFlags, name: &str, descriptor: &str) -> Result<MemberInfo> {
        Ok(MemberInfo {
            access_flags: access.bits(),
            name_index: self.pool.intern_utf8(name)?,
            descriptor_index: self.pool.intern_utf8(descriptor)?,
            attributes: Vec::new(),
        })
    }

    pub fn find_field(&self, name: &str) -> Result<Option<&MemberInfo>> {
        for field in &self.fields {
            if field.name(&self.pool)? == name {
                return Ok(Some(field));
            }
        }
        Ok(None)
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Result<Option<&MemberInfo>> {
        for method in &self.methods {
            if method.name(&self.pool)? == name && method.descriptor(&self.pool)? == descriptor {
                return Ok(Some(method));
            }
        }
        Ok(None)
    }

    /// `(name, descriptor)` of every method, in declaration order.
    pub fn method_signatures(&self) -> Result<Vec<(String, String)>> {
        self.methods
            .iter()
            .map(|method| Ok((method.name(&self.pool)?, method.descriptor(&self.pool)?)))
            .collect()
    }

    /// Replays the class through `stages` into `sink`, the same way
    /// [`ClassReader::accept`] does for encoded bytes.
    pub fn accept(
        self,
        stages: &mut [Box<dyn ClassVisitor + '_>],
        sink: &mut dyn ClassSink,
    ) -> Result<()> {
        let Self {
            mut pool,
            mut header,
            fields,
            methods,
            attributes,
        } = self;

        for stage in stages.iter_mut() {
            stage.visit(&mut pool, &mut header)?;
        }
        sink.header(header)?;
        for mut field in fields {
            for stage in stages.iter_mut() {
                stage.visit_field(&mut pool, &mut field)?;
            }
            sink.field(field)?;
        }
        for mut method in methods {
            for stage in stages.iter_mut() {
                stage.visit_method(&mut pool, &mut method)?;
            }
            sink.method(method)?;
        }
        for mut attribute in attributes {
            for stage in stages.iter_mut() {
                stage.visit_attribute(&mut pool, &mut attribute)?;
            }
            sink.attribute(attribute)?;
        }
        for stage in stages.iter_mut() {
            stage.visit_end(&mut pool)?;
        }
        sink.end(pool)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut fields = Vec::new();
        for field in &self.fields {
            write_member(&mut fields, field)?;
        }
        let mut methods = Vec::new();
        for method in &self.methods {
            write_member(&mut methods, method)?;
        }
        encode_class(
            &self.pool,
            &self.header,
            self.fields.len(),
            &fields,
            self.methods.len(),
            &methods,
            &self.attributes,
        )
    }
}

impl ClassSink for ClassNode {
    fn header(&mut self, header: ClassHeader) -> Result<()> {
        self.header = header;
        Ok(())
    }

    fn field(&mut self, field: MemberInfo) -> Result<()> {
        self.fields.push(field);
        Ok(())
    }

    fn method(&mut self, method: MemberInfo) -> Result<()> {
        self.methods.push(method);
        Ok(())
    }

    fn attribute(&mut self, attribute: Attribute) -> Result<()> {
        self.attributes.push(attribute);
        Ok(())
    }

    fn end(&mut self, pool: ConstantPool) -> Result<()> {
        self.pool = pool;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassWriter;
    use crate::classfile::WriterFlags;

    fn sample() -> Result<ClassNode> {
        let mut node = ClassNode::new("a/B", Some("java/lang/Object"), &["java/lang/Runnable"])?;
        node.add_field(AccessFlags::PRIVATE | AccessFlags::FINAL, "c", "I")?;
        node.add_method(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "run", "()V")?;
        node.add_method_with_code(AccessFlags::PUBLIC, "foo", "()V", 0, 1, vec![0xb1])?;
        Ok(node)
    }

    #[test]
    fn built_class_parses_back() -> Result<()> {
        let node = sample()?;
        let parsed = ClassNode::parse(node.to_bytes()?)?;

        assert_eq!(parsed.name()?, "a/B");
        assert_eq!(parsed.super_name()?.as_deref(), Some("java/lang/Object"));
        assert_eq!(parsed.interfaces()?, vec!["java/lang/Runnable".to_string()]);
        assert!(parsed.find_field("c")?.is_some());
        assert_eq!(
            parsed.method_signatures()?,
            vec![
                ("run".to_string(), "()V".to_string()),
                ("foo".to_string(), "()V".to_string()),
            ]
        );
        assert_eq!(parsed, node);
        Ok(())
    }

    #[test]
    fn streaming_without_stages_is_byte_identical() -> Result<()> {
        let bytes = sample()?.to_bytes()?;
        let reader = ClassReader::new(bytes.clone())?;
        let mut writer = ClassWriter::new(WriterFlags::empty());
        reader.accept(&mut [], &mut writer, ReaderFlags::empty())?;
        assert_eq!(writer.into_bytes()?, bytes);
        Ok(())
    }

    #[test]
    fn rejects_non_class_bytes() {
        assert!(ClassReader::new(b"PK\x03\x04 not a class".to_vec()).is_err());
        assert!(ClassReader::new(vec![0xca, 0xfe]).is_err());
    }
}
