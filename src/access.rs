//! Access patches: visibility replacement and `final` removal.

use std::sync::Arc;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::classfile::{AccessFlags, ClassHeader, ClassVisitor, ConstantPool, MemberInfo, ReaderFlags};
use crate::error::Result;
use crate::mapper::{AccessRow, Mapper};
use crate::pipeline::StreamingTransformer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    #[default]
    Package,
    Private,
    Protected,
    Public,
}

impl Visibility {
    pub fn flags(self) -> AccessFlags {
        match self {
            Visibility::Package => AccessFlags::empty(),
            Visibility::Private => AccessFlags::PRIVATE,
            Visibility::Protected => AccessFlags::PROTECTED,
            Visibility::Public => AccessFlags::PUBLIC,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTransform {
    pub access: Visibility,
    #[serde(default)]
    pub remove_final: bool,
}

impl AccessTransform {
    pub fn new(access: Visibility, remove_final: bool) -> Self {
        Self {
            access,
            remove_final,
        }
    }

    /// Replaces the visibility bits, then drops `final` if asked to. All
    /// other bits are kept.
    pub fn apply(self, flags: u16) -> u16 {
        let mut flags = AccessFlags::from_bits_retain(flags);
        flags.remove(AccessFlags::VISIBILITY);
        flags.insert(self.access.flags());
        if self.remove_final {
            flags.remove(AccessFlags::FINAL);
        }
        flags.bits()
    }
}

/// Streaming transformer applying the access row of each class it visits.
///
/// Rows are found by the class's name after renaming. Member keys are
/// `name + descriptor` as seen at this point of the chain; fields also
/// match on their bare name. The class itself uses the empty key.
pub struct AccessPatcher {
    mapper: Arc<Mapper>,
    patched: usize,
}

impl AccessPatcher {
    pub fn new(mapper: Arc<Mapper>) -> Self {
        Self { mapper, patched: 0 }
    }

    /// Number of declarations whose flags were rewritten so far.
    pub fn patched(&self) -> usize {
        self.patched
    }
}

impl StreamingTransformer for AccessPatcher {
    fn applies_to(&self, _name: &str, transformed_name: &str) -> bool {
        self.mapper.access(transformed_name).is_some()
    }

    fn reader_flags(&self) -> ReaderFlags {
        ReaderFlags::EXPAND_FRAMES
    }

    fn visitor<'s>(
        &'s mut self,
        _name: &str,
        transformed_name: &str,
    ) -> Result<Box<dyn ClassVisitor + 's>> {
        let row = self.mapper.access(transformed_name);
        Ok(Box::new(AccessVisitor {
            row,
            patched: &mut self.patched,
        }))
    }
}

struct AccessVisitor<'a> {
    row: Option<&'a AccessRow>,
    patched: &'a mut usize,
}

impl AccessVisitor<'_> {
    fn patch(&mut self, key: &str, fallback: Option<&str>, flags: &mut u16) {
        let Some(row) = self.row else {
            return;
        };
        let transform = row
            .get(key)
            .or_else(|| fallback.and_then(|key| row.get(key)));
        if let Some(transform) = transform {
            let patched = transform.apply(*flags);
            trace!("access {key:?}: 0x{:04x} -> 0x{patched:04x}", *flags);
            *flags = patched;
            *self.patched += 1;
        }
    }
}

impl ClassVisitor for AccessVisitor<'_> {
    fn visit(&mut self, _pool: &mut ConstantPool, header: &mut ClassHeader) -> Result<()> {
        self.patch("", None, &mut header.access_flags);
        Ok(())
    }

    fn visit_field(&mut self, pool: &mut ConstantPool, field: &mut MemberInfo) -> Result<()> {
        let name = field.name(pool)?;
        let key = format!("{name}{}", field.descriptor(pool)?);
        self.patch(&key, Some(&name), &mut field.access_flags);
        Ok(())
    }

    fn visit_method(&mut self, pool: &mut ConstantPool, method: &mut MemberInfo) -> Result<()> {
        let key = format!("{}{}", method.name(pool)?, method.descriptor(pool)?);
        self.patch(&key, None, &mut method.access_flags);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{ClassNode, ClassReader, ClassWriter, WriterFlags};
    use crate::mapping::{MappedClass, MappingTable};

    #[test]
    fn remove_final_on_non_final_is_a_no_op() {
        let flags = (AccessFlags::PUBLIC | AccessFlags::STATIC).bits();
        assert_eq!(AccessTransform::new(Visibility::Public, true).apply(flags), flags);
    }

    #[test]
    fn visibility_replaces_only_visibility_bits() {
        let flags = (AccessFlags::PRIVATE | AccessFlags::FINAL | AccessFlags::SYNTHETIC).bits();
        let patched = AccessTransform::new(Visibility::Public, false).apply(flags);
        assert_eq!(
            AccessFlags::from_bits_retain(patched),
            AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::SYNTHETIC
        );

        let package = AccessTransform::new(Visibility::Package, true).apply(patched);
        assert_eq!(AccessFlags::from_bits_retain(package), AccessFlags::SYNTHETIC);
    }

    #[test]
    fn patches_class_methods_and_fields() -> Result<()> {
        let mut node = ClassNode::new("com/example/Foo", Some("java/lang/Object"), &[])?;
        node.header.access_flags = (AccessFlags::FINAL | AccessFlags::SUPER).bits();
        node.add_field(AccessFlags::PRIVATE | AccessFlags::FINAL, "count", "I")?;
        node.add_field(AccessFlags::PRIVATE, "other", "I")?;
        node.add_method(AccessFlags::PRIVATE, "run", "()V")?;
        node.add_method(AccessFlags::PRIVATE, "run", "(I)V")?;

        let mut table = MappingTable::new();
        table.insert(
            "com/example/Foo",
            MappedClass::default()
                .access("", AccessTransform::new(Visibility::Public, true))
                .access("count", AccessTransform::new(Visibility::Protected, true))
                .access("run()V", AccessTransform::new(Visibility::Public, false)),
        );
        let mut patcher = AccessPatcher::new(Arc::new(Mapper::new(&table)));
        assert!(patcher.applies_to("a", "com/example/Foo"));
        assert!(!patcher.applies_to("com/example/Foo", "com/example/Bar"));

        let reader = ClassReader::new(node.to_bytes()?)?;
        let mut writer = ClassWriter::new(WriterFlags::empty());
        {
            let mut stages = vec![patcher.visitor("com/example/Foo", "com/example/Foo")?];
            reader.accept(&mut stages, &mut writer, ReaderFlags::empty())?;
        }
        let out = ClassNode::parse(writer.into_bytes()?)?;

        assert_eq!(out.access(), AccessFlags::PUBLIC | AccessFlags::SUPER);
        assert_eq!(out.find_field("count")?.unwrap().access_flags, AccessFlags::PROTECTED.bits());
        assert_eq!(out.find_field("other")?.unwrap().access_flags, AccessFlags::PRIVATE.bits());
        assert_eq!(out.find_method("run", "()V")?.unwrap().access_flags, AccessFlags::PUBLIC.bits());
        assert_eq!(out.find_method("run", "(I)V")?.unwrap().access_flags, AccessFlags::PRIVATE.bits());
        assert_eq!(patcher.patched(), 3);
        Ok(())
    }
}
