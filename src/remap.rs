//! The renaming stage: class names, member names and every descriptor or
//! signature that mentions them.

use std::sync::Arc;

use log::trace;
use serde::Serialize;

use crate::classfile::attribute::{
    Annotation, Attribute, AttributeInfo, ElementValue, LOCAL_VARIABLE_TYPE_TABLE,
};
use crate::classfile::{ClassHeader, ClassVisitor, Constant, ConstantPool, MemberInfo, ReaderFlags};
use crate::error::Result;
use crate::mapper::{ClassNameMapper, Direction, Mapper};
use crate::pipeline::StreamingTransformer;
use crate::provider::ClassProvider;
use crate::resolver::MemberResolver;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemapStats {
    pub classes_renamed: usize,
    pub fields_renamed: usize,
    pub methods_renamed: usize,
    /// Field and method references in constant pools that changed name.
    pub references_renamed: usize,
}

/// Streaming transformer applying the class name mapper and the member
/// resolver to every class.
pub struct RemapTransformer<P> {
    mapper: Arc<Mapper>,
    resolver: MemberResolver<P>,
    stats: RemapStats,
}

impl<P: ClassProvider> RemapTransformer<P> {
    pub fn new(resolver: MemberResolver<P>) -> Self {
        Self {
            mapper: Arc::clone(resolver.mapper()),
            resolver,
            stats: RemapStats::default(),
        }
    }

    pub fn stats(&self) -> RemapStats {
        self.stats
    }

    pub fn resolver(&self) -> &MemberResolver<P> {
        &self.resolver
    }

    pub fn into_resolver(self) -> MemberResolver<P> {
        self.resolver
    }
}

impl<P: ClassProvider> StreamingTransformer for RemapTransformer<P> {
    fn reader_flags(&self) -> ReaderFlags {
        ReaderFlags::EXPAND_FRAMES
    }

    fn visitor<'s>(
        &'s mut self,
        name: &str,
        _transformed_name: &str,
    ) -> Result<Box<dyn ClassVisitor + 's>> {
        Ok(Box::new(RemapVisitor {
            names: &self.mapper.classes,
            resolver: &mut self.resolver,
            stats: &mut self.stats,
            class_name: name.to_string(),
            original: ConstantPool::new(),
        }))
    }
}

struct RemapVisitor<'a, P> {
    names: &'a ClassNameMapper,
    resolver: &'a mut MemberResolver<P>,
    stats: &'a mut RemapStats,
    /// Name of the visited class before renaming; member lookups use it.
    class_name: String,
    /// The pool as it was read, before `Class` and member ref entries were
    /// pointed at new names.
    original: ConstantPool,
}

impl<P: ClassProvider> RemapVisitor<'_, P> {
    fn remap_pool(&mut self, pool: &mut ConstantPool) -> Result<()> {
        let indices: Vec<u16> = self.original.indices().collect();
        for index in indices {
            match self.original.get(index)?.clone() {
                Constant::Class(name_index) => {
                    let name = self.original.utf8(name_index)?;
                    let mapped = self.names.map_type(&name, Direction::Map)?;
                    if mapped != name {
                        let name_index = pool.intern_utf8(&mapped)?;
                        pool.set(index, Constant::Class(name_index))?;
                    }
                }
                Constant::FieldRef { class, .. } => {
                    let (owner, name, desc) = self.original.member_ref(index)?;
                    let new_name = self.resolver.resolve_field_name(&owner, &name, &desc)?;
                    let new_desc = self.names.map_desc(&desc, Direction::Map)?;
                    if let Some(name_and_type) =
                        self.renamed_name_and_type(pool, &name, &desc, &new_name, &new_desc)?
                    {
                        pool.set(
                            index,
                            Constant::FieldRef {
                                class,
                                name_and_type,
                            },
                        )?;
                    }
                }
                Constant::MethodRef { class, .. } => {
                    if let Some(name_and_type) = self.remap_method_ref(pool, index)? {
                        pool.set(
                            index,
                            Constant::MethodRef {
                                class,
                                name_and_type,
                            },
                        )?;
                    }
                }
                Constant::InterfaceMethodRef { class, .. } => {
                    if let Some(name_and_type) = self.remap_method_ref(pool, index)? {
                        pool.set(
                            index,
                            Constant::InterfaceMethodRef {
                                class,
                                name_and_type,
                            },
                        )?;
                    }
                }
                Constant::MethodType(desc_index) => {
                    let desc = self.original.utf8(desc_index)?;
                    let mapped = self.names.map_method_desc(&desc, Direction::Map)?;
                    if mapped != desc {
                        let desc_index = pool.intern_utf8(&mapped)?;
                        pool.set(index, Constant::MethodType(desc_index))?;
                    }
                }
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    let (name, desc) = self.original.name_and_type(name_and_type)?;
                    let mapped = self.names.map_desc(&desc, Direction::Map)?;
                    if mapped != desc {
                        let name_and_type = pool.intern_name_and_type(&name, &mapped)?;
                        pool.set(
                            index,
                            Constant::Dynamic {
                                bootstrap,
                                name_and_type,
                            },
                        )?;
                    }
                }
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    let (name, desc) = self.original.name_and_type(name_and_type)?;
                    let mapped = self.names.map_method_desc(&desc, Direction::Map)?;
                    if mapped != desc {
                        let name_and_type = pool.intern_name_and_type(&name, &mapped)?;
                        pool.set(
                            index,
                            Constant::InvokeDynamic {
                                bootstrap,
                                name_and_type,
                            },
                        )?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn remap_method_ref(&mut self, pool: &mut ConstantPool, index: u16) -> Result<Option<u16>> {
        let (owner, name, desc) = self.original.member_ref(index)?;
        let new_name = self.resolver.resolve_method_name(&owner, &name, &desc)?;
        let new_desc = self.names.map_method_desc(&desc, Direction::Map)?;
        self.renamed_name_and_type(pool, &name, &desc, &new_name, &new_desc)
    }

    fn renamed_name_and_type(
        &mut self,
        pool: &mut ConstantPool,
        name: &str,
        desc: &str,
        new_name: &str,
        new_desc: &str,
    ) -> Result<Option<u16>> {
        if new_name == name && new_desc == desc {
            return Ok(None);
        }
        if new_name != name {
            trace!("{}: reference {name}{desc} -> {new_name}", self.class_name);
            self.stats.references_renamed += 1;
        }
        pool.intern_name_and_type(new_name, new_desc).map(Some)
    }

    fn remap_attributes(&mut self, pool: &mut ConstantPool, attributes: &mut [Attribute]) -> Result<()> {
        for attribute in attributes {
            self.remap_attribute(pool, attribute)?;
        }
        Ok(())
    }

    fn remap_attribute(&mut self, pool: &mut ConstantPool, attribute: &mut Attribute) -> Result<()> {
        let names = self.names;
        match &mut attribute.info {
            AttributeInfo::Code(code) => self.remap_attributes(pool, &mut code.attributes)?,
            AttributeInfo::Signature(index) => {
                remap_utf8(pool, index, |s| names.map_signature(s, Direction::Map))?;
            }
            AttributeInfo::InnerClasses(classes) => {
                for class in classes.iter_mut() {
                    if class.inner_name == 0 {
                        continue;
                    }
                    let original = self.original.class_name(class.inner_class)?;
                    let mapped = pool.class_name(class.inner_class)?;
                    remap_utf8(pool, &mut class.inner_name, |inner| {
                        Ok(inner_simple_name(&original, &mapped, inner))
                    })?;
                }
            }
            AttributeInfo::EnclosingMethod { class, method } => {
                if *method != 0 {
                    let owner = self.original.class_name(*class)?;
                    let (name, desc) = pool.name_and_type(*method)?;
                    let new_name = self.resolver.resolve_method_name(&owner, &name, &desc)?;
                    let new_desc = names.map_method_desc(&desc, Direction::Map)?;
                    if new_name != name || new_desc != desc {
                        *method = pool.intern_name_and_type(&new_name, &new_desc)?;
                    }
                }
            }
            AttributeInfo::LocalVariables(vars) => {
                let generic = pool.utf8(attribute.name_index)? == LOCAL_VARIABLE_TYPE_TABLE;
                for var in vars.iter_mut() {
                    if generic {
                        remap_utf8(pool, &mut var.descriptor, |s| {
                            names.map_signature(s, Direction::Map)
                        })?;
                    } else {
                        remap_utf8(pool, &mut var.descriptor, |s| names.map_desc(s, Direction::Map))?;
                    }
                }
            }
            AttributeInfo::Annotations(annotations) => {
                for annotation in annotations.iter_mut() {
                    remap_annotation(names, pool, annotation)?;
                }
            }
            AttributeInfo::ParameterAnnotations(parameters) => {
                for annotation in parameters.iter_mut().flatten() {
                    remap_annotation(names, pool, annotation)?;
                }
            }
            AttributeInfo::TypeAnnotations(annotations) => {
                for annotation in annotations.iter_mut() {
                    remap_annotation(names, pool, &mut annotation.annotation)?;
                }
            }
            AttributeInfo::AnnotationDefault(value) => remap_element_value(names, pool, value)?,
            AttributeInfo::Record(components) => {
                for component in components.iter_mut() {
                    let name = pool.utf8(component.name)?;
                    let desc = pool.utf8(component.descriptor)?;
                    let new_name = self.resolver.resolve_field_name(&self.class_name, &name, &desc)?;
                    if new_name != name {
                        component.name = pool.intern_utf8(&new_name)?;
                    }
                    remap_utf8(pool, &mut component.descriptor, |s| names.map_desc(s, Direction::Map))?;
                    self.remap_attributes(pool, &mut component.attributes)?;
                }
            }
            AttributeInfo::Raw(_) => {}
        }
        Ok(())
    }

    fn remap_member(&mut self, pool: &mut ConstantPool, member: &mut MemberInfo, method: bool) -> Result<bool> {
        let name = member.name(pool)?;
        let desc = member.descriptor(pool)?;
        let (new_name, new_desc) = if method {
            (
                self.resolver.resolve_method_name(&self.class_name, &name, &desc)?,
                self.names.map_method_desc(&desc, Direction::Map)?,
            )
        } else {
            (
                self.resolver.resolve_field_name(&self.class_name, &name, &desc)?,
                self.names.map_desc(&desc, Direction::Map)?,
            )
        };

        let renamed = new_name != name;
        if renamed {
            trace!("{}: {name}{desc} -> {new_name}", self.class_name);
            member.name_index = pool.intern_utf8(&new_name)?;
        }
        if new_desc != desc {
            member.descriptor_index = pool.intern_utf8(&new_desc)?;
        }
        self.remap_attributes(pool, &mut member.attributes)?;
        Ok(renamed)
    }
}

impl<P: ClassProvider> ClassVisitor for RemapVisitor<'_, P> {
    fn visit(&mut self, pool: &mut ConstantPool, header: &mut ClassHeader) -> Result<()> {
        self.class_name = header.name(pool)?;
        let super_name = header.super_name(pool)?;
        let interfaces = header.interface_names(pool)?;
        self.resolver
            .register_class(&self.class_name, super_name.as_deref(), &interfaces)?;

        self.original = pool.clone();
        self.remap_pool(pool)?;

        let new_name = header.name(pool)?;
        if new_name != self.class_name {
            trace!("class {} -> {new_name}", self.class_name);
            self.stats.classes_renamed += 1;
        }
        Ok(())
    }

    fn visit_field(&mut self, pool: &mut ConstantPool, field: &mut MemberInfo) -> Result<()> {
        if self.remap_member(pool, field, false)? {
            self.stats.fields_renamed += 1;
        }
        Ok(())
    }

    fn visit_method(&mut self, pool: &mut ConstantPool, method: &mut MemberInfo) -> Result<()> {
        if self.remap_member(pool, method, true)? {
            self.stats.methods_renamed += 1;
        }
        Ok(())
    }

    fn visit_attribute(&mut self, pool: &mut ConstantPool, attribute: &mut Attribute) -> Result<()> {
        self.remap_attribute(pool, attribute)
    }
}

/// Points `index` at a rewritten copy of the string it refers to. The old
/// entry is left alone since other structures may share it.
fn remap_utf8(
    pool: &mut ConstantPool,
    index: &mut u16,
    map: impl FnOnce(&str) -> Result<String>,
) -> Result<bool> {
    let value = pool.utf8(*index)?;
    let mapped = map(&value)?;
    if mapped == value {
        return Ok(false);
    }
    *index = pool.intern_utf8(&mapped)?;
    Ok(true)
}

fn remap_annotation(
    names: &ClassNameMapper,
    pool: &mut ConstantPool,
    annotation: &mut Annotation,
) -> Result<()> {
    remap_utf8(pool, &mut annotation.type_index, |s| names.map_desc(s, Direction::Map))?;
    for (_, value) in annotation.elements.iter_mut() {
        remap_element_value(names, pool, value)?;
    }
    Ok(())
}

fn remap_element_value(
    names: &ClassNameMapper,
    pool: &mut ConstantPool,
    value: &mut ElementValue,
) -> Result<()> {
    match value {
        ElementValue::Const { .. } => {}
        ElementValue::Enum { type_name, .. } => {
            remap_utf8(pool, type_name, |s| names.map_desc(s, Direction::Map))?;
        }
        ElementValue::Class(index) => {
            // A class literal is a return descriptor and may be `V`.
            remap_utf8(pool, index, |s| {
                if s == "V" {
                    Ok(s.to_string())
                } else {
                    names.map_desc(s, Direction::Map)
                }
            })?;
        }
        ElementValue::Annotation(annotation) => remap_annotation(names, pool, annotation)?,
        ElementValue::Array(values) => {
            for value in values.iter_mut() {
                remap_element_value(names, pool, value)?;
            }
        }
    }
    Ok(())
}

/// Simple name recorded in `InnerClasses` for a renamed inner class.
///
/// Kept when the class did not move or kept its last path segment; otherwise
/// taken from the mapped name after its last `$`, skipping the digits that
/// prefix local class names.
pub fn inner_simple_name(original: &str, mapped: &str, inner_name: &str) -> String {
    if original == mapped {
        return inner_name.to_string();
    }
    if let (Some(a), Some(b)) = (original.rfind('/'), mapped.rfind('/')) {
        if original[a..] == mapped[b..] {
            return inner_name.to_string();
        }
    }
    match mapped.rfind('$') {
        Some(pos) => mapped[pos + 1..]
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .to_string(),
        None => inner_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::attribute::{
        INNER_CLASSES, InnerClass, RUNTIME_VISIBLE_TYPE_ANNOTATIONS, SIGNATURE, TypeAnnotation,
    };
    use crate::classfile::{AccessFlags, ClassNode, ClassReader, ClassWriter, WriterFlags};
    use crate::mapping::{MappedClass, MappingTable};
    use crate::provider::MemoryClassProvider;
    use crate::resolver::HierarchyCache;

    fn mapper() -> Arc<Mapper> {
        let mut table = MappingTable::new();
        table.insert(
            "com/example/Base",
            MappedClass::named("a")
                .method("m", "(La;)V", "accept")
                .field("f", "La$b;", "child"),
        );
        table.insert("com/example/Base$Child", MappedClass::named("a$b"));
        table.insert("com/example/Impl", MappedClass::named("c"));
        Arc::new(Mapper::new(&table))
    }

    fn remap(mapper: Arc<Mapper>, provider: MemoryClassProvider, node: ClassNode) -> Result<ClassNode> {
        let resolver = MemberResolver::new(mapper, provider, HierarchyCache::default());
        let mut transformer = RemapTransformer::new(resolver);
        let name = node.name()?;
        let reader = ClassReader::new(node.to_bytes()?)?;
        let mut writer = ClassWriter::new(WriterFlags::empty());
        {
            let mut stages = vec![transformer.visitor(&name, &name)?];
            reader.accept(&mut stages, &mut writer, ReaderFlags::empty())?;
        }
        ClassNode::parse(writer.into_bytes()?)
    }

    #[test]
    fn renames_declarations_and_inherited_references() -> Result<()> {
        let mut provider = MemoryClassProvider::new();
        provider.insert(ClassNode::new("a", Some("java/lang/Object"), &[])?.to_bytes()?)?;

        let mut node = ClassNode::new("c", Some("a"), &[])?;
        node.add_field(AccessFlags::PRIVATE, "f", "La$b;")?;
        node.add_method(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "m", "(La;)V")?;
        // invokevirtual c.m(La;)V, declared in the superclass
        let call = node.pool.intern_method_ref("c", "m", "(La;)V")?;
        let [hi, lo] = call.to_be_bytes();
        node.add_method_with_code(
            AccessFlags::PUBLIC,
            "go",
            "()V",
            2,
            1,
            vec![0x2a, 0x2a, 0xb6, hi, lo, 0xb1],
        )?;
        let code_before = node.methods[1].attributes.clone();

        let out = remap(mapper(), provider, node)?;
        assert_eq!(out.name()?, "com/example/Impl");
        assert_eq!(out.super_name()?.as_deref(), Some("com/example/Base"));
        assert_eq!(
            out.find_field("child")?.map(|f| f.descriptor(&out.pool)).transpose()?.as_deref(),
            Some("Lcom/example/Base$Child;")
        );
        assert!(out.find_method("accept", "(Lcom/example/Base;)V")?.is_some());
        assert!(out.find_method("go", "()V")?.is_some());

        let (owner, name, desc) = out.pool.member_ref(call)?;
        assert_eq!(owner, "com/example/Impl");
        assert_eq!(name, "accept");
        assert_eq!(desc, "(Lcom/example/Base;)V");
        // Bytecode still points at the same constant.
        assert_eq!(out.methods[1].attributes, code_before);
        Ok(())
    }

    #[test]
    fn rewrites_signatures_and_inner_class_names() -> Result<()> {
        let mut node = ClassNode::new("a", Some("java/lang/Object"), &[])?;
        let inner_class = node.pool.intern_class("a$b")?;
        let outer_class = node.pool.intern_class("a")?;
        let inner_name = node.pool.intern_utf8("b")?;
        node.add_attribute(
            INNER_CLASSES,
            AttributeInfo::InnerClasses(vec![InnerClass {
                inner_class,
                outer_class,
                inner_name,
                access_flags: AccessFlags::STATIC.bits(),
            }]),
        )?;
        let signature = node.pool.intern_utf8("Ljava/lang/Object;Ljava/lang/Comparable<La;>;")?;
        node.add_attribute(SIGNATURE, AttributeInfo::Signature(signature))?;

        let out = remap(mapper(), MemoryClassProvider::new(), node)?;
        assert_eq!(out.name()?, "com/example/Base");
        let AttributeInfo::InnerClasses(classes) = &out.attributes[0].info else {
            panic!("expected InnerClasses");
        };
        assert_eq!(out.pool.class_name(classes[0].inner_class)?, "com/example/Base$Child");
        assert_eq!(out.pool.utf8(classes[0].inner_name)?, "Child");
        let AttributeInfo::Signature(index) = out.attributes[1].info else {
            panic!("expected Signature");
        };
        assert_eq!(
            out.pool.utf8(index)?,
            "Ljava/lang/Object;Ljava/lang/Comparable<Lcom/example/Base;>;"
        );
        Ok(())
    }

    #[test]
    fn rewrites_type_annotations() -> Result<()> {
        let mut node = ClassNode::new("c", Some("a"), &[])?;
        let type_index = node.pool.intern_utf8("La$b;")?;
        let value = node.pool.intern_utf8("value")?;
        let literal = node.pool.intern_utf8("La;")?;
        node.add_attribute(
            RUNTIME_VISIBLE_TYPE_ANNOTATIONS,
            AttributeInfo::TypeAnnotations(vec![TypeAnnotation {
                // supertype_target on the superclass
                target_type: 0x10,
                target_info: vec![0xff, 0xff],
                type_path: vec![0],
                annotation: Annotation {
                    type_index,
                    elements: vec![(value, ElementValue::Class(literal))],
                },
            }]),
        )?;

        let out = remap(mapper(), MemoryClassProvider::new(), node)?;
        let AttributeInfo::TypeAnnotations(annotations) = &out.attributes[0].info else {
            panic!("expected RuntimeVisibleTypeAnnotations");
        };
        let annotation = &annotations[0];
        assert_eq!(annotation.target_type, 0x10);
        assert_eq!(annotation.target_info, vec![0xff, 0xff]);
        assert_eq!(
            out.pool.utf8(annotation.annotation.type_index)?,
            "Lcom/example/Base$Child;"
        );
        let (name, ElementValue::Class(class)) = &annotation.annotation.elements[0] else {
            panic!("expected a class literal");
        };
        assert_eq!(out.pool.utf8(*name)?, "value");
        assert_eq!(out.pool.utf8(*class)?, "Lcom/example/Base;");
        Ok(())
    }

    #[test]
    fn inner_simple_names() {
        assert_eq!(inner_simple_name("a$b", "a$b", "b"), "b");
        assert_eq!(inner_simple_name("a$b", "x/Foo$Bar", "b"), "Bar");
        assert_eq!(inner_simple_name("a$1b", "x/Foo$1Local", "b"), "Local");
        assert_eq!(inner_simple_name("p/a$b", "q/a$b", "b"), "b");
    }
}
