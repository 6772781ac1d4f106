use super::{ByteReader, ConstantPool, ReaderFlags, checked_u16, checked_u32, put_u16, put_u32};
use crate::error::{Error, Result};

pub const CODE: &str = "Code";
pub const SIGNATURE: &str = "Signature";
pub const INNER_CLASSES: &str = "InnerClasses";
pub const ENCLOSING_METHOD: &str = "EnclosingMethod";
pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeInvisibleParameterAnnotations";
pub const RUNTIME_VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
pub const RUNTIME_INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";
pub const ANNOTATION_DEFAULT: &str = "AnnotationDefault";
pub const RECORD: &str = "Record";

const DEBUG_ATTRIBUTES: [&str; 5] = [
    "SourceFile",
    "SourceDebugExtension",
    "LineNumberTable",
    LOCAL_VARIABLE_TABLE,
    LOCAL_VARIABLE_TYPE_TABLE,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: AttributeInfo,
}

/// Attributes that carry class names, member names or descriptors are
/// decoded; everything else stays raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeInfo {
    Code(Code),
    Signature(u16),
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod { class: u16, method: u16 },
    /// `LocalVariableTable` (descriptor) or `LocalVariableTypeTable` (signature).
    LocalVariables(Vec<LocalVariable>),
    Annotations(Vec<Annotation>),
    ParameterAnnotations(Vec<Vec<Annotation>>),
    TypeAnnotations(Vec<TypeAnnotation>),
    AnnotationDefault(ElementValue),
    Record(Vec<RecordComponent>),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class: u16,
    pub outer_class: u16,
    /// Zero for anonymous classes.
    pub inner_name: u16,
    pub access_flags: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: u16,
    pub descriptor: u16,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub type_index: u16,
    pub elements: Vec<(u16, ElementValue)>,
}

/// An annotation on a type use. Where it applies (`target_info`, `type_path`)
/// refers to code offsets and local slots, never the pool, so it is kept as
/// read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub target_type: u8,
    pub target_info: Vec<u8>,
    pub type_path: Vec<u8>,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    Const { tag: u8, index: u16 },
    Enum { type_name: u16, const_name: u16 },
    Class(u16),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordComponent {
    pub name: u16,
    pub descriptor: u16,
    pub attributes: Vec<Attribute>,
}

impl Attribute {
    pub fn new(name_index: u16, info: AttributeInfo) -> Self {
        Self { name_index, info }
    }

    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.name_index)
    }
}

pub(crate) fn read_attributes(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
    flags: ReaderFlags,
) -> Result<Vec<Attribute>> {
    let count = reader.u16()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name_index = reader.u16()?;
        let len = reader.u32()? as usize;
        let body = reader.take(len)?;
        let name = pool.utf8(name_index)?;
        if flags.contains(ReaderFlags::SKIP_DEBUG) && DEBUG_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }

        let mut body_reader = ByteReader::new(body);
        let info = read_attribute_body(&name, &mut body_reader, pool, flags)?;
        if !matches!(info, AttributeInfo::Raw(_)) && body_reader.remaining() != 0 {
            return Err(Error::class_format(format!(
                "attribute {name} has {} trailing bytes",
                body.len() - body_reader.position()
            )));
        }
        attributes.push(Attribute { name_index, info });
    }
    Ok(attributes)
}

fn read_attribute_body(
    name: &str,
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    flags: ReaderFlags,
) -> Result<AttributeInfo> {
    let info = match name {
        CODE => {
            let max_stack = r.u16()?;
            let max_locals = r.u16()?;
            let code_len = r.u32()? as usize;
            let code = r.take(code_len)?.to_vec();
            let handlers = r.u16()?;
            let mut exception_table = Vec::with_capacity(usize::from(handlers));
            for _ in 0..handlers {
                exception_table.push(ExceptionHandler {
                    start_pc: r.u16()?,
                    end_pc: r.u16()?,
                    handler_pc: r.u16()?,
                    catch_type: r.u16()?,
                });
            }
            let attributes = read_attributes(r, pool, flags)?;
            AttributeInfo::Code(Code {
                max_stack,
                max_locals,
                code,
                exception_table,
                attributes,
            })
        }
        SIGNATURE => AttributeInfo::Signature(r.u16()?),
        INNER_CLASSES => {
            let count = r.u16()?;
            let mut classes = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                classes.push(InnerClass {
                    inner_class: r.u16()?,
                    outer_class: r.u16()?,
                    inner_name: r.u16()?,
                    access_flags: r.u16()?,
                });
            }
            AttributeInfo::InnerClasses(classes)
        }
        ENCLOSING_METHOD => AttributeInfo::EnclosingMethod {
            class: r.u16()?,
            method: r.u16()?,
        },
        LOCAL_VARIABLE_TABLE | LOCAL_VARIABLE_TYPE_TABLE => {
            let count = r.u16()?;
            let mut vars = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                vars.push(LocalVariable {
                    start_pc: r.u16()?,
                    length: r.u16()?,
                    name: r.u16()?,
                    descriptor: r.u16()?,
                    index: r.u16()?,
                });
            }
            AttributeInfo::LocalVariables(vars)
        }
        RUNTIME_VISIBLE_ANNOTATIONS | RUNTIME_INVISIBLE_ANNOTATIONS => {
            AttributeInfo::Annotations(read_annotations(r)?)
        }
        RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS | RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
            let count = r.u8()?;
            let mut parameters = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                parameters.push(read_annotations(r)?);
            }
            AttributeInfo::ParameterAnnotations(parameters)
        }
        RUNTIME_VISIBLE_TYPE_ANNOTATIONS | RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
            let count = r.u16()?;
            let mut annotations = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                annotations.push(read_type_annotation(r)?);
            }
            AttributeInfo::TypeAnnotations(annotations)
        }
        ANNOTATION_DEFAULT => AttributeInfo::AnnotationDefault(read_element_value(r)?),
        RECORD => {
            let count = r.u16()?;
            let mut components = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                components.push(RecordComponent {
                    name: r.u16()?,
                    descriptor: r.u16()?,
                    attributes: read_attributes(r, pool, flags)?,
                });
            }
            AttributeInfo::Record(components)
        }
        _ => {
            let rest = r.take(r.remaining())?;
            AttributeInfo::Raw(rest.to_vec())
        }
    };
    Ok(info)
}

fn read_annotations(r: &mut ByteReader<'_>) -> Result<Vec<Annotation>> {
    let count = r.u16()?;
    let mut annotations = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        annotations.push(read_annotation(r)?);
    }
    Ok(annotations)
}

fn read_annotation(r: &mut ByteReader<'_>) -> Result<Annotation> {
    let type_index = r.u16()?;
    let count = r.u16()?;
    let mut elements = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = r.u16()?;
        elements.push((name, read_element_value(r)?));
    }
    Ok(Annotation {
        type_index,
        elements,
    })
}

fn read_type_annotation(r: &mut ByteReader<'_>) -> Result<TypeAnnotation> {
    let target_type = r.u8()?;
    let target_info = match target_type {
        0x00 | 0x01 | 0x16 => r.take(1)?.to_vec(),
        0x10..=0x12 | 0x17 | 0x42..=0x46 => r.take(2)?.to_vec(),
        0x13..=0x15 => Vec::new(),
        0x47..=0x4B => r.take(3)?.to_vec(),
        // localvar_target: a table of (start_pc, length, index).
        0x40 | 0x41 => {
            let entries = r.u16()?;
            let mut info = entries.to_be_bytes().to_vec();
            info.extend_from_slice(r.take(usize::from(entries) * 6)?);
            info
        }
        other => {
            return Err(Error::class_format(format!(
                "unknown type annotation target 0x{other:02x}"
            )));
        }
    };
    let path_len = r.u8()?;
    let mut type_path = vec![path_len];
    type_path.extend_from_slice(r.take(usize::from(path_len) * 2)?);
    Ok(TypeAnnotation {
        target_type,
        target_info,
        type_path,
        annotation: read_annotation(r)?,
    })
}

fn read_element_value(r: &mut ByteReader<'_>) -> Result<ElementValue> {
    let tag = r.u8()?;
    let value = match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
            tag,
            index: r.u16()?,
        },
        b'e' => ElementValue::Enum {
            type_name: r.u16()?,
            const_name: r.u16()?,
        },
        b'c' => ElementValue::Class(r.u16()?),
        b'@' => ElementValue::Annotation(read_annotation(r)?),
        b'[' => {
            let count = r.u16()?;
            let mut values = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                values.push(read_element_value(r)?);
            }
            ElementValue::Array(values)
        }
        other => {
            return Err(Error::class_format(format!(
                "unknown annotation element tag {:?}",
                char::from(other)
            )));
        }
    };
    Ok(value)
}

pub(crate) fn write_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) -> Result<()> {
    put_u16(out, checked_u16(attributes.len(), "attributes")?);
    for attribute in attributes {
        write_attribute(out, attribute)?;
    }
    Ok(())
}

pub(crate) fn write_attribute(out: &mut Vec<u8>, attribute: &Attribute) -> Result<()> {
    let mut body = Vec::new();
    write_attribute_body(&mut body, &attribute.info)?;
    put_u16(out, attribute.name_index);
    put_u32(out, checked_u32(body.len(), "attribute")?);
    out.extend_from_slice(&body);
    Ok(())
}

fn write_attribute_body(out: &mut Vec<u8>, info: &AttributeInfo) -> Result<()> {
    match info {
        AttributeInfo::Code(code) => {
            put_u16(out, code.max_stack);
            put_u16(out, code.max_locals);
            put_u32(out, checked_u32(code.code.len(), "code array")?);
            out.extend_from_slice(&code.code);
            put_u16(out, checked_u16(code.exception_table.len(), "exception handlers")?);
            for handler in &code.exception_table {
                put_u16(out, handler.start_pc);
                put_u16(out, handler.end_pc);
                put_u16(out, handler.handler_pc);
                put_u16(out, handler.catch_type);
            }
            write_attributes(out, &code.attributes)?;
        }
        AttributeInfo::Signature(index) => put_u16(out, *index),
        AttributeInfo::InnerClasses(classes) => {
            put_u16(out, checked_u16(classes.len(), "inner classes")?);
            for class in classes {
                put_u16(out, class.inner_class);
                put_u16(out, class.outer_class);
                put_u16(out, class.inner_name);
                put_u16(out, class.access_flags);
            }
        }
        AttributeInfo::EnclosingMethod { class, method } => {
            put_u16(out, *class);
            put_u16(out, *method);
        }
        AttributeInfo::LocalVariables(vars) => {
            put_u16(out, checked_u16(vars.len(), "local variables")?);
            for var in vars {
                put_u16(out, var.start_pc);
                put_u16(out, var.length);
                put_u16(out, var.name);
                put_u16(out, var.descriptor);
                put_u16(out, var.index);
            }
        }
        AttributeInfo::Annotations(annotations) => write_annotations(out, annotations)?,
        AttributeInfo::ParameterAnnotations(parameters) => {
            let count = u8::try_from(parameters.len())
                .map_err(|_| Error::unsupported("more than 255 annotated parameters"))?;
            out.push(count);
            for annotations in parameters {
                write_annotations(out, annotations)?;
            }
        }
        AttributeInfo::TypeAnnotations(annotations) => {
            put_u16(out, checked_u16(annotations.len(), "type annotations")?);
            for annotation in annotations {
                out.push(annotation.target_type);
                out.extend_from_slice(&annotation.target_info);
                out.extend_from_slice(&annotation.type_path);
                write_annotation(out, &annotation.annotation)?;
            }
        }
        AttributeInfo::AnnotationDefault(value) => write_element_value(out, value)?,
        AttributeInfo::Record(components) => {
            put_u16(out, checked_u16(components.len(), "record components")?);
            for component in components {
                put_u16(out, component.name);
                put_u16(out, component.descriptor);
                write_attributes(out, &component.attributes)?;
            }
        }
        AttributeInfo::Raw(bytes) => out.extend_from_slice(bytes),
    }
    Ok(())
}

fn write_annotations(out: &mut Vec<u8>, annotations: &[Annotation]) -> Result<()> {
    put_u16(out, checked_u16(annotations.len(), "annotations")?);
    for annotation in annotations {
        write_annotation(out, annotation)?;
    }
    Ok(())
}

fn write_annotation(out: &mut Vec<u8>, annotation: &Annotation) -> Result<()> {
    put_u16(out, annotation.type_index);
    put_u16(out, checked_u16(annotation.elements.len(), "annotation elements")?);
    for (name, value) in &annotation.elements {
        put_u16(out, *name);
        write_element_value(out, value)?;
    }
    Ok(())
}

fn write_element_value(out: &mut Vec<u8>, value: &ElementValue) -> Result<()> {
    match value {
        ElementValue::Const { tag, index } => {
            out.push(*tag);
            put_u16(out, *index);
        }
        ElementValue::Enum {
            type_name,
            const_name,
        } => {
            out.push(b'e');
            put_u16(out, *type_name);
            put_u16(out, *const_name);
        }
        ElementValue::Class(index) => {
            out.push(b'c');
            put_u16(out, *index);
        }
        ElementValue::Annotation(annotation) => {
            out.push(b'@');
            write_annotation(out, annotation)?;
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            put_u16(out, checked_u16(values.len(), "array elements")?);
            for value in values {
                write_element_value(out, value)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(pool: &ConstantPool, attribute: &Attribute) -> Result<Attribute> {
        let mut bytes = Vec::new();
        write_attributes(&mut bytes, std::slice::from_ref(attribute))?;
        let mut reader = ByteReader::new(&bytes);
        let mut parsed = read_attributes(&mut reader, pool, ReaderFlags::empty())?;
        Ok(parsed.remove(0))
    }

    #[test]
    fn code_with_nested_local_variables_survives_encoding() -> Result<()> {
        let mut pool = ConstantPool::new();
        let code_name = pool.intern_utf8(CODE)?;
        let lvt_name = pool.intern_utf8(LOCAL_VARIABLE_TABLE)?;
        let this_name = pool.intern_utf8("this")?;
        let this_desc = pool.intern_utf8("La/B;")?;

        let attribute = Attribute::new(
            code_name,
            AttributeInfo::Code(Code {
                max_stack: 1,
                max_locals: 1,
                code: vec![0xb1],
                exception_table: Vec::new(),
                attributes: vec![Attribute::new(
                    lvt_name,
                    AttributeInfo::LocalVariables(vec![LocalVariable {
                        start_pc: 0,
                        length: 1,
                        name: this_name,
                        descriptor: this_desc,
                        index: 0,
                    }]),
                )],
            }),
        );

        assert_eq!(round_trip(&pool, &attribute)?, attribute);
        Ok(())
    }

    #[test]
    fn type_annotations_survive_encoding() -> Result<()> {
        let mut pool = ConstantPool::new();
        let name = pool.intern_utf8(RUNTIME_VISIBLE_TYPE_ANNOTATIONS)?;
        let type_index = pool.intern_utf8("La/N;")?;

        let attribute = Attribute::new(
            name,
            AttributeInfo::TypeAnnotations(vec![
                TypeAnnotation {
                    target_type: 0x40,
                    target_info: vec![0, 1, 0, 0, 0, 4, 0, 1],
                    type_path: vec![1, 3, 0],
                    annotation: Annotation {
                        type_index,
                        elements: Vec::new(),
                    },
                },
                TypeAnnotation {
                    target_type: 0x13,
                    target_info: Vec::new(),
                    type_path: vec![0],
                    annotation: Annotation {
                        type_index,
                        elements: vec![(type_index, ElementValue::Class(type_index))],
                    },
                },
            ]),
        );

        assert_eq!(round_trip(&pool, &attribute)?, attribute);
        Ok(())
    }

    #[test]
    fn skip_debug_drops_debug_attributes() -> Result<()> {
        let mut pool = ConstantPool::new();
        let source_file = pool.intern_utf8("SourceFile")?;
        let value = pool.intern_utf8("B.java")?;
        let signature = pool.intern_utf8(SIGNATURE)?;

        let attributes = vec![
            Attribute::new(source_file, AttributeInfo::Raw(value.to_be_bytes().to_vec())),
            Attribute::new(signature, AttributeInfo::Signature(value)),
        ];
        let mut bytes = Vec::new();
        write_attributes(&mut bytes, &attributes)?;

        let parsed = read_attributes(&mut ByteReader::new(&bytes), &pool, ReaderFlags::SKIP_DEBUG)?;
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name(&pool)?, SIGNATURE);
        Ok(())
    }
}
