//! Per-class composition of streaming and tree transformers.

use std::sync::Arc;

use log::debug;

use crate::classfile::{ClassNode, ClassReader, ClassVisitor, ClassWriter, ReaderFlags, WriterFlags};
use crate::error::{Error, Result};
use crate::mapper::Mapper;

/// A single-pass stage. `visitor` is called once per class the transformer
/// applies to and the returned visitor sees every event of that class.
pub trait StreamingTransformer {
    fn applies_to(&self, _name: &str, _transformed_name: &str) -> bool {
        true
    }

    fn reader_flags(&self) -> ReaderFlags {
        ReaderFlags::empty()
    }

    fn writer_flags(&self) -> WriterFlags {
        WriterFlags::empty()
    }

    fn visitor<'s>(
        &'s mut self,
        name: &str,
        transformed_name: &str,
    ) -> Result<Box<dyn ClassVisitor + 's>>;
}

impl<T: StreamingTransformer + ?Sized> StreamingTransformer for &mut T {
    fn applies_to(&self, name: &str, transformed_name: &str) -> bool {
        (**self).applies_to(name, transformed_name)
    }

    fn reader_flags(&self) -> ReaderFlags {
        (**self).reader_flags()
    }

    fn writer_flags(&self) -> WriterFlags {
        (**self).writer_flags()
    }

    fn visitor<'s>(
        &'s mut self,
        name: &str,
        transformed_name: &str,
    ) -> Result<Box<dyn ClassVisitor + 's>> {
        (**self).visitor(name, transformed_name)
    }
}

/// A stage that needs the whole class at once.
pub trait TreeTransformer {
    fn applies_to(&self, _name: &str, _transformed_name: &str) -> bool {
        true
    }

    fn reader_flags(&self) -> ReaderFlags {
        ReaderFlags::empty()
    }

    fn writer_flags(&self) -> WriterFlags {
        WriterFlags::empty()
    }

    fn transform(&mut self, name: &str, transformed_name: &str, node: ClassNode)
    -> Result<ClassNode>;
}

pub enum Transformer<'a> {
    Streaming(Box<dyn StreamingTransformer + 'a>),
    Tree(Box<dyn TreeTransformer + 'a>),
}

impl Transformer<'_> {
    fn applies_to(&self, name: &str, transformed_name: &str) -> bool {
        match self {
            Transformer::Streaming(t) => t.applies_to(name, transformed_name),
            Transformer::Tree(t) => t.applies_to(name, transformed_name),
        }
    }

    fn flags(&self) -> (ReaderFlags, WriterFlags) {
        match self {
            Transformer::Streaming(t) => (t.reader_flags(), t.writer_flags()),
            Transformer::Tree(t) => (t.reader_flags(), t.writer_flags()),
        }
    }
}

/// Result of running one class through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedClass {
    /// Internal name the class had on input.
    pub original_name: String,
    /// Internal name of the class in `bytes`.
    pub name: String,
    pub bytes: Vec<u8>,
    /// False when no transformer applied and `bytes` is the input.
    pub transformed: bool,
    pub reader_flags: ReaderFlags,
    pub writer_flags: WriterFlags,
}

#[derive(Default)]
pub struct Pipeline<'a> {
    transformers: Vec<Transformer<'a>>,
    renamer: Option<Arc<Mapper>>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the class renamer used to compute the transformed name each
    /// transformer is asked about.
    pub fn with_renamer(mut self, mapper: Arc<Mapper>) -> Self {
        self.renamer = Some(mapper);
        self
    }

    pub fn register(&mut self, transformer: Transformer<'a>) {
        self.transformers.push(transformer);
    }

    pub fn streaming(mut self, transformer: impl StreamingTransformer + 'a) -> Self {
        self.register(Transformer::Streaming(Box::new(transformer)));
        self
    }

    pub fn tree(mut self, transformer: impl TreeTransformer + 'a) -> Self {
        self.register(Transformer::Tree(Box::new(transformer)));
        self
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    pub fn transformed_name(&self, name: &str) -> String {
        match &self.renamer {
            Some(mapper) => mapper.classes.map(name),
            None => name.to_string(),
        }
    }

    pub fn transform(&mut self, bytes: Vec<u8>) -> Result<TransformedClass> {
        let reader = ClassReader::new(bytes)?;
        let name = reader.class_name()?;
        let transformed_name = self.transformed_name(&name);

        let applicable: Vec<bool> = self
            .transformers
            .iter()
            .map(|t| t.applies_to(&name, &transformed_name))
            .collect();

        if !applicable.contains(&true) {
            debug!("{name}: no applicable transformer, copying");
            return Ok(TransformedClass {
                original_name: name.clone(),
                name,
                bytes: reader.into_bytes(),
                transformed: false,
                reader_flags: ReaderFlags::empty(),
                writer_flags: WriterFlags::empty(),
            });
        }

        let mut reader_flags = ReaderFlags::empty();
        let mut writer_flags = WriterFlags::empty();
        let mut needs_tree = false;
        for (transformer, _) in self.transformers.iter().zip(&applicable).filter(|(_, a)| **a) {
            let (r, w) = transformer.flags();
            reader_flags |= r;
            writer_flags |= w;
            needs_tree |= matches!(transformer, Transformer::Tree(_));
        }

        let mut writer = ClassWriter::new(writer_flags);
        if needs_tree {
            debug!("{name}: tree pass ({reader_flags:?}, {writer_flags:?})");
            let mut node = {
                let mut stages = streaming_stages(
                    &mut self.transformers,
                    &applicable,
                    &name,
                    &transformed_name,
                )?;
                ClassNode::read(&reader, &mut stages, reader_flags)?
            };
            for (transformer, _) in self
                .transformers
                .iter_mut()
                .zip(&applicable)
                .filter(|(_, a)| **a)
            {
                if let Transformer::Tree(tree) = transformer {
                    node = tree.transform(&name, &transformed_name, node)?;
                }
            }
            node.accept(&mut [], &mut writer)?;
        } else {
            debug!("{name}: streaming pass ({reader_flags:?}, {writer_flags:?})");
            let mut stages = streaming_stages(
                &mut self.transformers,
                &applicable,
                &name,
                &transformed_name,
            )?;
            reader.accept(&mut stages, &mut writer, reader_flags)?;
        }

        let out_name = writer
            .class_name()
            .map(str::to_string)
            .ok_or_else(|| Error::class_format(format!("{name}: writer produced no class")))?;
        let writer_flags = writer.flags();
        let bytes = writer.into_bytes()?;

        Ok(TransformedClass {
            original_name: name,
            name: out_name,
            bytes,
            transformed: true,
            reader_flags,
            writer_flags,
        })
    }
}

fn streaming_stages<'s>(
    transformers: &'s mut [Transformer<'_>],
    applicable: &[bool],
    name: &str,
    transformed_name: &str,
) -> Result<Vec<Box<dyn ClassVisitor + 's>>> {
    let mut stages = Vec::new();
    for (transformer, _) in transformers.iter_mut().zip(applicable).filter(|(_, a)| **a) {
        if let Transformer::Streaming(streaming) = transformer {
            stages.push(streaming.visitor(name, transformed_name)?);
        }
    }
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{AccessFlags, ClassHeader, ConstantPool, MemberInfo};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        label: &'static str,
        log: Log,
        only: Option<&'static str>,
        flags: ReaderFlags,
    }

    struct RecordingVisitor<'a> {
        label: &'static str,
        log: &'a Log,
    }

    impl ClassVisitor for RecordingVisitor<'_> {
        fn visit(&mut self, _pool: &mut ConstantPool, _header: &mut ClassHeader) -> Result<()> {
            self.log.borrow_mut().push(format!("{}:visit", self.label));
            Ok(())
        }

        fn visit_method(&mut self, pool: &mut ConstantPool, method: &mut MemberInfo) -> Result<()> {
            let name = method.name(pool)?;
            self.log.borrow_mut().push(format!("{}:{name}", self.label));
            Ok(())
        }
    }

    impl StreamingTransformer for Recorder {
        fn applies_to(&self, name: &str, _transformed_name: &str) -> bool {
            self.only.is_none_or(|only| only == name)
        }

        fn reader_flags(&self) -> ReaderFlags {
            self.flags
        }

        fn visitor<'s>(&'s mut self, _: &str, _: &str) -> Result<Box<dyn ClassVisitor + 's>> {
            Ok(Box::new(RecordingVisitor {
                label: self.label,
                log: &self.log,
            }))
        }
    }

    struct AddMethod {
        log: Log,
    }

    impl TreeTransformer for AddMethod {
        fn writer_flags(&self) -> WriterFlags {
            WriterFlags::COMPUTE_MAXS
        }

        fn transform(&mut self, _: &str, _: &str, mut node: ClassNode) -> Result<ClassNode> {
            self.log.borrow_mut().push(format!("tree:{}", node.methods.len()));
            node.add_method(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "added", "()V")?;
            Ok(node)
        }
    }

    struct RequestFrames;

    impl TreeTransformer for RequestFrames {
        fn writer_flags(&self) -> WriterFlags {
            WriterFlags::COMPUTE_FRAMES
        }

        fn transform(&mut self, _: &str, _: &str, node: ClassNode) -> Result<ClassNode> {
            Ok(node)
        }
    }

    fn class_bytes() -> Result<Vec<u8>> {
        let mut node = ClassNode::new("a/B", Some("java/lang/Object"), &[])?;
        node.add_method_with_code(AccessFlags::PUBLIC, "foo", "()V", 0, 1, vec![0xb1])?;
        node.to_bytes()
    }

    #[test]
    fn no_applicable_transformer_returns_input_bytes() -> Result<()> {
        let log = Log::default();
        let bytes = class_bytes()?;
        let mut pipeline = Pipeline::new().streaming(Recorder {
            label: "s",
            log: log.clone(),
            only: Some("other/Class"),
            flags: ReaderFlags::SKIP_DEBUG,
        });

        let out = pipeline.transform(bytes.clone())?;
        assert!(!out.transformed);
        assert_eq!(out.bytes, bytes);
        assert_eq!(out.name, "a/B");
        assert_eq!(out.reader_flags, ReaderFlags::empty());
        assert!(log.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn streaming_stages_run_in_registration_order() -> Result<()> {
        let log = Log::default();
        let mut pipeline = Pipeline::new()
            .streaming(Recorder {
                label: "first",
                log: log.clone(),
                only: None,
                flags: ReaderFlags::EXPAND_FRAMES,
            })
            .streaming(Recorder {
                label: "second",
                log: log.clone(),
                only: None,
                flags: ReaderFlags::empty(),
            });

        let out = pipeline.transform(class_bytes()?)?;
        assert!(out.transformed);
        assert_eq!(out.reader_flags, ReaderFlags::EXPAND_FRAMES);
        assert_eq!(
            *log.borrow(),
            vec!["first:visit", "second:visit", "first:foo", "second:foo"]
        );
        Ok(())
    }

    #[test]
    fn tree_transformer_sees_streaming_output_and_aggregates_flags() -> Result<()> {
        let log = Log::default();
        let mut pipeline = Pipeline::new()
            .tree(AddMethod { log: log.clone() })
            .streaming(Recorder {
                label: "s",
                log: log.clone(),
                only: None,
                flags: ReaderFlags::SKIP_DEBUG,
            });

        let out = pipeline.transform(class_bytes()?)?;
        assert_eq!(out.reader_flags, ReaderFlags::SKIP_DEBUG);
        assert_eq!(out.writer_flags, WriterFlags::COMPUTE_MAXS);
        assert_eq!(*log.borrow(), vec!["s:visit", "s:foo", "tree:1"]);

        let node = ClassNode::parse(out.bytes)?;
        assert!(node.find_method("added", "()V")?.is_some());
        Ok(())
    }

    #[test]
    fn tree_path_writes_with_every_requested_writer_flag() -> Result<()> {
        let log = Log::default();
        let bytes = class_bytes()?;
        let mut pipeline = Pipeline::new()
            .tree(AddMethod { log: log.clone() })
            .tree(RequestFrames);

        let out = pipeline.transform(bytes)?;
        assert_eq!(
            out.writer_flags,
            WriterFlags::COMPUTE_MAXS | WriterFlags::COMPUTE_FRAMES
        );
        assert_eq!(*log.borrow(), vec!["tree:1"]);

        let node = ClassNode::parse(out.bytes)?;
        assert_eq!(node.method_signatures()?.len(), 2);
        Ok(())
    }
}
