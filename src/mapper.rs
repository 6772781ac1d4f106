//! Lookups derived from a [`MappingTable`], built once per run.

use std::collections::{BTreeMap, HashMap};

use crate::access::AccessTransform;
use crate::classfile::descriptor;
use crate::error::Result;
use crate::mapping::MappingTable;

/// Which way a name is translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Target (obfuscated) to source.
    Map,
    /// Source to target.
    Unmap,
}

/// Bidirectional class name translation.
///
/// A name with no entry of its own is split at its last `$`; the outer part
/// is translated and the inner suffix reattached, so `a$1` follows `a` even
/// when the anonymous class has no row.
#[derive(Debug, Clone, Default)]
pub struct ClassNameMapper {
    to_source: HashMap<String, String>,
    to_target: HashMap<String, String>,
}

impl ClassNameMapper {
    pub fn new(table: &MappingTable) -> Self {
        let mut mapper = Self::default();
        for (source, class) in table.iter() {
            if !class.name.is_empty() {
                mapper.insert(&class.name, source);
            }
        }
        mapper
    }

    pub fn insert(&mut self, target: &str, source: &str) {
        self.to_source.insert(target.to_string(), source.to_string());
        self.to_target.insert(source.to_string(), target.to_string());
    }

    pub fn len(&self) -> usize {
        self.to_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_source.is_empty()
    }

    pub fn map(&self, name: &str) -> String {
        translate(&self.to_source, name)
    }

    pub fn unmap(&self, name: &str) -> String {
        translate(&self.to_target, name)
    }

    pub fn translate(&self, name: &str, direction: Direction) -> String {
        match direction {
            Direction::Map => self.map(name),
            Direction::Unmap => self.unmap(name),
        }
    }

    pub fn map_type(&self, name: &str, direction: Direction) -> Result<String> {
        descriptor::map_type(name, &|n| self.translate(n, direction))
    }

    pub fn map_desc(&self, desc: &str, direction: Direction) -> Result<String> {
        descriptor::map_field_desc(desc, &|n| self.translate(n, direction))
    }

    pub fn map_method_desc(&self, desc: &str, direction: Direction) -> Result<String> {
        descriptor::map_method_desc(desc, &|n| self.translate(n, direction))
    }

    pub fn map_signature(&self, signature: &str, direction: Direction) -> Result<String> {
        descriptor::map_signature(signature, &|n| self.translate(n, direction))
    }
}

fn translate(table: &HashMap<String, String>, name: &str) -> String {
    if let Some(hit) = table.get(name) {
        return hit.clone();
    }
    match name.rfind('$') {
        Some(pos) => {
            let (outer, inner) = name.split_at(pos);
            format!("{}{inner}", translate(table, outer))
        }
        None => name.to_string(),
    }
}

pub type MemberRow = HashMap<String, String>;
pub type AccessRow = BTreeMap<String, AccessTransform>;

/// Everything the transformers look up, derived from one table.
///
/// Member rows are keyed by the class's target name, the name the class has
/// in the input; access rows by the source name it has after renaming.
#[derive(Debug, Clone, Default)]
pub struct Mapper {
    pub classes: ClassNameMapper,
    methods: HashMap<String, MemberRow>,
    fields: HashMap<String, MemberRow>,
    access: HashMap<String, AccessRow>,
}

impl Mapper {
    pub fn new(table: &MappingTable) -> Self {
        let mut mapper = Self {
            classes: ClassNameMapper::new(table),
            ..Self::default()
        };
        for (source, class) in table.iter() {
            let owner = if class.name.is_empty() {
                source
            } else {
                class.name.as_str()
            };
            if !class.methods.is_empty() {
                mapper.methods.insert(
                    owner.to_string(),
                    class.methods.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                );
            }
            if !class.fields.is_empty() {
                mapper.fields.insert(
                    owner.to_string(),
                    class.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                );
            }
            if !class.access.is_empty() {
                mapper.access.insert(source.to_string(), class.access.clone());
            }
        }
        mapper
    }

    pub fn methods(&self, owner: &str) -> Option<&MemberRow> {
        self.methods.get(owner)
    }

    pub fn fields(&self, owner: &str) -> Option<&MemberRow> {
        self.fields.get(owner)
    }

    pub fn access(&self, source: &str) -> Option<&AccessRow> {
        self.access.get(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappedClass;

    fn table() -> MappingTable {
        let mut table = MappingTable::new();
        table.insert("com/example/Foo", MappedClass::named("a").method("b", "()V", "run"));
        table.insert("com/example/Foo$Inner", MappedClass::named("a$c"));
        table.insert("com/example/Util", MappedClass::default().field("d", "I", "count"));
        table
    }

    #[test]
    fn map_and_unmap_retract_each_other() {
        let names = ClassNameMapper::new(&table());
        for name in ["a", "a$c", "a$c$1", "zz", "java/lang/String"] {
            assert_eq!(names.unmap(&names.map(name)), name);
        }
        assert_eq!(names.map("a"), "com/example/Foo");
        assert_eq!(names.unmap("com/example/Foo$Inner"), "a$c");
    }

    #[test]
    fn nested_names_fall_back_to_the_mapped_outer_class() {
        let mut names = ClassNameMapper::default();
        names.insert("a", "com/example/Foo");
        assert_eq!(names.map("a$b$c"), "com/example/Foo$b$c");
        assert_eq!(names.unmap("com/example/Foo$b$c"), "a$b$c");
        assert_eq!(names.map("b$c"), "b$c");
    }

    #[test]
    fn remaps_descriptors_in_both_directions() -> Result<()> {
        let names = ClassNameMapper::new(&table());
        assert_eq!(
            names.map_method_desc("(La;[La$c;)La;", Direction::Map)?,
            "(Lcom/example/Foo;[Lcom/example/Foo$Inner;)Lcom/example/Foo;"
        );
        assert_eq!(
            names.map_desc("Lcom/example/Foo;", Direction::Unmap)?,
            "La;"
        );
        assert_eq!(names.map_type("[La;", Direction::Map)?, "[Lcom/example/Foo;");
        assert_eq!(
            names.map_signature("Ljava/util/List<La;>;", Direction::Map)?,
            "Ljava/util/List<Lcom/example/Foo;>;"
        );
        Ok(())
    }

    #[test]
    fn rows_are_keyed_by_the_input_name() {
        let mut table = table();
        table.insert(
            "com/example/Foo",
            MappedClass::named("a")
                .method("b", "()V", "run")
                .access("", AccessTransform::default()),
        );
        let mapper = Mapper::new(&table);
        assert_eq!(
            mapper.methods("a").and_then(|row| row.get("b()V")).map(String::as_str),
            Some("run")
        );
        assert!(mapper.methods("com/example/Foo").is_none());
        assert!(mapper.fields("com/example/Util").is_some());
        assert!(mapper.access("com/example/Foo").is_some());
        assert!(mapper.access("a").is_none());
    }
}
