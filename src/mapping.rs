//! The mapping file: a JSON object keyed by source internal name.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::access::AccessTransform;
use crate::error::{Error, Result};
use crate::mapper::{ClassNameMapper, Direction};

/// Renames and access patches for one class.
///
/// `methods` is keyed by target name plus descriptor (`b()V`) and `fields` by
/// target name, `:` and descriptor (`c:I`); both map to the source name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MappedClass {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub methods: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub access: BTreeMap<String, AccessTransform>,
}

impl MappedClass {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn method(mut self, target: &str, descriptor: &str, source: &str) -> Self {
        self.methods
            .insert(format!("{target}{descriptor}"), source.to_string());
        self
    }

    pub fn field(mut self, target: &str, descriptor: &str, source: &str) -> Self {
        self.fields
            .insert(format!("{target}:{descriptor}"), source.to_string());
        self
    }

    pub fn access(mut self, key: &str, transform: AccessTransform) -> Self {
        self.access.insert(key.to_string(), transform);
        self
    }
}

/// Splits `name(desc)ret` into name and descriptor.
pub fn split_method_key(key: &str) -> Option<(&str, &str)> {
    key.find('(').map(|pos| key.split_at(pos))
}

/// Splits `name:desc` into name and descriptor.
pub fn split_field_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(':')
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingStats {
    pub classes: usize,
    pub renamed_classes: usize,
    pub methods: usize,
    pub fields: usize,
    pub access_transforms: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingTable {
    classes: BTreeMap<String, MappedClass>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(json: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(json)
            .map_err(|e| Error::malformed_mapping(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    pub fn read_from(reader: impl Read) -> Result<Self> {
        let table: Self = serde_json::from_reader(reader)
            .map_err(|e| Error::malformed_mapping(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file))
    }

    pub fn write(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::malformed_mapping(e.to_string()))
    }

    pub fn write_to(&self, writer: impl Write) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| Error::malformed_mapping(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (source, class) in &self.classes {
            if source.is_empty() {
                return Err(Error::malformed_mapping("empty class name key"));
            }
            if let Some(key) = class.methods.keys().find(|k| split_method_key(k).is_none()) {
                return Err(Error::malformed_mapping(format!(
                    "{source}: method key {key:?} has no descriptor"
                )));
            }
            if let Some(key) = class.fields.keys().find(|k| split_field_key(k).is_none()) {
                return Err(Error::malformed_mapping(format!(
                    "{source}: field key {key:?} has no descriptor"
                )));
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, source: impl Into<String>, class: MappedClass) -> Option<MappedClass> {
        self.classes.insert(source.into(), class)
    }

    pub fn get(&self, source: &str) -> Option<&MappedClass> {
        self.classes.get(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappedClass)> {
        self.classes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn stats(&self) -> MappingStats {
        let mut stats = MappingStats {
            classes: self.classes.len(),
            ..MappingStats::default()
        };
        for class in self.classes.values() {
            if !class.name.is_empty() {
                stats.renamed_classes += 1;
            }
            stats.methods += class.methods.len();
            stats.fields += class.fields.len();
            stats.access_transforms += class.access.len();
        }
        stats
    }

    /// The same renames seen from the other side: target names become keys
    /// and member keys are rewritten into the source namespace. Access rows
    /// only make sense against source names and are dropped.
    pub fn inverted(&self) -> Result<Self> {
        let names = ClassNameMapper::new(self);
        let mut inverted = Self::new();

        for (source, class) in &self.classes {
            let key = if class.name.is_empty() {
                source.clone()
            } else {
                class.name.clone()
            };
            let mut record = MappedClass::named(source.clone());

            for (target_key, source_name) in &class.methods {
                let (target_name, descriptor) = split_method_key(target_key)
                    .ok_or_else(|| Error::malformed_mapping(target_key.clone()))?;
                let descriptor = names.map_method_desc(descriptor, Direction::Map)?;
                record
                    .methods
                    .insert(format!("{source_name}{descriptor}"), target_name.to_string());
            }
            for (target_key, source_name) in &class.fields {
                let (target_name, descriptor) = split_field_key(target_key)
                    .ok_or_else(|| Error::malformed_mapping(target_key.clone()))?;
                let descriptor = names.map_desc(descriptor, Direction::Map)?;
                record
                    .fields
                    .insert(format!("{source_name}:{descriptor}"), target_name.to_string());
            }

            // A class without a target name keeps no rename after inversion.
            if class.name.is_empty() {
                record.name.clear();
            }
            inverted.classes.insert(key, record);
        }
        Ok(inverted)
    }
}
