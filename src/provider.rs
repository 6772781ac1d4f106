use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use log::debug;
use memmap2::Mmap;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::classfile::ClassReader;
use crate::error::Result;

/// Source of classes for hierarchy lookups.
///
/// `Ok(None)` means the class is not there; `Err` is reserved for I/O and
/// format failures.
pub trait ClassProvider {
    fn get_class(&mut self, internal_name: &str) -> Result<Option<ClassReader>>;
}

impl<P: ClassProvider + ?Sized> ClassProvider for Box<P> {
    fn get_class(&mut self, internal_name: &str) -> Result<Option<ClassReader>> {
        (**self).get_class(internal_name)
    }
}

/// Classes inside a jar, read through a read-only memory map.
pub struct ZipClassProvider {
    path: PathBuf,
    archive: ZipArchive<Cursor<Mmap>>,
}

impl ZipClassProvider {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // The map is only read; the input is not modified while a run holds it.
        let mmap = unsafe { Mmap::map(&file)? };
        let archive = ZipArchive::new(Cursor::new(mmap))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ClassProvider for ZipClassProvider {
    fn get_class(&mut self, internal_name: &str) -> Result<Option<ClassReader>> {
        let entry_name = format!("{internal_name}.class");
        let mut entry = match self.archive.by_name(&entry_name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        ClassReader::new(bytes).map(Some)
    }
}

/// Classes laid out as `<root>/<internal name>.class`.
pub struct DirectoryClassProvider {
    root: PathBuf,
}

impl DirectoryClassProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ClassProvider for DirectoryClassProvider {
    fn get_class(&mut self, internal_name: &str) -> Result<Option<ClassReader>> {
        let path = self.root.join(format!("{internal_name}.class"));
        match std::fs::read(&path) {
            Ok(bytes) => ClassReader::new(bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Ordered list of providers; the first one that has the class wins.
#[derive(Default)]
pub struct ClasspathProvider {
    entries: Vec<Box<dyn ClassProvider>>,
}

impl ClasspathProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, provider: Box<dyn ClassProvider>) {
        self.entries.push(provider);
    }

    /// Adds a jar or a class directory.
    pub fn push_path(&mut self, path: &Path) -> Result<()> {
        debug!("classpath entry {}", path.display());
        if path.is_dir() {
            self.push(Box::new(DirectoryClassProvider::new(path)));
        } else {
            self.push(Box::new(ZipClassProvider::open(path)?));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ClassProvider for ClasspathProvider {
    fn get_class(&mut self, internal_name: &str) -> Result<Option<ClassReader>> {
        for provider in &mut self.entries {
            if let Some(class) = provider.get_class(internal_name)? {
                return Ok(Some(class));
            }
        }
        Ok(None)
    }
}

/// In-memory classes, counting every request.
#[derive(Debug, Clone, Default)]
pub struct MemoryClassProvider {
    classes: HashMap<String, Vec<u8>>,
    requests: HashMap<String, usize>,
}

impl MemoryClassProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bytes` under the class name found in them.
    pub fn insert(&mut self, bytes: Vec<u8>) -> Result<String> {
        let name = ClassReader::new(bytes.clone())?.class_name()?;
        self.classes.insert(name.clone(), bytes);
        Ok(name)
    }

    /// Registers `bytes` under `internal_name` as is. They are only parsed
    /// when requested.
    pub fn insert_bytes(&mut self, internal_name: &str, bytes: Vec<u8>) {
        self.classes.insert(internal_name.to_string(), bytes);
    }

    pub fn requests(&self, internal_name: &str) -> usize {
        self.requests.get(internal_name).copied().unwrap_or(0)
    }
}

impl ClassProvider for MemoryClassProvider {
    fn get_class(&mut self, internal_name: &str) -> Result<Option<ClassReader>> {
        *self.requests.entry(internal_name.to_string()).or_default() += 1;
        match self.classes.get(internal_name) {
            Some(bytes) => ClassReader::new(bytes.clone()).map(Some),
            None => Ok(None),
        }
    }
}
