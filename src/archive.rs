//! Whole-archive remapping.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use memmap2::Mmap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use zip::read::ZipFile;
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

use crate::access::AccessPatcher;
use crate::error::{Error, Result};
use crate::mapper::Mapper;
use crate::mapping::MappingTable;
use crate::pipeline::Pipeline;
use crate::provider::{ClasspathProvider, ZipClassProvider};
use crate::remap::{RemapStats, RemapTransformer};
use crate::resolver::{HierarchyCache, MemberResolver, ResolverStats};

/// Entry counts of one archive pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub classes: usize,
    pub classes_transformed: usize,
    pub classes_unchanged: usize,
    /// Classes written under a different entry name than they were read from.
    pub classes_relocated: usize,
    /// Directories and non-class entries, copied without recompression.
    pub resources: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemapReport {
    pub input: String,
    pub output: String,
    #[serde(flatten)]
    pub archive: ArchiveSummary,
    pub remap: RemapStats,
    pub access_patched: usize,
    pub resolver: ResolverStats,
    pub duration_ms: u64,
    pub sha256: String,
}

/// Remaps `input` with `table` into `output`.
///
/// Supertypes are looked up in the input itself, then in `classpath` (jars
/// or class directories) in order.
pub fn deobfuscate(
    input: &Path,
    output: &Path,
    table: &MappingTable,
    classpath: &[PathBuf],
) -> Result<RemapReport> {
    let start = Instant::now();
    let mapper = Arc::new(Mapper::new(table));

    let mut provider = ClasspathProvider::new();
    provider.push(Box::new(ZipClassProvider::open(input)?));
    for path in classpath {
        provider.push_path(path)?;
    }

    let resolver = MemberResolver::new(Arc::clone(&mapper), provider, HierarchyCache::default());
    let mut remap = RemapTransformer::new(resolver);
    let mut access = AccessPatcher::new(Arc::clone(&mapper));
    let archive = {
        let mut pipeline = Pipeline::new()
            .with_renamer(Arc::clone(&mapper))
            .streaming(&mut remap)
            .streaming(&mut access);
        remap_archive(&mut pipeline, input, output)?
    };

    let report = RemapReport {
        input: input.to_string_lossy().to_string(),
        output: output.to_string_lossy().to_string(),
        archive,
        remap: remap.stats(),
        access_patched: access.patched(),
        resolver: remap.resolver().stats(),
        duration_ms: start.elapsed().as_millis() as u64,
        sha256: sha256_file(output)?,
    };
    info!(
        "remapped {} classes ({} renamed) in {} ms",
        report.archive.classes, report.remap.classes_renamed, report.duration_ms
    );
    Ok(report)
}

/// Runs every class entry of `input` through `pipeline` and writes the
/// result to `output`. Nothing is published at `output` unless the whole
/// archive was written.
pub fn remap_archive(
    pipeline: &mut Pipeline<'_>,
    input: &Path,
    output: &Path,
) -> Result<ArchiveSummary> {
    let file = File::open(input)?;
    // SAFETY: the input is opened read-only and outlives the map.
    let mmap = unsafe { Mmap::map(&file)? };
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_output_path(output);
    let published = write_archive(pipeline, &mut archive, &tmp)
        .and_then(|summary| std::fs::rename(&tmp, output).map(|_| summary).map_err(Error::from));
    if published.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    published
}

pub fn temp_output_path(output: &Path) -> PathBuf {
    let mut tmp = output.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn write_archive<R: Read + Seek>(
    pipeline: &mut Pipeline<'_>,
    archive: &mut ZipArchive<R>,
    path: &Path,
) -> Result<ArchiveSummary> {
    let mut writer = ZipWriter::new(BufWriter::new(File::create(path)?));
    let mut summary = ArchiveSummary::default();
    let mut written = HashSet::new();

    for index in 0..archive.len() {
        summary.entries += 1;
        let (name, is_class) = {
            let entry = archive.by_index_raw(index)?;
            let name = entry.name().to_string();
            let is_class = !entry.is_dir() && name.ends_with(".class");
            (name, is_class)
        };

        if !is_class {
            writer.raw_copy_file(archive.by_index_raw(index)?)?;
            written.insert(name);
            summary.resources += 1;
            continue;
        }

        let (bytes, options) = {
            let mut entry = archive.by_index(index)?;
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            (bytes, entry_options(&entry))
        };
        let class = pipeline.transform(bytes).map_err(|e| e.in_entry(&name))?;

        summary.classes += 1;
        if class.transformed {
            summary.classes_transformed += 1;
        } else {
            summary.classes_unchanged += 1;
        }

        let out_name = relocated_entry_name(&name, &class.name);
        if out_name != name {
            debug!("{name} -> {out_name}");
            summary.classes_relocated += 1;
        }
        if !written.insert(out_name.clone()) {
            return Err(Error::unsupported(format!(
                "two entries are written as {out_name}"
            ))
            .in_entry(&name));
        }

        writer.start_file(out_name, options)?;
        writer.write_all(&class.bytes)?;
    }

    writer.finish()?.flush()?;
    Ok(summary)
}

/// Keeps the compression method and timestamp of the source entry. Methods
/// this build cannot write fall back to deflate.
fn entry_options(entry: &ZipFile<'_>) -> FileOptions {
    let method = match entry.compression() {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    };
    let mut options = FileOptions::default()
        .compression_method(method)
        .last_modified_time(entry.last_modified());
    if let Some(mode) = entry.unix_mode() {
        options = options.unix_permissions(mode);
    }
    options
}

/// Entry name for a class now called `renamed`. Classes are written under
/// their internal name; only a multi-release `META-INF/versions/<n>/` prefix
/// survives.
fn relocated_entry_name(entry: &str, renamed: &str) -> String {
    let prefix = multi_release_prefix(entry).unwrap_or("");
    format!("{prefix}{renamed}.class")
}

fn multi_release_prefix(entry: &str) -> Option<&str> {
    const VERSIONS: &str = "META-INF/versions/";
    let rest = entry.strip_prefix(VERSIONS)?;
    let (version, _) = rest.split_once('/')?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(&entry[..VERSIONS.len() + version.len() + 1])
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{AccessFlags, ClassNode};
    use crate::mapping::MappedClass;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_remapper_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options)?;
            } else {
                zip.start_file(*name, options)?;
                zip.write_all(content)?;
            }
        }
        zip.finish()?;
        Ok(())
    }

    fn read_jar(path: &Path) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
        let mut archive = ZipArchive::new(File::open(path)?)?;
        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            entries.push((entry.name().to_string(), bytes));
        }
        Ok(entries)
    }

    fn class_b() -> anyhow::Result<Vec<u8>> {
        let mut node = ClassNode::new("a/B", Some("java/lang/Object"), &[])?;
        node.add_method_with_code(AccessFlags::PUBLIC, "foo", "()V", 0, 1, vec![0xb1])?;
        Ok(node.to_bytes()?)
    }

    #[test]
    fn empty_pipeline_copies_every_entry() -> anyhow::Result<()> {
        let input = temp_path("copy_in.jar");
        let output = temp_path("copy_out.jar");
        let class = class_b()?;
        write_jar(
            &input,
            &[
                ("META-INF/", b""),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
                ("a/B.class", &class),
            ],
        )?;

        let summary = remap_archive(&mut Pipeline::new(), &input, &output)?;
        assert_eq!(summary.entries, 3);
        assert_eq!(summary.resources, 2);
        assert_eq!(summary.classes_unchanged, 1);
        assert_eq!(read_jar(&output)?, read_jar(&input)?);
        assert!(!temp_output_path(&output).exists());

        let _ = std::fs::remove_file(&input);
        let _ = std::fs::remove_file(&output);
        Ok(())
    }

    #[test]
    fn deobfuscate_renames_and_relocates_classes() -> anyhow::Result<()> {
        let input = temp_path("deobf_in.jar");
        let output = temp_path("deobf_out.jar");
        write_jar(
            &input,
            &[("README.txt", b"hello"), ("a/B.class", &class_b()?)],
        )?;

        let mut table = MappingTable::new();
        table.insert("x/Y", MappedClass::named("a/B").method("foo", "()V", "bar"));

        let report = deobfuscate(&input, &output, &table, &[])?;
        assert_eq!(report.archive.classes_relocated, 1);
        assert_eq!(report.remap.methods_renamed, 1);
        assert_eq!(report.sha256, sha256_file(&output)?);

        let entries = read_jar(&output)?;
        assert_eq!(entries[0], ("README.txt".to_string(), b"hello".to_vec()));
        assert_eq!(entries[1].0, "x/Y.class");
        let node = ClassNode::parse(entries[1].1.clone())?;
        assert_eq!(node.name()?, "x/Y");
        assert!(node.find_method("bar", "()V")?.is_some());
        assert!(node.find_method("foo", "()V")?.is_none());

        let _ = std::fs::remove_file(&input);
        let _ = std::fs::remove_file(&output);
        Ok(())
    }

    #[test]
    fn failed_run_publishes_nothing() -> anyhow::Result<()> {
        let input = temp_path("broken_in.jar");
        let output = temp_path("broken_out.jar");
        write_jar(&input, &[("a/B.class", b"\xca\xfe\xba\xbe truncated")])?;

        let err = deobfuscate(&input, &output, &MappingTable::new(), &[]).unwrap_err();
        assert!(matches!(err, Error::Entry { ref entry, .. } if entry == "a/B.class"));
        assert!(!output.exists());
        assert!(!temp_output_path(&output).exists());

        let _ = std::fs::remove_file(&input);
        Ok(())
    }

    #[test]
    fn classes_land_under_their_new_internal_name() {
        assert_eq!(relocated_entry_name("a/B.class", "x/Y"), "x/Y.class");
        assert_eq!(relocated_entry_name("xa/B.class", "x/Y"), "x/Y.class");
        assert_eq!(
            relocated_entry_name("BOOT-INF/classes/a/B.class", "x/Y"),
            "x/Y.class"
        );
        assert_eq!(relocated_entry_name("odd.class", "x/Y"), "x/Y.class");
    }

    #[test]
    fn multi_release_prefix_is_kept() {
        assert_eq!(
            relocated_entry_name("META-INF/versions/9/a/B.class", "x/Y"),
            "META-INF/versions/9/x/Y.class"
        );
        assert_eq!(
            relocated_entry_name("META-INF/versions/nine/a/B.class", "x/Y"),
            "x/Y.class"
        );
        assert_eq!(relocated_entry_name("META-INF/versions//a/B.class", "x/Y"), "x/Y.class");
    }
}
