use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::mapping::MappingTable;

pub const MAPPINGS_ENV: &str = "CLASS_REMAPPER_MAPPINGS";
pub const DEFAULT_MAPPINGS_FILE: &str = "mappings.json";

pub fn resolve_mappings_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.mappings.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var(MAPPINGS_ENV) {
        if !p.is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let default_path = PathBuf::from(DEFAULT_MAPPINGS_FILE);
    if default_path.exists() {
        return Ok(default_path);
    }

    anyhow::bail!("No mapping file: pass --mappings FILE or set {MAPPINGS_ENV}")
}

/// Loads the mapping file, inverted when `reverse` is set.
pub fn load_mappings(path: &Path, reverse: bool) -> Result<MappingTable> {
    let table = MappingTable::load(path)
        .with_context(|| format!("Failed to load mapping file: {}", path.display()))?;
    if !reverse {
        return Ok(table);
    }
    table
        .inverted()
        .with_context(|| format!("Failed to invert mapping file: {}", path.display()))
}

/// `<stem>-deobf.jar` (or `-reobf.jar`) next to the input unless an output
/// was given.
pub fn resolve_output_path(input: &Path, output: Option<&Path>, reverse: bool) -> PathBuf {
    if let Some(p) = output {
        return p.to_path_buf();
    }

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output");
    let suffix = if reverse { "reobf" } else { "deobf" };
    let extension = input
        .extension()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("jar");
    let file_name = format!("{stem}-{suffix}.{extension}");

    match input.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Accepts `com.example.Foo` as well as `com/example/Foo`.
pub fn normalize_class_name(raw: &str) -> String {
    let s = raw.trim().trim_end_matches(".class");
    s.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '.' { '/' } else { c })
        .collect()
}

pub fn write_output(content: &str, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write output: {}", path.display()))?;
    } else {
        print!("{content}");
        if !content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_the_input() {
        let input = Path::new("/tmp/libs/game.jar");
        assert_eq!(
            resolve_output_path(input, None, false),
            PathBuf::from("/tmp/libs/game-deobf.jar")
        );
        assert_eq!(
            resolve_output_path(input, None, true),
            PathBuf::from("/tmp/libs/game-reobf.jar")
        );
        assert_eq!(
            resolve_output_path(input, Some(Path::new("out.jar")), false),
            PathBuf::from("out.jar")
        );
    }

    #[test]
    fn normalizes_binary_and_source_names() {
        assert_eq!(normalize_class_name("com.example.Foo"), "com/example/Foo");
        assert_eq!(normalize_class_name(" a/B$c.class "), "a/B$c");
    }
}
