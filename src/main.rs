use anyhow::{Context, Result};
use clap::Parser;
use class_remapper::archive::{RemapReport, deobfuscate};
use class_remapper::cli::{Cli, Commands, OutputFormat};
use class_remapper::config::{
    load_mappings, normalize_class_name, resolve_mappings_path, resolve_output_path, write_output,
};
use class_remapper::mapper::{ClassNameMapper, Direction};
use class_remapper::mapping::MappingStats;
use serde::Serialize;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command.clone() {
        Commands::Remap {
            input,
            output,
            reverse,
            classpath,
            format,
            report: report_path,
        } => {
            let mappings = resolve_mappings_path(&cli)?;
            let table = load_mappings(&mappings, reverse)?;
            let output = resolve_output_path(&input, output.as_deref(), reverse);
            eprintln!(
                "[class-remapper] {} -> {} ({} mapped classes)",
                input.display(),
                output.display(),
                table.len()
            );
            let report = deobfuscate(&input, &output, &table, &classpath)
                .with_context(|| format!("Failed to remap jar: {}", input.display()))?;
            write_report(&report, format, report_path.as_deref())?;
        }
        Commands::Mappings => {
            let mappings = resolve_mappings_path(&cli)?;
            let table = load_mappings(&mappings, false)?;
            let output = MappingsResult {
                path: mappings.to_string_lossy().to_string(),
                stats: table.stats(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Map { name, reverse } => {
            let mappings = resolve_mappings_path(&cli)?;
            let table = load_mappings(&mappings, false)?;
            let names = ClassNameMapper::new(&table);
            let name = normalize_class_name(&name);
            let direction = if reverse { Direction::Unmap } else { Direction::Map };
            let mapped = names.translate(&name, direction);
            let output = MapResult {
                changed: mapped != name,
                name,
                mapped,
                reverse,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct MappingsResult {
    path: String,
    #[serde(flatten)]
    stats: MappingStats,
}

#[derive(Debug, Serialize)]
struct MapResult {
    name: String,
    mapped: String,
    changed: bool,
    reverse: bool,
}

fn write_report(report: &RemapReport, format: OutputFormat, path: Option<&Path>) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!("input: {}\n", report.input));
            out.push_str(&format!("output: {}\n", report.output));
            out.push_str(&format!(
                "classes: {} ({} transformed, {} relocated)\n",
                report.archive.classes,
                report.archive.classes_transformed,
                report.archive.classes_relocated
            ));
            out.push_str(&format!("resources: {}\n", report.archive.resources));
            out.push_str(&format!(
                "renamed: {} classes, {} methods, {} fields, {} references\n",
                report.remap.classes_renamed,
                report.remap.methods_renamed,
                report.remap.fields_renamed,
                report.remap.references_renamed
            ));
            out.push_str(&format!("access_patched: {}\n", report.access_patched));
            out.push_str(&format!(
                "hierarchy: {} fetches, {} unresolved\n",
                report.resolver.fetches, report.resolver.unresolved_owners
            ));
            out.push_str(&format!("duration_ms: {}\n", report.duration_ms));
            out.push_str(&format!("sha256: {}\n", report.sha256));
            out
        }
    };
    write_output(&content, path)
}
