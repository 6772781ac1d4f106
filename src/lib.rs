//! # class-remapper
//!
//! Renames classes, methods and fields inside compiled Java archives using a
//! JSON mapping table, and applies access patches along the way.
//!
//! ## Architecture
//!
//! - **classfile**: Class file codec with a streaming visitor chain and a tree model
//! - **mapping**: The mapping file format and its validation
//! - **mapper**: Class name translation and the lookup rows derived from a mapping
//! - **provider**: Class lookup in jars, directories and classpaths
//! - **resolver**: Inheritance-aware member renaming with per-run caches
//! - **remap**: The renaming stage
//! - **access**: Visibility and `final` patches
//! - **pipeline**: Per-class composition of streaming and tree transformers
//! - **archive**: Jar-to-jar driver and run report
//! - **config**: Path resolution for the command line tool

pub mod access;
pub mod archive;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod error;
pub mod mapper;
pub mod mapping;
pub mod pipeline;
pub mod provider;
pub mod remap;
pub mod resolver;

pub use archive::{RemapReport, deobfuscate, remap_archive};
pub use error::{Error, Result};
pub use mapper::{ClassNameMapper, Direction, Mapper};
pub use mapping::{MappedClass, MappingTable};
pub use pipeline::{Pipeline, StreamingTransformer, Transformer, TreeTransformer};
