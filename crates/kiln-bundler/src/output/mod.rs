//! Build results and emission.

pub mod writer;

use std::path::Path;

use indexmap::IndexMap;
use kiln_config::BuildMode;

use crate::Result;
use crate::asset::{AssetId, ModuleType};
use crate::diagnostics::Diagnostic;
use crate::graph::{OutputFile, OutputKind};

pub use writer::write_output;

/// What the dev server needs to know about each module to decide between a
/// hot update and a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub module_type: ModuleType,
    /// blake3 of the module's source bytes.
    pub source_hash: String,
    /// The `__kiln_define(...)` statement for this module, if it has one.
    pub factory: Option<String>,
    /// The module can be replaced in a running page without a reload.
    pub hot_swappable: bool,
}

/// A successful build. Receiving one is the only signal that the output is
/// complete; a failed or cancelled build returns an error instead.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub mode: BuildMode,
    /// Every emitted file, paths relative to the output directory.
    pub files: Vec<OutputFile>,
    /// Non-fatal findings from every stage, in stage order.
    pub warnings: Vec<Diagnostic>,
    pub modules: IndexMap<AssetId, ModuleRecord>,
    /// Output paths each entry loads, in load order.
    pub entrypoints: IndexMap<String, Vec<String>>,
    /// Whether the files were written to the output directory.
    pub written: bool,
}

impl BuildOutput {
    pub fn file(&self, path: &str) -> Option<&OutputFile> {
        let path = path.trim_start_matches('/');
        self.files.iter().find(|f| f.path == path)
    }

    pub fn files_of_kind(&self, kind: OutputKind) -> impl Iterator<Item = &OutputFile> {
        self.files.iter().filter(move |f| f.kind == kind)
    }

    /// The emitted HTML shell, if the html plugin ran.
    pub fn html(&self) -> Option<&OutputFile> {
        self.files_of_kind(OutputKind::Html).next()
    }

    pub fn total_size(&self) -> usize {
        self.files.iter().map(|f| f.contents.len()).sum()
    }

    /// Write every file below `dir`. See [`write_output`].
    pub fn write_to(&self, dir: &Path, clean: bool) -> Result<()> {
        write_output(&self.files, dir, clean)
    }
}
