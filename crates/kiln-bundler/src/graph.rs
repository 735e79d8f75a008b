//! The build graph threaded through every pipeline stage.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, AssetId, ModuleType};
use crate::sourcemap::LineMap;

/// How a module refers to another asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Static `import` or `export ... from`.
    Import,
    DynamicImport,
    Require,
    /// `@import` inside a stylesheet.
    CssImport,
    /// `url()` inside a stylesheet, rewritten to `placeholder`.
    CssUrl { placeholder: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// The reference exactly as written in the source.
    pub specifier: String,
    pub kind: DependencyKind,
    /// Filled in once the specifier is resolved.
    pub target: Option<AssetId>,
}

impl Dependency {
    pub fn unresolved(specifier: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
            target: None,
        }
    }

    pub fn resolved(specifier: impl Into<String>, kind: DependencyKind, target: AssetId) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
            target: Some(target),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Template,
    Script,
    Style,
}

/// One top-level block of a single-file component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentBlock {
    pub kind: BlockKind,
    /// Position among blocks of the same kind.
    pub index: usize,
    pub lang: String,
    pub content: String,
    pub scoped: bool,
    /// `<script setup>`.
    pub setup: bool,
}

/// Terminal form of a module once its chain has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleOutput {
    /// Script source, ES module or CommonJS.
    Script { code: String },
    Json { text: String },
    /// Stylesheet destined for an extracted `.css` file.
    Style { css: String },
    /// Emitted as its own file under the media template.
    Resource { bytes: Vec<u8>, ext: String },
    /// Embedded as a data URI.
    Inline { data_uri: String },
    /// Split component awaiting re-entry of its blocks.
    Component { blocks: Vec<ComponentBlock> },
}

impl ModuleOutput {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ModuleOutput::Script { .. } => "script",
            ModuleOutput::Json { .. } => "json",
            ModuleOutput::Style { .. } => "style",
            ModuleOutput::Resource { .. } => "resource",
            ModuleOutput::Inline { .. } => "inline",
            ModuleOutput::Component { .. } => "component",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub id: AssetId,
    pub module_type: ModuleType,
    pub output: ModuleOutput,
    pub dependencies: Vec<Dependency>,
    /// blake3 of the source bytes, used to detect changed modules.
    pub source_hash: String,
}

impl Module {
    pub fn targets(&self) -> impl Iterator<Item = &AssetId> {
        self.dependencies.iter().filter_map(|d| d.target.as_ref())
    }
}

/// Ordered by load order: the runtime first, entries last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Runtime,
    Vendor,
    Common,
    Entry,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub name: String,
    pub kind: ChunkKind,
    /// Entries that load this chunk.
    pub entries: Vec<String>,
    pub modules: Vec<AssetId>,
    pub script: Option<String>,
    /// Origin of each line of `script` as first assembled.
    pub lines: Option<LineMap>,
    /// Source map JSON for `script`.
    pub script_map: Option<String>,
    pub style: Option<String>,
}

impl Chunk {
    pub fn new(name: impl Into<String>, kind: ChunkKind) -> Self {
        Self {
            name: name.into(),
            kind,
            entries: Vec::new(),
            modules: Vec::new(),
            script: None,
            lines: None,
            script_map: None,
            style: None,
        }
    }

    /// Entry and runtime chunks use the entry templates, the rest the chunk
    /// templates.
    pub fn uses_entry_template(&self) -> bool {
        matches!(self.kind, ChunkKind::Entry | ChunkKind::Runtime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Script,
    Style,
    SourceMap,
    Media,
    Html,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Path relative to the output directory, forward slashes.
    pub path: String,
    pub contents: Vec<u8>,
    pub kind: OutputKind,
    /// Chunk name or asset id this file came from.
    pub origin: Option<String>,
}

/// Everything known about one build, stage by stage.
#[derive(Debug, Default)]
pub struct BuildGraph {
    pub entries: IndexMap<String, AssetId>,
    pub modules: IndexMap<AssetId, Module>,
    /// Assets discovered but not yet transformed.
    pub pending: Vec<Asset>,
    /// Modules inserted by the current transform round.
    pub fresh: Vec<AssetId>,
    pub chunks: Vec<Chunk>,
    pub files: Vec<OutputFile>,
    /// Final public URL per module emitted as its own file.
    pub resource_urls: IndexMap<AssetId, String>,
}

impl BuildGraph {
    pub fn new(entries: IndexMap<String, AssetId>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn module(&self, id: &AssetId) -> Option<&Module> {
        self.modules.get(id)
    }

    pub fn is_known(&self, id: &AssetId) -> bool {
        self.modules.contains_key(id) || self.pending.iter().any(|a| &a.id == id)
    }

    pub fn chunk(&self, name: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.name == name)
    }

    pub fn file(&self, path: &str) -> Option<&OutputFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Modules reachable from `start`, depth first, dependencies before
    /// dependents. Cycles are broken at the first revisit.
    pub fn post_order(&self, start: &AssetId) -> Vec<AssetId> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut order = Vec::new();
        self.visit(start, &mut seen, &mut order);
        order
    }

    fn visit(
        &self,
        id: &AssetId,
        seen: &mut rustc_hash::FxHashSet<AssetId>,
        order: &mut Vec<AssetId>,
    ) {
        if !seen.insert(id.clone()) {
            return;
        }
        if let Some(module) = self.modules.get(id) {
            for target in module.targets() {
                self.visit(target, seen, order);
            }
            order.push(id.clone());
        }
    }
}
