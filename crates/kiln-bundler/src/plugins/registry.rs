//! Plugin composition and phase ordering.
//!
//! [`assemble`] turns an effective configuration into the ordered list of
//! [`PluginEntry`]s for one build. Each entry carries an activation
//! predicate that is evaluated once, against the build mode, when the list
//! is assembled. [`PluginRegistry`] instantiates the entries.

use std::fmt;
use std::sync::Arc;

use kiln_config::{BuildMode, ConfigError, EffectiveConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{
    ComponentHook, CopyPublic, CssExtract, DefineEnv, HtmlEmit, LintGate, Plugin,
};

/// Plugin execution phases
///
/// Plugins are executed in phase order (lower numbers first), and in
/// declaration order within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginPhase {
    /// Before any asset is transformed.
    Analyze = 0,

    /// After each transform round, over the modules that round produced.
    Transform = 20,

    /// After chunks are linked, before optimization.
    Assemble = 30,

    /// After output files are named.
    Finalize = 100,
}

/// When a plugin takes part in a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Activation {
    Always,
    ProductionOnly,
    DevelopmentOnly,
}

impl Activation {
    pub fn holds(self, mode: BuildMode) -> bool {
        match self {
            Activation::Always => true,
            Activation::ProductionOnly => mode.is_production(),
            Activation::DevelopmentOnly => !mode.is_production(),
        }
    }
}

/// The built-in plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginId {
    LintGate,
    ComponentHook,
    DefineEnv,
    CssExtract,
    HtmlEmit,
    CopyPublic,
}

impl PluginId {
    pub fn name(self) -> &'static str {
        match self {
            PluginId::LintGate => "lint-gate",
            PluginId::ComponentHook => "component-hook",
            PluginId::DefineEnv => "define-env",
            PluginId::CssExtract => "css-extract",
            PluginId::HtmlEmit => "html-emit",
            PluginId::CopyPublic => "copy-public",
        }
    }

    pub fn phase(self) -> PluginPhase {
        match self {
            PluginId::LintGate => PluginPhase::Analyze,
            PluginId::ComponentHook | PluginId::DefineEnv => PluginPhase::Transform,
            PluginId::CssExtract => PluginPhase::Assemble,
            PluginId::HtmlEmit | PluginId::CopyPublic => PluginPhase::Finalize,
        }
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub id: PluginId,
    pub activation: Activation,
    pub params: Value,
}

impl PluginEntry {
    pub fn new(id: PluginId, activation: Activation, params: Value) -> Self {
        Self {
            id,
            activation,
            params,
        }
    }

    pub fn phase(&self) -> PluginPhase {
        self.id.phase()
    }
}

/// Every plugin declaration, before activation filtering.
fn declared(config: &EffectiveConfig) -> Vec<PluginEntry> {
    let mut defines: serde_json::Map<String, Value> = config
        .defines
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    defines
        .entry("process.env.NODE_ENV")
        .or_insert_with(|| Value::String(format!("\"{}\"", config.mode.as_str())));

    let mut entries = Vec::new();
    if config.lint.enabled {
        entries.push(PluginEntry::new(
            PluginId::LintGate,
            Activation::Always,
            json!({
                "include": config.src_dir,
                "fail_on_error": config.lint.fail_on_error,
                "cache_file": config.lint.cache.then(|| config.cache_dir.join(".lintcache")),
            }),
        ));
    }
    entries.extend([
        PluginEntry::new(
            PluginId::HtmlEmit,
            Activation::Always,
            json!({
                "template": config.html_template,
                "filename": "index.html",
                "public_path": config.public_path,
            }),
        ),
        PluginEntry::new(PluginId::ComponentHook, Activation::Always, json!({})),
        PluginEntry::new(
            PluginId::DefineEnv,
            Activation::Always,
            json!({ "defines": defines }),
        ),
        PluginEntry::new(PluginId::CssExtract, Activation::ProductionOnly, json!({})),
        PluginEntry::new(
            PluginId::CopyPublic,
            Activation::ProductionOnly,
            json!({
                "from": config.public_dir,
                "ignore": config.copy_ignore,
                "enabled": config.copy_public,
            }),
        ),
    ]);
    entries
}

/// The active plugins for `config`, ordered by phase then declaration.
pub fn assemble(config: &EffectiveConfig) -> Vec<PluginEntry> {
    let mut entries: Vec<_> = declared(config)
        .into_iter()
        .filter(|entry| entry.activation.holds(config.mode))
        .collect();
    entries.sort_by_key(PluginEntry::phase);
    entries
}

/// Plugin registry that maintains plugins in phase order
pub struct PluginRegistry {
    plugins: Vec<(PluginPhase, Arc<dyn Plugin>)>,
}

impl PluginRegistry {
    /// Create a new empty plugin registry
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Instantiate `entries`.
    ///
    /// The component hook must be present exactly once.
    pub fn from_entries(entries: &[PluginEntry]) -> Result<Self, ConfigError> {
        let hooks = entries
            .iter()
            .filter(|e| e.id == PluginId::ComponentHook)
            .count();
        if hooks != 1 {
            return Err(ConfigError::InvalidValue {
                field: "plugins".to_string(),
                message: format!("component-hook must be active exactly once, found {hooks}"),
            });
        }

        let mut registry = Self::new();
        for entry in entries {
            let plugin: Arc<dyn Plugin> = match entry.id {
                PluginId::LintGate => Arc::new(LintGate::from_params(&entry.params)?),
                PluginId::ComponentHook => Arc::new(ComponentHook),
                PluginId::DefineEnv => Arc::new(DefineEnv::from_params(&entry.params)?),
                PluginId::CssExtract => Arc::new(CssExtract),
                PluginId::HtmlEmit => Arc::new(HtmlEmit::from_params(&entry.params)?),
                PluginId::CopyPublic => Arc::new(CopyPublic::from_params(&entry.params)?),
            };
            registry.add(plugin);
        }
        Ok(registry)
    }

    /// Add a plugin; it runs in its declared phase, after plugins of the
    /// same phase added before it.
    pub fn add(&mut self, plugin: Arc<dyn Plugin>) {
        let phase = plugin.phase();
        let at = self.plugins.partition_point(|(p, _)| *p <= phase);
        self.plugins.insert(at, (phase, plugin));
    }

    pub fn phase(&self, phase: PluginPhase) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .filter(move |(p, _)| *p == phase)
            .map(|(_, plugin)| plugin)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.iter().any(|(_, p)| p.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|(_, p)| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

/// Deserialize a plugin's parameters into its typed form.
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    plugin: PluginId,
    params: &Value,
) -> Result<T, ConfigError> {
    serde_json::from_value(params.clone()).map_err(|e| ConfigError::InvalidValue {
        field: format!("plugins.{plugin}"),
        message: e.to_string(),
    })
}
