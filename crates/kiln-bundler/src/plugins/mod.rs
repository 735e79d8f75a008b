//! Whole-build plugins.
//!
//! Unlike transform steps, which see one asset at a time, a plugin sees the
//! entire [`BuildGraph`] at a fixed point of the pipeline (its
//! [`PluginPhase`]) and may add, replace or inspect anything in it.

mod component_hook;
mod copy_public;
mod css_extract;
mod define_env;
mod html;
mod lint;
pub mod registry;

use kiln_config::EffectiveConfig;

use crate::Result;
use crate::diagnostics::Diagnostic;
use crate::graph::BuildGraph;

pub use component_hook::ComponentHook;
pub use copy_public::CopyPublic;
pub use css_extract::CssExtract;
pub use define_env::DefineEnv;
pub use html::HtmlEmit;
pub use lint::LintGate;
pub use registry::{Activation, PluginEntry, PluginId, PluginPhase, PluginRegistry, assemble};

/// Read-only build facts handed to every plugin.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub config: &'a EffectiveConfig,
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn phase(&self) -> PluginPhase;

    /// Run over the graph. Findings that should not fail the build are
    /// returned; anything fatal is an error.
    fn apply(&self, graph: &mut BuildGraph, cx: &BuildContext<'_>) -> Result<Vec<Diagnostic>>;
}
