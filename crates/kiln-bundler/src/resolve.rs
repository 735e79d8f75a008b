//! Specifier resolution on top of `oxc_resolver`.
//!
//! Script specifiers follow Node resolution with the configured extensions,
//! preferring a package's `module` field over `main`. Stylesheet references
//! are relative even without `./`, and `~pkg/...` forces a package lookup.
//! Root-absolute specifiers (`/src/x.js`) are taken relative to the project
//! root. Configured aliases are applied first, webpack style: `vue$`
//! rewrites the bare `vue` specifier only. Results are project-relative
//! [`AssetId`]s.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use kiln_config::EffectiveConfig;
use oxc_resolver::{AliasValue, ResolveOptions, Resolver as OxcResolver};
use tracing::trace;

use crate::asset::AssetId;
use crate::graph::DependencyKind;
use crate::{Error, Result};

pub struct Resolver {
    root: PathBuf,
    inner: OxcResolver,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("root", &self.root).finish()
    }
}

impl Resolver {
    pub fn new(config: &EffectiveConfig) -> Self {
        Self::with_options(
            &config.root,
            config.resolve_extensions.clone(),
            &config.resolve_alias,
        )
    }

    pub fn with_options(
        root: &Path,
        extensions: Vec<String>,
        aliases: &IndexMap<String, String>,
    ) -> Self {
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        let alias = aliases
            .iter()
            .map(|(key, target)| (key.clone(), vec![AliasValue::Path(target.clone())]))
            .collect();
        let inner = OxcResolver::new(ResolveOptions {
            alias,
            extensions,
            main_fields: vec!["module".into(), "main".into()],
            condition_names: vec![
                "import".into(),
                "module".into(),
                "browser".into(),
                "default".into(),
            ],
            // Keep package paths inside the project so they map to asset ids.
            symlinks: false,
            ..ResolveOptions::default()
        });
        Self { root, inner }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(
        &self,
        specifier: &str,
        importer: &AssetId,
        kind: &DependencyKind,
    ) -> Result<AssetId> {
        let request = strip_suffixes(specifier);
        let importer_dir = self.root.join(importer.dir());
        let is_style = matches!(
            kind,
            DependencyKind::CssImport | DependencyKind::CssUrl { .. }
        );

        let resolved = if let Some(package) = request.strip_prefix('~').filter(|_| is_style) {
            self.lookup(&importer_dir, package)
        } else if let Some(absolute) = request.strip_prefix('/') {
            self.lookup(&self.root, &format!("./{absolute}"))
        } else if is_style && !is_relative(request) {
            self.lookup(&importer_dir, &format!("./{request}"))
                .or_else(|| self.lookup(&importer_dir, request))
        } else {
            self.lookup(&importer_dir, request)
        };

        trace!(specifier, importer = %importer, resolved = ?resolved, "resolve");
        resolved.ok_or_else(|| Error::Unresolved {
            specifier: specifier.to_string(),
            importer: importer.to_string(),
        })
    }

    fn lookup(&self, dir: &Path, request: &str) -> Option<AssetId> {
        let resolution = self.inner.resolve(dir, request).ok()?;
        let path = resolution.path();
        // Anything outside the project cannot be addressed by an asset id.
        path.starts_with(&self.root)
            .then(|| AssetId::from_path(&self.root, path))
    }
}

fn is_relative(request: &str) -> bool {
    request.starts_with("./") || request.starts_with("../")
}

fn strip_suffixes(specifier: &str) -> &str {
    let end = specifier.find(['?', '#']).unwrap_or(specifier.len());
    &specifier[..end]
}
