//! Asset identities and raw asset content.
//!
//! An [`AssetId`] is a root-relative path with forward slashes, optionally
//! followed by a query. Queries mark virtual sub-assets carved out of a
//! component file, e.g. `src/App.vue?type=style&index=0&lang=scss`.

use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use path_clean::PathClean;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().replace('\\', "/"))
    }

    /// Id for a file on disk, relative to `root` when it lives below it.
    pub fn from_path(root: &Path, path: &Path) -> Self {
        let path = path.clean();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        Self::new(relative.to_string_lossy())
    }

    /// Id for block `index` of a component, dispatched as if its extension
    /// were `lang`.
    pub fn component_block(parent: &AssetId, kind: &str, index: usize, lang: &str) -> Self {
        Self(format!("{}?type={kind}&index={index}&lang={lang}", parent.path()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path part, without any query.
    pub fn path(&self) -> &str {
        self.0.split_once('?').map_or(self.0.as_str(), |(path, _)| path)
    }

    pub fn query(&self) -> Option<&str> {
        self.0.split_once('?').map(|(_, query)| query)
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query()?
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn is_virtual(&self) -> bool {
        self.query().is_some()
    }

    /// The string rules are matched against. Virtual blocks take the
    /// extension named by their `lang` parameter.
    pub fn dispatch_key(&self) -> Cow<'_, str> {
        match self.query_param("lang") {
            Some(lang) => Cow::Owned(format!("{}.{lang}", self.path())),
            None => Cow::Borrowed(self.path()),
        }
    }

    /// Extension of the dispatch key including the leading dot.
    pub fn extension(&self) -> Option<String> {
        let key = self.dispatch_key();
        let name = key.rsplit('/').next()?;
        name.rfind('.').filter(|i| *i > 0).map(|i| name[i..].to_ascii_lowercase())
    }

    /// File name without directory or extension.
    pub fn stem(&self) -> &str {
        let name = self.path().rsplit('/').next().unwrap_or_default();
        match name.rfind('.') {
            Some(i) if i > 0 => &name[..i],
            _ => name,
        }
    }

    /// Directory part of the path, empty at the root.
    pub fn dir(&self) -> &str {
        self.path().rsplit_once('/').map_or("", |(dir, _)| dir)
    }

    /// Third-party code living under `node_modules`.
    pub fn is_vendor(&self) -> bool {
        self.path().starts_with("node_modules/") || self.path().contains("/node_modules/")
    }

    pub fn is_under(&self, dir: &str) -> bool {
        let dir = dir.trim_end_matches('/');
        dir.is_empty() || dir == "." || self.path().starts_with(&format!("{dir}/"))
    }

    /// Resolve a relative reference against this asset's directory.
    pub fn join(&self, relative: &str) -> AssetId {
        let joined = Path::new(self.dir()).join(relative).clean();
        AssetId::new(joined.to_string_lossy())
    }

    /// Location on disk, if this is not a virtual asset.
    pub fn to_path(&self, root: &Path) -> Option<PathBuf> {
        (!self.is_virtual()).then(|| root.join(self.path()))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        AssetId::new(value)
    }
}

/// Asset class assigned by the matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Stylesheet,
    Image,
    Font,
    Script,
    Component,
    Json,
    /// Emitted verbatim as a file. Used by the fallback rule.
    Resource,
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleType::Stylesheet => "stylesheet",
            ModuleType::Image => "image",
            ModuleType::Font => "font",
            ModuleType::Script => "script",
            ModuleType::Component => "component",
            ModuleType::Json => "json",
            ModuleType::Resource => "resource",
        };
        f.write_str(name)
    }
}

/// Raw asset content entering a transform chain.
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: AssetId,
    pub content: Vec<u8>,
}

impl Asset {
    pub fn new(id: AssetId, content: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }

    /// Read a non-virtual asset from disk.
    pub fn read(root: &Path, id: AssetId) -> Result<Self> {
        let path = id.to_path(root).ok_or_else(|| Error::IoError {
            message: format!("virtual asset '{id}' has no file on disk"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        let content = fs::read(&path).map_err(|source| Error::IoError {
            message: format!("failed to read '{}'", path.display()),
            source,
        })?;
        Ok(Self { id, content })
    }

    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.content).map_err(|e| Error::Transform {
            step: "read".to_string(),
            asset: self.id.to_string(),
            message: format!("not valid UTF-8: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_blocks_dispatch_by_lang() {
        let parent = AssetId::new("src/App.vue");
        let block = AssetId::component_block(&parent, "style", 0, "scss");

        assert_eq!(block.as_str(), "src/App.vue?type=style&index=0&lang=scss");
        assert_eq!(block.path(), "src/App.vue");
        assert_eq!(block.query_param("type"), Some("style"));
        assert_eq!(block.dispatch_key(), "src/App.vue.scss");
        assert_eq!(block.extension().as_deref(), Some(".scss"));
        assert!(block.is_virtual());
        assert!(block.to_path(Path::new("/p")).is_none());
    }

    #[test]
    fn relative_references_are_normalized() {
        let css = AssetId::new("src/styles/main.css");
        assert_eq!(css.join("../assets/logo.png").as_str(), "src/assets/logo.png");
        assert_eq!(css.join("./font.woff2").as_str(), "src/styles/font.woff2");
    }

    #[test]
    fn from_path_strips_root() {
        let id = AssetId::from_path(Path::new("/work/app"), Path::new("/work/app/src/main.js"));
        assert_eq!(id.as_str(), "src/main.js");
        assert_eq!(id.stem(), "main");
        assert_eq!(id.dir(), "src");
    }

    #[test]
    fn vendor_detection() {
        assert!(AssetId::new("node_modules/vue/index.js").is_vendor());
        assert!(AssetId::new("packages/a/node_modules/b/x.js").is_vendor());
        assert!(!AssetId::new("src/node_modules_like.js").is_vendor());
    }

    #[test]
    fn dotfiles_have_no_extension() {
        assert_eq!(AssetId::new("src/.eslintrc").extension(), None);
        assert_eq!(AssetId::new("src/LOGO.PNG").extension().as_deref(), Some(".png"));
    }
}
