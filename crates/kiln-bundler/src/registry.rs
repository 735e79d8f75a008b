//! Transform Registry: maps asset identifiers to transform chains.
//!
//! Rules are tried in declaration order and the first match wins. An asset
//! no rule matches falls through to the optional fallback rule, and failing
//! that is a dispatch error naming the asset. The registry itself does not
//! depend on the build mode; the one mode-sensitive slot in a chain
//! ([`ChainStep::StyleOutput`]) is filled in at lookup time, and the result
//! is cached per `(rule, mode)`.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use kiln_config::{BuildMode, ConfigError, EffectiveConfig, StyleStrategy, UnhandledAssets};
use regex::Regex;
use serde_json::json;

use crate::asset::{AssetId, ModuleType};
use crate::transform::{PreprocessorKind, StepKind, TransformStep};
use crate::{Error, Result};

/// A step as declared on a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainStep {
    Step(TransformStep),
    /// Runtime injection in development, extraction in production.
    StyleOutput,
}

impl ChainStep {
    fn resolve(&self, mode: BuildMode) -> TransformStep {
        match self {
            ChainStep::Step(step) => step.clone(),
            ChainStep::StyleOutput => match StyleStrategy::for_mode(mode) {
                StyleStrategy::Inject => TransformStep::new(StepKind::StyleInject),
                StyleStrategy::Extract => TransformStep::new(StepKind::StyleExtract),
            },
        }
    }
}

impl From<TransformStep> for ChainStep {
    fn from(step: TransformStep) -> Self {
        ChainStep::Step(step)
    }
}

#[derive(Debug, Clone)]
pub struct AssetRule {
    pub name: String,
    pub pattern: Regex,
    /// Only assets under this root-relative directory match.
    pub include: Option<String>,
    pub module_type: ModuleType,
    /// Application order: the first step runs first.
    pub chain: Vec<ChainStep>,
}

impl AssetRule {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        module_type: ModuleType,
        chain: Vec<ChainStep>,
    ) -> std::result::Result<Self, ConfigError> {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|e| ConfigError::InvalidRule {
            rule: name.clone(),
            message: e.to_string(),
        })?;
        if chain.is_empty() {
            return Err(ConfigError::InvalidRule {
                rule: name,
                message: "transform chain is empty".to_string(),
            });
        }
        Ok(Self {
            name,
            pattern,
            include: None,
            module_type,
            chain,
        })
    }

    pub fn with_include(mut self, dir: impl Into<String>) -> Self {
        self.include = Some(dir.into());
        self
    }

    pub fn matches(&self, id: &AssetId) -> bool {
        if let Some(dir) = &self.include {
            if !id.is_under(dir) {
                return false;
            }
        }
        self.pattern.is_match(&id.dispatch_key())
    }
}

/// A chain ready to run.
#[derive(Debug, Clone)]
pub struct ResolvedChain {
    /// Index of the matching rule; the fallback rule comes after all others.
    pub rule: usize,
    pub module_type: ModuleType,
    pub steps: Arc<[TransformStep]>,
}

#[derive(Debug)]
pub struct TransformRegistry {
    rules: Vec<AssetRule>,
    fallback: Option<AssetRule>,
    chains: DashMap<(usize, BuildMode), Arc<[TransformStep]>>,
}

impl TransformRegistry {
    pub fn new(rules: Vec<AssetRule>) -> Self {
        Self {
            rules,
            fallback: None,
            chains: DashMap::new(),
        }
    }

    /// The built-in rule table, parameterized by `config`.
    pub fn builtin(config: &EffectiveConfig) -> std::result::Result<Self, ConfigError> {
        let src_dir = relative_dir(&config.root, &config.src_dir);
        let browsers = json!(config.browserslist);
        let preprocess = |lang: PreprocessorKind, command: &[String]| {
            ChainStep::from(
                TransformStep::new(StepKind::Preprocess { lang })
                    .with_option("command", json!(command)),
            )
        };
        let prefix = || {
            ChainStep::from(
                TransformStep::new(StepKind::Prefix).with_option("browserslist", browsers.clone()),
            )
        };
        let css_deps = || ChainStep::from(TransformStep::new(StepKind::CssDeps));
        let style_chain = |pre: Option<ChainStep>| {
            pre.into_iter()
                .chain([prefix(), css_deps(), ChainStep::StyleOutput])
                .collect::<Vec<_>>()
        };
        let commands = &config.preprocessors;

        let rules = vec![
            AssetRule::new("css", r"\.css$", ModuleType::Stylesheet, style_chain(None))?,
            AssetRule::new(
                "less",
                r"\.less$",
                ModuleType::Stylesheet,
                style_chain(Some(preprocess(PreprocessorKind::Less, &commands.less))),
            )?,
            AssetRule::new(
                "sass",
                r"\.s[ac]ss$",
                ModuleType::Stylesheet,
                style_chain(Some(preprocess(PreprocessorKind::Sass, &commands.sass))),
            )?,
            AssetRule::new(
                "stylus",
                r"\.styl$",
                ModuleType::Stylesheet,
                style_chain(Some(preprocess(PreprocessorKind::Stylus, &commands.stylus))),
            )?,
            AssetRule::new(
                "images",
                r"\.(jpe?g|png|gif|webp|svg)$",
                ModuleType::Image,
                vec![
                    TransformStep::new(StepKind::AssetInlineOrResource {
                        limit: config.asset_inline_limit,
                    })
                    .into(),
                ],
            )?,
            AssetRule::new(
                "fonts",
                r"\.(woff2?|ttf)$",
                ModuleType::Font,
                vec![TransformStep::new(StepKind::AssetResource).into()],
            )?,
            AssetRule::new(
                "scripts",
                r"\.js$",
                ModuleType::Script,
                vec![
                    TransformStep::new(StepKind::Downlevel)
                        .with_option("target", config.script_target.as_str())
                        .into(),
                ],
            )?
            .with_include(src_dir),
            AssetRule::new(
                "components",
                r"\.vue$",
                ModuleType::Component,
                vec![TransformStep::new(StepKind::ComponentCompile).into()],
            )?,
            AssetRule::new(
                "vendor-scripts",
                r"\.(m?js|cjs)$",
                ModuleType::Script,
                vec![TransformStep::new(StepKind::Passthrough).into()],
            )?
            .with_include("node_modules"),
            AssetRule::new(
                "json",
                r"\.json$",
                ModuleType::Json,
                vec![TransformStep::new(StepKind::Passthrough).into()],
            )?,
        ];

        let mut registry = Self::new(rules);
        if config.unhandled_assets == UnhandledAssets::Resource {
            registry.fallback = Some(AssetRule::new(
                "fallback",
                ".",
                ModuleType::Resource,
                vec![TransformStep::new(StepKind::AssetResource).into()],
            )?);
        }
        Ok(registry)
    }

    /// Append a rule after the existing ones.
    pub fn with_rule(mut self, rule: AssetRule) -> Self {
        self.rules.push(rule);
        self.chains.clear();
        self
    }

    pub fn with_fallback(mut self, rule: AssetRule) -> Self {
        self.fallback = Some(rule);
        self.chains.clear();
        self
    }

    pub fn rules(&self) -> &[AssetRule] {
        &self.rules
    }

    pub fn has_rule_for(&self, module_type: ModuleType) -> bool {
        self.rules
            .iter()
            .chain(self.fallback.as_ref())
            .any(|rule| rule.module_type == module_type)
    }

    /// The rule that handles `id`, and its index.
    pub fn find_rule(&self, id: &AssetId) -> Option<(usize, &AssetRule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(id))
            .or_else(|| self.fallback.as_ref().map(|rule| (self.rules.len(), rule)))
    }

    pub fn resolve_chain(&self, id: &AssetId, mode: BuildMode) -> Result<ResolvedChain> {
        let (index, rule) = self.find_rule(id).ok_or_else(|| Error::UnhandledAsset {
            asset: id.to_string(),
        })?;

        let steps = self
            .chains
            .entry((index, mode))
            .or_insert_with(|| rule.chain.iter().map(|step| step.resolve(mode)).collect())
            .clone();

        Ok(ResolvedChain {
            rule: index,
            module_type: rule.module_type,
            steps,
        })
    }
}

fn relative_dir(root: &Path, dir: &Path) -> String {
    let relative = dir.strip_prefix(root).unwrap_or(dir);
    relative.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::KilnConfig;

    fn registry(unhandled: UnhandledAssets) -> TransformRegistry {
        let base = KilnConfig {
            unhandled_assets: unhandled,
            ..KilnConfig::default()
        };
        let config = kiln_config::resolve(BuildMode::Development, &base);
        TransformRegistry::builtin(&config).unwrap()
    }

    fn names(chain: &ResolvedChain) -> Vec<&'static str> {
        chain.steps.iter().map(TransformStep::name).collect()
    }

    #[test]
    fn stylesheet_output_step_follows_mode() {
        let registry = registry(UnhandledAssets::Error);
        let id = AssetId::new("src/main.css");

        let dev = registry.resolve_chain(&id, BuildMode::Development).unwrap();
        let prod = registry.resolve_chain(&id, BuildMode::Production).unwrap();

        assert_eq!(names(&dev), ["prefix", "css-deps", "style-inject"]);
        assert_eq!(names(&prod), ["prefix", "css-deps", "style-extract"]);
        assert_eq!(dev.module_type, ModuleType::Stylesheet);
    }

    #[test]
    fn preprocessed_styles_start_with_their_preprocessor() {
        let registry = registry(UnhandledAssets::Error);
        for (file, first) in [
            ("src/a.less", "preprocess-less"),
            ("src/a.scss", "preprocess-sass"),
            ("src/a.sass", "preprocess-sass"),
            ("src/a.styl", "preprocess-stylus"),
        ] {
            let chain = registry
                .resolve_chain(&AssetId::new(file), BuildMode::Production)
                .unwrap();
            assert_eq!(names(&chain)[0], first, "{file}");
            assert_eq!(names(&chain).len(), 4, "{file}");
        }
    }

    #[test]
    fn component_style_blocks_dispatch_by_lang() {
        let registry = registry(UnhandledAssets::Error);
        let block = AssetId::component_block(&AssetId::new("src/App.vue"), "style", 0, "scss");
        let chain = registry.resolve_chain(&block, BuildMode::Development).unwrap();
        assert_eq!(names(&chain)[0], "preprocess-sass");
    }

    #[test]
    fn scripts_outside_src_are_not_downlevelled() {
        let registry = registry(UnhandledAssets::Error);
        let own = registry
            .resolve_chain(&AssetId::new("src/util/a.js"), BuildMode::Development)
            .unwrap();
        let vendor = registry
            .resolve_chain(&AssetId::new("node_modules/vue/index.js"), BuildMode::Development)
            .unwrap();
        assert_eq!(names(&own), ["downlevel"]);
        assert_eq!(names(&vendor), ["passthrough"]);
        assert_eq!(own.steps[0].option_str("target"), Some("es2015"));
    }

    #[test]
    fn unknown_extension_is_a_dispatch_error_without_fallback() {
        let strict = registry(UnhandledAssets::Error);
        let err = strict
            .resolve_chain(&AssetId::new("src/data.xyz"), BuildMode::Production)
            .unwrap_err();
        assert!(matches!(err, Error::UnhandledAsset { ref asset } if asset == "src/data.xyz"));

        let lenient = registry(UnhandledAssets::Resource);
        let chain = lenient
            .resolve_chain(&AssetId::new("src/data.xyz"), BuildMode::Production)
            .unwrap();
        assert_eq!(chain.module_type, ModuleType::Resource);
        assert_eq!(chain.rule, lenient.rules().len());
    }

    #[test]
    fn chains_are_shared_per_rule_and_mode() {
        let registry = registry(UnhandledAssets::Error);
        let a = registry
            .resolve_chain(&AssetId::new("src/a.png"), BuildMode::Production)
            .unwrap();
        let b = registry
            .resolve_chain(&AssetId::new("src/b.jpg"), BuildMode::Production)
            .unwrap();
        assert!(Arc::ptr_eq(&a.steps, &b.steps));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = AssetRule::new("broken", "(", ModuleType::Script, vec![ChainStep::StyleOutput])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { ref rule, .. } if rule == "broken"));
    }
}
