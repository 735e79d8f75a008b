//! Stylesheet steps built on lightningcss.
//!
//! ```text
//! css → prefix → css-deps → style-inject (development)
//!                         → style-extract (production)
//! ```

use std::fmt::Write as _;

use lightningcss::dependencies::{Dependency as CssDependency, DependencyOptions};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use super::{Content, Payload, TransformContext, TransformStep, Transformer};
use crate::Result;
use crate::asset::AssetId;
use crate::graph::{Dependency, DependencyKind, ModuleOutput};

/// Placeholder standing in for the final URL of a `url()` reference until
/// output names are known.
pub fn css_placeholder(importer: &AssetId, specifier: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(importer.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(specifier.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("__kiln_asset_{}__", &hex[..16])
}

/// References the bundler leaves alone: absolute URLs, protocol-relative
/// URLs, data URIs, fragments and root-absolute paths served from the
/// public directory.
fn is_external(url: &str) -> bool {
    url.starts_with('/')
        || url.starts_with('#')
        || url.starts_with("data:")
        || url
            .split_once(':')
            .is_some_and(|(scheme, _)| {
                !scheme.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
            })
}

fn escape_css_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn parse<'i>(
    source: &'i str,
    step: &TransformStep,
    cx: &TransformContext<'_>,
) -> Result<StyleSheet<'i>> {
    StyleSheet::parse(
        source,
        ParserOptions {
            filename: cx.asset.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| cx.error(step, format!("failed to parse stylesheet: {e}")))
}

/// Adds vendor prefixes for the configured browserslist.
pub struct Prefixer;

impl Transformer for Prefixer {
    fn transform(
        &self,
        input: Payload,
        step: &TransformStep,
        cx: &TransformContext<'_>,
    ) -> Result<Payload> {
        let Payload {
            content,
            dependencies,
        } = input;
        let source = cx.text(&content, step)?;

        let browsers = Browsers::from_browserslist(step.option_strings("browserslist"))
            .map_err(|e| cx.error(step, format!("invalid browserslist: {e}")))?;
        let targets = Targets {
            browsers,
            ..Targets::default()
        };

        let mut stylesheet = parse(source, step, cx)?;
        stylesheet
            .minify(MinifyOptions {
                targets: targets.clone(),
                ..MinifyOptions::default()
            })
            .map_err(|e| cx.error(step, format!("failed to prefix stylesheet: {e}")))?;
        let printed = stylesheet
            .to_css(PrinterOptions {
                targets,
                ..PrinterOptions::default()
            })
            .map_err(|e| cx.error(step, format!("failed to print stylesheet: {e}")))?;

        Ok(Payload::new(Content::Css(printed.code)).with_dependencies(dependencies))
    }
}

/// Extracts `@import` and `url()` references as dependencies.
///
/// Imports are removed from the output and become [`DependencyKind::CssImport`]
/// edges; local URLs are rewritten to placeholders resolved at fingerprint
/// time. External references are left as written.
pub struct CssDependencies;

impl Transformer for CssDependencies {
    fn transform(
        &self,
        input: Payload,
        step: &TransformStep,
        cx: &TransformContext<'_>,
    ) -> Result<Payload> {
        let Payload {
            content,
            mut dependencies,
        } = input;
        let source = cx.text(&content, step)?;

        let stylesheet = parse(source, step, cx)?;
        let printed = stylesheet
            .to_css(PrinterOptions {
                analyze_dependencies: Some(DependencyOptions {
                    remove_imports: true,
                }),
                ..PrinterOptions::default()
            })
            .map_err(|e| cx.error(step, format!("failed to print stylesheet: {e}")))?;

        let mut code = printed.code;
        let mut external_imports = String::new();
        for dependency in printed.dependencies.unwrap_or_default() {
            match dependency {
                CssDependency::Url(url) => {
                    let replacement = if is_external(&url.url) {
                        escape_css_string(&url.url)
                    } else {
                        let placeholder = css_placeholder(cx.asset, &url.url);
                        dependencies.push(Dependency::unresolved(
                            url.url,
                            DependencyKind::CssUrl {
                                placeholder: placeholder.clone(),
                            },
                        ));
                        placeholder
                    };
                    code = code.replace(&url.placeholder, &replacement);
                }
                CssDependency::Import(import) if is_external(&import.url) => {
                    let _ = write!(
                        external_imports,
                        "@import url(\"{}\")",
                        escape_css_string(&import.url)
                    );
                    if let Some(supports) = &import.supports {
                        let _ = write!(external_imports, " supports({supports})");
                    }
                    if let Some(media) = &import.media {
                        let _ = write!(external_imports, " {media}");
                    }
                    external_imports.push_str(";\n");
                }
                CssDependency::Import(import) => {
                    dependencies.push(Dependency::unresolved(import.url, DependencyKind::CssImport));
                }
            }
        }

        if !external_imports.is_empty() {
            code.insert_str(0, &external_imports);
        }
        Ok(Payload::new(Content::Css(code)).with_dependencies(dependencies))
    }
}

/// Development output: a script module that injects the stylesheet into the
/// document at runtime and can be hot-swapped.
pub struct StyleInject;

impl Transformer for StyleInject {
    fn transform(
        &self,
        input: Payload,
        step: &TransformStep,
        cx: &TransformContext<'_>,
    ) -> Result<Payload> {
        let Payload {
            content,
            dependencies,
        } = input;
        let css = cx.text(&content, step)?;

        let mut code = String::new();
        for dependency in &dependencies {
            if dependency.kind == DependencyKind::CssImport {
                let _ = writeln!(code, "require({});", json_string(&dependency.specifier));
            }
        }
        let _ = writeln!(
            code,
            "require.style({}, {});",
            json_string(cx.asset.as_str()),
            json_string(css)
        );

        Ok(Payload::new(Content::Script(code)).with_dependencies(dependencies))
    }
}

/// Production output: the stylesheet is kept for a standalone `.css` file.
pub struct StyleExtract;

impl Transformer for StyleExtract {
    fn transform(
        &self,
        input: Payload,
        step: &TransformStep,
        cx: &TransformContext<'_>,
    ) -> Result<Payload> {
        let Payload {
            content,
            dependencies,
        } = input;
        let css = cx.text(&content, step)?.to_string();
        Ok(Payload::new(Content::Module(ModuleOutput::Style { css })).with_dependencies(dependencies))
    }
}

pub(crate) fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::StepKind;
    use kiln_config::BuildMode;
    use std::path::Path;

    fn run(transformer: &dyn Transformer, step: TransformStep, id: &str, css: &str) -> Payload {
        let id = AssetId::new(id);
        let cx = TransformContext {
            root: Path::new("/project"),
            asset: &id,
            mode: BuildMode::Development,
        };
        transformer
            .transform(Payload::new(Content::Css(css.to_string())), &step, &cx)
            .unwrap()
    }

    fn css(payload: &Payload) -> &str {
        match &payload.content {
            Content::Css(css) => css,
            other => panic!("expected css, got {}", other.kind_name()),
        }
    }

    #[test]
    fn prefixer_adds_vendor_prefixes_for_old_browsers() {
        let step = TransformStep::new(StepKind::Prefix)
            .with_option("browserslist", serde_json::json!(["safari 10"]));
        let out = run(&Prefixer, step, "src/a.css", ".a { user-select: none; }");
        assert!(css(&out).contains("-webkit-user-select"), "{}", css(&out));
    }

    #[test]
    fn dependencies_are_collected_and_urls_replaced() {
        let source = r#"@import "./base.css";
@import url("https://fonts.example.com/inter.css");
.logo { background: url("../assets/logo.png"); }
.ext { background: url(https://cdn.example.com/x.png); }
"#;
        let out = run(
            &CssDependencies,
            TransformStep::new(StepKind::CssDeps),
            "src/styles/main.css",
            source,
        );
        let code = css(&out);

        let id = AssetId::new("src/styles/main.css");
        let placeholder = css_placeholder(&id, "../assets/logo.png");
        assert!(code.contains(&placeholder), "{code}");
        assert!(code.contains("https://cdn.example.com/x.png"));
        assert!(code.starts_with("@import url(\"https://fonts.example.com/inter.css\")"));
        assert!(!code.contains("base.css"));

        assert_eq!(out.dependencies.len(), 2);
        assert_eq!(out.dependencies[0].specifier, "./base.css");
        assert_eq!(out.dependencies[0].kind, DependencyKind::CssImport);
        assert_eq!(
            out.dependencies[1].kind,
            DependencyKind::CssUrl { placeholder }
        );
    }

    #[test]
    fn injection_requires_imports_then_registers_style() {
        let id = AssetId::new("src/main.css");
        let cx = TransformContext {
            root: Path::new("/project"),
            asset: &id,
            mode: BuildMode::Development,
        };
        let input = Payload::new(Content::Css(".a{color:red}".into())).with_dependencies(vec![
            Dependency::unresolved("./base.css", DependencyKind::CssImport),
        ]);
        let out = StyleInject
            .transform(input, &TransformStep::new(StepKind::StyleInject), &cx)
            .unwrap();

        let Content::Script(code) = &out.content else {
            panic!("expected script");
        };
        assert_eq!(
            code,
            "require(\"./base.css\");\nrequire.style(\"src/main.css\", \".a{color:red}\");\n"
        );
        assert_eq!(out.dependencies.len(), 1);
    }

    #[test]
    fn external_url_detection() {
        assert!(is_external("https://a/b.png"));
        assert!(is_external("//cdn/x.png"));
        assert!(is_external("data:image/png;base64,AAAA"));
        assert!(is_external("#icon"));
        assert!(is_external("/favicon.ico"));
        assert!(!is_external("./a.png"));
        assert!(!is_external("img/a.png"));
        assert!(!is_external("~pkg/a.css"));
    }
}
