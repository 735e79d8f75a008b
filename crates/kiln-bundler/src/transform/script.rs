//! Syntax downlevelling for first-party scripts.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::{Parser, ParserReturn};
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer as OxcTransformer};

use super::{Content, Payload, TransformContext, TransformStep, Transformer};
use crate::Result;

/// Lowers modern syntax to the step's `target` (an ECMAScript version or a
/// browser query understood by oxc).
///
/// Helpers that cannot be expressed inline are imported from
/// `@oxc-project/runtime`, which must then be installed in the project.
pub struct Downlevel;

impl Transformer for Downlevel {
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
        let target = step.option_str("target").unwrap_or("es2015");
        let options = TransformOptions::from_target(target)
            .map_err(|e| cx.error(step, format!("invalid script target '{target}': {e}")))?;

        let allocator = Allocator::default();
        let ParserReturn {
            mut program,
            errors,
            ..
        } = Parser::new(&allocator, source, SourceType::mjs()).parse();
        if let Some(first) = errors.first() {
            return Err(cx.error(step, format!("failed to parse script: {first}")));
        }

        let scoping = SemanticBuilder::new()
            .build(&program)
            .semantic
            .into_scoping();
        let ret = OxcTransformer::new(&allocator, Path::new(cx.asset.path()), &options)
            .build_with_scoping(scoping, &mut program);
        if let Some(first) = ret.errors.first() {
            return Err(cx.error(step, format!("failed to downlevel script: {first}")));
        }

        let code = Codegen::new().build(&program).code;
        Ok(Payload::new(Content::Script(code)).with_dependencies(dependencies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetId;
    use crate::transform::StepKind;
    use kiln_config::BuildMode;

    fn downlevel(source: &str) -> Result<Payload> {
        let id = AssetId::new("src/main.js");
        let cx = TransformContext {
            root: Path::new("/p"),
            asset: &id,
            mode: BuildMode::Production,
        };
        let step = TransformStep::new(StepKind::Downlevel).with_option("target", "es2015");
        Downlevel.transform(Payload::raw(source.as_bytes().to_vec()), &step, &cx)
    }

    #[test]
    fn lowers_newer_syntax() {
        let out = downlevel("export const x = a ?? b;\nexport const y = o?.p;\n").unwrap();
        let Content::Script(code) = out.content else {
            panic!("expected script");
        };
        assert!(!code.contains("??"), "{code}");
        assert!(!code.contains("?."), "{code}");
        assert!(code.contains("export const x"), "{code}");
    }

    #[test]
    fn syntax_errors_name_the_step() {
        let err = downlevel("const = ;").unwrap_err();
        assert!(err.to_string().contains("downlevel"), "{err}");
        assert!(err.to_string().contains("src/main.js"), "{err}");
    }
}
