//! Script minification with oxc.

use std::path::PathBuf;

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_sourcemap::SourceMap;
use oxc_span::SourceType;

/// Minified code plus a map back to the input when `map_name` is given.
pub struct MinifiedScript {
    pub code: String,
    pub map: Option<SourceMap>,
}

/// Mangle and compress a chunk. Chunks are classic scripts, never modules.
pub fn minify_script(source: &str, map_name: Option<&str>) -> Result<MinifiedScript, String> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if let Some(error) = parsed.errors.first() {
        return Err(format!("failed to parse chunk: {error}"));
    }
    let mut program = parsed.program;

    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let minified = Minifier::new(options).minify(&allocator, &mut program);

    let generated = Codegen::new()
        .with_options(CodegenOptions {
            source_map_path: map_name.map(PathBuf::from),
            ..CodegenOptions::minify()
        })
        .with_scoping(minified.scoping)
        .build(&program);

    Ok(MinifiedScript {
        code: generated.code,
        map: generated.map,
    })
}
