//! Shared test utilities for kiln-bundler tests
//!
//! Fixture projects are written into a temp dir per test so builds never
//! share state through the filesystem.

#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use kiln_bundler::{BuildOutput, OutputKind, Pipeline, TransformCache};
use kiln_config::{BuildMode, EffectiveConfig, KilnConfig};
use tempfile::TempDir;

/// Write `contents` at `relative` below `root`, creating parents.
pub fn write(root: &Path, relative: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A PNG of `size`×`size` pixels. Noisy images do not compress, so their
/// encoded size grows with the pixel count.
pub fn png(size: u32, noisy: bool) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    let img = RgbImage::from_fn(size, size, |x, y| {
        if noisy {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            Rgb([r, g, b])
        } else {
            Rgb([(x * 8) as u8, (y * 8) as u8, 128])
        }
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

/// The minimal project every build test starts from:
///
/// ```text
/// src/main.js        imports App.vue, main.css, util.js
/// src/util.js
/// src/main.css       url() to a small and a large image
/// src/App.vue
/// public/index.html  the HTML template
/// public/robots.txt
/// ```
pub fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "src/main.js",
        "import App from \"./App.vue\";\n\
         import { double } from \"./util.js\";\n\
         import \"./main.css\";\n\
         window.app = { component: App, value: double(21) };\n",
    );
    write(
        root,
        "src/util.js",
        "export const double = (n) => n * 2;\n",
    );
    write(
        root,
        "src/main.css",
        ".icon { background: url(./assets/icon.png); }\n\
         .hero { background: url(./assets/hero.png); }\n",
    );
    write(root, "src/assets/icon.png", png(4, false));
    write(root, "src/assets/hero.png", png(96, true));
    write(
        root,
        "src/App.vue",
        "<template>\n  <div id=\"app\">{{ message }}</div>\n</template>\n\n\
         <script>\nexport default {\n  data() {\n    return { message: \"hello\" };\n  }\n};\n</script>\n\n\
         <style>\n#app { color: red; }\n</style>\n",
    );
    write(
        root,
        "public/index.html",
        "<!DOCTYPE html>\n<html>\n<head>\n<link rel=\"icon\" href=\"<%= BASE_URL %>favicon.ico\">\n</head>\n<body>\n<div id=\"app\"></div>\n</body>\n</html>\n",
    );
    write(root, "public/robots.txt", "User-agent: *\n");
    dir
}

pub fn config(root: &Path, mode: BuildMode) -> EffectiveConfig {
    config_with(root, mode, |_| {})
}

/// Effective config for `root` with lint disabled, after `edit` has
/// adjusted the base configuration.
pub fn config_with(
    root: &Path,
    mode: BuildMode,
    edit: impl FnOnce(&mut KilnConfig),
) -> EffectiveConfig {
    let mut base = KilnConfig {
        root: root.to_path_buf(),
        ..KilnConfig::default()
    };
    base.lint.enabled = false;
    edit(&mut base);
    kiln_config::resolve(mode, &base)
}

pub fn build(config: &EffectiveConfig) -> kiln_bundler::Result<BuildOutput> {
    Pipeline::new(config)?.build(&TransformCache::in_memory())
}

pub fn text(output: &BuildOutput, path: &str) -> String {
    let file = output
        .file(path)
        .unwrap_or_else(|| panic!("no output file {path}; have {:?}", paths(output)));
    String::from_utf8(file.contents.clone()).unwrap()
}

pub fn paths(output: &BuildOutput) -> Vec<&str> {
    output.files.iter().map(|f| f.path.as_str()).collect()
}

pub fn files_of_kind(output: &BuildOutput, kind: OutputKind) -> Vec<&str> {
    output
        .files_of_kind(kind)
        .map(|f| f.path.as_str())
        .collect()
}

/// Every file below `dir`, relative, sorted.
pub fn tree(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walk(dir)
        .into_iter()
        .map(|p| {
            p.strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

fn walk(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk(&path));
        } else {
            out.push(path);
        }
    }
    out
}
