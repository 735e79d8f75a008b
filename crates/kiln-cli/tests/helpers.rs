//! Fixture projects shared by the CLI integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

pub fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A small application: one entry, a hot-accepting helper module, a
/// stylesheet, a public template and one public file.
pub fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "kiln.toml",
        "[default.dev]\nopen = false\nport = 3999\n",
    );
    write(
        root,
        "src/main.js",
        "import { greet } from \"./util.js\";\nimport \"./main.css\";\n\ndocument.getElementById(\"app\").textContent = greet(\"kiln\");\n",
    );
    write(
        root,
        "src/util.js",
        "export function greet(name) {\n  return \"hello \" + name;\n}\n\nif (module.hot) {\n  module.hot.accept();\n}\n",
    );
    write(root, "src/main.css", "body {\n  margin: 0;\n}\n");
    write(
        root,
        "public/index.html",
        "<!DOCTYPE html>\n<html>\n<head>\n  <title>fixture</title>\n</head>\n<body>\n  <div id=\"app\"></div>\n</body>\n</html>\n",
    );
    write(root, "public/robots.txt", "User-agent: *\n");
    dir
}
