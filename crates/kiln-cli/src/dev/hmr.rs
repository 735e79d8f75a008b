//! Deciding what a rebuild means for pages that are already open.
//!
//! A rebuild is compared with the build it replaces:
//!
//! - nothing a page loaded changed: no event
//! - only extracted stylesheets changed: `css-update`
//! - only modules changed, each one swappable in place: `update`
//! - anything else (new modules, new entries, a changed HTML shell, a module
//!   that does not accept updates): `reload`

use std::collections::HashSet;

use kiln_bundler::{BuildOutput, OutputKind};

use crate::dev::DevEvent;

/// The event to broadcast after `new` replaced `old`.
pub fn plan_update(old: &BuildOutput, new: &BuildOutput) -> Option<DevEvent> {
    if old.entrypoints != new.entrypoints {
        return Some(DevEvent::Reload);
    }
    let html = |output: &BuildOutput| output.html().map(|f| f.contents.clone());
    if html(old) != html(new) {
        return Some(DevEvent::Reload);
    }

    let mut changed = Vec::new();
    for (id, record) in &new.modules {
        match old.modules.get(id) {
            Some(before) if before.source_hash == record.source_hash => {}
            Some(_) => changed.push((id, record)),
            // The runtime only swaps modules a page already registered.
            None => return Some(DevEvent::Reload),
        }
    }

    let styles = changed_styles(old, new);

    if changed.is_empty() {
        return (!styles.is_empty()).then_some(DevEvent::CssUpdate { files: styles });
    }
    if !styles.is_empty() {
        return Some(DevEvent::Reload);
    }
    if changed
        .iter()
        .all(|(_, record)| record.hot_swappable && record.factory.is_some())
    {
        Some(DevEvent::Update {
            modules: changed.iter().map(|(id, _)| id.as_str().to_string()).collect(),
        })
    } else {
        Some(DevEvent::Reload)
    }
}

/// Output paths of stylesheets that are new or whose contents differ.
fn changed_styles(old: &BuildOutput, new: &BuildOutput) -> Vec<String> {
    let before: HashSet<(&str, &[u8])> = old
        .files_of_kind(OutputKind::Style)
        .map(|f| (f.path.as_str(), f.contents.as_slice()))
        .collect();
    new.files_of_kind(OutputKind::Style)
        .filter(|f| !before.contains(&(f.path.as_str(), f.contents.as_slice())))
        .map(|f| f.path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_bundler::{AssetId, ModuleRecord, ModuleType, OutputFile};
    use kiln_config::BuildMode;

    fn module(hash: &str, swappable: bool) -> ModuleRecord {
        ModuleRecord {
            module_type: ModuleType::Script,
            source_hash: hash.to_string(),
            factory: Some(format!("__kiln_define(\"x\", function () {{}}); // {hash}")),
            hot_swappable: swappable,
        }
    }

    fn output(modules: &[(&str, ModuleRecord)], files: Vec<OutputFile>) -> BuildOutput {
        let mut output = BuildOutput {
            mode: BuildMode::Development,
            files,
            warnings: Vec::new(),
            modules: Default::default(),
            entrypoints: Default::default(),
            written: false,
        };
        output.entrypoints.insert(
            "main".to_string(),
            vec!["static/js/runtime~main.js".to_string(), "static/js/main.js".to_string()],
        );
        for (id, record) in modules {
            output.modules.insert(AssetId::new(*id), record.clone());
        }
        output
    }

    fn file(path: &str, kind: OutputKind, contents: &str) -> OutputFile {
        OutputFile {
            path: path.to_string(),
            contents: contents.as_bytes().to_vec(),
            kind,
            origin: None,
        }
    }

    #[test]
    fn test_unchanged_build_sends_nothing() {
        let old = output(&[("src/main.js", module("a", false))], vec![]);
        let new = output(&[("src/main.js", module("a", false))], vec![]);
        assert_eq!(plan_update(&old, &new), None);
    }

    #[test]
    fn test_accepting_modules_are_swapped() {
        let old = output(
            &[("src/main.js", module("a", false)), ("src/util.js", module("b", true))],
            vec![],
        );
        let new = output(
            &[("src/main.js", module("a", false)), ("src/util.js", module("c", true))],
            vec![],
        );
        assert_eq!(
            plan_update(&old, &new),
            Some(DevEvent::Update {
                modules: vec!["src/util.js".to_string()]
            })
        );
    }

    #[test]
    fn test_non_accepting_change_reloads() {
        let old = output(&[("src/main.js", module("a", false))], vec![]);
        let new = output(&[("src/main.js", module("b", false))], vec![]);
        assert_eq!(plan_update(&old, &new), Some(DevEvent::Reload));
    }

    #[test]
    fn test_new_module_reloads() {
        let old = output(&[("src/main.js", module("a", true))], vec![]);
        let new = output(
            &[("src/main.js", module("b", true)), ("src/extra.js", module("c", true))],
            vec![],
        );
        assert_eq!(plan_update(&old, &new), Some(DevEvent::Reload));
    }

    #[test]
    fn test_extracted_style_change_is_a_css_update() {
        let modules = [("src/main.js", module("a", false))];
        let old = output(&modules, vec![file("static/css/main.css", OutputKind::Style, "a{}")]);
        let new = output(&modules, vec![file("static/css/main.css", OutputKind::Style, "b{}")]);
        assert_eq!(
            plan_update(&old, &new),
            Some(DevEvent::CssUpdate {
                files: vec!["static/css/main.css".to_string()]
            })
        );
    }

    #[test]
    fn test_html_change_reloads() {
        let modules = [("src/main.js", module("a", true))];
        let old = output(&modules, vec![file("index.html", OutputKind::Html, "<p>1</p>")]);
        let new = output(&modules, vec![file("index.html", OutputKind::Html, "<p>2</p>")]);
        assert_eq!(plan_update(&old, &new), Some(DevEvent::Reload));
    }

    #[test]
    fn test_entrypoint_change_reloads() {
        let old = output(&[("src/main.js", module("a", true))], vec![]);
        let mut new = output(&[("src/main.js", module("a", true))], vec![]);
        new.entrypoints.insert("admin".to_string(), vec!["static/js/admin.js".to_string()]);
        assert_eq!(plan_update(&old, &new), Some(DevEvent::Reload));
    }
}
