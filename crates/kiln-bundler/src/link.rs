//! Module linking: dependency scanning and conversion to registry factories.
//!
//! Every module ends up as a factory registered with the runtime:
//!
//! ```text
//! __kiln_define("src/a.js", function (module, exports, require) {
//! <one header line: imports, export getters>
//! <module body, line for line>
//! });
//! ```
//!
//! ES module syntax is rewritten in place with span edits. Removed statements
//! are replaced by as many newlines as they spanned, so body line N of the
//! factory is line N of the module source. Imported bindings are snapshots
//! taken when the factory runs; re-exports and `export *` stay live through
//! getters.

use std::fmt::Write as _;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, CallExpression, Declaration, ExportDefaultDeclarationKind, Expression,
    ImportDeclarationSpecifier, ImportExpression, ModuleDeclaration, ModuleExportName, Program,
};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};

use crate::asset::AssetId;
use crate::graph::{Dependency, DependencyKind, Module, ModuleOutput};
use crate::transform::json_string;
use crate::{Error, Result};

/// Marker text standing in for the public URL of an emitted asset until
/// fingerprinting substitutes it.
pub fn asset_placeholder(id: &AssetId) -> String {
    let hex = blake3::hash(id.as_str().as_bytes()).to_hex();
    format!("__kiln_asset_{}__", &hex[..16])
}

fn link_error(id: &AssetId, message: impl Into<String>) -> Error {
    Error::Transform {
        step: "link".to_string(),
        asset: id.to_string(),
        message: message.into(),
    }
}

/// Parse as an ES module, falling back to a classic script for CommonJS
/// code that is not valid in strict mode.
fn parse<'a>(allocator: &'a Allocator, id: &AssetId, code: &'a str) -> Result<Program<'a>> {
    let module = Parser::new(allocator, code, SourceType::mjs()).parse();
    if module.errors.is_empty() {
        return Ok(module.program);
    }
    let script = Parser::new(allocator, code, SourceType::cjs()).parse();
    if script.errors.is_empty() {
        return Ok(script.program);
    }
    Err(link_error(
        id,
        format!("failed to parse script: {}", module.errors[0]),
    ))
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(ident) => ident.name.to_string(),
        ModuleExportName::IdentifierReference(ident) => ident.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

/// `import()` and `require()` calls with literal specifiers.
#[derive(Default)]
struct CallCollector {
    calls: Vec<(DependencyKind, String, Span)>,
}

impl<'a> Visit<'a> for CallCollector {
    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        if let Expression::StringLiteral(lit) = &it.source {
            self.calls
                .push((DependencyKind::DynamicImport, lit.value.to_string(), it.span));
        }
        walk::walk_import_expression(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &it.callee {
            if callee.name == "require" && it.arguments.len() == 1 {
                if let Argument::StringLiteral(lit) = &it.arguments[0] {
                    self.calls
                        .push((DependencyKind::Require, lit.value.to_string(), lit.span));
                }
            }
        }
        walk::walk_call_expression(self, it);
    }
}

/// Every module reference in a script, in source order, unresolved.
pub fn scan_dependencies(id: &AssetId, code: &str) -> Result<Vec<Dependency>> {
    let allocator = Allocator::default();
    let program = parse(&allocator, id, code)?;

    let mut found: Vec<(u32, Dependency)> = Vec::new();
    for stmt in &program.body {
        let Some(decl) = stmt.as_module_declaration() else {
            continue;
        };
        let source = match decl {
            ModuleDeclaration::ImportDeclaration(import) => Some(&import.source),
            ModuleDeclaration::ExportNamedDeclaration(named) => named.source.as_ref(),
            ModuleDeclaration::ExportAllDeclaration(all) => Some(&all.source),
            _ => None,
        };
        if let Some(source) = source {
            found.push((
                source.span.start,
                Dependency::unresolved(source.value.as_str(), DependencyKind::Import),
            ));
        }
    }

    let mut calls = CallCollector::default();
    calls.visit_program(&program);
    for (kind, specifier, span) in calls.calls {
        found.push((span.start, Dependency::unresolved(specifier, kind)));
    }

    found.sort_by_key(|(start, _)| *start);
    let mut deps: Vec<Dependency> = Vec::with_capacity(found.len());
    for (_, dep) in found {
        if !deps.iter().any(|d| d.specifier == dep.specifier) {
            deps.push(dep);
        }
    }
    Ok(deps)
}

/// Append `scanned` entries whose specifier is not yet present.
pub fn merge_dependencies(existing: &mut Vec<Dependency>, scanned: Vec<Dependency>) {
    for dep in scanned {
        if !existing.iter().any(|d| d.specifier == dep.specifier) {
            existing.push(dep);
        }
    }
}

struct Rewriter<'m> {
    module: &'m Module,
    edits: Vec<(u32, u32, String)>,
    header: String,
    exports: Vec<(String, String)>,
    next_import: usize,
}

impl<'m> Rewriter<'m> {
    fn new(module: &'m Module) -> Self {
        Self {
            module,
            edits: Vec::new(),
            header: String::new(),
            exports: Vec::new(),
            next_import: 0,
        }
    }

    fn target(&self, specifier: &str) -> Result<&'m AssetId> {
        self.module
            .dependencies
            .iter()
            .find(|d| d.specifier == specifier)
            .and_then(|d| d.target.as_ref())
            .ok_or_else(|| {
                link_error(
                    &self.module.id,
                    format!("dependency '{specifier}' was never resolved"),
                )
            })
    }

    /// `var __kiln_mN = require("target");`, returning the variable name.
    fn require_var(&mut self, specifier: &str) -> Result<String> {
        let target = self.target(specifier)?;
        let var = format!("__kiln_m{}", self.next_import);
        self.next_import += 1;
        let _ = write!(
            self.header,
            "var {var} = require({}); ",
            json_string(target.as_str())
        );
        Ok(var)
    }

    /// Replace `span` with blank lines, keeping the line count.
    fn blank(&mut self, code: &str, span: Span) {
        let text = &code[span.start as usize..span.end as usize];
        let newlines = text.matches('\n').count();
        self.edits.push((span.start, span.end, "\n".repeat(newlines)));
    }

    fn finish(mut self, code: &str) -> String {
        if !self.exports.is_empty() {
            self.header.push_str("require.export(exports, {");
            for (i, (exported, expr)) in self.exports.iter().enumerate() {
                if i > 0 {
                    self.header.push(',');
                }
                let _ = write!(
                    self.header,
                    " {}: function () {{ return {expr}; }}",
                    json_string(exported)
                );
            }
            self.header.push_str(" }); ");
        }

        self.edits.sort_by_key(|(start, _, _)| *start);
        let mut body = String::with_capacity(code.len() + 64);
        let mut cursor = 0usize;
        for (start, end, text) in &self.edits {
            let (start, end) = (*start as usize, *end as usize);
            if start < cursor {
                continue;
            }
            body.push_str(&code[cursor..start]);
            body.push_str(text);
            cursor = end;
        }
        body.push_str(&code[cursor..]);

        format!("{}\n{}", self.header.trim_end(), body)
    }
}

/// Header line plus body for a script module.
fn script_factory(module: &Module, code: &str) -> Result<String> {
    let allocator = Allocator::default();
    let program = parse(&allocator, &module.id, code)?;
    let mut rw = Rewriter::new(module);
    let mut stars = String::new();

    for stmt in &program.body {
        let Some(decl) = stmt.as_module_declaration() else {
            continue;
        };
        match decl {
            ModuleDeclaration::ImportDeclaration(import) => {
                let var = rw.require_var(import.source.value.as_str())?;
                for spec in import.specifiers.iter().flatten() {
                    let (local, value) = match spec {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            (s.local.name.as_str(), format!("require.interop({var}).default"))
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            (s.local.name.as_str(), format!("require.ns({var})"))
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            let imported = export_name(&s.imported);
                            let value = if imported == "default" {
                                format!("require.interop({var}).default")
                            } else {
                                format!("{var}[{}]", json_string(&imported))
                            };
                            (s.local.name.as_str(), value)
                        }
                    };
                    let _ = write!(rw.header, "var {local} = {value}; ");
                }
                rw.blank(code, import.span);
            }
            ModuleDeclaration::ExportNamedDeclaration(named) => {
                if let Some(source) = &named.source {
                    let var = rw.require_var(source.value.as_str())?;
                    for spec in &named.specifiers {
                        let local = export_name(&spec.local);
                        let value = if local == "default" {
                            format!("require.interop({var}).default")
                        } else {
                            format!("{var}[{}]", json_string(&local))
                        };
                        rw.exports.push((export_name(&spec.exported), value));
                    }
                    rw.blank(code, named.span);
                } else if let Some(declaration) = &named.declaration {
                    match declaration {
                        Declaration::VariableDeclaration(var) => {
                            for declarator in &var.declarations {
                                for ident in declarator.id.get_binding_identifiers() {
                                    let name = ident.name.to_string();
                                    rw.exports.push((name.clone(), name));
                                }
                            }
                        }
                        Declaration::FunctionDeclaration(func) => {
                            if let Some(id) = &func.id {
                                rw.exports.push((id.name.to_string(), id.name.to_string()));
                            }
                        }
                        Declaration::ClassDeclaration(class) => {
                            if let Some(id) = &class.id {
                                rw.exports.push((id.name.to_string(), id.name.to_string()));
                            }
                        }
                        _ => {}
                    }
                    rw.edits
                        .push((named.span.start, declaration.span().start, String::new()));
                } else {
                    for spec in &named.specifiers {
                        rw.exports
                            .push((export_name(&spec.exported), export_name(&spec.local)));
                    }
                    rw.blank(code, named.span);
                }
            }
            ModuleDeclaration::ExportDefaultDeclaration(default) => {
                let inner = default.declaration.span();
                let named_decl = match &default.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        Some(func.id.as_ref().map(|id| id.name.to_string()))
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        Some(class.id.as_ref().map(|id| id.name.to_string()))
                    }
                    _ => None,
                };
                match named_decl {
                    Some(Some(name)) => {
                        rw.edits.push((default.span.start, inner.start, String::new()));
                        rw.exports.push(("default".to_string(), name));
                    }
                    Some(None) => {
                        rw.edits.push((
                            default.span.start,
                            inner.start,
                            "var __kiln_default = ".to_string(),
                        ));
                        rw.edits.push((inner.end, inner.end, ";".to_string()));
                        rw.exports
                            .push(("default".to_string(), "__kiln_default".to_string()));
                    }
                    None => {
                        rw.edits.push((
                            default.span.start,
                            inner.start,
                            "var __kiln_default = ".to_string(),
                        ));
                        rw.exports
                            .push(("default".to_string(), "__kiln_default".to_string()));
                    }
                }
            }
            ModuleDeclaration::ExportAllDeclaration(all) => {
                let var = rw.require_var(all.source.value.as_str())?;
                match &all.exported {
                    Some(name) => rw
                        .exports
                        .push((export_name(name), format!("require.ns({var})"))),
                    None => {
                        let _ = write!(stars, "require.star(exports, {var}); ");
                    }
                }
                rw.blank(code, all.span);
            }
            _ => {}
        }
    }

    let mut calls = CallCollector::default();
    calls.visit_program(&program);
    for (kind, specifier, span) in calls.calls {
        let target = json_string(rw.target(&specifier)?.as_str());
        let replacement = match kind {
            DependencyKind::DynamicImport => format!("require.load({target})"),
            _ => target,
        };
        rw.edits.push((span.start, span.end, replacement));
    }

    rw.header.push_str(&stars);
    Ok(rw.finish(code))
}

/// The factory body (header line, then module body) for `module`.
pub fn factory_body(module: &Module) -> Result<String> {
    match &module.output {
        ModuleOutput::Script { code } => script_factory(module, code),
        ModuleOutput::Json { text } => Ok(format!("\nmodule.exports = {};", text.trim())),
        ModuleOutput::Style { .. } => Ok("\n".to_string()),
        ModuleOutput::Resource { .. } => Ok(format!(
            "\nmodule.exports = {};",
            json_string(&asset_placeholder(&module.id))
        )),
        ModuleOutput::Inline { data_uri } => {
            Ok(format!("\nmodule.exports = {};", json_string(data_uri)))
        }
        ModuleOutput::Component { .. } => Err(link_error(
            &module.id,
            "component was never compiled; is the component hook active?",
        )),
    }
}

/// Wrap a factory body in its registration call.
pub fn define(id: &AssetId, body: &str) -> String {
    format!(
        "__kiln_define({}, function (module, exports, require) {{\n{body}\n}});\n",
        json_string(id.as_str())
    )
}

/// Lines `define` puts before the first body line.
pub const DEFINE_PREFIX_LINES: u32 = 1;
