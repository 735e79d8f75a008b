//! Build-time constant injection.
//!
//! Replaces references to each configured key in script modules with its
//! value, verbatim. Keys are identifiers (`__VUE_OPTIONS_API__`) or dotted
//! member paths (`process.env.NODE_ENV`); only expression references found
//! by the parser are replaced, never text inside strings, templates or
//! comments. Values are JavaScript source text, so a string constant
//! carries its own quotes (`"\"production\""`).

use indexmap::IndexMap;
use kiln_config::ConfigError;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, IdentifierReference, ObjectProperty, StaticMemberExpression};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_span::{SourceType, Span};
use serde::Deserialize;

use super::registry::{PluginId, parse_params};
use super::{BuildContext, Plugin, PluginPhase};
use crate::Result;
use crate::diagnostics::Diagnostic;
use crate::graph::{BuildGraph, ModuleOutput};

#[derive(Debug, Deserialize)]
struct Params {
    defines: IndexMap<String, String>,
}

pub struct DefineEnv {
    defines: IndexMap<String, String>,
}

impl DefineEnv {
    pub fn new(defines: IndexMap<String, String>) -> std::result::Result<Self, ConfigError> {
        if let Some(key) = defines.keys().find(|key| !is_member_path(key)) {
            return Err(ConfigError::InvalidValue {
                field: "defines".to_string(),
                message: format!("`{key}` is not an identifier or member path"),
            });
        }
        Ok(Self { defines })
    }

    pub fn from_params(params: &serde_json::Value) -> std::result::Result<Self, ConfigError> {
        let params: Params = parse_params(PluginId::DefineEnv, params)?;
        Self::new(params.defines)
    }

    /// `code` with every define applied, or `None` if nothing matched.
    /// Code that does not parse is left alone; linking reports it.
    pub fn replace(&self, code: &str) -> Option<String> {
        let mentioned = self
            .defines
            .keys()
            .any(|key| key.rsplit('.').next().is_some_and(|last| code.contains(last)));
        if !mentioned {
            return None;
        }

        let allocator = Allocator::default();
        let mut parsed = Parser::new(&allocator, code, SourceType::mjs()).parse();
        if !parsed.errors.is_empty() {
            parsed = Parser::new(&allocator, code, SourceType::cjs()).parse();
        }
        if !parsed.errors.is_empty() {
            return None;
        }

        let mut finder = References {
            defines: &self.defines,
            edits: Vec::new(),
        };
        finder.visit_program(&parsed.program);
        if finder.edits.is_empty() {
            return None;
        }

        finder.edits.sort_by_key(|(span, _)| span.start);
        let mut out = String::with_capacity(code.len());
        let mut last = 0;
        for (span, value) in finder.edits {
            let (start, end) = (span.start as usize, span.end as usize);
            out.push_str(&code[last..start]);
            out.push_str(&value);
            last = end;
        }
        out.push_str(&code[last..]);
        Some(out)
    }
}

fn is_member_path(key: &str) -> bool {
    key.split('.').all(|part| {
        let mut bytes = part.bytes();
        bytes
            .next()
            .is_some_and(|b| !b.is_ascii_digit() && is_ident(b))
            && bytes.all(is_ident)
    })
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// `a.b.c` for a chain of static member accesses on a plain identifier.
fn member_path(expr: &Expression<'_>) -> Option<String> {
    match expr {
        Expression::Identifier(ident) => Some(ident.name.to_string()),
        Expression::StaticMemberExpression(member) => {
            let object = member_path(&member.object)?;
            Some(format!("{object}.{}", member.property.name))
        }
        _ => None,
    }
}

/// Spans of define references and their replacement text. Edits never
/// overlap: a matched node is not walked further.
struct References<'d> {
    defines: &'d IndexMap<String, String>,
    edits: Vec<(Span, String)>,
}

impl<'a> Visit<'a> for References<'_> {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        if let Some(value) = self.defines.get(it.name.as_str()) {
            self.edits.push((it.span, value.clone()));
        }
    }

    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        if let Some(object) = member_path(&it.object) {
            let path = format!("{object}.{}", it.property.name);
            if let Some(value) = self.defines.get(&path) {
                self.edits.push((it.span, value.clone()));
                return;
            }
        }
        walk::walk_static_member_expression(self, it);
    }

    // `{ KEY }` must keep its property name.
    fn visit_object_property(&mut self, it: &ObjectProperty<'a>) {
        if it.shorthand {
            if let Expression::Identifier(ident) = &it.value {
                if let Some(value) = self.defines.get(ident.name.as_str()) {
                    self.edits.push((it.span, format!("{}: {value}", ident.name)));
                    return;
                }
            }
        }
        walk::walk_object_property(self, it);
    }
}

impl Plugin for DefineEnv {
    fn name(&self) -> &'static str {
        "define-env"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Transform
    }

    fn apply(&self, graph: &mut BuildGraph, _cx: &BuildContext<'_>) -> Result<Vec<Diagnostic>> {
        for id in &graph.fresh {
            let Some(module) = graph.modules.get_mut(id) else {
                continue;
            };
            // Vendor code included: framework builds read these flags.
            if let ModuleOutput::Script { code } = &mut module.output {
                if let Some(replaced) = self.replace(code) {
                    *code = replaced;
                }
            }
        }
        Ok(Vec::new())
    }
}
