//! `<script setup>` compilation.
//!
//! The block is rewritten into an ordinary options-object module so it can
//! take the same path as a classic `<script>`:
//!
//! ```text
//! import { ref } from "vue";
//! export default {
//!   props: ["title"],
//!   setup(__props, __ctx) {
//!     const props = __props;
//!     const count = ref(0);
//!     return { ref, props, count };
//!   }
//! };
//! ```
//!
//! Imports (and exported types) stay at module level. Every other top-level
//! statement runs inside `setup`, and every top-level value binding is
//! returned so the runtime-compiled template can see it. `defineProps` and
//! `defineEmits` become the `props` and `emits` options; `defineExpose`
//! calls `__ctx.expose`.

use std::fmt::Write as _;

use oxc_allocator::Allocator;
use oxc_ast::ast::{CallExpression, Expression, ModuleDeclaration};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_semantic::{SemanticBuilder, SymbolFlags};
use oxc_span::{GetSpan, SourceType, Span};

#[derive(Default)]
struct Macros {
    props: Option<String>,
    emits: Option<String>,
    edits: Vec<(Span, String)>,
    error: Option<String>,
}

impl Macros {
    fn option(&mut self, it: &CallExpression<'_>, source: &str, name: &str) -> Option<String> {
        if it.type_arguments.is_some() {
            self.error = Some(format!(
                "type-only {name}<...>() is not supported; pass a runtime declaration"
            ));
            return None;
        }
        Some(
            it.arguments
                .first()
                .map_or_else(|| "undefined".to_string(), |arg| arg.span().source_text(source).to_string()),
        )
    }
}

struct MacroFinder<'s> {
    source: &'s str,
    macros: Macros,
}

impl<'a> Visit<'a> for MacroFinder<'_> {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        let Expression::Identifier(callee) = &it.callee else {
            walk::walk_call_expression(self, it);
            return;
        };
        match callee.name.as_str() {
            "defineProps" => {
                if self.macros.props.is_some() {
                    self.macros.error = Some("defineProps() may only be called once".to_string());
                }
                self.macros.props = self.macros.option(it, self.source, "defineProps");
                self.macros.edits.push((it.span, "__props".to_string()));
            }
            "defineEmits" => {
                if self.macros.emits.is_some() {
                    self.macros.error = Some("defineEmits() may only be called once".to_string());
                }
                self.macros.emits = self.macros.option(it, self.source, "defineEmits");
                self.macros.edits.push((it.span, "__ctx.emit".to_string()));
            }
            "defineExpose" => {
                self.macros.edits.push((callee.span, "__ctx.expose".to_string()));
                walk::walk_call_expression(self, it);
            }
            _ => walk::walk_call_expression(self, it),
        }
    }
}

/// Compile a `<script setup>` block written in `lang` into a module whose
/// default export is a component options object.
pub fn compile_script_setup(source: &str, lang: &str) -> Result<String, String> {
    let allocator = Allocator::default();
    let source_type = match lang {
        "ts" => SourceType::ts(),
        "tsx" => SourceType::tsx(),
        _ => SourceType::mjs(),
    };
    let parsed = Parser::new(&allocator, source, source_type).parse();
    if let Some(first) = parsed.errors.first() {
        return Err(format!("failed to parse <script setup>: {first}"));
    }
    let program = parsed.program;

    let mut hoisted = String::new();
    let mut edits: Vec<(Span, String)> = Vec::new();
    for stmt in &program.body {
        let Some(decl) = stmt.as_module_declaration() else {
            continue;
        };
        let hoist = match decl {
            ModuleDeclaration::ImportDeclaration(_) => true,
            ModuleDeclaration::ExportNamedDeclaration(named) => {
                named.export_kind.is_type()
                    || named.declaration.as_ref().is_some_and(|d| d.is_type())
            }
            _ => false,
        };
        if !hoist {
            return Err(
                "<script setup> cannot export values; use defineExpose() instead".to_string(),
            );
        }
        let span = decl.span();
        hoisted.push_str(span.source_text(source));
        hoisted.push('\n');
        edits.push((span, String::new()));
    }

    let mut finder = MacroFinder {
        source,
        macros: Macros::default(),
    };
    finder.visit_program(&program);
    let macros = finder.macros;
    if let Some(error) = macros.error {
        return Err(error);
    }
    edits.extend(macros.edits);
    edits.sort_by_key(|(span, _)| span.start);

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let root = scoping.root_scope_id();
    let mut bindings: Vec<(u32, &str)> = scoping
        .iter_bindings_in(root)
        .filter(|&symbol| {
            let flags = scoping.symbol_flags(symbol);
            (flags.is_value() || flags.contains(SymbolFlags::Import)) && !flags.is_type_import()
        })
        .map(|symbol| (scoping.symbol_span(symbol).start, scoping.symbol_name(symbol)))
        .collect();
    bindings.sort_unstable();

    let mut body = String::with_capacity(source.len());
    let mut last = 0;
    for (span, replacement) in &edits {
        let (start, end) = (span.start as usize, span.end as usize);
        body.push_str(&source[last..start]);
        body.push_str(replacement);
        last = end;
    }
    body.push_str(&source[last..]);

    let mut out = hoisted;
    out.push_str("export default {\n");
    if let Some(props) = &macros.props {
        let _ = writeln!(out, "  props: {props},");
    }
    if let Some(emits) = &macros.emits {
        let _ = writeln!(out, "  emits: {emits},");
    }
    out.push_str("  setup(__props, __ctx) {\n");
    out.push_str(body.trim_end());
    let names: Vec<&str> = bindings.iter().map(|(_, name)| *name).collect();
    let _ = write!(out, "\n    return {{ {} }};\n  }}\n}};\n", names.join(", "));
    Ok(out)
}
