//! Single-file component splitting.
//!
//! A `.vue` file is cut into its top-level `<template>`, `<script>` and
//! `<style>` blocks. The blocks then re-enter dispatch as virtual assets
//! (see the component hook plugin), so a `<style lang="scss">` block runs
//! through exactly the same chain as a `.scss` file. A `<script setup>`
//! block is compiled into an options-object module first.

use memchr::memmem;

use super::script_setup::compile_script_setup;
use super::{Content, Payload, TransformContext, TransformStep, Transformer};
use crate::Result;
use crate::graph::{BlockKind, ComponentBlock, ModuleOutput};

pub struct ComponentCompiler;

impl Transformer for ComponentCompiler {
    fn transform(
        &self,
        input: Payload,
        step: &TransformStep,
        cx: &TransformContext<'_>,
    ) -> Result<Payload> {
        let source = cx.text(&input.content, step)?;
        let mut blocks = split_component(source).map_err(|e| cx.error(step, e))?;
        for block in blocks.iter_mut().filter(|b| b.setup) {
            block.content =
                compile_script_setup(&block.content, &block.lang).map_err(|e| cx.error(step, e))?;
        }
        Ok(Payload::new(Content::Module(ModuleOutput::Component { blocks })))
    }
}

/// Split component source into blocks, in source order.
pub fn split_component(source: &str) -> std::result::Result<Vec<ComponentBlock>, String> {
    let bytes = source.as_bytes();
    let mut blocks: Vec<ComponentBlock> = Vec::new();
    let mut pointer = 0;

    while let Some(offset) = memchr::memchr(b'<', &bytes[pointer..]) {
        let start = pointer + offset;

        if bytes[start..].starts_with(b"<!--") {
            pointer = memmem::find(&bytes[start..], b"-->")
                .map(|end| start + end + 3)
                .ok_or_else(|| format!("unclosed comment at byte {start}"))?;
            continue;
        }

        let Some((kind, name)) = block_kind(&bytes[start + 1..]) else {
            pointer = start + 1;
            continue;
        };

        let attrs_start = start + 1 + name.len();
        let tag_end = find_closing_angle(bytes, attrs_start)
            .ok_or_else(|| format!("unclosed <{name}> tag at byte {start}"))?;
        let attrs = &source[attrs_start..tag_end];

        if attribute(attrs, "src").is_some() {
            return Err(format!("<{name} src> blocks are not supported"));
        }

        let (content, next) = if bytes[tag_end - 1] == b'/' {
            ("", tag_end + 1)
        } else {
            let content_start = tag_end + 1;
            let content_end = match kind {
                BlockKind::Template => find_template_end(bytes, content_start),
                _ => memmem::find(&bytes[content_start..], format!("</{name}>").as_bytes())
                    .map(|p| content_start + p),
            }
            .ok_or_else(|| format!("unclosed <{name}> block at byte {start}"))?;
            (
                &source[content_start..content_end],
                content_end + name.len() + 3,
            )
        };

        let index = blocks.iter().filter(|b| b.kind == kind).count();
        match kind {
            BlockKind::Script if index > 0 => {
                return Err(
                    "a component may only have one <script> or <script setup> block".to_string(),
                );
            }
            BlockKind::Template if index > 0 => {
                return Err("a component may only have one <template> block".to_string());
            }
            _ => {}
        }

        let default_lang = match kind {
            BlockKind::Template => "html",
            BlockKind::Script => "js",
            BlockKind::Style => "css",
        };
        blocks.push(ComponentBlock {
            kind,
            index,
            lang: attribute(attrs, "lang").unwrap_or(default_lang).to_string(),
            content: content.to_string(),
            scoped: has_flag(attrs, "scoped"),
            setup: kind == BlockKind::Script && has_flag(attrs, "setup"),
        });
        pointer = next;
    }

    Ok(blocks)
}

fn block_kind(after_angle: &[u8]) -> Option<(BlockKind, &'static str)> {
    let candidates = [
        (BlockKind::Template, "template"),
        (BlockKind::Script, "script"),
        (BlockKind::Style, "style"),
    ];
    candidates.into_iter().find(|(_, name)| {
        after_angle.starts_with(name.as_bytes())
            && after_angle
                .get(name.len())
                .is_some_and(|c| matches!(c, b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/'))
    })
}

/// Finds the closing `>` of a tag, skipping quoted attribute values.
fn find_closing_angle(bytes: &[u8], start: usize) -> Option<usize> {
    let mut quote = None;
    for (i, &byte) in bytes[start..].iter().enumerate() {
        match (byte, quote) {
            (b'"' | b'\'', None) => quote = Some(byte),
            (q, Some(open)) if q == open => quote = None,
            (b'>', None) => return Some(start + i),
            _ => {}
        }
    }
    None
}

/// Templates may nest `<template>` elements; find the close that balances
/// the outer block.
fn find_template_end(bytes: &[u8], start: usize) -> Option<usize> {
    let open = memmem::Finder::new(b"<template");
    let close = memmem::Finder::new(b"</template>");
    let mut depth = 0usize;
    let mut pointer = start;

    loop {
        let next_close = pointer + close.find(&bytes[pointer..])?;
        match open.find(&bytes[pointer..next_close]) {
            Some(offset) => {
                depth += 1;
                pointer += offset + "<template".len();
            }
            None if depth == 0 => return Some(next_close),
            None => {
                depth -= 1;
                pointer = next_close + "</template>".len();
            }
        }
    }
}

fn attribute<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!("{name}=");
    let mut search = attrs;
    while let Some(pos) = search.find(&pattern) {
        let preceded_by_space = pos == 0
            || search[..pos]
                .chars()
                .next_back()
                .is_some_and(char::is_whitespace);
        let value = &search[pos + pattern.len()..];
        if preceded_by_space {
            return Some(match value.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let inner = &value[1..];
                    inner.find(q).map_or(inner, |end| &inner[..end])
                }
                _ => {
                    let end = value
                        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                        .unwrap_or(value.len());
                    &value[..end]
                }
            });
        }
        search = value;
    }
    None
}

fn has_flag(attrs: &str, name: &str) -> bool {
    attrs
        .split(|c: char| c.is_whitespace() || c == '/')
        .any(|token| token == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_blocks_with_langs_and_indices() {
        let source = r#"<template>
  <div class="app"><template v-if="ok"><span>hi</span></template></div>
</template>

<script>
export default { name: 'App' }
</script>

<style lang="scss" scoped>
.app { .x { color: red; } }
</style>
<style>
body { margin: 0 }
</style>
"#;
        let blocks = split_component(source).unwrap();
        assert_eq!(blocks.len(), 4);

        assert_eq!(blocks[0].kind, BlockKind::Template);
        assert!(blocks[0].content.contains("<template v-if=\"ok\"><span>hi</span></template>"));
        assert!(blocks[0].content.trim_end().ends_with("</div>"));

        assert_eq!(blocks[1].kind, BlockKind::Script);
        assert_eq!(blocks[1].lang, "js");

        assert_eq!((blocks[2].index, blocks[2].lang.as_str()), (0, "scss"));
        assert!(blocks[2].scoped);
        assert_eq!((blocks[3].index, blocks[3].lang.as_str()), (1, "css"));
        assert!(!blocks[3].scoped);
    }

    #[test]
    fn comments_and_lookalike_tags_are_skipped() {
        let source = "<!-- <script>nope</script> -->\n<scripts></scripts>\n<script>ok()</script>";
        let blocks = split_component(source).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "ok()");
    }

    #[test]
    fn script_setup_is_flagged() {
        let blocks =
            split_component("<script setup lang=\"ts\">const a: number = 1</script>").unwrap();
        assert!(blocks[0].setup);
        assert_eq!(blocks[0].lang, "ts");
        assert_eq!(blocks[0].content, "const a: number = 1");

        let err = split_component("<script>export default {}</script><script setup>let a</script>")
            .unwrap_err();
        assert!(err.contains("<script setup>"));
    }

    #[test]
    fn rejects_unsupported_forms() {
        assert!(split_component("<style src=\"./a.css\"></style>").is_err());
        assert!(split_component("<template><div></template>x").is_ok());
        assert!(split_component("<template><div>").is_err());
        assert!(split_component("<script>a</script><script>b</script>").is_err());
    }
}
