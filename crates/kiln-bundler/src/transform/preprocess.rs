//! less, sass and stylus compilation through their command-line tools.
//!
//! The source is piped on stdin and CSS is read back from stdout. The
//! process runs in the stylesheet's directory so relative `@import`s inside
//! the preprocessor language resolve the way they do on the command line.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::debug;

use super::{Content, Payload, StepKind, TransformContext, TransformStep, Transformer};
use crate::Result;

pub struct Preprocessor;

impl Transformer for Preprocessor {
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

        let mut command_line = step.option_strings("command");
        if command_line.is_empty() {
            return Err(cx.error(step, "no preprocessor command configured"));
        }
        let is_indented_sass = matches!(step.kind, StepKind::Preprocess { .. })
            && cx.asset.extension().as_deref() == Some(".sass");
        if is_indented_sass && !command_line.iter().any(|a| a == "--indented") {
            command_line.push("--indented".to_string());
        }

        let program = which::which(&command_line[0]).map_err(|e| {
            cx.error(
                step,
                format!("'{}' was not found on PATH: {e}", command_line[0]),
            )
        })?;
        let cwd = cx.root.join(cx.asset.dir());
        debug!(asset = %cx.asset, program = %program.display(), "running preprocessor");

        let mut child = Command::new(&program)
            .args(&command_line[1..])
            .current_dir(&cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| cx.error(step, format!("failed to start '{}': {e}", command_line[0])))?;

        if let Some(mut stdin) = child.stdin.take() {
            let source = source.as_bytes().to_vec();
            std::thread::spawn(move || {
                let _ = stdin.write_all(&source);
            });
        }

        let output = child
            .wait_with_output()
            .map_err(|e| cx.error(step, format!("preprocessor did not finish: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(cx.error(
                step,
                format!("{} exited with {}: {}", command_line[0], output.status, stderr.trim()),
            ));
        }

        let css = String::from_utf8(output.stdout)
            .map_err(|e| cx.error(step, format!("preprocessor output is not UTF-8: {e}")))?;
        Ok(Payload::new(Content::Css(css)).with_dependencies(dependencies))
    }
}
