//! Development server command implementation.
//!
//! Orchestrates the dev server lifecycle:
//! - Bind the listener (a busy port stops here, before anything else runs)
//! - Initial in-memory build
//! - HTTP server with hot module replacement
//! - Debounced rebuilds on file changes
//! - Graceful shutdown on Ctrl+C

use std::sync::Arc;
use std::time::Duration;

use kiln_config::{BuildMode, ConfigOverrides, DevOverrides, DevServerConfig};
use tokio::signal;

use crate::cli::DevArgs;
use crate::commands::utils;
use crate::dev::{self, DevBuilder, DevServerState, FileWatcher};
use crate::error::{CliError, Result};
use crate::ui;

/// Execute the dev command.
///
/// The server always builds in development mode; `--mode production` is
/// rejected and mode variables in the environment are ignored.
pub async fn execute(args: DevArgs) -> Result<()> {
    if let Some(flag) = &args.project.mode {
        let mode: BuildMode = flag.parse()?;
        if mode.is_production() {
            return Err(CliError::InvalidArgument(
                "the dev server only runs in development mode; use `kiln build` for production"
                    .to_string(),
            ));
        }
    }

    let overrides = ConfigOverrides {
        out_dir: None,
        dev: DevOverrides {
            host: args.host.clone(),
            port: args.port,
            open: args.no_open.then_some(false),
        },
    };
    let config = utils::load_config(&args.project, BuildMode::Development, overrides)?;
    let server_config = DevServerConfig::from_effective(&config);

    let listener = dev::bind(&server_config).await?;
    let url = server_config.url();

    let state = Arc::new(DevServerState::new(
        server_config.clone(),
        config.public_dir.clone(),
        config.public_path.clone(),
    ));

    let ignored = vec![config.out_dir.clone(), config.cache_dir.clone()];
    let root = config.root.clone();
    let builder = DevBuilder::new(config);

    ui::info("Performing initial build...");
    if !builder.rebuild(&state).await {
        ui::warning("Serving the error overlay until the next successful build");
    }

    let (watcher, mut changes) = FileWatcher::new(root, ignored)?;
    tracing::debug!(root = %watcher.root().display(), "watching for changes");

    let mut server_handle = tokio::spawn(dev::serve(listener, Arc::clone(&state)));
    ui::success(&format!("Development server running at {url}"));

    if server_config.open {
        open_browser(&url);
    }
    ui::info("Press Ctrl+C to stop");

    let debounce = Duration::from_millis(server_config.debounce_ms);
    loop {
        tokio::select! {
            batch = dev::next_batch(&mut changes, debounce) => {
                let Some(batch) = batch else {
                    ui::warning("File watcher stopped");
                    break;
                };
                for change in &batch {
                    tracing::debug!(path = %change.path().display(), "changed");
                }
                ui::info(&format!(
                    "{} changed, rebuilding...",
                    describe_batch(&batch, watcher.root())
                ));
                builder.rebuild(&state).await;
            }

            _ = signal::ctrl_c() => {
                ui::info("Shutting down development server...");
                break;
            }

            result = &mut server_handle => {
                return match result {
                    Ok(Ok(())) => Err(CliError::Server("server stopped unexpectedly".to_string())),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(CliError::Server(format!("server task failed: {e}"))),
                };
            }
        }
    }

    server_handle.abort();
    ui::success("Development server stopped");
    Ok(())
}

fn describe_batch(batch: &[dev::FileChange], root: &std::path::Path) -> String {
    match batch {
        [single] => utils::display_path(single.path(), root),
        many => format!("{} files", many.len()),
    }
}

/// Open the server URL in the default browser.
///
/// Uses platform-specific commands:
/// - macOS: `open`
/// - Windows: `start`
/// - Linux: `xdg-open`
fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    if let Err(e) = result {
        ui::warning(&format!("Failed to open browser: {e}"));
    }
}
