//! Build command implementation.
//!
//! `kiln build` runs the pipeline once. Production output replaces the
//! output directory only after every stage has succeeded; development
//! builds stay in memory and are reported without writing anything.

use std::sync::Arc;
use std::time::Instant;

use kiln_bundler::{BuildOutput, CancellationFlag, Pipeline, TransformCache};
use kiln_config::{BuildMode, ConfigOverrides, EffectiveConfig};

use crate::cli::BuildArgs;
use crate::commands::utils;
use crate::error::{CliError, Result};
use crate::ui;

/// Execute the build command.
///
/// # Build Process
///
/// 1. Select the mode (defaults to production for this command)
/// 2. Load and validate configuration (CLI > Env > File > Defaults)
/// 3. Run the pipeline on a blocking thread, cancellable with Ctrl+C
/// 4. Report warnings and the file summary
pub async fn execute(args: BuildArgs) -> Result<()> {
    let mode = utils::select_mode(&args.project, BuildMode::Production)?;
    let overrides = ConfigOverrides {
        out_dir: args.out_dir.clone(),
        ..ConfigOverrides::default()
    };
    let config = utils::load_config(&args.project, mode, overrides)?;

    ui::info(&format!(
        "Building {} entr{} in {} mode",
        config.entries.len(),
        if config.entries.len() == 1 { "y" } else { "ies" },
        mode
    ));

    let started = Instant::now();
    let spinner = ui::Spinner::new("Building...");

    let cancel = CancellationFlag::new();
    let interrupt = spawn_interrupt_handler(cancel.clone());

    let result = build(config.clone(), cancel).await;
    interrupt.abort();

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            spinner.fail("Build failed");
            return Err(e);
        }
    };
    let elapsed = started.elapsed();
    spinner.finish(&format!("Built in {}", ui::format_duration(elapsed)));

    ui::print_warnings(&output.warnings);
    if !args.no_summary {
        ui::print_build_summary(&output, elapsed);
    }

    if output.written {
        ui::success(&format!(
            "Output written to {}",
            utils::display_path(&config.out_dir, &config.root)
        ));
    } else {
        ui::info("Development build kept in memory; nothing was written");
    }
    Ok(())
}

/// Run one build on the blocking pool.
///
/// The transform cache persists under the configured cache directory so a
/// second `kiln build` reuses expensive step results.
pub(crate) async fn build(config: EffectiveConfig, cancel: CancellationFlag) -> Result<BuildOutput> {
    let config = Arc::new(config);
    tokio::task::spawn_blocking(move || -> Result<BuildOutput> {
        let cache = TransformCache::new(&config.cache_dir);
        let pipeline = Pipeline::new(&config)?.with_cancellation(cancel);
        let output = pipeline.build(&cache)?;
        let stats = cache.stats();
        tracing::debug!(
            hits = stats.hits,
            misses = stats.misses,
            entries = stats.entries,
            "transform cache"
        );
        Ok(output)
    })
    .await
    .map_err(|e| CliError::Custom(format!("build task panicked: {e}")))?
}

/// Cancel the build on the first Ctrl+C.
fn spawn_interrupt_handler(cancel: CancellationFlag) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ui::warning("Interrupted, cancelling build...");
            cancel.cancel();
        }
    })
}
