//! Rebuilds for the development server.
//!
//! Every rebuild runs the full pipeline on the blocking pool against one
//! process-wide [`TransformCache`], so only assets whose content changed are
//! transformed again. The server keeps answering from the previous build
//! until [`DevBuilder::rebuild`] swaps the new one in.

use std::sync::Arc;
use std::time::Instant;

use kiln_bundler::{BuildOutput, Pipeline, TransformCache};
use kiln_config::EffectiveConfig;

use crate::dev::{DevEvent, SharedState, hmr};
use crate::error::{CliError, Result};
use crate::ui;

pub struct DevBuilder {
    config: Arc<EffectiveConfig>,
    cache: Arc<TransformCache>,
}

impl DevBuilder {
    pub fn new(config: EffectiveConfig) -> Self {
        let cache = TransformCache::new(&config.cache_dir);
        Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
        }
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    /// One in-memory build.
    pub async fn build(&self) -> Result<BuildOutput> {
        let config = Arc::clone(&self.config);
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || Pipeline::new(&config)?.build(&cache))
            .await
            .map_err(|e| CliError::Custom(format!("build task panicked: {e}")))?
            .map_err(CliError::from)
    }

    /// Build, publish the result to `state` and notify connected pages.
    ///
    /// Returns whether the build succeeded. A failure never replaces the
    /// output being served.
    pub async fn rebuild(&self, state: &SharedState) -> bool {
        let was_failing = state.get_status().error().is_some();
        state.start_build();
        let started = Instant::now();

        match self.build().await {
            Ok(output) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                ui::print_warnings(&output.warnings);
                let previous = state.complete_build(output, duration_ms);

                let event = match (previous, state.output()) {
                    _ if was_failing => Some(DevEvent::Reload),
                    (Some(previous), Some(current)) => hmr::plan_update(&previous, &current),
                    _ => None,
                };
                let event = match event {
                    Some(DevEvent::Update { .. } | DevEvent::CssUpdate { .. })
                        if !state.config().hot_reload =>
                    {
                        Some(DevEvent::Reload)
                    }
                    other => other,
                };

                ui::success(&format!("Built in {duration_ms}ms"));
                if let Some(event) = event {
                    tracing::debug!(?event, clients = state.client_count(), "broadcasting");
                    state.broadcast(&event);
                }
                true
            }
            Err(e) => {
                let message = e.to_string();
                ui::error(&format!("Build failed: {message}"));
                state.fail_build(message.clone());
                state.broadcast(&DevEvent::BuildFailed { error: message });
                false
            }
        }
    }
}
