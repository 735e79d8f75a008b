//! Check command implementation.
//!
//! Loads the configuration exactly as a build would, validates it and prints
//! the effective settings to stdout.

use kiln_config::{BuildMode, ConfigOverrides};

use crate::cli::{CheckArgs, CheckFormat};
use crate::commands::utils;
use crate::error::{CliError, Result};
use crate::ui;

/// Execute the check command.
///
/// Nothing is built. Entries are checked against the filesystem; with
/// `--fs` the source and public directories must exist too.
pub async fn execute(args: CheckArgs) -> Result<()> {
    let mode = utils::select_mode(&args.project, BuildMode::Development)?;
    let config = utils::load_config(&args.project, mode, ConfigOverrides::default())?;

    if args.fs {
        for (field, dir) in [("src_dir", &config.src_dir), ("public_dir", &config.public_dir)] {
            if !dir.is_dir() {
                return Err(kiln_config::ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("directory not found: {}", dir.display()),
                }
                .into());
            }
        }
    }

    let rendered = match args.format {
        CheckFormat::Toml => Some(
            config
                .to_toml()
                .map_err(|e| CliError::Custom(format!("cannot render configuration: {e}")))?,
        ),
        CheckFormat::Json => Some(serde_json::to_string_pretty(&config)?),
        CheckFormat::None => None,
    };
    if let Some(text) = rendered {
        println!("{}", text.trim_end());
    }

    ui::success(&format!(
        "Configuration is valid ({} mode, {} entr{})",
        mode,
        config.entries.len(),
        if config.entries.len() == 1 { "y" } else { "ies" }
    ));
    Ok(())
}
