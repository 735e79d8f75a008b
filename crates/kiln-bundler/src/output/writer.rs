//! Atomic, path-checked writing of build output.
//!
//! Every output path is validated against the output directory before
//! anything touches the disk. Files are written to temporary siblings and
//! renamed into place only once all of them were written; a failure removes
//! every temporary file again.
//!
//! A clean write stages the complete output in a sibling directory and swaps
//! it with the old output directory at the end, so a failed or interrupted
//! build leaves the previous output untouched instead of a half-cleared
//! directory.

use std::fs;
use std::path::{Path, PathBuf};

use path_clean::PathClean;
use tracing::{debug, warn};

use crate::graph::OutputFile;
use crate::{Error, Result};

const TEMP_SUFFIX: &str = ".kiln-tmp";

/// Writes `files` below `dir`.
///
/// With `clean`, the directory afterwards contains exactly `files`; without
/// it, existing files not part of this build are left in place.
///
/// # Atomic Guarantees
///
/// Either all files are written successfully or none are written. If any
/// operation fails, all previously written files are rolled back.
pub fn write_output(files: &[OutputFile], dir: &Path, clean: bool) -> Result<()> {
    let dir = validate_and_normalize_dir(dir)?;

    if clean {
        write_clean(files, &dir)
    } else {
        fs::create_dir_all(&dir).map_err(|e| {
            Error::WriteFailure(format!(
                "Failed to create output directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
        let operations = plan(files, &dir)?;
        write_files_atomic(&operations)
    }
}

fn plan<'a>(files: &'a [OutputFile], dir: &Path) -> Result<Vec<(PathBuf, &'a [u8])>> {
    files
        .iter()
        .map(|file| Ok((validate_output_path(dir, &file.path)?, file.contents.as_slice())))
        .collect()
}

fn sibling(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = dir.file_name().ok_or_else(|| {
        Error::InvalidOutputPath(format!(
            "Refusing to clear '{}': not a named directory",
            dir.display()
        ))
    })?;
    Ok(dir.with_file_name(format!(".{}.{suffix}", name.to_string_lossy())))
}

fn write_clean(files: &[OutputFile], dir: &Path) -> Result<()> {
    let staging = sibling(dir, "kiln-staging")?;
    let retired = sibling(dir, "kiln-old")?;
    remove_dir_if_exists(&staging)?;
    remove_dir_if_exists(&retired)?;

    // Validate against the real directory so error messages name it.
    plan(files, dir)?;
    let operations = plan(files, &staging)?;

    fs::create_dir_all(&staging).map_err(|e| {
        Error::WriteFailure(format!(
            "Failed to create staging directory '{}': {}",
            staging.display(),
            e
        ))
    })?;
    if let Err(err) = write_files_atomic(&operations) {
        remove_staging(&staging);
        return Err(err);
    }

    let had_previous = dir.exists();
    if had_previous {
        if let Err(e) = fs::rename(dir, &retired) {
            remove_staging(&staging);
            return Err(Error::WriteFailure(format!(
                "Failed to move previous output '{}' aside: {}",
                dir.display(),
                e
            )));
        }
    }

    if let Err(e) = fs::rename(&staging, dir) {
        if had_previous {
            if let Err(restore) = fs::rename(&retired, dir) {
                warn!(
                    path = %retired.display(),
                    "failed to restore previous output: {restore}"
                );
            }
        }
        remove_staging(&staging);
        return Err(Error::WriteFailure(format!(
            "Failed to move staged output into '{}': {}",
            dir.display(),
            e
        )));
    }

    if had_previous {
        if let Err(e) = fs::remove_dir_all(&retired) {
            warn!(path = %retired.display(), "failed to remove previous output: {e}");
        }
    }
    debug!(dir = %dir.display(), files = files.len(), "output directory replaced");
    Ok(())
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| {
            Error::WriteFailure(format!(
                "Failed to remove stale directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
    }
    Ok(())
}

fn remove_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        warn!(path = %staging.display(), "failed to remove staging directory: {e}");
    }
}

/// Validates and normalizes a directory path.
fn validate_and_normalize_dir(dir: &Path) -> Result<PathBuf> {
    let cleaned = dir.clean();

    let absolute = if cleaned.is_absolute() {
        cleaned
    } else {
        std::env::current_dir()
            .map_err(|e| {
                Error::InvalidOutputPath(format!("Failed to get current directory: {}", e))
            })?
            .join(&cleaned)
            .clean()
    };

    Ok(absolute)
}

/// Validates an output path to prevent directory traversal.
///
/// Both sides are cleaned, joined and cleaned again; the result must still
/// lie under `base_dir`.
pub(crate) fn validate_output_path(base_dir: &Path, filename: &str) -> Result<PathBuf> {
    if filename.contains('\0') {
        return Err(Error::InvalidOutputPath(
            "Filename contains null byte".to_string(),
        ));
    }

    #[cfg(target_os = "windows")]
    {
        let upper = filename.to_uppercase();
        let device_names = [
            "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
            "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
        ];
        for device in &device_names {
            if upper == *device || upper.starts_with(&format!("{}.", device)) {
                return Err(Error::InvalidOutputPath(format!(
                    "Filename is a reserved device name: {}",
                    filename
                )));
            }
        }
    }

    let filename_path = Path::new(filename).clean();
    let full_path = base_dir.join(&filename_path).clean();

    if !full_path.starts_with(base_dir) || full_path == base_dir {
        return Err(Error::InvalidOutputPath(format!(
            "Path '{}' escapes output directory '{}' (resolved to '{}')",
            filename,
            base_dir.display(),
            full_path.display()
        )));
    }

    Ok(full_path)
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(TEMP_SUFFIX);
    target.with_file_name(name)
}

/// Writes multiple files atomically with automatic rollback on failure.
///
/// Two phases: every file goes to a temporary sibling first, then all
/// temporary files are renamed to their final names.
fn write_files_atomic(operations: &[(PathBuf, &[u8])]) -> Result<()> {
    let mut temp_files = Vec::new();

    for (target_path, content) in operations {
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                cleanup_temp_files(&temp_files);
                Error::WriteFailure(format!(
                    "Failed to create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let temp_path = temp_path(target_path);
        fs::write(&temp_path, content).map_err(|e| {
            cleanup_temp_files(&temp_files);
            Error::WriteFailure(format!(
                "Failed to write temporary file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;

        temp_files.push((temp_path, target_path.clone()));
    }

    for (temp_path, target_path) in &temp_files {
        fs::rename(temp_path, target_path).map_err(|e| {
            cleanup_temp_files(&temp_files);
            Error::WriteFailure(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_path.display(),
                target_path.display(),
                e
            ))
        })?;
    }

    Ok(())
}

/// Best-effort removal of temporary files; we are already failing.
fn cleanup_temp_files(temp_files: &[(PathBuf, PathBuf)]) {
    for (temp_path, _) in temp_files {
        if temp_path.exists() {
            if let Err(e) = fs::remove_file(temp_path) {
                warn!(path = %temp_path.display(), "failed to clean up temporary file: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_output_path_normal() {
        let base = Path::new("/tmp/output");
        let result = validate_output_path(base, "index.html");
        assert_eq!(result.unwrap(), Path::new("/tmp/output/index.html"));
    }

    #[test]
    fn test_validate_output_path_nested() {
        let base = Path::new("/tmp/output");
        let result = validate_output_path(base, "static/js/main.js");
        assert_eq!(result.unwrap(), Path::new("/tmp/output/static/js/main.js"));
    }

    #[test]
    fn test_validate_output_path_traversal() {
        let base = Path::new("/tmp/output");
        for name in ["../etc/passwd", "safe/../../../../../../etc/passwd", "."] {
            let result = validate_output_path(base, name);
            assert!(
                matches!(result, Err(Error::InvalidOutputPath(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_output_path_null_byte() {
        let base = Path::new("/tmp/output");
        assert!(validate_output_path(base, "file\0name.js").is_err());
    }

    #[test]
    fn temp_names_keep_the_extension() {
        assert_eq!(
            temp_path(Path::new("/out/main.js")),
            Path::new("/out/main.js.kiln-tmp")
        );
        assert_ne!(
            temp_path(Path::new("/out/main.js")),
            temp_path(Path::new("/out/main.css"))
        );
    }
}
