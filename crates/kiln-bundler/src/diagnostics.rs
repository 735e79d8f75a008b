//! Non-fatal build findings.
//!
//! Fatal problems are [`crate::Error`]s and abort the pipeline. Everything
//! else (lint findings, an image that failed to recompress, a plugin
//! complaint) is a [`Diagnostic`], collected per stage and reported together
//! once the build finishes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::asset::AssetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticOrigin {
    Lint,
    Optimization,
    Plugin,
}

impl fmt::Display for DiagnosticOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticOrigin::Lint => "lint",
            DiagnosticOrigin::Optimization => "optimization",
            DiagnosticOrigin::Plugin => "plugin",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub origin: DiagnosticOrigin,
    pub asset: Option<AssetId>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(origin: DiagnosticOrigin, asset: Option<AssetId>, message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            origin,
            asset,
            message: message.into(),
        }
    }

    pub fn error(origin: DiagnosticOrigin, asset: Option<AssetId>, message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            origin,
            asset,
            message: message.into(),
        }
    }

    /// Emit through `tracing` at a level matching the severity.
    pub fn log(&self) {
        let asset = self.asset.as_ref().map(AssetId::as_str).unwrap_or("-");
        match self.severity {
            DiagnosticSeverity::Warning => {
                tracing::warn!(origin = %self.origin, asset, "{}", self.message)
            }
            DiagnosticSeverity::Error => {
                tracing::error!(origin = %self.origin, asset, "{}", self.message)
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.asset {
            Some(asset) => write!(f, "[{}] {}: {}", self.origin, asset, self.message),
            None => write!(f, "[{}] {}", self.origin, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_origin_and_asset() {
        let diag = Diagnostic::warning(
            DiagnosticOrigin::Optimization,
            Some(AssetId::new("src/logo.png")),
            "could not decode image",
        );
        assert_eq!(diag.to_string(), "[optimization] src/logo.png: could not decode image");

        let diag = Diagnostic::error(DiagnosticOrigin::Lint, None, "lint cache unreadable");
        assert_eq!(diag.to_string(), "[lint] lint cache unreadable");
    }
}
