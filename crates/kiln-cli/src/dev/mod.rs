//! Development server module.
//!
//! - In-memory builds served over HTTP ([`server`])
//! - Hot module replacement over Server-Sent Events ([`hmr`])
//! - File watching with debouncing ([`watcher`])
//! - Error overlay in the browser ([`error_overlay`])

pub mod builder;
pub mod error_overlay;
pub mod hmr;
pub mod server;
pub mod state;
pub mod watcher;

pub use builder::DevBuilder;
pub use hmr::plan_update;
pub use server::{bind, build_router, serve};
pub use state::{BuildStatus, DevServerState, SharedState};
pub use watcher::{FileChange, FileWatcher, next_batch};

use serde::{Deserialize, Serialize};

/// Messages pushed to connected pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DevEvent {
    /// Sent once when a page subscribes.
    Connected,

    /// Swap these modules in place. Factories are fetched from
    /// `/__kiln_hmr/update/{id}`.
    Update { modules: Vec<String> },

    /// Re-fetch these extracted stylesheets.
    CssUpdate { files: Vec<String> },

    /// Reload the page.
    Reload,

    /// The last rebuild failed; show the overlay.
    BuildFailed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_string(&DevEvent::Update {
            modules: vec!["src/util.js".to_string()],
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"update","modules":["src/util.js"]}"#);

        let json = serde_json::to_string(&DevEvent::CssUpdate { files: vec![] }).unwrap();
        assert_eq!(json, r#"{"type":"css-update","files":[]}"#);

        let json = serde_json::to_string(&DevEvent::BuildFailed {
            error: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"build-failed","error":"boom"}"#);
    }
}
