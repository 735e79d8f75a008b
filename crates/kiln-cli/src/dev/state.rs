//! Shared state for the development server.
//!
//! The latest successful [`BuildOutput`] is held behind an `Arc` so requests
//! keep serving the old build while a rebuild runs; a finished build is
//! swapped in under the write lock in one step.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use kiln_bundler::{BuildOutput, OutputFile};
use kiln_config::DevServerConfig;
use tokio::sync::mpsc;
use tracing::debug;

use crate::dev::DevEvent;

/// Build status tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// No build has been performed yet
    NotStarted,
    /// Build is currently in progress
    InProgress { started_at: Instant },
    /// Build completed successfully
    Success { duration_ms: u64 },
    /// Build failed with error
    Failed { error: String },
}

impl BuildStatus {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, BuildStatus::InProgress { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BuildStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Events queued per SSE client before it counts as stalled.
pub const CLIENT_QUEUE: usize = 100;

/// Client connection tracker for Server-Sent Events.
pub type ClientRegistry = Arc<RwLock<HashMap<usize, mpsc::Sender<String>>>>;

/// Shared development server state.
pub struct DevServerState {
    config: DevServerConfig,
    /// Served when the build output has no file for a path.
    public_dir: PathBuf,
    /// URL prefix of every output file; always ends with `/`.
    public_path: String,
    status: RwLock<BuildStatus>,
    output: RwLock<Option<Arc<BuildOutput>>>,
    clients: ClientRegistry,
    next_client_id: AtomicUsize,
}

impl DevServerState {
    pub fn new(config: DevServerConfig, public_dir: PathBuf, public_path: impl Into<String>) -> Self {
        let mut public_path = public_path.into();
        if !public_path.ends_with('/') {
            public_path.push('/');
        }
        Self {
            config,
            public_dir,
            public_path,
            status: RwLock::new(BuildStatus::NotStarted),
            output: RwLock::new(None),
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_client_id: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &DevServerConfig {
        &self.config
    }

    pub fn public_dir(&self) -> &PathBuf {
        &self.public_dir
    }

    pub fn public_path(&self) -> &str {
        &self.public_path
    }

    pub fn start_build(&self) {
        *self.status.write() = BuildStatus::InProgress {
            started_at: Instant::now(),
        };
    }

    /// Swap in a finished build and return the one it replaces.
    pub fn complete_build(&self, output: BuildOutput, duration_ms: u64) -> Option<Arc<BuildOutput>> {
        let previous = self.output.write().replace(Arc::new(output));
        *self.status.write() = BuildStatus::Success { duration_ms };
        previous
    }

    /// Record a failure. The last good output keeps being served.
    pub fn fail_build(&self, error: String) {
        *self.status.write() = BuildStatus::Failed { error };
    }

    pub fn get_status(&self) -> BuildStatus {
        self.status.read().clone()
    }

    /// The build currently being served.
    pub fn output(&self) -> Option<Arc<BuildOutput>> {
        self.output.read().clone()
    }

    /// Map a request path onto an output file path, if it is under the
    /// public path.
    pub fn output_path<'a>(&self, request_path: &'a str) -> Option<&'a str> {
        let prefix = self.public_path.trim_end_matches('/');
        let rest = request_path.strip_prefix(prefix)?;
        rest.strip_prefix('/').or(if rest.is_empty() { Some("") } else { None })
    }

    /// The output file served at `request_path`.
    pub fn lookup(&self, request_path: &str) -> Option<OutputFile> {
        let path = self.output_path(request_path)?;
        if path.is_empty() {
            return None;
        }
        let output = self.output.read();
        output.as_ref()?.file(path).cloned()
    }

    /// Register a new SSE client. The receiver starts with a `connected`
    /// event queued.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        let _ = tx.try_send(encode(&DevEvent::Connected));
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    /// Broadcast an event to all connected clients without waiting on any
    /// of them. Clients that went away or stopped reading until their queue
    /// filled up are dropped, which ends their event stream.
    pub fn broadcast(&self, event: &DevEvent) {
        let json = encode(event);
        let mut clients = self.clients.write();
        clients.retain(|id, tx| match tx.try_send(json.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(client = id, "dropping stalled event stream");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }
}

fn encode(event: &DevEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| r#"{"type":"reload"}"#.to_string())
}

/// Shared state handle for passing around the application.
pub type SharedState = Arc<DevServerState>;

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_bundler::OutputKind;
    use kiln_config::BuildMode;

    fn server_config() -> DevServerConfig {
        DevServerConfig {
            host: "localhost".to_string(),
            port: 3003,
            open: false,
            hot_reload: true,
            history_fallback: true,
            debounce_ms: 50,
        }
    }

    fn output(script: &str) -> BuildOutput {
        BuildOutput {
            mode: BuildMode::Development,
            files: vec![OutputFile {
                path: "static/js/main.js".to_string(),
                contents: script.as_bytes().to_vec(),
                kind: OutputKind::Script,
                origin: None,
            }],
            warnings: Vec::new(),
            modules: Default::default(),
            entrypoints: Default::default(),
            written: false,
        }
    }

    #[test]
    fn test_build_status_failed() {
        let status = BuildStatus::Failed {
            error: "Test error".to_string(),
        };
        assert!(!status.is_in_progress());
        assert!(!status.is_success());
        assert_eq!(status.error(), Some("Test error"));
    }

    #[test]
    fn test_failed_build_keeps_serving_last_output() {
        let state = DevServerState::new(server_config(), PathBuf::from("public"), "/");
        assert!(matches!(state.get_status(), BuildStatus::NotStarted));

        state.start_build();
        assert!(state.get_status().is_in_progress());
        assert!(state.complete_build(output("one"), 12).is_none());

        state.start_build();
        state.fail_build("syntax error".to_string());
        assert_eq!(state.get_status().error(), Some("syntax error"));
        let file = state.lookup("/static/js/main.js").unwrap();
        assert_eq!(file.contents, b"one");

        let previous = state.complete_build(output("two"), 8).unwrap();
        assert_eq!(previous.files[0].contents, b"one");
        assert!(state.get_status().is_success());
    }

    #[test]
    fn test_lookup_honours_public_path() {
        let state = DevServerState::new(server_config(), PathBuf::from("public"), "/app");
        state.complete_build(output("x"), 1);

        assert_eq!(state.public_path(), "/app/");
        assert!(state.lookup("/app/static/js/main.js").is_some());
        assert!(state.lookup("/static/js/main.js").is_none());
        assert!(state.lookup("/application/static/js/main.js").is_none());
        assert_eq!(state.output_path("/app"), Some(""));
    }

    #[tokio::test]
    async fn test_clients_receive_connected_then_broadcasts() {
        let state = Arc::new(DevServerState::new(server_config(), PathBuf::from("public"), "/"));

        let (id1, mut rx1) = state.register_client();
        let (id2, rx2) = state.register_client();
        assert_ne!(id1, id2);
        assert_eq!(state.client_count(), 2);

        drop(rx2);
        state.broadcast(&DevEvent::Reload);
        assert_eq!(state.client_count(), 1);

        assert_eq!(rx1.recv().await.unwrap(), r#"{"type":"connected"}"#);
        assert_eq!(rx1.recv().await.unwrap(), r#"{"type":"reload"}"#);
    }

    #[tokio::test]
    async fn test_stalled_client_is_dropped_without_blocking() {
        let state = DevServerState::new(server_config(), PathBuf::from("public"), "/");
        let (_stalled, _never_read) = state.register_client();
        let (_, mut live) = state.register_client();

        // The connected event already took one slot in each queue.
        for _ in 0..CLIENT_QUEUE {
            state.broadcast(&DevEvent::Reload);
            while live.try_recv().is_ok() {}
        }

        assert_eq!(state.client_count(), 1);
        state.broadcast(&DevEvent::Reload);
        assert_eq!(live.recv().await.unwrap(), r#"{"type":"reload"}"#);
    }
}
