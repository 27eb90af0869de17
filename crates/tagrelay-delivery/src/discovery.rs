//! Server-discovery collaborator boundary.
//!
//! The backend exposes a "best MQTT server" lookup; this crate only consumes
//! it. The trait keeps the watchdog testable and lets the composition root
//! plug in the real REST-backed lookup.

use std::future::Future;

/// Supplies candidate broker hosts, best first.
///
/// Returned futures are `Send` so the watchdog can await them from a
/// spawned task.
pub trait ServerDiscovery: Send + Sync {
    /// Candidate `host:port` strings in preference order. An empty result
    /// means discovery itself is down; callers keep their last-known list.
    fn best_servers(&self) -> impl Future<Output = Vec<String>> + Send;
}

/// Fixed candidate list, for the CLI and for tests.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    servers: Vec<String>,
}

impl StaticDiscovery {
    /// Wrap a fixed list of `host:port` candidates.
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }
}

impl ServerDiscovery for StaticDiscovery {
    async fn best_servers(&self) -> Vec<String> {
        self.servers.clone()
    }
}
