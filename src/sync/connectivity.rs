//! Online/offline signal that gates dispatch attempts.
//!
//! The monitor does not probe the network itself; the application feeds it
//! transitions from whatever platform signal it has (reachability callback,
//! failed request, user toggle) and the dispatcher queries it synchronously.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// Tracks the client's view of its own connectivity.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: AtomicBool,
}

impl ConnectivityMonitor {
    /// Create a monitor that starts online.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }

    /// Create a monitor that starts offline.
    #[must_use]
    pub const fn offline() -> Self {
        Self {
            online: AtomicBool::new(false),
        }
    }

    /// Current connectivity as last reported.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record a connectivity transition.
    ///
    /// Returns `true` when the value actually changed, so the composition
    /// root can use an offline→online edge to trigger a dispatch.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        let changed = previous != online;
        if changed {
            info!(online, "connectivity changed");
        }
        changed
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
