//! Online/offline state tracking.
//!
//! Platform signals are fed in through [`ConnectivityMonitor::report`].
//! Repeated signals for the state already held are dropped, so each real
//! transition is broadcast exactly once.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A change in connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

impl Transition {
    pub fn is_online(&self) -> bool {
        matches!(self, Transition::WentOnline)
    }
}

/// Current connectivity plus change notifications.
pub trait ConnectivitySignal: Send + Sync {
    fn is_online(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<Transition>;
}

/// Debounced connectivity state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    online: Arc<Mutex<bool>>,
    event_tx: broadcast::Sender<Transition>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            online: Arc::new(Mutex::new(initially_online)),
            event_tx,
        }
    }

    /// Feed a platform signal. Returns the transition fired, or `None` when
    /// the signal repeats the current state.
    pub fn report(&self, online: bool) -> Option<Transition> {
        {
            let mut current = self.online.lock();
            if *current == online {
                debug!(online, "Duplicate connectivity signal ignored");
                return None;
            }
            *current = online;
        }

        let transition = if online {
            Transition::WentOnline
        } else {
            Transition::WentOffline
        };
        info!(?transition, "Connectivity changed");
        // No receivers is fine.
        let _ = self.event_tx.send(transition);
        Some(transition)
    }
}

impl ConnectivitySignal for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.online.lock()
    }

    fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.event_tx.subscribe()
    }
}
