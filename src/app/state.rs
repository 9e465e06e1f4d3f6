//! Application state shared by the game listener and HTTP routes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::game::SessionRegistry;
use crate::matchmaking::MatchmakingService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub matchmaking: Arc<MatchmakingService>,
    pub sessions: Arc<SessionRegistry>,
    connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let sessions = Arc::new(SessionRegistry::new());

        // Arc for sharing across cloned AppState
        let matchmaking = Arc::new(MatchmakingService::new(
            sessions.clone(),
            config.round_deadline,
        ));

        Self {
            config,
            matchmaking,
            sessions,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of open player connections
    pub fn connected_players(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Count a connection until the returned guard is dropped
    pub fn track_connection(&self) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            connections: self.connections.clone(),
        }
    }
}

pub struct ConnectionGuard {
    connections: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }
}
