//! Bookkeeping for live WebSocket sessions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Active,
    Processing,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub session_id: String,
    pub client: Option<String>,
    pub state: ConnectionState,
    pub started: Instant,
    pub last_activity: Instant,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub characters_synthesised: u64,
    pub errors: u64,
}

impl ConnectionInfo {
    fn new(session_id: String, client: Option<String>) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            client,
            state: ConnectionState::Active,
            started: now,
            last_activity: now,
            messages_received: 0,
            messages_sent: 0,
            characters_synthesised: 0,
            errors: 0,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn duration(&self) -> Duration {
        self.last_activity.duration_since(self.started)
    }

    fn view(&self, now: Instant) -> SessionView {
        SessionView {
            session_id: self.session_id.clone(),
            client: self.client.clone(),
            state: self.state,
            connected_seconds: now.duration_since(self.started).as_secs_f64(),
            idle_seconds: now.duration_since(self.last_activity).as_secs_f64(),
            messages_received: self.messages_received,
            messages_sent: self.messages_sent,
            characters_synthesised: self.characters_synthesised,
            errors: self.errors,
        }
    }
}

/// Serializable view of one live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub client: Option<String>,
    pub state: ConnectionState,
    pub connected_seconds: f64,
    pub idle_seconds: f64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub characters_synthesised: u64,
    pub errors: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ConnectionTotals {
    pub total_connections: u64,
    pub total_disconnections: u64,
    pub total_messages_received: u64,
    pub total_messages_sent: u64,
    pub total_characters: u64,
    pub total_errors: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub active_connections: usize,
    pub max_connections: usize,
    #[serde(flatten)]
    pub totals: ConnectionTotals,
    /// Live sessions, oldest first.
    pub sessions: Vec<SessionView>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<String, ConnectionInfo>,
    totals: ConnectionTotals,
}

/// Tracks sessions up to `max_connections`. Counters of a removed session are
/// folded into the aggregate totals.
pub struct ConnectionManager {
    max_connections: usize,
    inner: Mutex<Inner>,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Counters stay usable even if a holder panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a session. Returns `false` when the server is at capacity.
    pub fn add(&self, session_id: &str, client: Option<String>) -> bool {
        let mut inner = self.lock();
        if inner.connections.len() >= self.max_connections {
            return false;
        }
        inner.connections.insert(
            session_id.to_string(),
            ConnectionInfo::new(session_id.to_string(), client),
        );
        inner.totals.total_connections += 1;
        true
    }

    pub fn remove(&self, session_id: &str) -> Option<ConnectionInfo> {
        let mut inner = self.lock();
        let mut info = inner.connections.remove(session_id)?;
        info.state = ConnectionState::Closed;
        info.touch();

        let totals = &mut inner.totals;
        totals.total_disconnections += 1;
        totals.total_messages_received += info.messages_received;
        totals.total_messages_sent += info.messages_sent;
        totals.total_characters += info.characters_synthesised;
        totals.total_errors += info.errors;
        Some(info)
    }

    pub fn active_count(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let inner = self.lock();
        let now = Instant::now();
        let mut live: Vec<&ConnectionInfo> = inner.connections.values().collect();
        live.sort_by(|a, b| {
            a.started
                .cmp(&b.started)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        ConnectionSnapshot {
            active_connections: inner.connections.len(),
            max_connections: self.max_connections,
            totals: inner.totals.clone(),
            sessions: live.into_iter().map(|info| info.view(now)).collect(),
        }
    }

    fn update(&self, session_id: &str, f: impl FnOnce(&mut ConnectionInfo)) {
        if let Some(info) = self.lock().connections.get_mut(session_id) {
            f(info);
            info.touch();
        }
    }

    pub fn record_message_received(&self, session_id: &str) {
        self.update(session_id, |info| info.messages_received += 1);
    }

    pub fn record_message_sent(&self, session_id: &str) {
        self.update(session_id, |info| info.messages_sent += 1);
    }

    pub fn record_characters(&self, session_id: &str, characters: usize) {
        self.update(session_id, |info| {
            info.characters_synthesised += characters as u64
        });
    }

    pub fn record_error(&self, session_id: &str) {
        self.update(session_id, |info| info.errors += 1);
    }

    pub fn set_state(&self, session_id: &str, state: ConnectionState) {
        self.update(session_id, |info| info.state = state);
    }
}
