// SPDX-License-Identifier: MIT
// Per-connection state: the lifecycle state machine, negotiated handshake
// data, activity tracking, and the single serialized write path every frame
// goes through.

pub mod emitter;
pub mod manager;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::protocol::types::{ClientCapabilities, ClientInfo};
use crate::sampling::SamplingBridge;
use crate::transport::Transport;

// ─── State machine ───────────────────────────────────────────────────────────

/// Connection lifecycle. Transitions are monotone: a connection only ever
/// moves forward through this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Ready,
    Closing,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid state transition: {from} → {to}")]
pub struct StateError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

// ─── Connection ──────────────────────────────────────────────────────────────

pub struct Connection {
    id: Uuid,
    transport: std::sync::Arc<dyn Transport>,
    state: Mutex<ConnectionState>,
    /// Serializes every outbound frame so writes never interleave.
    write_lock: tokio::sync::Mutex<()>,
    /// Set once by a successful handshake, immutable thereafter.
    negotiated_version: OnceLock<String>,
    client_info: OnceLock<ClientInfo>,
    client_capabilities: OnceLock<ClientCapabilities>,
    /// Guards against two racing `initialize` requests on one connection.
    initialize_claimed: AtomicBool,
    metadata: Mutex<HashMap<String, String>>,
    connected_at: DateTime<Utc>,
    last_activity: Mutex<Instant>,
    /// Correlator for server-initiated `sampling/createMessage` requests.
    pub sampling: SamplingBridge,
}

impl Connection {
    pub fn new(id: Uuid, transport: std::sync::Arc<dyn Transport>) -> Self {
        Self {
            id,
            transport,
            state: Mutex::new(ConnectionState::Connecting),
            write_lock: tokio::sync::Mutex::new(()),
            negotiated_version: OnceLock::new(),
            client_info: OnceLock::new(),
            client_capabilities: OnceLock::new(),
            initialize_claimed: AtomicBool::new(false),
            metadata: Mutex::new(HashMap::new()),
            connected_at: Utc::now(),
            last_activity: Mutex::new(Instant::now()),
            sampling: SamplingBridge::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn peer(&self) -> String {
        self.transport.peer()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    // ─── State ──────────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Move forward through the lifecycle. Backward moves are rejected;
    /// transitioning to the current state is a no-op.
    pub fn transition(&self, to: ConnectionState) -> Result<(), StateError> {
        let mut state = self.state.lock().unwrap();
        if to < *state {
            return Err(StateError { from: *state, to });
        }
        *state = to;
        Ok(())
    }

    /// Claim the one-shot right to run `initialize`. The second caller —
    /// racing or late — gets `false`.
    pub fn claim_initialize(&self) -> bool {
        !self.initialize_claimed.swap(true, Ordering::SeqCst)
    }

    /// Record the handshake outcome. The Ready transition happens separately,
    /// after the initialize response is on the wire.
    pub fn complete_handshake(
        &self,
        version: String,
        capabilities: ClientCapabilities,
        info: ClientInfo,
    ) {
        let _ = self.negotiated_version.set(version);
        let _ = self.client_capabilities.set(capabilities);
        let _ = self.client_info.set(info);
    }

    pub fn negotiated_version(&self) -> Option<&str> {
        self.negotiated_version.get().map(String::as_str)
    }

    pub fn client_info(&self) -> Option<&ClientInfo> {
        self.client_info.get()
    }

    pub fn client_capabilities(&self) -> Option<&ClientCapabilities> {
        self.client_capabilities.get()
    }

    pub fn supports_sampling(&self) -> bool {
        self.client_capabilities
            .get()
            .is_some_and(ClientCapabilities::supports_sampling)
    }

    // ─── Activity / metadata ────────────────────────────────────────────────

    /// Bump the activity clock. Called on any inbound or outbound traffic.
    pub fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata
            .lock()
            .unwrap()
            .insert(key.into(), value.into());
    }

    pub fn metadata(&self, key: &str) -> Option<String> {
        self.metadata.lock().unwrap().get(key).cloned()
    }

    // ─── Writes ─────────────────────────────────────────────────────────────

    /// Send one frame. All writers funnel through here, so frames never
    /// interleave on the wire. A write failure moves the connection to
    /// Closing; the read loop notices and tears it down.
    pub async fn send_frame(&self, frame: &str) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.state() == ConnectionState::Closed {
            anyhow::bail!("connection closed");
        }
        match self.transport.send(frame).await {
            Ok(()) => {
                self.touch();
                Ok(())
            }
            Err(e) => {
                let _ = self.transition(ConnectionState::Closing);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("peer", &self.peer())
            .finish()
    }
}
