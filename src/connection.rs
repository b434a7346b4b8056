// file: src/connection.rs
// description: per-task connection lifecycle state machine and reconnection accounting

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Lifecycle of one logical task channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Reconnecting,
    Failed,
}

/// Capability class of the live transport primitive, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    Bidirectional,
    PushOnly,
    None,
}

/// Snapshot returned by `TaskStreamClient::connection_status`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub connection_type: ConnectionMode,
    pub task_id: Option<String>,
}

/// What the reconnection policy decided after an unclean close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt; carries the attempt number just recorded.
    Retry(u32),
    /// Attempt budget spent, connection is now Failed.
    Exhausted,
}

/// State for one logical connection, bound to a single task id.
///
/// Exactly one live transport primitive may exist per instance; the owning
/// supervisor task tears down the old primitive before dialing a new one.
#[derive(Debug)]
pub struct Connection {
    pub connection_id: String,
    pub task_id: Option<String>,
    pub state: ConnectionState,
    pub mode: ConnectionMode,
    pub attempt_count: u32,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            task_id: None,
            state: ConnectionState::Idle,
            mode: ConnectionMode::None,
            attempt_count: 0,
        }
    }
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle/Closed/Failed -> Connecting. Returns false (and warns) if a
    /// connect is already in flight or open, in which case the caller must
    /// not dial a second primitive.
    pub fn begin_connect(&mut self, task_id: &str, mode: ConnectionMode) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Reconnecting => {
                warn!(
                    task_id = %task_id,
                    state = ?self.state,
                    "connect requested while a connection is already active; ignoring"
                );
                false
            }
            _ => {
                self.connection_id = uuid::Uuid::new_v4().to_string();
                self.task_id = Some(task_id.to_string());
                self.mode = mode;
                self.state = ConnectionState::Connecting;
                self.attempt_count = 0;
                true
            }
        }
    }

    /// Connecting/Reconnecting -> Open. A clean open resets the attempt budget.
    pub fn mark_open(&mut self) {
        self.state = ConnectionState::Open;
        self.attempt_count = 0;
    }

    /// Unclean close observed. Moves to Reconnecting and charges one attempt,
    /// or to Failed once the budget is spent.
    pub fn record_unclean_close(&mut self, max_attempts: u32) -> RetryDecision {
        self.attempt_count += 1;
        if self.attempt_count > max_attempts {
            self.state = ConnectionState::Failed;
            RetryDecision::Exhausted
        } else {
            self.state = ConnectionState::Reconnecting;
            RetryDecision::Retry(self.attempt_count)
        }
    }

    /// Reconnect delay elapsed, a new dial is starting.
    pub fn mark_reconnect_dialing(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Explicit disconnect. Terminal for this connect call; no auto-reconnect.
    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.mode = ConnectionMode::None;
    }

    /// First dial failed at construction time. Surfaced to the caller, no retry.
    pub fn mark_failed(&mut self) {
        self.state = ConnectionState::Failed;
        self.mode = ConnectionMode::None;
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn can_send(&self) -> bool {
        self.state == ConnectionState::Open && self.mode == ConnectionMode::Bidirectional
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            is_connected: self.is_open(),
            connection_type: if self.is_open() {
                self.mode
            } else {
                ConnectionMode::None
            },
            task_id: self.task_id.clone(),
        }
    }
}

pub type SharedConnection = Arc<Mutex<Connection>>;
