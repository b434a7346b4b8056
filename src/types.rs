// file: src/types.rs
// description: wire-level data models for the orchestration event stream and command channel

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical unit of information flowing from the backend to subscribers.
///
/// Immutable once received: the client never rewrites payload fields and
/// never reorders events by `timestamp` (arrival order is dispatch order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: String,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Server production time in the local timezone, for display.
    pub fn timestamp_local(&self) -> DateTime<Local> {
        self.timestamp.with_timezone(&Local)
    }
}

// Event type tags the backend currently emits. Dispatch routing works on the
// raw string, so unknown tags still reach wildcard subscribers.
pub const EVENT_AGENT_DIALOGUE_UPDATE: &str = "agent_dialogue_update";
pub const EVENT_TASK_PROGRESS: &str = "task_progress";
pub const EVENT_AGENT_STATUS_CHANGED: &str = "agent_status_changed";
pub const EVENT_CONTENT_GENERATED: &str = "content_generated";

/// Progress payload carried by `task_progress` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub progress_percentage: f64,
    pub current_phase: String,
    pub message: String,
}

/// Status transition payload carried by `agent_status_changed` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub old_status: String,
    pub new_status: String,
}

/// Client-to-server command envelope for the bidirectional channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    UserInput { data: UserInputData },
    AgentInterrupt { agent_id: String },
    TaskControl { action: TaskControlAction },
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInputData {
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskControlAction {
    Pause,
    Resume,
    Cancel,
}

impl std::fmt::Display for TaskControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskControlAction::Pause => write!(f, "pause"),
            TaskControlAction::Resume => write!(f, "resume"),
            TaskControlAction::Cancel => write!(f, "cancel"),
        }
    }
}

impl OutboundMessage {
    pub fn user_input(input: impl Into<String>, target_agent: Option<String>) -> Self {
        OutboundMessage::UserInput {
            data: UserInputData {
                input: input.into(),
                target_agent,
            },
        }
    }

    pub fn agent_interrupt(agent_id: impl Into<String>) -> Self {
        OutboundMessage::AgentInterrupt {
            agent_id: agent_id.into(),
        }
    }

    pub fn task_control(action: TaskControlAction) -> Self {
        OutboundMessage::TaskControl { action }
    }
}
