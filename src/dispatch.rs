// file: src/dispatch.rs
// description: inbound frame parsing and publish/subscribe fan-out to registered handlers

use crate::{
    monitoring,
    types::{
        EVENT_AGENT_DIALOGUE_UPDATE, EVENT_AGENT_STATUS_CHANGED, EVENT_TASK_PROGRESS, Event,
        StatusChange, TaskProgress,
    },
};
use serde_json::Value;
use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex},
};
use tracing::{debug, error, trace, warn};

/// A subscriber callback. Handlers run synchronously on the dispatch path
/// and must not block; anything long-running belongs on a spawned task.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

#[derive(Default)]
struct Registry {
    typed: HashMap<String, Vec<Handler>>,
    wildcard: Vec<Handler>,
}

/// Instance-owned subscription registry and fan-out engine.
///
/// The registry is scoped to one client instance so independent task
/// connections never share listener state. It survives reconnects: a
/// consumer subscribes once per logical task, not once per physical
/// connection.
#[derive(Default)]
pub struct EventDispatcher {
    registry: Mutex<Registry>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events with the given type tag. Registering
    /// the same handler twice means two invocations per event; dedupe is
    /// intentionally not performed.
    pub fn on(&self, event_type: &str, handler: Handler) {
        let mut registry = self.registry.lock().expect("dispatch registry poisoned");
        registry
            .typed
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    /// Register a wildcard handler invoked for every event.
    pub fn on_any(&self, handler: Handler) {
        let mut registry = self.registry.lock().expect("dispatch registry poisoned");
        registry.wildcard.push(handler);
    }

    /// Remove the first registration of `handler` under `event_type`,
    /// matched by pointer equality. Returns whether anything was removed.
    pub fn off(&self, event_type: &str, handler: &Handler) -> bool {
        let mut registry = self.registry.lock().expect("dispatch registry poisoned");
        if let Some(handlers) = registry.typed.get_mut(event_type)
            && let Some(pos) = handlers.iter().position(|h| Arc::ptr_eq(h, handler))
        {
            handlers.remove(pos);
            if handlers.is_empty() {
                registry.typed.remove(event_type);
            }
            return true;
        }
        false
    }

    /// Remove the first wildcard registration of `handler`.
    pub fn off_any(&self, handler: &Handler) -> bool {
        let mut registry = self.registry.lock().expect("dispatch registry poisoned");
        if let Some(pos) = registry
            .wildcard
            .iter()
            .position(|h| Arc::ptr_eq(h, handler))
        {
            registry.wildcard.remove(pos);
            return true;
        }
        false
    }

    /// Parse a raw text frame and fan it out. Unparseable frames are logged
    /// and dropped; nothing propagates back into the transport loop.
    pub fn handle_inbound(&self, raw: &str) {
        match serde_json::from_str::<Event>(raw) {
            Ok(event) => self.dispatch(&event),
            Err(e) => {
                monitoring::PARSE_ERROR_COUNTER.increment(1);
                warn!(
                    error = %e,
                    frame = %raw.chars().take(100).collect::<String>(),
                    "dropping unparseable inbound frame"
                );
            }
        }
    }

    /// Fan one event out: wildcard handlers first, then handlers registered
    /// under the event's type, both in subscription order. A panicking
    /// handler is caught and logged and never stops the remaining handlers.
    pub fn dispatch(&self, event: &Event) {
        // Snapshot under the lock, invoke outside it, so a handler may call
        // on/off without deadlocking.
        let (wildcard, typed) = {
            let registry = self.registry.lock().expect("dispatch registry poisoned");
            (
                registry.wildcard.clone(),
                registry
                    .typed
                    .get(&event.event_type)
                    .cloned()
                    .unwrap_or_default(),
            )
        };

        trace!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            wildcard = wildcard.len(),
            typed = typed.len(),
            "dispatching event"
        );
        monitoring::EVENTS_DISPATCHED_COUNTER.increment(1);

        for handler in wildcard.iter().chain(typed.iter()) {
            if catch_unwind(AssertUnwindSafe(|| (**handler)(event))).is_err() {
                monitoring::HANDLER_ERROR_COUNTER.increment(1);
                error!(
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    "subscriber handler panicked; continuing with remaining handlers"
                );
            }
        }
    }

    /// Number of live registrations, wildcard included. Diagnostic only.
    pub fn handler_count(&self) -> usize {
        let registry = self.registry.lock().expect("dispatch registry poisoned");
        registry.wildcard.len() + registry.typed.values().map(Vec::len).sum::<usize>()
    }
}

// Convenience handler factories for the common event shapes. These add no
// dispatch semantics; they wrap a payload extraction around an ordinary
// handler so callers avoid hand-rolled serde_json digging. Register them
// under the matching type tag; each also re-checks the tag so registering
// one as a wildcard stays harmless.

/// Handler for `agent_dialogue_update` passing `(agent_id, data)`.
pub fn dialogue_update_handler<F>(callback: F) -> Handler
where
    F: Fn(Option<&str>, &Value) + Send + Sync + 'static,
{
    Arc::new(move |event: &Event| {
        if event.event_type == EVENT_AGENT_DIALOGUE_UPDATE {
            callback(event.agent_id.as_deref(), &event.data);
        }
    })
}

/// Handler for `agent_status_changed` passing `(agent_id, old, new)`.
pub fn status_change_handler<F>(callback: F) -> Handler
where
    F: Fn(Option<&str>, &str, &str) + Send + Sync + 'static,
{
    Arc::new(move |event: &Event| {
        if event.event_type != EVENT_AGENT_STATUS_CHANGED {
            return;
        }
        match serde_json::from_value::<StatusChange>(event.data.clone()) {
            Ok(change) => callback(
                event.agent_id.as_deref(),
                &change.old_status,
                &change.new_status,
            ),
            Err(e) => debug!(error = %e, "status change payload missing expected fields"),
        }
    })
}

/// Handler for `task_progress` passing `(percentage, phase, message)`.
pub fn task_progress_handler<F>(callback: F) -> Handler
where
    F: Fn(f64, &str, &str) + Send + Sync + 'static,
{
    Arc::new(move |event: &Event| {
        if event.event_type != EVENT_TASK_PROGRESS {
            return;
        }
        match serde_json::from_value::<TaskProgress>(event.data.clone()) {
            Ok(progress) => callback(
                progress.progress_percentage,
                &progress.current_phase,
                &progress.message,
            ),
            Err(e) => debug!(error = %e, "task progress payload missing expected fields"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(event_type: &str, data: Value) -> Event {
        Event {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            task_id: "t1".to_string(),
            agent_id: None,
            data,
            timestamp: Utc::now(),
        }
    }

    fn recording_handler(log: Arc<Mutex<Vec<String>>>, tag: &str) -> Handler {
        let tag = tag.to_string();
        Arc::new(move |_event: &Event| {
            log.lock().unwrap().push(tag.clone());
        })
    }

    #[test]
    fn malformed_frames_are_dropped_without_invoking_subscribers() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on_any(recording_handler(log.clone(), "any"));

        for frame in [
            "",
            "not json",
            "{",
            "[1, 2, 3]",
            r#"{"event_type": "task_progress"}"#,
            r#"{"event_id": "1", "event_type": 7, "task_id": "t", "timestamp": "x"}"#,
        ] {
            dispatcher.handle_inbound(frame);
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn wildcard_handlers_run_before_typed_handlers_in_subscription_order() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on("task_progress", recording_handler(log.clone(), "typed-1"));
        dispatcher.on_any(recording_handler(log.clone(), "any-1"));
        dispatcher.on_any(recording_handler(log.clone(), "any-2"));
        dispatcher.on("task_progress", recording_handler(log.clone(), "typed-2"));

        dispatcher.dispatch(&event("task_progress", Value::Null));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["any-1", "any-2", "typed-1", "typed-2"]
        );
    }

    #[test]
    fn unsubscribed_types_reach_only_wildcard_handlers() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on("task_progress", recording_handler(log.clone(), "typed"));
        dispatcher.on_any(recording_handler(log.clone(), "any"));

        dispatcher.dispatch(&event("content_generated", Value::Null));
        assert_eq!(*log.lock().unwrap(), vec!["any"]);
    }

    #[test]
    fn duplicate_registration_means_two_invocations_and_off_removes_one() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = recording_handler(log.clone(), "h");
        dispatcher.on("task_progress", handler.clone());
        dispatcher.on("task_progress", handler.clone());
        assert_eq!(dispatcher.handler_count(), 2);

        dispatcher.dispatch(&event("task_progress", Value::Null));
        assert_eq!(log.lock().unwrap().len(), 2);

        assert!(dispatcher.off("task_progress", &handler));
        assert_eq!(dispatcher.handler_count(), 1);
        log.lock().unwrap().clear();
        dispatcher.dispatch(&event("task_progress", Value::Null));
        assert_eq!(log.lock().unwrap().len(), 1);

        assert!(dispatcher.off("task_progress", &handler));
        assert!(!dispatcher.off("task_progress", &handler));
        assert_eq!(dispatcher.handler_count(), 0);
    }

    #[test]
    fn handler_count_spans_typed_and_wildcard_registrations() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        assert_eq!(dispatcher.handler_count(), 0);

        let wildcard = recording_handler(log.clone(), "any");
        dispatcher.on_any(wildcard.clone());
        dispatcher.on("task_progress", recording_handler(log.clone(), "typed"));
        assert_eq!(dispatcher.handler_count(), 2);

        assert!(dispatcher.off_any(&wildcard));
        assert_eq!(dispatcher.handler_count(), 1);
    }

    #[test]
    fn off_any_removes_only_the_matching_registration() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let keep = recording_handler(log.clone(), "keep");
        let removed = recording_handler(log.clone(), "removed");
        dispatcher.on_any(keep.clone());
        dispatcher.on_any(removed.clone());

        assert!(dispatcher.off_any(&removed));
        dispatcher.dispatch(&event("task_progress", Value::Null));
        assert_eq!(*log.lock().unwrap(), vec!["keep"]);
    }

    #[test]
    fn panicking_handler_does_not_stop_the_remaining_handlers() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on_any(Arc::new(|_event: &Event| panic!("subscriber bug")));
        dispatcher.on_any(recording_handler(log.clone(), "after-wildcard"));
        dispatcher.on("task_progress", recording_handler(log.clone(), "typed"));

        dispatcher.dispatch(&event("task_progress", Value::Null));
        assert_eq!(*log.lock().unwrap(), vec!["after-wildcard", "typed"]);
    }

    #[test]
    fn progress_handler_extracts_payload_fields() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        dispatcher.on(
            EVENT_TASK_PROGRESS,
            task_progress_handler(move |pct, phase, message| {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((pct, phase.to_string(), message.to_string()));
            }),
        );

        dispatcher.handle_inbound(
            r#"{
                "event_id": "1",
                "event_type": "task_progress",
                "task_id": "t1",
                "data": {"progress_percentage": 42, "current_phase": "analysis", "message": "working"},
                "timestamp": "2026-08-27T10:15:00Z"
            }"#,
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(42.0, "analysis".to_string(), "working".to_string())]
        );
    }

    #[test]
    fn status_change_handler_skips_malformed_payloads() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        dispatcher.on(
            EVENT_AGENT_STATUS_CHANGED,
            status_change_handler(move |agent, old, new| {
                seen_clone.lock().unwrap().push((
                    agent.map(str::to_string),
                    old.to_string(),
                    new.to_string(),
                ));
            }),
        );

        let mut bad = event("agent_status_changed", serde_json::json!({"old_status": 3}));
        bad.agent_id = Some("a1".to_string());
        dispatcher.dispatch(&bad);
        assert!(seen.lock().unwrap().is_empty());

        let mut good = event(
            "agent_status_changed",
            serde_json::json!({"old_status": "idle", "new_status": "running"}),
        );
        good.agent_id = Some("a1".to_string());
        dispatcher.dispatch(&good);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(
                Some("a1".to_string()),
                "idle".to_string(),
                "running".to_string()
            )]
        );
    }

    #[test]
    fn dialogue_update_handler_filters_on_type() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(0usize));
        let seen_clone = seen.clone();
        // Registered as a wildcard on purpose: the factory's own type check
        // must keep other event types out.
        dispatcher.on_any(dialogue_update_handler(move |_agent, _data| {
            *seen_clone.lock().unwrap() += 1;
        }));

        dispatcher.dispatch(&event("task_progress", Value::Null));
        dispatcher.dispatch(&event("agent_dialogue_update", serde_json::json!({"m": 1})));
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
