// file: src/client.rs
// description: task stream client owning the connection lifecycle, heartbeat and command channel

use crate::{
    config::Config,
    connection::{
        Connection, ConnectionMode, ConnectionState, ConnectionStatus, RetryDecision,
        SharedConnection,
    },
    dispatch::{
        EventDispatcher, Handler, dialogue_update_handler, status_change_handler,
        task_progress_handler,
    },
    error::TaskwireError,
    monitoring,
    transport::{SseTransport, Transport, WebSocketTransport},
    types::{
        EVENT_AGENT_DIALOGUE_UPDATE, EVENT_AGENT_STATUS_CHANGED, EVENT_TASK_PROGRESS,
        OutboundMessage, TaskControlAction,
    },
};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{error, info, trace, warn};
use url::Url;

// Heartbeat frame, identical to serde's rendering of OutboundMessage::Ping.
const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// Client for one logical task event channel.
///
/// Owns at most one live transport primitive at a time, reconnects with a
/// fixed delay after unclean closes, heartbeats the bidirectional channel,
/// and fans inbound events out through an instance-owned dispatcher whose
/// subscriptions persist across reconnects.
pub struct TaskStreamClient {
    config: Arc<Config>,
    dispatcher: Arc<EventDispatcher>,
    conn: SharedConnection,
    link: Mutex<Option<LinkHandle>>,
}

struct LinkHandle {
    outbound: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
    supervisor: JoinHandle<()>,
}

/// Everything the supervisor task needs besides the transport itself.
struct Session {
    url: Url,
    mode: ConnectionMode,
    config: Arc<Config>,
    dispatcher: Arc<EventDispatcher>,
    conn: SharedConnection,
    outbound: mpsc::UnboundedReceiver<String>,
    shutdown: watch::Receiver<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseKind {
    /// Explicit disconnect or client handle dropped; no reconnect.
    Clean,
    /// Transport fault or server-side termination; retry policy applies.
    Unclean,
}

impl TaskStreamClient {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(EventDispatcher::new()),
            conn: Arc::new(Mutex::new(Connection::new())),
            link: Mutex::new(None),
        }
    }

    /// Open the full-duplex WebSocket channel for `task_id`.
    ///
    /// Resolves once the channel is open. A dial failure on this first
    /// attempt is returned directly and schedules no retry; once open,
    /// unclean closes are retried per the reconnect policy. Calling this
    /// while a connection for this client is already in flight is a
    /// warn-logged no-op.
    pub async fn connect_bidirectional(&self, task_id: &str) -> Result<(), TaskwireError> {
        let url = self.config.endpoint.bidirectional_url(task_id)?;
        self.connect_with(task_id, ConnectionMode::Bidirectional, url)
            .await
    }

    /// Open the push-only SSE stream for `task_id`. Same lifecycle contract
    /// as [`connect_bidirectional`](Self::connect_bidirectional), but the
    /// command facade stays unavailable in this mode.
    pub async fn connect_push_only(&self, task_id: &str) -> Result<(), TaskwireError> {
        let url = self.config.endpoint.push_url(task_id)?;
        self.connect_with(task_id, ConnectionMode::PushOnly, url)
            .await
    }

    async fn connect_with(
        &self,
        task_id: &str,
        mode: ConnectionMode,
        url: Url,
    ) -> Result<(), TaskwireError> {
        if !self.conn().begin_connect(task_id, mode) {
            return Ok(());
        }

        let transport = match dial(mode, &url).await {
            Ok(transport) => transport,
            Err(e) => {
                self.conn().mark_failed();
                return Err(e);
            }
        };
        self.conn().mark_open();
        monitoring::CONNECTED_GAUGE.set(1.0);
        info!(task_id = %task_id, mode = ?mode, url = %url, "channel open");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = Session {
            url,
            mode,
            config: self.config.clone(),
            dispatcher: self.dispatcher.clone(),
            conn: self.conn.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };
        let supervisor = tokio::spawn(run_supervisor(session, transport));

        *self.link.lock().expect("link lock poisoned") = Some(LinkHandle {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            supervisor,
        });
        Ok(())
    }

    /// Tear the channel down. Idempotent. When this returns, the heartbeat
    /// interval and any pending reconnect timer are gone and no further
    /// subscriber callback will fire.
    pub async fn disconnect(&self) {
        let link = self.link.lock().expect("link lock poisoned").take();
        let Some(link) = link else {
            return;
        };
        let _ = link.shutdown.send(true);
        let _ = link.supervisor.await;

        let mut conn = self.conn();
        if conn.state != ConnectionState::Failed {
            conn.mark_closed();
        }
        monitoring::CONNECTED_GAUGE.set(0.0);
    }

    // ---- command facade (bidirectional channel only) ----

    /// Serialize `message` and queue it on the open bidirectional channel.
    pub fn send_message<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), TaskwireError> {
        if !self.conn().can_send() {
            return Err(TaskwireError::NotConnected);
        }
        let frame = serde_json::to_string(message)?;
        let link = self.link.lock().expect("link lock poisoned");
        match link.as_ref() {
            Some(link) => link
                .outbound
                .send(frame)
                .map_err(|_| TaskwireError::NotConnected),
            None => Err(TaskwireError::NotConnected),
        }
    }

    /// Forward user input to the task, optionally addressed to one agent.
    pub fn send_user_input(
        &self,
        input: &str,
        target_agent: Option<&str>,
    ) -> Result<(), TaskwireError> {
        self.send_message(&OutboundMessage::user_input(
            input,
            target_agent.map(str::to_string),
        ))
    }

    /// Ask the backend to interrupt one agent's current work.
    pub fn interrupt_agent(&self, agent_id: &str) -> Result<(), TaskwireError> {
        self.send_message(&OutboundMessage::agent_interrupt(agent_id))
    }

    /// Pause, resume or cancel the whole task.
    pub fn control_task(&self, action: TaskControlAction) -> Result<(), TaskwireError> {
        self.send_message(&OutboundMessage::task_control(action))
    }

    // ---- subscriptions (persist across reconnects) ----

    pub fn on(&self, event_type: &str, handler: Handler) {
        self.dispatcher.on(event_type, handler);
    }

    pub fn on_any(&self, handler: Handler) {
        self.dispatcher.on_any(handler);
    }

    pub fn off(&self, event_type: &str, handler: &Handler) -> bool {
        self.dispatcher.off(event_type, handler)
    }

    pub fn off_any(&self, handler: &Handler) -> bool {
        self.dispatcher.off_any(handler)
    }

    /// Subscribe to `agent_dialogue_update` events; the returned handler can
    /// be passed to [`off`](Self::off) under the same type tag later.
    pub fn on_dialogue_update<F>(&self, callback: F) -> Handler
    where
        F: Fn(Option<&str>, &Value) + Send + Sync + 'static,
    {
        let handler = dialogue_update_handler(callback);
        self.dispatcher
            .on(EVENT_AGENT_DIALOGUE_UPDATE, handler.clone());
        handler
    }

    /// Subscribe to `agent_status_changed` events as `(agent, old, new)`.
    pub fn on_status_change<F>(&self, callback: F) -> Handler
    where
        F: Fn(Option<&str>, &str, &str) + Send + Sync + 'static,
    {
        let handler = status_change_handler(callback);
        self.dispatcher
            .on(EVENT_AGENT_STATUS_CHANGED, handler.clone());
        handler
    }

    /// Subscribe to `task_progress` events as `(percentage, phase, message)`.
    pub fn on_task_progress<F>(&self, callback: F) -> Handler
    where
        F: Fn(f64, &str, &str) + Send + Sync + 'static,
    {
        let handler = task_progress_handler(callback);
        self.dispatcher.on(EVENT_TASK_PROGRESS, handler.clone());
        handler
    }

    /// Point-in-time connection snapshot; the only status surface the
    /// client exposes (it never throws asynchronously at consumers).
    pub fn connection_status(&self) -> ConnectionStatus {
        self.conn().status()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("connection state poisoned")
    }
}

async fn dial(mode: ConnectionMode, url: &Url) -> Result<Box<dyn Transport>, TaskwireError> {
    match mode {
        ConnectionMode::Bidirectional => Ok(Box::new(WebSocketTransport::connect(url).await?)),
        ConnectionMode::PushOnly => Ok(Box::new(SseTransport::connect(url).await?)),
        ConnectionMode::None => Err(TaskwireError::NotConnected),
    }
}

/// Owns the live transport for the lifetime of one logical connection:
/// session loop, then the retry policy, until a clean close or exhaustion.
async fn run_supervisor(mut session: Session, mut transport: Box<dyn Transport>) {
    loop {
        let close = run_session(&mut session, &mut transport).await;
        let _ = transport.close().await;
        monitoring::CONNECTED_GAUGE.set(0.0);

        if close == CloseKind::Clean {
            lock_conn(&session.conn).mark_closed();
            info!("channel closed");
            return;
        }

        // Unclean close: retry with a fixed pause until a dial succeeds,
        // the attempt budget runs out, or disconnect() interrupts the wait.
        let max_attempts = session.config.reconnect.max_attempts;
        loop {
            let decision = lock_conn(&session.conn).record_unclean_close(max_attempts);
            let attempt = match decision {
                RetryDecision::Exhausted => {
                    error!(
                        max_attempts,
                        "giving up on channel: {}",
                        TaskwireError::ReconnectExhausted(max_attempts)
                    );
                    return;
                }
                RetryDecision::Retry(attempt) => attempt,
            };
            monitoring::RECONNECT_COUNTER.increment(1);
            warn!(
                attempt,
                delay_ms = session.config.reconnect.delay.as_millis() as u64,
                "reconnecting after unclean close"
            );

            tokio::select! {
                _ = tokio::time::sleep(session.config.reconnect.delay) => {}
                _ = shutdown_requested(&mut session.shutdown) => {
                    lock_conn(&session.conn).mark_closed();
                    info!("disconnect requested during reconnect wait");
                    return;
                }
            }

            lock_conn(&session.conn).mark_reconnect_dialing();
            match dial(session.mode, &session.url).await {
                Ok(fresh) => {
                    transport = fresh;
                    lock_conn(&session.conn).mark_open();
                    monitoring::CONNECTED_GAUGE.set(1.0);
                    info!(attempt, "channel reopened");
                    break;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reconnect attempt failed");
                }
            }
        }
    }
}

/// Pump one live transport: inbound frames to the dispatcher, queued
/// commands out, heartbeat pings on the bidirectional channel, until the
/// transport dies or shutdown is requested.
async fn run_session(session: &mut Session, transport: &mut Box<dyn Transport>) -> CloseKind {
    let bidirectional = transport.mode() == ConnectionMode::Bidirectional;
    let mut heartbeat = tokio::time::interval(session.config.heartbeat.interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval fires immediately on first tick; the heartbeat starts one
    // full interval after open
    heartbeat.tick().await;

    loop {
        tokio::select! {
            frame = transport.recv() => match frame {
                Some(Ok(text)) => session.dispatcher.handle_inbound(&text),
                Some(Err(e)) => {
                    warn!(error = %e, "transport fault");
                    return CloseKind::Unclean;
                }
                None => {
                    warn!("transport stream ended");
                    return CloseKind::Unclean;
                }
            },
            command = session.outbound.recv() => match command {
                Some(frame) => {
                    if let Err(e) = transport.send(frame).await {
                        warn!(error = %e, "outbound send failed");
                        return CloseKind::Unclean;
                    }
                }
                // client handle dropped without an explicit disconnect
                None => return CloseKind::Clean,
            },
            _ = heartbeat.tick(), if bidirectional => {
                if let Err(e) = transport.send(PING_FRAME.to_string()).await {
                    warn!(error = %e, "heartbeat ping failed");
                    return CloseKind::Unclean;
                }
                trace!("heartbeat ping sent");
            },
            changed = session.shutdown.changed() => {
                if changed.is_err() || *session.shutdown.borrow() {
                    return CloseKind::Clean;
                }
            }
        }
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // resolves on signal or on the sender side going away
    while shutdown.changed().await.is_ok() {
        if *shutdown.borrow() {
            return;
        }
    }
}

fn lock_conn(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().expect("connection state poisoned")
}
