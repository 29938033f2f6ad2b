//! DeviceSession - one live control connection to an OD-11
//!
//! A single task owns the socket. It selects over queued commands, inbound
//! frames, the keepalive timer and the shutdown signal, so every write goes
//! through one place. Commands only reach the task while a connection is
//! ready; during a reconnect they wait in the queue until the new handshake
//! has completed, or until their deadline passes.
//!
//! ```text
//!   set_volume / set_input ──► command queue ──┐
//!                                              ▼
//!   device frames ───────────────────────► I/O task ──► StateMirror
//!   keepalive tick ──────────────────────────┘  │
//!                                               └──► status (watch)
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use od11_api::defaults::{MAX_VOLUME, MIN_VOLUME};
use od11_api::{resolve_source, Action, DeviceMessage, SessionId, Update};
use od11_state::{DeviceState, SessionToken, StateMirror, Volume};

use crate::config::SessionConfig;
use crate::connection::{establish, send_action, WsStream};
use crate::error::{Result, SessionError};

/// Connection status as seen by the session owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// First connection attempt in progress
    Connecting,
    /// Handshake complete; commands are sent immediately
    Ready,
    /// Connection lost; attempt `attempt` is pending or running
    Reconnecting { attempt: u32 },
    /// Closed by the owner or out of reconnect attempts
    Closed,
}

impl SessionStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionStatus::Ready)
    }
}

#[derive(Debug)]
enum CommandKind {
    SetVolume(u8),
    NudgeVolume(i32),
    SetInput(String),
}

#[derive(Debug)]
struct Command {
    kind: CommandKind,
    deadline: Instant,
    ack: oneshot::Sender<Result<()>>,
}

/// Handle to a running device session
///
/// Dropping the handle shuts the session down.
pub struct DeviceSession {
    host: String,
    command_timeout: Duration,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
    shutdown: watch::Sender<bool>,
    mirror: StateMirror,
    task: Option<JoinHandle<()>>,
}

impl DeviceSession {
    /// Connect and complete the handshake
    ///
    /// Fails if the socket cannot be opened or the device rejects the
    /// handshake. Once this returns, connection losses are handled by
    /// reconnecting in the background.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        Self::connect_with_mirror(config, StateMirror::new()).await
    }

    /// Like [`connect`](Self::connect), mirroring into an existing mirror
    pub async fn connect_with_mirror(config: SessionConfig, mirror: StateMirror) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let (status_tx, status_rx) = watch::channel(SessionStatus::Connecting);
        mirror.reset();
        let ws = establish(&config, &mirror).await?;
        let _ = status_tx.send(SessionStatus::Ready);

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let io = IoTask {
            config: Arc::clone(&config),
            mirror: mirror.clone(),
            commands: command_rx,
            status: status_tx,
            shutdown: shutdown_rx,
            volume_target: None,
        };
        let task = tokio::spawn(io.run(ws));

        Ok(Self {
            host: config.host.clone(),
            command_timeout: config.command_timeout,
            commands: command_tx,
            status: status_rx,
            shutdown: shutdown_tx,
            mirror,
            task: Some(task),
        })
    }

    /// Set the group volume (0-100)
    ///
    /// Returns once the change has been written to the socket; the mirrored
    /// volume follows when the device pushes it back.
    pub async fn set_volume(&self, value: i32) -> Result<()> {
        if !(MIN_VOLUME as i32..=MAX_VOLUME as i32).contains(&value) {
            return Err(SessionError::Validation {
                parameter: "volume",
                value: value as i64,
                min: MIN_VOLUME as i64,
                max: MAX_VOLUME as i64,
            });
        }
        self.send(CommandKind::SetVolume(value as u8)).await
    }

    /// Change the volume by `delta`, clamping the target to 0-100
    ///
    /// Any amount is accepted; `nudge_volume(500)` goes to full volume.
    pub async fn nudge_volume(&self, delta: i32) -> Result<()> {
        self.send(CommandKind::NudgeVolume(delta)).await
    }

    /// Switch input by source id, source name or alias
    pub async fn set_input(&self, identifier: &str) -> Result<()> {
        self.send(CommandKind::SetInput(identifier.to_string())).await
    }

    async fn send(&self, kind: CommandKind) -> Result<()> {
        let deadline = Instant::now() + self.command_timeout;
        let (ack_tx, ack_rx) = oneshot::channel();
        let command = Command {
            kind,
            deadline,
            ack: ack_tx,
        };

        let delivery = async {
            self.commands
                .send(command)
                .await
                .map_err(|_| SessionError::Closed)?;
            ack_rx.await.map_err(|_| SessionError::Closed)?
        };

        match timeout(self.command_timeout, delivery).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Connection(format!(
                "{} not ready within {:?} (status: {:?})",
                self.host,
                self.command_timeout,
                self.status()
            ))),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Receiver that observes every status change
    pub fn status_receiver(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Wait until the session is ready, up to `within`
    pub async fn wait_ready(&self, within: Duration) -> Result<()> {
        let mut status = self.status.clone();
        let ready = status.wait_for(|s| s.is_ready() || *s == SessionStatus::Closed);
        let result = match timeout(within, ready).await {
            Ok(Ok(s)) if s.is_ready() => Ok(()),
            Ok(_) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::Timeout(format!(
                "{} not ready within {within:?}",
                self.host
            ))),
        };
        result
    }

    pub fn mirror(&self) -> &StateMirror {
        &self.mirror
    }

    /// Copy of the mirrored device state
    pub fn state(&self) -> DeviceState {
        self.mirror.snapshot()
    }

    /// Close the connection and wait for the I/O task to finish
    pub async fn close(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(host = %self.host, error = %e, "Session task ended abnormally");
            }
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("host", &self.host)
            .field("status", &self.status())
            .finish()
    }
}

// ============================================================================
// I/O task
// ============================================================================

type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// What a command turns into
struct Plan {
    action: Option<Action>,
    volume_target: Option<u8>,
}

/// Why a connection stopped being driven
enum Exit {
    Shutdown,
    Lost(String),
}

struct IoTask {
    config: Arc<SessionConfig>,
    mirror: StateMirror,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<SessionStatus>,
    shutdown: watch::Receiver<bool>,
    /// Volume last requested by this session, until the device reports one
    volume_target: Option<u8>,
}

impl IoTask {
    async fn run(mut self, first: WsStream) {
        let host = self.config.host.clone();
        let mut next = Some(first);

        loop {
            let ws = match next.take() {
                Some(ws) => ws,
                None => match self.reconnect().await {
                    Some(ws) => ws,
                    None => break,
                },
            };

            let _ = self.status.send(SessionStatus::Ready);
            match self.drive(ws).await {
                Exit::Shutdown => break,
                Exit::Lost(reason) => {
                    warn!(host = %host, reason = %reason, "Connection lost");
                    self.mirror.reset();
                }
            }
        }

        let _ = self.status.send(SessionStatus::Closed);
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            let _ = command.ack.send(Err(SessionError::Closed));
        }
        info!(host = %host, "Session closed");
    }

    /// Reconnect with backoff; `None` on shutdown or when attempts run out
    async fn reconnect(&mut self) -> Option<WsStream> {
        let mut attempt = 1;
        loop {
            if !self.config.reconnect.allows(attempt) {
                warn!(host = %self.config.host, attempts = attempt - 1, "Giving up reconnecting");
                return None;
            }

            let delay = self.config.reconnect.delay_for(attempt);
            let _ = self.status.send(SessionStatus::Reconnecting { attempt });
            info!(
                host = %self.config.host,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown.changed() => return None,
            }

            let connecting = establish(&self.config, &self.mirror);
            tokio::select! {
                result = connecting => match result {
                    Ok(ws) => {
                        info!(host = %self.config.host, attempt, "Reconnected");
                        return Some(ws);
                    }
                    Err(e) => {
                        warn!(host = %self.config.host, attempt, error = %e, "Reconnect attempt failed");
                        self.mirror.reset();
                    }
                },
                _ = self.shutdown.changed() => return None,
            }

            attempt = attempt.saturating_add(1);
        }
    }

    /// Serve one connection until it is lost or the session shuts down
    async fn drive(&mut self, ws: WsStream) -> Exit {
        let (mut sink, mut source): (WsSink, WsSource) = ws.split();
        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_ping: Option<i64> = None;
        self.volume_target = None;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Exit::Shutdown;
                }

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        let _ = sink.send(Message::Close(None)).await;
                        return Exit::Shutdown;
                    };
                    if let Err(reason) = self.execute(command, &mut sink).await {
                        return Exit::Lost(reason);
                    }
                }

                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text, &mut last_ping),
                    Some(Ok(Message::Close(frame))) => {
                        return Exit::Lost(format!("closed by device: {frame:?}"));
                    }
                    // tungstenite answers pings on its own
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Exit::Lost(e.to_string()),
                    None => return Exit::Lost("stream ended".to_string()),
                },

                _ = keepalive.tick() => {
                    let value = chrono::Utc::now().timestamp_millis();
                    if let Err(e) = send_action(&mut sink, &Action::SpeakerPing { value }, None).await {
                        return Exit::Lost(e.to_string());
                    }
                    last_ping = Some(value);
                }
            }
        }
    }

    /// Run one command; `Err` means the socket failed
    async fn execute(&mut self, command: Command, sink: &mut WsSink) -> std::result::Result<(), String> {
        let Command { kind, deadline, ack } = command;
        if Instant::now() > deadline || ack.is_closed() {
            trace!(?kind, "Dropping expired command");
            return Ok(());
        }

        let plan = match self.plan(&kind) {
            Ok(plan) => plan,
            Err(e) => {
                let _ = ack.send(Err(e));
                return Ok(());
            }
        };
        let Some(action) = plan.action else {
            debug!(?kind, "Nothing to send");
            let _ = ack.send(Ok(()));
            return Ok(());
        };

        let sid: Option<SessionId> = self.mirror.get::<SessionToken>().map(|t| t.0);
        match send_action(sink, &action, sid.as_ref()).await {
            Ok(()) => {
                if plan.volume_target.is_some() {
                    self.volume_target = plan.volume_target;
                }
                let _ = ack.send(Ok(()));
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                let _ = ack.send(Err(e));
                Err(reason)
            }
        }
    }

    /// Work out what a command sends
    fn plan(&self, kind: &CommandKind) -> Result<Plan> {
        match kind {
            CommandKind::SetVolume(target) => self.volume_change(*target),
            CommandKind::NudgeVolume(delta) => {
                let base = self.volume_base().ok_or(SessionError::VolumeUnknown)?;
                self.volume_change(apply_delta(base, *delta))
            }
            CommandKind::SetInput(query) => {
                let sources = self.mirror.snapshot().source_map();
                let source = resolve_source(query, &sources)?;
                debug!(query = %query, source = %source, "Resolved input");
                Ok(Plan {
                    action: Some(Action::GroupSetInputSource { source }),
                    volume_target: None,
                })
            }
        }
    }

    fn volume_change(&self, target: u8) -> Result<Plan> {
        let base = self.volume_base().ok_or(SessionError::VolumeUnknown)?;
        let amount = target as i32 - base as i32;
        Ok(Plan {
            action: (amount != 0).then_some(Action::GroupChangeVolume { amount }),
            volume_target: Some(target),
        })
    }

    /// Volume the next change is relative to
    fn volume_base(&self) -> Option<u8> {
        self.volume_target
            .or_else(|| self.mirror.get::<Volume>().map(|v| v.value()))
    }

    fn handle_frame(&mut self, text: &str, last_ping: &mut Option<i64>) {
        trace!(frame = %text, "Received");
        let message = match DeviceMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(host = %self.config.host, error = %e, "Ignoring malformed frame");
                return;
            }
        };

        match &message {
            DeviceMessage::SpeakerPong { value: Some(value) } if Some(*value) == *last_ping => {
                let rtt = chrono::Utc::now().timestamp_millis() - value;
                debug!(host = %self.config.host, rtt_ms = rtt, "Keepalive answered");
                *last_ping = None;
            }
            DeviceMessage::Rejected { reason } => {
                warn!(host = %self.config.host, reason = %reason, "Device reported an error");
            }
            DeviceMessage::Ignored { kind } => {
                debug!(kind = %kind, "Ignoring message");
            }
            DeviceMessage::Update(Update::GroupVolumeChanged { .. }) => {
                self.volume_target = None;
            }
            _ => {}
        }

        self.mirror.apply_message(&message);
    }
}

/// `base + delta`, clamped to the volume range
pub fn apply_delta(base: u8, delta: i32) -> u8 {
    (base as i32)
        .saturating_add(delta)
        .clamp(MIN_VOLUME as i32, MAX_VOLUME as i32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_delta_clamps() {
        assert_eq!(apply_delta(30, 5), 35);
        assert_eq!(apply_delta(98, 5), 100);
        assert_eq!(apply_delta(2, -5), 0);
        assert_eq!(apply_delta(50, 0), 50);
        assert_eq!(apply_delta(30, 150), 100);
        assert_eq!(apply_delta(30, -1000), 0);
        assert_eq!(apply_delta(100, i32::MAX), 100);
        assert_eq!(apply_delta(0, i32::MIN), 0);
    }

    #[test]
    fn test_status_is_ready() {
        assert!(SessionStatus::Ready.is_ready());
        assert!(!SessionStatus::Reconnecting { attempt: 1 }.is_ready());
        assert!(!SessionStatus::Closed.is_ready());
    }
}
