//! Background worker thread for the device session
//!
//! Spawns a thread with its own tokio runtime to run the async
//! [`DeviceSession`] while exposing a sync API to [`Od11Device`].
//!
//! [`Od11Device`]: crate::Od11Device

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc as async_mpsc, watch};

use od11_session::{DeviceSession, SessionConfig, SessionError, SessionStatus};
use od11_state::StateMirror;

use crate::error::SdkError;

/// Reply channel for a single command
pub(crate) type Reply = mpsc::Sender<Result<(), SessionError>>;

/// What the worker reports once the first handshake finished
pub(crate) type Ready = Result<watch::Receiver<SessionStatus>, SdkError>;

/// Commands sent from the sync device handle to the background worker
#[derive(Debug)]
pub(crate) enum Command {
    SetVolume { value: i32, reply: Reply },
    NudgeVolume { delta: i32, reply: Reply },
    SetInput { source: String, reply: Reply },
    /// Close the session and stop the worker
    Shutdown,
}

/// Spawns the background session worker thread
///
/// The worker owns its own tokio runtime and the [`DeviceSession`]. Exactly
/// one message is sent on `ready_tx`: the session status receiver once the
/// handshake succeeded, or the connect error.
pub(crate) fn spawn_session_worker(
    config: SessionConfig,
    mirror: StateMirror,
    command_rx: async_mpsc::UnboundedReceiver<Command>,
    ready_tx: mpsc::Sender<Ready>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("od11-{}", config.host))
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to create tokio runtime for session worker: {}", e);
                    let _ = ready_tx.send(Err(SdkError::Io(e)));
                    return;
                }
            };

            rt.block_on(run_session(config, mirror, command_rx, ready_tx));
        })
}

async fn run_session(
    config: SessionConfig,
    mirror: StateMirror,
    mut command_rx: async_mpsc::UnboundedReceiver<Command>,
    ready_tx: mpsc::Sender<Ready>,
) {
    let host = config.host.clone();
    let session = match DeviceSession::connect_with_mirror(config, mirror).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(host = %host, "Failed to start session: {}", e);
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };

    if ready_tx.send(Ok(session.status_receiver())).is_err() {
        tracing::debug!(host = %host, "Device handle dropped during connect");
        session.close().await;
        return;
    }

    tracing::info!(host = %host, "Session worker started");

    while let Some(command) = command_rx.recv().await {
        match command {
            Command::SetVolume { value, reply } => {
                let _ = reply.send(session.set_volume(value).await);
            }
            Command::NudgeVolume { delta, reply } => {
                let _ = reply.send(session.nudge_volume(delta).await);
            }
            Command::SetInput { source, reply } => {
                let _ = reply.send(session.set_input(&source).await);
            }
            Command::Shutdown => {
                tracing::debug!(host = %host, "Session worker received shutdown");
                break;
            }
        }
    }

    session.close().await;
    tracing::info!(host = %host, "Session worker stopped");
}
