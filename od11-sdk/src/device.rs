//! Od11Device - main entry point for one configured speaker
//!
//! Fully synchronous: the session runs on a worker thread and every call
//! here either reads the mirror or blocks on a reply from that worker.

use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use serde_json::Value;
use tokio::sync::{mpsc as async_mpsc, watch};

use od11_session::{SessionConfig, SessionStatus};
use od11_state::{ChangeIterator, DeviceState, Property, StateMirror};

use crate::config::DeviceConfig;
use crate::entity::{Attributes, DeviceInfo, InputSelect, VolumeNumber};
use crate::error::{Result, SdkError};
use crate::property::PropertyHandle;
use crate::services::ServiceCall;
use crate::worker::{spawn_session_worker, Command, Reply};

/// State shared by the device handle, its entities and property handles
pub(crate) struct DeviceContext {
    pub(crate) host: String,
    pub(crate) mirror: StateMirror,
    status: watch::Receiver<SessionStatus>,
    commands: async_mpsc::UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceContext {
    pub(crate) fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Connected, and the snapshot of the current connection has arrived
    pub(crate) fn available(&self) -> bool {
        self.status().is_ready() && self.mirror.is_ready()
    }

    pub(crate) fn set_volume(&self, value: i32) -> Result<()> {
        self.request(|reply| Command::SetVolume { value, reply })
    }

    pub(crate) fn nudge_volume(&self, delta: i32) -> Result<()> {
        self.request(|reply| Command::NudgeVolume { delta, reply })
    }

    pub(crate) fn set_input(&self, source: String) -> Result<()> {
        self.request(|reply| Command::SetInput { source, reply })
    }

    fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| SdkError::WorkerUnavailable)?;
        reply_rx
            .recv()
            .map_err(|_| SdkError::WorkerUnavailable)?
            .map_err(SdkError::from)
    }

    /// Stop the worker and wait for it; safe to call more than once
    fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!(host = %self.host, "Session worker panicked");
            }
        }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A connected OD-11
///
/// # Example
///
/// ```rust,ignore
/// use od11_sdk::{DeviceConfig, Od11Device};
///
/// fn main() -> Result<(), od11_sdk::SdkError> {
///     let device = Od11Device::connect(DeviceConfig::new("192.168.1.20"))?;
///
///     println!("{:?} on {:?}", device.volume.native_value(), device.input.current_option());
///     device.input.select_option("Optical")?;
///     device.volume.set_native_value(35.0)?;
///
///     device.call_service("volume_nudge", &serde_json::json!({"amount": -5}))?;
///     device.close();
///     Ok(())
/// }
/// ```
pub struct Od11Device {
    /// `number.<device>_volume`
    pub volume: VolumeNumber,
    /// `select.<device>_input`
    pub input: InputSelect,
    pub device_info: DeviceInfo,
    config: DeviceConfig,
    context: Arc<DeviceContext>,
}

impl Od11Device {
    /// Connect to the device described by a config entry (blocking)
    ///
    /// Returns once the handshake completed. Later connection losses are
    /// handled in the background; entities report `available() == false`
    /// until the device is back.
    pub fn connect(config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        let session = config.session_config();
        Self::connect_with_session(config, session)
    }

    /// Like [`connect`](Self::connect), with explicit session settings
    /// (timeouts, keepalive, reconnect policy)
    pub fn connect_with_session(config: DeviceConfig, session: SessionConfig) -> Result<Self> {
        let host = config.host.trim().to_string();
        let mirror = StateMirror::new();
        let (command_tx, command_rx) = async_mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        tracing::info!(host = %host, "Connecting to OD-11");
        let worker = spawn_session_worker(session, mirror.clone(), command_rx, ready_tx)?;

        let status = match ready_rx.recv() {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(SdkError::WorkerUnavailable);
            }
        };

        let context = Arc::new(DeviceContext {
            host: host.clone(),
            mirror,
            status,
            commands: command_tx,
            worker: Mutex::new(Some(worker)),
        });

        let device_info = DeviceInfo::for_host(&host);
        Ok(Self {
            volume: VolumeNumber::new(Arc::clone(&context), &device_info),
            input: InputSelect::new(Arc::clone(&context), &device_info),
            device_info,
            config,
            context,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.context.host
    }

    pub fn status(&self) -> SessionStatus {
        self.context.status()
    }

    pub fn available(&self) -> bool {
        self.context.available()
    }

    /// Copy of everything mirrored so far
    pub fn state(&self) -> DeviceState {
        self.context.mirror.snapshot()
    }

    pub fn attributes(&self) -> Attributes {
        Attributes::from_state(&self.context.mirror.snapshot())
    }

    /// Typed handle to one mirrored property
    pub fn property<P: Property>(&self) -> PropertyHandle<P> {
        PropertyHandle::new(Arc::clone(&self.context))
    }

    /// Blocking iterator over changes to watched properties
    pub fn iter(&self) -> ChangeIterator {
        self.context.mirror.iter()
    }

    /// Parse and run a service call, e.g. `("volume_set", {"volume": 30})`
    pub fn call_service(&self, service: &str, data: &Value) -> Result<()> {
        self.execute(ServiceCall::parse(service, data)?)
    }

    pub fn execute(&self, call: ServiceCall) -> Result<()> {
        tracing::debug!(host = %self.context.host, service = %call.service(), "Service call");
        match call {
            ServiceCall::VolumeSet { volume } => self.context.set_volume(volume),
            ServiceCall::VolumeNudge { amount } => self.context.nudge_volume(amount),
            ServiceCall::SetInput { source } => self.context.set_input(source),
            ServiceCall::SetInputPreset(alias) => self.context.set_input(alias.key().to_string()),
        }
    }

    /// Close the session and stop the worker
    ///
    /// Entities still held elsewhere become unavailable; their commands fail
    /// with [`SdkError::WorkerUnavailable`].
    pub fn close(self) {
        self.context.shutdown();
    }
}

impl std::fmt::Debug for Od11Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Od11Device")
            .field("host", &self.context.host)
            .field("status", &self.status())
            .finish()
    }
}
