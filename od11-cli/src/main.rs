use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use od11_sdk::{ConfigStore, DeviceConfig};
use od11_state::{init_logging, init_logging_from_env, LoggingMode};

mod commands;

/// Control an OD-11 speaker over its local WebSocket
///
/// The device is taken from --host, or from the only configured entry.
#[derive(Parser, Debug)]
#[command(name = "od11ctl")]
#[command(about = "OD-11 local control")]
#[command(version)]
pub struct Args {
    /// Device address (`10.0.0.5`, `od11.local:8080`)
    #[arg(long, global = true, env = "OD11_HOST")]
    pub host: Option<String>,

    /// WebSocket path
    #[arg(long, global = true)]
    pub path: Option<String>,

    /// Origin header (defaults to http://<host>)
    #[arg(long, global = true)]
    pub origin: Option<String>,

    /// Cookie header, for devices that require one
    #[arg(long, global = true)]
    pub cookie: Option<String>,

    /// Config entry file (defaults to <config dir>/od11/entries.json)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// More output on stderr (-v info, -vv debug); OD11_LOG_MODE overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Cmd {
    /// Add a config entry for a device
    Add {
        host: String,
    },
    /// Remove the config entry of a device
    Remove {
        host: String,
    },
    /// List config entries
    Entries,
    /// Show volume, input and device attributes
    Status {
        /// Print attributes as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the device's input sources
    Sources,
    /// Set the volume (0-100)
    SetVolume {
        volume: i32,
    },
    /// Change the volume by a relative amount
    Nudge {
        #[arg(allow_hyphen_values = true)]
        amount: i32,
    },
    /// Switch input by id, name or alias (`bt`, `optical`, `4`)
    SetInput {
        source: String,
    },
    /// Run a service call, e.g. `call volume_set '{"volume": 30}'`
    Call {
        service: String,
        /// Service data as a JSON object
        data: Option<String>,
    },
    /// Print property changes as they arrive
    Listen {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
}

impl Args {
    pub fn listen_duration(&self) -> Option<Duration> {
        match self.command {
            Cmd::Listen { seconds } => seconds.map(Duration::from_secs),
            _ => None,
        }
    }

    fn logging_mode(&self) -> LoggingMode {
        match self.verbose {
            0 => LoggingMode::Silent,
            1 => LoggingMode::Development,
            _ => LoggingMode::Debug,
        }
    }

    pub fn open_store(&self) -> Result<ConfigStore> {
        let store = match &self.store {
            Some(path) => ConfigStore::open(path.clone()),
            None => ConfigStore::open_default(),
        };
        store.context("Failed to open config entries")
    }

    /// Config entry for `host`, with command line overrides applied
    pub fn device_config_for(&self, host: &str) -> DeviceConfig {
        let mut config = DeviceConfig::new(host);
        if let Some(path) = &self.path {
            config = config.with_path(path.clone());
        }
        if let Some(origin) = &self.origin {
            config = config.with_origin(origin.clone());
        }
        if let Some(cookie) = &self.cookie {
            config = config.with_cookie(cookie.clone());
        }
        config
    }

    /// The device to talk to: --host, else the only stored entry
    pub fn resolve_device(&self) -> Result<DeviceConfig> {
        if let Some(host) = &self.host {
            return Ok(self.device_config_for(host));
        }

        let store = self.open_store()?;
        match store.entries() {
            [only] => {
                debug!("Using config entry {}", only.unique_id());
                Ok(only.clone())
            }
            [] => Err(anyhow::anyhow!(
                "No device configured. Pass --host or run `od11ctl add <host>`"
            )),
            many => Err(anyhow::anyhow!(
                "{} devices configured; pick one with --host",
                many.len()
            )),
        }
    }
}

fn init_tracing(args: &Args) -> Result<()> {
    if std::env::var_os("OD11_LOG_MODE").is_some() {
        init_logging_from_env()?;
    } else {
        init_logging(args.logging_mode())?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args).context("Failed to initialize logging")?;
    commands::run(&args)
}
