//! Subcommand implementations

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Instant;
use tracing::info;

use od11_sdk::{CurrentSource, Od11Device, Property, Sources, Volume, WifiQuality};

use crate::{Args, Cmd};

pub fn run(args: &Args) -> Result<()> {
    match &args.command {
        Cmd::Add { host } => add_entry(args, host),
        Cmd::Remove { host } => remove_entry(args, host),
        Cmd::Entries => list_entries(args),
        command => {
            let config = args.resolve_device()?;
            let host = config.host.clone();
            let device = Od11Device::connect(config)
                .with_context(|| format!("Failed to connect to {}", host))?;
            let result = run_on_device(args, command, &device);
            device.close();
            result
        }
    }
}

fn add_entry(args: &Args, host: &str) -> Result<()> {
    let mut store = args.open_store()?;
    let entry = args.device_config_for(host);
    let title = entry.title();
    store.add(entry)?;
    println!("Added {} to {}", title, store.path().display());
    Ok(())
}

fn remove_entry(args: &Args, host: &str) -> Result<()> {
    let mut store = args.open_store()?;
    let unique_id = args.device_config_for(host).unique_id();
    match store.remove(&unique_id)? {
        Some(entry) => println!("Removed {}", entry.title()),
        None => println!("{} is not configured", host),
    }
    Ok(())
}

fn list_entries(args: &Args) -> Result<()> {
    let store = args.open_store()?;
    if store.entries().is_empty() {
        println!("No devices configured");
    }
    for entry in store.entries() {
        println!("{:<28} ws://{}{}", entry.title(), entry.host, entry.ws_path);
    }
    Ok(())
}

fn run_on_device(args: &Args, command: &Cmd, device: &Od11Device) -> Result<()> {
    match command {
        Cmd::Status { json } => print_status(device, *json),
        Cmd::Sources => {
            let state = device.state();
            let current = state.current_source_id();
            for (id, name) in state.source_map() {
                let marker = if Some(&id) == current { "*" } else { " " };
                println!("{} {:>3}  {}", marker, id, name);
            }
            Ok(())
        }
        Cmd::SetVolume { volume } => {
            device.volume.set_native_value(f64::from(*volume))?;
            println!("Volume set to {}", volume);
            Ok(())
        }
        Cmd::Nudge { amount } => {
            device.call_service("volume_nudge", &serde_json::json!({ "amount": amount }))?;
            println!("Volume nudged by {:+}", amount);
            Ok(())
        }
        Cmd::SetInput { source } => {
            device.input.select_option(source)?;
            println!("Input switch to {:?} sent", source);
            Ok(())
        }
        Cmd::Call { service, data } => {
            let data: Value = match data {
                Some(text) => serde_json::from_str(text).context("Service data is not valid JSON")?,
                None => Value::Null,
            };
            device.call_service(service, &data)?;
            println!("Called od11.{}", service.trim_start_matches("od11."));
            Ok(())
        }
        Cmd::Listen { .. } => listen(args, device),
        Cmd::Add { .. } | Cmd::Remove { .. } | Cmd::Entries => Ok(()),
    }
}

fn print_status(device: &Od11Device, json: bool) -> Result<()> {
    if json {
        let status = serde_json::json!({
            "device": device.device_info,
            "available": device.available(),
            "volume": device.volume.native_value(),
            "input": device.input.current_option(),
            "attributes": device.attributes(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let attributes = device.attributes();
    println!("{}", device.device_info.name);
    println!("  status:   {:?}", device.status());
    println!("  volume:   {}", show(device.volume.native_value()));
    println!("  input:    {}", show(device.input.current_option()));
    println!("  options:  {}", device.input.options().join(", "));
    println!("  sid:      {}", show(attributes.sid));
    println!("  wifi:     {}", show(attributes.wifi_quality));
    println!("  revision: {}", show(attributes.revision));
    println!("  mac:      {}", show(attributes.mac));
    println!("  ssid:     {}", show(attributes.ssid));
    Ok(())
}

fn show<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn listen(args: &Args, device: &Od11Device) -> Result<()> {
    device.property::<Volume>().watch();
    device.property::<CurrentSource>().watch();
    device.property::<Sources>().watch();
    device.property::<WifiQuality>().watch();

    let deadline = args.listen_duration().map(|d| Instant::now() + d);
    info!("Listening for changes on {}", device.host());
    let events = device.iter();

    loop {
        let event = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match events.recv_timeout(remaining) {
                    Some(event) => event,
                    None => continue,
                }
            }
            None => match events.recv() {
                Some(event) => event,
                None => break,
            },
        };

        let key = event.property_key;
        let value = if key == Volume::KEY {
            show(device.volume.native_value())
        } else if key == CurrentSource::KEY {
            show(device.input.current_option())
        } else if key == Sources::KEY {
            device.input.options().join(", ")
        } else if key == WifiQuality::KEY {
            show(device.property::<WifiQuality>().get().map(|w| w.0))
        } else {
            continue;
        };
        println!("{:<12} {}", key, value);
    }

    Ok(())
}
