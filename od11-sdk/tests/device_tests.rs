//! Integration tests for the sync device API against a mock OD-11
//!
//! These tests verify:
//! - entities reflect the handshake snapshot and later pushes
//! - entity writes and service calls send the right commands
//! - rejected input never reaches the device
//! - property watching, reconnects and shutdown

#[path = "../../od11-session/tests/mock_device.rs"]
mod mock_device;

use std::thread;
use std::time::{Duration, Instant};

use mock_device::{MockBehavior, MockDevice};
use od11_sdk::{
    DeviceConfig, Od11Device, Property, ReconnectPolicy, SdkError, SessionConfig, SessionStatus,
    SourceId, Volume,
};
use od11_session::SessionError;
use serde_json::{json, Value};
use tokio::runtime::Runtime;

const WAIT: Duration = Duration::from_secs(2);

/// The mock runs on its own multi-threaded runtime; the device under test
/// brings its own worker thread
fn start_mock(behavior: MockBehavior) -> (Runtime, MockDevice) {
    let rt = Runtime::new().unwrap();
    let mock = rt.block_on(MockDevice::start_with(behavior));
    (rt, mock)
}

fn connect(mock: &MockDevice) -> Od11Device {
    let config = DeviceConfig::new(mock.host());
    let session = config
        .session_config()
        .with_timeouts(Duration::from_secs(1), Duration::from_secs(1), Duration::from_secs(2))
        .with_reconnect(ReconnectPolicy {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            multiplier: 2,
            max_attempts: None,
        });
    Od11Device::connect_with_session(config, session).unwrap()
}

fn wait_until(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn command_frames(mock: &MockDevice, action: &str) -> Vec<Value> {
    mock.frames_with_action(action)
}

/// Frames the mock has read are recorded asynchronously; wait for `count`
fn wait_for_frames(mock: &MockDevice, action: &str, count: usize) -> Vec<Value> {
    wait_until(WAIT, || command_frames(mock, action).len() >= count);
    command_frames(mock, action)
}

#[test]
fn test_entities_reflect_snapshot() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);
    let host = mock.host();

    assert!(device.available());
    assert_eq!(device.status(), SessionStatus::Ready);

    assert_eq!(device.volume.native_value(), Some(30.0));
    assert_eq!(device.volume.unique_id(), format!("{}_volume", host));
    assert!(device.volume.entity_id().starts_with("number.od_11_"));
    assert!(device.volume.entity_id().ends_with("_volume"));

    assert_eq!(
        device.input.options(),
        vec!["AirPlay", "Spotify", "Playlist", "Line In", "Optical", "Bluetooth"]
    );
    assert_eq!(device.input.current_option().as_deref(), Some("AirPlay"));
    assert_eq!(device.input.unique_id(), format!("{}_input", host));

    assert_eq!(device.device_info.name, format!("OD-11 {}", host));
    assert_eq!(device.config().unique_id(), format!("od11_{}", host));
}

#[test]
fn test_attributes() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    let attributes = device.attributes();
    assert_eq!(attributes.sid.and_then(|s| s.as_int()), Some(42));
    assert_eq!(attributes.source_id, Some(SourceId::from(0)));
    assert_eq!(attributes.sources.len(), 6);
    assert_eq!(attributes.wifi_quality, Some(70));
    assert_eq!(attributes.revision.as_deref(), Some("2.1.0"));
    assert_eq!(attributes.mac.as_deref(), Some("00:11:22:33:44:55"));
    assert_eq!(attributes.ssid.as_deref(), Some("home"));
}

#[test]
fn test_set_native_value_sends_delta_and_mirrors_push() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    device.volume.set_native_value(55.0).unwrap();

    let frames = wait_for_frames(&mock, "group_change_volume", 1);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["amount"], 25);
    assert_eq!(frames[0]["sid"], 42);
    assert!(wait_until(WAIT, || device.volume.native_value() == Some(55.0)));
}

#[test]
fn test_set_native_value_truncates_fraction() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    device.volume.set_native_value(40.9).unwrap();
    assert!(wait_until(WAIT, || device.volume.native_value() == Some(40.0)));
}

#[test]
fn test_set_native_value_rejects_out_of_range() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    for value in [-1.0, 101.0, f64::NAN, f64::INFINITY] {
        let err = device.volume.set_native_value(value).unwrap_err();
        assert!(err.is_rejected_input(), "{value}: {err}");
    }
    assert!(command_frames(&mock, "group_change_volume").is_empty());
    assert_eq!(device.volume.native_value(), Some(30.0));
}

#[test]
fn test_select_option_by_name() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    device.input.select_option("Optical").unwrap();

    let frames = wait_for_frames(&mock, "group_set_input_source", 1);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["source"], 4);
    assert!(wait_until(WAIT, || device.input.current_option().as_deref() == Some("Optical")));
}

#[test]
fn test_select_option_relaxed() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    device.input.select_option("bt").unwrap();
    device.input.select_option("line-in").unwrap();

    let sources: Vec<Value> = wait_for_frames(&mock, "group_set_input_source", 2)
        .into_iter()
        .map(|f| f["source"].clone())
        .collect();
    assert_eq!(sources, vec![json!(5), json!(3)]);
}

#[test]
fn test_select_unknown_option_sends_nothing() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    let err = device.input.select_option("unknown_xyz").unwrap_err();
    assert!(matches!(err, SdkError::Session(SessionError::UnknownSource(_))));
    assert!(command_frames(&mock, "group_set_input_source").is_empty());
    assert_eq!(device.input.current_option().as_deref(), Some("AirPlay"));
}

#[test]
fn test_example_scenario_with_text_ids() {
    let (_rt, mock) = start_mock(MockBehavior::two_sources());
    let device = connect(&mock);

    assert_eq!(device.input.options(), vec!["AirPlay", "Optical"]);
    assert_eq!(device.input.current_option().as_deref(), Some("AirPlay"));
    assert_eq!(device.volume.native_value(), Some(30.0));

    device.call_service("set_input", &json!({"source": "optical"})).unwrap();

    let frames = wait_for_frames(&mock, "group_set_input_source", 1);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["source"], "o");
    assert!(wait_until(WAIT, || device.input.current_option().as_deref() == Some("Optical")));
    assert_eq!(device.attributes().source_id, Some(SourceId::new("o")));
}

#[test]
fn test_volume_services() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    device.call_service("volume_nudge", &json!({"amount": -10})).unwrap();
    assert!(wait_until(WAIT, || device.volume.native_value() == Some(20.0)));

    device.call_service("od11.volume_set", &json!({"volume": "65"})).unwrap();
    assert!(wait_until(WAIT, || device.volume.native_value() == Some(65.0)));

    device.call_service("volume_nudge", &json!({"amount": 250})).unwrap();
    assert!(wait_until(WAIT, || device.volume.native_value() == Some(100.0)));

    let amounts: Vec<Value> = command_frames(&mock, "group_change_volume")
        .into_iter()
        .map(|f| f["amount"].clone())
        .collect();
    assert_eq!(amounts, vec![json!(-10), json!(45), json!(35)]);
}

#[test]
fn test_volume_set_service_out_of_range() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    let err = device
        .call_service("volume_set", &json!({"volume": 120}))
        .unwrap_err();
    assert!(matches!(
        err,
        SdkError::Session(SessionError::Validation { parameter: "volume", value: 120, .. })
    ));
    assert!(command_frames(&mock, "group_change_volume").is_empty());
}

#[test]
fn test_preset_input_services() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    for service in ["set_input_linein", "set_input_bluetooth", "set_input_airplay"] {
        device.call_service(service, &Value::Null).unwrap();
    }

    let sources: Vec<Value> = wait_for_frames(&mock, "group_set_input_source", 3)
        .into_iter()
        .map(|f| f["source"].clone())
        .collect();
    assert_eq!(sources, vec![json!(3), json!(5), json!(0)]);
}

#[test]
fn test_bad_service_calls() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    assert!(matches!(
        device.call_service("power_off", &json!({})),
        Err(SdkError::UnknownService(_))
    ));
    assert!(matches!(
        device.call_service("volume_set", &json!({"volume": "loud"})),
        Err(SdkError::InvalidServiceCall { .. })
    ));
    assert_eq!(mock.actions_on(1), vec!["global_join", "group_join"]);
}

#[test]
fn test_watched_property_changes() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    let volume = device.property::<Volume>();
    assert!(!volume.is_watched());
    assert_eq!(volume.watch(), Some(Volume::new(30)));
    assert!(volume.is_watched());

    let events = device.iter();
    mock.push(r#"{"update":"group_volume_changed","vol":44}"#);

    let event = events.recv_timeout(WAIT).expect("volume change event");
    assert_eq!(event.property_key, Volume::KEY);
    assert_eq!(volume.get(), Some(Volume::new(44)));

    volume.unwatch();
    assert!(!volume.is_watched());
    mock.push(r#"{"update":"group_volume_changed","vol":12}"#);
    assert!(wait_until(WAIT, || volume.get() == Some(Volume::new(12))));
    assert!(events.try_recv().is_none());
}

#[test]
fn test_reconnect_restores_entities() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    mock.drop_connections();

    assert!(wait_until(WAIT, || mock.connection_count() == 2 && device.available()));
    assert_eq!(mock.actions_on(2)[..2], ["global_join", "group_join"]);
    assert_eq!(device.volume.native_value(), Some(30.0));

    device.input.select_option("Spotify").unwrap();
    wait_for_frames(&mock, "group_set_input_source", 1);
    let sent_on_second: Vec<String> = mock.actions_on(2);
    assert_eq!(
        sent_on_second,
        vec!["global_join", "group_join", "group_set_input_source"]
    );
}

#[test]
fn test_connect_refused() {
    let config = DeviceConfig::new("127.0.0.1:1");
    let session = SessionConfig::one_shot("127.0.0.1:1");
    let err = Od11Device::connect_with_session(config, session).unwrap_err();
    assert!(matches!(err, SdkError::Session(ref e) if e.is_connection_error()), "{err}");
}

#[test]
fn test_connect_rejects_invalid_config() {
    let err = Od11Device::connect(DeviceConfig::new("10.0.0.5").with_origin("ws://10.0.0.5"))
        .unwrap_err();
    assert!(matches!(err, SdkError::Config(_)));
}

#[test]
fn test_close_stops_worker() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);
    let volume = device.volume.clone();

    device.close();

    assert!(!volume.available());
    assert!(matches!(
        volume.set_native_value(50.0),
        Err(SdkError::WorkerUnavailable)
    ));
    assert!(command_frames(&mock, "group_change_volume").is_empty());
}

#[test]
fn test_property_keys_match_attribute_names() {
    let (_rt, mock) = start_mock(MockBehavior::default());
    let device = connect(&mock);

    let attributes = serde_json::to_value(device.attributes()).unwrap();
    for key in ["sid", "source_id", "sources", "wifi_quality", "revision", "mac", "ssid"] {
        assert!(attributes.get(key).is_some(), "missing attribute {key}");
    }
    assert_eq!(device.property::<Volume>().key(), Volume::KEY);
}
