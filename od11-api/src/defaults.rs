//! Protocol defaults used by the stock OD-11 apps

/// Integration domain, also the prefix of config-entry unique ids
pub const DOMAIN: &str = "od11";

pub const DEFAULT_WS_PATH: &str = "/ws";

pub const DEFAULT_PROTOCOL_MAJOR: u32 = 0;
pub const DEFAULT_PROTOCOL_MINOR: u32 = 4;

/// Client name announced in `group_join`
pub const DEFAULT_NAME: &str = "guest";
pub const DEFAULT_UID: &str = "uid-od11-ha";
pub const DEFAULT_COLOR_INDEX: u32 = 0;
pub const DEFAULT_REALTIME_DATA: bool = true;

/// Seconds between `speaker_ping` frames
pub const DEFAULT_KEEPALIVE_SECS: u64 = 25;

pub const MIN_VOLUME: u8 = 0;
pub const MAX_VOLUME: u8 = 100;
