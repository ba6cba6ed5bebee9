use chrono::{NaiveDateTime, Timelike, Utc};

const COLLECTOR_CONFIG: &str = "COLLECTOR_CONFIG";

const DEFAULT_PORT: u16 = 7700;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

/// Config file given on the command line, falling back to `COLLECTOR_CONFIG`.
pub fn get_config_path(from_args: Option<String>) -> Option<String> {
    from_args.or_else(|| std::env::var(COLLECTOR_CONFIG).ok())
}

/// ISO-8601 basic format, e.g. `20240131T235959`
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp, accepting only the exact form [`format_timestamp`]
/// produces.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .ok()
        .filter(|timestamp| format_timestamp(*timestamp) == value)
}

/// Current UTC time truncated to whole seconds.
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}
