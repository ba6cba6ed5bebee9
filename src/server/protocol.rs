//! Names shared by the agent and the collector endpoint.
//!
//! A sample travels as `POST /metrics?userKey=..&timestamp=..&cpuUsage=..`
//! `&memoryUsage=..&processCount=..` with an empty body. Every metric may be
//! left empty to mark it as not measured.

pub const METRICS_PATH: &str = "/metrics";

pub const USER_KEY_PARAMETER: &str = "userKey";
pub const TIMESTAMP_PARAMETER: &str = "timestamp";
pub const CPU_USAGE_PARAMETER: &str = "cpuUsage";
pub const MEMORY_USAGE_PARAMETER: &str = "memoryUsage";
pub const PROCESS_COUNT_PARAMETER: &str = "processCount";

/// Largest request the collector reads before answering 400.
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;
