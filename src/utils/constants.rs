// src/utils/constants.rs
use std::time::Duration;

// ---------------------------------------------------------
// Server
// ---------------------------------------------------------
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);
pub const TICK_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------
// Storage
// ---------------------------------------------------------
pub const MEMORY_NAMESPACE: &str = "Jobs";
pub const MEMORY_DEFAULT_CAPACITY: u64 = 10_000;

// Redis hash fields of a stored entry
pub const FIELD_TYPE: &str = "type";
pub const FIELD_DATA: &str = "data";

// SCAN page size; DEL batch size inside the delete script
pub const SCAN_COUNT: usize = 1000;

// ---------------------------------------------------------
// Redis scripts
// ---------------------------------------------------------
pub const SET_SCRIPT: &str = r#"
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2], ARGV[3], ARGV[4])
return 1
"#;

pub const HMGET_SCRIPT: &str = r#"
return redis.call('HMGET', KEYS[1], unpack(ARGV))
"#;

// unpack() has a stack limit, so keys are deleted in slices
pub const DEL_SCRIPT: &str = r#"
local keys = redis.call('KEYS', ARGV[1])
local deleted = 0
for i = 1, #keys, 500 do
  deleted = deleted + redis.call('DEL', unpack(keys, i, math.min(i + 499, #keys)))
end
return deleted
"#;

// ---------------------------------------------------------
// Environment
// ---------------------------------------------------------
pub const ENV_REDIS_URL: &str = "QRUSH_JOBS_REDIS_URL";
pub const ENV_REDIS_URL_FALLBACK: &str = "REDIS_URL";
pub const ENV_INSTANCE: &str = "QRUSH_JOBS_INSTANCE";
