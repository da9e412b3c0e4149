use std::time::{SystemTime, UNIX_EPOCH};

pub fn utc_now_ms() -> i128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i128
}
