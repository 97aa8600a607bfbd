//! Indian Standard Time helpers for provider timestamps and expiries.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

const IST: FixedOffset = match FixedOffset::east_opt(IST_OFFSET_SECS) {
    Some(offset) => offset,
    None => panic!("IST offset out of range"),
};

/// Current wall-clock time in IST.
pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&IST)
}

/// `YYYY-MM-DDTHH:mm:ss.SSS` in IST.
pub fn request_timestamp() -> String {
    now_ist().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

/// Today's date as `DD/MM/YYYY` in IST.
pub fn today_dmy() -> String {
    now_ist().format("%d/%m/%Y").to_string()
}

/// Remaining lifetime of an IST `YYYY-MM-DD HH:MM:SS` expiry.
///
/// An expiry that is already past or cannot be parsed yields `Duration::ZERO`,
/// so the session it belongs to is never treated as current.
pub fn lifetime_until(expiry: &str) -> Duration {
    lifetime_until_from(expiry, Utc::now())
}

fn lifetime_until_from(expiry: &str, now: DateTime<Utc>) -> Duration {
    let Ok(naive) = NaiveDateTime::parse_from_str(expiry.trim(), "%Y-%m-%d %H:%M:%S") else {
        tracing::warn!(expiry, "Unparseable provider token expiry");
        return Duration::ZERO;
    };
    let Some(at) = IST.from_local_datetime(&naive).single() else {
        return Duration::ZERO;
    };
    (at.with_timezone(&Utc) - now).to_std().unwrap_or(Duration::ZERO)
}
