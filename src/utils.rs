use std::time::SystemTime;

use chrono::{DateTime, Local};

/// Current local time formatted as an ISO-8601 string with second precision,
/// e.g. `2020-01-16T09:15:00`.
pub(crate) fn datetime_now_isostring() -> String {
    datetime_isostring(Local::now())
}

pub(crate) fn datetime_isostring(dt: DateTime<Local>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// A file's modification time, formatted the same way as
/// [`datetime_now_isostring`], for recording in a file's `MediaHash`.
pub(crate) fn system_time_isostring(time: SystemTime) -> String {
    datetime_isostring(DateTime::<Local>::from(time))
}

/// Best-effort host name for [`crate::types::CreatorInfo`]. There's no
/// `hostname`-equivalent crate in this dependency set, so we fall back to
/// the environment and finally a fixed placeholder rather than shelling out.
pub(crate) fn local_host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-host".to_owned())
}
