//! Formatting of measured stage durations for the ETA columns.

use std::time::Duration;

/// Format an elapsed duration as `{h}h{m}m{s}s{ms}ms`.
///
/// Hours and minutes appear only when non-zero. Seconds appear when
/// non-zero or when there are no hours and minutes, so a sub-second run
/// still reads `0s...`. Milliseconds appear only when non-zero and the
/// duration is under a minute.
pub fn format_elapsed(elapsed: Duration) -> String {
    let whole = elapsed.as_secs();
    let millis = elapsed.subsec_millis();

    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let seconds = whole % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    let short = hours == 0 && minutes == 0;
    if seconds > 0 || short {
        out.push_str(&format!("{seconds}s"));
    }
    if millis > 0 && short {
        out.push_str(&format!("{millis}ms"));
    }
    out
}
