use crate::time::{SystemClock, TimeSource};

/// Builds this process's lease identity string:
/// `{machine_name},{pid},{unix_millis}`.
///
/// The identity is stamped into every claimed slot and compared verbatim on
/// refresh, so it must be stable for the process lifetime — callers build it
/// once and reuse it. The timestamp component distinguishes successive
/// incarnations of the same process on the same machine.
pub fn process_identity() -> String {
    format!(
        "{},{},{}",
        machine_name(),
        std::process::id(),
        SystemClock.current_millis()
    )
}

fn machine_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".into())
}
