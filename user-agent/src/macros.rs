/// Logs a structured line with timestamp, level, component, pid, tid, and message.
/// Usage:
/// ```ignore
/// umfs_log!(Level::Info, "service", "Service started");
/// umfs_log!(Level::Error, "config", "Config load failed: {}", err);
/// ```
/// Logs like:
/// [2026-04-25T16:32:10+02:00][DEBUG][service][pid=4568][tid=ThreadId(3)] Your message here
#[macro_export]
macro_rules! umfs_log {
    ($level:expr, $component:expr, $fmt:expr $(, $($arg:tt)+)?) => {
        log::log!(
            $level,
            concat!(
                "[", "{}", "]",          // timestamp
                "[", "{}", "]",          // level via Display
                "[", $component, "]",    // component
                "[pid=", "{}", "]",      // pid
                "[tid=", "{:?}", "] ",   // tid
                $fmt
            ),
            chrono::Local::now().to_rfc3339(),
            $level,
            std::process::id(),
            std::thread::current().id()
            $(, $($arg)+)?
        );
    };
}
