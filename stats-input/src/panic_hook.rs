use chrono::Local;
use std::{
    backtrace::Backtrace,
    fmt,
    fs::OpenOptions,
    io::Write,
    panic::{PanicHookInfo, take_hook},
    path::{Path, PathBuf},
    thread,
};

use crate::logging::LOG_FILE_PREFIX;

/// Installs a global panic hook that logs panics via `tracing` and, when a
/// log directory is given, appends a panic record to the current daily log
/// file there.
///
/// Lifecycle misuse of the assigner (`init` twice, operations before `init`)
/// panics; with `panic = "abort"` the process ends right after this hook, so
/// the direct file append keeps the diagnostic even when buffered log writers
/// never flush.
pub fn install(log_dir: Option<PathBuf>) {
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let panic_record = PanicRecord::capture(panic_info).to_string();

            tracing::error!(target: "stats_input::panic", "{panic_record}");

            if cfg!(panic = "abort")
                && let Some(dir) = log_dir.as_deref()
            {
                let _ = append_panic_record(dir, &panic_record);
            }
        }));

        previous_hook(panic_info);
    }));
}

fn append_panic_record(log_dir: &Path, record: &str) -> std::io::Result<()> {
    let filename = format!("{LOG_FILE_PREFIX}.{}", Local::now().format("%Y-%m-%d"));
    let path = log_dir.join(filename);

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{record}")?;
    file.flush()
}

/// What gets logged for one panic.
struct PanicRecord {
    thread: String,
    location: String,
    message: String,
    backtrace: Backtrace,
}

impl PanicRecord {
    fn capture(panic_info: &PanicHookInfo<'_>) -> Self {
        let payload = panic_info.payload();
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| panic_info.to_string());

        Self {
            thread: thread::current()
                .name()
                .unwrap_or("<unnamed>")
                .to_string(),
            location: panic_info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
                .unwrap_or_else(|| "<unknown>".to_string()),
            message,
            backtrace: Backtrace::force_capture(),
        }
    }
}

impl fmt::Display for PanicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} PANIC thread={} location={} message={}\nBacktrace:\n{}",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
            self.thread,
            self.location,
            self.message,
            self.backtrace
        )
    }
}
