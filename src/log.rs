use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use colored::Colorize;

static INSTANCE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Allocates a process-wide monotonic id, used to disambiguate log
/// filenames and diagnostic messages from concurrently running engine
/// instances.
pub fn next_instance_id() -> usize {
    INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct LogInner {
    file: Option<File>,
}

/// Thread-safe line logger with an optional file sink.
///
/// Mirrors the original engine wrapper's `Log` class: each `print` call can
/// independently be echoed to stdout, written to the file sink, and
/// timestamped.
pub struct Log {
    inner: Mutex<LogInner>,
    dir: PathBuf,
    instance: usize,
}

impl Log {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { inner: Mutex::new(LogInner { file: None }), dir: dir.into(), instance: next_instance_id() }
    }

    pub fn open(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let now = Local::now().format("%Y-%m-%d %H-%M-%S");
        let path = self.dir.join(format!("log{now}_{}.txt", self.instance));
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        // UTF-8 BOM, matching the original wrapper's `utf-8-sig` encoding.
        file.write_all(&[0xEF, 0xBB, 0xBF])?;
        self.inner.lock().unwrap().file = Some(file);
        Ok(())
    }

    pub fn close(&self) {
        self.inner.lock().unwrap().file = None;
    }

    /// Writes `msg` to whichever sinks are enabled. `also_print` echoes to
    /// stdout; `file_logging` appends to the file sink (opening it lazily
    /// if needed); `output_datetime` prefixes a `[YYYY/MM/DD HH:MM:SS]`
    /// timestamp.
    pub fn print(&self, msg: &str, also_print: bool, file_logging: bool, output_datetime: bool) {
        let line = if output_datetime {
            format!("[{}] {msg}", Local::now().format("%Y/%m/%d %H:%M:%S"))
        } else {
            msg.to_string()
        };

        if also_print {
            println!("{line}");
        }

        if file_logging {
            let mut guard = self.inner.lock().unwrap();
            if guard.file.is_none() {
                drop(guard);
                let _ = self.open();
                guard = self.inner.lock().unwrap();
            }
            if let Some(file) = guard.file.as_mut() {
                let _ = writeln!(file, "{line}");
            }
        }
    }

    pub fn error(&self, msg: &str) {
        self.print(&msg.red().bold().to_string(), true, true, true);
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

static SINGLETON: OnceLock<Log> = OnceLock::new();

/// Process-wide logger, lazily rooted at `./log` on first use.
pub fn singleton() -> &'static Log {
    SINGLETON.get_or_init(|| Log::new("./log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_without_sinks_does_not_panic() {
        let log = Log::new(std::env::temp_dir().join("ayane_log_test_noop"));
        log.print("hello", false, false, false);
    }

    #[test]
    fn file_sink_creates_bom_prefixed_file() {
        let dir = std::env::temp_dir().join(format!("ayane_log_test_{}", next_instance_id()));
        let log = Log::new(&dir);
        log.print("hello world", false, true, false);
        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let contents = fs::read(entries[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(&contents[0..3], &[0xEF, 0xBB, 0xBF]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn singleton_is_stable_across_calls() {
        let a = singleton() as *const Log;
        let b = singleton() as *const Log;
        assert_eq!(a, b);
    }
}
