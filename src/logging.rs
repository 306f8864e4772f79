use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing_subscriber::fmt::MakeWriter;

// ── LogFile ──────────────────────────────────────────────

/// A `MakeWriter` that discards everything until a file is attached.
///
/// The subscriber is installed before config is loaded, so the log file
/// (from `--log-file` or `[logging] file`) is attached afterwards through
/// the paired [`LogFileHandle`].
#[derive(Clone, Default)]
pub struct LogFile {
    sink: Arc<Mutex<Option<File>>>,
}

#[derive(Clone)]
pub struct LogFileHandle {
    sink: Arc<Mutex<Option<File>>>,
}

impl LogFile {
    pub fn new() -> (Self, LogFileHandle) {
        let file = Self::default();
        let handle = LogFileHandle {
            sink: file.sink.clone(),
        };
        (file, handle)
    }
}

impl LogFileHandle {
    /// Start appending to `path`, creating parent directories as needed.
    pub fn attach(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Ok(mut sink) = self.sink.lock() {
            *sink = Some(file);
        }
        Ok(())
    }
}

pub struct LogFileWriter {
    sink: Arc<Mutex<Option<File>>>,
}

impl std::io::Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.sink.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.sink.lock() {
            Ok(mut guard) => guard.as_mut().map_or(Ok(()), |f| f.flush()),
            Err(_) => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter {
            sink: self.sink.clone(),
        }
    }
}

// ── Timed ────────────────────────────────────────────────

/// Logs the start and end of an operation with its wall time.
///
/// Dropping without calling [`Timed::succeed`] or [`Timed::fail`] (an
/// early `?` return) logs the operation as failed.
pub struct Timed {
    op: String,
    start: Instant,
    finished: bool,
}

impl Timed {
    pub fn start(op: impl Into<String>) -> Self {
        let op = op.into();
        tracing::info!("starting {op}");
        Self {
            op,
            start: Instant::now(),
            finished: false,
        }
    }

    pub fn succeed(mut self) {
        self.finished = true;
        tracing::info!(
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            "completed {} in {:.1}s",
            self.op,
            self.start.elapsed().as_secs_f64()
        );
    }

    pub fn fail(mut self) {
        self.finished = true;
        self.log_failure();
    }

    fn log_failure(&self) {
        tracing::warn!(
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            "failed {} after {:.1}s",
            self.op,
            self.start.elapsed().as_secs_f64()
        );
    }
}

impl Drop for Timed {
    fn drop(&mut self) {
        if !self.finished {
            self.log_failure();
        }
    }
}
