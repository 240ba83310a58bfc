//! Size-rotated log file via a tracing [`Layer`].
//!
//! [`RotatingFileLayer`] formats each event as one line,
//!
//! ```text
//! 2026-01-01T12:00:00.000Z - journal_insight::run - INFO - run completed run=run_1 polls=3
//! ```
//!
//! and hands it to a [`tracing_appender::non_blocking`] worker thread,
//! which appends it to the configured file.  When a write would push the
//! file past `max_bytes`, the file moves to `<file>.1` (older backups
//! shift up to `<file>.N`) and a fresh file is started.

use std::fmt::{self, Write as _};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::field::{Field, Visit};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

// ---------------------------------------------------------------------------
// Rotating writer
// ---------------------------------------------------------------------------

struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    size: u64,
}

impl RotatingFile {
    fn open(path: PathBuf, max_bytes: u64, backups: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes,
            backups,
            file,
            size,
        })
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups > 0 {
            for n in (1..self.backups).rev() {
                let from = self.backup_path(n);
                if from.exists() {
                    fs::rename(&from, self.backup_path(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
            self.file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
        } else {
            self.file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
        }
        self.size = 0;
        Ok(())
    }
}

/// Each `write` carries one whole line from the layer.
impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        if self.size > 0 && self.size + len > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.size += len;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

// ---------------------------------------------------------------------------
// Tracing layer
// ---------------------------------------------------------------------------

/// A [`tracing_subscriber::Layer`] that appends formatted events to a
/// size-rotated file off the calling thread.
pub struct RotatingFileLayer {
    writer: NonBlocking,
}

impl RotatingFileLayer {
    /// Open (or create) `path` for appending.
    ///
    /// Lines still queued are flushed when the returned guard drops, so
    /// keep it alive for as long as the layer is installed.
    pub fn new(
        path: impl AsRef<Path>,
        max_bytes: u64,
        backups: usize,
    ) -> io::Result<(Self, WorkerGuard)> {
        let file = RotatingFile::open(path.as_ref().to_path_buf(), max_bytes, backups)?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        Ok((Self { writer }, guard))
    }
}

impl<S: Subscriber> Layer<S> for RotatingFileLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let line = format!(
            "{} - {} - {} - {}{}\n",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            meta.target(),
            level_str(meta.level()),
            visitor.message,
            visitor.fields,
        );

        // Best-effort; a failing log file must not take the service down.
        let _ = self.writer.clone().write_all(line.as_bytes());
    }
}

fn level_str(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

// ---------------------------------------------------------------------------
// Field visitor
// ---------------------------------------------------------------------------

/// Collects the message plus ` key=value` pairs for the other fields.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }
}
