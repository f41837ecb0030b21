//! Forwarding of error-level log events to an operator notifier.

use std::fmt::{self, Write as _};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Sms,
    Telegram,
}

pub trait Notifier: Send + Sync {
    fn notify_error(
        &self,
        header: &str,
        body: &str,
        channels: &[NotificationChannel],
    ) -> io::Result<()>;
}

#[derive(Serialize)]
struct AlertRecord<'a> {
    at: String,
    header: &'a str,
    body: &'a str,
    channels: &'a [NotificationChannel],
}

/// Appends one JSON line per alert to a file.
pub struct FileNotifier {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileNotifier {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl Notifier for FileNotifier {
    fn notify_error(
        &self,
        header: &str,
        body: &str,
        channels: &[NotificationChannel],
    ) -> io::Result<()> {
        let record = AlertRecord {
            at: chrono::Utc::now().to_rfc3339(),
            header,
            body,
            channels,
        };
        let mut line = serde_json::to_vec(&record).map_err(io::Error::other)?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line)?;
        file.flush()
    }
}

impl fmt::Debug for FileNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileNotifier")
            .field("path", &self.path)
            .finish()
    }
}

/// Collects an event's message and fields into one line.
#[derive(Default)]
struct AlertVisitor {
    message: String,
    fields: String,
}

impl AlertVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }

    fn body(&self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message.clone(),
            (true, false) => self.fields.clone(),
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for AlertVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

/// Tracing layer that hands every event it sees to a [`Notifier`].
///
/// Install it behind an `ERROR` level filter. Notifier failures are dropped
/// so alerting can never take down the logging path.
#[derive(Clone)]
pub struct AlertLayer {
    notifier: Arc<dyn Notifier>,
    channels: Vec<NotificationChannel>,
}

impl AlertLayer {
    pub fn new(notifier: Arc<dyn Notifier>, channels: Vec<NotificationChannel>) -> Self {
        Self { notifier, channels }
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = AlertVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        let header = format!("trackport {} in {}", meta.level(), meta.target());
        let _ = self
            .notifier
            .notify_error(&header, &visitor.body(), &self.channels);
    }
}
