use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::events::domain::event_sink::{EventSink, SinkError};
use crate::events::domain::presence_event::PresenceEvent;

pub const CSV_HEADER: [&str; 3] = ["Timestamp", "Object", "Duration_Seconds"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Appends one CSV row per event: local timestamp, label, duration rounded to
/// two decimals. Every row is flushed before `append` returns.
pub struct CsvEventSink<W: Write + Send> {
    writer: W,
}

impl CsvEventSink<File> {
    /// Creates (or truncates) `path` and writes the header.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        Self::with_header(File::create(path)?)
    }

    /// Appends to `path`, writing the header only if the file is new or empty.
    pub fn open_append(path: &Path) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            Self::with_header(file)
        } else {
            Ok(Self { writer: file })
        }
    }
}

impl<W: Write + Send> CsvEventSink<W> {
    pub fn with_header(writer: W) -> Result<Self, SinkError> {
        let mut sink = Self { writer };
        sink.write_row(&CSV_HEADER)?;
        Ok(sink)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_row(&mut self, fields: &[&str]) -> Result<(), SinkError> {
        let line = fields
            .iter()
            .map(|f| escape_field(f))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> EventSink for CsvEventSink<W> {
    fn append(&mut self, event: &PresenceEvent) -> Result<(), SinkError> {
        let timestamp = event.logged_at().format(TIMESTAMP_FORMAT).to_string();
        let duration = format!("{:.2}", event.duration_seconds());
        self.write_row(&[&timestamp, event.label(), &duration])
    }
}

/// Quotes a field containing a delimiter, quote or line break.
fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
