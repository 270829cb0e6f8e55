use thiserror::Error;

use super::presence_event::PresenceEvent;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to write event record: {0}")]
    Io(#[from] std::io::Error),
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}

/// Durable, append-only destination for presence events.
///
/// An `Ok` return means the event is recorded; the tracker only forgets an
/// object after its event was appended successfully.
pub trait EventSink: Send {
    fn append(&mut self, event: &PresenceEvent) -> Result<(), SinkError>;
}
