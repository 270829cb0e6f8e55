pub mod event_sink;
pub mod presence_event;
