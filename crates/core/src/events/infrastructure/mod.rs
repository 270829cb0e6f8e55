pub mod csv_event_sink;
pub mod memory_event_sink;
