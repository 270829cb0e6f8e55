pub mod object_state;
pub mod presence_tracker;
