pub mod frame_sampler;
pub mod source_metadata;
pub mod video_reader;
