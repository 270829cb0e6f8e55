pub mod scan_logger;
pub mod scan_video_use_case;
