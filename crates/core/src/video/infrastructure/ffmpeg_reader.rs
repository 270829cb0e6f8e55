use crate::shared::frame::Frame;
use crate::video::domain::source_metadata::SourceMetadata;
use crate::video::domain::video_reader::{VideoError, VideoReader};

/// Decodes video files and network streams via ffmpeg-next (libavformat +
/// libavcodec).
///
/// Converts each decoded frame to RGB24 and wraps it in a [`Frame`].
pub struct FfmpegReader {
    opened: Option<OpenedInput>,
}

struct OpenedInput {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    video_stream_index: usize,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self { opened: None }
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

fn open_error(source: &str, e: impl std::fmt::Display) -> VideoError {
    VideoError::Open {
        source_name: source.to_string(),
        message: e.to_string(),
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, source: &str) -> Result<SourceMetadata, VideoError> {
        ffmpeg_next::init().map_err(|e| open_error(source, e))?;

        let ictx = ffmpeg_next::format::input(&source).map_err(|e| open_error(source, e))?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| VideoError::NoVideoStream(source.to_string()))?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| open_error(source, e))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| open_error(source, e))?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let total_frames = usize::try_from(stream.frames()).unwrap_or(0);

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| open_error(source, e))?;

        let metadata = SourceMetadata {
            width,
            height,
            fps,
            total_frames,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source: source.to_string(),
        };

        self.opened = Some(OpenedInput {
            ictx,
            decoder,
            scaler,
            width,
            height,
            video_stream_index,
        });

        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, VideoError>> + '_> {
        let Some(opened) = self.opened.as_mut() else {
            return Box::new(std::iter::once(Err(VideoError::NotOpened)));
        };

        Box::new(FfmpegFrameIter {
            opened,
            frame_index: 0,
            flushing: false,
            done: false,
        })
    }

    fn close(&mut self) {
        self.opened = None;
    }
}

/// Lazy iterator that decodes video frames one at a time, avoiding the need
/// to buffer the entire video in memory.
struct FfmpegFrameIter<'a> {
    opened: &'a mut OpenedInput,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

impl FfmpegFrameIter<'_> {
    fn try_receive(&mut self) -> Option<Result<Frame, VideoError>> {
        let opened = &mut *self.opened;
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if opened.decoder.receive_frame(&mut decoded).is_err() {
            return None;
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = opened.scaler.run(&decoded, &mut rgb_frame) {
            return Some(Err(VideoError::Decode(e.to_string())));
        }

        let pixels = extract_rgb_pixels(&rgb_frame, opened.width, opened.height);
        let frame = Frame::new(pixels, opened.width, opened.height, self.frame_index);
        self.frame_index += 1;
        Some(Ok(frame))
    }
}

impl Iterator for FfmpegFrameIter<'_> {
    type Item = Result<Frame, VideoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.opened.ictx.packets().next() else {
                let _ = self.opened.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };

            if stream.index() != self.opened.video_stream_index {
                continue;
            }

            if let Err(e) = self.opened.decoder.send_packet(&packet) {
                log::debug!("Dropping undecodable packet: {e}");
                continue;
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg frames may have padding bytes at the end of each row (stride > width*3).
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
