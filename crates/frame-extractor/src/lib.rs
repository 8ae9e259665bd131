//! Frame probing and extraction using `FFmpeg`
//!
//! Provides stream-level probing (duration, frame rate, dimensions) and a
//! seek-based single-frame grabber used both for representative scene frames
//! and for sampling frames out of matched time ranges. The grabber holds the
//! demuxer, decoder, and RGB scaler for the lifetime of one video and releases
//! them when dropped, on every exit path.

use ffmpeg_next as ffmpeg;
use image::{DynamicImage, RgbImage};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use scene_search_common::{ProcessingError, VideoMeta};

/// Errors specific to frame extraction
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Video file not found: {0}")]
    FileNotFound(String),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("No decodable frame near {0:.2}s")]
    NoFrameAt(f64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    ImageError(String),
}

impl From<FrameError> for ProcessingError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::NoVideoStream => ProcessingError::NoVideoStream,
            other => ProcessingError::FFmpegError(other.to_string()),
        }
    }
}

impl From<ffmpeg::Error> for FrameError {
    fn from(err: ffmpeg::Error) -> Self {
        FrameError::Ffmpeg(err.to_string())
    }
}

/// Initialize the `FFmpeg` library (must be called once at startup)
pub fn init() -> Result<(), FrameError> {
    ffmpeg::init().map_err(|e| FrameError::Ffmpeg(format!("Failed to initialize FFmpeg: {e}")))
}

/// Probe duration, frame rate, and dimensions of a video file
pub fn probe(path: &Path) -> Result<VideoMeta, FrameError> {
    if !path.exists() {
        return Err(FrameError::FileNotFound(path.display().to_string()));
    }

    let input = ffmpeg::format::input(path)
        .map_err(|e| FrameError::Ffmpeg(format!("Failed to open {}: {e}", path.display())))?;

    let stream = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or(FrameError::NoVideoStream)?;

    let rate = stream.avg_frame_rate();
    let fps = if rate.denominator() > 0 {
        f64::from(rate.numerator()) / f64::from(rate.denominator())
    } else {
        30.0
    };

    let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .map_err(FrameError::from)?
        .decoder()
        .video()
        .map_err(FrameError::from)?;

    let duration = duration_seconds(input.duration());

    let meta = VideoMeta {
        duration,
        fps,
        width: decoder.width(),
        height: decoder.height(),
    };

    debug!(
        "Probed {}: {:.2}s @ {:.2} fps, {}x{}",
        path.display(),
        meta.duration,
        meta.fps,
        meta.width,
        meta.height
    );

    Ok(meta)
}

/// Seek-based single-frame grabber
///
/// Owns the open demuxer, video decoder, and RGB24 scaler. `grab_at` seeks to
/// the nearest preceding keyframe and decodes forward to the requested
/// timestamp, so grabs are cheap even deep into long videos.
pub struct FrameGrabber {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: f64,
    meta: VideoMeta,
}

impl FrameGrabber {
    /// Open a video file for frame grabbing
    ///
    /// # Errors
    /// Returns an error if the file is missing, has no video stream, or the
    /// decoder/scaler cannot be set up.
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let meta = probe(path)?;

        let input = ffmpeg::format::input(path)
            .map_err(|e| FrameError::Ffmpeg(format!("Failed to open {}: {e}", path.display())))?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(FrameError::NoVideoStream)?;
        let stream_index = stream.index();
        let tb = stream.time_base();
        let time_base = f64::from(tb.numerator()) / f64::from(tb.denominator());

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(FrameError::from)?
            .decoder()
            .video()
            .map_err(FrameError::from)?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(FrameError::from)?;

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            meta,
        })
    }

    /// Stream-level facts probed at open time
    #[must_use]
    pub fn meta(&self) -> VideoMeta {
        self.meta
    }

    /// Decode the frame nearest to `seconds`
    ///
    /// # Errors
    /// Returns `NoFrameAt` if nothing decodable is found near the timestamp;
    /// callers treat this as a per-frame failure, not a fatal one.
    pub fn grab_at(&mut self, seconds: f64) -> Result<DynamicImage, FrameError> {
        let timestamp = (seconds * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;

        // Seek backward to the nearest keyframe before the target, then decode
        // forward until the target timestamp is reached.
        unsafe {
            let ret = ffmpeg::sys::av_seek_frame(
                self.input.as_mut_ptr(),
                -1,
                timestamp,
                ffmpeg::sys::AVSEEK_FLAG_BACKWARD as i32,
            );
            if ret < 0 {
                return Err(FrameError::Ffmpeg(format!(
                    "Seek to {seconds:.2}s failed (code {ret})"
                )));
            }
        }
        self.decoder.flush();

        let mut decoded = ffmpeg::frame::Video::empty();
        let mut packets_read = 0usize;
        // Bounded scan so a broken stream cannot stall the pipeline
        const MAX_PACKETS: usize = 512;

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            packets_read += 1;
            if packets_read > MAX_PACKETS {
                break;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let frame_time = decoded
                    .timestamp()
                    .map_or(0.0, |ts| ts as f64 * self.time_base);
                if frame_time + 1e-6 >= seconds {
                    let mut rgb = ffmpeg::frame::Video::empty();
                    self.scaler.run(&decoded, &mut rgb).map_err(FrameError::from)?;
                    return frame_to_image(&rgb);
                }
            }
        }

        Err(FrameError::NoFrameAt(seconds))
    }

    /// Grab the frame nearest to `seconds` and save it as an image file
    pub fn save_frame_at(&mut self, seconds: f64, path: &Path) -> Result<(), FrameError> {
        let img = self.grab_at(seconds)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        img.save(path)
            .map_err(|e| FrameError::ImageError(format!("{}: {e}", path.display())))?;
        debug!("Saved frame at {:.2}s to {}", seconds, path.display());
        Ok(())
    }
}

/// Container duration in seconds; `AV_NOPTS_VALUE` (or any non-positive raw
/// value) means the container does not report one and maps to 0
fn duration_seconds(raw: i64) -> f64 {
    if raw > 0 {
        raw as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
    } else {
        0.0
    }
}

/// Copy an RGB24 frame into an owned image buffer, honoring the row stride
fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<DynamicImage, FrameError> {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut buf = RgbImage::new(width, height);
    for y in 0..height {
        let row_start = y as usize * stride;
        for x in 0..width {
            let idx = row_start + x as usize * 3;
            if idx + 2 >= data.len() {
                warn!("Frame data truncated at row {}", y);
                return Err(FrameError::Ffmpeg("Truncated frame data".to_string()));
            }
            buf.put_pixel(x, y, image::Rgb([data[idx], data[idx + 1], data[idx + 2]]));
        }
    }

    Ok(DynamicImage::ImageRgb8(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_missing_file() {
        let err = probe(Path::new("/nonexistent/video.mp4")).unwrap_err();
        assert!(matches!(err, FrameError::FileNotFound(_)));
    }

    #[test]
    fn test_unreported_duration_maps_to_zero() {
        assert!((duration_seconds(ffmpeg::ffi::AV_NOPTS_VALUE) - 0.0).abs() < f64::EPSILON);
        assert!((duration_seconds(-1) - 0.0).abs() < f64::EPSILON);
        let ten_secs = i64::from(ffmpeg::ffi::AV_TIME_BASE) * 10;
        assert!((duration_seconds(ten_secs) - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_frame_error_is_recoverable_shape() {
        let err = FrameError::NoFrameAt(12.0);
        assert!(err.to_string().contains("12.00"));
    }
}
