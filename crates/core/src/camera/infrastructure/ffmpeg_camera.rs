use std::path::Path;
use std::time::Duration;

use ffmpeg_next::util::error::EAGAIN;

use crate::camera::domain::frame_source::{CameraError, FrameSource};
use crate::shared::config::CameraConfig;
use crate::shared::frame::Frame;

/// Platform capture input format, tried when the device is not a file.
#[cfg(target_os = "macos")]
const CAPTURE_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const CAPTURE_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CAPTURE_FORMAT: &str = "video4linux2,v4l2";

/// Pause between polls of a device that has no packet ready.
const IDLE_POLL_MS: u64 = 2;

/// Consecutive empty polls tolerated before `read` reports a stall.
const MAX_IDLE_POLLS: u64 = 500;

/// Outcome of one demuxer read.
#[derive(Debug, PartialEq, Eq)]
enum PacketRead {
    Ready,
    Pending,
    EndOfStream,
}

/// Sorts a demuxer or decoder status into progress, "try again" and end
/// of input. Anything else is a real failure and is returned as-is.
fn classify(result: Result<(), ffmpeg_next::Error>) -> Result<PacketRead, ffmpeg_next::Error> {
    match result {
        Ok(()) => Ok(PacketRead::Ready),
        Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(PacketRead::Pending),
        Err(ffmpeg_next::Error::Eof) => Ok(PacketRead::EndOfStream),
        Err(e) => Err(e),
    }
}

/// Captures frames via ffmpeg-next from a camera device or a video file.
///
/// Converts each decoded frame to RGB24 and wraps it in a [`Frame`].
pub struct FfmpegCamera {
    config: CameraConfig,
    capture: Option<Capture>,
    frame_index: usize,
}

struct Capture {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    flushing: bool,
}

// Safety: FfmpegCamera is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegCamera {}

impl FfmpegCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            capture: None,
            frame_index: 0,
        }
    }

    fn open_input(&self) -> Result<ffmpeg_next::format::context::Input, CameraError> {
        let device = &self.config.device;
        let open_err = |e: ffmpeg_next::Error| CameraError::Open {
            device: device.clone(),
            reason: e.to_string(),
        };

        if Path::new(device).is_file() {
            return ffmpeg_next::format::input(device).map_err(open_err);
        }

        let format = ffmpeg_next::device::input::video()
            .find(|f| CAPTURE_FORMAT.split(',').any(|name| f.name() == name))
            .ok_or_else(|| CameraError::Open {
                device: device.clone(),
                reason: format!("capture format {CAPTURE_FORMAT} unavailable"),
            })?;

        let mut options = ffmpeg_next::Dictionary::new();
        options.set(
            "video_size",
            &format!("{}x{}", self.config.width, self.config.height),
        );
        options.set("framerate", &self.config.fps.to_string());

        ffmpeg_next::format::open_with(
            device,
            &ffmpeg_next::format::format::Format::Input(format),
            options,
        )
        .map(|ctx| ctx.input())
        .map_err(open_err)
    }

    fn receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let capture = self.capture.as_mut().ok_or(CameraError::NotOpened)?;
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if classify(capture.decoder.receive_frame(&mut decoded))? != PacketRead::Ready {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        capture.scaler.run(&decoded, &mut rgb_frame)?;

        let pixels = extract_rgb_pixels(&rgb_frame, capture.width, capture.height);
        let frame = Frame::new(pixels, capture.width, capture.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

impl FrameSource for FfmpegCamera {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        ffmpeg_next::device::register_all();

        let ictx = self.open_input()?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CameraError::NoVideoStream {
                device: self.config.device.clone(),
            })?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

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
        )?;

        log::info!("Opened camera {} ({width}x{height})", self.config.device);
        self.capture = Some(Capture {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            flushing: false,
        });
        self.frame_index = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut idle_polls = 0;
        loop {
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }

            let capture = self.capture.as_mut().ok_or(CameraError::NotOpened)?;
            if capture.flushing {
                return Ok(None);
            }

            let mut packet = ffmpeg_next::Packet::empty();
            match classify(packet.read(&mut capture.ictx))? {
                PacketRead::Ready => {
                    idle_polls = 0;
                    if packet.stream() != capture.stream_index {
                        continue;
                    }
                    if classify(capture.decoder.send_packet(&packet))? == PacketRead::Pending {
                        log::debug!("Decoder busy, dropping packet");
                    }
                }
                PacketRead::Pending => {
                    idle_polls += 1;
                    if idle_polls > MAX_IDLE_POLLS {
                        return Err(CameraError::Stalled {
                            device: self.config.device.clone(),
                            waited_ms: MAX_IDLE_POLLS * IDLE_POLL_MS,
                        }
                        .into());
                    }
                    std::thread::sleep(Duration::from_millis(IDLE_POLL_MS));
                }
                PacketRead::EndOfStream => {
                    let _ = capture.decoder.send_eof();
                    capture.flushing = true;
                }
            }
        }
    }

    fn close(&mut self) {
        if self.capture.take().is_some() {
            log::info!("Released camera {}", self.config.device);
        }
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.close();
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;

    fn config(device: &str) -> CameraConfig {
        CameraConfig {
            device: device.to_string(),
            ..CameraConfig::default()
        }
    }

    #[test]
    fn test_read_before_open_errors() {
        let mut camera = FfmpegCamera::new(config("/nonexistent/video0"));
        assert!(camera.read().is_err());
    }

    #[test]
    fn test_open_missing_device_errors() {
        let mut camera = FfmpegCamera::new(config("/nonexistent/video0"));
        assert!(camera.open().is_err());
    }

    #[test]
    fn test_classify_separates_retry_and_end_from_failures() {
        assert_eq!(classify(Ok(())), Ok(PacketRead::Ready));
        assert_eq!(
            classify(Err(ffmpeg_next::Error::Other { errno: EAGAIN })),
            Ok(PacketRead::Pending)
        );
        assert_eq!(classify(Err(ffmpeg_next::Error::Eof)), Ok(PacketRead::EndOfStream));
    }

    #[test]
    fn test_classify_surfaces_device_loss() {
        // An unplugged v4l2 device reports ENODEV on every read.
        let unplugged = ffmpeg_next::Error::Other {
            errno: ffmpeg_next::util::error::ENODEV,
        };
        assert_eq!(classify(Err(unplugged)), Err(unplugged));
        assert!(classify(Err(ffmpeg_next::Error::InvalidData)).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut camera = FfmpegCamera::new(config("/nonexistent/video0"));
        camera.close();
        camera.close();
    }
}
