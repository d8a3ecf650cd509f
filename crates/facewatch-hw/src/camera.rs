//! V4L2 webcam capture.

use crate::frame;
use image::RgbImage;
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const STREAM_BUFFERS: u32 = 4;
const MAX_VIDEO_NODES: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no such camera: {0}")]
    NotFound(String),
    #[error("camera {0} is in use by another process")]
    Busy(String),
    #[error("{0} is not a video capture device")]
    NotCaptureDevice(String),
    #[error("camera offers {0:?}; need YUYV or MJPG")]
    UnsupportedFormat(FourCC),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("frame conversion failed: {0}")]
    Frame(#[from] frame::FrameError),
}

impl CameraError {
    fn io(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { context, source }
    }
}

/// A video capture node found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel formats the camera may deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed YUV 4:2:2, two pixels per four bytes.
    Yuyv,
    /// One JPEG image per buffer.
    Mjpeg,
}

impl PixelFormat {
    pub fn fourcc(self) -> FourCC {
        match self {
            Self::Yuyv => FourCC::new(b"YUYV"),
            Self::Mjpeg => FourCC::new(b"MJPG"),
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        [Self::Yuyv, Self::Mjpeg].into_iter().find(|f| f.fourcc() == fourcc)
    }
}

/// An opened webcam delivering RGB frames.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open `device_path` and ask for `width`×`height` YUYV frames.
    ///
    /// Drivers that only stream MJPG at that size are accepted too. The
    /// size the driver settles on is what [`Camera::width`]/[`Camera::height`]
    /// report.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::NotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| open_error(device_path, e))?;

        let caps = device.query_caps().map_err(CameraError::io("cannot query capabilities"))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCaptureDevice(device_path.to_string()));
        }
        tracing::info!(device = device_path, driver = %caps.driver, card = %caps.card, "camera found");

        let mut requested = device.format().map_err(CameraError::io("cannot read format"))?;
        requested.width = width;
        requested.height = height;
        requested.fourcc = PixelFormat::Yuyv.fourcc();
        let format = device
            .set_format(&requested)
            .map_err(CameraError::io("cannot set format"))?;

        let pixel_format =
            PixelFormat::from_fourcc(format.fourcc).ok_or(CameraError::UnsupportedFormat(format.fourcc))?;
        if (format.width, format.height) != (width, height) {
            tracing::warn!(
                requested_width = width,
                requested_height = height,
                width = format.width,
                height = format.height,
                "driver adjusted frame size"
            );
        }
        tracing::info!(
            width = format.width,
            height = format.height,
            format = ?pixel_format,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: format.width,
            height: format.height,
            device_path: device_path.to_string(),
            fourcc: format.fourcc,
            pixel_format,
        })
    }

    /// Grab one frame and convert it to RGB.
    ///
    /// Each call streams through a fresh set of mmap buffers, so the frame
    /// is current rather than queued from an earlier cycle.
    pub fn capture_frame(&self) -> Result<RgbImage, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(CameraError::io("cannot start stream"))?;
        let (buf, meta) = stream.next().map_err(CameraError::io("cannot dequeue buffer"))?;
        if meta.bytesused == 0 {
            return Err(CameraError::CaptureFailed("driver returned an empty buffer".into()));
        }

        tracing::trace!(sequence = meta.sequence, bytes = meta.bytesused, "frame dequeued");

        let payload = &buf[..(meta.bytesused as usize).min(buf.len())];
        let image = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(payload, self.width, self.height)?,
            PixelFormat::Mjpeg => frame::mjpeg_to_rgb(payload, self.width, self.height)?,
        };
        Ok(image)
    }

    /// Enumerate `/dev/video*` nodes that can capture video.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_VIDEO_NODES)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities.contains(Flags::VIDEO_CAPTURE).then(|| DeviceInfo {
                    path,
                    name: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                })
            })
            .collect()
    }
}

fn open_error(device_path: &str, e: io::Error) -> CameraError {
    match e.raw_os_error() {
        Some(libc::EBUSY) => CameraError::Busy(device_path.to_string()),
        _ => CameraError::Io {
            context: "cannot open camera",
            source: e,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_round_trip() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), None);
    }

    #[test]
    fn test_open_missing_device() {
        let result = Camera::open("/dev/video-does-not-exist", 640, 480);
        assert!(matches!(result, Err(CameraError::NotFound(_))));
    }

    #[test]
    fn test_open_error_classifies_busy_device() {
        let busy = open_error("/dev/video0", io::Error::from_raw_os_error(libc::EBUSY));
        assert!(matches!(busy, CameraError::Busy(ref p) if p == "/dev/video0"));

        let denied = open_error("/dev/video0", io::Error::from_raw_os_error(libc::EACCES));
        assert!(matches!(denied, CameraError::Io { .. }));
    }
}
