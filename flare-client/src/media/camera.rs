//! V4L2 camera source.
//!
//! The device and its mmap stream live on a dedicated capture thread
//! for their whole life; [`CameraSource::grab`] sends it a request and
//! awaits the frame. Releasing the source drops the request channel,
//! which ends the thread and closes the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use flare_core::{
    CaptureConstraints, CapturedFrame, FlareError, MediaProvider, MediaSource, PixelFormat,
};
use image::ImageFormat;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

const RGB3: &[u8; 4] = b"RGB3";
const MJPG: &[u8; 4] = b"MJPG";
const STREAM_BUFFERS: u32 = 4;

type GrabReply = oneshot::Sender<Result<CapturedFrame, FlareError>>;

/// Opens a V4L2 device such as `/dev/video0`.
#[derive(Debug, Clone)]
pub struct CameraProvider {
    device: String,
}

impl CameraProvider {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

#[async_trait]
impl MediaProvider for CameraProvider {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Arc<dyn MediaSource>, FlareError> {
        let source = CameraSource::open(&self.device, *constraints).await?;
        Ok(Arc::new(source))
    }
}

/// A live V4L2 camera.
pub struct CameraSource {
    device: String,
    requests: Mutex<Option<mpsc::Sender<GrabReply>>>,
    released: AtomicBool,
}

impl CameraSource {
    async fn open(device: &str, constraints: CaptureConstraints) -> Result<Self, FlareError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (requests_tx, requests_rx) = mpsc::channel(1);

        let path = device.to_string();
        std::thread::Builder::new()
            .name("flare-camera".into())
            .spawn(move || capture_thread(path, constraints, ready_tx, requests_rx))
            .map_err(|e| FlareError::MediaUnavailable(format!("{device}: {e}")))?;

        let layout = ready_rx
            .await
            .map_err(|_| FlareError::MediaUnavailable(format!("{device}: capture thread died")))??;
        info!(
            "camera {device} open: {}x{} {:?}",
            layout.width, layout.height, layout.encoding
        );

        Ok(Self {
            device: device.to_string(),
            requests: Mutex::new(Some(requests_tx)),
            released: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl MediaSource for CameraSource {
    async fn grab(&self) -> Result<CapturedFrame, FlareError> {
        let requests = self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| FlareError::Capture("source released".into()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        requests
            .send(reply_tx)
            .await
            .map_err(|_| FlareError::Capture(format!("{}: capture thread stopped", self.device)))?;
        reply_rx
            .await
            .map_err(|_| FlareError::Capture(format!("{}: capture thread stopped", self.device)))?
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!("camera {} released", self.device);
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

// ── Capture thread ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Encoding {
    Rgb,
    Mjpeg,
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    width: u32,
    height: u32,
    stride: u32,
    encoding: Encoding,
}

impl Layout {
    fn frame(&self, buf: &[u8]) -> Result<CapturedFrame, FlareError> {
        match self.encoding {
            Encoding::Rgb => Ok(CapturedFrame {
                width: self.width,
                height: self.height,
                stride: self.stride,
                format: PixelFormat::Rgb8,
                data: buf.to_vec(),
                timestamp: Instant::now(),
            }),
            Encoding::Mjpeg => {
                let rgb = image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
                    .map_err(|e| FlareError::Capture(e.to_string()))?
                    .to_rgb8();
                let (width, height) = rgb.dimensions();
                Ok(CapturedFrame::packed(
                    width,
                    height,
                    PixelFormat::Rgb8,
                    rgb.into_raw(),
                ))
            }
        }
    }
}

fn capture_thread(
    path: String,
    constraints: CaptureConstraints,
    ready: oneshot::Sender<Result<Layout, FlareError>>,
    mut requests: mpsc::Receiver<GrabReply>,
) {
    let (mut device, layout) = match open_device(&path, &constraints) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let stream = MmapStream::with_buffers(&mut device, Type::VideoCapture, STREAM_BUFFERS);
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(FlareError::MediaUnavailable(format!("{path}: {e}"))));
            return;
        }
    };
    if ready.send(Ok(layout)).is_err() {
        return;
    }

    while let Some(reply) = requests.blocking_recv() {
        let frame = stream
            .next()
            .map_err(|e| FlareError::Capture(format!("{path}: {e}")))
            .and_then(|(buf, _meta)| layout.frame(buf));
        let _ = reply.send(frame);
    }
    debug!("camera {path} capture thread finished");
}

fn open_device(
    path: &str,
    constraints: &CaptureConstraints,
) -> Result<(Device, Layout), FlareError> {
    let unavailable = |e: std::io::Error| FlareError::MediaUnavailable(format!("{path}: {e}"));

    let device = Device::with_path(path).map_err(unavailable)?;
    let mut format = device.format().map_err(unavailable)?;
    format.width = constraints.ideal_width;
    format.height = constraints.ideal_height;

    // Raw RGB when the driver offers it, otherwise the camera's own JPEG.
    let mut chosen = None;
    for fourcc in [RGB3, MJPG] {
        format.fourcc = FourCC::new(fourcc);
        match device.set_format(&format) {
            Ok(applied) if applied.fourcc == FourCC::new(fourcc) => {
                chosen = Some(applied);
                break;
            }
            Ok(applied) => debug!(
                "{path}: asked for {}, driver chose {}",
                format.fourcc, applied.fourcc
            ),
            Err(e) => warn!("{path}: cannot set {}: {e}", format.fourcc),
        }
    }
    let Some(format) = chosen else {
        return Err(FlareError::MediaUnavailable(format!(
            "{path}: camera offers neither RGB3 nor MJPG frames"
        )));
    };

    if constraints.ideal_fps > 0 {
        let params = v4l::video::capture::Parameters::with_fps(constraints.ideal_fps);
        if let Err(e) = device.set_params(&params) {
            warn!("{path}: cannot set {} fps: {e}", constraints.ideal_fps);
        }
    }

    let encoding = if format.fourcc == FourCC::new(RGB3) {
        Encoding::Rgb
    } else {
        Encoding::Mjpeg
    };
    let layout = Layout {
        width: format.width,
        height: format.height,
        stride: format.stride.max(format.width * 3),
        encoding,
    };
    Ok((device, layout))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_layout_keeps_padded_rows() {
        let layout = Layout {
            width: 2,
            height: 2,
            stride: 8,
            encoding: Encoding::Rgb,
        };
        let frame = layout.frame(&[7u8; 16]).unwrap();
        assert_eq!(frame.stride, 8);
        assert_eq!(frame.to_rgb().unwrap().len(), 12);
    }

    #[test]
    fn mjpeg_layout_decodes_camera_jpeg() {
        let mut jpeg = Vec::new();
        image::RgbImage::new(4, 2)
            .write_to(&mut std::io::Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();
        let layout = Layout {
            width: 0,
            height: 0,
            stride: 0,
            encoding: Encoding::Mjpeg,
        };
        let frame = layout.frame(&jpeg).unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
        assert!(layout.frame(b"not a jpeg").is_err());
    }
}
