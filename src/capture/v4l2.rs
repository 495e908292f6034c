//! V4L2 camera.
//!
//! Format negotiation happens on the caller's thread so `open` can report
//! the real dimensions. Buffers are then dequeued on a reader thread that
//! keeps only the newest decoded frame; `latest_frame` just clones the
//! `Arc` out of that slot. `open` does not return until the reader has
//! allocated its buffers and started streaming, so a busy device fails
//! `open` instead of silently producing no frames.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::{to_rgb_image, CaptureConstraints, CaptureDevice, CaptureStats, NegotiatedFormat, PixelFormat};
use crate::error::DeviceError;
use crate::frame::Frame;

const BUFFER_COUNT: u32 = 4;
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct V4l2Camera {
    device: String,
    reader: Option<Reader>,
    frames: Arc<AtomicU64>,
}

struct Reader {
    latest: Arc<Mutex<Option<Arc<Frame>>>>,
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl V4l2Camera {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            reader: None,
            frames: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frames.load(Ordering::Acquire),
            device: self.device.clone(),
        }
    }

    fn device_error(&self, err: io::Error) -> DeviceError {
        match err.kind() {
            io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied {
                device: self.device.clone(),
                reason: err.to_string(),
            },
            _ => DeviceError::Unavailable {
                device: self.device.clone(),
                reason: err.to_string(),
            },
        }
    }
}

impl CaptureDevice for V4l2Camera {
    fn open(&mut self, constraints: &CaptureConstraints) -> Result<NegotiatedFormat, DeviceError> {
        use v4l::video::Capture;

        self.close();

        let device = v4l::Device::with_path(&self.device).map_err(|err| self.device_error(err))?;
        let mut format = device.format().map_err(|err| self.device_error(err))?;
        format.width = constraints.width;
        format.height = constraints.height;
        format.fourcc = v4l::FourCC::new(b"YUYV");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Camera: failed to set format on {}: {}", self.device, err);
                device.format().map_err(|err| self.device_error(err))?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            DeviceError::Unavailable {
                device: self.device.clone(),
                reason: format!("unsupported pixel format {}", format.fourcc),
            }
        })?;

        let mut fps = constraints.fps;
        if constraints.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(constraints.fps);
            match device.set_params(&params) {
                Ok(applied) if applied.interval.numerator > 0 => {
                    fps = applied.interval.denominator / applied.interval.numerator;
                }
                Ok(_) => {}
                Err(err) => {
                    log::warn!("V4l2Camera: failed to set fps on {}: {}", self.device, err);
                }
            }
        }

        let negotiated = NegotiatedFormat {
            width: format.width,
            height: format.height,
            fps,
        };
        self.reader = Some(spawn_reader(
            device,
            self.device.clone(),
            negotiated,
            pixel_format,
            self.frames.clone(),
        )?);

        log::info!(
            "V4l2Camera: opened {} ({}x{} @ {} fps, {:?})",
            self.device,
            negotiated.width,
            negotiated.height,
            negotiated.fps,
            pixel_format
        );
        Ok(negotiated)
    }

    fn latest_frame(&mut self) -> Option<Arc<Frame>> {
        let reader = self.reader.as_ref()?;
        let slot = reader.latest.lock().ok()?;
        slot.clone()
    }

    fn close(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        reader.stop.store(true, Ordering::Release);
        if reader.handle.join().is_err() {
            log::warn!("V4l2Camera: reader thread for {} panicked", self.device);
        }
        log::info!("V4l2Camera: released {}", self.device);
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_reader(
    mut device: v4l::Device,
    name: String,
    format: NegotiatedFormat,
    pixel_format: PixelFormat,
    frames: Arc<AtomicU64>,
) -> Result<Reader, DeviceError> {
    let latest = Arc::new(Mutex::new(None));
    let stop = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);
    let latest_ref = latest.clone();
    let stop_ref = stop.clone();
    let thread_name = name.clone();

    let handle = thread::Builder::new()
        .name("livecam-v4l2".to_string())
        .spawn(move || {
            read_frames(
                &mut device,
                &thread_name,
                format,
                pixel_format,
                &frames,
                &latest_ref,
                &stop_ref,
                ready_tx,
            )
        })
        .map_err(|err| DeviceError::Unavailable {
            device: name.clone(),
            reason: format!("spawn reader thread: {}", err),
        })?;

    let handle = wait_for_startup(&name, &ready_rx, handle)?;
    Ok(Reader {
        latest,
        stop,
        handle,
    })
}

/// Block until the reader reports start-up. On failure the thread has
/// already finished and is joined here.
fn wait_for_startup(
    name: &str,
    ready: &Receiver<Result<(), String>>,
    handle: thread::JoinHandle<()>,
) -> Result<thread::JoinHandle<()>, DeviceError> {
    let startup = ready
        .recv()
        .unwrap_or_else(|_| Err("reader thread exited during start-up".to_string()));
    match startup {
        Ok(()) => Ok(handle),
        Err(reason) => {
            if handle.join().is_err() {
                log::warn!("V4l2Camera: reader thread for {} panicked", name);
            }
            Err(DeviceError::Unavailable {
                device: name.to_string(),
                reason,
            })
        }
    }
}

/// Reader thread body. Reports start-up on `ready` exactly once: after the
/// first dequeue attempt, which is what switches streaming on.
#[allow(clippy::too_many_arguments)]
fn read_frames(
    device: &mut v4l::Device,
    name: &str,
    format: NegotiatedFormat,
    pixel_format: PixelFormat,
    frames: &AtomicU64,
    latest: &Mutex<Option<Arc<Frame>>>,
    stop: &AtomicBool,
    ready: SyncSender<Result<(), String>>,
) {
    use v4l::buffer::Type;
    use v4l::io::traits::CaptureStream;

    let mut stream =
        match v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = ready.send(Err(format!("allocate buffers: {}", err)));
                return;
            }
        };
    stream.set_timeout(DEQUEUE_TIMEOUT);

    let mut ready = Some(ready);
    while !stop.load(Ordering::Acquire) {
        let next = stream.next();
        if let Some(ready) = ready.take() {
            match &next {
                Err(err) if err.kind() != io::ErrorKind::TimedOut => {
                    let _ = ready.send(Err(format!("start streaming: {}", err)));
                    return;
                }
                _ => {
                    let _ = ready.send(Ok(()));
                }
            }
        }

        let (buf, meta) = match next {
            Ok(next) => next,
            Err(err) if err.kind() == io::ErrorKind::TimedOut => continue,
            Err(err) => {
                log::warn!("V4l2Camera: capture on {} failed: {}", name, err);
                thread::sleep(ERROR_BACKOFF);
                continue;
            }
        };
        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        match to_rgb_image(&buf[..used], format.width, format.height, pixel_format) {
            Ok(image) => {
                let sequence = frames.fetch_add(1, Ordering::AcqRel) + 1;
                if let Ok(mut slot) = latest.lock() {
                    *slot = Some(Arc::new(Frame::new(sequence, image)));
                }
            }
            Err(err) => log::debug!("V4l2Camera: dropped undecodable frame: {:#}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_reporting(
        report: Option<Result<(), String>>,
    ) -> (Receiver<Result<(), String>>, thread::JoinHandle<()>) {
        let (tx, rx) = mpsc::sync_channel(1);
        let handle = thread::spawn(move || {
            if let Some(report) = report {
                let _ = tx.send(report);
            }
        });
        (rx, handle)
    }

    #[test]
    fn stream_failure_fails_open() {
        let (rx, handle) = reader_reporting(Some(Err("allocate buffers: device busy".to_string())));
        match wait_for_startup("/dev/video9", &rx, handle) {
            Err(DeviceError::Unavailable { device, reason }) => {
                assert_eq!(device, "/dev/video9");
                assert!(reason.contains("device busy"));
            }
            other => panic!("unexpected start-up result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn reader_exiting_silently_fails_open() {
        let (rx, handle) = reader_reporting(None);
        let err = wait_for_startup("/dev/video9", &rx, handle).map(|_| ()).unwrap_err();
        assert!(matches!(err, DeviceError::Unavailable { .. }));
    }

    #[test]
    fn started_reader_is_kept() {
        let (rx, handle) = reader_reporting(Some(Ok(())));
        let handle = wait_for_startup("/dev/video9", &rx, handle).unwrap();
        handle.join().unwrap();
    }
}
