use crate::config::{load_config, Config};
use crate::dispatch::{Dispatcher, FrameAdmitter, Pipeline, PhotoSubmitter};
use crate::frame::{image_dir, load_photo, DirectorySource, FrameSource};
use crate::gate::AdmissionGate;
use crate::ipc::{ControlMessage, ControlReply};
use crate::report::{JsonLinesSink, LogSink, ResultSink};
use anyhow::Context;
use std::fs;
use std::io::{self, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// Overrides from the command line. `None` keeps the configured value.
#[derive(Debug, Default, Clone)]
pub struct WatchOptions {
    pub dir: Option<PathBuf>,
    pub camera: bool,
    pub capacity: Option<usize>,
    pub fps: Option<f32>,
    pub loops: Option<u32>,
    pub json: bool,
}

impl WatchOptions {
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(k) = self.capacity {
            cfg.capacity = k;
        }
        if let Some(fps) = self.fps {
            cfg.fps = fps;
        }
    }
}

pub fn result_sink(json: bool) -> Arc<dyn ResultSink> {
    if json {
        Arc::new(JsonLinesSink::new(std::io::stdout()))
    } else {
        Arc::new(LogSink)
    }
}

pub fn run_daemon(opts: WatchOptions) -> anyhow::Result<()> {
    let mut cfg = load_config();
    opts.apply(&mut cfg);
    debug!(capacity = cfg.capacity, fps = cfg.fps, "loaded configuration");

    let gate = AdmissionGate::new(cfg.capacity).context("invalid configuration")?;
    let dispatcher = Dispatcher::spawn(Pipeline::from_config(&cfg, result_sink(opts.json))?)?;
    let (frames, photos) = dispatcher.entry_points(gate.clone());

    let sock_path = crate::ipc::socket_path();
    if fs::remove_file(&sock_path).is_ok() {
        trace!(path = %sock_path.display(), "removed stale socket");
    }
    let listener = UnixListener::bind(&sock_path)
        .with_context(|| format!("failed to bind {}", sock_path.display()))?;
    let socket = SocketFile(sock_path);
    debug!(path = %socket.0.display(), "socket bound");
    let ctrl_gate = gate.clone();
    std::thread::Builder::new()
        .name("snackgate-ipc".into())
        .spawn(move || serve(listener, photos, ctrl_gate))
        .context("failed to spawn control thread")?;

    let mut source = open_source(&opts)?;
    info!(capacity = gate.capacity(), "watching");
    let count = pump(source.as_mut(), &frames, cfg.fps)?;
    info!(frames = count, "stream ended");
    dispatcher.shutdown();
    Ok(())
}

/// Removes the bound socket file however the watcher exits.
struct SocketFile(PathBuf);

impl Drop for SocketFile {
    fn drop(&mut self) {
        if fs::remove_file(&self.0).is_ok() {
            trace!(path = %self.0.display(), "removed socket");
        }
    }
}

fn open_source(opts: &WatchOptions) -> anyhow::Result<Box<dyn FrameSource>> {
    if opts.camera {
        #[cfg(feature = "camera")]
        return Ok(Box::new(crate::camera::CameraSource::open(0)?));
        #[cfg(not(feature = "camera"))]
        anyhow::bail!("camera input needs the `camera` feature");
    }
    let dir = opts.dir.clone().unwrap_or_else(image_dir);
    // --loops 0 replays forever.
    let passes = match opts.loops {
        Some(0) => None,
        Some(n) => Some(n),
        None => Some(1),
    };
    Ok(Box::new(DirectorySource::new(&dir, passes)?))
}

/// Slowest rate the stream is paced at.
pub const MIN_FPS: f32 = 0.1;

/// Consecutive source failures tolerated before the stream is abandoned.
pub const MAX_SOURCE_FAILURES: u32 = 30;

/// Gap between frames for `fps`. Rates that are not positive and finite
/// disable pacing; tiny rates are clamped to [`MIN_FPS`].
pub fn frame_interval(fps: f32) -> Duration {
    if !fps.is_finite() || fps <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(1.0 / f64::from(fps.max(MIN_FPS))).unwrap_or(Duration::ZERO)
}

/// Feeds frames into the gate at no more than `fps`. A frame that fails to
/// capture or decode is logged and skipped. Returns the number of frames
/// admitted.
pub fn pump(
    source: &mut dyn FrameSource,
    frames: &FrameAdmitter,
    fps: f32,
) -> anyhow::Result<u64> {
    let interval = frame_interval(fps);
    let mut count = 0;
    let mut failures = 0;
    let mut last: Option<Instant> = None;
    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                failures += 1;
                error!(failures, "skipping frame: {e:#}");
                if failures >= MAX_SOURCE_FAILURES {
                    return Err(e.context("frame source keeps failing"));
                }
                continue;
            }
        };
        failures = 0;
        if let Some(rest) = last.and_then(|t| interval.checked_sub(t.elapsed())) {
            std::thread::sleep(rest);
        }
        last = Some(Instant::now());
        trace!(seq = frame.seq, "frame arrived");
        frames.admit_frame(frame)?;
        count += 1;
    }
    Ok(count)
}

/// Answers control connections until the listener fails.
pub fn serve(listener: UnixListener, photos: PhotoSubmitter, gate: AdmissionGate) {
    for stream in listener.incoming() {
        match stream {
            Ok(s) => handle_connection(s, &photos, &gate),
            Err(e) => error!("failed to accept connection: {e}"),
        }
    }
}

fn handle_connection(mut s: UnixStream, photos: &PhotoSubmitter, gate: &AdmissionGate) {
    let reply = match serde_json::from_reader::<_, ControlMessage>(&mut s) {
        Ok(msg) => {
            debug!(?msg, "received message");
            match msg {
                ControlMessage::SubmitPhoto(path) => match load_photo(&path)
                    .and_then(|photo| photos.admit_photo(photo))
                {
                    Ok(()) => ControlReply::Accepted,
                    Err(e) => ControlReply::Error(format!("{e:#}")),
                },
                ControlMessage::Status => ControlReply::Status(gate.stats()),
            }
        }
        Err(e) => ControlReply::Error(format!("malformed request: {e}")),
    };
    let sent = serde_json::to_writer(&mut s, &reply)
        .map_err(io::Error::from)
        .and_then(|()| s.flush());
    if let Err(e) = sent {
        error!("failed to send reply: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn interval_handles_degenerate_rates() {
        assert_eq!(frame_interval(0.0), Duration::ZERO);
        assert_eq!(frame_interval(-3.0), Duration::ZERO);
        assert_eq!(frame_interval(f32::NAN), Duration::ZERO);
        assert_eq!(frame_interval(f32::INFINITY), Duration::ZERO);
        assert_eq!(frame_interval(1e-30), frame_interval(MIN_FPS));
        assert!(frame_interval(1e-30) <= Duration::from_secs(10));
        assert_eq!(frame_interval(2.0), Duration::from_millis(500));
    }

    #[test]
    fn socket_file_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sock");
        let _listener = UnixListener::bind(&path).unwrap();
        let guard = SocketFile(path.clone());
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }
}
