use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::media::StreamMode;
use crate::models::state::PipeState;
use crate::processing::frame::Frame;
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::encoder_program::{EncodeJob, EncoderProgram};

use super::signal::Event;

/// Called by the writer thread once a frame's bytes are in the pipe.
pub type ReleaseCallback = Arc<dyn Fn(Frame) + Send + Sync>;

const EXIT_POLL: Duration = Duration::from_millis(10);
const LOG_CHUNK: usize = 4 * 1024;

/// How a pipe accepts frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipeOptions {
    /// Wait for the previous frame to be written before queueing the next.
    pub blocking: bool,
    /// Upper bound on that wait.
    pub blocking_wait: Duration,
    /// Decoded frames buffered ahead of the consumer.
    pub ring_capacity: usize,
    /// How long a freshly spawned process is watched for an early exit.
    pub startup_grace: Duration,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            blocking: false,
            blocking_wait: Duration::from_secs(5),
            ring_capacity: 5,
            startup_grace: Duration::from_millis(200),
        }
    }
}

/// State shared between the owning pipe and its worker threads.
///
/// Rebuilt on every start so threads of a previous run never see new frames.
struct Shared {
    label: String,
    slot: Mutex<Option<Frame>>,
    should_exit: AtomicBool,
    should_pause: AtomicBool,
    ready: Event,
    frame_ready: Event,
    frame_written: Event,
    data_worker_done: AtomicBool,
    frames_written: AtomicU64,
    frames_read: AtomicU64,
    frames_overwritten: AtomicU64,
    release: Mutex<Option<ReleaseCallback>>,
    decoded: Mutex<RingBuffer<Frame>>,
    recycled: Mutex<Vec<Frame>>,
    log: Mutex<String>,
}

impl Shared {
    fn new(label: String, release: Option<ReleaseCallback>, ring_capacity: usize) -> Self {
        Self {
            label,
            slot: Mutex::new(None),
            should_exit: AtomicBool::new(false),
            should_pause: AtomicBool::new(true),
            ready: Event::manual(false),
            frame_ready: Event::auto(false),
            frame_written: Event::manual(true),
            data_worker_done: AtomicBool::new(false),
            frames_written: AtomicU64::new(0),
            frames_read: AtomicU64::new(0),
            frames_overwritten: AtomicU64::new(0),
            release: Mutex::new(release),
            decoded: Mutex::new(RingBuffer::new(ring_capacity)),
            recycled: Mutex::new(Vec::new()),
            log: Mutex::new(String::new()),
        }
    }

    fn exiting(&self) -> bool {
        self.should_exit.load(Ordering::SeqCst)
    }

    fn paused(&self) -> bool {
        self.should_pause.load(Ordering::SeqCst)
    }

    fn release_frame(&self, frame: Frame) {
        let callback = self.release.lock().clone();
        if let Some(callback) = callback {
            callback(frame);
        }
    }
}

/// A running encoder (or decoder) subprocess and the threads that feed it.
///
/// Encoding: frames handed to [`queue_frame`](Self::queue_frame) are written to
/// the child's stdin by a writer thread. Decoding: a reader thread pulls fixed
/// size raw frames from stdout into a small ring that the consumer drains with
/// [`next_frame`](Self::next_frame). In both modes stderr is drained by a log
/// thread and emitted once when the process ends.
///
/// ```text
/// not_started → running → stopping → stopped
/// ```
pub struct EncoderProcess {
    shared: Arc<Shared>,
    child: Option<Child>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    log_drain: Option<JoinHandle<()>>,
    state: PipeState,
    mode: Option<StreamMode>,
    options: PipeOptions,
    release: Option<ReleaseCallback>,
    output_path: Option<PathBuf>,
    exit_status: Option<ExitStatus>,
}

impl EncoderProcess {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new(String::new(), None, 1)),
            child: None,
            writer: None,
            reader: None,
            log_drain: None,
            state: PipeState::NotStarted,
            mode: None,
            options: PipeOptions::default(),
            release: None,
            output_path: None,
            exit_status: None,
        }
    }

    /// Launch the subprocess for `job` and start the worker threads.
    ///
    /// Fails if the executable cannot be found or spawned, or if the process
    /// exits right away; in that case its stderr is the error message.
    pub fn start(&mut self, program: &dyn EncoderProgram, job: &EncodeJob, options: PipeOptions) -> Result<(), CaptureError> {
        if !self.state.can_start() {
            return Err(CaptureError::InvalidState(format!("cannot start pipe while {:?}", self.state)));
        }
        self.join_workers();

        let executable = program.executable()?;
        let reading = job.mode.is_reading();

        let mut command = Command::new(&executable);
        command
            .args(program.args(job))
            .stdin(if reading { Stdio::null() } else { Stdio::piped() })
            .stdout(if reading { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped());
        program.configure(&mut command);

        log::info!("Opening encoder pipe: {:?}", command);

        let mut child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => CaptureError::ExecutableNotFound(executable.clone()),
            _ => CaptureError::StartFailed(format!("{}: {}", executable.display(), e)),
        })?;

        if let Some(status) = watch_startup(&mut child, options.startup_grace) {
            // A decoder may legitimately finish a short input inside the window.
            if !(reading && status.success()) {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                let reason = if stderr.trim().is_empty() {
                    format!("encoder exited immediately with {}", status)
                } else {
                    stderr.trim().to_string()
                };
                log::error!("{}", reason);
                return Err(CaptureError::StartFailed(reason));
            }
        }

        let label = job.output_file().unwrap_or(&job.input).to_string();
        let shared = Arc::new(Shared::new(label, self.release.clone(), options.ring_capacity.max(1)));

        if let Err(err) = self.spawn_workers(&shared, &mut child, job) {
            let _ = child.kill();
            let _ = child.wait();
            shared.should_exit.store(true, Ordering::SeqCst);
            wake_all(&shared);
            self.shared = shared;
            self.join_workers();
            return Err(err);
        }

        self.shared = shared;
        self.child = Some(child);
        self.mode = Some(job.mode);
        self.options = options;
        self.output_path = job.output_file().map(PathBuf::from);
        self.exit_status = None;
        self.transition(PipeState::Running);

        self.shared.should_pause.store(false, Ordering::SeqCst);
        self.shared.ready.set();
        Ok(())
    }

    fn spawn_workers(&mut self, shared: &Arc<Shared>, child: &mut Child, job: &EncodeJob) -> Result<(), CaptureError> {
        if let Some(stderr) = child.stderr.take() {
            let shared = Arc::clone(shared);
            self.log_drain = Some(spawn_named("encoder-log", move || drain_log(&shared, stderr))?);
        }

        if job.mode.is_reading() {
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| CaptureError::StartFailed("decoder stdout was not captured".into()))?;
            let frame_bytes = job.size.byte_len();
            let pixels = job.size.pixel_count();
            let shared = Arc::clone(shared);
            self.reader = Some(spawn_named("encoder-reader", move || read_frames(&shared, stdout, frame_bytes, pixels))?);
        } else {
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| CaptureError::StartFailed("encoder stdin was not captured".into()))?;
            let shared = Arc::clone(shared);
            self.writer = Some(spawn_named("encoder-writer", move || write_frames(&shared, stdin))?);
        }
        Ok(())
    }

    /// Ask the workers to finish and wake every wait they may be blocked on.
    ///
    /// The subprocess is not killed: the writer closes stdin so an encoder can
    /// finish its file, and the reader closes stdout so a decoder stops.
    pub fn stop(&mut self) {
        if !self.state.is_running() {
            return;
        }
        self.shared.ready.reset();
        self.shared.should_pause.store(true, Ordering::SeqCst);
        self.shared.should_exit.store(true, Ordering::SeqCst);
        wake_all(&self.shared);
        self.transition(PipeState::Stopping);
    }

    fn transition(&mut self, next: PipeState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal pipe transition {:?} -> {:?}",
            self.state,
            next
        );
        log::debug!("{}: {:?} -> {:?}", self.shared.label, self.state, next);
        self.state = next;
    }

    /// Wait for the subprocess to exit, killing it after `timeout`.
    ///
    /// Stops the pipe first if it is still running. Worker threads are joined
    /// either way, and the pipe ends up `Stopped`.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        self.stop();

        let outcome = match self.child.as_mut() {
            Some(child) => wait_with_timeout(child, timeout, &self.shared.label).map(|status| {
                self.exit_status = Some(status);
            }),
            None => Ok(()),
        };

        self.child = None;
        self.join_workers();
        if !matches!(self.state, PipeState::NotStarted) {
            self.transition(PipeState::Stopped);
        }
        outcome
    }

    fn join_workers(&mut self) {
        for handle in [self.writer.take(), self.reader.take(), self.log_drain.take()].into_iter().flatten() {
            if handle.join().is_err() {
                log::error!("encoder worker thread panicked");
            }
        }
    }

    /// Hand `frame` to the writer.
    ///
    /// In blocking mode this first waits (bounded) for the previous frame to be
    /// written. Otherwise a frame the writer has not picked up yet is displaced
    /// and returned so the caller can reuse it. A pipe that is not running
    /// returns `frame` itself.
    pub fn queue_frame(&self, frame: Frame) -> Option<Frame> {
        if !self.state.is_running() || self.shared.data_worker_done.load(Ordering::SeqCst) {
            return Some(frame);
        }
        if self.options.blocking && !self.shared.frame_written.wait_for(self.options.blocking_wait) {
            log::warn!("{}: timed out waiting for the previous frame to be written", self.shared.label);
        }

        self.shared.frame_written.reset();
        let displaced = self.shared.slot.lock().replace(frame);
        self.shared.frame_ready.set();

        if displaced.is_some() {
            self.shared.frames_overwritten.fetch_add(1, Ordering::Relaxed);
        }
        displaced
    }

    /// True when no frame is waiting for the writer.
    pub fn is_ready_for_input(&self) -> bool {
        self.shared.slot.lock().as_ref().map_or(true, Frame::is_empty)
    }

    /// Wait until the queued frame (if any) has been written.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_ready_for_input() && self.shared.frame_written.is_set() {
                return true;
            }
            if self.shared.data_worker_done.load(Ordering::SeqCst) {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.shared.frame_written.wait_for(remaining.min(Duration::from_millis(50)));
        }
    }

    /// Take the oldest decoded frame, if one is buffered.
    pub fn next_frame(&self) -> Option<Frame> {
        let frame = self.shared.decoded.lock().dequeue();
        self.shared.frame_ready.set();
        frame
    }

    /// Give a consumed decoded frame back to the reader for reuse.
    pub fn recycle(&self, frame: Frame) {
        let mut recycled = self.shared.recycled.lock();
        if recycled.len() < self.options.ring_capacity.max(1) * 2 {
            recycled.push(frame);
        }
    }

    pub fn decoded_len(&self) -> usize {
        self.shared.decoded.lock().len()
    }

    pub fn set_release_callback(&mut self, callback: ReleaseCallback) {
        *self.shared.release.lock() = Some(callback.clone());
        self.release = Some(callback);
    }

    /// True once the writer (or reader) thread has finished, or was never started.
    pub fn did_exit(&self) -> bool {
        let worker = self.writer.as_ref().or(self.reader.as_ref());
        match worker {
            Some(handle) => handle.is_finished() || self.shared.data_worker_done.load(Ordering::SeqCst),
            None => true,
        }
    }

    /// Whether the subprocess is still running.
    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    pub fn state(&self) -> PipeState {
        self.state
    }

    pub fn mode(&self) -> Option<StreamMode> {
        self.mode
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub fn frames_written(&self) -> u64 {
        self.shared.frames_written.load(Ordering::Relaxed)
    }

    pub fn frames_read(&self) -> u64 {
        self.shared.frames_read.load(Ordering::Relaxed)
    }

    pub fn frames_overwritten(&self) -> u64 {
        self.shared.frames_overwritten.load(Ordering::Relaxed)
    }

    /// Everything the subprocess wrote to stderr, available once it has exited.
    pub fn encoder_log(&self) -> String {
        self.shared.log.lock().clone()
    }

    /// Merge `audio` and `video` into `output` without re-encoding.
    ///
    /// The merge is killed if it runs longer than `timeout`.
    pub fn mux(
        program: &dyn EncoderProgram,
        audio: &Path,
        video: &Path,
        output: &Path,
        timeout: Duration,
    ) -> Result<(), CaptureError> {
        let executable = program.executable()?;
        let mut command = Command::new(&executable);
        command
            .args(program.mux_args(audio, video, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        program.configure(&mut command);

        log::info!("Opening encoder merge: {:?}", command);

        let mut child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => CaptureError::ExecutableNotFound(executable.clone()),
            _ => CaptureError::MuxFailed(format!("{}: {}", executable.display(), e)),
        })?;

        let label = output.to_string_lossy().into_owned();
        let shared = Arc::new(Shared::new(label.clone(), None, 1));
        let drain = match child.stderr.take() {
            Some(stderr) => {
                let shared = Arc::clone(&shared);
                spawn_named("encoder-mux-log", move || drain_log(&shared, stderr)).ok()
            }
            None => None,
        };

        let status = wait_with_timeout(&mut child, timeout, &label);
        if let Some(handle) = drain {
            let _ = handle.join();
        }

        match status? {
            status if status.success() => Ok(()),
            status => {
                let log = shared.log.lock().clone();
                let tail = log.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or_default();
                Err(CaptureError::MuxFailed(format!("merge exited with {}: {}", status, tail)))
            }
        }
    }
}

impl Default for EncoderProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        self.stop();
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                log::warn!("{}: encoder still running on drop; killing", self.shared.label);
                let _ = child.kill();
            }
            let _ = child.wait();
        }
        self.join_workers();
    }
}

fn wake_all(shared: &Shared) {
    shared.ready.set();
    shared.frame_ready.set();
    shared.frame_written.set();
}

fn spawn_named<F>(name: &str, f: F) -> Result<JoinHandle<()>, CaptureError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|e| CaptureError::io("failed to spawn worker thread", e))
}

/// Watch a new process for `grace`; returns its status if it exited in that time.
fn watch_startup(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() >= deadline => return None,
            Ok(None) => thread::sleep(EXIT_POLL.min(deadline.saturating_duration_since(Instant::now()))),
            Err(e) => {
                log::warn!("failed to poll new encoder: {}", e);
                return None;
            }
        }
    }
}

/// Poll `child` until it exits; kill it once `timeout` has passed.
///
/// `std::process::Child` has no timed wait, so this polls `try_wait`.
fn wait_with_timeout(child: &mut Child, timeout: Duration, label: &str) -> Result<ExitStatus, CaptureError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                log::warn!("{}: encoder did not exit within {:?}; killing", label, timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::Timeout);
            }
            Ok(None) => thread::sleep(EXIT_POLL),
            Err(e) => return Err(CaptureError::io("failed to wait for encoder", e)),
        }
    }
}

fn write_frames(shared: &Shared, mut stdin: ChildStdin) {
    let mut buf = Vec::new();

    while !shared.exiting() {
        if shared.paused() {
            shared.ready.wait();
            continue;
        }

        shared.frame_ready.wait();
        if shared.exiting() {
            break;
        }

        let taken = shared.slot.lock().take();
        let frame = match taken {
            Some(frame) if !frame.is_empty() => frame,
            Some(frame) => {
                log::warn!("{}: received an empty frame", shared.label);
                shared.release_frame(frame);
                shared.frame_written.set();
                continue;
            }
            None => {
                if shared.slot.lock().is_none() {
                    shared.frame_written.set();
                }
                continue;
            }
        };

        frame.write_bytes(&mut buf);
        let result = stdin.write_all(&buf);
        shared.release_frame(frame);

        if let Err(e) = result {
            log::warn!("{}: write to encoder failed: {}", shared.label, e);
            break;
        }

        shared.frames_written.fetch_add(1, Ordering::Relaxed);
        if shared.slot.lock().is_none() {
            shared.frame_written.set();
        }
    }

    if let Err(e) = stdin.flush() {
        log::debug!("{}: flush on close failed: {}", shared.label, e);
    }
    drop(stdin);

    if let Some(frame) = shared.slot.lock().take() {
        shared.release_frame(frame);
    }
    shared.data_worker_done.store(true, Ordering::SeqCst);
    shared.frame_written.set();
}

fn read_frames(shared: &Shared, mut stdout: ChildStdout, frame_bytes: usize, pixels: usize) {
    let mut buf = vec![0u8; frame_bytes];

    'frames: while !shared.exiting() {
        if shared.paused() {
            shared.ready.wait();
            continue;
        }

        if shared.decoded.lock().is_full() {
            shared.frame_ready.wait();
            continue;
        }

        let mut filled = 0;
        while filled < buf.len() {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => {
                    if filled > 0 {
                        log::warn!(
                            "{}: bad read: got {} bytes, expected {}",
                            shared.label,
                            filled,
                            buf.len()
                        );
                    }
                    break 'frames;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    log::warn!("{}: read from decoder failed: {}", shared.label, e);
                    break 'frames;
                }
            }
            if shared.exiting() {
                break 'frames;
            }
        }

        let mut frame = shared.recycled.lock().pop().unwrap_or_else(|| Frame::pixels(pixels));
        frame.read_bytes(&buf);
        if let Err(frame) = enqueue_decoded(shared, frame) {
            shared.recycled.lock().push(frame);
            continue;
        }
        shared.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    drop(stdout);
    shared.data_worker_done.store(true, Ordering::SeqCst);
}

fn enqueue_decoded(shared: &Shared, frame: Frame) -> Result<(), Frame> {
    let mut decoded = shared.decoded.lock();
    if decoded.is_full() {
        return Err(frame);
    }
    decoded.enqueue(frame, false);
    Ok(())
}

fn drain_log(shared: &Shared, mut stderr: ChildStderr) {
    let mut chunk = [0u8; LOG_CHUNK];
    let mut output = Vec::new();
    loop {
        match stderr.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => output.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                log::warn!("{}: reading encoder log failed: {}", shared.label, e);
                break;
            }
        }
    }
    let text = String::from_utf8_lossy(&output).into_owned();
    if !text.is_empty() {
        log::debug!("{} encoder output:\n{}", shared.label, text);
    }
    *shared.log.lock() = text;
}
