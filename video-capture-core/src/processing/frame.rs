use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::models::media::{FrameSize, Rgba};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Payload of a [`Frame`].
#[derive(Debug, PartialEq)]
pub enum FrameData {
    /// RGBA pixels, row-major.
    Pixels(Vec<Rgba>),
    /// Interleaved stereo samples `[L0, R0, L1, R1, ...]`.
    Samples(Vec<f32>),
}

/// A reusable media buffer.
///
/// The backing storage is only reallocated when the required length changes,
/// so a frame cycling through the pool keeps its allocation. Frames are not
/// `Clone`: each id has exactly one owner at a time.
#[derive(Debug, PartialEq)]
pub struct Frame {
    id: u64,
    data: FrameData,
}

impl Frame {
    pub fn pixels(count: usize) -> Self {
        Self::with_data(FrameData::Pixels(vec![Rgba::default(); count]))
    }

    pub fn samples(count: usize) -> Self {
        Self::with_data(FrameData::Samples(vec![0.0; count]))
    }

    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self::with_data(FrameData::Samples(samples))
    }

    fn with_data(data: FrameData) -> Self {
        Self {
            id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
            data,
        }
    }

    /// Identity of the backing storage, stable for the frame's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data(&self) -> &FrameData {
        &self.data
    }

    /// Number of elements (pixels or samples).
    pub fn len(&self) -> usize {
        match &self.data {
            FrameData::Pixels(p) => p.len(),
            FrameData::Samples(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialized size in bytes.
    pub fn byte_len(&self) -> usize {
        match &self.data {
            FrameData::Pixels(p) => p.len() * Rgba::BYTES,
            FrameData::Samples(s) => s.len() * std::mem::size_of::<f32>(),
        }
    }

    pub fn as_pixels(&self) -> Option<&[Rgba]> {
        match &self.data {
            FrameData::Pixels(p) => Some(p),
            FrameData::Samples(_) => None,
        }
    }

    pub fn as_pixels_mut(&mut self) -> Option<&mut [Rgba]> {
        match &mut self.data {
            FrameData::Pixels(p) => Some(p),
            FrameData::Samples(_) => None,
        }
    }

    pub fn as_samples(&self) -> Option<&[f32]> {
        match &self.data {
            FrameData::Samples(s) => Some(s),
            FrameData::Pixels(_) => None,
        }
    }

    /// Replace the sample payload, reusing the allocation when the length matches.
    pub fn set_samples(&mut self, samples: &[f32]) {
        match &mut self.data {
            FrameData::Samples(s) if s.len() == samples.len() => s.copy_from_slice(samples),
            data => *data = FrameData::Samples(samples.to_vec()),
        }
    }

    /// Serialize into `buf`. The buffer is resized only if its length differs.
    pub fn write_bytes(&self, buf: &mut Vec<u8>) {
        let len = self.byte_len();
        if buf.len() != len {
            buf.resize(len, 0);
        }
        match &self.data {
            FrameData::Pixels(pixels) => {
                for (chunk, px) in buf.chunks_exact_mut(Rgba::BYTES).zip(pixels) {
                    chunk.copy_from_slice(&px.to_bytes());
                }
            }
            FrameData::Samples(samples) => {
                for (chunk, s) in buf.chunks_exact_mut(4).zip(samples) {
                    chunk.copy_from_slice(&s.to_le_bytes());
                }
            }
        }
    }

    /// Deserialize from `bytes`, keeping the current payload kind.
    ///
    /// Trailing bytes that do not fill a whole element are ignored.
    pub fn read_bytes(&mut self, bytes: &[u8]) {
        match &mut self.data {
            FrameData::Pixels(pixels) => {
                let count = bytes.len() / Rgba::BYTES;
                if pixels.len() != count {
                    pixels.resize(count, Rgba::default());
                }
                for (px, chunk) in pixels.iter_mut().zip(bytes.chunks_exact(Rgba::BYTES)) {
                    *px = Rgba::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
            FrameData::Samples(samples) => {
                let count = bytes.len() / 4;
                if samples.len() != count {
                    samples.resize(count, 0.0);
                }
                for (s, chunk) in samples.iter_mut().zip(bytes.chunks_exact(4)) {
                    *s = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
        }
    }
}

/// Thread-safe stash of retired frames.
///
/// Shared between the capture thread (checkout) and encoder writer threads
/// (release). The lock is held only for the push or pop itself.
#[derive(Debug, Default)]
pub struct FramePool {
    idle: Mutex<Vec<Frame>>,
}

impl FramePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an idle pixel frame of `size`, or allocate one.
    pub fn checkout_pixels(&self, size: FrameSize) -> Frame {
        let count = size.pixel_count();
        self.take_idle(|f| matches!(f.data, FrameData::Pixels(_)) && f.len() == count)
            .unwrap_or_else(|| Frame::pixels(count))
    }

    /// Take an idle sample frame holding `count` samples, or allocate one.
    pub fn checkout_samples(&self, count: usize) -> Frame {
        self.take_idle(|f| matches!(f.data, FrameData::Samples(_)) && f.len() == count)
            .unwrap_or_else(|| Frame::samples(count))
    }

    fn take_idle(&self, matches: impl Fn(&Frame) -> bool) -> Option<Frame> {
        let mut idle = self.idle.lock();
        let index = idle.iter().position(matches)?;
        Some(idle.swap_remove(index))
    }

    /// Return a frame for reuse.
    ///
    /// Returns `false` and keeps the pool unchanged if a frame with the same id
    /// is already idle.
    pub fn release(&self, frame: Frame) -> bool {
        let mut idle = self.idle.lock();
        if idle.iter().any(|f| f.id == frame.id) {
            log::warn!("frame {} released twice; ignoring", frame.id);
            return false;
        }
        idle.push(frame);
        true
    }

    /// Drop idle pixel frames whose size no longer matches `size`.
    pub fn retain_size(&self, size: FrameSize) {
        let count = size.pixel_count();
        self.idle.lock().retain(|f| match f.data {
            FrameData::Pixels(_) => f.len() == count,
            FrameData::Samples(_) => true,
        });
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn clear(&self) {
        self.idle.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn pixel_bytes_are_rgba_order() {
        let mut frame = Frame::pixels(2);
        frame.as_pixels_mut().unwrap()[0] = Rgba::new(1, 2, 3, 4);
        frame.as_pixels_mut().unwrap()[1] = Rgba::new(5, 6, 7, 8);

        let mut buf = Vec::new();
        frame.write_bytes(&mut buf);
        assert_eq!(buf, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn samples_are_little_endian() {
        let frame = Frame::from_samples(vec![1.0, -0.5]);
        let mut buf = Vec::new();
        frame.write_bytes(&mut buf);
        assert_eq!(&buf[..4], &1.0f32.to_le_bytes());
        assert_eq!(&buf[4..], &(-0.5f32).to_le_bytes());

        let mut back = Frame::samples(0);
        back.read_bytes(&buf);
        assert_eq!(back.as_samples().unwrap(), &[1.0, -0.5]);
    }

    #[test]
    fn write_reuses_buffer_allocation() {
        let frame = Frame::pixels(16);
        let mut buf = Vec::with_capacity(64);
        frame.write_bytes(&mut buf);
        let ptr = buf.as_ptr();
        frame.write_bytes(&mut buf);
        assert_eq!(buf.as_ptr(), ptr);
        assert_eq!(buf.len(), 64);
    }

    #[test]
    fn read_keeps_storage_when_size_matches() {
        let mut frame = Frame::pixels(2);
        let ptr = frame.as_pixels().unwrap().as_ptr();
        frame.read_bytes(&[9, 9, 9, 9, 1, 1, 1, 1]);
        assert_eq!(frame.as_pixels().unwrap().as_ptr(), ptr);
        assert_eq!(frame.as_pixels().unwrap()[0], Rgba::new(9, 9, 9, 9));

        frame.read_bytes(&[0; 12]);
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn ids_are_unique() {
        let a = Frame::pixels(1);
        let b = Frame::pixels(1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn pool_reuses_matching_frames() {
        let pool = FramePool::new();
        let size = FrameSize::new(4, 2);
        let frame = pool.checkout_pixels(size);
        let id = frame.id();
        assert!(pool.release(frame));

        assert_eq!(pool.checkout_pixels(size).id(), id);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn pool_rejects_double_release() {
        let pool = FramePool::new();
        let frame = Frame::pixels(4);
        let forged = Frame {
            id: frame.id(),
            data: FrameData::Pixels(vec![Rgba::default(); 4]),
        };
        assert!(pool.release(frame));
        assert!(!pool.release(forged));
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn pool_drops_stale_sizes() {
        let pool = FramePool::new();
        pool.release(Frame::pixels(8));
        pool.release(Frame::pixels(4));
        pool.release(Frame::samples(10));
        pool.retain_size(FrameSize::new(2, 2));
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.checkout_samples(10).len(), 10);
    }

    /// Ids currently held outside the pool. A second checkout of a held id fails the insert.
    #[derive(Default)]
    struct Holders {
        held: Mutex<HashSet<u64>>,
        violations: AtomicUsize,
    }

    impl Holders {
        fn checkout(&self, frame: &Frame) {
            if !self.held.lock().insert(frame.id()) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn release(&self, pool: &FramePool, frame: Frame) {
            if !self.held.lock().remove(&frame.id()) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            if !pool.release(frame) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn pool_is_shared_across_threads() {
        let pool = Arc::new(FramePool::new());
        let holders = Arc::new(Holders::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                let holders = holders.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let a = pool.checkout_pixels(FrameSize::new(2, 2));
                        holders.checkout(&a);
                        let b = pool.checkout_pixels(FrameSize::new(2, 2));
                        holders.checkout(&b);
                        if i % 2 == 0 {
                            std::thread::yield_now();
                        }
                        holders.release(&pool, b);
                        holders.release(&pool, a);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(holders.violations.load(Ordering::SeqCst), 0);
        assert!(holders.held.lock().is_empty());
        assert!(pool.idle_count() <= 8);
    }

    #[cfg(unix)]
    #[test]
    fn checkout_stays_exclusive_while_writer_releases() {
        use crate::process::encoder_process::{EncoderProcess, PipeOptions};
        use crate::testing::{temp_path, ShellProgram};
        use crate::traits::encoder_program::EncodeJob;
        use std::time::Duration;

        let size = FrameSize::new(2, 2);
        let pool = Arc::new(FramePool::new());
        let holders = Arc::new(Holders::default());
        let output = temp_path("exclusive.raw");

        let mut pipe = EncoderProcess::new();
        {
            let pool = pool.clone();
            let holders = holders.clone();
            pipe.set_release_callback(Arc::new(move |frame: Frame| holders.release(&pool, frame)));
        }
        pipe.start(&ShellProgram::new(), &EncodeJob::encode_video(&output, size, 30.0), PipeOptions::default())
            .unwrap();

        let stress: Vec<_> = (0..3)
            .map(|_| {
                let pool = pool.clone();
                let holders = holders.clone();
                std::thread::spawn(move || {
                    for _ in 0..300 {
                        let frame = pool.checkout_pixels(size);
                        holders.checkout(&frame);
                        holders.release(&pool, frame);
                    }
                })
            })
            .collect();

        // Capture side: frames the writer has not taken come back displaced,
        // like an overflowing submission.
        for _ in 0..300 {
            let frame = pool.checkout_pixels(size);
            holders.checkout(&frame);
            if let Some(displaced) = pipe.queue_frame(frame) {
                holders.release(&pool, displaced);
            }
        }
        for h in stress {
            h.join().unwrap();
        }
        assert!(pipe.wait_until_idle(Duration::from_secs(5)));
        pipe.wait_for_exit(Duration::from_secs(5)).unwrap();

        assert_eq!(holders.violations.load(Ordering::SeqCst), 0);
        assert!(holders.held.lock().is_empty());
        let _ = std::fs::remove_file(&output);
    }
}
