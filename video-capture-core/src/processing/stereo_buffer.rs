use crate::models::media::FrameRate;

use super::ring_buffer::RingBuffer;

/// Seconds of audio held per channel.
pub const DEFAULT_BUFFER_SECS: u32 = 4;

/// Per-channel sample buffers aligned to video frame cadence.
///
/// Audio arrives at `hz` samples per second while video advances in whole
/// frames. Each video frame owns one window of `hz / fps` samples. The buffer
/// tracks how many samples have been consumed so it can tell which video frame
/// the head of the buffer belongs to, and it skips ahead (smoothing the first
/// skipped boundary) when video frames were dropped.
#[derive(Debug)]
pub struct StereoBuffer {
    rate: FrameRate,
    sample_rate: u32,
    buffer_secs: u32,
    window: usize,
    stereo: Vec<f32>,
    consumed: u64,
    left: RingBuffer<f32>,
    right: RingBuffer<f32>,
}

impl StereoBuffer {
    pub fn new() -> Self {
        Self::with_capacity_secs(DEFAULT_BUFFER_SECS)
    }

    pub fn with_capacity_secs(buffer_secs: u32) -> Self {
        let mut buffer = Self {
            rate: FrameRate::default(),
            sample_rate: 0,
            buffer_secs: buffer_secs.max(1),
            window: 0,
            stereo: Vec::new(),
            consumed: 0,
            left: RingBuffer::new(0),
            right: RingBuffer::new(0),
        };
        buffer.set_sample_rates(FrameRate::new(30, 1), 44_100);
        buffer
    }

    /// Set the video rate and audio sample rate.
    ///
    /// Scratch space is reallocated only when either rate changes; the channel
    /// buffers only when `hz` changes.
    pub fn set_sample_rates(&mut self, rate: FrameRate, hz: u32) {
        if self.rate == rate && self.sample_rate == hz && self.window > 0 {
            return;
        }

        self.window = rate.samples_per_frame(hz).max(1);
        self.stereo = vec![0.0; self.window * 2];

        if hz != self.sample_rate {
            let capacity = hz as usize * self.buffer_secs as usize;
            self.left = RingBuffer::new(capacity);
            self.right = RingBuffer::new(capacity);
            self.consumed = 0;
        }

        self.rate = rate;
        self.sample_rate = hz;
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.rate
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Sample pairs per video frame.
    pub fn window_len(&self) -> usize {
        self.window
    }

    /// Buffered sample pairs.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn consumed_samples(&self) -> u64 {
        self.consumed
    }

    /// The video frame the head of the buffer belongs to.
    pub fn current_frame(&self) -> i64 {
        self.rate.frames_for_samples(self.consumed, self.sample_rate) as i64
    }

    pub fn clear(&mut self) {
        self.consumed = 0;
        self.left.clear();
        self.right.clear();
    }

    /// Append one sample pair, evicting the oldest window when full.
    pub fn add(&mut self, left: f32, right: f32) {
        if self.left.is_full() {
            self.left.discard(self.window);
            self.right.discard(self.window);
            self.consumed += self.window as u64;
        }
        self.left.enqueue(left, true);
        self.right.enqueue(right, true);
    }

    /// Whether enough samples are buffered to pop `frame`.
    ///
    /// A frame behind the head is never ready. A frame ahead of it needs one
    /// window per frame of distance.
    pub fn is_frame_ready(&self, frame: i64) -> bool {
        let distance = frame - self.current_frame();
        if distance < 0 {
            return false;
        }
        let windows = distance.max(1) as usize;
        self.left.len() >= self.window * windows
    }

    /// Pop the window for `frame`, interleaved as `[L0, R0, L1, R1, ...]`.
    ///
    /// If the head is behind `frame - 1`, the window at the head is blended into
    /// the window starting at `frame - 1` and whole windows are skipped until
    /// the head reaches `frame - 1`. Only that first boundary is smoothed.
    ///
    /// Always returns exactly `window_len() * 2` values; missing samples are zero.
    pub fn pop_frame(&mut self, frame: i64) -> &[f32] {
        let target = frame - 1;
        if self.current_frame() < target {
            self.blend_into(target);
            while self.current_frame() < target {
                self.left.discard(self.window);
                self.right.discard(self.window);
                self.consumed += self.window as u64;
            }
        }

        let available = self.left.len().min(self.right.len());
        for i in 0..self.window {
            let (l, r) = if i < available {
                (self.left[i], self.right[i])
            } else {
                (0.0, 0.0)
            };
            self.stereo[i * 2] = l;
            self.stereo[i * 2 + 1] = r;
        }

        self.left.discard(self.window);
        self.right.discard(self.window);
        self.consumed += self.window as u64;

        &self.stereo
    }

    fn blend_into(&mut self, target: i64) {
        let boundary = self.rate.samples_for_frames(target.max(0) as u64, self.sample_rate);
        let start = boundary.saturating_sub(self.consumed) as usize;
        let len = self.left.len().min(self.right.len());
        for i in 0..self.window {
            let cur = start + i;
            if cur >= len {
                break;
            }
            let t = i as f32 / self.window as f32;
            self.left[cur] = lerp(self.left[i], self.left[cur], t);
            self.right[cur] = lerp(self.right[i], self.right[cur], t);
        }
    }
}

impl Default for StereoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}
