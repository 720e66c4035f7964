use std::f32::consts::TAU;

use video_capture_core::{FrameSize, FrameSource, Rgba};

/// Scrolling colour gradient, one step per rendered frame.
pub struct Gradient {
    size: FrameSize,
    step: u32,
}

impl Gradient {
    pub fn new(size: FrameSize) -> Self {
        Self { size, step: 0 }
    }

    pub fn advance(&mut self) {
        self.step = self.step.wrapping_add(1);
    }
}

impl FrameSource for Gradient {
    fn size(&self) -> FrameSize {
        self.size
    }

    fn copy_pixels(&self, dest: &mut [Rgba], dest_size: FrameSize) {
        let width = dest_size.width.max(1);
        let height = dest_size.height.max(1);
        for (i, px) in dest.iter_mut().enumerate() {
            let x = i as u32 % width;
            let y = i as u32 / width;
            *px = Rgba::new(
                (x.wrapping_add(self.step) % width * 255 / width) as u8,
                (y * 255 / height) as u8,
                (self.step % 256) as u8,
                255,
            );
        }
    }
}

/// Stereo sine tone; the right channel runs a fifth above the left.
pub struct Tone {
    sample_rate: u32,
    frequency: f32,
    sample: u64,
}

impl Tone {
    pub fn new(sample_rate: u32, frequency: f32) -> Self {
        Self {
            sample_rate,
            frequency,
            sample: 0,
        }
    }

    /// Samples due after `elapsed_secs` that have not been produced yet.
    pub fn pending(&self, elapsed_secs: f64) -> u64 {
        let due = (elapsed_secs * self.sample_rate as f64) as u64;
        due.saturating_sub(self.sample)
    }

    pub fn next_pair(&mut self) -> (f32, f32) {
        let t = self.sample as f32 / self.sample_rate as f32;
        self.sample += 1;
        let left = (TAU * self.frequency * t).sin() * 0.25;
        let right = (TAU * self.frequency * 1.5 * t).sin() * 0.25;
        (left, right)
    }
}
