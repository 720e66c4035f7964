use std::time::Duration;

/// One RGBA pixel as delivered by the renderer.
///
/// Serialized as four bytes in `R, G, B, A` order (ffmpeg `rgba`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BYTES: usize = 4;

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

/// Pixel dimensions of a captured or decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size in bytes of one raw RGBA frame.
    pub fn byte_len(&self) -> usize {
        self.pixel_count() * Rgba::BYTES
    }

    /// Scale both dimensions, rounding down to even values (yuv420p needs even sizes).
    ///
    /// Never returns a dimension smaller than 2.
    pub fn scaled(&self, scale: f32) -> Self {
        let even = |v: u32| -> u32 {
            let scaled = (v as f32 * scale).floor().max(2.0) as u32;
            scaled & !1
        };
        Self::new(even(self.width), even(self.height))
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Exact rational frame rate (`num / den` frames per second).
///
/// All frame/sample conversions multiply before dividing in integer
/// arithmetic, so repeated conversions never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    /// Creates a rate of `num / den` fps. A zero denominator is treated as 1.
    pub fn new(num: u32, den: u32) -> Self {
        let den = den.max(1);
        let divisor = gcd(num, den).max(1);
        Self {
            num: num / divisor,
            den: den / divisor,
        }
    }

    /// Converts a decimal fps value, keeping three decimal places (29.97 → 2997/100).
    pub fn from_fps(fps: f64) -> Self {
        let num = (fps.max(0.0) * 1000.0).round() as u32;
        Self::new(num, 1000)
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn is_positive(&self) -> bool {
        self.num > 0
    }

    /// Whole frames spanned by `samples` at `hz`: `floor(samples * fps / hz)`.
    pub fn frames_for_samples(&self, samples: u64, hz: u32) -> u64 {
        if hz == 0 {
            return 0;
        }
        ((samples as u128 * self.num as u128) / (hz as u128 * self.den as u128)) as u64
    }

    /// First sample of `frame` at `hz`: `floor(frame * hz / fps)`.
    pub fn samples_for_frames(&self, frames: u64, hz: u32) -> u64 {
        if self.num == 0 {
            return 0;
        }
        ((frames as u128 * hz as u128 * self.den as u128) / self.num as u128) as u64
    }

    /// Samples in one video frame at `hz`, rounded down.
    pub fn samples_per_frame(&self, hz: u32) -> usize {
        self.samples_for_frames(1, hz) as usize
    }

    /// Real-time frame index for an elapsed wall-clock duration.
    pub fn frames_in(&self, elapsed: Duration) -> u64 {
        ((elapsed.as_millis() * self.num as u128) / (1000 * self.den as u128)) as u64
    }

    /// Wall-clock duration of `frames` frames.
    pub fn duration_of(&self, frames: u64) -> Duration {
        if self.num == 0 {
            return Duration::ZERO;
        }
        let nanos = frames as u128 * self.den as u128 * 1_000_000_000 / self.num as u128;
        Duration::from_nanos(nanos as u64)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(30, 1)
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Direction and payload of an encoder subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Raw RGBA frames are written to the encoder's stdin.
    VideoEncode,
    /// Interleaved stereo `f32le` samples are written to the encoder's stdin.
    AudioEncode,
    /// Raw RGBA frames are read back from the decoder's stdout.
    VideoDecode,
}

impl StreamMode {
    pub fn is_reading(&self) -> bool {
        matches!(self, Self::VideoDecode)
    }

    /// The ffmpeg-style pipe endpoint used on our side of the process.
    pub fn pipe_endpoint(&self) -> &'static str {
        if self.is_reading() {
            "pipe:1"
        } else {
            "pipe:0"
        }
    }
}

/// Counters describing a capture session, for debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureDiagnostics {
    pub frames_captured: u64,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub frames_overwritten: u64,
    pub audio_frames_written: u64,
    pub pending_frames: usize,
    pub pending_bytes: u64,
}
