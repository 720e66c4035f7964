use crate::models::media::{FrameSize, Rgba};

/// Something that can hand over one rendered image per tick.
pub trait FrameSource {
    /// Size of the image the source renders.
    fn size(&self) -> FrameSize;

    /// Copy the current image into `dest`, scaling to `dest_size` if needed.
    ///
    /// `dest` holds exactly `dest_size.pixel_count()` pixels.
    fn copy_pixels(&self, dest: &mut [Rgba], dest_size: FrameSize);
}

/// A source backed by an in-memory pixel buffer.
///
/// Scales with nearest-neighbour sampling when the destination size differs.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub size: FrameSize,
    pub pixels: Vec<Rgba>,
}

impl PixelBuffer {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            pixels: vec![Rgba::default(); size.pixel_count()],
        }
    }

    pub fn filled(size: FrameSize, color: Rgba) -> Self {
        Self {
            size,
            pixels: vec![color; size.pixel_count()],
        }
    }
}

impl FrameSource for PixelBuffer {
    fn size(&self) -> FrameSize {
        self.size
    }

    fn copy_pixels(&self, dest: &mut [Rgba], dest_size: FrameSize) {
        if dest_size == self.size && dest.len() == self.pixels.len() {
            dest.copy_from_slice(&self.pixels);
            return;
        }
        let (sw, sh) = (self.size.width.max(1) as usize, self.size.height.max(1) as usize);
        let (dw, dh) = (dest_size.width.max(1) as usize, dest_size.height.max(1) as usize);
        for (i, px) in dest.iter_mut().enumerate() {
            let (x, y) = (i % dw, i / dw);
            let src = (y * sh / dh) * sw + (x * sw / dw);
            *px = self.pixels.get(src).copied().unwrap_or_default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_same_size() {
        let mut source = PixelBuffer::new(FrameSize::new(2, 1));
        source.pixels[1] = Rgba::new(9, 8, 7, 6);
        let mut dest = vec![Rgba::default(); 2];
        source.copy_pixels(&mut dest, FrameSize::new(2, 1));
        assert_eq!(dest[1], Rgba::new(9, 8, 7, 6));
    }

    #[test]
    fn downscales_nearest() {
        let mut source = PixelBuffer::new(FrameSize::new(4, 4));
        for (i, px) in source.pixels.iter_mut().enumerate() {
            px.r = i as u8;
        }
        let mut dest = vec![Rgba::default(); 4];
        source.copy_pixels(&mut dest, FrameSize::new(2, 2));
        let reds: Vec<u8> = dest.iter().map(|p| p.r).collect();
        assert_eq!(reds, vec![0, 2, 8, 10]);
    }
}
