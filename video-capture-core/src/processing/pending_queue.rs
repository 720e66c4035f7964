use std::collections::VecDeque;

use super::frame::Frame;

/// FIFO of captured frames waiting for the encoder, capped by total bytes.
///
/// Owned by the capture loop, so it is not synchronized. When accepting a
/// frame would exceed the budget, the new frame is refused and handed back;
/// frames already queued are kept and drain in order.
#[derive(Debug)]
pub struct PendingFrameQueue {
    frames: VecDeque<Frame>,
    bytes: u64,
    budget: u64,
    dropped: u64,
}

impl PendingFrameQueue {
    pub fn new(budget: u64) -> Self {
        Self {
            frames: VecDeque::new(),
            bytes: 0,
            budget,
            dropped: 0,
        }
    }

    /// Queue `frame`, or return it if the byte budget does not allow it.
    pub fn push(&mut self, frame: Frame) -> Result<(), Frame> {
        let size = frame.byte_len() as u64;
        if self.bytes + size > self.budget {
            self.dropped += 1;
            return Err(frame);
        }
        self.bytes += size;
        self.frames.push_back(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        let frame = self.frames.pop_front()?;
        self.bytes -= frame.byte_len() as u64;
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bytes currently queued.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Frames refused since the queue was created or last reset.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Take every queued frame, oldest first, leaving the queue empty.
    pub fn take_all(&mut self) -> VecDeque<Frame> {
        self.bytes = 0;
        std::mem::take(&mut self.frames)
    }

    /// Empty the queue and reset the drop counter, adopting a new budget.
    pub fn reset(&mut self, budget: u64) -> VecDeque<Frame> {
        self.budget = budget;
        self.dropped = 0;
        self.take_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_budget_drops_newest_and_keeps_order() {
        // Each 2-pixel frame is 8 bytes; the budget fits three.
        let mut queue = PendingFrameQueue::new(24);
        let frames: Vec<Frame> = (0..5).map(|_| Frame::pixels(2)).collect();
        let ids: Vec<u64> = frames.iter().map(Frame::id).collect();

        let mut refused = Vec::new();
        for frame in frames {
            if let Err(frame) = queue.push(frame) {
                refused.push(frame.id());
            }
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.bytes(), 24);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(refused, &ids[3..]);

        let drained: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|f| f.id()).collect();
        assert_eq!(drained, &ids[..3]);
        assert_eq!(queue.bytes(), 0);
    }

    #[test]
    fn space_frees_as_frames_drain() {
        let mut queue = PendingFrameQueue::new(8);
        assert!(queue.push(Frame::pixels(2)).is_ok());
        assert!(queue.push(Frame::pixels(2)).is_err());
        queue.pop();
        assert!(queue.push(Frame::pixels(2)).is_ok());
    }

    #[test]
    fn reset_clears_counters() {
        let mut queue = PendingFrameQueue::new(4);
        let _ = queue.push(Frame::pixels(2));
        assert_eq!(queue.dropped(), 1);

        let leftovers = queue.reset(64);
        assert!(leftovers.is_empty());
        assert_eq!(queue.dropped(), 0);
        assert_eq!(queue.budget(), 64);
    }
}
