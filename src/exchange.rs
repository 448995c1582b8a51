//! Buffers shared between the render context and the tick context.
//!
//! Every buffer has its own lock and is only ever copied in or out while
//! the lock is held. The tick side never waits on the input lock.

use crate::frame::{BgraFrame, Mask};
use parking_lot::{Mutex, MutexGuard};

/// Result of a non-blocking read of the input frame.
#[derive(Debug)]
pub enum InputSnapshot {
    Frame(BgraFrame),
    /// Nothing has been published yet.
    Empty,
    /// The render context holds the lock.
    Contended,
}

#[derive(Debug, Default)]
pub struct FrameExchange {
    input: Mutex<Option<BgraFrame>>,
    output_mask: Mutex<Option<Mask>>,
    output_bgra: Mutex<Option<BgraFrame>>,
}

impl FrameExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render side: replace the latest input frame.
    pub fn publish_input(&self, frame: BgraFrame) {
        *self.input.lock() = Some(frame);
    }

    /// Hold the input lock, as a writer would while copying a frame in.
    pub fn lock_input(&self) -> MutexGuard<'_, Option<BgraFrame>> {
        self.input.lock()
    }

    /// Tick side: copy the input frame out without waiting.
    pub fn try_snapshot_input(&self) -> InputSnapshot {
        let Some(guard) = self.input.try_lock() else {
            return InputSnapshot::Contended;
        };
        match guard.as_ref() {
            Some(frame) => InputSnapshot::Frame(frame.clone()),
            None => InputSnapshot::Empty,
        }
    }

    pub fn publish_mask(&self, mask: Mask) {
        *self.output_mask.lock() = Some(mask);
    }

    pub fn mask_snapshot(&self) -> Option<Mask> {
        self.output_mask.lock().clone()
    }

    pub fn mask_dimensions(&self) -> Option<(u32, u32)> {
        self.output_mask.lock().as_ref().map(|m| m.dimensions())
    }

    /// Tick side: publish an output frame unless the render side is reading
    /// it. Returns whether the frame was stored.
    pub fn try_publish_bgra(&self, frame: BgraFrame) -> bool {
        match self.output_bgra.try_lock() {
            Some(mut slot) => {
                *slot = Some(frame);
                true
            }
            None => false,
        }
    }

    /// Hold the output frame lock, as the render side does while reading.
    pub fn lock_output_bgra(&self) -> MutexGuard<'_, Option<BgraFrame>> {
        self.output_bgra.lock()
    }

    pub fn bgra_snapshot(&self) -> Option<BgraFrame> {
        self.output_bgra.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn snapshot_reports_empty_then_frame() {
        let exchange = FrameExchange::new();
        assert!(matches!(exchange.try_snapshot_input(), InputSnapshot::Empty));

        exchange.publish_input(BgraFrame::filled(2, 2, [1, 2, 3, 4]));
        match exchange.try_snapshot_input() {
            InputSnapshot::Frame(frame) => assert_eq!(frame.pixel(1, 1), [1, 2, 3, 4]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn held_input_lock_is_contention() {
        let exchange = FrameExchange::new();
        exchange.publish_input(BgraFrame::filled(2, 2, [0; 4]));
        let guard = exchange.lock_input();
        assert!(matches!(exchange.try_snapshot_input(), InputSnapshot::Contended));
        drop(guard);
        assert!(matches!(exchange.try_snapshot_input(), InputSnapshot::Frame(_)));
    }

    #[test]
    fn output_buffers_are_independent() {
        let exchange = FrameExchange::new();
        exchange.publish_mask(Mask::from_pixel(2, 1, Luma([7])));
        let _input = exchange.lock_input();
        assert_eq!(exchange.mask_snapshot().unwrap().get_pixel(1, 0)[0], 7);
        assert!(exchange.try_publish_bgra(BgraFrame::filled(1, 1, [9; 4])));
        assert_eq!(exchange.bgra_snapshot().unwrap().pixel(0, 0), [9; 4]);

        let reading = exchange.lock_output_bgra();
        assert!(!exchange.try_publish_bgra(BgraFrame::filled(1, 1, [1; 4])));
        drop(reading);
        assert_eq!(exchange.bgra_snapshot().unwrap().pixel(0, 0), [9; 4]);
    }
}
