//! Decoded frames and the latest-frame slot between a decode thread and the
//! render thread.
//!
//! A frame source owns the [`FramePublisher`] and pushes whole frames from
//! whatever thread decodes them. The render thread polls the matching
//! [`FrameReader`] once per tick. Only the most recent frame is kept: a
//! preview has no use for frames it was too slow to show.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Layout of [`Frame::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8,
    Rgb8,
    /// Raw single-channel sensor mosaic, demosaiced in the fragment shader.
    Bayer8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Bayer8 => 1,
        }
    }

    pub fn is_bayer(self) -> bool {
        matches!(self, PixelFormat::Bayer8)
    }
}

/// One decoded image, rows top to bottom, tightly packed.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Frame {
    /// Wrap pixel data, checking that its length matches the dimensions.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        (data.len() == expected).then_some(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Default)]
struct Shared {
    latest: Mutex<Option<Frame>>,
    /// Width in the high half, height in the low half. Zero until the first
    /// frame is published.
    size: AtomicU64,
    bayer: AtomicBool,
    closed: AtomicBool,
}

/// Create a connected publisher / reader pair.
pub fn frame_slot() -> (FramePublisher, FrameReader) {
    let shared = Arc::new(Shared::default());
    (
        FramePublisher {
            shared: shared.clone(),
        },
        FrameReader { shared },
    )
}

/// Producer half, owned by the decode side.
pub struct FramePublisher {
    shared: Arc<Shared>,
}

impl FramePublisher {
    /// Publish `frame`, replacing any frame the reader has not taken yet.
    pub fn publish(&self, frame: Frame) {
        let (w, h) = frame.dimensions();
        let bayer = frame.format.is_bayer();
        match self.shared.latest.lock() {
            Ok(mut slot) => *slot = Some(frame),
            Err(poisoned) => *poisoned.into_inner() = Some(frame),
        }
        // Format before size: a reader that sees the size must see the format.
        self.shared.bayer.store(bayer, Ordering::Release);
        self.shared
            .size
            .store(((w as u64) << 32) | h as u64, Ordering::Release);
    }

    /// True once the reader side has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Consumer half, polled from the render thread.
pub struct FrameReader {
    shared: Arc<Shared>,
}

impl FrameReader {
    /// Dimensions of the last published frame, if any has been published.
    pub fn size(&self) -> Option<(u32, u32)> {
        let packed = self.shared.size.load(Ordering::Acquire);
        let (w, h) = ((packed >> 32) as u32, packed as u32);
        (w > 0 && h > 0).then_some((w, h))
    }

    pub fn is_bayer(&self) -> bool {
        self.shared.bayer.load(Ordering::Acquire)
    }

    /// Take the newest unconsumed frame.
    pub fn take_latest(&self) -> Option<Frame> {
        match self.shared.latest.try_lock() {
            Ok(mut slot) => slot.take(),
            // Producer is mid-publish; pick it up next tick.
            Err(std::sync::TryLockError::WouldBlock) => None,
            Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
        }
    }

    /// Tell the producer to stop. Idempotent.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(w: u32, h: u32) -> Frame {
        Frame::new(w, h, PixelFormat::Bayer8, vec![128; (w * h) as usize]).unwrap()
    }

    #[test]
    fn size_unknown_until_published() {
        let (publisher, reader) = frame_slot();
        assert_eq!(reader.size(), None);
        assert!(reader.take_latest().is_none());

        publisher.publish(gray(4, 2));
        assert_eq!(reader.size(), Some((4, 2)));
        assert!(reader.is_bayer());
    }

    #[test]
    fn only_latest_frame_is_kept() {
        let (publisher, reader) = frame_slot();
        publisher.publish(gray(2, 2));
        publisher.publish(gray(8, 6));

        let frame = reader.take_latest().unwrap();
        assert_eq!(frame.dimensions(), (8, 6));
        assert!(reader.take_latest().is_none());
        // Size stays published after the frame is consumed.
        assert_eq!(reader.size(), Some((8, 6)));
    }

    #[test]
    fn frame_rejects_mismatched_data() {
        assert!(Frame::new(2, 2, PixelFormat::Rgba8, vec![0; 15]).is_none());
        assert!(Frame::new(2, 2, PixelFormat::Rgb8, vec![0; 12]).is_some());
    }

    #[test]
    fn dropping_reader_closes_publisher() {
        let (publisher, reader) = frame_slot();
        assert!(!publisher.is_closed());
        drop(reader);
        assert!(publisher.is_closed());
    }

    #[test]
    fn publishes_across_threads() {
        let (publisher, reader) = frame_slot();
        let handle = std::thread::spawn(move || publisher.publish(gray(16, 9)));
        handle.join().unwrap();
        assert_eq!(reader.size(), Some((16, 9)));
        assert_eq!(reader.take_latest().map(|f| f.dimensions()), Some((16, 9)));
    }
}
