//! Canvas storage shared by the protocol engine and the display.
//!
//! Provides:
//! - `Pixel`: a single RGBA value
//! - `Size`: canvas dimensions and the coordinate range check
//! - `Frame`: a fixed-size, row-major 2D pixel buffer
//! - `PresentedFrame`: the last completed frame, published as an immutable
//!   snapshot so readers never observe a frame that is still being written

use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// A single RGBA pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    /// Opaque black, the color of a blank canvas
    pub const BLACK: Pixel = Pixel::rgb(0, 0, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, u8::MAX)
    }

    /// Fully opaque gray with all color channels set to `value`
    pub const fn gray(value: u8) -> Self {
        Self::rgb(value, value, value)
    }
}

impl Default for Pixel {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Canvas dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Check if a coordinate lies inside the canvas
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.index(x, y).is_some()
    }

    /// Row-major offset of a coordinate, `None` when out of range
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let x = u32::try_from(x).ok()?;
        let y = u32::try_from(y).ok()?;
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Fixed-size 2D pixel buffer.
///
/// Width and height never change after construction. Coordinates outside
/// the buffer are ignored by `set` and yield `None` from `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    size: Size,
    pixels: Vec<Pixel>,
}

impl Frame {
    /// Create a blank frame.
    pub fn new(width: u32, height: u32) -> Self {
        let size = Size::new(width, height);
        Self {
            size,
            pixels: vec![Pixel::BLACK; size.area()],
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Pixel> {
        self.size.index(x, y).map(|i| self.pixels[i])
    }

    /// Write a pixel. Returns `false` if the coordinate is out of range.
    pub fn set(&mut self, x: i32, y: i32, pixel: Pixel) -> bool {
        match self.size.index(x, y) {
            Some(i) => {
                self.pixels[i] = pixel;
                true
            }
            None => false,
        }
    }

    pub fn fill(&mut self, pixel: Pixel) {
        self.pixels.fill(pixel);
    }

    /// Overwrite this frame with the contents of `other`.
    ///
    /// Both frames must have the same dimensions; the canvas size is fixed
    /// for the process lifetime so this only happens between frames of the
    /// same canvas.
    pub fn copy_from(&mut self, other: &Frame) {
        debug_assert_eq!(self.size, other.size);
        self.pixels.copy_from_slice(&other.pixels);
    }

    /// Row-major pixel data, for display sinks
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }
}

/// The most recently completed frame.
///
/// The lock is only held to clone or replace the `Arc`; pixel reads happen
/// on the snapshot without any locking.
#[derive(Debug)]
pub struct PresentedFrame {
    current: RwLock<Arc<Frame>>,
}

impl PresentedFrame {
    pub fn new(frame: Frame) -> Arc<Self> {
        info!(
            width = frame.width(),
            height = frame.height(),
            "Initializing canvas"
        );
        Arc::new(Self {
            current: RwLock::new(Arc::new(frame)),
        })
    }

    /// Take a reference to the current snapshot.
    pub fn load(&self) -> Arc<Frame> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the current snapshot, returning the previous one.
    pub fn publish(&self, frame: Arc<Frame>) -> Arc<Frame> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, frame)
    }

    /// Read one pixel of the current snapshot.
    pub fn get(&self, x: i32, y: i32) -> Option<Pixel> {
        self.load().get(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_constructors() {
        assert_eq!(Pixel::gray(0x7f), Pixel::rgba(0x7f, 0x7f, 0x7f, 255));
        assert_eq!(Pixel::rgb(1, 2, 3).a, 255);
        assert_eq!(Pixel::default(), Pixel::BLACK);
    }

    #[test]
    fn test_new_frame_is_blank() {
        let frame = Frame::new(4, 3);
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.size(), Size::new(4, 3));
        assert_eq!(frame.pixels().len(), 12);
        assert!(frame.pixels().iter().all(|p| *p == Pixel::BLACK));
    }

    #[test]
    fn test_set_get() {
        let mut frame = Frame::new(4, 3);
        let red = Pixel::rgb(255, 0, 0);

        assert!(frame.set(3, 2, red));
        assert_eq!(frame.get(3, 2), Some(red));
        assert_eq!(frame.get(2, 3), None);
        assert!(frame.size().contains(3, 2));

        // Row-major layout
        assert_eq!(frame.pixels()[2 * 4 + 3], red);
    }

    #[test]
    fn test_out_of_range() {
        let mut frame = Frame::new(4, 3);
        let before = frame.clone();

        for (x, y) in [(-1, 0), (0, -1), (4, 0), (0, 3), (i32::MIN, i32::MAX)] {
            assert!(!frame.size().contains(x, y));
            assert!(!frame.set(x, y, Pixel::gray(0xff)));
            assert_eq!(frame.get(x, y), None);
        }

        assert_eq!(frame, before);
    }

    #[test]
    fn test_fill_and_copy() {
        let mut frame = Frame::new(2, 2);
        frame.fill(Pixel::gray(0x10));
        assert!(frame.pixels().iter().all(|p| *p == Pixel::gray(0x10)));

        let mut other = Frame::new(2, 2);
        other.copy_from(&frame);
        assert_eq!(other, frame);
    }

    #[test]
    fn test_presented_snapshot_is_stable() {
        let presented = PresentedFrame::new(Frame::new(2, 2));
        let before = presented.load();

        let mut next = Frame::new(2, 2);
        next.set(1, 1, Pixel::rgb(0, 255, 0));
        let previous = presented.publish(Arc::new(next));

        // Readers holding the old snapshot still see the old frame
        assert!(Arc::ptr_eq(&before, &previous));
        assert_eq!(before.get(1, 1), Some(Pixel::BLACK));
        assert_eq!(presented.get(1, 1), Some(Pixel::rgb(0, 255, 0)));
    }
}
