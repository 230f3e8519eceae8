//! The window/surface side: format negotiation, geometry and the blit of the
//! back buffer into the drawable's own pixel memory.

use log::{trace, warn};

use crate::error::DriverError;
use crate::framebuffer::{Geometry, BYTES_PER_PIXEL};

pub const SUPPORTED_DEPTH: u32 = 16;
pub const SUPPORTED_FORMAT: PixelFormat = PixelFormat::Rgb16Pc;

/// Bulk copies into native memory move whole longwords.
pub const COPY_GRANULARITY: usize = 4;

/// Pixel layouts a drawable can report. Only `Rgb16Pc` is rendered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Lut8,
    Rgb15,
    Bgr15Pc,
    Rgb15Pc,
    Rgb16,
    Bgr16Pc,
    Rgb16Pc,
    Rgb24,
    Bgr24,
    Argb32,
    Bgra32,
    Rgba32,
}

pub trait Drawable {
    /// Whether the pixel memory is a CPU-addressable chunky bitmap.
    fn is_direct(&self) -> bool;
    fn depth(&self) -> u32;
    fn pixel_format(&self) -> PixelFormat;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn bytes_per_row(&self) -> u32;

    /// Tries to take exclusive access to the native pixel memory.
    fn lock(&mut self) -> bool;
    /// Only meaningful between a successful `lock` and the matching `unlock`.
    fn native_memory(&mut self) -> &mut [u8];
    fn unlock(&mut self);
}

/// Exclusive access to a drawable's pixel memory, released on drop.
pub struct NativeLock<'a, D: Drawable + ?Sized> {
    drawable: &'a mut D,
}

impl<'a, D: Drawable + ?Sized> NativeLock<'a, D> {
    pub fn acquire(drawable: &'a mut D) -> Option<Self> {
        if drawable.lock() {
            Some(NativeLock { drawable })
        } else {
            None
        }
    }

    pub fn memory(&mut self) -> &mut [u8] {
        self.drawable.native_memory()
    }
}

impl<D: Drawable + ?Sized> Drop for NativeLock<'_, D> {
    fn drop(&mut self) {
        self.drawable.unlock();
    }
}

pub fn validate<D: Drawable + ?Sized>(drawable: &D) -> Result<PixelFormat, DriverError> {
    if !drawable.is_direct() {
        return Err(DriverError::NotDirect);
    }

    let depth = drawable.depth();
    let format = drawable.pixel_format();
    if depth != SUPPORTED_DEPTH || format != SUPPORTED_FORMAT {
        return Err(DriverError::UnsupportedFormat { depth, format });
    }
    Ok(format)
}

pub fn geometry<D: Drawable + ?Sized>(drawable: &D) -> Result<Geometry, DriverError> {
    let geometry = Geometry {
        width: drawable.width(),
        height: drawable.height(),
        bytes_per_row: drawable.bytes_per_row(),
    };

    if geometry.width == 0 || geometry.height == 0 {
        return Err(DriverError::InvalidArgument("drawable has no pixels"));
    }
    let min_row = geometry.width.checked_mul(BYTES_PER_PIXEL);
    if min_row.map_or(true, |min| geometry.bytes_per_row < min) || geometry.bytes_per_row % 2 != 0 {
        return Err(DriverError::InvalidArgument("row modulo does not fit the drawable width"));
    }
    match geometry.buffer_len() {
        Some(len) if len % COPY_GRANULARITY == 0 => Ok(geometry),
        Some(_) => Err(DriverError::InvalidArgument("bitmap size is not a whole number of longwords")),
        None => Err(DriverError::OutOfMemory("back buffer")),
    }
}

/// Copies `back` into the drawable's pixel memory under a lock. Fails with
/// `ResourceUnavailable` without touching anything if the lock is refused.
pub fn present<D: Drawable + ?Sized>(drawable: &mut D, back: &[u8]) -> Result<(), DriverError> {
    debug_assert_eq!(back.len() % COPY_GRANULARITY, 0);

    let mut lock = NativeLock::acquire(drawable).ok_or(DriverError::ResourceUnavailable)?;
    let native = lock.memory();
    if native.len() < back.len() {
        warn!(target: "rgb16pc::drawable", "native bitmap shrank to {} bytes, need {}", native.len(), back.len());
        return Err(DriverError::ResourceUnavailable);
    }
    native[..back.len()].copy_from_slice(back);

    trace!(target: "rgb16pc::drawable", "blitted {} bytes", back.len());
    Ok(())
}

/// A drawable backed by plain memory.
#[derive(Debug, Clone)]
pub struct Bitmap {
    direct: bool,
    depth: u32,
    format: PixelFormat,
    width: u32,
    height: u32,
    bytes_per_row: u32,
    pixels: Vec<u8>,
    locked: bool,
    fail_locks: bool,
    locks: u32,
    unlocks: u32,
}

impl Bitmap {
    /// An RGB16PC bitmap with rows padded to whole longwords.
    pub fn new(width: u32, height: u32) -> Self {
        let bytes_per_row = (width * BYTES_PER_PIXEL + 3) & !3;
        Bitmap::with_format(width, height, bytes_per_row, SUPPORTED_DEPTH, SUPPORTED_FORMAT)
    }

    pub fn with_format(width: u32, height: u32, bytes_per_row: u32, depth: u32, format: PixelFormat) -> Self {
        Bitmap {
            direct: true,
            depth,
            format,
            width,
            height,
            bytes_per_row,
            pixels: vec![0; height as usize * bytes_per_row as usize],
            locked: false,
            fail_locks: false,
            locks: 0,
            unlocks: 0,
        }
    }

    pub fn set_direct(&mut self, direct: bool) {
        self.direct = direct;
    }

    /// Makes every following `lock` fail, as if another task held it.
    pub fn set_fail_locks(&mut self, fail: bool) {
        self.fail_locks = fail;
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock_count(&self) -> u32 {
        self.locks
    }

    pub fn unlock_count(&self) -> u32 {
        self.unlocks
    }
}

impl Drawable for Bitmap {
    fn is_direct(&self) -> bool {
        self.direct
    }

    fn depth(&self) -> u32 {
        self.depth
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn bytes_per_row(&self) -> u32 {
        self.bytes_per_row
    }

    fn lock(&mut self) -> bool {
        if self.fail_locks || self.locked {
            return false;
        }
        self.locked = true;
        self.locks += 1;
        true
    }

    fn native_memory(&mut self) -> &mut [u8] {
        debug_assert!(self.locked);
        &mut self.pixels
    }

    fn unlock(&mut self) {
        self.locked = false;
        self.unlocks += 1;
    }
}
