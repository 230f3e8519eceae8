use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};

use crate::render_core::ColorMask;
use crate::error::DriverError;
use crate::pixel::{decode, encode};

pub const BYTES_PER_PIXEL: u32 = 2;

/// Size of the drawable, fixed for the life of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl Geometry {
    /// `height * bytes_per_row`, or `None` if that does not fit in memory.
    pub fn buffer_len(&self) -> Option<usize> {
        (self.height as usize).checked_mul(self.bytes_per_row as usize)
    }
}

/// The span and pixel hooks a software rasterizer writes its fragments
/// through. Coordinates are trusted: `x < width`, `y < height`, and spans do
/// not run past the end of a row. `y` counts up from the bottom of the image.
pub trait SpanDriver {
    fn write_rgb_span(&mut self, x: u32, y: u32, rgb: &[[u8; 3]], mask: Option<&[bool]>);
    fn write_rgba_span(&mut self, x: u32, y: u32, rgba: &[[u8; 4]], mask: Option<&[bool]>);
    /// Writes `color` wherever `mask` is set; the span is `mask.len()` long.
    fn write_mono_rgba_span(&mut self, x: u32, y: u32, color: [u8; 4], mask: &[bool]);
    fn write_rgba_pixels(&mut self, xs: &[u32], ys: &[u32], rgba: &[[u8; 4]], mask: &[bool]);
    fn write_mono_rgba_pixels(&mut self, xs: &[u32], ys: &[u32], color: [u8; 4], mask: &[bool]);
    fn read_rgba_span(&self, x: u32, y: u32, rgba: &mut [[u8; 4]]);
    /// Entries whose mask is unset are left as the caller passed them.
    fn read_rgba_pixels(&self, xs: &[u32], ys: &[u32], rgba: &mut [[u8; 4]], mask: &[bool]);
}

/// Back buffer plus a clear template of the same size. Pixels are stored as
/// big-endian RGB16PC words.
pub struct FramebufferStore {
    geometry: Geometry,
    back: Vec<u8>,
    template: Vec<u8>,
    clear_color: u16,
    template_fills: u64,
}

fn zeroed(len: usize, what: &'static str) -> Result<Vec<u8>, DriverError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| DriverError::OutOfMemory(what))?;
    buffer.resize(len, 0);
    Ok(buffer)
}

impl FramebufferStore {
    pub fn allocate(geometry: Geometry) -> Result<Self, DriverError> {
        if geometry.bytes_per_row == 0 || geometry.bytes_per_row % BYTES_PER_PIXEL != 0 {
            return Err(DriverError::InvalidArgument("row stride is not a whole number of pixels"));
        }
        let len = geometry
            .buffer_len()
            .ok_or(DriverError::OutOfMemory("back buffer"))?;
        let back = zeroed(len, "back buffer")?;
        let template = zeroed(len, "clear buffer")?;

        debug!(target: "rgb16pc::framebuffer", "allocated 2 x {} bytes for {:?}", len, geometry);
        Ok(FramebufferStore {
            geometry,
            back,
            template,
            clear_color: encode(0, 0, 0),
            template_fills: 0,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn clear_color(&self) -> u16 {
        self.clear_color
    }

    /// How many times the clear template has been rewritten.
    pub fn template_fills(&self) -> u64 {
        self.template_fills
    }

    pub fn back_buffer(&self) -> &[u8] {
        &self.back
    }

    pub fn clear_buffer(&self) -> &[u8] {
        &self.template
    }

    /// Frees both pixel buffers. Span and pixel calls are invalid afterwards.
    pub fn release(&mut self) {
        if self.back.is_empty() && self.template.is_empty() {
            return;
        }
        self.back = Vec::new();
        self.template = Vec::new();
        debug!(target: "rgb16pc::framebuffer", "released pixel buffers");
    }

    /// Physical row of logical row `y`; row 0 is the bottom of the image.
    #[inline]
    fn row(&self, y: u32) -> usize {
        (self.geometry.height - 1 - y) as usize
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        self.row(y) * self.geometry.bytes_per_row as usize + (x * BYTES_PER_PIXEL) as usize
    }

    #[inline]
    fn put_pixel(&mut self, x: u32, y: u32, word: u16) {
        let at = self.offset(x, y);
        BigEndian::write_u16(&mut self.back[at..at + 2], word);
    }

    #[inline]
    fn get_pixel(&self, x: u32, y: u32) -> u16 {
        let at = self.offset(x, y);
        BigEndian::read_u16(&self.back[at..at + 2])
    }

    fn put_span<I>(&mut self, x: u32, y: u32, n: usize, words: I, mask: Option<&[bool]>)
    where
        I: Iterator<Item = u16>,
    {
        if n == 0 {
            return;
        }
        let at = self.offset(x, y);
        let span = &mut self.back[at..at + n * BYTES_PER_PIXEL as usize];

        match mask {
            Some(mask) => {
                debug_assert_eq!(mask.len(), n);
                for ((px, word), &set) in span.chunks_exact_mut(2).zip(words).zip(mask) {
                    if set {
                        BigEndian::write_u16(px, word);
                    }
                }
            }
            None => {
                for (px, word) in span.chunks_exact_mut(2).zip(words) {
                    BigEndian::write_u16(px, word);
                }
            }
        }
    }

    /// Sets the clear colour. The template is only rewritten when the packed
    /// word changes; returns whether it was.
    pub fn set_clear_color(&mut self, r: u8, g: u8, b: u8) -> bool {
        let word = encode(r, g, b);
        if word == self.clear_color {
            return false;
        }

        let row_len = self.geometry.bytes_per_row as usize;
        for row in self.template.chunks_exact_mut(row_len) {
            for px in row.chunks_exact_mut(2) {
                BigEndian::write_u16(px, word);
            }
        }
        self.clear_color = word;
        self.template_fills += 1;

        trace!(target: "rgb16pc::framebuffer", "clear color now {:#06x}", word);
        true
    }

    /// Copies the clear template over the back buffer when the whole buffer
    /// is being cleared and no channel is write-protected. Returns `false`
    /// without touching the back buffer otherwise.
    pub fn clear(&mut self, all: bool, color_mask: ColorMask) -> bool {
        if !all || !color_mask.is_all() {
            return false;
        }
        self.back.copy_from_slice(&self.template);
        true
    }
}

impl SpanDriver for FramebufferStore {
    fn write_rgb_span(&mut self, x: u32, y: u32, rgb: &[[u8; 3]], mask: Option<&[bool]>) {
        let words = rgb.iter().map(|c| encode(c[0], c[1], c[2]));
        self.put_span(x, y, rgb.len(), words, mask);
    }

    fn write_rgba_span(&mut self, x: u32, y: u32, rgba: &[[u8; 4]], mask: Option<&[bool]>) {
        let words = rgba.iter().map(|c| encode(c[0], c[1], c[2]));
        self.put_span(x, y, rgba.len(), words, mask);
    }

    fn write_mono_rgba_span(&mut self, x: u32, y: u32, color: [u8; 4], mask: &[bool]) {
        let word = encode(color[0], color[1], color[2]);
        self.put_span(x, y, mask.len(), std::iter::repeat(word), Some(mask));
    }

    fn write_rgba_pixels(&mut self, xs: &[u32], ys: &[u32], rgba: &[[u8; 4]], mask: &[bool]) {
        for (((&x, &y), c), &set) in xs.iter().zip(ys).zip(rgba).zip(mask) {
            if set {
                self.put_pixel(x, y, encode(c[0], c[1], c[2]));
            }
        }
    }

    fn write_mono_rgba_pixels(&mut self, xs: &[u32], ys: &[u32], color: [u8; 4], mask: &[bool]) {
        let word = encode(color[0], color[1], color[2]);
        for ((&x, &y), &set) in xs.iter().zip(ys).zip(mask) {
            if set {
                self.put_pixel(x, y, word);
            }
        }
    }

    fn read_rgba_span(&self, x: u32, y: u32, rgba: &mut [[u8; 4]]) {
        if rgba.is_empty() {
            return;
        }
        let at = self.offset(x, y);
        let span = &self.back[at..at + rgba.len() * BYTES_PER_PIXEL as usize];

        // Two pixels per 32-bit load; the first pixel is in the high half.
        let mut pairs = rgba.chunks_exact_mut(2);
        let mut longs = span.chunks_exact(4);
        for (out, bytes) in (&mut pairs).zip(&mut longs) {
            let long = BigEndian::read_u32(bytes);
            out[0] = decode((long >> 16) as u16);
            out[1] = decode(long as u16);
        }
        if let [last] = pairs.into_remainder() {
            *last = decode(BigEndian::read_u16(longs.remainder()));
        }
    }

    fn read_rgba_pixels(&self, xs: &[u32], ys: &[u32], rgba: &mut [[u8; 4]], mask: &[bool]) {
        for (((&x, &y), out), &set) in xs.iter().zip(ys).zip(rgba.iter_mut()).zip(mask) {
            if set {
                *out = decode(self.get_pixel(x, y));
            }
        }
    }
}
