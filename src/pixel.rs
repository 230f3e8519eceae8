//! RGB16PC pixel codec.
//!
//! The packed word is laid out so that, stored big-endian, its two bytes read
//! as little-endian RGB565:
//!
//! ```text
//! bit  15..13   12..8   7..3   2..0
//!      g[4:2]   b[7:3]  r[7:3] g[7:5]
//! ```

/// A packed RGB16PC pixel word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Color(pub u16);

impl Color {
    pub const BLACK: Color = Color(0);

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Color(encode(r, g, b))
    }

    pub fn rgba(self) -> [u8; 4] {
        decode(self.0)
    }
}

/// Packs 8-bit channels, keeping the top 5/6/5 bits of red/green/blue.
#[inline]
pub fn encode(r: u8, g: u8, b: u8) -> u16 {
    let (r, g, b) = (r as u32, g as u32, b as u32);
    (((b >> 3) << 8) | (g >> 5) | ((g >> 2) << 13) | ((r >> 3) << 3)) as u16
}

/// Unpacks a word into RGBA. The dropped low bits come back as zero and alpha
/// is always opaque.
#[inline]
pub fn decode(word: u16) -> [u8; 4] {
    let w = word as u32;
    [
        (w & 0xf8) as u8,
        (((w << 5) & 0xe0) | ((w >> 11) & 0x1c)) as u8,
        ((w >> 5) & 0xf8) as u8,
        0xff,
    ]
}

/// Clamps a float channel to [0, 1] and scales it to a byte.
#[inline]
pub fn float_to_ubyte(f: f32) -> u8 {
    if f.is_nan() || f <= 0.0 {
        0
    } else if f >= 1.0 {
        255
    } else {
        (f * 255.0).round() as u8
    }
}
