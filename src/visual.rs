use crate::config::VisualConfig;
use crate::drawable::PixelFormat;

/// Buffer layout handed to the rendering core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visual {
    pub rgb_mode: bool,
    pub double_buffer: bool,
    pub stereo: bool,
    pub red_bits: u32,
    pub green_bits: u32,
    pub blue_bits: u32,
    pub alpha_bits: u32,
    pub index_bits: u32,
    pub depth_bits: u32,
    pub stencil_bits: u32,
    pub accum_red_bits: u32,
    pub accum_green_bits: u32,
    pub accum_blue_bits: u32,
    pub accum_alpha_bits: u32,
    pub num_samples: u32,
}

/// Ancillary buffers the core should allocate alongside the colour buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachments {
    pub depth: bool,
    pub stencil: bool,
    pub accum: bool,
    pub alpha: bool,
}

impl Visual {
    pub fn from_format(format: PixelFormat, config: &VisualConfig) -> Self {
        use PixelFormat::*;

        let (rgb_mode, index_bits, (red_bits, green_bits, blue_bits), alpha) = match format {
            Lut8 => (false, 8, (0, 0, 0), false),
            Rgb15 | Rgb15Pc | Bgr15Pc => (true, 0, (5, 5, 5), false),
            Rgb16 | Rgb16Pc | Bgr16Pc => (true, 0, (5, 6, 5), false),
            Rgb24 | Bgr24 => (true, 0, (8, 8, 8), false),
            Argb32 | Bgra32 | Rgba32 => (true, 0, (8, 8, 8), true),
        };

        Visual {
            rgb_mode,
            double_buffer: false,
            stereo: false,
            red_bits,
            green_bits,
            blue_bits,
            alpha_bits: if alpha { 8 } else { 0 },
            index_bits,
            depth_bits: config.depth_bits,
            stencil_bits: config.stencil_bits,
            accum_red_bits: config.accum_bits,
            accum_green_bits: config.accum_bits,
            accum_blue_bits: config.accum_bits,
            accum_alpha_bits: if alpha { config.accum_bits } else { 0 },
            num_samples: 1,
        }
    }

    pub fn attachments(&self) -> Attachments {
        Attachments {
            depth: self.depth_bits > 0,
            stencil: self.stencil_bits > 0,
            accum: self.accum_red_bits > 0,
            alpha: self.alpha_bits > 0,
        }
    }
}
