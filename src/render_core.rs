//! The rendering core this driver plugs into. The core owns the GL-level
//! objects (visual, context, ancillary framebuffer) and the software
//! rasterizer subsystems; the driver only holds handles to them.

use crate::framebuffer::SpanDriver;
use crate::visual::{Attachments, Visual};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// Helper modules the core composes for a context. Invalidation is forwarded
/// to them in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Rasterizer,
    RasterSetup,
    ArrayCache,
    Transform,
}

impl Subsystem {
    /// Creation order. Teardown runs in reverse.
    pub const CREATE_ORDER: [Subsystem; 4] = [
        Subsystem::Rasterizer,
        Subsystem::ArrayCache,
        Subsystem::Transform,
        Subsystem::RasterSetup,
    ];

    pub const INVALIDATE_ORDER: [Subsystem; 4] = [
        Subsystem::Rasterizer,
        Subsystem::RasterSetup,
        Subsystem::ArrayCache,
        Subsystem::Transform,
    ];
}

/// Dirty-state bits, opaque to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateFlags(pub u32);

/// Buffers named by a clear request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferMask(pub u32);

impl BufferMask {
    pub const FRONT_LEFT: BufferMask = BufferMask(1 << 0);
    pub const DEPTH: BufferMask = BufferMask(1 << 4);
    pub const STENCIL: BufferMask = BufferMask(1 << 5);
    pub const ACCUM: BufferMask = BufferMask(1 << 6);

    pub fn contains(self, other: BufferMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn remove(&mut self, other: BufferMask) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for BufferMask {
    type Output = BufferMask;

    fn bitor(self, rhs: BufferMask) -> BufferMask {
        BufferMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Per-channel colour write mask plus the colour-index write mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorMask {
    pub rgba: [bool; 4],
    pub index: u32,
}

impl ColorMask {
    pub const ALL: ColorMask = ColorMask {
        rgba: [true; 4],
        index: u32::MAX,
    };

    pub fn is_all(&self) -> bool {
        *self == ColorMask::ALL
    }
}

impl Default for ColorMask {
    fn default() -> Self {
        ColorMask::ALL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringName {
    Vendor,
    Renderer,
    Version,
    Extensions,
}

/// Who services a hook: the driver itself or the core's software fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Driver,
    Software,
}

/// Routing table the driver installs on its context at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverHooks {
    pub get_string: Hook,
    pub update_state: Hook,
    pub resize_buffers: Hook,
    pub get_buffer_size: Hook,
    pub accum: Hook,
    pub bitmap: Hook,
    pub clear: Hook,
    pub flush: Hook,
    pub clear_color: Hook,
    pub enable: Hook,
    pub copy_pixels: Hook,
    pub draw_pixels: Hook,
    pub read_pixels: Hook,
    pub draw_buffer: Hook,
    pub choose_texture_format: Hook,
    pub tex_image: [Hook; 3],
    pub tex_sub_image: [Hook; 3],
    pub test_proxy_tex_image: Hook,
    pub compressed_tex_image: [Hook; 3],
    pub compressed_tex_sub_image: [Hook; 3],
    pub copy_tex_image: [Hook; 2],
    pub copy_tex_sub_image: [Hook; 3],
    pub copy_color_table: Hook,
    pub copy_color_sub_table: Hook,
    pub copy_convolution_filter: [Hook; 2],
    pub set_buffer: Hook,
    pub write_rgb_span: Hook,
    pub write_rgba_span: Hook,
    pub write_rgba_pixels: Hook,
    pub write_mono_rgba_span: Hook,
    pub write_mono_rgba_pixels: Hook,
    pub read_rgba_span: Hook,
    pub read_rgba_pixels: Hook,
    pub run_pipeline: Hook,
}

impl DriverHooks {
    /// The RGB16PC driver: its own state, sizing, clear and span/pixel I/O;
    /// everything else, textures included, goes to the software paths.
    pub const RGB16PC: DriverHooks = DriverHooks {
        get_string: Hook::Driver,
        update_state: Hook::Driver,
        resize_buffers: Hook::Software,
        get_buffer_size: Hook::Driver,
        accum: Hook::Software,
        bitmap: Hook::Software,
        clear: Hook::Driver,
        flush: Hook::Driver,
        clear_color: Hook::Driver,
        enable: Hook::Driver,
        copy_pixels: Hook::Software,
        draw_pixels: Hook::Software,
        read_pixels: Hook::Software,
        draw_buffer: Hook::Software,
        choose_texture_format: Hook::Software,
        tex_image: [Hook::Software; 3],
        tex_sub_image: [Hook::Software; 3],
        test_proxy_tex_image: Hook::Software,
        compressed_tex_image: [Hook::Software; 3],
        compressed_tex_sub_image: [Hook::Software; 3],
        copy_tex_image: [Hook::Software; 2],
        copy_tex_sub_image: [Hook::Software; 3],
        copy_color_table: Hook::Software,
        copy_color_sub_table: Hook::Software,
        copy_convolution_filter: [Hook::Software; 2],
        set_buffer: Hook::Driver,
        write_rgb_span: Hook::Driver,
        write_rgba_span: Hook::Driver,
        write_rgba_pixels: Hook::Driver,
        write_mono_rgba_span: Hook::Driver,
        write_mono_rgba_pixels: Hook::Driver,
        read_rgba_span: Hook::Driver,
        read_rgba_pixels: Hook::Driver,
        run_pipeline: Hook::Software,
    };
}

/// Capabilities the driver consumes from the rendering core. Creation
/// methods return `None` when the core runs out of memory.
pub trait RenderingCore {
    fn create_visual(&mut self, visual: &Visual) -> Option<VisualId>;
    fn destroy_visual(&mut self, visual: VisualId);

    fn create_context(&mut self, visual: VisualId) -> Option<ContextId>;
    fn destroy_context(&mut self, ctx: ContextId);

    fn create_framebuffer(&mut self, visual: VisualId, attachments: Attachments) -> Option<FramebufferId>;
    fn destroy_framebuffer(&mut self, fb: FramebufferId);

    fn create_subsystem(&mut self, ctx: ContextId, subsystem: Subsystem) -> bool;
    fn destroy_subsystem(&mut self, ctx: ContextId, subsystem: Subsystem);
    fn invalidate_state(&mut self, ctx: ContextId, subsystem: Subsystem, flags: StateFlags);

    /// Registers the driver's hook routing and wakes the raster setup stage.
    fn install_driver(&mut self, ctx: ContextId, hooks: &DriverHooks);

    fn make_current(&mut self, ctx: ContextId, fb: FramebufferId);
    fn viewport(&self, ctx: ContextId) -> Rect;
    fn set_viewport(&mut self, ctx: ContextId, viewport: Rect);
    fn set_scissor_size(&mut self, ctx: ContextId, width: u32, height: u32);
    fn color_mask(&self, ctx: ContextId) -> ColorMask;
    /// GL clear colour, used by `software_clear`.
    fn set_clear_color(&mut self, ctx: ContextId, rgba: [u8; 4]);

    /// Generic clear of whatever the driver did not handle. Colour buffers
    /// are reached through `spans`.
    fn software_clear(&mut self, ctx: ContextId, mask: BufferMask, all: bool, region: Rect, spans: &mut dyn SpanDriver);

    fn notify_swap_buffers(&mut self, ctx: ContextId);
}
