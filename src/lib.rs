//! Software-rasterizer framebuffer driver for 16 bit RGB16PC drawables.
//!
//! The driver keeps an off-screen back buffer in the drawable's own pixel
//! format, services the rasterizer's span and pixel hooks against it, clears
//! it from a pre-filled template and blits it to the drawable on swap.

pub mod config;
pub mod context;
pub mod drawable;
pub mod error;
pub mod framebuffer;
pub mod pixel;
pub mod render_core;
pub mod soft;
pub mod ssd1351;
pub mod visual;

pub use crate::context::{DeviceDriver, DriverContext};
pub use crate::drawable::{Bitmap, Drawable, PixelFormat};
pub use crate::error::DriverError;
pub use crate::framebuffer::{FramebufferStore, Geometry, SpanDriver};
pub use crate::pixel::Color;
