use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use log::{debug, error, trace};

use crate::config::DriverConfig;
use crate::render_core::{
    BufferMask, ContextId, DriverHooks, FramebufferId, Rect, RenderingCore, StateFlags, StringName,
    Subsystem, VisualId,
};
use crate::drawable::{self, Drawable, PixelFormat};
use crate::error::DriverError;
use crate::framebuffer::{FramebufferStore, Geometry, SpanDriver};
use crate::pixel::float_to_ubyte;
use crate::visual::Visual;

/// Hooks the rendering core calls on the driver, on top of the span/pixel set.
pub trait DeviceDriver: SpanDriver {
    fn renderer_string(&self, name: StringName) -> Option<&'static str>;
    fn update_state(&mut self, new_state: StateFlags);
    fn buffer_size(&self) -> (u32, u32);
    fn clear(&mut self, mask: BufferMask, all: bool, region: Rect);
    fn flush(&mut self);
    fn clear_color(&mut self, color: [f32; 4]);
    fn enable(&mut self, cap: u32, state: bool);
    fn set_buffer(&mut self, buffer: BufferMask);
}

/// Core-side objects acquired so far, released in dependency order.
#[derive(Debug, Default)]
struct CoreObjects {
    visual: Option<VisualId>,
    context: Option<ContextId>,
    framebuffer: Option<FramebufferId>,
    subsystems: Vec<Subsystem>,
}

impl CoreObjects {
    fn release<C: RenderingCore + ?Sized>(&mut self, core: &mut C) {
        if let Some(ctx) = self.context {
            while let Some(subsystem) = self.subsystems.pop() {
                core.destroy_subsystem(ctx, subsystem);
            }
        }
        if let Some(ctx) = self.context.take() {
            core.destroy_context(ctx);
        }
        if let Some(visual) = self.visual.take() {
            core.destroy_visual(visual);
        }
        if let Some(fb) = self.framebuffer.take() {
            core.destroy_framebuffer(fb);
        }
    }
}

/// A rendering context bound to one RGB16PC drawable. Several contexts may
/// share one rendering core; each borrows it only for the duration of a call.
pub struct DriverContext<C: RenderingCore, D: Drawable> {
    core: Rc<RefCell<C>>,
    drawable: D,
    config: DriverConfig,
    format: PixelFormat,
    visual: Visual,
    geometry: Geometry,
    ctx: ContextId,
    fb: FramebufferId,
    objects: CoreObjects,
    store: FramebufferStore,
}

fn creation_failed(err: DriverError) -> DriverError {
    error!(target: "rgb16pc::context", "context creation failed: {}", err);
    err
}

fn acquire<C: RenderingCore + ?Sized>(
    core: &mut C,
    visual: &Visual,
    geometry: Geometry,
    objects: &mut CoreObjects,
) -> Result<(ContextId, FramebufferId, FramebufferStore), DriverError> {
    let visual_id = core.create_visual(visual).ok_or(DriverError::OutOfMemory("visual"))?;
    objects.visual = Some(visual_id);

    let ctx = core
        .create_context(visual_id)
        .ok_or(DriverError::OutOfMemory("rendering context"))?;
    objects.context = Some(ctx);

    debug!(target: "rgb16pc::context", "creating framebuffer for {:?}", visual.attachments());
    let fb = core
        .create_framebuffer(visual_id, visual.attachments())
        .ok_or(DriverError::OutOfMemory("framebuffer"))?;
    objects.framebuffer = Some(fb);

    for &subsystem in Subsystem::CREATE_ORDER.iter() {
        if !core.create_subsystem(ctx, subsystem) {
            return Err(DriverError::OutOfMemory("rasterizer subsystem"));
        }
        objects.subsystems.push(subsystem);
    }

    let store = FramebufferStore::allocate(geometry)?;
    Ok((ctx, fb, store))
}

impl<C: RenderingCore, D: Drawable> DriverContext<C, D> {
    /// Validates the drawable, builds the visual, acquires the core objects
    /// and pixel buffers, and installs the driver hooks. On failure every
    /// object acquired so far has been released again.
    pub fn create(core: Rc<RefCell<C>>, drawable: Option<D>, config: DriverConfig) -> Result<Self, DriverError> {
        debug!(target: "rgb16pc::context", "creating context");

        let drawable = drawable
            .ok_or(DriverError::InvalidArgument("cannot create a context without a drawable"))
            .map_err(creation_failed)?;
        let format = drawable::validate(&drawable).map_err(creation_failed)?;
        let geometry = drawable::geometry(&drawable).map_err(creation_failed)?;
        let visual = Visual::from_format(format, &config.visual);

        let mut objects = CoreObjects::default();
        let (ctx, fb, store) = {
            let mut host = core.borrow_mut();
            match acquire(&mut *host, &visual, geometry, &mut objects) {
                Ok((ctx, fb, store)) => {
                    host.install_driver(ctx, &DriverHooks::RGB16PC);
                    (ctx, fb, store)
                }
                Err(err) => {
                    objects.release(&mut *host);
                    return Err(creation_failed(err));
                }
            }
        };

        debug!(
            target: "rgb16pc::context",
            "context {:?} ready, {}x{} stride {}",
            ctx, geometry.width, geometry.height, geometry.bytes_per_row
        );
        Ok(DriverContext {
            core,
            drawable,
            config,
            format,
            visual,
            geometry,
            ctx,
            fb,
            objects,
            store,
        })
    }

    /// Makes this context current. The viewport and scissor are sized to the
    /// drawable the first time only.
    pub fn make_current(&mut self) {
        self.update_state(StateFlags::default());

        let mut core = self.core.borrow_mut();
        core.make_current(self.ctx, self.fb);
        if core.viewport(self.ctx).width == 0 {
            let Geometry { width, height, .. } = self.geometry;
            core.set_viewport(self.ctx, Rect { x: 0, y: 0, width, height });
            core.set_scissor_size(self.ctx, width, height);
        }
    }

    /// Blits the back buffer to the drawable. A refused lock drops the frame.
    pub fn swap_buffers(&mut self) {
        match drawable::present(&mut self.drawable, self.store.back_buffer()) {
            Ok(()) => self.core.borrow_mut().notify_swap_buffers(self.ctx),
            Err(err) => debug!(target: "rgb16pc::context", "frame skipped: {}", err),
        }
    }

    pub fn invalidate_state(&mut self, flags: StateFlags) {
        self.update_state(flags);
    }

    /// Releases the pixel buffers and then the core objects. Dropping the
    /// context does the same.
    pub fn destroy(self) {
        debug!(target: "rgb16pc::context", "destroying context {:?}", self.ctx);
    }

    /// Panics if the core is already mutably borrowed.
    pub fn core(&self) -> Ref<'_, C> {
        self.core.borrow()
    }

    /// Panics if the core is already borrowed.
    pub fn core_mut(&self) -> RefMut<'_, C> {
        self.core.borrow_mut()
    }

    pub fn drawable(&self) -> &D {
        &self.drawable
    }

    pub fn drawable_mut(&mut self) -> &mut D {
        &mut self.drawable
    }

    pub fn store(&self) -> &FramebufferStore {
        &self.store
    }

    pub fn visual(&self) -> &Visual {
        &self.visual
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn context_id(&self) -> ContextId {
        self.ctx
    }

    pub fn framebuffer_id(&self) -> FramebufferId {
        self.fb
    }
}

impl<C: RenderingCore, D: Drawable> Drop for DriverContext<C, D> {
    fn drop(&mut self) {
        self.store.release();
        match self.core.try_borrow_mut() {
            Ok(mut core) => self.objects.release(&mut *core),
            Err(_) => error!(target: "rgb16pc::context", "core busy, leaking objects of context {:?}", self.ctx),
        }
    }
}

impl<C: RenderingCore, D: Drawable> DeviceDriver for DriverContext<C, D> {
    fn renderer_string(&self, name: StringName) -> Option<&'static str> {
        match name {
            StringName::Renderer => Some(self.config.renderer_name),
            _ => None,
        }
    }

    // The driver caches nothing derived from GL state, so this only fans out.
    fn update_state(&mut self, new_state: StateFlags) {
        let mut core = self.core.borrow_mut();
        for &subsystem in Subsystem::INVALIDATE_ORDER.iter() {
            core.invalidate_state(self.ctx, subsystem, new_state);
        }
    }

    fn buffer_size(&self) -> (u32, u32) {
        (self.geometry.width, self.geometry.height)
    }

    fn clear(&mut self, mut mask: BufferMask, all: bool, region: Rect) {
        let mut core = self.core.borrow_mut();
        if mask.contains(BufferMask::FRONT_LEFT) && self.store.clear(all, core.color_mask(self.ctx)) {
            mask.remove(BufferMask::FRONT_LEFT);
        }

        if !mask.is_empty() {
            core.software_clear(self.ctx, mask, all, region, &mut self.store);
        }
    }

    fn flush(&mut self) {
        trace!(target: "rgb16pc::context", "flush");
    }

    // The template serves the fast path, the core's copy the software clear.
    fn clear_color(&mut self, color: [f32; 4]) {
        let [r, g, b, a] = color.map(float_to_ubyte);
        self.store.set_clear_color(r, g, b);
        self.core.borrow_mut().set_clear_color(self.ctx, [r, g, b, a]);
    }

    fn enable(&mut self, cap: u32, state: bool) {
        trace!(target: "rgb16pc::context", "enable {:#x} = {}", cap, state);
    }

    // Single-buffered as far as GL is concerned.
    fn set_buffer(&mut self, buffer: BufferMask) {
        trace!(target: "rgb16pc::context", "set_buffer {:?}", buffer);
    }
}

impl<C: RenderingCore, D: Drawable> SpanDriver for DriverContext<C, D> {
    fn write_rgb_span(&mut self, x: u32, y: u32, rgb: &[[u8; 3]], mask: Option<&[bool]>) {
        self.store.write_rgb_span(x, y, rgb, mask);
    }

    fn write_rgba_span(&mut self, x: u32, y: u32, rgba: &[[u8; 4]], mask: Option<&[bool]>) {
        self.store.write_rgba_span(x, y, rgba, mask);
    }

    fn write_mono_rgba_span(&mut self, x: u32, y: u32, color: [u8; 4], mask: &[bool]) {
        self.store.write_mono_rgba_span(x, y, color, mask);
    }

    fn write_rgba_pixels(&mut self, xs: &[u32], ys: &[u32], rgba: &[[u8; 4]], mask: &[bool]) {
        self.store.write_rgba_pixels(xs, ys, rgba, mask);
    }

    fn write_mono_rgba_pixels(&mut self, xs: &[u32], ys: &[u32], color: [u8; 4], mask: &[bool]) {
        self.store.write_mono_rgba_pixels(xs, ys, color, mask);
    }

    fn read_rgba_span(&self, x: u32, y: u32, rgba: &mut [[u8; 4]]) {
        self.store.read_rgba_span(x, y, rgba);
    }

    fn read_rgba_pixels(&self, xs: &[u32], ys: &[u32], rgba: &mut [[u8; 4]], mask: &[bool]) {
        self.store.read_rgba_pixels(xs, ys, rgba, mask);
    }
}
