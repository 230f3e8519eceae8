use std::cell::RefCell;
use std::rc::Rc;

use rgb16pc::config::DriverConfig;
use rgb16pc::render_core::{
    BufferMask, ColorMask, ContextId, DriverHooks, FramebufferId, Rect, RenderingCore, StateFlags, StringName,
    Subsystem, VisualId,
};
use rgb16pc::soft::SoftwareCore;
use rgb16pc::visual::{Attachments, Visual};
use rgb16pc::{Bitmap, DeviceDriver, Drawable, DriverContext, DriverError, PixelFormat, SpanDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Visual,
    Context,
    Framebuffer,
    Subsystem(Subsystem),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    CreateVisual,
    DestroyVisual,
    CreateContext,
    DestroyContext,
    CreateFramebuffer,
    DestroyFramebuffer,
    CreateSubsystem(Subsystem),
    DestroySubsystem(Subsystem),
    Invalidate(Subsystem),
    InstallDriver,
    MakeCurrent,
    SetViewport(Rect),
    SetScissor(u32, u32),
    SoftwareClear(BufferMask, bool, Rect),
    Swap,
}

/// Wraps the software core, logging every call and optionally refusing one
/// creation step.
#[derive(Default)]
struct RecordingCore {
    inner: SoftwareCore,
    fail: Option<Step>,
    events: Vec<Event>,
}

impl RecordingCore {
    fn failing_at(step: Step) -> Self {
        RecordingCore { fail: Some(step), ..Default::default() }
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|&e| pred(e)).count()
    }
}

impl RenderingCore for RecordingCore {
    fn create_visual(&mut self, visual: &Visual) -> Option<VisualId> {
        if self.fail == Some(Step::Visual) {
            return None;
        }
        self.events.push(Event::CreateVisual);
        self.inner.create_visual(visual)
    }

    fn destroy_visual(&mut self, visual: VisualId) {
        self.events.push(Event::DestroyVisual);
        self.inner.destroy_visual(visual);
    }

    fn create_context(&mut self, visual: VisualId) -> Option<ContextId> {
        if self.fail == Some(Step::Context) {
            return None;
        }
        self.events.push(Event::CreateContext);
        self.inner.create_context(visual)
    }

    fn destroy_context(&mut self, ctx: ContextId) {
        self.events.push(Event::DestroyContext);
        self.inner.destroy_context(ctx);
    }

    fn create_framebuffer(&mut self, visual: VisualId, attachments: Attachments) -> Option<FramebufferId> {
        if self.fail == Some(Step::Framebuffer) {
            return None;
        }
        self.events.push(Event::CreateFramebuffer);
        self.inner.create_framebuffer(visual, attachments)
    }

    fn destroy_framebuffer(&mut self, fb: FramebufferId) {
        self.events.push(Event::DestroyFramebuffer);
        self.inner.destroy_framebuffer(fb);
    }

    fn create_subsystem(&mut self, ctx: ContextId, subsystem: Subsystem) -> bool {
        if self.fail == Some(Step::Subsystem(subsystem)) {
            return false;
        }
        self.events.push(Event::CreateSubsystem(subsystem));
        self.inner.create_subsystem(ctx, subsystem)
    }

    fn destroy_subsystem(&mut self, ctx: ContextId, subsystem: Subsystem) {
        self.events.push(Event::DestroySubsystem(subsystem));
        self.inner.destroy_subsystem(ctx, subsystem);
    }

    fn invalidate_state(&mut self, ctx: ContextId, subsystem: Subsystem, flags: StateFlags) {
        self.events.push(Event::Invalidate(subsystem));
        self.inner.invalidate_state(ctx, subsystem, flags);
    }

    fn install_driver(&mut self, ctx: ContextId, hooks: &DriverHooks) {
        self.events.push(Event::InstallDriver);
        self.inner.install_driver(ctx, hooks);
    }

    fn make_current(&mut self, ctx: ContextId, fb: FramebufferId) {
        self.events.push(Event::MakeCurrent);
        self.inner.make_current(ctx, fb);
    }

    fn viewport(&self, ctx: ContextId) -> Rect {
        self.inner.viewport(ctx)
    }

    fn set_viewport(&mut self, ctx: ContextId, viewport: Rect) {
        self.events.push(Event::SetViewport(viewport));
        self.inner.set_viewport(ctx, viewport);
    }

    fn set_scissor_size(&mut self, ctx: ContextId, width: u32, height: u32) {
        self.events.push(Event::SetScissor(width, height));
        self.inner.set_scissor_size(ctx, width, height);
    }

    fn color_mask(&self, ctx: ContextId) -> ColorMask {
        self.inner.color_mask(ctx)
    }

    fn set_clear_color(&mut self, ctx: ContextId, rgba: [u8; 4]) {
        self.inner.set_clear_color(ctx, rgba);
    }

    fn software_clear(&mut self, ctx: ContextId, mask: BufferMask, all: bool, region: Rect, spans: &mut dyn SpanDriver) {
        self.events.push(Event::SoftwareClear(mask, all, region));
        self.inner.software_clear(ctx, mask, all, region, spans);
    }

    fn notify_swap_buffers(&mut self, ctx: ContextId) {
        self.events.push(Event::Swap);
        self.inner.notify_swap_buffers(ctx);
    }
}

/// Passes validation but is far too large to back with memory.
struct HugeDrawable {
    memory: Vec<u8>,
}

impl Drawable for HugeDrawable {
    fn is_direct(&self) -> bool {
        true
    }

    fn depth(&self) -> u32 {
        16
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Rgb16Pc
    }

    fn width(&self) -> u32 {
        2
    }

    fn height(&self) -> u32 {
        u32::MAX
    }

    fn bytes_per_row(&self) -> u32 {
        0xffff_fffc
    }

    fn lock(&mut self) -> bool {
        true
    }

    fn native_memory(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn unlock(&mut self) {}
}

fn shared(core: RecordingCore) -> Rc<RefCell<RecordingCore>> {
    Rc::new(RefCell::new(core))
}

fn create_error<D: Drawable>(core: &Rc<RefCell<RecordingCore>>, drawable: Option<D>) -> DriverError {
    match DriverContext::create(Rc::clone(core), drawable, DriverConfig::default()) {
        Ok(_) => panic!("context creation unexpectedly succeeded"),
        Err(err) => err,
    }
}

fn full(width: u32, height: u32) -> Rect {
    Rect { x: 0, y: 0, width, height }
}

#[test]
fn test_create_without_drawable() {
    let core = shared(RecordingCore::default());
    let err = create_error::<Bitmap>(&core, None);
    assert!(matches!(err, DriverError::InvalidArgument(_)));
    assert!(core.borrow().events.is_empty());
}

#[test]
fn test_create_rejects_foreign_formats() {
    let core = shared(RecordingCore::default());

    let deep = Bitmap::with_format(8, 8, 24, 24, PixelFormat::Rgb24);
    let err = create_error(&core, Some(deep));
    assert_eq!(err, DriverError::UnsupportedFormat { depth: 24, format: PixelFormat::Rgb24 });

    let mut planar = Bitmap::new(8, 8);
    planar.set_direct(false);
    assert_eq!(create_error(&core, Some(planar)), DriverError::NotDirect);

    let bgr = Bitmap::with_format(8, 8, 16, 16, PixelFormat::Bgr16Pc);
    assert!(create_error(&core, Some(bgr)).is_unsupported_format());

    assert!(core.borrow().events.is_empty());
    assert_eq!(core.borrow().inner.live_objects(), 0);
}

#[test]
fn test_create_order() {
    let core = shared(RecordingCore::default());
    let ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    ctx.destroy();

    let mut expected = vec![Event::CreateVisual, Event::CreateContext, Event::CreateFramebuffer];
    expected.extend(Subsystem::CREATE_ORDER.iter().map(|&s| Event::CreateSubsystem(s)));
    expected.push(Event::InstallDriver);
    assert_eq!(&core.borrow().events[..expected.len()], &expected[..]);
}

#[test]
fn test_failure_at_every_step_leaks_nothing() {
    let mut steps = vec![Step::Visual, Step::Context, Step::Framebuffer];
    steps.extend(Subsystem::CREATE_ORDER.iter().map(|&s| Step::Subsystem(s)));

    for &step in steps.iter() {
        // repeated failures must not accumulate anything either
        for _ in 0..3 {
            let core = shared(RecordingCore::failing_at(step));
            let err = create_error(&core, Some(Bitmap::new(16, 16)));
            assert!(matches!(err, DriverError::OutOfMemory(_)), "{:?}: {:?}", step, err);
            assert_eq!(core.borrow().inner.live_objects(), 0, "{:?} leaked", step);
            assert_eq!(core.borrow().count(|e| *e == Event::InstallDriver), 0);

            let created = core.borrow().count(|e| {
                matches!(
                    e,
                    Event::CreateVisual | Event::CreateContext | Event::CreateFramebuffer | Event::CreateSubsystem(_)
                )
            });
            let destroyed = core.borrow().count(|e| {
                matches!(
                    e,
                    Event::DestroyVisual | Event::DestroyContext | Event::DestroyFramebuffer | Event::DestroySubsystem(_)
                )
            });
            assert_eq!(created, destroyed, "{:?}", step);
        }
    }
}

#[test]
fn test_pixel_buffer_allocation_failure_releases_core_objects() {
    for _ in 0..3 {
        let core = shared(RecordingCore::default());
        let err = create_error(&core, Some(HugeDrawable { memory: Vec::new() }));
        assert!(matches!(err, DriverError::OutOfMemory(_)), "{:?}", err);
        assert_eq!(core.borrow().inner.live_objects(), 0);
        assert_eq!(core.borrow().count(|e| matches!(e, Event::DestroySubsystem(_))), 4);
        assert_eq!(core.borrow().count(|e| *e == Event::InstallDriver), 0);
    }
}

#[test]
fn test_destroy_release_order() {
    let core = shared(RecordingCore::default());
    let ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    ctx.core_mut().events.clear();
    ctx.destroy();

    let mut expected: Vec<Event> = Subsystem::CREATE_ORDER
        .iter()
        .rev()
        .map(|&s| Event::DestroySubsystem(s))
        .collect();
    expected.extend(vec![Event::DestroyContext, Event::DestroyVisual, Event::DestroyFramebuffer]);
    assert_eq!(core.borrow().events, expected);
    assert_eq!(core.borrow().inner.live_objects(), 0);
}

#[test]
fn test_drop_releases_like_destroy() {
    let core = shared(RecordingCore::default());
    {
        let _ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    }
    assert_eq!(core.borrow().inner.live_objects(), 0);
    assert_eq!(core.borrow().count(|e| *e == Event::DestroyContext), 1);
}

#[test]
fn test_hooks_installed() {
    let core = shared(RecordingCore::default());
    let ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    let id = ctx.context_id();
    assert_eq!(ctx.core().inner.hooks(id), Some(&DriverHooks::RGB16PC));
    assert_eq!(ctx.core().inner.subsystems(id).len(), 4);
    ctx.destroy();
    assert_eq!(core.borrow().inner.hooks(id), None);
}

#[test]
fn test_make_current_sizes_viewport_once() {
    let core = shared(RecordingCore::default());
    let mut ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(6, 4)), DriverConfig::default()).unwrap();
    let id = ctx.context_id();
    ctx.core_mut().events.clear();

    ctx.make_current();
    let mut expected: Vec<Event> = Subsystem::INVALIDATE_ORDER.iter().map(|&s| Event::Invalidate(s)).collect();
    expected.extend(vec![Event::MakeCurrent, Event::SetViewport(full(6, 4)), Event::SetScissor(6, 4)]);
    assert_eq!(ctx.core().events, expected);
    assert_eq!(ctx.core().inner.current(), Some((id, ctx.framebuffer_id())));
    assert_eq!(ctx.core().inner.scissor(id), Some((6, 4)));

    ctx.core_mut().events.clear();
    ctx.make_current();
    let mut expected: Vec<Event> = Subsystem::INVALIDATE_ORDER.iter().map(|&s| Event::Invalidate(s)).collect();
    expected.push(Event::MakeCurrent);
    assert_eq!(ctx.core().events, expected);
}

#[test]
fn test_update_state_fans_out_in_order() {
    let core = shared(RecordingCore::default());
    let mut ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    ctx.core_mut().events.clear();

    ctx.invalidate_state(StateFlags(0x40));
    let expected: Vec<Event> = Subsystem::INVALIDATE_ORDER.iter().map(|&s| Event::Invalidate(s)).collect();
    assert_eq!(ctx.core().events, expected);
    assert_eq!(ctx.core().inner.invalidation_count(ctx.context_id()), 4);
}

#[test]
fn test_renderer_string_and_buffer_size() {
    let core = shared(RecordingCore::default());
    let ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(10, 7)), DriverConfig::default()).unwrap();
    assert_eq!(ctx.renderer_string(StringName::Renderer), Some("Mesa RGB16PC"));
    assert_eq!(ctx.renderer_string(StringName::Vendor), None);
    assert_eq!(ctx.renderer_string(StringName::Extensions), None);
    assert_eq!(ctx.buffer_size(), (10, 7));
    drop(ctx);

    let config = DriverConfig { renderer_name: "Panel", ..DriverConfig::default() };
    let ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(2, 2)), config).unwrap();
    assert_eq!(ctx.renderer_string(StringName::Renderer), Some("Panel"));
}

#[test]
fn test_clear_color_fills_template_only_on_change() {
    let core = shared(RecordingCore::default());
    let mut ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();

    ctx.clear_color([0.0, 0.0, 0.0, 1.0]);
    assert_eq!(ctx.store().template_fills(), 0);

    ctx.clear_color([1.0, 0.5, 0.0, 1.0]);
    ctx.clear_color([1.0, 0.5, 0.0, 1.0]);
    // alpha is ignored and blue stays under one 5-bit step
    ctx.clear_color([1.0, 0.5, 0.01, 0.3]);
    assert_eq!(ctx.store().template_fills(), 1);

    // out-of-range channels clamp to the same word
    ctx.clear_color([2.0, 0.5, -1.0, 1.0]);
    assert_eq!(ctx.store().template_fills(), 1);
}

#[test]
fn test_full_clear_copies_template() {
    let core = shared(RecordingCore::default());
    let mut ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    ctx.clear_color([1.0, 0.0, 1.0, 1.0]);
    ctx.core_mut().events.clear();

    ctx.clear(BufferMask::FRONT_LEFT, true, full(4, 2));
    assert_eq!(ctx.store().back_buffer(), ctx.store().clear_buffer());
    assert!(ctx.core().events.is_empty());

    // ancillary buffers still go to the core, without the colour bit
    ctx.clear(BufferMask::FRONT_LEFT | BufferMask::DEPTH, true, full(4, 2));
    assert_eq!(ctx.core().events, vec![Event::SoftwareClear(BufferMask::DEPTH, true, full(4, 2))]);
}

#[test]
fn test_clear_color_reaches_the_core() {
    let core = shared(RecordingCore::default());
    let mut ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    let id = ctx.context_id();

    ctx.clear_color([1.0, 0.0, 1.0, 0.5]);
    assert_eq!(core.borrow().inner.clear_color(id), Some([255, 0, 255, 128]));
    // repeated colours skip the template but still keep the core in step
    ctx.clear_color([1.0, 0.0, 1.0, 1.0]);
    assert_eq!(core.borrow().inner.clear_color(id), Some([255, 0, 255, 255]));
    assert_eq!(ctx.store().template_fills(), 1);
}

#[test]
fn test_masked_clear_goes_through_the_core() {
    let core = shared(RecordingCore::default());
    let mut ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    let id = ctx.context_id();
    ctx.write_mono_rgba_span(0, 0, [0, 255, 0, 255], &[true; 4]);
    ctx.write_mono_rgba_span(0, 1, [0, 255, 0, 255], &[true; 4]);
    ctx.clear_color([1.0, 0.0, 1.0, 1.0]);

    let mut mask = ColorMask::ALL;
    mask.rgba[1] = false;
    core.borrow_mut().inner.set_color_mask(id, mask);
    core.borrow_mut().events.clear();

    ctx.clear(BufferMask::FRONT_LEFT, true, full(4, 2));
    assert_eq!(core.borrow().events, vec![Event::SoftwareClear(BufferMask::FRONT_LEFT, true, full(4, 2))]);
    assert_ne!(ctx.store().back_buffer(), ctx.store().clear_buffer());

    // red and blue take the clear colour, green keeps what was drawn
    let white = rgb16pc::pixel::encode(255, 255, 255).to_be_bytes();
    for px in ctx.store().back_buffer().chunks_exact(2) {
        assert_eq!(px, &white);
    }
}

#[test]
fn test_contexts_share_one_core() {
    let core = shared(RecordingCore::default());
    let mut a = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    let mut b = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(6, 4)), DriverConfig::default()).unwrap();
    assert_ne!(a.context_id(), b.context_id());
    assert_eq!(core.borrow().count(|e| *e == Event::InstallDriver), 2);

    let viewports = |core: &Rc<RefCell<RecordingCore>>| core.borrow().count(|e| matches!(e, Event::SetViewport(_)));

    a.make_current();
    assert_eq!(core.borrow().inner.current(), Some((a.context_id(), a.framebuffer_id())));
    b.make_current();
    assert_eq!(core.borrow().inner.current(), Some((b.context_id(), b.framebuffer_id())));
    assert_eq!(viewports(&core), 2);

    a.make_current();
    assert_eq!(core.borrow().inner.current(), Some((a.context_id(), a.framebuffer_id())));
    b.make_current();
    assert_eq!(viewports(&core), 2);
    assert_eq!(core.borrow().inner.scissor(a.context_id()), Some((4, 2)));
    assert_eq!(core.borrow().inner.scissor(b.context_id()), Some((6, 4)));

    // each context draws and presents on its own
    a.write_mono_rgba_span(0, 0, [255, 0, 0, 255], &[true; 4]);
    a.swap_buffers();
    assert!(b.drawable().pixels().iter().all(|&px| px == 0));

    a.destroy();
    assert_eq!(core.borrow().inner.hooks(b.context_id()), Some(&DriverHooks::RGB16PC));
    assert_eq!(core.borrow().inner.current(), Some((b.context_id(), b.framebuffer_id())));
    b.destroy();
    assert_eq!(core.borrow().inner.live_objects(), 0);
    assert_eq!(core.borrow().inner.swap_count(), 1);
}

#[test]
fn test_partial_clear_goes_through_the_core() {
    let core = shared(RecordingCore::default());
    let mut ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    ctx.clear_color([1.0, 1.0, 1.0, 1.0]);
    ctx.core_mut().events.clear();

    let region = Rect { x: 1, y: 0, width: 2, height: 1 };
    ctx.clear(BufferMask::FRONT_LEFT, false, region);
    assert_eq!(ctx.core().events, vec![Event::SoftwareClear(BufferMask::FRONT_LEFT, false, region)]);
    assert_eq!(ctx.core().inner.software_clear_count(), 1);
    assert!(ctx.store().back_buffer().iter().all(|&b| b == 0));
}

#[test]
fn test_spans_reach_the_back_buffer() {
    let core = shared(RecordingCore::default());
    let mut ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();

    ctx.write_rgb_span(0, 1, &[[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 255]], None);
    let mut out = [[0u8; 4]; 4];
    ctx.read_rgba_span(0, 1, &mut out);
    assert_eq!(
        out,
        [[0xf8, 0, 0, 0xff], [0, 0xfc, 0, 0xff], [0, 0, 0xf8, 0xff], [0xf8, 0xfc, 0xf8, 0xff]]
    );
    // logical row 1 is the top physical row
    assert_eq!(&ctx.store().back_buffer()[..2], &[0x00, 0xf8]);
}

#[test]
fn test_swap_skips_frame_when_lock_refused() {
    let core = shared(RecordingCore::default());
    let mut ctx = DriverContext::create(Rc::clone(&core), Some(Bitmap::new(4, 2)), DriverConfig::default()).unwrap();
    ctx.write_mono_rgba_span(0, 0, [255, 255, 255, 255], &[true; 4]);
    ctx.core_mut().events.clear();

    ctx.drawable_mut().set_fail_locks(true);
    ctx.swap_buffers();
    assert!(ctx.drawable().pixels().iter().all(|&b| b == 0));
    assert!(ctx.core().events.is_empty());
    assert_eq!(ctx.core().inner.swap_count(), 0);

    ctx.drawable_mut().set_fail_locks(false);
    ctx.swap_buffers();
    assert_eq!(ctx.drawable().pixels(), ctx.store().back_buffer());
    assert_eq!(ctx.core().events, vec![Event::Swap]);
    assert_eq!(ctx.core().inner.swap_count(), 1);
    assert_eq!((ctx.drawable().lock_count(), ctx.drawable().unlock_count()), (1, 1));
    assert!(!ctx.drawable().is_locked());
}
