//! A minimal host core: enough object bookkeeping and GL state to drive the
//! driver without a full 3-D pipeline.

use std::collections::HashMap;

use log::{trace, warn};

use crate::render_core::{
    BufferMask, ColorMask, ContextId, DriverHooks, FramebufferId, Rect, RenderingCore, StateFlags,
    Subsystem, VisualId,
};
use crate::framebuffer::SpanDriver;
use crate::visual::{Attachments, Visual};

#[derive(Debug)]
struct ContextState {
    visual: VisualId,
    subsystems: Vec<Subsystem>,
    hooks: Option<DriverHooks>,
    viewport: Rect,
    scissor: (u32, u32),
    color_mask: ColorMask,
    clear_color: [u8; 4],
    invalidations: u64,
}

#[derive(Debug, Default)]
pub struct SoftwareCore {
    next_id: u32,
    visuals: HashMap<VisualId, Visual>,
    framebuffers: HashMap<FramebufferId, (VisualId, Attachments)>,
    contexts: HashMap<ContextId, ContextState>,
    current: Option<(ContextId, FramebufferId)>,
    swaps: u64,
    software_clears: u64,
}

impl SoftwareCore {
    pub fn new() -> Self {
        SoftwareCore::default()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Visuals, contexts, framebuffers and subsystems not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.visuals.len()
            + self.framebuffers.len()
            + self.contexts.len()
            + self.contexts.values().map(|c| c.subsystems.len()).sum::<usize>()
    }

    pub fn current(&self) -> Option<(ContextId, FramebufferId)> {
        self.current
    }

    pub fn swap_count(&self) -> u64 {
        self.swaps
    }

    pub fn software_clear_count(&self) -> u64 {
        self.software_clears
    }

    pub fn hooks(&self, ctx: ContextId) -> Option<&DriverHooks> {
        self.contexts.get(&ctx).and_then(|c| c.hooks.as_ref())
    }

    pub fn subsystems(&self, ctx: ContextId) -> &[Subsystem] {
        self.contexts.get(&ctx).map_or(&[][..], |c| c.subsystems.as_slice())
    }

    pub fn invalidation_count(&self, ctx: ContextId) -> u64 {
        self.contexts.get(&ctx).map_or(0, |c| c.invalidations)
    }

    pub fn scissor(&self, ctx: ContextId) -> Option<(u32, u32)> {
        self.contexts.get(&ctx).map(|c| c.scissor)
    }

    pub fn set_color_mask(&mut self, ctx: ContextId, mask: ColorMask) {
        if let Some(state) = self.contexts.get_mut(&ctx) {
            state.color_mask = mask;
        }
    }

    pub fn clear_color(&self, ctx: ContextId) -> Option<[u8; 4]> {
        self.contexts.get(&ctx).map(|c| c.clear_color)
    }
}

impl RenderingCore for SoftwareCore {
    fn create_visual(&mut self, visual: &Visual) -> Option<VisualId> {
        let id = VisualId(self.next_id());
        self.visuals.insert(id, *visual);
        Some(id)
    }

    fn destroy_visual(&mut self, visual: VisualId) {
        if self.visuals.remove(&visual).is_none() {
            warn!(target: "rgb16pc::soft", "destroying unknown visual {:?}", visual);
        }
    }

    fn create_context(&mut self, visual: VisualId) -> Option<ContextId> {
        if !self.visuals.contains_key(&visual) {
            return None;
        }
        let id = ContextId(self.next_id());
        self.contexts.insert(
            id,
            ContextState {
                visual,
                subsystems: Vec::new(),
                hooks: None,
                viewport: Rect::default(),
                scissor: (0, 0),
                color_mask: ColorMask::ALL,
                clear_color: [0, 0, 0, 0],
                invalidations: 0,
            },
        );
        Some(id)
    }

    fn destroy_context(&mut self, ctx: ContextId) {
        match self.contexts.remove(&ctx) {
            Some(state) if !state.subsystems.is_empty() => {
                warn!(target: "rgb16pc::soft", "context {:?} destroyed with live {:?}", ctx, state.subsystems);
            }
            Some(_) => {}
            None => warn!(target: "rgb16pc::soft", "destroying unknown context {:?}", ctx),
        }
        if self.current.map_or(false, |(current, _)| current == ctx) {
            self.current = None;
        }
    }

    fn create_framebuffer(&mut self, visual: VisualId, attachments: Attachments) -> Option<FramebufferId> {
        if !self.visuals.contains_key(&visual) {
            return None;
        }
        let id = FramebufferId(self.next_id());
        self.framebuffers.insert(id, (visual, attachments));
        Some(id)
    }

    fn destroy_framebuffer(&mut self, fb: FramebufferId) {
        if self.framebuffers.remove(&fb).is_none() {
            warn!(target: "rgb16pc::soft", "destroying unknown framebuffer {:?}", fb);
        }
    }

    fn create_subsystem(&mut self, ctx: ContextId, subsystem: Subsystem) -> bool {
        match self.contexts.get_mut(&ctx) {
            Some(state) if !state.subsystems.contains(&subsystem) => {
                state.subsystems.push(subsystem);
                true
            }
            _ => false,
        }
    }

    fn destroy_subsystem(&mut self, ctx: ContextId, subsystem: Subsystem) {
        if let Some(state) = self.contexts.get_mut(&ctx) {
            state.subsystems.retain(|&s| s != subsystem);
        }
    }

    fn invalidate_state(&mut self, ctx: ContextId, subsystem: Subsystem, flags: StateFlags) {
        if let Some(state) = self.contexts.get_mut(&ctx) {
            trace!(target: "rgb16pc::soft", "{:?} invalidated {:?}", subsystem, flags);
            state.invalidations += 1;
        }
    }

    fn install_driver(&mut self, ctx: ContextId, hooks: &DriverHooks) {
        if let Some(state) = self.contexts.get_mut(&ctx) {
            state.hooks = Some(hooks.clone());
        }
    }

    fn make_current(&mut self, ctx: ContextId, fb: FramebufferId) {
        self.current = Some((ctx, fb));
    }

    fn viewport(&self, ctx: ContextId) -> Rect {
        self.contexts.get(&ctx).map(|c| c.viewport).unwrap_or_default()
    }

    fn set_viewport(&mut self, ctx: ContextId, viewport: Rect) {
        if let Some(state) = self.contexts.get_mut(&ctx) {
            state.viewport = viewport;
        }
    }

    fn set_scissor_size(&mut self, ctx: ContextId, width: u32, height: u32) {
        if let Some(state) = self.contexts.get_mut(&ctx) {
            state.scissor = (width, height);
        }
    }

    fn color_mask(&self, ctx: ContextId) -> ColorMask {
        self.contexts.get(&ctx).map(|c| c.color_mask).unwrap_or_default()
    }

    fn set_clear_color(&mut self, ctx: ContextId, rgba: [u8; 4]) {
        if let Some(state) = self.contexts.get_mut(&ctx) {
            state.clear_color = rgba;
        }
    }

    fn software_clear(&mut self, ctx: ContextId, mask: BufferMask, _all: bool, region: Rect, spans: &mut dyn SpanDriver) {
        let (channels, clear, visual) = match self.contexts.get(&ctx) {
            Some(state) => (state.color_mask.rgba, state.clear_color, state.visual),
            None => return,
        };
        self.software_clears += 1;

        if mask.contains(BufferMask::FRONT_LEFT) && region.width > 0 {
            let x = region.x.max(0) as u32;
            let y0 = region.y.max(0) as u32;
            let mut row = vec![[0u8; 4]; region.width as usize];

            for y in y0..y0 + region.height {
                spans.read_rgba_span(x, y, &mut row);
                for px in row.iter_mut() {
                    for ((dst, &src), &on) in px.iter_mut().zip(&clear).zip(&channels) {
                        if on {
                            *dst = src;
                        }
                    }
                }
                spans.write_rgba_span(x, y, &row, None);
            }
        }

        let mut rest = mask;
        rest.remove(BufferMask::FRONT_LEFT);
        if !rest.is_empty() {
            trace!(target: "rgb16pc::soft", "no ancillary storage for {:?} (visual {:?})", rest, visual);
        }
    }

    fn notify_swap_buffers(&mut self, ctx: ContextId) {
        trace!(target: "rgb16pc::soft", "swap on {:?}", ctx);
        self.swaps += 1;
    }
}
