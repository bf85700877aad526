//! Companion state-cache tracker (§4.14): dedupes `useProgram`/`bindVAO`/`bindTexture`
//! (unit 0)/`bindFramebuffer`/`setBlendMode`/stencil-enable calls so repeated draws with the
//! same bindings skip re-issuing them. External code that drives the raw `wgpu` handles
//! directly must call `invalidate_all` (or the matching `invalidate_*`) afterwards, since the
//! cache otherwise has no way to observe out-of-band state changes.

use crate::backend::BlendMode;
use crate::id::TextureId;

use super::pipelines::ProgramKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferTarget {
    Main,
    Offscreen(TextureId),
}

#[derive(Debug, Default)]
pub struct StateCache {
    program: Option<ProgramKind>,
    texture: Option<TextureId>,
    framebuffer: Option<FramebufferTarget>,
    blend_mode: Option<BlendMode>,
    stencil_enabled: Option<bool>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns `true` if the program actually changed (caller should bind it).
    pub fn set_program(&mut self, program: ProgramKind) -> bool {
        if self.program == Some(program) {
            false
        } else {
            self.program = Some(program);
            true
        }
    }

    pub fn set_texture(&mut self, texture: TextureId) -> bool {
        if self.texture == Some(texture) {
            false
        } else {
            self.texture = Some(texture);
            true
        }
    }

    pub fn set_framebuffer(&mut self, target: FramebufferTarget) -> bool {
        if self.framebuffer == Some(target) {
            false
        } else {
            self.framebuffer = Some(target);
            true
        }
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) -> bool {
        if self.blend_mode == Some(mode) {
            false
        } else {
            self.blend_mode = Some(mode);
            true
        }
    }

    pub fn set_stencil_enabled(&mut self, enabled: bool) -> bool {
        if self.stencil_enabled == Some(enabled) {
            false
        } else {
            self.stencil_enabled = Some(enabled);
            true
        }
    }

    pub fn invalidate_program(&mut self) {
        self.program = None;
    }

    pub fn invalidate_texture(&mut self) {
        self.texture = None;
    }

    pub fn invalidate_framebuffer(&mut self) {
        self.framebuffer = None;
    }

    pub fn invalidate_all(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TextureId;

    #[test]
    fn set_program_reports_change_only_on_the_first_call() {
        let mut cache = StateCache::new();
        assert!(cache.set_program(ProgramKind::Solid));
        assert!(!cache.set_program(ProgramKind::Solid));
        assert!(cache.set_program(ProgramKind::Stamp));
    }

    #[test]
    fn set_texture_dedupes_by_id() {
        let mut cache = StateCache::new();
        assert!(cache.set_texture(TextureId(1)));
        assert!(!cache.set_texture(TextureId(1)));
        assert!(cache.set_texture(TextureId(2)));
    }

    #[test]
    fn invalidate_program_forces_a_rebind() {
        let mut cache = StateCache::new();
        cache.set_program(ProgramKind::Circle);
        cache.invalidate_program();
        assert!(cache.set_program(ProgramKind::Circle));
    }

    #[test]
    fn invalidate_all_clears_every_tracked_field() {
        let mut cache = StateCache::new();
        cache.set_program(ProgramKind::Line);
        cache.set_texture(TextureId(7));
        cache.set_framebuffer(FramebufferTarget::Main);
        cache.set_blend_mode(BlendMode::Multiply);
        cache.set_stencil_enabled(true);

        cache.invalidate_all();

        assert!(cache.set_program(ProgramKind::Line));
        assert!(cache.set_texture(TextureId(7)));
        assert!(cache.set_framebuffer(FramebufferTarget::Main));
        assert!(cache.set_blend_mode(BlendMode::Multiply));
        assert!(cache.set_stencil_enabled(true));
    }

    #[test]
    fn set_framebuffer_distinguishes_main_from_offscreen() {
        let mut cache = StateCache::new();
        assert!(cache.set_framebuffer(FramebufferTarget::Main));
        assert!(cache.set_framebuffer(FramebufferTarget::Offscreen(TextureId(3))));
        assert!(!cache.set_framebuffer(FramebufferTarget::Offscreen(TextureId(3))));
    }
}
