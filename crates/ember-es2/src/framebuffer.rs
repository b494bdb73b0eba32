//! The framebuffer registry: `(color surface, depth surface)` → cached FBO.
//!
//! FBO creation is expensive on mobile drivers, so every pair is built once
//! and reused until one of its surfaces dies. The registry holds surface
//! *ids*, never the surfaces themselves: it must not extend surface
//! lifetime, and eviction is by id scan when a surface is released.

use ember_gl::{consts, GlEs2};
use hashbrown::HashMap;
use tracing::warn;

use crate::caps::DeviceCapabilities;
use crate::error::RhiError;
use crate::format::PixelFormat;
use crate::resources::{ResourceStores, Surface, SurfaceKind};

/// Packed `(color id, depth id)` pair; `0` means "no surface".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferKey(u64);

impl FramebufferKey {
    pub fn new(color_id: u32, depth_id: u32) -> Self {
        Self(u64::from(color_id) | (u64::from(depth_id) << 32))
    }

    fn color_id(self) -> u32 {
        self.0 as u32
    }

    fn depth_id(self) -> u32 {
        (self.0 >> 32) as u32
    }

    fn references(self, surface_id: u32) -> bool {
        self.color_id() == surface_id || self.depth_id() == surface_id
    }
}

#[derive(Debug, Default)]
pub struct FramebufferRegistry {
    framebuffers: HashMap<FramebufferKey, u32>,
}

impl FramebufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    /// Resolve the FBO for a surface pair, creating and caching it on first
    /// sight. Returns the driver FBO name (`0` for the default framebuffer).
    pub fn find_or_create(
        &mut self,
        gl: &dyn GlEs2,
        caps: &DeviceCapabilities,
        stores: &ResourceStores,
        color: Option<&Surface>,
        depth: Option<&Surface>,
    ) -> Result<u32, RhiError> {
        let key = FramebufferKey::new(
            color.map_or(0, Surface::unique_id),
            depth.map_or(0, Surface::unique_id),
        );
        if let Some(&fbo) = self.framebuffers.get(&key) {
            return Ok(fbo);
        }

        let fbo = create_framebuffer(gl, caps, stores, color, depth)?;
        self.framebuffers.insert(key, fbo);
        Ok(fbo)
    }

    /// Evict every entry whose key references `surface_id`.
    pub fn release_surface(&mut self, gl: &dyn GlEs2, surface_id: u32) {
        self.framebuffers.retain(|key, fbo| {
            if key.references(surface_id) {
                if *fbo != 0 {
                    gl.delete_framebuffer(*fbo);
                }
                false
            } else {
                true
            }
        });
    }

    /// Drop every cached FBO (suspend path); pairs rebuild lazily.
    pub fn clear_gpu_resources(&mut self, gl: &dyn GlEs2) {
        for (_, fbo) in self.framebuffers.drain() {
            if fbo != 0 {
                gl.delete_framebuffer(fbo);
            }
        }
    }
}

fn create_framebuffer(
    gl: &dyn GlEs2,
    caps: &DeviceCapabilities,
    stores: &ResourceStores,
    color: Option<&Surface>,
    depth: Option<&Surface>,
) -> Result<u32, RhiError> {
    // The default back buffer pairs only with the default depth buffer, and
    // both live in the driver-owned framebuffer 0.
    if let Some(surface) = color {
        if let SurfaceKind::DefaultColor { renderbuffer: 0 } = surface.kind {
            return Ok(0);
        }
    }

    let fbo = gl.gen_framebuffer();
    gl.bind_framebuffer(fbo);

    if let Some(surface) = color {
        match surface.kind {
            SurfaceKind::DefaultColor { renderbuffer } => {
                gl.framebuffer_renderbuffer(consts::COLOR_ATTACHMENT0, renderbuffer);
            }
            SurfaceKind::TextureColor { .. } => match stores.surface_texture_name(surface) {
                Some(texture) => gl.framebuffer_texture_2d(
                    consts::COLOR_ATTACHMENT0,
                    consts::TEXTURE_2D,
                    texture,
                    0,
                ),
                None => warn!(id = surface.unique_id(), "color surface lost its texture"),
            },
            _ => warn!(id = surface.unique_id(), "surface kind cannot attach as color"),
        }
    }

    if let Some(surface) = depth {
        match surface.kind {
            SurfaceKind::Placeholder => {}
            SurfaceKind::DefaultDepth { renderbuffer }
            | SurfaceKind::AllocatedDepth { renderbuffer } => {
                gl.framebuffer_renderbuffer(consts::DEPTH_ATTACHMENT, renderbuffer);
                if caps.supports_packed_depth_stencil {
                    gl.framebuffer_renderbuffer(consts::STENCIL_ATTACHMENT, renderbuffer);
                }
            }
            SurfaceKind::TextureDepth { texture } => {
                if let Some(texture_name) = stores.surface_texture_name(surface) {
                    gl.framebuffer_texture_2d(
                        consts::DEPTH_ATTACHMENT,
                        consts::TEXTURE_2D,
                        texture_name,
                        0,
                    );
                    // Shadow depth has no stencil component.
                    let has_stencil = stores
                        .texture(texture)
                        .is_some_and(|t| t.format != PixelFormat::ShadowDepth);
                    if has_stencil && caps.supports_packed_depth_stencil {
                        gl.framebuffer_texture_2d(
                            consts::STENCIL_ATTACHMENT,
                            consts::TEXTURE_2D,
                            texture_name,
                            0,
                        );
                    }
                }
            }
            _ => warn!(id = surface.unique_id(), "surface kind cannot attach as depth"),
        }
    }

    // Some drivers misreport valid combined depth/stencil attachments, so
    // the status check is skipped where the probe flagged it unreliable.
    if caps.reliable_framebuffer_status {
        let status = gl.check_framebuffer_status();
        if status != consts::FRAMEBUFFER_COMPLETE {
            warn!(status, "framebuffer incomplete; dropping FBO");
            gl.delete_framebuffer(fbo);
            return Err(RhiError::FramebufferIncomplete { status });
        }
    }

    Ok(fbo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormatTable;
    use crate::resources::TextureUsage;
    use ember_gl::{GlCall, TraceGl, TraceGlConfig};

    struct Fixture {
        gl: TraceGl,
        caps: DeviceCapabilities,
        stores: ResourceStores,
        registry: FramebufferRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_gl(TraceGl::new())
        }

        fn with_gl(gl: TraceGl) -> Self {
            let caps = DeviceCapabilities::probe(&gl);
            Self { gl, caps, stores: ResourceStores::new(), registry: FramebufferRegistry::new() }
        }

        fn color_surface(&mut self) -> crate::resources::SurfaceHandle {
            let formats = PixelFormatTable::build(&self.caps);
            let texture = self.stores.create_texture_2d(
                &self.gl,
                &formats,
                PixelFormat::Rgba8,
                64,
                64,
                1,
                TextureUsage::RENDER_TARGET,
                None,
            );
            self.stores
                .create_surface(SurfaceKind::TextureColor { texture }, 64, 64, 0, Some(texture))
        }
    }

    #[test]
    fn same_pair_reuses_the_fbo() {
        let mut fx = Fixture::new();
        let color = fx.color_surface();
        let surface = fx.stores.surface(color).unwrap();

        let first = fx
            .registry
            .find_or_create(&fx.gl, &fx.caps, &fx.stores, Some(surface), None)
            .unwrap();
        let again = fx
            .registry
            .find_or_create(&fx.gl, &fx.caps, &fx.stores, Some(surface), None)
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(fx.gl.count_where(|c| matches!(c, GlCall::GenFramebuffer(_))), 1);
        assert_eq!(fx.registry.len(), 1);
    }

    #[test]
    fn default_back_buffer_maps_to_fbo_zero() {
        let mut fx = Fixture::new();
        let handle = fx.stores.create_surface(
            SurfaceKind::DefaultColor { renderbuffer: 0 },
            320,
            240,
            0,
            None,
        );
        let surface = fx.stores.surface(handle).unwrap();
        let fbo = fx
            .registry
            .find_or_create(&fx.gl, &fx.caps, &fx.stores, Some(surface), None)
            .unwrap();
        assert_eq!(fbo, 0);
        assert_eq!(fx.gl.count_where(|c| matches!(c, GlCall::GenFramebuffer(_))), 0);
    }

    #[test]
    fn releasing_a_surface_evicts_matching_entries() {
        let mut fx = Fixture::new();
        let color = fx.color_surface();
        let other = fx.color_surface();
        let color_id = fx.stores.surface(color).unwrap().unique_id();
        {
            let a = fx.stores.surface(color).unwrap();
            let b = fx.stores.surface(other).unwrap();
            fx.registry.find_or_create(&fx.gl, &fx.caps, &fx.stores, Some(a), None).unwrap();
            fx.registry.find_or_create(&fx.gl, &fx.caps, &fx.stores, Some(b), None).unwrap();
        }
        assert_eq!(fx.registry.len(), 2);

        fx.registry.release_surface(&fx.gl, color_id);
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(fx.gl.count_where(|c| matches!(c, GlCall::DeleteFramebuffer(_))), 1);
    }

    #[test]
    fn incomplete_framebuffer_is_freed_and_reported() {
        let mut fx = Fixture::new();
        fx.gl.set_framebuffer_status(consts::FRAMEBUFFER_UNSUPPORTED);
        let color = fx.color_surface();
        let surface = fx.stores.surface(color).unwrap();
        let result = fx.registry.find_or_create(&fx.gl, &fx.caps, &fx.stores, Some(surface), None);
        assert!(matches!(result, Err(RhiError::FramebufferIncomplete { .. })));
        assert!(fx.registry.is_empty());
        assert_eq!(fx.gl.count_where(|c| matches!(c, GlCall::DeleteFramebuffer(_))), 1);
    }

    #[test]
    fn denylisted_drivers_skip_the_status_check() {
        let gl = TraceGl::with_config(TraceGlConfig {
            vendor: "Qualcomm".to_owned(),
            ..TraceGlConfig::default()
        });
        gl.set_framebuffer_status(consts::FRAMEBUFFER_UNSUPPORTED);
        let mut fx = Fixture::with_gl(gl);
        let color = fx.color_surface();
        let surface = fx.stores.surface(color).unwrap();
        // The broken status must be ignored and the FBO kept.
        let fbo = fx
            .registry
            .find_or_create(&fx.gl, &fx.caps, &fx.stores, Some(surface), None)
            .unwrap();
        assert_ne!(fbo, 0);
        assert_eq!(fx.gl.count_where(|c| matches!(c, GlCall::CheckFramebufferStatus)), 0);
    }

    #[test]
    fn placeholder_depth_never_attaches() {
        let mut fx = Fixture::new();
        let color = fx.color_surface();
        let depth_handle = fx.stores.create_surface(SurfaceKind::Placeholder, 64, 64, 0, None);
        let (color_s, depth_s) = (
            fx.stores.surface(color).unwrap(),
            fx.stores.surface(depth_handle).unwrap(),
        );
        fx.registry
            .find_or_create(&fx.gl, &fx.caps, &fx.stores, Some(color_s), Some(depth_s))
            .unwrap();
        let depth_attaches = fx.gl.count_where(|c| {
            matches!(
                c,
                GlCall::FramebufferTexture2d { attachment, .. }
                | GlCall::FramebufferRenderbuffer { attachment, .. }
                    if *attachment == consts::DEPTH_ATTACHMENT
            )
        });
        assert_eq!(depth_attaches, 0);
    }
}
