//! The RHI core: lifecycle, viewports, context/thread handoff, and the
//! engine-facing draw façade.
//!
//! Every public method here follows the recovery contract of the engine's
//! command stream: callers always see success; failures are absorbed
//! locally, logged, and surfaced through [`RhiStats`] counters. All methods
//! must run on the thread that currently holds context ownership
//! ([`Es2Rhi::acquire_thread_ownership`] / `release_thread_ownership` move
//! it explicitly).

use std::rc::Rc;
use std::sync::Arc;

use ember_gl::{consts, GlEs2};
use ember_platform::{HostThreadHooks, WindowHooks};
use tracing::{debug, info, warn};

use crate::caps::DeviceCapabilities;
use crate::config::SystemSettings;
use crate::format::{PixelFormat, PixelFormatTable};
use crate::framebuffer::FramebufferRegistry;
use crate::key::{KeyError, ProgramKey};
use crate::material::{
    AlphaValueSource, BlendMode, ColorGradingParams, GlobalShaderKind, HeightFogParams,
    MaterialPixelParams, MaterialVertexParams, MeshPixelParams, MeshVertexParams, PrimitiveType,
};
use crate::program::parse_key_index;
use crate::query::{OcclusionQueryHandle, OcclusionQueryPool};
use crate::render_manager::{CachedUpDraw, RenderManager, Topology};
use crate::resources::{
    IndexBufferHandle, ResourceStores, SurfaceHandle, SurfaceKind, TextureHandle, TextureUsage,
    VertexBufferHandle,
};
use crate::shader_manager::ShaderManager;
use crate::state::{
    BlendStateDesc, ColorWriteMask, CompareFunc, DepthStateDesc, RasterizerStateDesc,
    SamplerFilter, SamplerStateDesc, StateShadow,
};
use crate::stats::RhiStats;
use crate::vertex::VertexDeclaration;

/// Context/rendering lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No viewport has ever existed (or the last one was destroyed); all
    /// operations are no-ops.
    Uninitialized,
    /// Core initialized, waiting for the first viewport.
    NoViewport,
    /// A viewport is current on this thread; GL calls may be issued.
    Current,
    /// Context released from this thread.
    NotCurrent,
    /// Platform suspension: no GL call may be issued until resume.
    Suspended,
}

bitflags::bitflags! {
    /// Render buffer contents that may be discarded after this point.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DiscardBuffers: u8 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportId(u32);

#[derive(Debug)]
struct Viewport {
    id: ViewportId,
    native_handle: usize,
    width: u32,
    height: u32,
    fullscreen: bool,
    back_buffer: SurfaceHandle,
    depth_buffer: Option<SurfaceHandle>,
}

pub struct Es2Rhi {
    gl: Rc<dyn GlEs2>,
    window: Rc<dyn WindowHooks>,
    threads: Rc<dyn HostThreadHooks>,
    settings: SystemSettings,
    stats: Arc<RhiStats>,

    lifecycle: Lifecycle,
    caps: Option<DeviceCapabilities>,
    formats: PixelFormatTable,
    shadow: StateShadow,
    stores: ResourceStores,
    framebuffers: FramebufferRegistry,
    shader_manager: Option<ShaderManager>,
    render_manager: RenderManager,
    queries: Option<OcclusionQueryPool>,

    viewports: Vec<Viewport>,
    current_viewport: Option<ViewportId>,
    next_viewport_id: u32,

    current_color_target: Option<SurfaceHandle>,
    current_depth_target: Option<SurfaceHandle>,

    /// Keys parsed from the on-disk preprocessed index, consumed by the
    /// first viewport creation to warm the cache.
    pending_warm_keys: Vec<ProgramKey>,
}

impl Es2Rhi {
    /// Initialize the core. Driver probing is deferred to the first
    /// viewport, when a context is guaranteed current.
    pub fn new(
        gl: Rc<dyn GlEs2>,
        window: Rc<dyn WindowHooks>,
        threads: Rc<dyn HostThreadHooks>,
        settings: SystemSettings,
    ) -> Self {
        let stats = Arc::new(RhiStats::new());
        let shadow = StateShadow::new(Arc::clone(&stats));
        let render_manager =
            RenderManager::new(settings.vertex_scratch_bytes, settings.index_scratch_bytes);
        Self {
            gl,
            window,
            threads,
            settings,
            stats,
            lifecycle: Lifecycle::NoViewport,
            caps: None,
            formats: PixelFormatTable::unprobed(),
            shadow,
            stores: ResourceStores::new(),
            framebuffers: FramebufferRegistry::new(),
            shader_manager: None,
            render_manager,
            queries: None,
            viewports: Vec::new(),
            current_viewport: None,
            next_viewport_id: 0,
            current_color_target: None,
            current_depth_target: None,
            pending_warm_keys: Vec::new(),
        }
    }

    pub fn stats(&self) -> &RhiStats {
        &self.stats
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn device_capabilities(&self) -> Option<&DeviceCapabilities> {
        self.caps.as_ref()
    }

    pub fn pixel_formats(&self) -> &PixelFormatTable {
        &self.formats
    }

    /// Load the serialized preprocessed-key index; the cache warms from it
    /// when the first viewport comes up.
    pub fn load_preprocessed_key_index(&mut self, text: &str) -> Result<usize, KeyError> {
        let keys = parse_key_index(text)?;
        let count = keys.len();
        self.pending_warm_keys = keys;
        Ok(count)
    }

    pub fn missing_program_keys(&self) -> Vec<ProgramKey> {
        self.shader_manager
            .as_ref()
            .map(|sm| sm.cache().missing_keys().to_vec())
            .unwrap_or_default()
    }

    pub fn log_missing_program_keys(&self) {
        if let Some(sm) = &self.shader_manager {
            sm.cache().log_missing_keys();
        }
    }

    fn can_issue_gl(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Current)
    }

    // =================================================================
    // Lifecycle
    // =================================================================

    pub fn create_viewport(
        &mut self,
        native_handle: usize,
        width: u32,
        height: u32,
        fullscreen: bool,
    ) -> ViewportId {
        let surfaces = self.window.initialize_viewport(native_handle, width, height);

        let first_viewport = self.caps.is_none();
        if first_viewport {
            self.window.make_current();
            self.lifecycle = Lifecycle::Current;
            self.probe_device();
        } else {
            self.make_current_internal(None);
        }

        let back_buffer = self.stores.create_surface(
            SurfaceKind::DefaultColor { renderbuffer: surfaces.back_buffer },
            width,
            height,
            0,
            None,
        );

        // A depth surface must be allocated when the platform hands out an
        // explicit back buffer without one. Only the primary viewport gets
        // a real allocation; secondary viewports (UI/HUD) receive
        // placeholders and share the default depth.
        let depth_buffer = if let Some(renderbuffer) = surfaces.depth_buffer {
            Some(self.stores.create_surface(
                SurfaceKind::DefaultDepth { renderbuffer },
                width,
                height,
                0,
                None,
            ))
        } else if width == 0 || height == 0 {
            // Zero-sized viewports create no attachments but still succeed.
            None
        } else if surfaces.back_buffer == 0 {
            // Rendering into the driver's framebuffer 0, which carries its
            // own depth from the EGL config; wrap it without allocating.
            Some(self.stores.create_surface(
                SurfaceKind::DefaultDepth { renderbuffer: 0 },
                width,
                height,
                0,
                None,
            ))
        } else if self.viewports.is_empty() {
            Some(self.create_primary_depth_surface(width, height))
        } else {
            Some(self.stores.create_surface(SurfaceKind::Placeholder, width, height, 0, None))
        };

        self.next_viewport_id += 1;
        let id = ViewportId(self.next_viewport_id);
        info!(?id, width, height, fullscreen, "viewport created");
        self.viewports.push(Viewport {
            id,
            native_handle,
            width,
            height,
            fullscreen,
            back_buffer,
            depth_buffer,
        });
        self.current_viewport = Some(id);

        self.set_render_target(Some(back_buffer), depth_buffer);
        id
    }

    fn create_primary_depth_surface(&mut self, width: u32, height: u32) -> SurfaceHandle {
        let caps = self.caps.as_ref().expect("probed before surfaces");
        if caps.supports_depth_textures {
            let texture = self.stores.create_texture_2d(
                self.gl.as_ref(),
                &self.formats,
                PixelFormat::DepthStencil,
                width,
                height,
                1,
                TextureUsage::DEPTH_STENCIL,
                None,
            );
            self.stores.create_surface(
                SurfaceKind::TextureDepth { texture },
                width,
                height,
                0,
                Some(texture),
            )
        } else {
            let renderbuffer = self.gl.gen_renderbuffer();
            self.gl.bind_renderbuffer(renderbuffer);
            self.gl.renderbuffer_storage(
                self.formats.depth_renderbuffer_format(),
                width as i32,
                height as i32,
            );
            self.stores.create_surface(
                SurfaceKind::AllocatedDepth { renderbuffer },
                width,
                height,
                0,
                None,
            )
        }
    }

    /// One-time device probing plus manager construction; runs under the
    /// first viewport's context.
    fn probe_device(&mut self) {
        let gl = Rc::clone(&self.gl);
        let caps = DeviceCapabilities::probe(gl.as_ref());
        self.formats = PixelFormatTable::build(&caps);

        self.settings.max_anisotropy = self.settings.max_anisotropy.min(caps.max_anisotropy);

        let mut shader_manager = ShaderManager::new(self.settings.clone(), caps.clone());
        self.render_manager.init_gpu_resources(gl.as_ref());
        self.queries = Some(OcclusionQueryPool::new(caps.supports_occlusion_queries));

        gl.enable(consts::DEPTH_TEST);
        // Start error polling from a clean slate.
        let _ = gl.get_error();

        if !self.pending_warm_keys.is_empty() {
            let keys = std::mem::take(&mut self.pending_warm_keys);
            shader_manager.warm_shader_cache(gl.as_ref(), &keys, &self.stats);
        }

        self.caps = Some(caps);
        self.shader_manager = Some(shader_manager);
    }

    pub fn destroy_viewport(&mut self, id: ViewportId) {
        let Some(index) = self.viewports.iter().position(|v| v.id == id) else {
            return;
        };
        let viewport = self.viewports.remove(index);
        self.window.destroy_viewport(viewport.native_handle);

        let gl = Rc::clone(&self.gl);
        for surface in [Some(viewport.back_buffer), viewport.depth_buffer].into_iter().flatten() {
            if let Some(unique_id) = self.stores.surface(surface).map(|s| s.unique_id()) {
                self.framebuffers.release_surface(gl.as_ref(), unique_id);
            }
            self.stores.destroy_surface(gl.as_ref(), surface);
        }

        if self.current_viewport == Some(id) {
            self.window.unmake_current();
            self.current_viewport = None;
            self.lifecycle = Lifecycle::NotCurrent;
        }

        if self.viewports.is_empty() {
            // Last viewport gone: release every driver object.
            if let Some(sm) = &mut self.shader_manager {
                sm.clear_shader_program_instances(gl.as_ref());
            }
            self.render_manager.clear_gpu_resources(gl.as_ref());
            self.framebuffers.clear_gpu_resources(gl.as_ref());
            self.stores.release_gpu_resources(gl.as_ref());
            if let Some(queries) = &mut self.queries {
                queries.release_gpu_resources(gl.as_ref());
            }
            self.shadow.invalidate();
            self.lifecycle = Lifecycle::Uninitialized;
            info!("last viewport destroyed; renderer uninitialized");
        }
    }

    pub fn resize_viewport(&mut self, id: ViewportId, width: u32, height: u32, fullscreen: bool) {
        if let Some(viewport) = self.viewports.iter_mut().find(|v| v.id == id) {
            viewport.width = width;
            viewport.height = height;
            viewport.fullscreen = fullscreen;
        }
    }

    pub fn viewport_ids(&self) -> Vec<ViewportId> {
        self.viewports.iter().map(|v| v.id).collect()
    }

    pub fn viewport_extent(&self, id: ViewportId) -> Option<(u32, u32, bool)> {
        self.viewports
            .iter()
            .find(|v| v.id == id)
            .map(|v| (v.width, v.height, v.fullscreen))
    }

    pub fn get_viewport_back_buffer(&self, id: ViewportId) -> Option<SurfaceHandle> {
        self.viewports.iter().find(|v| v.id == id).map(|v| v.back_buffer)
    }

    pub fn get_viewport_depth_buffer(&self, id: ViewportId) -> Option<SurfaceHandle> {
        self.viewports.iter().find(|v| v.id == id).and_then(|v| v.depth_buffer)
    }

    fn make_current_internal(&mut self, id: Option<ViewportId>) {
        let target = id.or(self.current_viewport).or_else(|| self.viewports.first().map(|v| v.id));
        if self.lifecycle == Lifecycle::Current && self.current_viewport == target {
            return;
        }
        if !self.window.make_current() {
            warn!("platform rejected make_current");
            return;
        }
        self.lifecycle = Lifecycle::Current;
        if let Some(viewport) = target.and_then(|t| self.viewports.iter().find(|v| v.id == t)) {
            let (back, depth) = (viewport.back_buffer, viewport.depth_buffer);
            self.current_viewport = Some(viewport.id);
            self.set_render_target(Some(back), depth);
        }
    }

    /// Only one viewport may be current at a time per process.
    pub fn make_current(&mut self, id: ViewportId) {
        if self.lifecycle == Lifecycle::Suspended {
            return;
        }
        self.make_current_internal(Some(id));
    }

    pub fn unmake_current(&mut self) {
        if self.lifecycle != Lifecycle::Current {
            return;
        }
        self.window.unmake_current();
        self.lifecycle = Lifecycle::NotCurrent;
    }

    /// Present the default surface. Depth/stencil are discarded first on
    /// tiled renderers so the driver skips the resolve-out.
    pub fn swap_buffers(&mut self) {
        if !self.can_issue_gl() {
            return;
        }
        let tiled = self.caps.as_ref().is_some_and(|caps| caps.tiled_renderer);
        if tiled {
            self.discard_render_buffers(DiscardBuffers::DEPTH | DiscardBuffers::STENCIL);
        }
        self.window.swap_buffers();
        self.stats.inc_presents();
    }

    /// Register this thread with the host runtime (if needed) and take the
    /// GL context. Call from a render thread distinct from the game thread.
    pub fn acquire_thread_ownership(&mut self) {
        self.threads.register_render_thread();
        self.make_current_internal(None);
    }

    pub fn release_thread_ownership(&mut self) {
        self.unmake_current();
        self.threads.unregister_render_thread();
    }

    /// Platform suspension: flush the GPU, then release every driver
    /// object. No GL may be issued until [`resume_rendering`](Self::resume_rendering).
    pub fn suspend_rendering(&mut self) {
        if self.lifecycle == Lifecycle::Suspended || self.caps.is_none() {
            return;
        }
        info!("suspending rendering");
        let gl = Rc::clone(&self.gl);
        gl.finish();

        if let Some(sm) = &mut self.shader_manager {
            sm.clear_gpu_resources(gl.as_ref());
        }
        self.render_manager.clear_gpu_resources(gl.as_ref());
        self.framebuffers.clear_gpu_resources(gl.as_ref());
        self.stores.release_gpu_resources(gl.as_ref());
        if let Some(queries) = &mut self.queries {
            queries.release_gpu_resources(gl.as_ref());
        }
        self.shadow.invalidate();
        self.window.unmake_current();
        self.lifecycle = Lifecycle::Suspended;
        self.stats.inc_suspends();
    }

    /// Resume after suspension: re-acquire the context, rebuild every
    /// driver object (global resources first, then per-object data), and
    /// force a full shader recompile if the surface was recreated.
    pub fn resume_rendering(&mut self) {
        if self.lifecycle != Lifecycle::Suspended {
            return;
        }
        info!("resuming rendering");
        let gl = Rc::clone(&self.gl);
        self.window.make_current();
        self.lifecycle = Lifecycle::Current;

        self.render_manager.init_gpu_resources(gl.as_ref());
        self.stores.reinit_gpu_resources(gl.as_ref(), &self.formats);

        if self.window.take_surface_recreated() {
            // The EGL surface changed identity while we were gone; cached
            // program binaries may be tied to the old one.
            if let Some(sm) = &mut self.shader_manager {
                sm.clear_shader_program_instances(gl.as_ref());
            }
        }

        self.shadow.invalidate();
        self.stats.inc_resumes();

        let current = self.current_viewport;
        self.current_viewport = None;
        self.make_current_internal(current);
    }

    /// Per-frame bookkeeping: ring the null-color VBO and stop trusting
    /// recycled texture/buffer names.
    pub fn begin_scene(&mut self) {
        if !self.can_issue_gl() {
            return;
        }
        self.shadow.new_frame();
        self.render_manager.new_frame();
    }

    pub fn end_scene(&mut self) {}

    /// Force-finish the GPU. A suspension point: callers park here before
    /// lifecycle transitions that assume the pipeline is drained.
    pub fn block_until_gpu_idle(&mut self) {
        if self.can_issue_gl() {
            self.gl.finish();
        }
    }

    // =================================================================
    // Render targets and fixed-function state
    // =================================================================

    pub fn set_render_target(&mut self, color: Option<SurfaceHandle>, depth: Option<SurfaceHandle>) {
        if !self.can_issue_gl() {
            return;
        }
        let gl = Rc::clone(&self.gl);

        if let Some(surface) = color.and_then(|h| self.stores.surface(h)) {
            self.shadow.render_target_width = surface.width;
            self.shadow.render_target_height = surface.height;
        }

        let color_id = color
            .and_then(|h| self.stores.surface(h))
            .map_or(-1, |s| i64::from(s.unique_id()));
        let mut depth_id = depth
            .and_then(|h| self.stores.surface(h))
            .map_or(-1, |s| i64::from(s.unique_id()));
        let mut depth = depth;

        // Re-binding the same color target with a NULL depth buffer keeps
        // the previous depth attachment to avoid a buffer flush/restore, as
        // long as the sizes agree.
        self.shadow.using_dummy_depth = false;
        if depth.is_none() && color_id == self.shadow.render_target_id {
            if let Some(previous_depth) = self.current_depth_target {
                let same_size = match (
                    color.and_then(|h| self.stores.surface(h)),
                    self.stores.surface(previous_depth),
                ) {
                    (Some(c), Some(d)) => c.width == d.width && c.height == d.height,
                    _ => false,
                };
                if same_size {
                    depth = Some(previous_depth);
                    depth_id = self.shadow.depth_target_id;
                    self.shadow.using_dummy_depth = true;
                }
            }
        }

        if color_id == self.shadow.render_target_id && depth_id == self.shadow.depth_target_id {
            return;
        }
        self.shadow.render_target_id = color_id;
        self.shadow.depth_target_id = depth_id;
        self.current_color_target = color;
        self.current_depth_target = depth;

        let (Some(caps), Some(color_handle)) = (&self.caps, color) else {
            // Unbinding everything: fall back to the default framebuffer.
            gl.bind_framebuffer(0);
            return;
        };

        let color_surface = self.stores.surface(color_handle);
        let depth_surface = depth.and_then(|h| self.stores.surface(h));
        let has_depth =
            depth_surface.is_some_and(|s| !s.is_placeholder()) || color_surface.is_some_and(|s| s.is_default_color());
        self.shadow.depth_attachment_present = has_depth;

        match self.framebuffers.find_or_create(
            gl.as_ref(),
            caps,
            &self.stores,
            color_surface,
            depth_surface,
        ) {
            Ok(fbo) => {
                gl.bind_framebuffer(fbo);
                // The engine expects SetRenderTarget to reset the viewport.
                let (width, height) =
                    (self.shadow.render_target_width, self.shadow.render_target_height);
                gl.viewport(0, 0, width as i32, height as i32);
            }
            Err(err) => {
                warn!(%err, "set_render_target failed; draw will be skipped");
            }
        }
    }

    /// Engine viewport rect, top-left origin; flipped to GL's bottom-left
    /// unless rendering into a resolve texture.
    pub fn set_viewport(&mut self, min_x: u32, min_y: u32, min_z: f32, max_x: u32, max_y: u32, max_z: f32) {
        if !self.can_issue_gl() {
            return;
        }
        let width = max_x.saturating_sub(min_x);
        let height = max_y.saturating_sub(min_y);
        let render_to_texture = self
            .current_color_target
            .and_then(|h| self.stores.surface(h))
            .is_some_and(|s| !s.is_default_color());
        let y = if render_to_texture {
            min_y
        } else {
            self.shadow.render_target_height.saturating_sub(max_y)
        };
        self.gl.viewport(min_x as i32, y as i32, width as i32, height as i32);
        self.gl.depth_range(min_z, max_z);
    }

    pub fn set_scissor_rect(&mut self, enabled: bool, min_x: u32, min_y: u32, max_x: u32, max_y: u32) {
        if !self.can_issue_gl() {
            return;
        }
        let height = max_y.saturating_sub(min_y);
        let flipped_y = self.shadow.render_target_height.saturating_sub(max_y);
        let gl = Rc::clone(&self.gl);
        self.shadow.set_scissor(
            gl.as_ref(),
            enabled,
            (min_x as i32, flipped_y as i32, max_x.saturating_sub(min_x) as i32, height as i32),
        );
    }

    pub fn set_rasterizer_state(&mut self, desc: RasterizerStateDesc) {
        if !self.can_issue_gl() {
            return;
        }
        let gl = Rc::clone(&self.gl);
        self.shadow.set_rasterizer(gl.as_ref(), desc);
    }

    pub fn set_depth_state(&mut self, desc: DepthStateDesc) {
        if !self.can_issue_gl() {
            return;
        }
        let gl = Rc::clone(&self.gl);
        self.shadow.set_depth(gl.as_ref(), desc);
    }

    pub fn set_blend_state(&mut self, desc: BlendStateDesc) {
        if !self.can_issue_gl() {
            return;
        }
        let gl = Rc::clone(&self.gl);
        self.shadow.set_blend(gl.as_ref(), desc);
        if let Some(sm) = &mut self.shader_manager {
            sm.set_alpha_test(desc.alpha_test != CompareFunc::Always, desc.alpha_ref);
        }
    }

    pub fn set_color_write_mask(&mut self, mask: ColorWriteMask) {
        if !self.can_issue_gl() {
            return;
        }
        let gl = Rc::clone(&self.gl);
        self.shadow.set_color_write_mask(gl.as_ref(), mask);
    }

    /// Bind `texture` to `unit` with sampler parameters, maintaining the
    /// lightmap latch and the per-unit format mask.
    pub fn set_sampler_state(
        &mut self,
        unit: u32,
        texture: TextureHandle,
        sampler: SamplerStateDesc,
    ) {
        if !self.can_issue_gl() {
            return;
        }
        let gl = Rc::clone(&self.gl);
        let Some(info) = self.stores.texture(texture).map(|t| {
            (t.driver_name(), t.format, t.mip_count, t.usage, t.last_sampler)
        }) else {
            return;
        };
        let (name, format, mip_count, usage, last_sampler) = info;

        let bound = self.shadow.set_active_and_bound_texture(
            gl.as_ref(),
            unit,
            name,
            consts::TEXTURE_2D,
            Some(format),
        );

        if let Some(sm) = &mut self.shader_manager {
            sm.notify_sampler_bind(
                usage.contains(TextureUsage::LIGHTMAP),
                usage.contains(TextureUsage::DIRECTIONAL_LIGHTMAP),
            );
        }

        if bound && last_sampler != Some(sampler) {
            let min_filter = match (sampler.filter, mip_count > 1) {
                (SamplerFilter::Point, false) => consts::NEAREST,
                (SamplerFilter::Point, true) => consts::NEAREST_MIPMAP_NEAREST,
                (_, false) => consts::LINEAR,
                (SamplerFilter::Linear, true) => consts::LINEAR_MIPMAP_NEAREST,
                (_, true) => consts::LINEAR_MIPMAP_LINEAR,
            };
            let mag_filter = if sampler.filter == SamplerFilter::Point {
                consts::NEAREST
            } else {
                consts::LINEAR
            };
            gl.tex_parameter_i(consts::TEXTURE_2D, consts::TEXTURE_MIN_FILTER, min_filter as i32);
            gl.tex_parameter_i(consts::TEXTURE_2D, consts::TEXTURE_MAG_FILTER, mag_filter as i32);
            gl.tex_parameter_i(
                consts::TEXTURE_2D,
                consts::TEXTURE_WRAP_S,
                sampler.address_u.to_gl() as i32,
            );
            gl.tex_parameter_i(
                consts::TEXTURE_2D,
                consts::TEXTURE_WRAP_T,
                sampler.address_v.to_gl() as i32,
            );
            if sampler.filter == SamplerFilter::Anisotropic && self.settings.max_anisotropy > 1 {
                gl.tex_parameter_f(
                    consts::TEXTURE_2D,
                    consts::TEXTURE_MAX_ANISOTROPY_EXT,
                    self.settings.max_anisotropy as f32,
                );
            }
            if let Some(t) = self.stores.texture_mut(texture) {
                t.last_sampler = Some(sampler);
            }
        }
    }

    /// Hint that buffer contents are dead. Must be a no-op (zero driver
    /// calls) when the device lacks the discard extension.
    pub fn discard_render_buffers(&mut self, buffers: DiscardBuffers) {
        if !self.can_issue_gl() {
            return;
        }
        let Some(caps) = &self.caps else {
            return;
        };
        if !caps.supports_discard {
            return;
        }
        let mut attachments = Vec::with_capacity(3);
        if buffers.contains(DiscardBuffers::COLOR) {
            attachments.push(consts::COLOR_ATTACHMENT0);
        }
        if buffers.contains(DiscardBuffers::DEPTH) {
            attachments.push(consts::DEPTH_ATTACHMENT);
        }
        if buffers.contains(DiscardBuffers::STENCIL) {
            attachments.push(consts::STENCIL_ATTACHMENT);
        }
        if !attachments.is_empty() {
            self.gl.discard_framebuffer(&attachments);
        }
    }

    // =================================================================
    // Resources
    // =================================================================

    pub fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        mip_count: u32,
        usage: TextureUsage,
        initial_data: Option<&[u8]>,
    ) -> TextureHandle {
        let gl = Rc::clone(&self.gl);
        // Creation binds the new texture on the active unit directly.
        self.shadow.invalidate_texture_bindings();
        self.stores.create_texture_2d(
            gl.as_ref(),
            &self.formats,
            format,
            width,
            height,
            mip_count,
            usage,
            initial_data,
        )
    }

    /// Shared-memory textures have no special backing on this driver; the
    /// host hands us the bytes and we own an ordinary driver texture.
    pub fn create_shared_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        mip_count: u32,
        shared_data: &[u8],
    ) -> TextureHandle {
        self.create_texture_2d(
            width,
            height,
            format,
            mip_count,
            TextureUsage::empty(),
            Some(shared_data),
        )
    }

    pub fn destroy_texture(&mut self, handle: TextureHandle) {
        let gl = Rc::clone(&self.gl);
        self.stores.destroy_texture(gl.as_ref(), handle);
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&crate::resources::Texture2d> {
        self.stores.texture(handle)
    }

    pub fn lock_texture(&mut self, handle: TextureHandle) -> Option<&mut [u8]> {
        self.stores.lock_texture(handle)
    }

    pub fn unlock_texture(&mut self, handle: TextureHandle) {
        let gl = Rc::clone(&self.gl);
        self.shadow.invalidate_texture_bindings();
        self.stores.unlock_texture(gl.as_ref(), &self.formats, handle);
    }

    pub fn create_vertex_buffer(
        &mut self,
        size: usize,
        initial_data: Option<&[u8]>,
        dynamic: bool,
    ) -> VertexBufferHandle {
        let gl = Rc::clone(&self.gl);
        self.shadow.invalidate_buffer_bindings();
        self.stores.create_vertex_buffer(gl.as_ref(), size, initial_data, dynamic)
    }

    pub fn update_vertex_buffer(&mut self, handle: VertexBufferHandle, offset: usize, data: &[u8]) {
        let gl = Rc::clone(&self.gl);
        self.shadow.invalidate_buffer_bindings();
        self.stores.update_vertex_buffer(gl.as_ref(), handle, offset, data);
    }

    pub fn destroy_vertex_buffer(&mut self, handle: VertexBufferHandle) {
        let gl = Rc::clone(&self.gl);
        self.stores.destroy_vertex_buffer(gl.as_ref(), handle);
    }

    pub fn create_index_buffer(
        &mut self,
        size: usize,
        index_type: u32,
        initial_data: Option<&[u8]>,
        dynamic: bool,
    ) -> IndexBufferHandle {
        let gl = Rc::clone(&self.gl);
        self.shadow.invalidate_buffer_bindings();
        self.stores
            .create_index_buffer(gl.as_ref(), size, index_type, initial_data, dynamic)
    }

    pub fn destroy_index_buffer(&mut self, handle: IndexBufferHandle) {
        let gl = Rc::clone(&self.gl);
        self.stores.destroy_index_buffer(gl.as_ref(), handle);
    }

    /// Create a render-targetable color surface backed by `texture`.
    pub fn create_targetable_surface(&mut self, texture: TextureHandle) -> Option<SurfaceHandle> {
        let (width, height) = {
            let t = self.stores.texture(texture)?;
            (t.width, t.height)
        };
        Some(self.stores.create_surface(
            SurfaceKind::TextureColor { texture },
            width,
            height,
            0,
            Some(texture),
        ))
    }

    /// Create a depth-stencil surface backed by a depth texture.
    pub fn create_depth_surface(&mut self, texture: TextureHandle) -> Option<SurfaceHandle> {
        let (width, height) = {
            let t = self.stores.texture(texture)?;
            (t.width, t.height)
        };
        Some(self.stores.create_surface(
            SurfaceKind::TextureDepth { texture },
            width,
            height,
            0,
            Some(texture),
        ))
    }

    pub fn destroy_surface(&mut self, handle: SurfaceHandle) {
        let gl = Rc::clone(&self.gl);
        if let Some(unique_id) = self.stores.surface(handle).map(|s| s.unique_id()) {
            self.framebuffers.release_surface(gl.as_ref(), unique_id);
        }
        self.stores.destroy_surface(gl.as_ref(), handle);
    }

    // =================================================================
    // Shader and material state
    // =================================================================

    fn shader_manager_mut(&mut self) -> Option<&mut ShaderManager> {
        self.shader_manager.as_mut()
    }

    pub fn set_mobile_simple_params(&mut self, blend_mode: BlendMode) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_mobile_simple_params(blend_mode);
        }
    }

    pub fn set_mobile_material_vertex_params(&mut self, params: &MaterialVertexParams) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_mobile_material_vertex_params(params);
        }
    }

    pub fn set_mobile_material_pixel_params(&mut self, params: &MaterialPixelParams) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_mobile_material_pixel_params(params);
        }
    }

    pub fn set_mobile_mesh_vertex_params(&mut self, params: &MeshVertexParams) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_mobile_mesh_vertex_params(params);
        }
    }

    pub fn set_mobile_mesh_pixel_params(&mut self, params: &MeshPixelParams) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_mobile_mesh_pixel_params(params);
        }
    }

    pub fn set_fog(&mut self, enabled: bool, start: f32, end: f32, color: [f32; 4]) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_fog(enabled, start, end, color);
        }
    }

    pub fn set_height_fog_params(&mut self, params: &HeightFogParams) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_height_fog_params(params);
        }
    }

    pub fn set_mobile_color_grading_params(&mut self, params: &ColorGradingParams) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_mobile_color_grading_params(params);
        }
    }

    pub fn set_bump_offset(&mut self, enabled: bool, bump_end: f32) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_bump_offset(enabled, bump_end);
        }
    }

    pub fn set_gamma_correction(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_gamma_correction(enabled);
        }
    }

    pub fn enable_normal_mapping(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.enable_normal_mapping(enabled);
        }
    }

    pub fn enable_environment_mapping(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.enable_environment_mapping(enabled);
        }
    }

    pub fn enable_specular(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.enable_specular(enabled);
        }
    }

    pub fn enable_pixel_specular(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.enable_pixel_specular(enabled);
        }
    }

    pub fn enable_rim_lighting(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.enable_rim_lighting(enabled);
        }
    }

    pub fn enable_wave_vertex_movement(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.enable_wave_vertex_movement(enabled);
        }
    }

    pub fn enable_bump_offset(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.enable_bump_offset(enabled);
        }
    }

    pub fn set_opacity_source(&mut self, source: AlphaValueSource) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_opacity_source(source);
        }
    }

    pub fn set_color_fading(&mut self, enabled: bool, color_and_amount: [f32; 4]) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_color_fading(enabled, color_and_amount);
        }
    }

    pub fn set_view_projection(&mut self, matrix: [f32; 16]) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_view_projection(matrix);
        }
    }

    /// Generic parameter write (bone palettes, lights, shadow constants).
    pub fn set_shader_parameter_floats(
        &mut self,
        slot: crate::uniforms::UniformSlot,
        components: u8,
        values: &[f32],
    ) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_parameter_floats(slot, components, values);
        }
    }

    pub fn set_upper_sky_color(&mut self, color: [f32; 4]) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_upper_sky_color(color);
        }
    }

    pub fn set_lower_sky_color(&mut self, color: [f32; 4]) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_lower_sky_color(color);
        }
    }

    pub fn set_next_draw_global_shader(&mut self, kind: GlobalShaderKind) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_next_draw_global_shader(kind);
        }
    }

    pub fn set_rendering_depth_only(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_rendering_depth_only(enabled);
        }
    }

    pub fn set_rendering_shadow_depth(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_rendering_shadow_depth(enabled);
        }
    }

    pub fn set_rendering_forward_shadow_projections(&mut self, enabled: bool) {
        if let Some(sm) = self.shader_manager_mut() {
            sm.set_rendering_forward_shadow_projections(enabled);
        }
    }

    /// Resolve and bind the program for `primitive`/`global_shader` without
    /// drawing. Returns whether the bound program changed.
    pub fn set_program_by_type(
        &mut self,
        primitive: PrimitiveType,
        global_shader: GlobalShaderKind,
    ) -> bool {
        if !self.can_issue_gl() {
            return false;
        }
        let gl = Rc::clone(&self.gl);
        let stats = Arc::clone(&self.stats);
        self.shader_manager
            .as_mut()
            .and_then(|sm| sm.set_program_by_type(gl.as_ref(), primitive, global_shader, &stats))
            .unwrap_or(false)
    }

    // =================================================================
    // Draws
    // =================================================================

    pub fn set_stream_source(
        &mut self,
        stream_index: u32,
        vertex_buffer: Option<VertexBufferHandle>,
        stride: u32,
        offset: u32,
    ) {
        self.render_manager.set_stream_source(stream_index, vertex_buffer, stride, offset);
    }

    pub fn set_vertex_declaration(&mut self, declaration: VertexDeclaration) {
        self.render_manager.set_vertex_declaration(declaration);
    }

    fn update_for_draw(&mut self, up: Option<crate::render_manager::UpStream>) -> bool {
        let Self { gl, shadow, stores, stats, shader_manager, render_manager, .. } = self;
        let Some(shader_manager) = shader_manager.as_mut() else {
            return false;
        };
        render_manager.update_attributes_and_program(
            gl.as_ref(),
            shadow,
            shader_manager,
            stores,
            stats,
            up,
        )
    }

    pub fn draw_indexed_primitive(
        &mut self,
        index_buffer: IndexBufferHandle,
        topology: Topology,
        start_index: u32,
        primitive_count: u32,
    ) {
        if !self.can_issue_gl() || !self.update_for_draw(None) {
            return;
        }
        let Some((name, index_type)) =
            self.stores.index_buffer(index_buffer).map(|ib| (ib.driver_name(), ib.index_type))
        else {
            return;
        };
        let gl = Rc::clone(&self.gl);
        self.shadow.bind_element_array_buffer(gl.as_ref(), name);
        let index_size = if index_type == consts::UNSIGNED_INT { 4 } else { 2 };
        gl.draw_elements(
            topology.gl_mode(),
            topology.element_count(primitive_count) as i32,
            index_type,
            start_index as usize * index_size,
        );
        self.stats.inc_draw_calls();
        self.stats.add_primitives_drawn(u64::from(primitive_count));
    }

    pub fn draw_primitive(&mut self, topology: Topology, first_vertex: u32, primitive_count: u32) {
        if !self.can_issue_gl() || !self.update_for_draw(None) {
            return;
        }
        self.gl.draw_arrays(
            topology.gl_mode(),
            first_vertex as i32,
            topology.element_count(primitive_count) as i32,
        );
        self.stats.inc_draw_calls();
        self.stats.add_primitives_drawn(u64::from(primitive_count));
    }

    /// Begin an immediate-mode draw: returns the vertex scratch to fill.
    pub fn begin_draw_primitive_up(
        &mut self,
        topology: Topology,
        primitive_count: u32,
        vertex_stride: u32,
    ) -> Option<&mut [u8]> {
        let vertex_bytes =
            topology.element_count(primitive_count) as usize * vertex_stride as usize;
        if !self.render_manager.can_allocate(vertex_bytes, 0) {
            warn!(vertex_bytes, "immediate-mode draw exceeds the vertex scratch arena");
            return None;
        }
        self.render_manager.cache_up_values(CachedUpDraw {
            topology: Some(topology),
            vertex_stride,
            primitive_count,
            vertex_bytes,
            index_bytes: 0,
        });
        self.render_manager.allocate_vertex_data(vertex_bytes).ok()
    }

    pub fn end_draw_primitive_up(&mut self) {
        let cached = self.render_manager.take_cached_up_values();
        let Some(topology) = cached.topology else {
            return;
        };
        self.render_manager.deallocate_vertex_data();
        if !self.can_issue_gl() {
            return;
        }
        let gl = Rc::clone(&self.gl);
        let up = self.render_manager.flush_up_scratch(
            gl.as_ref(),
            &mut self.shadow,
            cached.vertex_bytes,
            cached.vertex_stride,
            0,
        );
        if !self.update_for_draw(Some(up)) {
            return;
        }
        gl.draw_arrays(
            topology.gl_mode(),
            0,
            topology.element_count(cached.primitive_count) as i32,
        );
        self.stats.inc_draw_calls_up();
        self.stats.add_primitives_drawn(u64::from(cached.primitive_count));
    }

    /// Begin an indexed immediate-mode draw: returns vertex and 16-bit
    /// index scratch to fill.
    pub fn begin_draw_indexed_primitive_up(
        &mut self,
        topology: Topology,
        primitive_count: u32,
        vertex_count: u32,
        vertex_stride: u32,
    ) -> Option<(&mut [u8], &mut [u8])> {
        let vertex_bytes = vertex_count as usize * vertex_stride as usize;
        let index_bytes = topology.element_count(primitive_count) as usize * 2;
        if !self.render_manager.can_allocate(vertex_bytes, index_bytes) {
            warn!(vertex_bytes, index_bytes, "immediate-mode draw exceeds the scratch arenas");
            return None;
        }
        self.render_manager.cache_up_values(CachedUpDraw {
            topology: Some(topology),
            vertex_stride,
            primitive_count,
            vertex_bytes,
            index_bytes,
        });
        self.render_manager.allocate_up_data(vertex_bytes, index_bytes).ok()
    }

    pub fn end_draw_indexed_primitive_up(&mut self) {
        let cached = self.render_manager.take_cached_up_values();
        let Some(topology) = cached.topology else {
            return;
        };
        self.render_manager.deallocate_vertex_data();
        self.render_manager.deallocate_index_data();
        if !self.can_issue_gl() {
            return;
        }
        let gl = Rc::clone(&self.gl);
        let up = self.render_manager.flush_up_scratch(
            gl.as_ref(),
            &mut self.shadow,
            cached.vertex_bytes,
            cached.vertex_stride,
            cached.index_bytes,
        );
        if !self.update_for_draw(Some(up)) {
            return;
        }
        let index_vbo = self.render_manager.up_index_vbo();
        self.shadow.bind_element_array_buffer(gl.as_ref(), index_vbo);
        gl.draw_elements(
            topology.gl_mode(),
            topology.element_count(cached.primitive_count) as i32,
            consts::UNSIGNED_SHORT,
            0,
        );
        self.stats.inc_draw_calls_up();
        self.stats.add_primitives_drawn(u64::from(cached.primitive_count));
    }

    // =================================================================
    // Occlusion queries
    // =================================================================

    pub fn create_occlusion_query(&mut self) -> Option<OcclusionQueryHandle> {
        let gl = Rc::clone(&self.gl);
        self.queries.as_mut().map(|pool| pool.create(gl.as_ref()))
    }

    pub fn begin_occlusion_query(&mut self, handle: OcclusionQueryHandle) {
        if !self.can_issue_gl() {
            return;
        }
        let gl = Rc::clone(&self.gl);
        if let Some(pool) = self.queries.as_mut() {
            pool.begin(gl.as_ref(), handle);
        }
    }

    pub fn end_occlusion_query(&mut self) {
        if !self.can_issue_gl() {
            return;
        }
        let gl = Rc::clone(&self.gl);
        if let Some(pool) = self.queries.as_mut() {
            pool.end(gl.as_ref());
        }
    }

    /// Non-blocking when `wait` is false: returns `(pixels, ready)`.
    pub fn get_occlusion_query_result(
        &mut self,
        handle: OcclusionQueryHandle,
        wait: bool,
    ) -> (u32, bool) {
        let gl = Rc::clone(&self.gl);
        self.queries
            .as_mut()
            .map(|pool| pool.get_result(gl.as_ref(), handle, wait))
            .unwrap_or((1, true))
    }

    // =================================================================
    // Debug / diagnostics
    // =================================================================

    /// Export the missing-key list in the index file format.
    pub fn export_missing_key_index(&self) -> String {
        self.shader_manager
            .as_ref()
            .map(|sm| sm.cache().export_missing_index())
            .unwrap_or_default()
    }

    pub fn dxt5_texture_mask(&self) -> u32 {
        self.shadow.dxt5_mask()
    }
}

impl Drop for Es2Rhi {
    fn drop(&mut self) {
        if self.lifecycle != Lifecycle::Uninitialized {
            debug!("renderer dropped with live viewports");
        }
    }
}
