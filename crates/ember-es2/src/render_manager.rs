//! The render manager: pending vertex streams, the active declaration,
//! attribute resolution, and the scratch arenas behind immediate-mode draws.
//!
//! Stream and declaration changes are cheap writes into pending state; no GL
//! attribute call is issued until [`RenderManager::update_attributes_and_program`]
//! runs at draw time. That one pass selects the program family from the
//! declaration kind, resolves every element against the pending streams
//! (falling back to the null-color/null-weight VBOs where content forgot a
//! stream), and enables/disables attribute arrays by mask delta.

use ember_gl::{consts, GlEs2};
use tracing::warn;

use crate::error::RhiError;
use crate::material::{BaseFeatures, GlobalShaderKind, PrimitiveType};
use crate::resources::{ResourceStores, VertexBufferHandle};
use crate::shader_manager::ShaderManager;
use crate::state::{AttribPointer, StateShadow};
use crate::stats::RhiStats;
use crate::vertex::{bind_location, DeclKind, VertexDeclaration, VertexUsage};

pub const MAX_VERTEX_STREAMS: usize = 16;

/// Data alignment of the scratch arenas.
const SCRATCH_ALIGNMENT: usize = 16;

/// Elements in the null fallback VBOs; enough for any mesh chunk that would
/// legitimately be missing a color or weight stream.
const NULL_VBO_ELEMENTS: usize = 4096;

/// Primitive topology for draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineList,
    PointList,
}

impl Topology {
    pub fn gl_mode(self) -> u32 {
        match self {
            Topology::TriangleList => consts::TRIANGLES,
            Topology::TriangleStrip => consts::TRIANGLE_STRIP,
            Topology::TriangleFan => consts::TRIANGLE_FAN,
            Topology::LineList => consts::LINES,
            Topology::PointList => consts::POINTS,
        }
    }

    /// Vertices/indices consumed by `primitive_count` primitives.
    pub fn element_count(self, primitive_count: u32) -> u32 {
        match self {
            Topology::TriangleList => primitive_count * 3,
            Topology::TriangleStrip | Topology::TriangleFan => primitive_count + 2,
            Topology::LineList => primitive_count * 2,
            Topology::PointList => primitive_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PendingStream {
    vertex_buffer: Option<VertexBufferHandle>,
    stride: u32,
    offset: u32,
}

/// Immediate-mode source: scratch data already uploaded to a stream VBO.
#[derive(Debug, Clone, Copy)]
pub struct UpStream {
    pub buffer: u32,
    pub stride: u32,
}

/// Values captured at `begin_draw_*_up` for the matching `end_draw`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedUpDraw {
    pub topology: Option<Topology>,
    pub vertex_stride: u32,
    pub primitive_count: u32,
    pub vertex_bytes: usize,
    pub index_bytes: usize,
}

#[derive(Debug)]
struct ScratchArena {
    storage: Vec<u128>,
    capacity: usize,
    live: u32,
}

impl ScratchArena {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.next_multiple_of(SCRATCH_ALIGNMENT);
        Self { storage: vec![0u128; capacity / 16], capacity, live: 0 }
    }

    fn alloc(&mut self, bytes: usize) -> Result<&mut [u8], RhiError> {
        debug_assert_eq!(self.live, 0, "scratch arena allocated twice without release");
        if bytes.next_multiple_of(SCRATCH_ALIGNMENT) > self.capacity {
            return Err(RhiError::ScratchOverflow { requested: bytes, capacity: self.capacity });
        }
        self.live += 1;
        Ok(&mut bytemuck::cast_slice_mut(self.storage.as_mut_slice())[..bytes])
    }

    fn bytes(&self, len: usize) -> &[u8] {
        &bytemuck::cast_slice(self.storage.as_slice())[..len]
    }

    fn release(&mut self) {
        debug_assert!(self.live > 0, "scratch arena released while not allocated");
        self.live = self.live.saturating_sub(1);
    }
}

pub struct RenderManager {
    pending_streams: [PendingStream; MAX_VERTEX_STREAMS],
    pending_declaration: Option<VertexDeclaration>,
    streams_dirty: bool,

    /// GLSL attribute locations currently enabled.
    attrib_mask: u32,

    /// Two copies ring-buffered per frame so GPU-debug capture of frame N
    /// does not see frame N+1 overwrites.
    null_color_vbos: [u32; 2],
    null_color_index: usize,
    null_weight_vbo: u32,

    /// Stream VBOs the immediate-mode path uploads scratch data into.
    up_vertex_vbo: u32,
    up_index_vbo: u32,

    vertex_scratch: ScratchArena,
    index_scratch: ScratchArena,
    cached_up: CachedUpDraw,
}

impl RenderManager {
    pub fn new(vertex_scratch_bytes: usize, index_scratch_bytes: usize) -> Self {
        Self {
            pending_streams: [PendingStream::default(); MAX_VERTEX_STREAMS],
            pending_declaration: None,
            streams_dirty: false,
            attrib_mask: 0,
            null_color_vbos: [0; 2],
            null_color_index: 0,
            null_weight_vbo: 0,
            up_vertex_vbo: 0,
            up_index_vbo: 0,
            vertex_scratch: ScratchArena::new(vertex_scratch_bytes),
            index_scratch: ScratchArena::new(index_scratch_bytes),
            cached_up: CachedUpDraw::default(),
        }
    }

    /// Create the fallback and immediate-mode VBOs. Runs at first viewport
    /// creation and again after a resume.
    pub fn init_gpu_resources(&mut self, gl: &dyn GlEs2) {
        // Opaque black, alpha 1; the weight VBO reuses the same pattern so a
        // missing weight stream skins every vertex fully to bone 0.
        let element = 0xff0000ffu32;
        let data: Vec<u8> = std::iter::repeat_with(|| element.to_le_bytes())
            .take(NULL_VBO_ELEMENTS)
            .flatten()
            .collect();

        for vbo in &mut self.null_color_vbos {
            *vbo = gl.gen_buffer();
            gl.bind_buffer(consts::ARRAY_BUFFER, *vbo);
            gl.buffer_data(consts::ARRAY_BUFFER, data.len(), Some(&data), consts::STATIC_DRAW);
        }
        self.null_weight_vbo = gl.gen_buffer();
        gl.bind_buffer(consts::ARRAY_BUFFER, self.null_weight_vbo);
        gl.buffer_data(consts::ARRAY_BUFFER, data.len(), Some(&data), consts::STATIC_DRAW);
        gl.bind_buffer(consts::ARRAY_BUFFER, 0);

        self.up_vertex_vbo = gl.gen_buffer();
        self.up_index_vbo = gl.gen_buffer();
    }

    /// Drop driver objects and pending references (suspend path).
    pub fn clear_gpu_resources(&mut self, gl: &dyn GlEs2) {
        for vbo in self
            .null_color_vbos
            .iter_mut()
            .chain([&mut self.null_weight_vbo, &mut self.up_vertex_vbo, &mut self.up_index_vbo])
        {
            if *vbo != 0 {
                gl.delete_buffer(*vbo);
                *vbo = 0;
            }
        }
        self.pending_streams = [PendingStream::default(); MAX_VERTEX_STREAMS];
        self.pending_declaration = None;
        self.streams_dirty = true;
        self.prepare_attributes(gl, 0);
    }

    pub fn new_frame(&mut self) {
        self.null_color_index = (self.null_color_index + 1) % self.null_color_vbos.len();
    }

    pub fn set_stream_source(
        &mut self,
        stream_index: u32,
        vertex_buffer: Option<VertexBufferHandle>,
        stride: u32,
        offset: u32,
    ) {
        debug_assert!((stream_index as usize) < MAX_VERTEX_STREAMS);
        self.pending_streams[stream_index as usize] =
            PendingStream { vertex_buffer, stride, offset };
        self.streams_dirty = true;
    }

    pub fn set_vertex_declaration(&mut self, declaration: VertexDeclaration) {
        self.pending_declaration = Some(declaration);
        self.streams_dirty = true;
    }

    pub fn reset_attrib_mask(&mut self) {
        self.attrib_mask = 0;
    }

    /// Resolve pending streams and the declaration into attribute bindings,
    /// select and bind the program, and upload versioned uniforms. Returns
    /// `false` when the draw must be skipped.
    pub fn update_attributes_and_program(
        &mut self,
        gl: &dyn GlEs2,
        shadow: &mut StateShadow,
        shader_manager: &mut ShaderManager,
        stores: &ResourceStores,
        stats: &RhiStats,
        up: Option<UpStream>,
    ) -> bool {
        let Some(declaration) = self.pending_declaration.take() else {
            warn!("draw without a vertex declaration");
            stats.inc_invalid_meshes();
            return false;
        };

        let were_streams_dirty = std::mem::replace(&mut self.streams_dirty, false);
        let has_blend_weight = declaration.uses(VertexUsage::BlendWeight);

        // Select the program family the way the declaration was authored.
        let mut primitive = PrimitiveType::Default;
        let mut global_shader = GlobalShaderKind::None;
        shader_manager.clear_vertex_factory_flags();
        match declaration.kind {
            DeclKind::SpriteParticle => primitive = PrimitiveType::Particle,
            DeclKind::SubUvParticle => {
                primitive = PrimitiveType::Particle;
                shader_manager.set_vertex_factory_flags(BaseFeatures::SUBUV_PARTICLES);
            }
            DeclKind::BeamTrailParticle => primitive = PrimitiveType::BeamTrailParticle,
            DeclKind::LensFlare => primitive = PrimitiveType::LensFlare,
            _ if up.is_some() => {
                global_shader = shader_manager.take_next_draw_global_shader();
                if global_shader != GlobalShaderKind::None {
                    primitive = PrimitiveType::GlobalShader;
                } else if declaration.kind == DeclKind::Simple {
                    primitive = PrimitiveType::Simple;
                }
            }
            _ if has_blend_weight => {
                shader_manager.set_vertex_factory_flags(BaseFeatures::GPU_SKINNING);
            }
            _ => {
                match declaration.kind {
                    DeclKind::Landscape => {
                        shader_manager.set_vertex_factory_flags(BaseFeatures::LANDSCAPE);
                    }
                    DeclKind::Decal => {
                        shader_manager.set_vertex_factory_flags(BaseFeatures::DECAL);
                    }
                    _ => {}
                }
                if shader_manager.has_had_lightmap_set() {
                    shader_manager.set_vertex_factory_flags(BaseFeatures::LIGHTMAP);
                    if shader_manager.has_had_directional_lightmap_set() {
                        shader_manager.set_vertex_factory_flags(BaseFeatures::DIRECTIONAL_LIGHTMAP);
                    }
                }
            }
        }

        let Some(program_changed) =
            shader_manager.set_program_by_type(gl, primitive, global_shader, stats)
        else {
            stats.inc_invalid_meshes();
            self.streams_dirty = true;
            self.pending_declaration = Some(declaration);
            return false;
        };

        if were_streams_dirty || program_changed {
            let missing_required =
                self.resolve_attributes(gl, shadow, shader_manager, stores, &declaration, up);

            if missing_required {
                // Content is missing a stream the material needs; render it
                // with the fallback color so the error is visible, and count
                // it so automation catches it too.
                stats.inc_invalid_meshes();
                shader_manager.set_to_use_fallback_stream_color(true);
                let rebound =
                    shader_manager.set_program_by_type(gl, primitive, global_shader, stats);
                shader_manager.set_to_use_fallback_stream_color(false);
                if rebound.is_none() {
                    self.streams_dirty = true;
                    self.pending_declaration = Some(declaration);
                    return false;
                }
            }
        }

        // Next sampler binds belong to the next draw's material.
        shader_manager.reset_lightmap_on_next_sampler();

        self.pending_declaration = Some(declaration);
        true
    }

    /// Push every declaration element into the attribute shadow. Returns
    /// whether a required stream was missing (fallback color path).
    fn resolve_attributes(
        &mut self,
        gl: &dyn GlEs2,
        shadow: &mut StateShadow,
        shader_manager: &ShaderManager,
        stores: &ResourceStores,
        declaration: &VertexDeclaration,
        up: Option<UpStream>,
    ) -> bool {
        let Some(instance) = shader_manager.cache().current_key().and_then(|key| {
            shader_manager.cache().instance(key)
        }) else {
            return false;
        };
        let used_mask = instance.used_attrib_mask;
        let mapping = instance.attrib_mapping;

        let mut new_mask = 0u32;
        let mut missing_required = false;

        for element in &declaration.elements {
            let engine_slot = bind_location(element.usage, element.usage_index) as usize;
            let location = mapping[engine_slot];
            if location < 0 {
                // Attribute unused by the current permutation.
                continue;
            }
            if used_mask & (1 << location) == 0 {
                continue;
            }

            let (buffer, stride, base_offset) = if let Some(up_stream) = up {
                debug_assert_eq!(element.stream_index, 0, "UP draws are single-stream");
                (up_stream.buffer, up_stream.stride, 0u32)
            } else {
                let stream = &self.pending_streams[element.stream_index as usize];
                let buffer_name = stream
                    .vertex_buffer
                    .and_then(|handle| stores.vertex_buffer(handle))
                    .map(|vb| vb.driver_name());
                match buffer_name {
                    Some(name) if stream.stride > 0 => (name, stream.stride, stream.offset),
                    _ => {
                        // Known fallbacks for missing streams; anything else
                        // is an authoring error surfaced via the pink path.
                        match element.usage {
                            VertexUsage::BlendWeight => (self.null_weight_vbo, 4, 0),
                            VertexUsage::Color => {
                                missing_required = true;
                                (self.null_color_vbos[self.null_color_index], 4, 0)
                            }
                            _ => {
                                warn!(
                                    usage = ?element.usage,
                                    usage_index = element.usage_index,
                                    "unhandled zero-stride vertex attribute"
                                );
                                missing_required = true;
                                continue;
                            }
                        }
                    }
                }
            };

            shadow.set_vertex_attrib(
                gl,
                location as u32,
                AttribPointer {
                    buffer,
                    size: element.element_type.component_count(),
                    ty: element.element_type.gl_type(),
                    normalized: element.element_type.normalized(),
                    stride: stride as i32,
                    offset: base_offset as usize + element.offset as usize,
                },
            );
            new_mask |= 1 << location;
        }

        self.prepare_attributes(gl, new_mask);
        missing_required
    }

    /// Enable newly-required attribute arrays and disable stale ones.
    fn prepare_attributes(&mut self, gl: &dyn GlEs2, new_mask: u32) {
        let changed = self.attrib_mask ^ new_mask;
        if changed != 0 {
            for location in 0..32 {
                let bit = 1u32 << location;
                if changed & bit == 0 {
                    continue;
                }
                if new_mask & bit != 0 {
                    gl.enable_vertex_attrib_array(location);
                } else {
                    gl.disable_vertex_attrib_array(location);
                }
            }
        }
        self.attrib_mask = new_mask;
    }

    // -----------------------------------------------------------------
    // Immediate-mode scratch
    // -----------------------------------------------------------------

    /// Whether an immediate-mode request fits the arenas without growth.
    pub fn can_allocate(&self, vertex_bytes: usize, index_bytes: usize) -> bool {
        vertex_bytes.next_multiple_of(SCRATCH_ALIGNMENT) <= self.vertex_scratch.capacity
            && index_bytes.next_multiple_of(SCRATCH_ALIGNMENT) <= self.index_scratch.capacity
    }

    pub fn allocate_vertex_data(&mut self, bytes: usize) -> Result<&mut [u8], RhiError> {
        self.vertex_scratch.alloc(bytes)
    }

    pub fn deallocate_vertex_data(&mut self) {
        self.vertex_scratch.release();
    }

    pub fn allocate_index_data(&mut self, bytes: usize) -> Result<&mut [u8], RhiError> {
        self.index_scratch.alloc(bytes)
    }

    /// Allocate both arenas for an indexed immediate-mode draw.
    pub fn allocate_up_data(
        &mut self,
        vertex_bytes: usize,
        index_bytes: usize,
    ) -> Result<(&mut [u8], &mut [u8]), RhiError> {
        // Check the index arena up front so a failure cannot leave the
        // vertex arena holding a live allocation.
        if index_bytes.next_multiple_of(SCRATCH_ALIGNMENT) > self.index_scratch.capacity {
            return Err(RhiError::ScratchOverflow {
                requested: index_bytes,
                capacity: self.index_scratch.capacity,
            });
        }
        let vertex = self.vertex_scratch.alloc(vertex_bytes)?;
        let index = self.index_scratch.alloc(index_bytes)?;
        Ok((vertex, index))
    }

    pub fn deallocate_index_data(&mut self) {
        self.index_scratch.release();
    }

    pub fn cache_up_values(&mut self, cached: CachedUpDraw) {
        self.cached_up = cached;
    }

    pub fn take_cached_up_values(&mut self) -> CachedUpDraw {
        std::mem::take(&mut self.cached_up)
    }

    /// Upload the live scratch data into the immediate-mode VBOs and return
    /// the vertex stream descriptor for attribute resolution.
    pub fn flush_up_scratch(
        &mut self,
        gl: &dyn GlEs2,
        shadow: &mut StateShadow,
        vertex_bytes: usize,
        vertex_stride: u32,
        index_bytes: usize,
    ) -> UpStream {
        shadow.bind_array_buffer(gl, self.up_vertex_vbo);
        gl.buffer_data(
            consts::ARRAY_BUFFER,
            vertex_bytes,
            Some(self.vertex_scratch.bytes(vertex_bytes)),
            consts::STREAM_DRAW,
        );
        if index_bytes > 0 {
            shadow.bind_element_array_buffer(gl, self.up_index_vbo);
            gl.buffer_data(
                consts::ELEMENT_ARRAY_BUFFER,
                index_bytes,
                Some(self.index_scratch.bytes(index_bytes)),
                consts::STREAM_DRAW,
            );
        }
        UpStream { buffer: self.up_vertex_vbo, stride: vertex_stride }
    }

    pub fn up_index_vbo(&self) -> u32 {
        self.up_index_vbo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::DeviceCapabilities;
    use crate::config::SystemSettings;
    use crate::format::{PixelFormat, PixelFormatTable};
    use crate::vertex::{VertexElement, VertexElementType};
    use ember_gl::{GlCall, TraceGl};
    use std::sync::Arc;

    struct Fixture {
        gl: TraceGl,
        shadow: StateShadow,
        shader_manager: ShaderManager,
        stores: ResourceStores,
        render: RenderManager,
        stats: Arc<RhiStats>,
    }

    impl Fixture {
        fn new() -> Self {
            let gl = TraceGl::new();
            let caps = DeviceCapabilities::probe(&gl);
            let stats = Arc::new(RhiStats::new());
            let mut render = RenderManager::new(64 * 1024, 16 * 1024);
            render.init_gpu_resources(&gl);
            Self {
                shadow: StateShadow::new(Arc::clone(&stats)),
                shader_manager: ShaderManager::new(SystemSettings::default(), caps),
                stores: ResourceStores::new(),
                render,
                stats,
                gl,
            }
        }

        fn formats(&self) -> PixelFormatTable {
            PixelFormatTable::build(&DeviceCapabilities::probe(&self.gl))
        }

        fn position_decl(kind: DeclKind) -> VertexDeclaration {
            VertexDeclaration::new(
                kind,
                vec![VertexElement {
                    stream_index: 0,
                    offset: 0,
                    element_type: VertexElementType::Float3,
                    usage: VertexUsage::Position,
                    usage_index: 0,
                }],
            )
        }

        fn update(&mut self) -> bool {
            self.render.update_attributes_and_program(
                &self.gl,
                &mut self.shadow,
                &mut self.shader_manager,
                &self.stores,
                &self.stats,
                None,
            )
        }
    }

    #[test]
    fn no_attribute_calls_until_draw_time() {
        let mut fx = Fixture::new();
        let vb = fx.stores.create_vertex_buffer(&fx.gl, 1024, None, false);
        fx.gl.clear_calls();

        fx.render.set_stream_source(0, Some(vb), 12, 0);
        fx.render.set_vertex_declaration(Fixture::position_decl(DeclKind::Default));
        assert_eq!(fx.gl.count(ember_gl::CallKind::Attribute), 0);

        assert!(fx.update());
        assert!(fx.gl.count(ember_gl::CallKind::Attribute) > 0);
    }

    #[test]
    fn unchanged_streams_resolve_without_attribute_calls() {
        let mut fx = Fixture::new();
        let vb = fx.stores.create_vertex_buffer(&fx.gl, 1024, None, false);
        fx.render.set_stream_source(0, Some(vb), 12, 0);
        fx.render.set_vertex_declaration(Fixture::position_decl(DeclKind::Default));
        assert!(fx.update());
        fx.gl.clear_calls();

        // Nothing changed; the second draw issues no attribute traffic.
        assert!(fx.update());
        assert_eq!(fx.gl.count(ember_gl::CallKind::Attribute), 0);
    }

    #[test]
    fn missing_color_stream_binds_null_color_vbo() {
        let mut fx = Fixture::new();
        let vb = fx.stores.create_vertex_buffer(&fx.gl, 1024, None, false);
        fx.render.set_stream_source(0, Some(vb), 16, 0);
        let decl = VertexDeclaration::new(
            DeclKind::Default,
            vec![
                VertexElement {
                    stream_index: 0,
                    offset: 0,
                    element_type: VertexElementType::Float3,
                    usage: VertexUsage::Position,
                    usage_index: 0,
                },
                VertexElement {
                    stream_index: 1,
                    offset: 0,
                    element_type: VertexElementType::UByte4Norm,
                    usage: VertexUsage::Color,
                    usage_index: 0,
                },
            ],
        );
        fx.render.set_vertex_declaration(decl);

        assert!(fx.update(), "draw must succeed on the fallback path");
        assert_eq!(fx.stats.snapshot().invalid_meshes, 1);

        let null_color = fx.render.null_color_vbos[fx.render.null_color_index];
        let bound_null = fx.gl.count_where(|c| {
            matches!(c, GlCall::VertexAttribPointer { .. })
        });
        assert!(bound_null >= 2);
        // The color attribute points at the null VBO.
        let binds = fx.gl.calls();
        assert!(binds.iter().any(
            |c| matches!(c, GlCall::BindBuffer { target, name } if *target == consts::ARRAY_BUFFER && *name == null_color)
        ));
    }

    #[test]
    fn missing_weight_stream_binds_null_weight_without_invalid_mesh() {
        let mut fx = Fixture::new();
        let vb = fx.stores.create_vertex_buffer(&fx.gl, 1024, None, false);
        fx.render.set_stream_source(0, Some(vb), 16, 0);
        let decl = VertexDeclaration::new(
            DeclKind::Default,
            vec![
                VertexElement {
                    stream_index: 0,
                    offset: 0,
                    element_type: VertexElementType::Float3,
                    usage: VertexUsage::Position,
                    usage_index: 0,
                },
                VertexElement {
                    stream_index: 2,
                    offset: 0,
                    element_type: VertexElementType::UByte4Norm,
                    usage: VertexUsage::BlendWeight,
                    usage_index: 0,
                },
            ],
        );
        fx.render.set_vertex_declaration(decl);

        assert!(fx.update());
        assert_eq!(fx.stats.snapshot().invalid_meshes, 0);
        let null_weight = fx.render.null_weight_vbo;
        assert!(fx.gl.calls().iter().any(
            |c| matches!(c, GlCall::BindBuffer { target, name } if *target == consts::ARRAY_BUFFER && *name == null_weight)
        ));
    }

    #[test]
    fn particle_declarations_select_the_particle_program() {
        let mut fx = Fixture::new();
        let vb = fx.stores.create_vertex_buffer(&fx.gl, 1024, None, false);
        fx.render.set_stream_source(0, Some(vb), 12, 0);
        fx.render.set_vertex_declaration(Fixture::position_decl(DeclKind::SubUvParticle));
        assert!(fx.update());
        assert!(fx
            .shader_manager
            .vertex_factory_flags()
            .contains(BaseFeatures::SUBUV_PARTICLES));
    }

    #[test]
    fn scratch_arena_asserts_single_live_allocation() {
        let mut render = RenderManager::new(1024, 256);
        {
            let data = render.allocate_vertex_data(64).unwrap();
            data.fill(7);
        }
        render.deallocate_vertex_data();
        // A second allocate after release succeeds.
        assert!(render.allocate_vertex_data(64).is_ok());
        render.deallocate_vertex_data();
    }

    #[test]
    fn scratch_overflow_is_reported() {
        let mut render = RenderManager::new(128, 128);
        assert!(matches!(
            render.allocate_vertex_data(4096),
            Err(RhiError::ScratchOverflow { .. })
        ));
    }

    #[test]
    fn null_color_ring_flips_per_frame() {
        let gl = TraceGl::new();
        let mut render = RenderManager::new(1024, 256);
        render.init_gpu_resources(&gl);
        let first = render.null_color_index;
        render.new_frame();
        assert_ne!(render.null_color_index, first);
        render.new_frame();
        assert_eq!(render.null_color_index, first);
    }

    #[test]
    fn attribute_mask_delta_enables_and_disables() {
        let gl = TraceGl::new();
        let mut render = RenderManager::new(1024, 256);
        render.prepare_attributes(&gl, 0b101);
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::EnableVertexAttribArray(_))), 2);

        gl.clear_calls();
        render.prepare_attributes(&gl, 0b110);
        // Slot 0 disabled, slot 1 enabled, slot 2 untouched.
        assert_eq!(gl.calls(), vec![
            GlCall::DisableVertexAttribArray(0),
            GlCall::EnableVertexAttribArray(1),
        ]);
    }

    #[test]
    fn formats_table_available_for_fixture_users() {
        // Regression guard: the fixture's format table builds for the
        // default trace device.
        let fx = Fixture::new();
        assert!(fx.formats().info(PixelFormat::Rgba8).supported);
    }
}
