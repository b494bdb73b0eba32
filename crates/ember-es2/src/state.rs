//! The state shadow: an in-process mirror of every GL state the RHI sets.
//!
//! Each setter compares the requested state against the mirror and only
//! reaches the driver on a mismatch. After anything that can mutate GL
//! state behind the shadow's back (program compiles, surface recreation,
//! resume), [`StateShadow::invalidate`] resets every mirror field to its
//! sentinel so the next set always issues its driver call.
//!
//! Driver errors do not poison the mirror: when `glGetError` reports a
//! failure the shadow keeps its previous value, so the same state is retried
//! on the next set instead of being silently believed.

use std::sync::Arc;

use bitflags::bitflags;
use ember_gl::{check_error, consts, GlEs2};
use tracing::warn;

use crate::format::PixelFormat;
use crate::stats::RhiStats;

/// Engine-level vertex attribute slots (after semantic mapping).
pub const MAX_VERTEX_ATTRIBS: usize = 16;
/// Texture units the RHI manages.
pub const MAX_TEXTURE_UNITS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    Point,
    Wireframe,
    Solid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    /// Cull clockwise-wound faces.
    Cw,
    /// Cull counter-clockwise-wound faces.
    Ccw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl CompareFunc {
    pub fn to_gl(self) -> u32 {
        match self {
            CompareFunc::Never => consts::NEVER,
            CompareFunc::Less => consts::LESS,
            CompareFunc::Equal => consts::EQUAL,
            CompareFunc::LessEqual => consts::LEQUAL,
            CompareFunc::Greater => consts::GREATER,
            CompareFunc::NotEqual => consts::NOTEQUAL,
            CompareFunc::GreaterEqual => consts::GEQUAL,
            CompareFunc::Always => consts::ALWAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
    DstColor,
    InvDstColor,
}

impl BlendFactor {
    pub fn to_gl(self) -> u32 {
        match self {
            BlendFactor::Zero => consts::ZERO,
            BlendFactor::One => consts::ONE,
            BlendFactor::SrcColor => consts::SRC_COLOR,
            BlendFactor::InvSrcColor => consts::ONE_MINUS_SRC_COLOR,
            BlendFactor::SrcAlpha => consts::SRC_ALPHA,
            BlendFactor::InvSrcAlpha => consts::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => consts::DST_ALPHA,
            BlendFactor::InvDstAlpha => consts::ONE_MINUS_DST_ALPHA,
            BlendFactor::DstColor => consts::DST_COLOR,
            BlendFactor::InvDstColor => consts::ONE_MINUS_DST_COLOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
}

impl BlendOp {
    pub fn to_gl(self) -> u32 {
        match self {
            BlendOp::Add => consts::FUNC_ADD,
            BlendOp::Subtract => consts::FUNC_SUBTRACT,
            BlendOp::ReverseSubtract => consts::FUNC_REVERSE_SUBTRACT,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColorWriteMask: u8 {
        const RED   = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE  = 1 << 2;
        const ALPHA = 1 << 3;
        const RGB   = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits();
        const RGBA  = Self::RGB.bits() | Self::ALPHA.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterizerStateDesc {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
}

impl Default for RasterizerStateDesc {
    fn default() -> Self {
        Self { fill_mode: FillMode::Solid, cull_mode: CullMode::None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStateDesc {
    pub depth_write_enabled: bool,
    pub depth_test: CompareFunc,
}

impl Default for DepthStateDesc {
    fn default() -> Self {
        Self { depth_write_enabled: true, depth_test: CompareFunc::LessEqual }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendStateDesc {
    pub color_blend_op: BlendOp,
    pub color_source_factor: BlendFactor,
    pub color_dest_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub alpha_source_factor: BlendFactor,
    pub alpha_dest_factor: BlendFactor,
    /// Alpha test is not driver state on ES2; it folds into the program key
    /// and an `AlphaTestRef` uniform. Carried here so one engine state block
    /// maps to one RHI call.
    pub alpha_test: CompareFunc,
    pub alpha_ref: f32,
}

impl Default for BlendStateDesc {
    fn default() -> Self {
        Self {
            color_blend_op: BlendOp::Add,
            color_source_factor: BlendFactor::One,
            color_dest_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            alpha_source_factor: BlendFactor::One,
            alpha_dest_factor: BlendFactor::Zero,
            alpha_test: CompareFunc::Always,
            alpha_ref: 0.0,
        }
    }
}

impl BlendStateDesc {
    fn blending_enabled(&self) -> bool {
        self.color_source_factor != BlendFactor::One
            || self.color_dest_factor != BlendFactor::Zero
            || self.alpha_source_factor != BlendFactor::One
            || self.alpha_dest_factor != BlendFactor::Zero
            || self.color_blend_op != BlendOp::Add
            || self.alpha_blend_op != BlendOp::Add
    }

    /// The driver-visible part; `alpha_test`/`alpha_ref` changes alone must
    /// not reissue blend calls.
    fn gl_part(&self) -> (BlendOp, BlendFactor, BlendFactor, BlendOp, BlendFactor, BlendFactor) {
        (
            self.color_blend_op,
            self.color_source_factor,
            self.color_dest_factor,
            self.alpha_blend_op,
            self.alpha_source_factor,
            self.alpha_dest_factor,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerFilter {
    Point,
    Linear,
    /// Trilinear across mips; degrades to linear on mipless textures.
    Trilinear,
    Anisotropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerAddress {
    Wrap,
    Clamp,
    Mirror,
}

impl SamplerAddress {
    pub fn to_gl(self) -> u32 {
        match self {
            SamplerAddress::Wrap => consts::REPEAT,
            SamplerAddress::Clamp => consts::CLAMP_TO_EDGE,
            SamplerAddress::Mirror => consts::MIRRORED_REPEAT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerStateDesc {
    pub filter: SamplerFilter,
    pub address_u: SamplerAddress,
    pub address_v: SamplerAddress,
}

impl Default for SamplerStateDesc {
    fn default() -> Self {
        Self {
            filter: SamplerFilter::Linear,
            address_u: SamplerAddress::Wrap,
            address_v: SamplerAddress::Wrap,
        }
    }
}

/// Per-slot vertex attribute pointer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttribPointer {
    pub buffer: u32,
    pub size: i32,
    pub ty: u32,
    pub normalized: bool,
    pub stride: i32,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TextureBinding {
    name: u32,
    target: u32,
}

#[derive(Debug)]
pub struct StateShadow {
    stats: Arc<RhiStats>,

    rasterizer: Option<RasterizerStateDesc>,
    depth: Option<DepthStateDesc>,
    blend: Option<BlendStateDesc>,
    color_mask: Option<ColorWriteMask>,
    scissor_enabled: Option<bool>,
    scissor_rect: Option<(i32, i32, i32, i32)>,

    active_texture_unit: Option<u32>,
    bound_textures: [Option<TextureBinding>; MAX_TEXTURE_UNITS],
    bound_formats: [Option<PixelFormat>; MAX_TEXTURE_UNITS],
    /// Units with a DXT5 texture bound; feeds program-key selection.
    dxt5_mask: u32,

    array_buffer: Option<u32>,
    element_array_buffer: Option<u32>,
    attribs: [Option<AttribPointer>; MAX_VERTEX_ATTRIBS],

    /// Unique ids of the bound render-target pair; `-1` means unset.
    pub render_target_id: i64,
    pub depth_target_id: i64,
    pub render_target_width: u32,
    pub render_target_height: u32,
    /// The bound framebuffer has a depth attachment; when false, depth state
    /// setters are suppressed entirely.
    pub depth_attachment_present: bool,
    /// A NULL depth target was substituted with the previous depth buffer to
    /// avoid a flush/restore; engine depth settings still apply.
    pub using_dummy_depth: bool,
}

impl StateShadow {
    pub fn new(stats: Arc<RhiStats>) -> Self {
        Self {
            stats,
            rasterizer: None,
            depth: None,
            blend: None,
            color_mask: None,
            scissor_enabled: None,
            scissor_rect: None,
            active_texture_unit: None,
            bound_textures: [None; MAX_TEXTURE_UNITS],
            bound_formats: [None; MAX_TEXTURE_UNITS],
            dxt5_mask: 0,
            array_buffer: None,
            element_array_buffer: None,
            attribs: [None; MAX_VERTEX_ATTRIBS],
            render_target_id: -1,
            depth_target_id: -1,
            render_target_width: 0,
            render_target_height: 0,
            depth_attachment_present: true,
            using_dummy_depth: false,
        }
    }

    /// Reset every mirror field to its sentinel. Must be called after any
    /// operation that could have changed GL state outside the shadow's
    /// knowledge.
    pub fn invalidate(&mut self) {
        let stats = Arc::clone(&self.stats);
        let (width, height) = (self.render_target_width, self.render_target_height);
        *self = Self::new(stats);
        self.render_target_width = width;
        self.render_target_height = height;
    }

    /// Per-frame reset: texture names and buffer bindings may have been
    /// recycled by resource churn, so stop trusting them.
    pub fn new_frame(&mut self) {
        self.invalidate_texture_bindings();
        self.array_buffer = None;
        self.element_array_buffer = None;
    }

    /// Texture upload paths bind directly, behind the shadow's back; they
    /// call this so the next sampler set re-binds.
    pub fn invalidate_texture_bindings(&mut self) {
        for binding in &mut self.bound_textures {
            *binding = None;
        }
        self.active_texture_unit = None;
    }

    /// Buffer creation/upload paths likewise bind directly.
    pub fn invalidate_buffer_bindings(&mut self) {
        self.array_buffer = None;
        self.element_array_buffer = None;
    }

    fn commit(&self, gl: &dyn GlEs2, site: &'static str) -> bool {
        match check_error(gl, site) {
            Ok(()) => true,
            Err(err) => {
                self.stats.inc_driver_errors();
                warn!(%err, "driver rejected state change; mirror not updated");
                false
            }
        }
    }

    pub fn set_rasterizer(&mut self, gl: &dyn GlEs2, desc: RasterizerStateDesc) {
        if self.rasterizer == Some(desc) {
            return;
        }
        let previous_cull = self.rasterizer.map(|r| r.cull_mode);
        if previous_cull != Some(desc.cull_mode) {
            match desc.cull_mode {
                CullMode::None => gl.disable(consts::CULL_FACE),
                CullMode::Cw | CullMode::Ccw => {
                    if !matches!(previous_cull, Some(CullMode::Cw) | Some(CullMode::Ccw)) {
                        gl.enable(consts::CULL_FACE);
                    }
                    // Culling always removes back faces; winding selects
                    // which faces count as front.
                    gl.front_face(if desc.cull_mode == CullMode::Cw {
                        consts::CCW
                    } else {
                        consts::CW
                    });
                }
            }
        }
        // Fill mode has no ES2 driver state (no glPolygonMode); it is
        // mirrored only so a later desktop backend can honor it.
        if self.commit(gl, "set_rasterizer") {
            self.rasterizer = Some(desc);
        }
    }

    pub fn set_depth(&mut self, gl: &dyn GlEs2, desc: DepthStateDesc) {
        // No depth attachment: depth ops would be driver errors on some
        // implementations and meaningless on the rest.
        if !self.depth_attachment_present {
            return;
        }
        if self.depth == Some(desc) {
            return;
        }
        let previous = self.depth;
        if previous.map(|d| d.depth_test) != Some(desc.depth_test) {
            gl.depth_func(desc.depth_test.to_gl());
        }
        if previous.map(|d| d.depth_write_enabled) != Some(desc.depth_write_enabled) {
            gl.depth_mask(desc.depth_write_enabled);
        }
        if self.commit(gl, "set_depth") {
            self.depth = Some(desc);
        }
    }

    pub fn set_blend(&mut self, gl: &dyn GlEs2, desc: BlendStateDesc) {
        if self.blend.map(|b| b.gl_part()) != Some(desc.gl_part()) {
            let was_enabled = self.blend.map(|b| b.blending_enabled());
            let enabled = desc.blending_enabled();
            if was_enabled != Some(enabled) {
                if enabled {
                    gl.enable(consts::BLEND);
                } else {
                    gl.disable(consts::BLEND);
                }
            }
            if enabled {
                gl.blend_func_separate(
                    desc.color_source_factor.to_gl(),
                    desc.color_dest_factor.to_gl(),
                    desc.alpha_source_factor.to_gl(),
                    desc.alpha_dest_factor.to_gl(),
                );
                gl.blend_equation_separate(
                    desc.color_blend_op.to_gl(),
                    desc.alpha_blend_op.to_gl(),
                );
            }
            if !self.commit(gl, "set_blend") {
                return;
            }
        }
        self.blend = Some(desc);
    }

    pub fn blend_state(&self) -> Option<BlendStateDesc> {
        self.blend
    }

    pub fn set_color_write_mask(&mut self, gl: &dyn GlEs2, mask: ColorWriteMask) {
        if self.color_mask == Some(mask) {
            return;
        }
        gl.color_mask(
            mask.contains(ColorWriteMask::RED),
            mask.contains(ColorWriteMask::GREEN),
            mask.contains(ColorWriteMask::BLUE),
            mask.contains(ColorWriteMask::ALPHA),
        );
        if self.commit(gl, "set_color_write_mask") {
            self.color_mask = Some(mask);
        }
    }

    pub fn set_scissor(&mut self, gl: &dyn GlEs2, enabled: bool, rect: (i32, i32, i32, i32)) {
        if self.scissor_enabled != Some(enabled) {
            if enabled {
                gl.enable(consts::SCISSOR_TEST);
            } else {
                gl.disable(consts::SCISSOR_TEST);
            }
            self.scissor_enabled = Some(enabled);
        }
        if enabled && self.scissor_rect != Some(rect) {
            gl.scissor(rect.0, rect.1, rect.2, rect.3);
            self.scissor_rect = Some(rect);
        }
    }

    /// Select `unit` and bind `name` there, each side gated separately.
    /// Returns whether a driver bind was issued (callers use this to decide
    /// whether sampler parameters need refreshing).
    pub fn set_active_and_bound_texture(
        &mut self,
        gl: &dyn GlEs2,
        unit: u32,
        name: u32,
        target: u32,
        format: Option<PixelFormat>,
    ) -> bool {
        let slot = unit as usize;
        debug_assert!(slot < MAX_TEXTURE_UNITS);

        let binding = TextureBinding { name, target };
        if self.bound_textures[slot] == Some(binding) {
            return false;
        }
        if self.active_texture_unit != Some(unit) {
            gl.active_texture(consts::TEXTURE0 + unit);
            self.active_texture_unit = Some(unit);
        }
        gl.bind_texture(target, name);
        if self.commit(gl, "bind_texture") {
            self.bound_textures[slot] = Some(binding);
            self.bound_formats[slot] = format;
            if format == Some(PixelFormat::Dxt5) {
                self.dxt5_mask |= 1 << slot;
            } else {
                self.dxt5_mask &= !(1 << slot);
            }
        }
        true
    }

    pub fn dxt5_mask(&self) -> u32 {
        self.dxt5_mask
    }

    pub fn bound_texture_format(&self, unit: u32) -> Option<PixelFormat> {
        self.bound_formats[unit as usize]
    }

    pub fn bind_array_buffer(&mut self, gl: &dyn GlEs2, name: u32) {
        if self.array_buffer == Some(name) {
            return;
        }
        gl.bind_buffer(consts::ARRAY_BUFFER, name);
        self.array_buffer = Some(name);
    }

    pub fn bind_element_array_buffer(&mut self, gl: &dyn GlEs2, name: u32) {
        if self.element_array_buffer == Some(name) {
            return;
        }
        gl.bind_buffer(consts::ELEMENT_ARRAY_BUFFER, name);
        self.element_array_buffer = Some(name);
    }

    /// Point attribute `slot` into `pointer.buffer`, gated on the whole
    /// `(buffer, size, type, normalized, stride, offset)` tuple.
    pub fn set_vertex_attrib(&mut self, gl: &dyn GlEs2, slot: u32, pointer: AttribPointer) {
        let index = slot as usize;
        debug_assert!(index < MAX_VERTEX_ATTRIBS);
        if self.attribs[index] == Some(pointer) {
            return;
        }
        self.bind_array_buffer(gl, pointer.buffer);
        gl.vertex_attrib_pointer(
            slot,
            pointer.size,
            pointer.ty,
            pointer.normalized,
            pointer.stride,
            pointer.offset,
        );
        if self.commit(gl, "set_vertex_attrib") {
            self.attribs[index] = Some(pointer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gl::{CallKind, GlCall, TraceGl};

    fn shadow() -> StateShadow {
        StateShadow::new(Arc::new(RhiStats::new()))
    }

    fn solid(cull: CullMode) -> RasterizerStateDesc {
        RasterizerStateDesc { fill_mode: FillMode::Solid, cull_mode: cull }
    }

    #[test]
    fn repeated_rasterizer_set_issues_no_second_call() {
        let gl = TraceGl::new();
        let mut shadow = shadow();
        shadow.set_rasterizer(&gl, solid(CullMode::Cw));
        let after_first = gl.total_calls();
        shadow.set_rasterizer(&gl, solid(CullMode::Cw));
        assert_eq!(gl.total_calls(), after_first);
    }

    #[test]
    fn invalidate_forces_reissue() {
        let gl = TraceGl::new();
        let mut shadow = shadow();
        shadow.set_color_write_mask(&gl, ColorWriteMask::RGBA);
        shadow.invalidate();
        shadow.set_color_write_mask(&gl, ColorWriteMask::RGBA);
        assert_eq!(gl.count(CallKind::ColorMask), 2);
    }

    #[test]
    fn driver_error_leaves_mirror_stale_for_retry() {
        let gl = TraceGl::new();
        let mut shadow = shadow();
        gl.script_error(ember_gl::consts::INVALID_ENUM);
        shadow.set_color_write_mask(&gl, ColorWriteMask::RGB);
        // The failed value must not be believed; the same set retries.
        shadow.set_color_write_mask(&gl, ColorWriteMask::RGB);
        assert_eq!(gl.count(CallKind::ColorMask), 2);
    }

    #[test]
    fn depth_sets_are_suppressed_without_a_depth_attachment() {
        let gl = TraceGl::new();
        let mut shadow = shadow();
        shadow.depth_attachment_present = false;
        shadow.set_depth(
            &gl,
            DepthStateDesc { depth_write_enabled: true, depth_test: CompareFunc::Less },
        );
        assert_eq!(gl.count(CallKind::DepthState), 0);
    }

    #[test]
    fn depth_only_issues_changed_subcalls() {
        let gl = TraceGl::new();
        let mut shadow = shadow();
        shadow.set_depth(
            &gl,
            DepthStateDesc { depth_write_enabled: true, depth_test: CompareFunc::LessEqual },
        );
        gl.clear_calls();
        // Same func, different mask: only glDepthMask goes out.
        shadow.set_depth(
            &gl,
            DepthStateDesc { depth_write_enabled: false, depth_test: CompareFunc::LessEqual },
        );
        assert_eq!(gl.calls(), vec![GlCall::DepthMask(false)]);
    }

    #[test]
    fn alpha_ref_change_does_not_touch_blend_state() {
        let gl = TraceGl::new();
        let mut shadow = shadow();
        let mut desc = BlendStateDesc {
            color_source_factor: BlendFactor::SrcAlpha,
            color_dest_factor: BlendFactor::InvSrcAlpha,
            ..BlendStateDesc::default()
        };
        shadow.set_blend(&gl, desc);
        let calls = gl.count(CallKind::BlendState);
        desc.alpha_ref = 0.5;
        shadow.set_blend(&gl, desc);
        assert_eq!(gl.count(CallKind::BlendState), calls);
        assert_eq!(shadow.blend_state().unwrap().alpha_ref, 0.5);
    }

    #[test]
    fn texture_bind_gates_on_unit_and_name() {
        let gl = TraceGl::new();
        let mut shadow = shadow();
        shadow.set_active_and_bound_texture(&gl, 0, 7, consts::TEXTURE_2D, None);
        shadow.set_active_and_bound_texture(&gl, 0, 7, consts::TEXTURE_2D, None);
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::BindTexture { .. })), 1);
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::ActiveTexture(_))), 1);

        // Same unit, new texture: bind without re-selecting the unit.
        shadow.set_active_and_bound_texture(&gl, 0, 8, consts::TEXTURE_2D, None);
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::BindTexture { .. })), 2);
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::ActiveTexture(_))), 1);
    }

    #[test]
    fn dxt5_mask_tracks_binds_per_unit() {
        let gl = TraceGl::new();
        let mut shadow = shadow();
        shadow.set_active_and_bound_texture(&gl, 2, 5, consts::TEXTURE_2D, Some(PixelFormat::Dxt5));
        assert_eq!(shadow.dxt5_mask(), 1 << 2);
        shadow.set_active_and_bound_texture(&gl, 2, 6, consts::TEXTURE_2D, Some(PixelFormat::Rgba8));
        assert_eq!(shadow.dxt5_mask(), 0);
    }

    #[test]
    fn attrib_pointer_gates_on_full_tuple() {
        let gl = TraceGl::new();
        let mut shadow = shadow();
        let pointer = AttribPointer {
            buffer: 3,
            size: 3,
            ty: consts::FLOAT,
            normalized: false,
            stride: 32,
            offset: 0,
        };
        shadow.set_vertex_attrib(&gl, 0, pointer);
        shadow.set_vertex_attrib(&gl, 0, pointer);
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::VertexAttribPointer { .. })), 1);

        shadow.set_vertex_attrib(&gl, 0, AttribPointer { offset: 12, ..pointer });
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::VertexAttribPointer { .. })), 2);
    }

    #[test]
    fn new_frame_distrusts_texture_and_buffer_bindings_only() {
        let gl = TraceGl::new();
        let mut shadow = shadow();
        shadow.set_rasterizer(&gl, solid(CullMode::Cw));
        shadow.set_active_and_bound_texture(&gl, 1, 9, consts::TEXTURE_2D, None);
        shadow.bind_array_buffer(&gl, 4);
        gl.clear_calls();

        shadow.new_frame();
        shadow.set_rasterizer(&gl, solid(CullMode::Cw));
        assert_eq!(gl.count(CallKind::RasterizerState), 0);
        shadow.set_active_and_bound_texture(&gl, 1, 9, consts::TEXTURE_2D, None);
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::BindTexture { .. })), 1);
        shadow.bind_array_buffer(&gl, 4);
        assert_eq!(gl.count_where(|c| matches!(c, GlCall::BindBuffer { .. })), 1);
    }
}
