//! A deterministic recording implementation of [`GlEs2`].
//!
//! `TraceGl` is the test double the RHI test suite runs against: it records
//! every driver call in order, exposes per-category counters, and lets a test
//! script the next `glGetError` results and shader-compile outcomes. It also
//! doubles as a call tracer when debugging redundant-state regressions: dump
//! [`TraceGl::calls`] and diff two frames.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::{consts, GlEs2};

/// One recorded driver call. Payloads are kept for the calls the test suite
/// asserts on; bulk-data entry points record sizes rather than contents.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    Enable(u32),
    Disable(u32),
    CullFace(u32),
    FrontFace(u32),
    PolygonOffset(f32, f32),
    DepthFunc(u32),
    DepthMask(bool),
    DepthRange(f32, f32),
    BlendFuncSeparate(u32, u32, u32, u32),
    BlendEquationSeparate(u32, u32),
    ColorMask(bool, bool, bool, bool),
    Viewport(i32, i32, i32, i32),
    Scissor(i32, i32, i32, i32),
    Clear(u32),
    ClearColor(f32, f32, f32, f32),
    ClearDepth(f32),
    ClearStencil(i32),
    GenTexture(u32),
    DeleteTexture(u32),
    ActiveTexture(u32),
    BindTexture { target: u32, name: u32 },
    TexParameterI(u32, u32, i32),
    TexParameterF(u32, u32, f32),
    TexImage2d { target: u32, level: i32, width: i32, height: i32, bytes: usize },
    TexSubImage2d { target: u32, level: i32, width: i32, height: i32, bytes: usize },
    CompressedTexImage2d { target: u32, level: i32, width: i32, height: i32, bytes: usize },
    GenerateMipmap(u32),
    PixelStoreI(u32, i32),
    ReadPixels { width: i32, height: i32 },
    GenBuffer(u32),
    DeleteBuffer(u32),
    BindBuffer { target: u32, name: u32 },
    BufferData { target: u32, size: usize, usage: u32 },
    BufferSubData { target: u32, offset: usize, bytes: usize },
    GenRenderbuffer(u32),
    DeleteRenderbuffer(u32),
    BindRenderbuffer(u32),
    RenderbufferStorage { format: u32, width: i32, height: i32 },
    GenFramebuffer(u32),
    DeleteFramebuffer(u32),
    BindFramebuffer(u32),
    FramebufferRenderbuffer { attachment: u32, renderbuffer: u32 },
    FramebufferTexture2d { attachment: u32, texture: u32 },
    CheckFramebufferStatus,
    DiscardFramebuffer { attachments: Vec<u32> },
    CreateShader { kind: u32, name: u32 },
    ShaderSource { shader: u32, len: usize },
    CompileShader(u32),
    DeleteShader(u32),
    CreateProgram(u32),
    AttachShader { program: u32, shader: u32 },
    DetachShader { program: u32, shader: u32 },
    LinkProgram(u32),
    UseProgram(u32),
    DeleteProgram(u32),
    Uniform1i { location: i32, value: i32 },
    Uniform1fv { location: i32, values: Vec<f32> },
    Uniform2fv { location: i32, values: Vec<f32> },
    Uniform3fv { location: i32, values: Vec<f32> },
    Uniform4fv { location: i32, values: Vec<f32> },
    UniformMatrix3fv { location: i32, count: usize },
    UniformMatrix4fv { location: i32, count: usize },
    EnableVertexAttribArray(u32),
    DisableVertexAttribArray(u32),
    VertexAttribPointer { index: u32, size: i32, ty: u32, normalized: bool, stride: i32, offset: usize },
    DrawArrays { mode: u32, first: i32, count: i32 },
    DrawElements { mode: u32, count: i32, index_type: u32, offset: usize },
    GenQuery(u32),
    DeleteQuery(u32),
    BeginQuery { target: u32, name: u32 },
    EndQuery(u32),
    Flush,
    Finish,
}

/// Coarse category of a [`GlCall`], for counter assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    RasterizerState,
    DepthState,
    BlendState,
    ColorMask,
    ViewportScissor,
    Clear,
    Texture,
    Buffer,
    Framebuffer,
    ShaderObject,
    Uniform,
    Attribute,
    Draw,
    Sync,
    Other,
}

impl GlCall {
    pub fn kind(&self) -> CallKind {
        use GlCall::*;
        match self {
            Enable(cap) | Disable(cap) => match *cap {
                consts::CULL_FACE | consts::POLYGON_OFFSET_FILL => CallKind::RasterizerState,
                consts::DEPTH_TEST => CallKind::DepthState,
                consts::BLEND => CallKind::BlendState,
                consts::SCISSOR_TEST => CallKind::ViewportScissor,
                _ => CallKind::Other,
            },
            CullFace(_) | FrontFace(_) | PolygonOffset(..) => CallKind::RasterizerState,
            DepthFunc(_) | DepthMask(_) | DepthRange(..) => CallKind::DepthState,
            BlendFuncSeparate(..) | BlendEquationSeparate(..) => CallKind::BlendState,
            ColorMask(..) => CallKind::ColorMask,
            Viewport(..) | Scissor(..) => CallKind::ViewportScissor,
            Clear(_) | ClearColor(..) | ClearDepth(_) | ClearStencil(_) => CallKind::Clear,
            GenTexture(_) | DeleteTexture(_) | ActiveTexture(_) | BindTexture { .. }
            | TexParameterI(..) | TexParameterF(..) | TexImage2d { .. } | TexSubImage2d { .. }
            | CompressedTexImage2d { .. } | GenerateMipmap(_) | PixelStoreI(..)
            | ReadPixels { .. } => CallKind::Texture,
            GenBuffer(_) | DeleteBuffer(_) | BindBuffer { .. } | BufferData { .. }
            | BufferSubData { .. } => CallKind::Buffer,
            GenRenderbuffer(_) | DeleteRenderbuffer(_) | BindRenderbuffer(_)
            | RenderbufferStorage { .. } | GenFramebuffer(_) | DeleteFramebuffer(_)
            | BindFramebuffer(_) | FramebufferRenderbuffer { .. } | FramebufferTexture2d { .. }
            | CheckFramebufferStatus | DiscardFramebuffer { .. } => CallKind::Framebuffer,
            CreateShader { .. } | ShaderSource { .. } | CompileShader(_) | DeleteShader(_)
            | CreateProgram(_) | AttachShader { .. } | DetachShader { .. } | LinkProgram(_)
            | UseProgram(_) | DeleteProgram(_) => CallKind::ShaderObject,
            Uniform1i { .. } | Uniform1fv { .. } | Uniform2fv { .. } | Uniform3fv { .. }
            | Uniform4fv { .. } | UniformMatrix3fv { .. } | UniformMatrix4fv { .. } => {
                CallKind::Uniform
            }
            EnableVertexAttribArray(_) | DisableVertexAttribArray(_)
            | VertexAttribPointer { .. } => CallKind::Attribute,
            DrawArrays { .. } | DrawElements { .. } => CallKind::Draw,
            GenQuery(_) | DeleteQuery(_) | BeginQuery { .. } | EndQuery(_) => CallKind::Other,
            Flush | Finish => CallKind::Sync,
        }
    }
}

/// Device identity and limits reported by a [`TraceGl`].
#[derive(Debug, Clone)]
pub struct TraceGlConfig {
    pub extensions: String,
    pub vendor: String,
    pub renderer: String,
    pub max_vertex_attribs: i32,
    pub max_texture_size: i32,
    pub max_texture_units: i32,
    pub max_anisotropy: i32,
}

impl Default for TraceGlConfig {
    fn default() -> Self {
        // A well-behaved DXT-capable device with discard support.
        Self {
            extensions: "GL_EXT_texture_compression_s3tc GL_OES_depth_texture \
                         GL_EXT_discard_framebuffer GL_OES_packed_depth_stencil \
                         GL_EXT_texture_filter_anisotropic GL_OES_mapbuffer"
                .to_owned(),
            vendor: "Imagination Technologies".to_owned(),
            renderer: "PowerVR SGX 540".to_owned(),
            max_vertex_attribs: 16,
            max_texture_size: 2048,
            max_texture_units: 8,
            max_anisotropy: 8,
        }
    }
}

/// Recording GL context. See the module docs.
#[derive(Debug)]
pub struct TraceGl {
    config: TraceGlConfig,
    calls: RefCell<Vec<GlCall>>,
    next_name: Cell<u32>,
    scripted_errors: RefCell<VecDeque<u32>>,
    failing_compiles: Cell<u32>,
    compile_log: RefCell<String>,
    framebuffer_status: Cell<u32>,
    /// Occlusion polls that must report "not yet" before one succeeds.
    query_results_pending: Cell<u32>,
    // Attribute/uniform locations are handed out in query order per program,
    // so masks and slots are deterministic across runs.
    locations: RefCell<Vec<(u32, String, i32)>>,
}

impl TraceGl {
    pub fn new() -> Self {
        Self::with_config(TraceGlConfig::default())
    }

    pub fn with_config(config: TraceGlConfig) -> Self {
        Self {
            config,
            calls: RefCell::new(Vec::new()),
            next_name: Cell::new(0),
            scripted_errors: RefCell::new(VecDeque::new()),
            failing_compiles: Cell::new(0),
            compile_log: RefCell::new(String::new()),
            framebuffer_status: Cell::new(consts::FRAMEBUFFER_COMPLETE),
            query_results_pending: Cell::new(0),
            locations: RefCell::new(Vec::new()),
        }
    }

    /// Make the next `n` occlusion polls report an unavailable result.
    pub fn delay_query_results(&self, n: u32) {
        self.query_results_pending.set(n);
    }

    /// All calls recorded so far, in issue order.
    pub fn calls(&self) -> Vec<GlCall> {
        self.calls.borrow().clone()
    }

    /// Forget recorded calls (counters reset too); scripted state is kept.
    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.borrow().iter().filter(|c| c.kind() == kind).count()
    }

    pub fn count_where(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Script the result of the next `get_error` poll. Multiple calls queue.
    pub fn script_error(&self, code: u32) {
        self.scripted_errors.borrow_mut().push_back(code);
    }

    /// Make the next `n` shader compiles report failure with `log`.
    pub fn fail_next_compiles(&self, n: u32, log: &str) {
        self.failing_compiles.set(n);
        *self.compile_log.borrow_mut() = log.to_owned();
    }

    /// Override the status reported by `check_framebuffer_status`.
    pub fn set_framebuffer_status(&self, status: u32) {
        self.framebuffer_status.set(status);
    }

    fn record(&self, call: GlCall) {
        self.calls.borrow_mut().push(call);
    }

    fn alloc_name(&self) -> u32 {
        let name = self.next_name.get() + 1;
        self.next_name.set(name);
        name
    }

    fn location_for(&self, program: u32, name: &str) -> i32 {
        let mut locations = self.locations.borrow_mut();
        if let Some((_, _, loc)) = locations
            .iter()
            .find(|(p, n, _)| *p == program && n == name)
        {
            return *loc;
        }
        let loc = locations.iter().filter(|(p, _, _)| *p == program).count() as i32;
        locations.push((program, name.to_owned(), loc));
        loc
    }
}

impl Default for TraceGl {
    fn default() -> Self {
        Self::new()
    }
}

impl GlEs2 for TraceGl {
    fn enable(&self, cap: u32) {
        self.record(GlCall::Enable(cap));
    }
    fn disable(&self, cap: u32) {
        self.record(GlCall::Disable(cap));
    }
    fn cull_face(&self, mode: u32) {
        self.record(GlCall::CullFace(mode));
    }
    fn front_face(&self, mode: u32) {
        self.record(GlCall::FrontFace(mode));
    }
    fn polygon_offset(&self, factor: f32, units: f32) {
        self.record(GlCall::PolygonOffset(factor, units));
    }
    fn depth_func(&self, func: u32) {
        self.record(GlCall::DepthFunc(func));
    }
    fn depth_mask(&self, write_enabled: bool) {
        self.record(GlCall::DepthMask(write_enabled));
    }
    fn depth_range(&self, near: f32, far: f32) {
        self.record(GlCall::DepthRange(near, far));
    }
    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.record(GlCall::BlendFuncSeparate(src_rgb, dst_rgb, src_alpha, dst_alpha));
    }
    fn blend_equation_separate(&self, mode_rgb: u32, mode_alpha: u32) {
        self.record(GlCall::BlendEquationSeparate(mode_rgb, mode_alpha));
    }
    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool) {
        self.record(GlCall::ColorMask(r, g, b, a));
    }
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport(x, y, width, height));
    }
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Scissor(x, y, width, height));
    }
    fn clear(&self, mask: u32) {
        self.record(GlCall::Clear(mask));
    }
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.record(GlCall::ClearColor(r, g, b, a));
    }
    fn clear_depth(&self, depth: f32) {
        self.record(GlCall::ClearDepth(depth));
    }
    fn clear_stencil(&self, value: i32) {
        self.record(GlCall::ClearStencil(value));
    }
    fn gen_texture(&self) -> u32 {
        let name = self.alloc_name();
        self.record(GlCall::GenTexture(name));
        name
    }
    fn delete_texture(&self, name: u32) {
        self.record(GlCall::DeleteTexture(name));
    }
    fn active_texture(&self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }
    fn bind_texture(&self, target: u32, name: u32) {
        self.record(GlCall::BindTexture { target, name });
    }
    fn tex_parameter_i(&self, target: u32, pname: u32, value: i32) {
        self.record(GlCall::TexParameterI(target, pname, value));
    }
    fn tex_parameter_f(&self, target: u32, pname: u32, value: f32) {
        self.record(GlCall::TexParameterF(target, pname, value));
    }
    fn tex_image_2d(
        &self,
        target: u32,
        level: i32,
        _internal_format: u32,
        width: i32,
        height: i32,
        _format: u32,
        _ty: u32,
        data: Option<&[u8]>,
    ) {
        self.record(GlCall::TexImage2d {
            target,
            level,
            width,
            height,
            bytes: data.map_or(0, <[u8]>::len),
        });
    }
    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        _x: i32,
        _y: i32,
        width: i32,
        height: i32,
        _format: u32,
        _ty: u32,
        data: &[u8],
    ) {
        self.record(GlCall::TexSubImage2d { target, level, width, height, bytes: data.len() });
    }
    fn compressed_tex_image_2d(
        &self,
        target: u32,
        level: i32,
        _internal_format: u32,
        width: i32,
        height: i32,
        data: &[u8],
    ) {
        self.record(GlCall::CompressedTexImage2d {
            target,
            level,
            width,
            height,
            bytes: data.len(),
        });
    }
    fn generate_mipmap(&self, target: u32) {
        self.record(GlCall::GenerateMipmap(target));
    }
    fn pixel_store_i(&self, pname: u32, value: i32) {
        self.record(GlCall::PixelStoreI(pname, value));
    }
    fn read_pixels(
        &self,
        _x: i32,
        _y: i32,
        width: i32,
        height: i32,
        _format: u32,
        _ty: u32,
        out: &mut [u8],
    ) {
        out.fill(0);
        self.record(GlCall::ReadPixels { width, height });
    }
    fn gen_buffer(&self) -> u32 {
        let name = self.alloc_name();
        self.record(GlCall::GenBuffer(name));
        name
    }
    fn delete_buffer(&self, name: u32) {
        self.record(GlCall::DeleteBuffer(name));
    }
    fn bind_buffer(&self, target: u32, name: u32) {
        self.record(GlCall::BindBuffer { target, name });
    }
    fn buffer_data(&self, target: u32, size: usize, _data: Option<&[u8]>, usage: u32) {
        self.record(GlCall::BufferData { target, size, usage });
    }
    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]) {
        self.record(GlCall::BufferSubData { target, offset, bytes: data.len() });
    }
    fn gen_renderbuffer(&self) -> u32 {
        let name = self.alloc_name();
        self.record(GlCall::GenRenderbuffer(name));
        name
    }
    fn delete_renderbuffer(&self, name: u32) {
        self.record(GlCall::DeleteRenderbuffer(name));
    }
    fn bind_renderbuffer(&self, name: u32) {
        self.record(GlCall::BindRenderbuffer(name));
    }
    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32) {
        self.record(GlCall::RenderbufferStorage { format: internal_format, width, height });
    }
    fn gen_framebuffer(&self) -> u32 {
        let name = self.alloc_name();
        self.record(GlCall::GenFramebuffer(name));
        name
    }
    fn delete_framebuffer(&self, name: u32) {
        self.record(GlCall::DeleteFramebuffer(name));
    }
    fn bind_framebuffer(&self, name: u32) {
        self.record(GlCall::BindFramebuffer(name));
    }
    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: u32) {
        self.record(GlCall::FramebufferRenderbuffer { attachment, renderbuffer });
    }
    fn framebuffer_texture_2d(&self, attachment: u32, _tex_target: u32, texture: u32, _level: i32) {
        self.record(GlCall::FramebufferTexture2d { attachment, texture });
    }
    fn check_framebuffer_status(&self) -> u32 {
        self.record(GlCall::CheckFramebufferStatus);
        self.framebuffer_status.get()
    }
    fn discard_framebuffer(&self, attachments: &[u32]) {
        self.record(GlCall::DiscardFramebuffer { attachments: attachments.to_vec() });
    }
    fn create_shader(&self, kind: u32) -> u32 {
        let name = self.alloc_name();
        self.record(GlCall::CreateShader { kind, name });
        name
    }
    fn shader_source(&self, shader: u32, source: &str) {
        self.record(GlCall::ShaderSource { shader, len: source.len() });
    }
    fn compile_shader(&self, shader: u32) {
        self.record(GlCall::CompileShader(shader));
    }
    fn shader_compile_status(&self, _shader: u32) -> bool {
        let remaining = self.failing_compiles.get();
        if remaining > 0 {
            self.failing_compiles.set(remaining - 1);
            false
        } else {
            true
        }
    }
    fn shader_info_log(&self, _shader: u32) -> String {
        self.compile_log.borrow().clone()
    }
    fn delete_shader(&self, shader: u32) {
        self.record(GlCall::DeleteShader(shader));
    }
    fn create_program(&self) -> u32 {
        let name = self.alloc_name();
        self.record(GlCall::CreateProgram(name));
        name
    }
    fn attach_shader(&self, program: u32, shader: u32) {
        self.record(GlCall::AttachShader { program, shader });
    }
    fn detach_shader(&self, program: u32, shader: u32) {
        self.record(GlCall::DetachShader { program, shader });
    }
    fn link_program(&self, program: u32) {
        self.record(GlCall::LinkProgram(program));
    }
    fn program_link_status(&self, _program: u32) -> bool {
        true
    }
    fn program_info_log(&self, _program: u32) -> String {
        String::new()
    }
    fn use_program(&self, program: u32) {
        self.record(GlCall::UseProgram(program));
    }
    fn delete_program(&self, program: u32) {
        self.record(GlCall::DeleteProgram(program));
    }
    fn attrib_location(&self, program: u32, name: &str) -> i32 {
        self.location_for(program, name)
    }
    fn uniform_location(&self, program: u32, name: &str) -> i32 {
        // Share the allocator with attributes; distinct namespaces are not
        // worth modeling for a trace.
        self.location_for(program, name)
    }
    fn uniform_1i(&self, location: i32, value: i32) {
        self.record(GlCall::Uniform1i { location, value });
    }
    fn uniform_1fv(&self, location: i32, values: &[f32]) {
        self.record(GlCall::Uniform1fv { location, values: values.to_vec() });
    }
    fn uniform_2fv(&self, location: i32, values: &[f32]) {
        self.record(GlCall::Uniform2fv { location, values: values.to_vec() });
    }
    fn uniform_3fv(&self, location: i32, values: &[f32]) {
        self.record(GlCall::Uniform3fv { location, values: values.to_vec() });
    }
    fn uniform_4fv(&self, location: i32, values: &[f32]) {
        self.record(GlCall::Uniform4fv { location, values: values.to_vec() });
    }
    fn uniform_matrix_3fv(&self, location: i32, values: &[f32]) {
        self.record(GlCall::UniformMatrix3fv { location, count: values.len() / 9 });
    }
    fn uniform_matrix_4fv(&self, location: i32, values: &[f32]) {
        self.record(GlCall::UniformMatrix4fv { location, count: values.len() / 16 });
    }
    fn enable_vertex_attrib_array(&self, index: u32) {
        self.record(GlCall::EnableVertexAttribArray(index));
    }
    fn disable_vertex_attrib_array(&self, index: u32) {
        self.record(GlCall::DisableVertexAttribArray(index));
    }
    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    ) {
        self.record(GlCall::VertexAttribPointer { index, size, ty, normalized, stride, offset });
    }
    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        self.record(GlCall::DrawArrays { mode, first, count });
    }
    fn draw_elements(&self, mode: u32, count: i32, index_type: u32, offset: usize) {
        self.record(GlCall::DrawElements { mode, count, index_type, offset });
    }
    fn gen_query(&self) -> u32 {
        let name = self.alloc_name();
        self.record(GlCall::GenQuery(name));
        name
    }
    fn delete_query(&self, name: u32) {
        self.record(GlCall::DeleteQuery(name));
    }
    fn begin_query(&self, target: u32, name: u32) {
        self.record(GlCall::BeginQuery { target, name });
    }
    fn end_query(&self, target: u32) {
        self.record(GlCall::EndQuery(target));
    }
    fn query_result_available(&self, _name: u32) -> bool {
        let pending = self.query_results_pending.get();
        if pending > 0 {
            self.query_results_pending.set(pending - 1);
            false
        } else {
            true
        }
    }
    fn query_result(&self, _name: u32) -> u32 {
        1
    }
    fn get_error(&self) -> u32 {
        self.scripted_errors
            .borrow_mut()
            .pop_front()
            .unwrap_or(consts::NO_ERROR)
    }
    fn get_integer(&self, pname: u32) -> i32 {
        match pname {
            consts::MAX_VERTEX_ATTRIBS => self.config.max_vertex_attribs,
            consts::MAX_TEXTURE_SIZE => self.config.max_texture_size,
            consts::MAX_TEXTURE_IMAGE_UNITS => self.config.max_texture_units,
            consts::MAX_TEXTURE_MAX_ANISOTROPY_EXT => self.config.max_anisotropy,
            _ => 0,
        }
    }
    fn get_string(&self, pname: u32) -> String {
        match pname {
            consts::EXTENSIONS => self.config.extensions.clone(),
            consts::VENDOR => self.config.vendor.clone(),
            consts::RENDERER => self.config.renderer.clone(),
            consts::VERSION => "OpenGL ES 2.0".to_owned(),
            _ => String::new(),
        }
    }
    fn flush(&self) {
        self.record(GlCall::Flush);
    }
    fn finish(&self) {
        self.record(GlCall::Finish);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_are_unique_across_object_kinds() {
        let gl = TraceGl::new();
        let t = gl.gen_texture();
        let b = gl.gen_buffer();
        let f = gl.gen_framebuffer();
        assert!(t != b && b != f && t != f);
    }

    #[test]
    fn scripted_errors_drain_in_order() {
        let gl = TraceGl::new();
        gl.script_error(consts::INVALID_ENUM);
        gl.script_error(consts::OUT_OF_MEMORY);
        assert_eq!(gl.get_error(), consts::INVALID_ENUM);
        assert_eq!(gl.get_error(), consts::OUT_OF_MEMORY);
        assert_eq!(gl.get_error(), consts::NO_ERROR);
    }

    #[test]
    fn locations_are_stable_per_program() {
        let gl = TraceGl::new();
        let p = gl.create_program();
        let a = gl.attrib_location(p, "Position");
        let b = gl.attrib_location(p, "TexCoords0");
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(gl.attrib_location(p, "Position"), 0);

        let q = gl.create_program();
        assert_eq!(gl.attrib_location(q, "TexCoords0"), 0);
    }

    #[test]
    fn call_kinds_classify_state_groups() {
        let gl = TraceGl::new();
        gl.enable(consts::CULL_FACE);
        gl.cull_face(consts::BACK);
        gl.depth_func(consts::LEQUAL);
        gl.color_mask(true, true, true, false);
        assert_eq!(gl.count(CallKind::RasterizerState), 2);
        assert_eq!(gl.count(CallKind::DepthState), 1);
        assert_eq!(gl.count(CallKind::ColorMask), 1);
    }

    #[test]
    fn failed_compiles_are_scripted_and_finite() {
        let gl = TraceGl::new();
        gl.fail_next_compiles(1, "0:12: '' : syntax error");
        let s = gl.create_shader(consts::VERTEX_SHADER);
        assert!(!gl.shader_compile_status(s));
        assert!(gl.shader_info_log(s).contains("syntax error"));
        assert!(gl.shader_compile_status(s));
    }
}
