//! [`GlEs2`] implemented over a live [`glow::Context`].
//!
//! glow wraps GL object names in `NonZero` newtypes; this adapter converts
//! back and forth so the RHI can keep raw `u32` names in its state shadow
//! (name `0` means "unbound", exactly as in the C API). Native targets only;
//! the WebGL backend keys objects by slotmap and cannot round-trip names.
use std::num::NonZeroU32;

use glow::HasContext;
use tracing::warn;

use crate::GlEs2;

pub struct GlowContext {
    gl: glow::Context,
}

impl GlowContext {
    pub fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    pub fn raw(&self) -> &glow::Context {
        &self.gl
    }
}

fn nz(name: u32) -> Option<NonZeroU32> {
    NonZeroU32::new(name)
}

fn texture(name: u32) -> Option<glow::NativeTexture> {
    nz(name).map(glow::NativeTexture)
}

fn buffer(name: u32) -> Option<glow::NativeBuffer> {
    nz(name).map(glow::NativeBuffer)
}

fn renderbuffer(name: u32) -> Option<glow::NativeRenderbuffer> {
    nz(name).map(glow::NativeRenderbuffer)
}

fn framebuffer(name: u32) -> Option<glow::NativeFramebuffer> {
    nz(name).map(glow::NativeFramebuffer)
}

fn shader(name: u32) -> Option<glow::NativeShader> {
    nz(name).map(glow::NativeShader)
}

fn program(name: u32) -> Option<glow::NativeProgram> {
    nz(name).map(glow::NativeProgram)
}

fn uniform(location: i32) -> Option<glow::NativeUniformLocation> {
    u32::try_from(location).ok().map(glow::NativeUniformLocation)
}

fn query(name: u32) -> Option<glow::NativeQuery> {
    nz(name).map(glow::NativeQuery)
}

impl GlEs2 for GlowContext {
    fn enable(&self, cap: u32) {
        unsafe { self.gl.enable(cap) }
    }
    fn disable(&self, cap: u32) {
        unsafe { self.gl.disable(cap) }
    }
    fn cull_face(&self, mode: u32) {
        unsafe { self.gl.cull_face(mode) }
    }
    fn front_face(&self, mode: u32) {
        unsafe { self.gl.front_face(mode) }
    }
    fn polygon_offset(&self, factor: f32, units: f32) {
        unsafe { self.gl.polygon_offset(factor, units) }
    }
    fn depth_func(&self, func: u32) {
        unsafe { self.gl.depth_func(func) }
    }
    fn depth_mask(&self, write_enabled: bool) {
        unsafe { self.gl.depth_mask(write_enabled) }
    }
    fn depth_range(&self, near: f32, far: f32) {
        unsafe { self.gl.depth_range_f32(near, far) }
    }
    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        unsafe { self.gl.blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha) }
    }
    fn blend_equation_separate(&self, mode_rgb: u32, mode_alpha: u32) {
        unsafe { self.gl.blend_equation_separate(mode_rgb, mode_alpha) }
    }
    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool) {
        unsafe { self.gl.color_mask(r, g, b, a) }
    }
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.scissor(x, y, width, height) }
    }
    fn clear(&self, mask: u32) {
        unsafe { self.gl.clear(mask) }
    }
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }
    fn clear_depth(&self, depth: f32) {
        unsafe { self.gl.clear_depth_f32(depth) }
    }
    fn clear_stencil(&self, value: i32) {
        unsafe { self.gl.clear_stencil(value) }
    }
    fn gen_texture(&self) -> u32 {
        match unsafe { self.gl.create_texture() } {
            Ok(t) => t.0.get(),
            Err(err) => {
                warn!(%err, "glGenTextures failed");
                0
            }
        }
    }
    fn delete_texture(&self, name: u32) {
        if let Some(t) = texture(name) {
            unsafe { self.gl.delete_texture(t) }
        }
    }
    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(unit) }
    }
    fn bind_texture(&self, target: u32, name: u32) {
        unsafe { self.gl.bind_texture(target, texture(name)) }
    }
    fn tex_parameter_i(&self, target: u32, pname: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, pname, value) }
    }
    fn tex_parameter_f(&self, target: u32, pname: u32, value: f32) {
        unsafe { self.gl.tex_parameter_f32(target, pname, value) }
    }
    fn tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        data: Option<&[u8]>,
    ) {
        unsafe {
            self.gl
                .tex_image_2d(target, level, internal_format as i32, width, height, 0, format, ty, data)
        }
    }
    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        data: &[u8],
    ) {
        unsafe {
            self.gl.tex_sub_image_2d(
                target,
                level,
                x,
                y,
                width,
                height,
                format,
                ty,
                glow::PixelUnpackData::Slice(data),
            )
        }
    }
    fn compressed_tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        data: &[u8],
    ) {
        unsafe {
            self.gl.compressed_tex_image_2d(
                target,
                level,
                internal_format as i32,
                width,
                height,
                0,
                data.len() as i32,
                data,
            )
        }
    }
    fn generate_mipmap(&self, target: u32) {
        unsafe { self.gl.generate_mipmap(target) }
    }
    fn pixel_store_i(&self, pname: u32, value: i32) {
        unsafe { self.gl.pixel_store_i32(pname, value) }
    }
    fn read_pixels(&self, x: i32, y: i32, width: i32, height: i32, format: u32, ty: u32, out: &mut [u8]) {
        unsafe {
            self.gl
                .read_pixels(x, y, width, height, format, ty, glow::PixelPackData::Slice(out))
        }
    }
    fn gen_buffer(&self) -> u32 {
        match unsafe { self.gl.create_buffer() } {
            Ok(b) => b.0.get(),
            Err(err) => {
                warn!(%err, "glGenBuffers failed");
                0
            }
        }
    }
    fn delete_buffer(&self, name: u32) {
        if let Some(b) = buffer(name) {
            unsafe { self.gl.delete_buffer(b) }
        }
    }
    fn bind_buffer(&self, target: u32, name: u32) {
        unsafe { self.gl.bind_buffer(target, buffer(name)) }
    }
    fn buffer_data(&self, target: u32, size: usize, data: Option<&[u8]>, usage: u32) {
        unsafe {
            match data {
                Some(bytes) => self.gl.buffer_data_u8_slice(target, bytes, usage),
                None => self.gl.buffer_data_size(target, size as i32, usage),
            }
        }
    }
    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]) {
        unsafe { self.gl.buffer_sub_data_u8_slice(target, offset as i32, data) }
    }
    fn gen_renderbuffer(&self) -> u32 {
        match unsafe { self.gl.create_renderbuffer() } {
            Ok(rb) => rb.0.get(),
            Err(err) => {
                warn!(%err, "glGenRenderbuffers failed");
                0
            }
        }
    }
    fn delete_renderbuffer(&self, name: u32) {
        if let Some(rb) = renderbuffer(name) {
            unsafe { self.gl.delete_renderbuffer(rb) }
        }
    }
    fn bind_renderbuffer(&self, name: u32) {
        unsafe { self.gl.bind_renderbuffer(glow::RENDERBUFFER, renderbuffer(name)) }
    }
    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32) {
        unsafe {
            self.gl
                .renderbuffer_storage(glow::RENDERBUFFER, internal_format, width, height)
        }
    }
    fn gen_framebuffer(&self) -> u32 {
        match unsafe { self.gl.create_framebuffer() } {
            Ok(fb) => fb.0.get(),
            Err(err) => {
                warn!(%err, "glGenFramebuffers failed");
                0
            }
        }
    }
    fn delete_framebuffer(&self, name: u32) {
        if let Some(fb) = framebuffer(name) {
            unsafe { self.gl.delete_framebuffer(fb) }
        }
    }
    fn bind_framebuffer(&self, name: u32) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer(name)) }
    }
    fn framebuffer_renderbuffer(&self, attachment: u32, rb: u32) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                attachment,
                glow::RENDERBUFFER,
                renderbuffer(rb),
            )
        }
    }
    fn framebuffer_texture_2d(&self, attachment: u32, tex_target: u32, tex: u32, level: i32) {
        unsafe {
            self.gl
                .framebuffer_texture_2d(glow::FRAMEBUFFER, attachment, tex_target, texture(tex), level)
        }
    }
    fn check_framebuffer_status(&self) -> u32 {
        unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) }
    }
    fn discard_framebuffer(&self, attachments: &[u32]) {
        unsafe { self.gl.invalidate_framebuffer(glow::FRAMEBUFFER, attachments) }
    }
    fn create_shader(&self, kind: u32) -> u32 {
        match unsafe { self.gl.create_shader(kind) } {
            Ok(s) => s.0.get(),
            Err(err) => {
                warn!(%err, "glCreateShader failed");
                0
            }
        }
    }
    fn shader_source(&self, name: u32, source: &str) {
        if let Some(s) = shader(name) {
            unsafe { self.gl.shader_source(s, source) }
        }
    }
    fn compile_shader(&self, name: u32) {
        if let Some(s) = shader(name) {
            unsafe { self.gl.compile_shader(s) }
        }
    }
    fn shader_compile_status(&self, name: u32) -> bool {
        shader(name).is_some_and(|s| unsafe { self.gl.get_shader_compile_status(s) })
    }
    fn shader_info_log(&self, name: u32) -> String {
        shader(name).map_or_else(String::new, |s| unsafe { self.gl.get_shader_info_log(s) })
    }
    fn delete_shader(&self, name: u32) {
        if let Some(s) = shader(name) {
            unsafe { self.gl.delete_shader(s) }
        }
    }
    fn create_program(&self) -> u32 {
        match unsafe { self.gl.create_program() } {
            Ok(p) => p.0.get(),
            Err(err) => {
                warn!(%err, "glCreateProgram failed");
                0
            }
        }
    }
    fn attach_shader(&self, prog: u32, shdr: u32) {
        if let (Some(p), Some(s)) = (program(prog), shader(shdr)) {
            unsafe { self.gl.attach_shader(p, s) }
        }
    }
    fn detach_shader(&self, prog: u32, shdr: u32) {
        if let (Some(p), Some(s)) = (program(prog), shader(shdr)) {
            unsafe { self.gl.detach_shader(p, s) }
        }
    }
    fn link_program(&self, name: u32) {
        if let Some(p) = program(name) {
            unsafe { self.gl.link_program(p) }
        }
    }
    fn program_link_status(&self, name: u32) -> bool {
        program(name).is_some_and(|p| unsafe { self.gl.get_program_link_status(p) })
    }
    fn program_info_log(&self, name: u32) -> String {
        program(name).map_or_else(String::new, |p| unsafe { self.gl.get_program_info_log(p) })
    }
    fn use_program(&self, name: u32) {
        unsafe { self.gl.use_program(program(name)) }
    }
    fn delete_program(&self, name: u32) {
        if let Some(p) = program(name) {
            unsafe { self.gl.delete_program(p) }
        }
    }
    fn attrib_location(&self, prog: u32, attr_name: &str) -> i32 {
        program(prog)
            .and_then(|p| unsafe { self.gl.get_attrib_location(p, attr_name) })
            .map_or(-1, |loc| loc as i32)
    }
    fn uniform_location(&self, prog: u32, uniform_name: &str) -> i32 {
        program(prog)
            .and_then(|p| unsafe { self.gl.get_uniform_location(p, uniform_name) })
            .map_or(-1, |loc| loc.0 as i32)
    }
    fn uniform_1i(&self, location: i32, value: i32) {
        unsafe { self.gl.uniform_1_i32(uniform(location).as_ref(), value) }
    }
    fn uniform_1fv(&self, location: i32, values: &[f32]) {
        unsafe { self.gl.uniform_1_f32_slice(uniform(location).as_ref(), values) }
    }
    fn uniform_2fv(&self, location: i32, values: &[f32]) {
        unsafe { self.gl.uniform_2_f32_slice(uniform(location).as_ref(), values) }
    }
    fn uniform_3fv(&self, location: i32, values: &[f32]) {
        unsafe { self.gl.uniform_3_f32_slice(uniform(location).as_ref(), values) }
    }
    fn uniform_4fv(&self, location: i32, values: &[f32]) {
        unsafe { self.gl.uniform_4_f32_slice(uniform(location).as_ref(), values) }
    }
    fn uniform_matrix_3fv(&self, location: i32, values: &[f32]) {
        unsafe {
            self.gl
                .uniform_matrix_3_f32_slice(uniform(location).as_ref(), false, values)
        }
    }
    fn uniform_matrix_4fv(&self, location: i32, values: &[f32]) {
        unsafe {
            self.gl
                .uniform_matrix_4_f32_slice(uniform(location).as_ref(), false, values)
        }
    }
    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }
    fn disable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(index) }
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
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, ty, normalized, stride, offset as i32)
        }
    }
    fn draw_arrays(&self, mode: u32, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(mode, first, count) }
    }
    fn draw_elements(&self, mode: u32, count: i32, index_type: u32, offset: usize) {
        unsafe { self.gl.draw_elements(mode, count, index_type, offset as i32) }
    }
    fn gen_query(&self) -> u32 {
        match unsafe { self.gl.create_query() } {
            Ok(q) => q.0.get(),
            Err(err) => {
                warn!(%err, "glGenQueries failed");
                0
            }
        }
    }
    fn delete_query(&self, name: u32) {
        if let Some(q) = query(name) {
            unsafe { self.gl.delete_query(q) }
        }
    }
    fn begin_query(&self, target: u32, name: u32) {
        if let Some(q) = query(name) {
            unsafe { self.gl.begin_query(target, q) }
        }
    }
    fn end_query(&self, target: u32) {
        unsafe { self.gl.end_query(target) }
    }
    fn query_result_available(&self, name: u32) -> bool {
        query(name).is_some_and(|q| unsafe {
            self.gl
                .get_query_parameter_u32(q, crate::consts::QUERY_RESULT_AVAILABLE_EXT)
                != 0
        })
    }
    fn query_result(&self, name: u32) -> u32 {
        query(name).map_or(0, |q| unsafe {
            self.gl.get_query_parameter_u32(q, crate::consts::QUERY_RESULT_EXT)
        })
    }
    fn get_error(&self) -> u32 {
        unsafe { self.gl.get_error() }
    }
    fn get_integer(&self, pname: u32) -> i32 {
        unsafe { self.gl.get_parameter_i32(pname) }
    }
    fn get_string(&self, pname: u32) -> String {
        unsafe { self.gl.get_parameter_string(pname) }
    }
    fn flush(&self) {
        unsafe { self.gl.flush() }
    }
    fn finish(&self) {
        unsafe { self.gl.finish() }
    }
}
