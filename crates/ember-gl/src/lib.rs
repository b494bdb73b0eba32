//! `ember-gl` is the driver seam between the ES2 RHI and an OpenGL ES 2.0
//! implementation.
//!
//! The RHI never calls a GL loader directly; it talks to the [`GlEs2`] trait,
//! which mirrors exactly the ES 2.0 entry points the renderer issues. Two
//! implementations ship here:
//! - [`TraceGl`]: a deterministic recording context used by tests and debug
//!   tooling. It logs every call, keeps per-category counters, and can script
//!   `glGetError` results and shader-compile failures.
//! - [`GlowContext`]: an adapter over a real [`glow::Context`].
//!
//! Object names are raw `u32` GL names throughout, so a trace and a live
//! driver behave identically from the RHI's point of view.

pub mod consts;
#[cfg(not(target_arch = "wasm32"))]
mod glow_context;
mod trace;

#[cfg(not(target_arch = "wasm32"))]
pub use glow_context::GlowContext;
pub use trace::{CallKind, GlCall, TraceGl, TraceGlConfig};

use thiserror::Error;

/// A nonzero value returned by `glGetError`, tagged with the call site that
/// observed it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("GL error {code:#06x} at {site}")]
pub struct GlDriverError {
    pub code: u32,
    pub site: &'static str,
}

/// The subset of OpenGL ES 2.0 used by the RHI.
///
/// Methods take `&self`: a GL context is thread-bound global state, and the
/// RHI enforces single-thread ownership above this layer. Implementations may
/// use interior mutability for bookkeeping.
pub trait GlEs2 {
    // Capability and rasterizer state.
    fn enable(&self, cap: u32);
    fn disable(&self, cap: u32);
    fn cull_face(&self, mode: u32);
    fn front_face(&self, mode: u32);
    fn polygon_offset(&self, factor: f32, units: f32);

    // Depth state.
    fn depth_func(&self, func: u32);
    fn depth_mask(&self, write_enabled: bool);
    fn depth_range(&self, near: f32, far: f32);

    // Blend and color-mask state.
    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);
    fn blend_equation_separate(&self, mode_rgb: u32, mode_alpha: u32);
    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool);

    // Viewport, scissor, clears.
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32);
    fn clear(&self, mask: u32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear_depth(&self, depth: f32);
    fn clear_stencil(&self, value: i32);

    // Textures.
    fn gen_texture(&self) -> u32;
    fn delete_texture(&self, name: u32);
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, name: u32);
    fn tex_parameter_i(&self, target: u32, pname: u32, value: i32);
    fn tex_parameter_f(&self, target: u32, pname: u32, value: f32);
    #[allow(clippy::too_many_arguments)]
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
    );
    #[allow(clippy::too_many_arguments)]
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
    );
    fn compressed_tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: u32,
        width: i32,
        height: i32,
        data: &[u8],
    );
    fn generate_mipmap(&self, target: u32);
    fn pixel_store_i(&self, pname: u32, value: i32);
    #[allow(clippy::too_many_arguments)]
    fn read_pixels(&self, x: i32, y: i32, width: i32, height: i32, format: u32, ty: u32, out: &mut [u8]);

    // Buffers.
    fn gen_buffer(&self) -> u32;
    fn delete_buffer(&self, name: u32);
    fn bind_buffer(&self, target: u32, name: u32);
    fn buffer_data(&self, target: u32, size: usize, data: Option<&[u8]>, usage: u32);
    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]);

    // Renderbuffers and framebuffers. The target is always `GL_FRAMEBUFFER` /
    // `GL_RENDERBUFFER` on ES2, so it is folded into the method.
    fn gen_renderbuffer(&self) -> u32;
    fn delete_renderbuffer(&self, name: u32);
    fn bind_renderbuffer(&self, name: u32);
    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32);
    fn gen_framebuffer(&self) -> u32;
    fn delete_framebuffer(&self, name: u32);
    fn bind_framebuffer(&self, name: u32);
    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: u32);
    fn framebuffer_texture_2d(&self, attachment: u32, tex_target: u32, texture: u32, level: i32);
    fn check_framebuffer_status(&self) -> u32;
    /// `GL_EXT_discard_framebuffer`. Callers must gate this on the probed
    /// capability; implementations may treat it as a hint and do nothing.
    fn discard_framebuffer(&self, attachments: &[u32]);

    // Shaders and programs.
    fn create_shader(&self, kind: u32) -> u32;
    fn shader_source(&self, shader: u32, source: &str);
    fn compile_shader(&self, shader: u32);
    fn shader_compile_status(&self, shader: u32) -> bool;
    fn shader_info_log(&self, shader: u32) -> String;
    fn delete_shader(&self, shader: u32);
    fn create_program(&self) -> u32;
    fn attach_shader(&self, program: u32, shader: u32);
    fn detach_shader(&self, program: u32, shader: u32);
    fn link_program(&self, program: u32);
    fn program_link_status(&self, program: u32) -> bool;
    fn program_info_log(&self, program: u32) -> String;
    fn use_program(&self, program: u32);
    fn delete_program(&self, program: u32);
    /// Returns `-1` when the attribute is not active in the linked program.
    fn attrib_location(&self, program: u32, name: &str) -> i32;
    /// Returns `-1` when the uniform is not active in the linked program.
    fn uniform_location(&self, program: u32, name: &str) -> i32;

    // Uniform uploads. Vector forms carry the element count implicitly in the
    // slice length (`values.len() / components`).
    fn uniform_1i(&self, location: i32, value: i32);
    fn uniform_1fv(&self, location: i32, values: &[f32]);
    fn uniform_2fv(&self, location: i32, values: &[f32]);
    fn uniform_3fv(&self, location: i32, values: &[f32]);
    fn uniform_4fv(&self, location: i32, values: &[f32]);
    fn uniform_matrix_3fv(&self, location: i32, values: &[f32]);
    fn uniform_matrix_4fv(&self, location: i32, values: &[f32]);

    // Vertex attributes.
    fn enable_vertex_attrib_array(&self, index: u32);
    fn disable_vertex_attrib_array(&self, index: u32);
    #[allow(clippy::too_many_arguments)]
    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: usize,
    );

    // Draws.
    fn draw_arrays(&self, mode: u32, first: i32, count: i32);
    fn draw_elements(&self, mode: u32, count: i32, index_type: u32, offset: usize);

    // Occlusion queries (`GL_EXT_occlusion_query_boolean`). Callers gate on
    // the probed capability; the default trace reports results immediately.
    fn gen_query(&self) -> u32;
    fn delete_query(&self, name: u32);
    fn begin_query(&self, target: u32, name: u32);
    fn end_query(&self, target: u32);
    fn query_result_available(&self, name: u32) -> bool;
    fn query_result(&self, name: u32) -> u32;

    // Queries and synchronization.
    fn get_error(&self) -> u32;
    fn get_integer(&self, pname: u32) -> i32;
    fn get_string(&self, pname: u32) -> String;
    fn flush(&self);
    fn finish(&self);
}

/// Polls `glGetError` once and converts a nonzero code into an error value.
///
/// State setters use this to decide whether to commit their shadow update: on
/// a driver error the shadow keeps its old value so the next set retries.
pub fn check_error(gl: &dyn GlEs2, site: &'static str) -> Result<(), GlDriverError> {
    let code = gl.get_error();
    if code == consts::NO_ERROR {
        Ok(())
    } else {
        tracing::error!(code, site, "glGetError reported failure");
        Err(GlDriverError { code, site })
    }
}
