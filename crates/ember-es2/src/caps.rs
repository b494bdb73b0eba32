//! Device probing.
//!
//! At first viewport creation the core reads `GL_EXTENSIONS`, `GL_VENDOR`,
//! `GL_RENDERER` and the integer limits, and distills them into a flat
//! [`DeviceCapabilities`] record. Everything downstream branches on these
//! bits, never on vendor strings at the call site, and the record is
//! immutable for the life of the process.

use bitflags::bitflags;
use ember_gl::{consts, GlEs2};
use tracing::debug;

bitflags! {
    /// Compressed texture families the driver advertises.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TextureCompression: u8 {
        const DXT   = 1 << 0;
        const PVRTC = 1 << 1;
        const ATITC = 1 << 2;
        const ETC1  = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub vendor: String,
    pub renderer: String,

    pub compression: TextureCompression,
    pub supports_depth_textures: bool,
    pub supports_discard: bool,
    pub supports_packed_depth_stencil: bool,
    pub supports_16bit_nonlinear_depth: bool,
    pub supports_half_float_attribs: bool,
    pub supports_map_buffer: bool,
    pub supports_anisotropy: bool,
    pub supports_occlusion_queries: bool,

    /// `discard` works in fragment shaders. Off on Adreno 205 parts, where
    /// the compiler miscompiles alpha-test paths.
    pub allows_shader_discard: bool,
    /// Texture-coordinate offsets behave; off on Mali-400 MP, which breaks
    /// bump-offset UV math.
    pub allows_bump_offset: bool,
    /// The GPU is a tiled renderer and benefits from framebuffer discard
    /// hints before present. Off on NVIDIA parts.
    pub tiled_renderer: bool,
    /// `glCheckFramebufferStatus` can be trusted. Off on Qualcomm drivers
    /// that misreport valid combined depth/stencil attachments.
    pub reliable_framebuffer_status: bool,

    pub max_anisotropy: i32,
    pub max_vertex_attribs: i32,
    pub max_texture_size: i32,
    pub max_texture_units: i32,
}

impl DeviceCapabilities {
    /// Probe the driver. Pure: the result is a function of the driver's
    /// strings and integer queries only.
    pub fn probe(gl: &dyn GlEs2) -> Self {
        // Pad the extension string so every token check can use delimiters.
        let extensions = format!(" {} ", gl.get_string(consts::EXTENSIONS));
        let has = |token: &str| extensions.contains(&format!(" {token} "));

        let vendor = gl.get_string(consts::VENDOR);
        let renderer = gl.get_string(consts::RENDERER);

        let mut compression = TextureCompression::empty();
        compression.set(TextureCompression::DXT, has("GL_EXT_texture_compression_s3tc"));
        compression.set(TextureCompression::PVRTC, has("GL_IMG_texture_compression_pvrtc"));
        compression.set(
            TextureCompression::ATITC,
            has("GL_ATI_texture_compression_atitc") || has("GL_AMD_compressed_ATC_texture"),
        );
        compression.set(TextureCompression::ETC1, has("GL_OES_compressed_ETC1_RGB8_texture"));

        let supports_anisotropy = has("GL_EXT_texture_filter_anisotropic");
        let max_anisotropy = if supports_anisotropy {
            gl.get_integer(consts::MAX_TEXTURE_MAX_ANISOTROPY_EXT).max(1)
        } else {
            1
        };

        let caps = Self {
            compression,
            supports_depth_textures: has("GL_OES_depth_texture") || has("GL_ARB_depth_texture"),
            supports_discard: has("GL_EXT_discard_framebuffer"),
            supports_packed_depth_stencil: has("GL_OES_packed_depth_stencil")
                || has("OES_packed_depth_stencil"),
            supports_16bit_nonlinear_depth: has("GL_NV_depth_nonlinear"),
            supports_half_float_attribs: has("GL_OES_vertex_half_float"),
            supports_map_buffer: has("GL_OES_mapbuffer"),
            supports_anisotropy,
            // Disabled everywhere for now; per-platform conditions may turn
            // this on when the EXT is present and the driver is trustworthy.
            supports_occlusion_queries: false,

            // Newer drivers rebrand the Adreno 205 as "Adreno (TM) 205";
            // match both.
            allows_shader_discard: renderer != "Adreno 205" && renderer != "Adreno (TM) 205",
            allows_bump_offset: !renderer.contains("Mali-400 MP"),
            tiled_renderer: !vendor.contains("NVIDIA"),
            reliable_framebuffer_status: !vendor.contains("Qualcomm"),

            max_anisotropy,
            max_vertex_attribs: gl.get_integer(consts::MAX_VERTEX_ATTRIBS).max(8),
            max_texture_size: gl.get_integer(consts::MAX_TEXTURE_SIZE).max(64),
            max_texture_units: gl.get_integer(consts::MAX_TEXTURE_IMAGE_UNITS).max(8),

            vendor,
            renderer,
        };

        debug!(
            vendor = %caps.vendor,
            renderer = %caps.renderer,
            compression = ?caps.compression,
            depth_textures = caps.supports_depth_textures,
            discard = caps.supports_discard,
            shader_discard = caps.allows_shader_discard,
            bump_offset = caps.allows_bump_offset,
            tiled = caps.tiled_renderer,
            "device probe"
        );
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gl::{TraceGl, TraceGlConfig};

    fn probe_with(vendor: &str, renderer: &str, extensions: &str) -> DeviceCapabilities {
        let gl = TraceGl::with_config(TraceGlConfig {
            vendor: vendor.to_owned(),
            renderer: renderer.to_owned(),
            extensions: extensions.to_owned(),
            ..TraceGlConfig::default()
        });
        DeviceCapabilities::probe(&gl)
    }

    #[test]
    fn default_device_supports_dxt_and_discard() {
        let gl = TraceGl::new();
        let caps = DeviceCapabilities::probe(&gl);
        assert!(caps.compression.contains(TextureCompression::DXT));
        assert!(caps.supports_discard);
        assert!(caps.allows_shader_discard);
        assert!(caps.reliable_framebuffer_status);
        assert_eq!(caps.max_anisotropy, 8);
    }

    #[test]
    fn adreno_205_loses_shader_discard() {
        let caps = probe_with("Qualcomm", "Adreno (TM) 205", "GL_AMD_compressed_ATC_texture");
        assert!(!caps.allows_shader_discard);
        assert!(!caps.reliable_framebuffer_status);
        assert!(caps.compression.contains(TextureCompression::ATITC));
    }

    #[test]
    fn mali_400_loses_bump_offset() {
        let caps = probe_with("ARM", "Mali-400 MP", "GL_OES_compressed_ETC1_RGB8_texture");
        assert!(!caps.allows_bump_offset);
        assert!(caps.tiled_renderer);
        assert!(caps.compression.contains(TextureCompression::ETC1));
    }

    #[test]
    fn nvidia_is_not_a_tiled_renderer() {
        let caps = probe_with("NVIDIA Corporation", "Tegra 2", "GL_EXT_texture_compression_s3tc");
        assert!(!caps.tiled_renderer);
        assert!(caps.allows_bump_offset);
    }

    #[test]
    fn anisotropy_defaults_to_one_without_the_extension() {
        let caps = probe_with("X", "Y", "GL_EXT_texture_compression_s3tc");
        assert!(!caps.supports_anisotropy);
        assert_eq!(caps.max_anisotropy, 1);
    }

    #[test]
    fn extension_tokens_are_matched_whole() {
        // A superstring must not satisfy the token check.
        let caps = probe_with("X", "Y", "GL_EXT_texture_compression_s3tc_extended");
        assert!(!caps.compression.contains(TextureCompression::DXT));
    }
}
