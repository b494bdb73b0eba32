//! The pixel format table.
//!
//! Maps each logical engine format to the driver format the probed device
//! can actually sample, plus block geometry for size math. Built once per
//! process, immutable after that. Engine content always addresses textures
//! as `Dxt1/3/5`; the table rewrites those entries to whichever compressed
//! family the device supports, or to uncompressed RGBA8 when it supports
//! none (block reported as 4 bytes, 1×1).

use ember_gl::consts;

use crate::caps::{DeviceCapabilities, TextureCompression};

/// Logical pixel formats the engine traffics in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PixelFormat {
    Rgba8,
    Rgb565,
    Luminance8,
    Dxt1,
    Dxt3,
    Dxt5,
    DepthStencil,
    /// Depth rendered for projected shadows; no stencil component.
    ShadowDepth,
    FloatRgba16,
}

impl PixelFormat {
    pub const COUNT: usize = 9;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, Self::Dxt1 | Self::Dxt3 | Self::Dxt5)
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::DepthStencil | Self::ShadowDepth)
    }
}

/// One row of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormatInfo {
    pub internal_format: u32,
    pub format: u32,
    pub ty: u32,
    pub compressed: bool,
    pub block_bytes: u32,
    pub block_size_x: u32,
    pub block_size_y: u32,
    pub supported: bool,
}

impl PixelFormatInfo {
    const fn uncompressed(internal_format: u32, format: u32, ty: u32, bytes: u32) -> Self {
        Self {
            internal_format,
            format,
            ty,
            compressed: false,
            block_bytes: bytes,
            block_size_x: 1,
            block_size_y: 1,
            supported: true,
        }
    }

    const fn compressed(internal_format: u32, block_bytes: u32, bx: u32, by: u32) -> Self {
        Self {
            internal_format,
            format: consts::RGBA,
            ty: consts::UNSIGNED_BYTE,
            compressed: true,
            block_bytes,
            block_size_x: bx,
            block_size_y: by,
            supported: true,
        }
    }

    /// Bytes needed for one mip level of `width` × `height` pixels.
    pub fn mip_bytes(&self, width: u32, height: u32) -> usize {
        let blocks_x = width.div_ceil(self.block_size_x).max(1);
        let blocks_y = height.div_ceil(self.block_size_y).max(1);
        (blocks_x * blocks_y * self.block_bytes) as usize
    }
}

#[derive(Debug, Clone)]
pub struct PixelFormatTable {
    rows: [PixelFormatInfo; PixelFormat::COUNT],
    /// Renderbuffer storage format for RHI-allocated depth buffers; distinct
    /// from the `DepthStencil` row, which describes depth *textures*.
    depth_renderbuffer_format: u32,
}

impl PixelFormatTable {
    /// Build the table for the probed device.
    pub fn build(caps: &DeviceCapabilities) -> Self {
        let rgba8 =
            PixelFormatInfo::uncompressed(consts::RGBA, consts::RGBA, consts::UNSIGNED_BYTE, 4);

        let mut rows = [rgba8; PixelFormat::COUNT];
        rows[PixelFormat::Rgb565.index()] = PixelFormatInfo::uncompressed(
            consts::RGB,
            consts::RGB,
            consts::UNSIGNED_SHORT_5_6_5,
            2,
        );
        rows[PixelFormat::Luminance8.index()] = PixelFormatInfo::uncompressed(
            consts::LUMINANCE,
            consts::LUMINANCE,
            consts::UNSIGNED_BYTE,
            1,
        );

        // Exactly one compressed family is chosen for the DXT slots, in
        // quality order. ETC1 has no alpha, so only DXT1 maps to it; the
        // alpha formats fall back to RGBA8.
        let c = caps.compression;
        let (dxt1, dxt3, dxt5) = if c.contains(TextureCompression::PVRTC) {
            (
                PixelFormatInfo::compressed(consts::COMPRESSED_RGB_PVRTC_2BPPV1_IMG, 8, 8, 4),
                PixelFormatInfo::compressed(consts::COMPRESSED_RGBA_PVRTC_4BPPV1_IMG, 8, 4, 4),
                PixelFormatInfo::compressed(consts::COMPRESSED_RGBA_PVRTC_4BPPV1_IMG, 8, 4, 4),
            )
        } else if c.contains(TextureCompression::DXT) {
            (
                PixelFormatInfo::compressed(consts::COMPRESSED_RGB_S3TC_DXT1_EXT, 8, 4, 4),
                PixelFormatInfo::compressed(consts::COMPRESSED_RGBA_S3TC_DXT3_EXT, 16, 4, 4),
                PixelFormatInfo::compressed(consts::COMPRESSED_RGBA_S3TC_DXT5_EXT, 16, 4, 4),
            )
        } else if c.contains(TextureCompression::ATITC) {
            (
                PixelFormatInfo::compressed(consts::ATC_RGB_AMD, 8, 4, 4),
                PixelFormatInfo::compressed(consts::ATC_RGBA_EXPLICIT_ALPHA_AMD, 16, 4, 4),
                PixelFormatInfo::compressed(consts::ATC_RGBA_EXPLICIT_ALPHA_AMD, 16, 4, 4),
            )
        } else if c.contains(TextureCompression::ETC1) {
            (PixelFormatInfo::compressed(consts::ETC1_RGB8_OES, 8, 4, 4), rgba8, rgba8)
        } else {
            (rgba8, rgba8, rgba8)
        };
        rows[PixelFormat::Dxt1.index()] = dxt1;
        rows[PixelFormat::Dxt3.index()] = dxt3;
        rows[PixelFormat::Dxt5.index()] = dxt5;

        // Depth textures upload through OES_packed_depth_stencil /
        // OES_depth_texture formats; plain DEPTH_COMPONENT when the packed
        // form is unavailable.
        rows[PixelFormat::DepthStencil.index()] = if caps.supports_packed_depth_stencil {
            PixelFormatInfo {
                internal_format: consts::DEPTH_STENCIL_OES,
                format: consts::DEPTH_STENCIL_OES,
                ty: consts::UNSIGNED_INT_24_8_OES,
                compressed: false,
                block_bytes: 4,
                block_size_x: 1,
                block_size_y: 1,
                supported: true,
            }
        } else {
            PixelFormatInfo {
                internal_format: consts::DEPTH_COMPONENT,
                format: consts::DEPTH_COMPONENT,
                ty: consts::UNSIGNED_INT,
                compressed: false,
                block_bytes: 4,
                block_size_x: 1,
                block_size_y: 1,
                supported: true,
            }
        };
        rows[PixelFormat::ShadowDepth.index()] = PixelFormatInfo {
            internal_format: consts::DEPTH_COMPONENT,
            format: consts::DEPTH_COMPONENT,
            ty: consts::UNSIGNED_SHORT,
            compressed: false,
            block_bytes: 2,
            block_size_x: 1,
            block_size_y: 1,
            supported: caps.supports_depth_textures,
        };
        rows[PixelFormat::FloatRgba16.index()] = PixelFormatInfo {
            internal_format: consts::RGBA,
            format: consts::RGBA,
            ty: consts::HALF_FLOAT_OES,
            compressed: false,
            block_bytes: 8,
            block_size_x: 1,
            block_size_y: 1,
            supported: caps.supports_half_float_attribs,
        };

        Self {
            rows,
            depth_renderbuffer_format: if caps.supports_packed_depth_stencil {
                consts::DEPTH24_STENCIL8_OES
            } else {
                consts::DEPTH_COMPONENT16
            },
        }
    }

    /// Before probing, every format reads as unsupported RGBA8 so resource
    /// creation ahead of the first viewport fails loudly rather than lying.
    pub fn unprobed() -> Self {
        let mut row =
            PixelFormatInfo::uncompressed(consts::RGBA, consts::RGBA, consts::UNSIGNED_BYTE, 4);
        row.supported = false;
        Self {
            rows: [row; PixelFormat::COUNT],
            depth_renderbuffer_format: consts::DEPTH_COMPONENT16,
        }
    }

    pub fn info(&self, format: PixelFormat) -> &PixelFormatInfo {
        &self.rows[format.index()]
    }

    pub fn depth_renderbuffer_format(&self) -> u32 {
        self.depth_renderbuffer_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gl::{TraceGl, TraceGlConfig};
    use pretty_assertions::assert_eq;

    fn caps_for(extensions: &str) -> DeviceCapabilities {
        let gl = TraceGl::with_config(TraceGlConfig {
            extensions: extensions.to_owned(),
            ..TraceGlConfig::default()
        });
        DeviceCapabilities::probe(&gl)
    }

    #[test]
    fn dxt_device_keeps_s3tc_formats() {
        let table = PixelFormatTable::build(&caps_for("GL_EXT_texture_compression_s3tc"));
        let dxt5 = table.info(PixelFormat::Dxt5);
        assert_eq!(dxt5.internal_format, consts::COMPRESSED_RGBA_S3TC_DXT5_EXT);
        assert_eq!(dxt5.block_bytes, 16);
        assert_eq!((dxt5.block_size_x, dxt5.block_size_y), (4, 4));
        assert!(dxt5.compressed);
    }

    #[test]
    fn pvrtc_wins_over_dxt() {
        let table = PixelFormatTable::build(&caps_for(
            "GL_IMG_texture_compression_pvrtc GL_EXT_texture_compression_s3tc",
        ));
        assert_eq!(
            table.info(PixelFormat::Dxt1).internal_format,
            consts::COMPRESSED_RGB_PVRTC_2BPPV1_IMG
        );
    }

    #[test]
    fn etc1_alpha_formats_fall_back_to_rgba8() {
        let table = PixelFormatTable::build(&caps_for("GL_OES_compressed_ETC1_RGB8_texture"));
        assert_eq!(table.info(PixelFormat::Dxt1).internal_format, consts::ETC1_RGB8_OES);
        let dxt5 = table.info(PixelFormat::Dxt5);
        assert!(!dxt5.compressed);
        assert_eq!(dxt5.block_bytes, 4);
        assert_eq!((dxt5.block_size_x, dxt5.block_size_y), (1, 1));
    }

    #[test]
    fn no_compression_at_all_falls_back_to_rgba8() {
        let table = PixelFormatTable::build(&caps_for(""));
        for format in [PixelFormat::Dxt1, PixelFormat::Dxt3, PixelFormat::Dxt5] {
            let info = table.info(format);
            assert!(!info.compressed);
            assert_eq!(info.block_bytes, 4);
            assert!(info.supported);
        }
    }

    #[test]
    fn mip_bytes_rounds_up_to_blocks() {
        let table = PixelFormatTable::build(&caps_for("GL_EXT_texture_compression_s3tc"));
        // 6x6 DXT1 occupies 2x2 blocks of 8 bytes.
        assert_eq!(table.info(PixelFormat::Dxt1).mip_bytes(6, 6), 32);
        assert_eq!(table.info(PixelFormat::Rgba8).mip_bytes(7, 3), 84);
        // A 1x1 mip of a block-compressed format is still one block.
        assert_eq!(table.info(PixelFormat::Dxt1).mip_bytes(1, 1), 8);
    }
}
