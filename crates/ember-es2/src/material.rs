//! Material, mesh and pipeline enums plus the parameter blocks the engine
//! hands the shader manager before a draw.
//!
//! Every enum here that feeds the program key carries a stable `as u32`
//! discriminant; the key packer stores exactly these values.

use bitflags::bitflags;

/// Primitive families with distinct shader bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum PrimitiveType {
    #[default]
    Default = 0,
    Particle = 1,
    BeamTrailParticle = 2,
    LensFlare = 3,
    Simple = 4,
    GlobalShader = 5,
}

/// Fullscreen passes not associated with a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum GlobalShaderKind {
    #[default]
    None = 0,
    ShadowProjection = 1,
    GammaCorrection = 2,
    BloomDof = 3,
    LightShafts = 4,
}

/// Which depth-only variant a pass renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum DepthShaderKind {
    #[default]
    None = 0,
    Normal = 1,
    /// Linear, biased shadow depth.
    Shadow = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum BlendMode {
    #[default]
    Opaque = 0,
    Masked = 1,
    Translucent = 2,
    Additive = 3,
    Modulate = 4,
}

/// Which interpolated UV set feeds a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum TexCoordSource {
    #[default]
    TexCoords0 = 0,
    TexCoords1 = 1,
    TexCoords2 = 2,
    TexCoords3 = 3,
}

/// Scalar sources for per-feature masks (environment, rim, emissive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ValueSource {
    #[default]
    Constant = 0,
    VertexColorRed = 1,
    VertexColorGreen = 2,
    VertexColorBlue = 3,
    VertexColorAlpha = 4,
    BaseTextureAlpha = 5,
    MaskTextureRed = 6,
    MaskTextureAlpha = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum EmissiveColorSource {
    #[default]
    EmissiveTexture = 0,
    BaseTexture = 1,
    Constant = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum AmbientOcclusionSource {
    #[default]
    None = 0,
    VertexColorRed = 1,
    VertexColorGreen = 2,
    VertexColorBlue = 3,
}

/// Where the alpha-test/opacity value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum AlphaValueSource {
    #[default]
    DiffuseAlpha = 0,
    MaskRed = 1,
    MaskGreen = 2,
    MaskBlue = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ColorMultiplySource {
    #[default]
    None = 0,
    BaseTextureRed = 1,
    BaseTextureGreen = 2,
    BaseTextureBlue = 3,
    BaseTextureAlpha = 4,
    MaskTextureRed = 5,
    MaskTextureGreen = 6,
    MaskTextureBlue = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum SpecularMaskMode {
    #[default]
    Constant = 0,
    Luminance = 1,
    DiffuseRed = 2,
    DiffuseAlpha = 3,
    MaskTextureRgb = 4,
    MaskTextureAlpha = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum EnvironmentBlendMode {
    #[default]
    Add = 0,
    Lerp = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ParticleScreenAlignment {
    #[default]
    CameraFacing = 0,
    Velocity = 1,
    TypeSpecific = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum TextureBlendFactorSource {
    #[default]
    VertexColor = 0,
    MaskTextureRed = 1,
}

bitflags! {
    /// Base features a vertex factory turns on for its permutation set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BaseFeatures: u32 {
        const LIGHTMAP             = 1 << 0;
        const DIRECTIONAL_LIGHTMAP = 1 << 1;
        const GPU_SKINNING         = 1 << 2;
        const DECAL                = 1 << 3;
        const SUBUV_PARTICLES      = 1 << 4;
        const LANDSCAPE            = 1 << 5;
    }
}

/// Vertex-stage material state for the next draws.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialVertexParams {
    pub lighting_enabled: bool,
    pub base_tex_coord_source: TexCoordSource,
    pub detail_tex_coord_source: TexCoordSource,
    pub mask_tex_coord_source: TexCoordSource,
    pub base_texture_transformed: bool,
    pub emissive_texture_transformed: bool,
    pub normal_texture_transformed: bool,
    pub mask_texture_transformed: bool,
    pub detail_texture_transformed: bool,
    /// Row-major 3x3 texture transform, applied when any of the flags above
    /// are set.
    pub texture_transform: [f32; 9],
    pub emissive_enabled: bool,
    pub emissive_color_source: EmissiveColorSource,
    pub constant_emissive_color: [f32; 4],
    pub emissive_mask_source: ValueSource,
    pub normal_mapping_enabled: bool,
    pub environment_mapping_enabled: bool,
    pub environment_mask_source: ValueSource,
    pub environment_color_scale: [f32; 3],
    pub environment_amount: f32,
    pub environment_fresnel_amount: f32,
    pub environment_fresnel_exponent: f32,
    pub rim_lighting_enabled: bool,
    pub rim_lighting_mask_source: ValueSource,
    pub rim_color_and_exponent: [f32; 4],
    pub specular_enabled: bool,
    pub pixel_specular_enabled: bool,
    pub specular_color: [f32; 3],
    pub specular_power: f32,
    pub detail_normal_enabled: bool,
    pub ambient_occlusion_source: AmbientOcclusionSource,
    pub wave_vertex_movement_enabled: bool,
    pub sway_time: f32,
    pub sway_max_angle: f32,
    pub use_uniform_color_multiply: bool,
    pub uniform_multiply_color: [f32; 4],
    pub use_vertex_color_multiply: bool,
    pub use_landscape_monochrome_layer_blending: bool,
    pub landscape_monochrome_layer_colors: [[f32; 3]; 4],
    /// 0..=3 detail textures blended over the base.
    pub detail_texture_count: u8,
    pub texture_blend_factor_source: TextureBlendFactorSource,
    pub fog_enabled: bool,
}

impl Default for MaterialVertexParams {
    fn default() -> Self {
        Self {
            lighting_enabled: false,
            base_tex_coord_source: TexCoordSource::TexCoords0,
            detail_tex_coord_source: TexCoordSource::TexCoords0,
            mask_tex_coord_source: TexCoordSource::TexCoords0,
            base_texture_transformed: false,
            emissive_texture_transformed: false,
            normal_texture_transformed: false,
            mask_texture_transformed: false,
            detail_texture_transformed: false,
            texture_transform: IDENTITY_3X3,
            emissive_enabled: false,
            emissive_color_source: EmissiveColorSource::EmissiveTexture,
            constant_emissive_color: [0.0; 4],
            emissive_mask_source: ValueSource::Constant,
            normal_mapping_enabled: false,
            environment_mapping_enabled: false,
            environment_mask_source: ValueSource::Constant,
            environment_color_scale: [1.0; 3],
            environment_amount: 0.0,
            environment_fresnel_amount: 0.0,
            environment_fresnel_exponent: 1.0,
            rim_lighting_enabled: false,
            rim_lighting_mask_source: ValueSource::Constant,
            rim_color_and_exponent: [0.0, 0.0, 0.0, 2.0],
            specular_enabled: false,
            pixel_specular_enabled: false,
            specular_color: [1.0; 3],
            specular_power: 16.0,
            detail_normal_enabled: false,
            ambient_occlusion_source: AmbientOcclusionSource::None,
            wave_vertex_movement_enabled: false,
            sway_time: 0.0,
            sway_max_angle: 0.0,
            use_uniform_color_multiply: false,
            uniform_multiply_color: [1.0; 4],
            use_vertex_color_multiply: false,
            use_landscape_monochrome_layer_blending: false,
            landscape_monochrome_layer_colors: [[1.0; 3]; 4],
            detail_texture_count: 0,
            texture_blend_factor_source: TextureBlendFactorSource::VertexColor,
            fog_enabled: true,
        }
    }
}

/// Pixel-stage material state for the next draws.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MaterialPixelParams {
    pub bump_offset_enabled: bool,
    pub bump_reference_plane: f32,
    pub bump_height_ratio: f32,
    pub bump_end: f32,
    pub alpha_value_source: AlphaValueSource,
    pub opacity_multiplier: f32,
    pub color_multiply_source: ColorMultiplySource,
    pub specular_mask: SpecularMaskMode,
    pub environment_blend_mode: EnvironmentBlendMode,
}

/// Per-mesh vertex-stage state (camera/object relation drives fog and bump
/// decisions, so it must be set before the material's pixel params).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVertexParams {
    pub camera_position: [f32; 3],
    pub object_position: [f32; 3],
    pub object_bounds_radius: f32,
    pub local_to_world: [f32; 16],
    pub particle_screen_alignment: ParticleScreenAlignment,
}

impl Default for MeshVertexParams {
    fn default() -> Self {
        Self {
            camera_position: [0.0; 3],
            object_position: [0.0; 3],
            object_bounds_radius: 0.0,
            local_to_world: IDENTITY_4X4,
            particle_screen_alignment: ParticleScreenAlignment::CameraFacing,
        }
    }
}

/// Per-mesh pixel-stage state (forward shadow projection inputs).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeshPixelParams {
    pub shadow_caster_position: [f32; 3],
    pub mod_shadow_color: [f32; 3],
}

/// Height-fog layer constants, four layers packed per component.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeightFogParams {
    pub fog_distance_scale: [f32; 4],
    pub fog_start_distance: [f32; 4],
    pub fog_extinction_distance: [f32; 4],
    pub fog_min_height: [f32; 4],
    pub fog_max_height: [f32; 4],
    pub fog_in_scattering: [[f32; 4]; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorGradingParams {
    pub blend: f32,
    pub desaturation: f32,
    pub high_lights: [f32; 4],
    pub mid_tones: [f32; 4],
    pub shadows: [f32; 4],
}

impl Default for ColorGradingParams {
    fn default() -> Self {
        Self {
            blend: 0.0,
            desaturation: 0.0,
            high_lights: [1.0; 4],
            mid_tones: [0.5; 4],
            shadows: [0.0; 4],
        }
    }
}

pub const IDENTITY_3X3: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

pub const IDENTITY_4X4: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];
