//! The shader manager: resolves the current material + mesh + environment
//! state into a program key, binds the resulting program, and flushes
//! versioned uniforms.
//!
//! The key at any draw is fully determined by (a) the engine `set_*` calls
//! since the last draw, (b) the current vertex-factory flag mask, (c) the
//! active primitive type, and (d) the consumed-on-read next-draw global
//! shader override. Equal state must produce equal keys; every key field is
//! assigned on every assembly so nothing leaks between draws.

use ember_gl::GlEs2;
use tracing::debug;

use crate::caps::DeviceCapabilities;
use crate::config::SystemSettings;
use crate::key::{KeyField, ProgramKey, ProgramKeyData};
use crate::material::{
    BaseFeatures, BlendMode, ColorGradingParams, DepthShaderKind, GlobalShaderKind,
    HeightFogParams, MaterialPixelParams, MaterialVertexParams, MeshPixelParams, MeshVertexParams,
    PrimitiveType,
};
use crate::program::ProgramCache;
use crate::stats::RhiStats;
use crate::uniforms::{ParameterStore, UniformSlot};

pub struct ShaderManager {
    settings: SystemSettings,
    caps: DeviceCapabilities,
    cache: ProgramCache,
    params: ParameterStore,

    vertex_settings: MaterialVertexParams,
    pixel_settings: MaterialPixelParams,
    mesh_settings: MeshVertexParams,

    primitive_type: PrimitiveType,
    global_shader: GlobalShaderKind,
    next_draw_global_shader: GlobalShaderKind,
    vertex_factory_flags: BaseFeatures,
    blend_mode: BlendMode,

    rendering_depth_only: bool,
    rendering_shadow_depth: bool,
    rendering_forward_shadow_projections: bool,

    gamma_correction: bool,
    fade_color_and_amount: [f32; 4],

    fog_enabled: bool,
    fog_start: f32,
    fog_end: f32,
    fog_color: [f32; 4],
    height_fog: HeightFogParams,
    color_grading: ColorGradingParams,

    bump_end: f32,

    camera_position: [f32; 3],
    object_distance: f32,
    object_radius: f32,

    view_projection: [f32; 16],

    has_lightmap: bool,
    has_directional_lightmap: bool,
    reset_lightmap_on_next_sampler: bool,

    use_fallback_color_stream: bool,
}

impl ShaderManager {
    pub fn new(settings: SystemSettings, caps: DeviceCapabilities) -> Self {
        let cache = ProgramCache::new(settings.use_preprocessed_shaders, settings.mobile_bone_count);
        let params = ParameterStore::new(settings.mobile_bone_count);
        Self {
            settings,
            caps,
            cache,
            params,
            vertex_settings: MaterialVertexParams::default(),
            pixel_settings: MaterialPixelParams::default(),
            mesh_settings: MeshVertexParams::default(),
            primitive_type: PrimitiveType::Default,
            global_shader: GlobalShaderKind::None,
            next_draw_global_shader: GlobalShaderKind::None,
            vertex_factory_flags: BaseFeatures::empty(),
            blend_mode: BlendMode::Opaque,
            rendering_depth_only: false,
            rendering_shadow_depth: false,
            rendering_forward_shadow_projections: false,
            gamma_correction: false,
            fade_color_and_amount: [0.0; 4],
            fog_enabled: false,
            fog_start: 0.0,
            fog_end: 1.0,
            fog_color: [0.0; 4],
            height_fog: HeightFogParams::default(),
            color_grading: ColorGradingParams::default(),
            bump_end: 0.0,
            camera_position: [0.0; 3],
            object_distance: 0.0,
            object_radius: 0.0,
            view_projection: crate::material::IDENTITY_4X4,
            has_lightmap: false,
            has_directional_lightmap: false,
            reset_lightmap_on_next_sampler: true,
            use_fallback_color_stream: false,
        }
    }

    pub fn cache(&self) -> &ProgramCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ProgramCache {
        &mut self.cache
    }

    pub fn params_mut(&mut self) -> &mut ParameterStore {
        &mut self.params
    }

    // -----------------------------------------------------------------
    // Engine state setters
    // -----------------------------------------------------------------

    /// Reset all per-material state and select just a blend mode; the cheap
    /// path used by UI and other untextured-simple content.
    pub fn set_mobile_simple_params(&mut self, blend_mode: BlendMode) {
        self.vertex_settings = MaterialVertexParams::default();
        self.pixel_settings = MaterialPixelParams::default();
        self.blend_mode = blend_mode;
    }

    pub fn set_mobile_blend_mode(&mut self, blend_mode: BlendMode) {
        self.blend_mode = blend_mode;
    }

    pub fn set_mobile_material_vertex_params(&mut self, params: &MaterialVertexParams) {
        self.vertex_settings = params.clone();

        if params.use_uniform_color_multiply {
            self.params
                .set_floats(UniformSlot::UniformMultiplyColor, 4, &params.uniform_multiply_color);
        }
        if params.emissive_enabled {
            self.params.set_floats(
                UniformSlot::ConstantEmissiveColor,
                4,
                &params.constant_emissive_color,
            );
        }
        if self.is_specular_enabled() {
            self.params.set_floats(UniformSlot::SpecularColor, 3, &params.specular_color);
            self.params.set_f32(UniformSlot::SpecularPower, params.specular_power);
        }
        if self.is_environment_mapping_enabled() {
            self.params.set_floats(
                UniformSlot::EnvironmentColorScale,
                3,
                &params.environment_color_scale,
            );
            self.params.set_floats(
                UniformSlot::EnvironmentParameters,
                3,
                &[
                    params.environment_amount,
                    params.environment_fresnel_amount,
                    params.environment_fresnel_exponent,
                ],
            );
        }
        if self.is_rim_lighting_enabled() {
            self.params.set_floats(
                UniformSlot::RimLightingColorAndExponent,
                4,
                &params.rim_color_and_exponent,
            );
        }
        if params.base_texture_transformed
            || params.emissive_texture_transformed
            || params.normal_texture_transformed
            || params.mask_texture_transformed
            || params.detail_texture_transformed
        {
            self.params.set_matrix3(UniformSlot::TextureTransform, &params.texture_transform);
        }
        if self.is_wave_vertex_movement_enabled() {
            self.params.set_floats(
                UniformSlot::VertexMovementConstants,
                3,
                &[params.sway_max_angle, params.sway_time, 0.0],
            );
        }
        if params.use_landscape_monochrome_layer_blending {
            let mut colors = [0.0f32; 12];
            for (layer, color) in params.landscape_monochrome_layer_colors.iter().enumerate() {
                colors[layer * 3..layer * 3 + 3].copy_from_slice(color);
            }
            self.params
                .set_floats(UniformSlot::LandscapeMonochromeLayerColors, 3, &colors);
        }
    }

    pub fn set_mobile_material_pixel_params(&mut self, params: &MaterialPixelParams) {
        self.pixel_settings = *params;
        if params.opacity_multiplier > 0.0 {
            self.params.set_f32(UniformSlot::OpacityMultiplier, params.opacity_multiplier);
        }
    }

    pub fn set_mobile_mesh_vertex_params(&mut self, params: &MeshVertexParams) {
        self.mesh_settings = *params;
        self.camera_position = params.camera_position;
        let delta = [
            params.object_position[0] - params.camera_position[0],
            params.object_position[1] - params.camera_position[1],
            params.object_position[2] - params.camera_position[2],
        ];
        self.object_distance =
            (delta[0] * delta[0] + delta[1] * delta[1] + delta[2] * delta[2]).sqrt();
        self.object_radius = params.object_bounds_radius;

        self.params.set_matrix4(UniformSlot::LocalToWorld, &params.local_to_world);
        self.params.set_floats(
            UniformSlot::CameraWorldPosition,
            4,
            &[
                params.camera_position[0],
                params.camera_position[1],
                params.camera_position[2],
                1.0,
            ],
        );
        self.params.set_matrix3(
            UniformSlot::LocalToWorldRotation,
            &rotation_3x3(&params.local_to_world),
        );
        self.params.set_matrix4(
            UniformSlot::LocalToProjection,
            &multiply_4x4(&params.local_to_world, &self.view_projection),
        );
    }

    pub fn set_mobile_mesh_pixel_params(&mut self, params: &MeshPixelParams) {
        self.params.set_floats(
            UniformSlot::ShadowCasterWorldPosition,
            3,
            &params.shadow_caster_position,
        );
        self.params.set_floats(
            UniformSlot::ShadowModulateColor,
            4,
            &[
                params.mod_shadow_color[0],
                params.mod_shadow_color[1],
                params.mod_shadow_color[2],
                1.0,
            ],
        );
    }

    pub fn set_fog(&mut self, enabled: bool, start: f32, end: f32, color: [f32; 4]) {
        self.fog_enabled = enabled;
        self.fog_start = start;
        self.fog_end = end;
        self.fog_color = color;
    }

    pub fn set_height_fog_params(&mut self, params: &HeightFogParams) {
        self.height_fog = *params;
    }

    pub fn set_mobile_color_grading_params(&mut self, params: &ColorGradingParams) {
        self.color_grading = *params;
    }

    pub fn set_bump_offset(&mut self, enabled: bool, bump_end: f32) {
        self.pixel_settings.bump_offset_enabled = enabled;
        self.bump_end = bump_end;
    }

    pub fn set_gamma_correction(&mut self, enabled: bool) {
        self.gamma_correction = enabled;
    }

    pub fn is_gamma_correction_enabled(&self) -> bool {
        self.gamma_correction
    }

    /// RGB is the fade color; A is the fade progress (0 disables).
    pub fn set_color_fading(&mut self, enabled: bool, color_and_amount: [f32; 4]) {
        self.fade_color_and_amount = [
            color_and_amount[0],
            color_and_amount[1],
            color_and_amount[2],
            if enabled { color_and_amount[3] } else { 0.0 },
        ];
    }

    pub fn set_alpha_test(&mut self, _enabled: bool, alpha_ref: f32) {
        // Alpha test is a key bit plus a uniform on ES2, never driver state.
        self.params.set_f32(UniformSlot::AlphaTestRef, alpha_ref);
    }

    /// Generic parameter write for slots without a dedicated setter (bone
    /// palettes, lights, shadow-projection constants).
    pub fn set_parameter_floats(&mut self, slot: UniformSlot, components: u8, values: &[f32]) {
        self.params.set_floats(slot, components, values);
    }

    pub fn set_parameter_matrix4(&mut self, slot: UniformSlot, values: &[f32; 16]) {
        self.params.set_matrix4(slot, values);
    }

    pub fn set_view_projection(&mut self, matrix: [f32; 16]) {
        self.view_projection = matrix;
        self.params.set_matrix4(UniformSlot::ViewProjection, &matrix);
    }

    pub fn set_upper_sky_color(&mut self, color: [f32; 4]) {
        self.params.set_floats(UniformSlot::UpperSkyColor, 4, &color);
    }

    pub fn set_lower_sky_color(&mut self, color: [f32; 4]) {
        self.params.set_floats(UniformSlot::LowerSkyColor, 4, &color);
    }

    pub fn enable_normal_mapping(&mut self, enabled: bool) {
        self.vertex_settings.normal_mapping_enabled = enabled;
    }

    pub fn enable_environment_mapping(&mut self, enabled: bool) {
        self.vertex_settings.environment_mapping_enabled = enabled;
    }

    pub fn enable_specular(&mut self, enabled: bool) {
        self.vertex_settings.specular_enabled = enabled;
    }

    pub fn enable_pixel_specular(&mut self, enabled: bool) {
        self.vertex_settings.pixel_specular_enabled = enabled;
    }

    pub fn enable_rim_lighting(&mut self, enabled: bool) {
        self.vertex_settings.rim_lighting_enabled = enabled;
    }

    pub fn enable_wave_vertex_movement(&mut self, enabled: bool) {
        self.vertex_settings.wave_vertex_movement_enabled = enabled;
    }

    pub fn enable_bump_offset(&mut self, enabled: bool) {
        self.pixel_settings.bump_offset_enabled = enabled;
    }

    pub fn set_opacity_source(&mut self, source: crate::material::AlphaValueSource) {
        self.pixel_settings.alpha_value_source = source;
    }

    pub fn set_rendering_depth_only(&mut self, enabled: bool) {
        self.rendering_depth_only = enabled;
    }

    pub fn set_rendering_shadow_depth(&mut self, enabled: bool) {
        self.rendering_shadow_depth = enabled;
    }

    pub fn set_rendering_forward_shadow_projections(&mut self, enabled: bool) {
        self.rendering_forward_shadow_projections = enabled;
    }

    pub fn set_to_use_fallback_stream_color(&mut self, enabled: bool) {
        self.use_fallback_color_stream = enabled;
    }

    // -----------------------------------------------------------------
    // Vertex factory flags and lightmap latches
    // -----------------------------------------------------------------

    pub fn clear_vertex_factory_flags(&mut self) {
        self.vertex_factory_flags = BaseFeatures::empty();
    }

    pub fn set_vertex_factory_flags(&mut self, flags: BaseFeatures) {
        self.vertex_factory_flags |= flags;
    }

    pub fn vertex_factory_flags(&self) -> BaseFeatures {
        self.vertex_factory_flags
    }

    /// The next sampler bind resets the lightmap latch; called once per
    /// draw so a material without a lightmap stops using the lit family.
    pub fn reset_lightmap_on_next_sampler(&mut self) {
        self.reset_lightmap_on_next_sampler = true;
    }

    /// Called on every sampler bind with the texture's lightmap kind.
    pub fn notify_sampler_bind(&mut self, lightmap: bool, directional: bool) {
        if self.reset_lightmap_on_next_sampler {
            self.reset_lightmap_on_next_sampler = false;
            self.has_lightmap = false;
            self.has_directional_lightmap = false;
        }
        if lightmap {
            self.has_lightmap = true;
            self.has_directional_lightmap |= directional;
        }
    }

    pub fn has_had_lightmap_set(&self) -> bool {
        self.has_lightmap
    }

    pub fn has_had_directional_lightmap_set(&self) -> bool {
        self.has_lightmap && self.has_directional_lightmap
    }

    // -----------------------------------------------------------------
    // Global shader override
    // -----------------------------------------------------------------

    /// The next draw is a fullscreen quad using `kind`.
    pub fn set_next_draw_global_shader(&mut self, kind: GlobalShaderKind) {
        self.next_draw_global_shader = kind;
    }

    /// Consumes the override: one quad draws with the global shader, then
    /// subsequent material draws are unaffected.
    pub fn take_next_draw_global_shader(&mut self) -> GlobalShaderKind {
        std::mem::replace(&mut self.next_draw_global_shader, GlobalShaderKind::None)
    }

    // -----------------------------------------------------------------
    // Feature predicates (engine request gated by settings and quirks)
    // -----------------------------------------------------------------

    pub fn is_normal_mapping_enabled(&self) -> bool {
        self.vertex_settings.normal_mapping_enabled && self.settings.allow_normal_mapping
    }

    pub fn is_environment_mapping_enabled(&self) -> bool {
        self.vertex_settings.environment_mapping_enabled && self.settings.allow_environment_mapping
    }

    pub fn is_rim_lighting_enabled(&self) -> bool {
        self.vertex_settings.rim_lighting_enabled && self.settings.allow_rim_lighting
    }

    pub fn is_specular_enabled(&self) -> bool {
        self.vertex_settings.specular_enabled && self.settings.allow_specular
    }

    pub fn is_pixel_specular_enabled(&self) -> bool {
        self.vertex_settings.pixel_specular_enabled && self.settings.allow_specular
    }

    pub fn is_wave_vertex_movement_enabled(&self) -> bool {
        self.vertex_settings.wave_vertex_movement_enabled && self.settings.allow_vertex_movement
    }

    pub fn is_bump_offset_enabled(&self) -> bool {
        // The object-distance check requires bump uniforms to be set after
        // the mesh params are set.
        self.pixel_settings.bump_offset_enabled
            && self.settings.allow_bump_offset
            && self.caps.allows_bump_offset
            && (self.settings.minimize_fog_shaders
                || self.object_distance <= self.object_radius + self.bump_end)
    }

    pub fn is_color_grading_enabled(&self) -> bool {
        // With post-processing on, grading runs as part of PP instead.
        !self.settings.allow_post_process && self.settings.allow_color_grading
    }

    pub fn is_gradient_fog_allowed(&self) -> bool {
        self.settings.allow_fog && !self.settings.allow_height_fog
    }

    fn is_gradient_fog_enabled_common(&self) -> bool {
        self.is_gradient_fog_allowed()
            && self.fog_enabled
            && self.vertex_settings.fog_enabled
            && self.fog_color[3] > 0.0
    }

    pub fn is_gradient_fog_enabled(&self) -> bool {
        if self.settings.minimize_fog_shaders {
            self.is_gradient_fog_allowed()
        } else {
            // Enabled once the object can reach into the fog volume.
            self.is_gradient_fog_enabled_common()
                && self.object_distance + self.object_radius >= self.fog_start
        }
    }

    /// Object fully beyond `FogEnd`: collapse the pixel shader to the
    /// constant fog color via the fade path.
    pub fn is_fog_saturated(&self) -> bool {
        if self.settings.minimize_fog_shaders {
            false
        } else {
            self.is_gradient_fog_enabled_common()
                && self.object_distance - self.object_radius >= self.fog_end
        }
    }

    pub fn is_height_fog_enabled(&self) -> bool {
        self.settings.allow_fog
            && self.settings.allow_height_fog
            && self.fog_enabled
            && self.vertex_settings.fog_enabled
    }

    // -----------------------------------------------------------------
    // Key assembly and program binding
    // -----------------------------------------------------------------

    /// Gather the current state into an unpacked key. Every field is
    /// assigned here; the packer asserts it.
    pub fn build_key(&self) -> ProgramKeyData {
        let mut key = ProgramKeyData::new();
        let flags = self.vertex_factory_flags;
        let vs = &self.vertex_settings;
        let ps = &self.pixel_settings;
        let is_landscape = flags.contains(BaseFeatures::LANDSCAPE);
        let depth_only = self.rendering_depth_only || self.rendering_shadow_depth;
        let allow_fog = !depth_only;

        key.assign(KeyField::PrimitiveType, self.primitive_type as u32);
        key.assign(
            KeyField::GlobalShader,
            if self.primitive_type == PrimitiveType::GlobalShader {
                self.global_shader as u32
            } else {
                GlobalShaderKind::None as u32
            },
        );
        key.assign(
            KeyField::DepthShader,
            if self.rendering_shadow_depth {
                DepthShaderKind::Shadow as u32
            } else if self.rendering_depth_only {
                DepthShaderKind::Normal as u32
            } else {
                DepthShaderKind::None as u32
            },
        );
        key.assign_bool(KeyField::IsDepthOnly, depth_only);
        key.assign_bool(
            KeyField::ForwardShadowProjection,
            self.rendering_forward_shadow_projections,
        );
        key.assign(KeyField::BlendMode, self.blend_mode as u32);
        key.assign_bool(
            KeyField::IsGradientFogEnabled,
            allow_fog && self.is_gradient_fog_enabled() && !self.is_fog_saturated(),
        );
        key.assign_bool(KeyField::IsHeightFogEnabled, allow_fog && self.is_height_fog_enabled());
        key.assign_bool(KeyField::UseGammaCorrection, self.gamma_correction);
        key.assign_bool(KeyField::IsColorGradingEnabled, self.is_color_grading_enabled());
        key.assign(
            KeyField::ParticleScreenAlignment,
            self.mesh_settings.particle_screen_alignment as u32,
        );

        key.assign_bool(KeyField::IsLightmap, flags.contains(BaseFeatures::LIGHTMAP));
        key.assign_bool(
            KeyField::IsDirectionalLightmap,
            flags.contains(BaseFeatures::DIRECTIONAL_LIGHTMAP),
        );
        key.assign_bool(KeyField::IsSkinned, flags.contains(BaseFeatures::GPU_SKINNING));
        key.assign_bool(KeyField::IsDecal, flags.contains(BaseFeatures::DECAL));
        key.assign_bool(KeyField::IsSubUv, flags.contains(BaseFeatures::SUBUV_PARTICLES));
        key.assign_bool(KeyField::IsLandscape, is_landscape);

        key.assign_bool(KeyField::IsLightingEnabled, vs.lighting_enabled);
        key.assign(KeyField::BaseTexCoordSource, vs.base_tex_coord_source as u32);
        key.assign(KeyField::DetailTexCoordSource, vs.detail_tex_coord_source as u32);
        key.assign(KeyField::MaskTexCoordSource, vs.mask_tex_coord_source as u32);
        key.assign_bool(KeyField::IsBaseTextureTransformed, vs.base_texture_transformed);
        key.assign_bool(KeyField::IsEmissiveTextureTransformed, vs.emissive_texture_transformed);
        key.assign_bool(KeyField::IsNormalTextureTransformed, vs.normal_texture_transformed);
        key.assign_bool(KeyField::IsMaskTextureTransformed, vs.mask_texture_transformed);
        key.assign_bool(KeyField::IsDetailTextureTransformed, vs.detail_texture_transformed);
        key.assign_bool(KeyField::IsEmissiveEnabled, vs.emissive_enabled);
        key.assign(KeyField::EmissiveColorSource, vs.emissive_color_source as u32);
        key.assign(KeyField::EmissiveMaskSource, vs.emissive_mask_source as u32);
        key.assign_bool(KeyField::IsNormalMappingEnabled, self.is_normal_mapping_enabled());
        key.assign_bool(
            KeyField::IsEnvironmentMappingEnabled,
            self.is_environment_mapping_enabled(),
        );
        key.assign(KeyField::EnvironmentMaskSource, vs.environment_mask_source as u32);
        key.assign_bool(
            KeyField::IsEnvironmentFresnelEnabled,
            vs.environment_fresnel_amount != 0.0,
        );
        key.assign_bool(KeyField::IsRimLightingEnabled, self.is_rim_lighting_enabled());
        key.assign(KeyField::RimLightingMaskSource, vs.rim_lighting_mask_source as u32);
        key.assign_bool(KeyField::IsSpecularEnabled, self.is_specular_enabled());
        key.assign_bool(KeyField::IsPixelSpecularEnabled, self.is_pixel_specular_enabled());
        key.assign_bool(KeyField::IsDetailNormalEnabled, vs.detail_normal_enabled);
        key.assign(KeyField::AmbientOcclusionSource, vs.ambient_occlusion_source as u32);
        key.assign_bool(
            KeyField::IsWaveVertexMovementEnabled,
            self.is_wave_vertex_movement_enabled(),
        );
        key.assign_bool(KeyField::UseUniformColorMultiply, vs.use_uniform_color_multiply);
        key.assign_bool(KeyField::UseVertexColorMultiply, vs.use_vertex_color_multiply);
        key.assign_bool(
            KeyField::UseLandscapeMonochromeLayerBlending,
            is_landscape && vs.use_landscape_monochrome_layer_blending,
        );
        key.assign_bool(KeyField::UseFallbackStreamColor, self.use_fallback_color_stream);
        key.assign_bool(KeyField::IsUsingOneDetailTexture, vs.detail_texture_count == 1);
        key.assign_bool(KeyField::IsUsingTwoDetailTexture, vs.detail_texture_count == 2);
        key.assign_bool(KeyField::IsUsingThreeDetailTexture, vs.detail_texture_count >= 3);
        key.assign(KeyField::TextureBlendFactorSource, vs.texture_blend_factor_source as u32);

        key.assign_bool(KeyField::IsBumpOffsetEnabled, self.is_bump_offset_enabled());
        key.assign(KeyField::AlphaValueSource, ps.alpha_value_source as u32);
        key.assign(KeyField::ColorMultiplySource, ps.color_multiply_source as u32);
        key.assign(KeyField::SpecularMask, ps.specular_mask as u32);
        key.assign(KeyField::EnvironmentBlendMode, ps.environment_blend_mode as u32);
        key.assign_bool(KeyField::AllowShaderDiscard, self.caps.allows_shader_discard);

        key
    }

    /// Build the key, resolve a program and bind it. Returns whether the
    /// bound program changed, or `None` when resolution failed and the draw
    /// must be skipped.
    pub fn set_program_by_type(
        &mut self,
        gl: &dyn GlEs2,
        primitive: PrimitiveType,
        global_shader: GlobalShaderKind,
        stats: &RhiStats,
    ) -> Option<bool> {
        self.primitive_type = primitive;
        self.global_shader = global_shader;

        self.update_fog_uniforms();
        self.update_fade_uniform(global_shader);
        if self.is_bump_offset_enabled() {
            // Pre-multiply and negate the reference plane so the shader does
            // one multiply-add per pixel.
            let premultiplied =
                -(self.pixel_settings.bump_reference_plane * self.pixel_settings.bump_height_ratio);
            self.params
                .set_f32(UniformSlot::PreMultipliedBumpReferencePlane, premultiplied);
            self.params
                .set_f32(UniformSlot::BumpHeightRatio, self.pixel_settings.bump_height_ratio);
        }
        if self.is_color_grading_enabled() {
            let grading = &self.color_grading;
            let highlights_minus_shadows = [
                grading.high_lights[0] - grading.shadows[0],
                grading.high_lights[1] - grading.shadows[1],
                grading.high_lights[2] - grading.shadows[2],
                grading.high_lights[3] - grading.shadows[3],
            ];
            self.params.set_f32(UniformSlot::ColorGradingBlend, grading.blend);
            self.params
                .set_f32(UniformSlot::ColorGradingDesaturation, grading.desaturation);
            self.params.set_floats(
                UniformSlot::ColorGradingHighlightsMinusShadows,
                4,
                &highlights_minus_shadows,
            );
            self.params
                .set_floats(UniformSlot::ColorGradingMidTones, 4, &grading.mid_tones);
            self.params.set_floats(UniformSlot::ColorGradingShadows, 4, &grading.shadows);
        }

        let key_data = self.build_key();
        let changed = self.cache.bind(gl, &key_data, stats)?;
        if let Some(instance) = self.cache.current_instance_mut() {
            instance.sync_uniforms(gl, &self.params, changed, stats);
        }
        Some(changed)
    }

    fn update_fog_uniforms(&mut self) {
        if self.is_height_fog_enabled() {
            let mut min_height = self.height_fog.fog_min_height;
            let mut max_height = self.height_fog.fog_max_height;
            for layer in 0..4 {
                min_height[layer] -= self.camera_position[2];
                max_height[layer] -= self.camera_position[2];
            }
            self.params
                .set_floats(UniformSlot::FogDistanceScale, 4, &self.height_fog.fog_distance_scale);
            self.params
                .set_floats(UniformSlot::FogStartDistance, 4, &self.height_fog.fog_start_distance);
            self.params.set_floats(
                UniformSlot::FogExtinctionDistance,
                4,
                &self.height_fog.fog_extinction_distance,
            );
            self.params.set_floats(UniformSlot::FogMinHeight, 4, &min_height);
            self.params.set_floats(UniformSlot::FogMaxHeight, 4, &max_height);

            let mut scattering = [0.0f32; 16];
            for layer in 0..4 {
                let mut color = self.height_fog.fog_in_scattering[layer];
                if self.blend_mode == BlendMode::Additive {
                    // Additive primitives fade to black instead of
                    // brightening through the fog color.
                    color[0] = 0.0;
                    color[1] = 0.0;
                    color[2] = 0.0;
                }
                scattering[layer * 4..layer * 4 + 4].copy_from_slice(&color);
            }
            self.params.set_floats(UniformSlot::FogInScattering, 4, &scattering);
        } else if self.is_gradient_fog_enabled() && !self.is_fog_saturated() {
            // Cheaper-than-general fog curve:
            //   clamp((distSq - fogStartSq) / (fogEndSq - fogStartSq), 0, 1)
            // so almost everything folds into two per-object constants.
            let fog_start_squared = self.fog_start * self.fog_start;
            let range = (self.fog_end * self.fog_end) - fog_start_squared;
            let one_over_squared_range = if range > 0.0 { 1.0 / range } else { 0.0 };

            let mut shader_fog_color = self.fog_color;
            if self.blend_mode == BlendMode::Additive {
                shader_fog_color = [0.0, 0.0, 0.0, 1.0];
            }
            self.params
                .set_f32(UniformSlot::FogOneOverSquaredRange, one_over_squared_range);
            self.params.set_f32(UniformSlot::FogStartSquared, fog_start_squared);
            self.params.set_floats(UniformSlot::FogColor, 4, &shader_fog_color);
        }
    }

    /// Fade (matinee color fade) and saturated fog share one uniform; fog
    /// only contributes when it saturated or gradient fog is off this draw.
    fn update_fade_uniform(&mut self, global_shader: GlobalShaderKind) {
        let fade = self.fade_color_and_amount;
        let mut final_fade = fade;

        if self.blend_mode == BlendMode::Additive {
            final_fade[0] = 0.0;
            final_fade[1] = 0.0;
            final_fade[2] = 0.0;
            if self.is_fog_saturated() {
                final_fade[3] = 1.0;
            }
        } else if !self.is_gradient_fog_enabled() || self.is_fog_saturated() {
            let fog = if self.is_fog_saturated() { self.fog_color } else { [0.0; 4] };
            let fog_amount = 1.0 - fade[3];
            final_fade[0] = lerp(fog[0] * fog_amount, fade[0], fade[3]);
            final_fade[1] = lerp(fog[1] * fog_amount, fade[1], fade[3]);
            final_fade[2] = lerp(fog[2] * fog_amount, fade[2], fade[3]);
            final_fade[3] = lerp(fog[3], 1.0, fade[3]);
        }

        if global_shader == GlobalShaderKind::ShadowProjection {
            final_fade[2] = (1.0 - final_fade[3]).clamp(0.0, 1.0);
        }

        self.params.set_floats(UniformSlot::FadeColorAndAmount, 4, &final_fade);
    }

    // -----------------------------------------------------------------
    // Cache plumbing
    // -----------------------------------------------------------------

    pub fn warm_shader_cache(&mut self, gl: &dyn GlEs2, keys: &[ProgramKey], stats: &RhiStats) {
        debug!(keys = keys.len(), "warming shader cache");
        self.cache.warm(gl, keys, stats);
    }

    pub fn clear_gpu_resources(&mut self, gl: &dyn GlEs2) {
        self.cache.clear_gpu_resources(gl);
        self.params.clear_values();
    }

    /// Full invalidation (surface was recreated while suspended): every
    /// program recompiles from its key on next use.
    pub fn clear_shader_program_instances(&mut self, gl: &dyn GlEs2) {
        self.cache.clear(gl);
        self.params.clear_values();
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Row-major 4x4 multiply: `a * b`.
fn multiply_4x4(a: &[f32; 16], b: &[f32; 16]) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    for row in 0..4 {
        for col in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[row * 4 + k] * b[k * 4 + col];
            }
            out[row * 4 + col] = sum;
        }
    }
    out
}

/// Rotation-only upper 3x3 with scaling removed; used to rotate normals
/// without per-vertex normalization in the shader.
fn rotation_3x3(local_to_world: &[f32; 16]) -> [f32; 9] {
    let mut out = [0.0f32; 9];
    for row in 0..3 {
        let x = local_to_world[row * 4];
        let y = local_to_world[row * 4 + 1];
        let z = local_to_world[row * 4 + 2];
        let length = (x * x + y * y + z * z).sqrt();
        let scale = if length > 0.0 { 1.0 / length } else { 0.0 };
        out[row * 3] = x * scale;
        out[row * 3 + 1] = y * scale;
        out[row * 3 + 2] = z * scale;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{IDENTITY_4X4};
    use ember_gl::TraceGl;

    fn manager(gl: &TraceGl) -> ShaderManager {
        let caps = DeviceCapabilities::probe(gl);
        ShaderManager::new(SystemSettings::default(), caps)
    }

    #[test]
    fn key_is_deterministic_for_equal_state() {
        let gl = TraceGl::new();
        let mut sm = manager(&gl);
        sm.set_mobile_blend_mode(BlendMode::Opaque);
        sm.enable_specular(true);
        sm.set_vertex_factory_flags(BaseFeatures::LIGHTMAP | BaseFeatures::DIRECTIONAL_LIGHTMAP);
        let mut vertex = MaterialVertexParams::default();
        vertex.lighting_enabled = true;
        vertex.specular_enabled = true;
        sm.set_mobile_material_vertex_params(&vertex);

        let a = sm.build_key().pack();
        let b = sm.build_key().pack();
        assert_eq!(a, b);

        sm.enable_specular(false);
        sm.vertex_settings.specular_enabled = false;
        assert_ne!(sm.build_key().pack(), a);
    }

    #[test]
    fn next_draw_global_shader_is_consumed() {
        let gl = TraceGl::new();
        let mut sm = manager(&gl);
        sm.set_next_draw_global_shader(GlobalShaderKind::BloomDof);
        assert_eq!(sm.take_next_draw_global_shader(), GlobalShaderKind::BloomDof);
        assert_eq!(sm.take_next_draw_global_shader(), GlobalShaderKind::None);
    }

    #[test]
    fn fog_saturation_uses_object_bounds() {
        let gl = TraceGl::new();
        let mut sm = manager(&gl);
        sm.set_fog(true, 10.0, 100.0, [0.5, 0.5, 0.5, 1.0]);
        let mut mesh = MeshVertexParams::default();
        mesh.object_position = [500.0, 0.0, 0.0];
        mesh.object_bounds_radius = 10.0;
        mesh.local_to_world = IDENTITY_4X4;
        sm.set_mobile_mesh_vertex_params(&mesh);

        // 500 units away with radius 10 is far past FogEnd=100.
        assert!(sm.is_fog_saturated());
        // Saturated fog removes the gradient-fog key bit.
        let key = sm.build_key();
        assert_eq!(key.get(KeyField::IsGradientFogEnabled), 0);

        // Near object: gradient fog on, not saturated.
        mesh.object_position = [50.0, 0.0, 0.0];
        sm.set_mobile_mesh_vertex_params(&mesh);
        assert!(!sm.is_fog_saturated());
        assert_eq!(sm.build_key().get(KeyField::IsGradientFogEnabled), 1);
    }

    #[test]
    fn minimized_fog_collapses_to_a_single_bit() {
        let gl = TraceGl::new();
        let caps = DeviceCapabilities::probe(&gl);
        let mut settings = SystemSettings::default();
        settings.minimize_fog_shaders = true;
        let mut sm = ShaderManager::new(settings, caps);
        // Fog never saturates and the key bit tracks only the allow switch.
        sm.set_fog(true, 0.0, 1.0, [1.0, 1.0, 1.0, 1.0]);
        let mut mesh = MeshVertexParams::default();
        mesh.object_position = [1.0e6, 0.0, 0.0];
        sm.set_mobile_mesh_vertex_params(&mesh);
        assert!(!sm.is_fog_saturated());
        assert_eq!(sm.build_key().get(KeyField::IsGradientFogEnabled), 1);
    }

    #[test]
    fn lightmap_latch_resets_on_next_sampler_bind() {
        let gl = TraceGl::new();
        let mut sm = manager(&gl);
        sm.notify_sampler_bind(true, true);
        assert!(sm.has_had_directional_lightmap_set());

        sm.reset_lightmap_on_next_sampler();
        sm.notify_sampler_bind(false, false);
        assert!(!sm.has_had_lightmap_set());
    }

    #[test]
    fn bump_offset_respects_device_quirk() {
        let gl = TraceGl::with_config(ember_gl::TraceGlConfig {
            renderer: "Mali-400 MP".to_owned(),
            ..ember_gl::TraceGlConfig::default()
        });
        let mut sm = manager(&gl);
        sm.set_bump_offset(true, 100.0);
        assert!(!sm.is_bump_offset_enabled());
    }

    #[test]
    fn set_program_binds_and_uploads_versioned_uniforms() {
        let gl = TraceGl::new();
        let stats = RhiStats::new();
        let mut sm = manager(&gl);
        sm.set_color_fading(true, [1.0, 0.0, 0.0, 0.25]);

        let changed = sm
            .set_program_by_type(&gl, PrimitiveType::Default, GlobalShaderKind::None, &stats)
            .unwrap();
        assert!(changed);
        let uploads_after_first = gl.count(ember_gl::CallKind::Uniform);
        assert!(uploads_after_first > 0);

        // Unchanged state: same program, no further uploads.
        let changed = sm
            .set_program_by_type(&gl, PrimitiveType::Default, GlobalShaderKind::None, &stats)
            .unwrap();
        assert!(!changed);
        assert_eq!(gl.count(ember_gl::CallKind::Uniform), uploads_after_first);
    }
}
