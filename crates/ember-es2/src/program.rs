//! The program cache: key → compiled and linked GL program.
//!
//! Programs compile on first use of their key from embedded GLSL bodies
//! plus a `#define` block generated from the key, or ahead of time when the
//! cache is warmed from a preprocessed key index. A key requested at runtime
//! that is missing from the warmed set is recorded so tooling can repair the
//! shipped index; development builds fall through to an on-demand compile
//! either way.
//!
//! Instances survive for the session. On context loss the driver objects are
//! dropped ([`ProgramCache::clear_gpu_resources`]) and rebuilt from the key
//! on the next resolve.

use ember_gl::{consts, GlEs2};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, error, warn};

use crate::key::{KeyError, KeyField, ProgramKey, ProgramKeyData};
use crate::material::{GlobalShaderKind, PrimitiveType};
use crate::stats::RhiStats;
use crate::uniforms::{ParameterStore, UniformData, UniformSlot, ALL_SLOTS, SLOT_COUNT, SLOT_INFO};
use crate::vertex::{bind_location, VertexUsage, MAX_ENGINE_ATTRIBS};

const COMMON_PREFIX: &str = include_str!("shaders/common.glsl");
const VERTEX_PREFIX: &str = include_str!("shaders/vertex_common.glsl");
const PIXEL_PREFIX: &str = include_str!("shaders/pixel_common.glsl");
const MATERIAL_VERTEX_BODY: &str = include_str!("shaders/material.vert");
const MATERIAL_PIXEL_BODY: &str = include_str!("shaders/material.frag");
const GLOBAL_VERTEX_BODY: &str = include_str!("shaders/global.vert");
const GLOBAL_PIXEL_BODY: &str = include_str!("shaders/global.frag");

/// Version tag of the preprocessed key index file format.
const KEY_INDEX_VERSION: u32 = 1;

/// Per-program shadow of one uniform slot.
#[derive(Debug)]
struct UniformBinding {
    slot: UniformSlot,
    location: i32,
    /// Store version last pushed to this program.
    version: u32,
    /// Value last pushed, for equal-value short-circuiting.
    shadow: Option<UniformData>,
}

/// A compiled and linked program plus its binding tables.
#[derive(Debug)]
pub struct ProgramInstance {
    pub key: ProgramKey,
    program: u32,
    vertex_shader: u32,
    pixel_shader: u32,
    /// Mask over GLSL attribute locations this program actually uses.
    pub used_attrib_mask: u32,
    /// Engine attribute slot → GLSL location, `-1` when unused.
    pub attrib_mapping: [i32; MAX_ENGINE_ATTRIBS],
    uniforms: Vec<UniformBinding>,
    pub warmed: bool,
}

impl ProgramInstance {
    pub fn driver_name(&self) -> u32 {
        self.program
    }

    /// Upload every versioned parameter whose version moved since this
    /// program last saw it. Equal values short-circuit the driver call but
    /// still absorb the version, so later draws stay cheap.
    pub fn sync_uniforms(
        &mut self,
        gl: &dyn GlEs2,
        store: &ParameterStore,
        program_changed: bool,
        stats: &RhiStats,
    ) {
        for binding in &mut self.uniforms {
            let param = store.get(binding.slot);
            if param.version == binding.version {
                continue;
            }
            binding.version = param.version;
            let Some(data) = &param.data else {
                continue;
            };
            if !program_changed && binding.shadow.as_ref() == Some(data) {
                continue;
            }
            upload_uniform(gl, binding.location, data);
            stats.add_uniform_bytes_uploaded(data.byte_len() as u64);
            binding.shadow = Some(data.clone());
        }
    }

    fn destroy(&mut self, gl: &dyn GlEs2) {
        if self.vertex_shader != 0 {
            gl.detach_shader(self.program, self.vertex_shader);
            gl.delete_shader(self.vertex_shader);
            self.vertex_shader = 0;
        }
        if self.pixel_shader != 0 {
            gl.detach_shader(self.program, self.pixel_shader);
            gl.delete_shader(self.pixel_shader);
            self.pixel_shader = 0;
        }
        if self.program != 0 {
            gl.delete_program(self.program);
            self.program = 0;
        }
    }
}

fn upload_uniform(gl: &dyn GlEs2, location: i32, data: &UniformData) {
    match data {
        UniformData::Int(value) => gl.uniform_1i(location, *value),
        UniformData::Floats { components: 1, values } => gl.uniform_1fv(location, values),
        UniformData::Floats { components: 2, values } => gl.uniform_2fv(location, values),
        UniformData::Floats { components: 3, values } => gl.uniform_3fv(location, values),
        UniformData::Floats { components: _, values } => gl.uniform_4fv(location, values),
        UniformData::Matrix3(values) => gl.uniform_matrix_3fv(location, values),
        UniformData::Matrix4(values) => gl.uniform_matrix_4fv(location, values),
    }
}

#[derive(Debug)]
pub struct ProgramCache {
    programs: HashMap<ProgramKey, ProgramInstance>,
    /// Driver name of the program bound by the last `bind`; `0` when none.
    current_program: u32,
    current_key: Option<ProgramKey>,
    /// Keys present in the shipped preprocessed index.
    warmed: HashSet<ProgramKey>,
    /// Keys requested at runtime but absent from the warmed set.
    missing: Vec<ProgramKey>,
    /// Deployment forbids silent draw-time compiles.
    use_preprocessed: bool,
    bone_count: u32,
}

impl ProgramCache {
    pub fn new(use_preprocessed: bool, bone_count: u32) -> Self {
        Self {
            programs: HashMap::new(),
            current_program: 0,
            current_key: None,
            warmed: HashSet::new(),
            missing: Vec::new(),
            use_preprocessed,
            bone_count,
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn current_key(&self) -> Option<ProgramKey> {
        self.current_key
    }

    /// Resolve `key_data` to a program and bind it. Returns whether the
    /// bound program changed, or `None` when no program could be produced
    /// (the caller skips the draw).
    pub fn bind(
        &mut self,
        gl: &dyn GlEs2,
        key_data: &ProgramKeyData,
        stats: &RhiStats,
    ) -> Option<bool> {
        let key = key_data.pack();
        if !self.programs.contains_key(&key) {
            stats.inc_program_cache_misses();
            if self.use_preprocessed && !self.warmed.contains(&key) {
                // Shipped cache is incomplete; record for the repair tool,
                // then compile anyway rather than dropping the draw.
                debug!(%key, "program key missing from preprocessed set");
                self.missing.push(key);
            }
            if !self.compile_into_cache(gl, key, key_data, stats) {
                let fallback = fallback_key_data(key_data);
                let fallback_key = fallback.pack();
                if !self.programs.contains_key(&fallback_key)
                    && !self.compile_into_cache(gl, fallback_key, &fallback, stats)
                {
                    return None;
                }
                return Some(self.bind_existing(gl, fallback_key, stats));
            }
        } else {
            stats.inc_program_cache_hits();
        }
        Some(self.bind_existing(gl, key, stats))
    }

    fn bind_existing(&mut self, gl: &dyn GlEs2, key: ProgramKey, stats: &RhiStats) -> bool {
        let instance = &self.programs[&key];
        let changed = instance.driver_name() != self.current_program;
        if changed {
            gl.use_program(instance.driver_name());
            self.current_program = instance.driver_name();
            stats.inc_program_changes();
        }
        self.current_key = Some(key);
        changed
    }

    pub fn current_instance_mut(&mut self) -> Option<&mut ProgramInstance> {
        let key = self.current_key?;
        self.programs.get_mut(&key)
    }

    pub fn instance(&self, key: ProgramKey) -> Option<&ProgramInstance> {
        self.programs.get(&key)
    }

    fn compile_into_cache(
        &mut self,
        gl: &dyn GlEs2,
        key: ProgramKey,
        key_data: &ProgramKeyData,
        stats: &RhiStats,
    ) -> bool {
        match compile_program(gl, key, key_data, self.bone_count) {
            Ok(instance) => {
                stats.inc_programs_compiled();
                self.programs.insert(key, instance);
                true
            }
            Err(log) => {
                error!(%key, %log, "shader compile/link failed");
                if !self.missing.contains(&key) {
                    self.missing.push(key);
                }
                false
            }
        }
    }

    /// Ahead-of-time populate the cache from a serialized key list.
    pub fn warm(&mut self, gl: &dyn GlEs2, keys: &[ProgramKey], stats: &RhiStats) {
        for &key in keys {
            self.warmed.insert(key);
            if self.programs.contains_key(&key) {
                continue;
            }
            let key_data = ProgramKeyData::unpack(key);
            if self.compile_into_cache(gl, key, &key_data, stats) {
                if let Some(instance) = self.programs.get_mut(&key) {
                    instance.warmed = true;
                }
            }
        }
        debug!(warmed = keys.len(), compiled = self.programs.len(), "shader cache warmed");
    }

    pub fn missing_keys(&self) -> &[ProgramKey] {
        &self.missing
    }

    pub fn log_missing_keys(&self) {
        for key in &self.missing {
            warn!(%key, "program key was not in the preprocessed cache");
        }
    }

    /// Serialize the missing list in the key-index file format, for the
    /// developer to merge into the shipped index.
    pub fn export_missing_index(&self) -> String {
        let mut out = format!("version:{KEY_INDEX_VERSION}\n");
        for key in &self.missing {
            out.push_str("key:");
            out.push_str(&key.to_hex());
            out.push('\n');
        }
        out
    }

    /// Invalidate one entry; it recompiles on next use.
    pub fn clear_key(&mut self, gl: &dyn GlEs2, key: ProgramKey) {
        if let Some(mut instance) = self.programs.remove(&key) {
            if instance.driver_name() == self.current_program {
                self.current_program = 0;
                self.current_key = None;
            }
            instance.destroy(gl);
        }
    }

    /// Invalidate everything, including the warmed set.
    pub fn clear(&mut self, gl: &dyn GlEs2) {
        for (_, mut instance) in self.programs.drain() {
            instance.destroy(gl);
        }
        self.current_program = 0;
        self.current_key = None;
        self.warmed.clear();
        self.missing.clear();
    }

    /// Release driver shader/program objects without touching the key sets;
    /// used when the surface goes away but the logical cache should rebuild
    /// on resume.
    pub fn clear_gpu_resources(&mut self, gl: &dyn GlEs2) {
        for (_, mut instance) in self.programs.drain() {
            instance.destroy(gl);
        }
        self.current_program = 0;
        self.current_key = None;
    }
}

/// Parse a preprocessed key index file: `version:N` then `key:<hex>` lines.
pub fn parse_key_index(text: &str) -> Result<Vec<ProgramKey>, KeyError> {
    let mut keys = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("version:") {
            continue;
        }
        if let Some(hex) = line.strip_prefix("key:") {
            keys.push(ProgramKey::from_hex(hex)?);
        }
    }
    Ok(keys)
}

/// The degenerate key used when a requested permutation fails to compile:
/// every feature off, primitive type preserved.
fn fallback_key_data(requested: &ProgramKeyData) -> ProgramKeyData {
    let mut data = ProgramKeyData::new();
    for &(field, _) in crate::key::KEY_FIELDS {
        data.assign(field, 0);
    }
    data.override_value(KeyField::PrimitiveType, requested.get(KeyField::PrimitiveType));
    data.override_value(KeyField::GlobalShader, requested.get(KeyField::GlobalShader));
    data
}

fn compile_program(
    gl: &dyn GlEs2,
    key: ProgramKey,
    key_data: &ProgramKeyData,
    bone_count: u32,
) -> Result<ProgramInstance, String> {
    let is_global = key_data.get(KeyField::PrimitiveType) == PrimitiveType::GlobalShader as u32;
    let defines = build_defines(key_data, bone_count);

    let vertex_body = if is_global { GLOBAL_VERTEX_BODY } else { MATERIAL_VERTEX_BODY };
    let pixel_body = if is_global { GLOBAL_PIXEL_BODY } else { MATERIAL_PIXEL_BODY };

    let vertex_source = [defines.as_str(), COMMON_PREFIX, VERTEX_PREFIX, vertex_body].join("\n");
    let pixel_source = [defines.as_str(), COMMON_PREFIX, PIXEL_PREFIX, pixel_body].join("\n");

    let vertex_shader = compile_shader(gl, consts::VERTEX_SHADER, &vertex_source, key)?;
    let pixel_shader = match compile_shader(gl, consts::FRAGMENT_SHADER, &pixel_source, key) {
        Ok(shader) => shader,
        Err(log) => {
            gl.delete_shader(vertex_shader);
            return Err(log);
        }
    };

    let program = gl.create_program();
    gl.attach_shader(program, vertex_shader);
    gl.attach_shader(program, pixel_shader);
    gl.link_program(program);
    if !gl.program_link_status(program) {
        let log = gl.program_info_log(program);
        gl.delete_shader(vertex_shader);
        gl.delete_shader(pixel_shader);
        gl.delete_program(program);
        return Err(if log.is_empty() { "link failed".to_owned() } else { log });
    }
    gl.use_program(program);

    let mut instance = ProgramInstance {
        key,
        program,
        vertex_shader,
        pixel_shader,
        used_attrib_mask: 0,
        attrib_mapping: [-1; MAX_ENGINE_ATTRIBS],
        uniforms: Vec::new(),
        warmed: false,
    };
    bind_attributes(gl, &mut instance, key_data);
    bind_uniforms(gl, &mut instance);
    Ok(instance)
}

fn compile_shader(gl: &dyn GlEs2, kind: u32, source: &str, key: ProgramKey) -> Result<u32, String> {
    let shader = gl.create_shader(kind);
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.shader_compile_status(shader) {
        let log = gl.shader_info_log(shader);
        warn!(%key, stage = kind, %log, "shader info log");
        gl.delete_shader(shader);
        return Err(log);
    }
    Ok(shader)
}

/// Look up each attribute name the permutation can reference and record the
/// engine-slot → GLSL-location remapping plus the used-attribute mask.
fn bind_attributes(gl: &dyn GlEs2, instance: &mut ProgramInstance, key_data: &ProgramKeyData) {
    let mut bind = |engine_slot: u32, name: &str| {
        let location = gl.attrib_location(instance.program, name);
        if location >= 0 {
            instance.attrib_mapping[engine_slot as usize] = location;
            instance.used_attrib_mask |= 1 << location;
        }
    };

    bind(bind_location(VertexUsage::Position, 0), "Position");
    bind(bind_location(VertexUsage::TexCoord, 0), "TexCoords0");
    bind(bind_location(VertexUsage::TexCoord, 1), "TexCoords1");
    bind(bind_location(VertexUsage::TexCoord, 2), "TexCoords2");
    bind(bind_location(VertexUsage::TexCoord, 3), "TexCoords3");
    bind(bind_location(VertexUsage::Normal, 0), "TangentZ");
    bind(bind_location(VertexUsage::Tangent, 0), "TangentX");

    if key_data.is_set(KeyField::IsSkinned) {
        bind(bind_location(VertexUsage::Color, 0), "VertexColor");
        bind(bind_location(VertexUsage::BlendWeight, 0), "BlendWeight");
        bind(bind_location(VertexUsage::BlendIndices, 0), "BlendIndices");
    } else if !key_data.is_set(KeyField::IsLandscape) {
        bind(bind_location(VertexUsage::Color, 0), "Color");
        bind(bind_location(VertexUsage::Color, 1), "VertexColor");
    }
}

fn bind_uniforms(gl: &dyn GlEs2, instance: &mut ProgramInstance) {
    for slot_index in 0..SLOT_COUNT {
        let location = gl.uniform_location(instance.program, SLOT_INFO[slot_index].name);
        if location < 0 {
            continue;
        }
        instance.uniforms.push(UniformBinding {
            slot: ALL_SLOTS[slot_index],
            location,
            version: 0,
            shadow: None,
        });
    }
}

fn build_defines(key_data: &ProgramKeyData, bone_count: u32) -> String {
    let mut out = String::with_capacity(1024);
    let mut define = |name: &str, value: u32| {
        out.push_str("#define ");
        out.push_str(name);
        out.push(' ');
        out.push_str(&value.to_string());
        out.push('\n');
    };

    define("USE_LIGHTMAP", key_data.get(KeyField::IsLightmap));
    define("USE_DIRECTIONAL_LIGHTMAP", key_data.get(KeyField::IsDirectionalLightmap));
    define("USE_GPU_SKINNING", key_data.get(KeyField::IsSkinned));
    define("BONE_COUNT", bone_count);
    define("USE_DECAL", key_data.get(KeyField::IsDecal));
    define("USE_SUBUV_PARTICLES", key_data.get(KeyField::IsSubUv));
    define("USE_LANDSCAPE", key_data.get(KeyField::IsLandscape));
    define(
        "USE_LANDSCAPE_MONOCHROME_BLENDING",
        key_data.get(KeyField::UseLandscapeMonochromeLayerBlending),
    );
    define("USE_LIGHTING", key_data.get(KeyField::IsLightingEnabled));
    define("BASE_TEX_COORD_SOURCE", key_data.get(KeyField::BaseTexCoordSource));
    define("DETAIL_TEX_COORD_SOURCE", key_data.get(KeyField::DetailTexCoordSource));
    define("MASK_TEX_COORD_SOURCE", key_data.get(KeyField::MaskTexCoordSource));
    define("BASE_TEXTURE_TRANSFORMED", key_data.get(KeyField::IsBaseTextureTransformed));
    define("EMISSIVE_TEXTURE_TRANSFORMED", key_data.get(KeyField::IsEmissiveTextureTransformed));
    define("NORMAL_TEXTURE_TRANSFORMED", key_data.get(KeyField::IsNormalTextureTransformed));
    define("MASK_TEXTURE_TRANSFORMED", key_data.get(KeyField::IsMaskTextureTransformed));
    define("DETAIL_TEXTURE_TRANSFORMED", key_data.get(KeyField::IsDetailTextureTransformed));
    define("USE_EMISSIVE", key_data.get(KeyField::IsEmissiveEnabled));
    define("EMISSIVE_COLOR_SOURCE", key_data.get(KeyField::EmissiveColorSource));
    define("EMISSIVE_MASK_SOURCE", key_data.get(KeyField::EmissiveMaskSource));
    define("USE_NORMAL_MAPPING", key_data.get(KeyField::IsNormalMappingEnabled));
    define("USE_ENVIRONMENT_MAPPING", key_data.get(KeyField::IsEnvironmentMappingEnabled));
    define("ENVIRONMENT_MASK_SOURCE", key_data.get(KeyField::EnvironmentMaskSource));
    define("USE_ENVIRONMENT_FRESNEL", key_data.get(KeyField::IsEnvironmentFresnelEnabled));
    define("ENVIRONMENT_BLEND_LERP", key_data.get(KeyField::EnvironmentBlendMode));
    define("USE_RIM_LIGHTING", key_data.get(KeyField::IsRimLightingEnabled));
    define("RIM_LIGHTING_MASK_SOURCE", key_data.get(KeyField::RimLightingMaskSource));
    define("USE_SPECULAR", key_data.get(KeyField::IsSpecularEnabled));
    define("USE_PIXEL_SPECULAR", key_data.get(KeyField::IsPixelSpecularEnabled));
    define("USE_DETAIL_NORMAL", key_data.get(KeyField::IsDetailNormalEnabled));
    define("AMBIENT_OCCLUSION_SOURCE", key_data.get(KeyField::AmbientOcclusionSource));
    define("USE_WAVE_VERTEX_MOVEMENT", key_data.get(KeyField::IsWaveVertexMovementEnabled));
    define("USE_UNIFORM_COLOR_MULTIPLY", key_data.get(KeyField::UseUniformColorMultiply));
    define("USE_VERTEX_COLOR_MULTIPLY", key_data.get(KeyField::UseVertexColorMultiply));
    define("USE_FALLBACK_STREAM_COLOR", key_data.get(KeyField::UseFallbackStreamColor));
    define("NUM_DETAIL_TEXTURES", detail_texture_count(key_data));
    define("TEXTURE_BLEND_FACTOR_SOURCE", key_data.get(KeyField::TextureBlendFactorSource));
    define("USE_BUMP_OFFSET", key_data.get(KeyField::IsBumpOffsetEnabled));
    define("ALPHA_VALUE_SOURCE", key_data.get(KeyField::AlphaValueSource));
    define("COLOR_MULTIPLY_SOURCE", key_data.get(KeyField::ColorMultiplySource));
    define("SPECULAR_MASK", key_data.get(KeyField::SpecularMask));
    define("PARTICLE_SCREEN_ALIGNMENT", key_data.get(KeyField::ParticleScreenAlignment));
    define("USE_GRADIENT_FOG", key_data.get(KeyField::IsGradientFogEnabled));
    define("USE_HEIGHT_FOG", key_data.get(KeyField::IsHeightFogEnabled));
    define("USE_GAMMA_CORRECTION", key_data.get(KeyField::UseGammaCorrection));
    define("USE_COLOR_GRADING", key_data.get(KeyField::IsColorGradingEnabled));
    define("USE_ALPHA_TEST", u32::from(key_data.get(KeyField::BlendMode) == 1));
    define("USE_SHADER_DISCARD", key_data.get(KeyField::AllowShaderDiscard));
    define("DEPTH_ONLY", key_data.get(KeyField::IsDepthOnly));
    define(
        "SHADOW_DEPTH",
        u32::from(key_data.get(KeyField::DepthShader) == 2),
    );
    define(
        "FORWARD_SHADOW_PROJECTION",
        key_data.get(KeyField::ForwardShadowProjection),
    );

    let global = key_data.get(KeyField::GlobalShader);
    define(
        "GLOBAL_SHADER_SHADOW_PROJECTION",
        u32::from(global == GlobalShaderKind::ShadowProjection as u32),
    );
    define(
        "GLOBAL_SHADER_GAMMA_CORRECTION",
        u32::from(global == GlobalShaderKind::GammaCorrection as u32),
    );
    define("GLOBAL_SHADER_BLOOM_DOF", u32::from(global == GlobalShaderKind::BloomDof as u32));
    define(
        "GLOBAL_SHADER_LIGHT_SHAFTS",
        u32::from(global == GlobalShaderKind::LightShafts as u32),
    );

    out
}

fn detail_texture_count(key_data: &ProgramKeyData) -> u32 {
    if key_data.is_set(KeyField::IsUsingThreeDetailTexture) {
        3
    } else if key_data.is_set(KeyField::IsUsingTwoDetailTexture) {
        2
    } else {
        u32::from(key_data.is_set(KeyField::IsUsingOneDetailTexture))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KEY_FIELDS;
    use ember_gl::{GlCall, TraceGl};

    fn zero_key_data() -> ProgramKeyData {
        let mut data = ProgramKeyData::new();
        for &(field, _) in KEY_FIELDS {
            data.assign(field, 0);
        }
        data
    }

    #[test]
    fn equal_keys_bind_equal_programs() {
        let gl = TraceGl::new();
        let stats = RhiStats::new();
        let mut cache = ProgramCache::new(false, 75);

        let mut data = zero_key_data();
        data.override_value(KeyField::IsSpecularEnabled, 1);

        let changed = cache.bind(&gl, &data, &stats).unwrap();
        assert!(changed);
        let first = cache.current_key().unwrap();
        let first_name = cache.instance(first).unwrap().driver_name();

        // Second resolve with an equal key: no compile, no program change.
        let changed = cache.bind(&gl, &data, &stats).unwrap();
        assert!(!changed);
        assert_eq!(cache.instance(first).unwrap().driver_name(), first_name);
        assert_eq!(cache.len(), 1);
        assert_eq!(stats.snapshot().programs_compiled, 1);

        // Flipping one feature resolves a different record.
        let mut other = zero_key_data();
        other.override_value(KeyField::IsSpecularEnabled, 0);
        other.override_value(KeyField::IsPixelSpecularEnabled, 1);
        assert!(cache.bind(&gl, &other, &stats).unwrap());
        assert_ne!(cache.current_key().unwrap(), first);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn compile_failure_falls_back_to_the_stub_program() {
        let gl = TraceGl::new();
        let stats = RhiStats::new();
        let mut cache = ProgramCache::new(false, 75);

        let mut data = zero_key_data();
        data.override_value(KeyField::IsLightmap, 1);

        gl.fail_next_compiles(1, "0:1: error");
        let changed = cache.bind(&gl, &data, &stats);
        assert_eq!(changed, Some(true));
        // The bound program is the degenerate key, and the failed key is in
        // the missing list.
        assert_eq!(cache.current_key().unwrap(), fallback_key_data(&data).pack());
        assert_eq!(cache.missing_keys(), &[data.pack()]);
    }

    #[test]
    fn preprocessed_mode_records_missing_keys() {
        let gl = TraceGl::new();
        let stats = RhiStats::new();
        let mut cache = ProgramCache::new(true, 75);
        let mut data = zero_key_data();
        data.override_value(KeyField::IsSkinned, 1);

        cache.warm(&gl, &[zero_key_data().pack()], &stats);
        cache.bind(&gl, &data, &stats).unwrap();
        assert_eq!(cache.missing_keys(), &[data.pack()]);

        let exported = cache.export_missing_index();
        let parsed = parse_key_index(&exported).unwrap();
        assert_eq!(parsed, vec![data.pack()]);
    }

    #[test]
    fn warm_compiles_each_key_once() {
        let gl = TraceGl::new();
        let stats = RhiStats::new();
        let mut cache = ProgramCache::new(true, 75);

        let mut a = zero_key_data();
        a.override_value(KeyField::IsLightmap, 1);
        let keys = vec![zero_key_data().pack(), a.pack()];
        cache.warm(&gl, &keys, &stats);
        assert_eq!(cache.len(), 2);
        assert_eq!(stats.snapshot().programs_compiled, 2);

        // A warmed key binds without recording a miss against the index.
        cache.bind(&gl, &a, &stats).unwrap();
        assert!(cache.missing_keys().is_empty());
    }

    #[test]
    fn clear_gpu_resources_keeps_warmed_and_missing_sets() {
        let gl = TraceGl::new();
        let stats = RhiStats::new();
        let mut cache = ProgramCache::new(true, 75);
        cache.warm(&gl, &[zero_key_data().pack()], &stats);

        let mut missing = zero_key_data();
        missing.override_value(KeyField::IsDecal, 1);
        cache.bind(&gl, &missing, &stats).unwrap();
        assert_eq!(cache.missing_keys().len(), 1);

        cache.clear_gpu_resources(&gl);
        assert!(cache.is_empty());
        assert_eq!(cache.missing_keys().len(), 1);
        assert!(gl.count_where(|c| matches!(c, GlCall::DeleteProgram(_))) >= 2);

        // Warmed key resolves again without being re-reported missing.
        cache.bind(&gl, &zero_key_data(), &stats).unwrap();
        assert_eq!(cache.missing_keys().len(), 1);
    }

    #[test]
    fn skinned_programs_bind_blend_attributes() {
        let gl = TraceGl::new();
        let stats = RhiStats::new();
        let mut cache = ProgramCache::new(false, 75);
        let mut data = zero_key_data();
        data.override_value(KeyField::IsSkinned, 1);
        cache.bind(&gl, &data, &stats).unwrap();

        let instance = cache.current_instance_mut().unwrap();
        let weight_slot = bind_location(VertexUsage::BlendWeight, 0) as usize;
        assert!(instance.attrib_mapping[weight_slot] >= 0);
        assert_ne!(instance.used_attrib_mask, 0);
    }

    #[test]
    fn key_index_parser_skips_version_and_blank_lines() {
        let text = "version:1\n\nkey:00000000000000000000000000000042\n";
        let keys = parse_key_index(text).unwrap();
        assert_eq!(keys, vec![ProgramKey::from_hex("42").unwrap()]);
        assert!(parse_key_index("key:xyz").is_err());
    }
}
