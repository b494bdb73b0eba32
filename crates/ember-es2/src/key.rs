//! The program key: a packed description of every material/mesh/pipeline
//! toggle that selects a compiled shader program.
//!
//! The key is generated from one declarative field table ([`KEY_FIELDS`]):
//! adding a feature means adding an enum variant and one table row; the
//! packer, unpacker, hex serialization and cache never change. Keys pack
//! into a `u128`, hash with xxh3 for stable off-line indices, and print as
//! lowercase hex (the preprocessed-cache file format).

use std::fmt;

use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Every field that participates in program selection.
///
/// Discriminants index [`ProgramKeyData::values`]; the pack order is the
/// table order in [`KEY_FIELDS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeyField {
    PrimitiveType,
    GlobalShader,
    DepthShader,
    IsDepthOnly,
    ForwardShadowProjection,
    BlendMode,
    IsGradientFogEnabled,
    IsHeightFogEnabled,
    UseGammaCorrection,
    IsColorGradingEnabled,
    ParticleScreenAlignment,

    IsLightmap,
    IsDirectionalLightmap,
    IsSkinned,
    IsDecal,
    IsSubUv,
    IsLandscape,

    IsLightingEnabled,
    BaseTexCoordSource,
    DetailTexCoordSource,
    MaskTexCoordSource,
    IsBaseTextureTransformed,
    IsEmissiveTextureTransformed,
    IsNormalTextureTransformed,
    IsMaskTextureTransformed,
    IsDetailTextureTransformed,
    IsEmissiveEnabled,
    EmissiveColorSource,
    EmissiveMaskSource,
    IsNormalMappingEnabled,
    IsEnvironmentMappingEnabled,
    EnvironmentMaskSource,
    IsEnvironmentFresnelEnabled,
    IsRimLightingEnabled,
    RimLightingMaskSource,
    IsSpecularEnabled,
    IsPixelSpecularEnabled,
    IsDetailNormalEnabled,
    AmbientOcclusionSource,
    IsWaveVertexMovementEnabled,
    UseUniformColorMultiply,
    UseVertexColorMultiply,
    UseLandscapeMonochromeLayerBlending,
    UseFallbackStreamColor,
    IsUsingOneDetailTexture,
    IsUsingTwoDetailTexture,
    IsUsingThreeDetailTexture,
    TextureBlendFactorSource,

    IsBumpOffsetEnabled,
    AlphaValueSource,
    ColorMultiplySource,
    SpecularMask,
    EnvironmentBlendMode,
    AllowShaderDiscard,
}

impl KeyField {
    pub const COUNT: usize = KEY_FIELDS.len();
}

/// Bit width of each field, in pack order.
pub const KEY_FIELDS: &[(KeyField, u32)] = &[
    (KeyField::PrimitiveType, 3),
    (KeyField::GlobalShader, 3),
    (KeyField::DepthShader, 2),
    (KeyField::IsDepthOnly, 1),
    (KeyField::ForwardShadowProjection, 1),
    (KeyField::BlendMode, 3),
    (KeyField::IsGradientFogEnabled, 1),
    (KeyField::IsHeightFogEnabled, 1),
    (KeyField::UseGammaCorrection, 1),
    (KeyField::IsColorGradingEnabled, 1),
    (KeyField::ParticleScreenAlignment, 2),
    (KeyField::IsLightmap, 1),
    (KeyField::IsDirectionalLightmap, 1),
    (KeyField::IsSkinned, 1),
    (KeyField::IsDecal, 1),
    (KeyField::IsSubUv, 1),
    (KeyField::IsLandscape, 1),
    (KeyField::IsLightingEnabled, 1),
    (KeyField::BaseTexCoordSource, 2),
    (KeyField::DetailTexCoordSource, 2),
    (KeyField::MaskTexCoordSource, 2),
    (KeyField::IsBaseTextureTransformed, 1),
    (KeyField::IsEmissiveTextureTransformed, 1),
    (KeyField::IsNormalTextureTransformed, 1),
    (KeyField::IsMaskTextureTransformed, 1),
    (KeyField::IsDetailTextureTransformed, 1),
    (KeyField::IsEmissiveEnabled, 1),
    (KeyField::EmissiveColorSource, 2),
    (KeyField::EmissiveMaskSource, 3),
    (KeyField::IsNormalMappingEnabled, 1),
    (KeyField::IsEnvironmentMappingEnabled, 1),
    (KeyField::EnvironmentMaskSource, 3),
    (KeyField::IsEnvironmentFresnelEnabled, 1),
    (KeyField::IsRimLightingEnabled, 1),
    (KeyField::RimLightingMaskSource, 3),
    (KeyField::IsSpecularEnabled, 1),
    (KeyField::IsPixelSpecularEnabled, 1),
    (KeyField::IsDetailNormalEnabled, 1),
    (KeyField::AmbientOcclusionSource, 2),
    (KeyField::IsWaveVertexMovementEnabled, 1),
    (KeyField::UseUniformColorMultiply, 1),
    (KeyField::UseVertexColorMultiply, 1),
    (KeyField::UseLandscapeMonochromeLayerBlending, 1),
    (KeyField::UseFallbackStreamColor, 1),
    (KeyField::IsUsingOneDetailTexture, 1),
    (KeyField::IsUsingTwoDetailTexture, 1),
    (KeyField::IsUsingThreeDetailTexture, 1),
    (KeyField::TextureBlendFactorSource, 2),
    (KeyField::IsBumpOffsetEnabled, 1),
    (KeyField::AlphaValueSource, 2),
    (KeyField::ColorMultiplySource, 3),
    (KeyField::SpecularMask, 3),
    (KeyField::EnvironmentBlendMode, 1),
    (KeyField::AllowShaderDiscard, 1),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("program key hex string {0:?} is malformed")]
    MalformedHex(String),
}

/// A packed program key. Equal keys must bind equal programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ProgramKey(u128);

impl ProgramKey {
    pub const ZERO: Self = Self(0);

    pub fn raw(self) -> u128 {
        self.0
    }

    /// Stable 64-bit hash for offline indices and telemetry. Independent of
    /// the process hasher seed, unlike `Hash`.
    pub fn stable_hash(self) -> u64 {
        xxh3_64(&self.0.to_le_bytes())
    }

    pub fn to_hex(self) -> String {
        format!("{:032x}", self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let trimmed = hex.trim();
        if trimmed.is_empty() || trimmed.len() > 32 {
            return Err(KeyError::MalformedHex(hex.to_owned()));
        }
        u128::from_str_radix(trimmed, 16)
            .map(Self)
            .map_err(|_| KeyError::MalformedHex(hex.to_owned()))
    }
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// The unpacked form the shader manager fills in while assembling a key.
///
/// Every field must be assigned exactly once between `new` and `pack`;
/// double-assignment and unassigned fields are caught by debug assertions.
/// The bug class this guards against is a new feature forgetting to feed
/// the key, which silently aliases distinct programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramKeyData {
    values: [u16; KeyField::COUNT],
    assigned: u64,
}

impl Default for ProgramKeyData {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramKeyData {
    pub fn new() -> Self {
        Self { values: [0; KeyField::COUNT], assigned: 0 }
    }

    pub fn assign(&mut self, field: KeyField, value: u32) {
        let index = field as usize;
        debug_assert!(
            self.assigned & (1 << index) == 0,
            "program key field {field:?} assigned twice"
        );
        debug_assert!(
            value < (1u32 << field_bits(field)),
            "value {value} does not fit key field {field:?}"
        );
        self.values[index] = value as u16;
        self.assigned |= 1 << index;
    }

    pub fn assign_bool(&mut self, field: KeyField, value: bool) {
        self.assign(field, value as u32);
    }

    /// Replace an already-assigned field (fallback-program path).
    pub fn override_value(&mut self, field: KeyField, value: u32) {
        let index = field as usize;
        debug_assert!(self.assigned & (1 << index) != 0);
        self.values[index] = value as u16;
    }

    pub fn get(&self, field: KeyField) -> u32 {
        self.values[field as usize] as u32
    }

    pub fn is_set(&self, field: KeyField) -> bool {
        self.get(field) != 0
    }

    pub fn pack(&self) -> ProgramKey {
        debug_assert_eq!(
            self.assigned.count_ones() as usize,
            KeyField::COUNT,
            "program key packed with unassigned fields"
        );
        let mut packed: u128 = 0;
        let mut shift = 0u32;
        for &(field, bits) in KEY_FIELDS {
            packed |= u128::from(self.values[field as usize]) << shift;
            shift += bits;
        }
        ProgramKey(packed)
    }

    pub fn unpack(key: ProgramKey) -> Self {
        let mut data = Self::new();
        let mut shift = 0u32;
        for &(field, bits) in KEY_FIELDS {
            let mask = (1u128 << bits) - 1;
            data.assign(field, ((key.raw() >> shift) & mask) as u32);
            shift += bits;
        }
        data
    }
}

fn field_bits(field: KeyField) -> u32 {
    KEY_FIELDS
        .iter()
        .find(|(f, _)| *f == field)
        .map(|&(_, bits)| bits)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn zeroed() -> ProgramKeyData {
        let mut data = ProgramKeyData::new();
        for &(field, _) in KEY_FIELDS {
            data.assign(field, 0);
        }
        data
    }

    #[test]
    fn table_covers_every_field_once() {
        let mut seen = std::collections::HashSet::new();
        for &(field, bits) in KEY_FIELDS {
            assert!(bits > 0 && bits <= 4, "{field:?} width {bits}");
            assert!(seen.insert(field as usize), "{field:?} duplicated");
        }
        assert_eq!(seen.len(), KeyField::COUNT);
        let total: u32 = KEY_FIELDS.iter().map(|&(_, bits)| bits).sum();
        assert!(total <= 128, "key overflows u128 ({total} bits)");
        assert!(KeyField::COUNT <= 64, "assigned bitmask overflows");
    }

    #[test]
    fn pack_unpack_round_trips() {
        let mut data = zeroed();
        data.override_value(KeyField::PrimitiveType, 4);
        data.override_value(KeyField::BlendMode, 3);
        data.override_value(KeyField::EmissiveMaskSource, 7);
        data.override_value(KeyField::IsSpecularEnabled, 1);
        data.override_value(KeyField::SpecularMask, 5);

        let key = data.pack();
        let unpacked = ProgramKeyData::unpack(key);
        assert_eq!(unpacked, data);
    }

    #[test]
    fn distinct_fields_produce_distinct_keys() {
        let mut a = zeroed();
        a.override_value(KeyField::IsSpecularEnabled, 1);
        let mut b = zeroed();
        b.override_value(KeyField::IsPixelSpecularEnabled, 1);
        assert_ne!(a.pack(), b.pack());
    }

    #[test]
    fn hex_round_trips() {
        let mut data = zeroed();
        data.override_value(KeyField::PrimitiveType, 5);
        data.override_value(KeyField::GlobalShader, 2);
        let key = data.pack();
        assert_eq!(ProgramKey::from_hex(&key.to_hex()).unwrap(), key);
        assert!(ProgramKey::from_hex("zz").is_err());
        assert!(ProgramKey::from_hex("").is_err());
    }

    #[test]
    fn stable_hash_is_an_xxh3_of_the_raw_key() {
        let key = zeroed().pack();
        assert_eq!(key.stable_hash(), xxh3_64(&key.raw().to_le_bytes()));
        let mut other = zeroed();
        other.override_value(KeyField::IsLightmap, 1);
        assert_ne!(key.stable_hash(), other.pack().stable_hash());
    }
}
