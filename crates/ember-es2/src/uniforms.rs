//! Versioned shader parameters.
//!
//! Engine setters write into one process-wide [`ParameterStore`] slot and
//! bump its version; nothing reaches the driver until draw time, when the
//! bound program uploads only the slots whose version moved since that
//! program last saw them (and skips even those when the value is unchanged).
//! Per-draw uniform cost is therefore proportional to what actually changed,
//! not to the size of the uniform set.

use tracing::debug;

/// Uniform slots, one per engine-visible parameter.
///
/// Discriminants index [`ParameterStore`]; `SLOT_INFO` carries the GLSL name
/// and float capacity for each slot in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum UniformSlot {
    LocalToWorld,
    LocalToWorldRotation,
    ViewProjection,
    LocalToProjection,
    Transform,
    CameraWorldPosition,
    CameraRight,
    CameraUp,
    AlphaTestRef,
    TextureTransform,
    FogOneOverSquaredRange,
    FogStartSquared,
    FogColor,
    UniformMultiplyColor,
    FadeColorAndAmount,
    BoneMatrices,
    LightPositionAndInvRadius,
    LightDirection,
    LightColor,
    UpperSkyColor,
    LowerSkyColor,
    SpecularColor,
    LightColorTimesSpecularColor,
    SpecularPower,
    EnvironmentColorScale,
    EnvironmentParameters,
    RimLightingColorAndExponent,
    VertexMovementConstants,
    VertexSwayMatrix,
    PreMultipliedBumpReferencePlane,
    BumpHeightRatio,
    ConstantEmissiveColor,
    FogDistanceScale,
    FogStartDistance,
    FogExtinctionDistance,
    FogMinHeight,
    FogMaxHeight,
    FogInScattering,
    InverseGamma,
    ColorGradingBlend,
    ColorGradingDesaturation,
    ColorGradingHighlightsMinusShadows,
    ColorGradingMidTones,
    ColorGradingShadows,
    OpacityMultiplier,
    ScreenToShadowMatrix,
    ShadowModulateColor,
    ShadowCasterWorldPosition,
    ProjectionMatrix,
    InvMaxSubjectDepth,
    DepthBias,
    LandscapeLightmapScaleBias,
    LandscapeLayerUvScaleBias,
    LandscapeLodValues,
    LandscapeMonochromeLayerColors,
}

pub struct UniformSlotInfo {
    /// Uniform name in the GLSL source.
    pub name: &'static str,
    /// Capacity in floats. `BoneMatrices` is per-bone; the store scales it
    /// by the configured bone count.
    pub size_floats: u32,
}

pub const SLOT_INFO: &[UniformSlotInfo] = &[
    UniformSlotInfo { name: "LocalToWorld", size_floats: 16 },
    UniformSlotInfo { name: "LocalToWorldRotation", size_floats: 9 },
    UniformSlotInfo { name: "ViewProjection", size_floats: 16 },
    UniformSlotInfo { name: "LocalToProjection", size_floats: 16 },
    UniformSlotInfo { name: "Transform", size_floats: 16 },
    UniformSlotInfo { name: "CameraWorldPosition", size_floats: 4 },
    UniformSlotInfo { name: "CameraRight", size_floats: 4 },
    UniformSlotInfo { name: "CameraUp", size_floats: 4 },
    UniformSlotInfo { name: "AlphaTestRef", size_floats: 1 },
    UniformSlotInfo { name: "TextureTransform", size_floats: 9 },
    UniformSlotInfo { name: "FogOneOverSquaredRange", size_floats: 1 },
    UniformSlotInfo { name: "FogStartSquared", size_floats: 1 },
    UniformSlotInfo { name: "FogColor", size_floats: 4 },
    UniformSlotInfo { name: "UniformMultiplyColor", size_floats: 4 },
    UniformSlotInfo { name: "FadeColorAndAmount", size_floats: 4 },
    UniformSlotInfo { name: "BoneMatrices", size_floats: 12 },
    UniformSlotInfo { name: "LightPositionAndInvRadius", size_floats: 4 },
    UniformSlotInfo { name: "LightDirectionAndbDirectional", size_floats: 4 },
    UniformSlotInfo { name: "DirectionalLightColor", size_floats: 4 },
    UniformSlotInfo { name: "UpperSkyColor", size_floats: 4 },
    UniformSlotInfo { name: "LowerSkyColor", size_floats: 4 },
    UniformSlotInfo { name: "SpecularColor", size_floats: 3 },
    UniformSlotInfo { name: "LightColorTimesSpecularColor", size_floats: 3 },
    UniformSlotInfo { name: "SpecularPower", size_floats: 1 },
    UniformSlotInfo { name: "EnvironmentColorScale", size_floats: 3 },
    UniformSlotInfo { name: "EnvironmentParameters", size_floats: 3 },
    UniformSlotInfo { name: "RimLightingColorAndExponent", size_floats: 4 },
    UniformSlotInfo { name: "VertexMovementConstants", size_floats: 3 },
    UniformSlotInfo { name: "VertexSwayMatrix", size_floats: 16 },
    UniformSlotInfo { name: "PreMultipliedBumpReferencePlane", size_floats: 1 },
    UniformSlotInfo { name: "BumpHeightRatio", size_floats: 1 },
    UniformSlotInfo { name: "ConstantEmissiveColor", size_floats: 4 },
    UniformSlotInfo { name: "FogDistanceScale", size_floats: 4 },
    UniformSlotInfo { name: "FogStartDistance", size_floats: 4 },
    UniformSlotInfo { name: "FogExtinctionDistance", size_floats: 4 },
    UniformSlotInfo { name: "FogMinHeight", size_floats: 4 },
    UniformSlotInfo { name: "FogMaxHeight", size_floats: 4 },
    UniformSlotInfo { name: "FogInScattering", size_floats: 16 },
    UniformSlotInfo { name: "InverseGamma", size_floats: 1 },
    UniformSlotInfo { name: "MobileColorGradingBlend", size_floats: 1 },
    UniformSlotInfo { name: "MobileColorGradingDesaturation", size_floats: 1 },
    UniformSlotInfo { name: "MobileColorGradingHighlightsMinusShadows", size_floats: 4 },
    UniformSlotInfo { name: "MobileColorGradingMidTones", size_floats: 4 },
    UniformSlotInfo { name: "MobileColorGradingShadows", size_floats: 4 },
    UniformSlotInfo { name: "MobileOpacityMultiplier", size_floats: 1 },
    UniformSlotInfo { name: "ScreenToShadowMatrix", size_floats: 16 },
    UniformSlotInfo { name: "ShadowModulateColor", size_floats: 4 },
    UniformSlotInfo { name: "ShadowCasterWorldPosition", size_floats: 3 },
    UniformSlotInfo { name: "ProjectionMatrix", size_floats: 16 },
    UniformSlotInfo { name: "InvMaxSubjectDepth", size_floats: 1 },
    UniformSlotInfo { name: "DepthBias", size_floats: 1 },
    UniformSlotInfo { name: "LightmapScaleBias", size_floats: 4 },
    UniformSlotInfo { name: "LayerUVScaleBias", size_floats: 4 },
    UniformSlotInfo { name: "LodValues", size_floats: 4 },
    UniformSlotInfo { name: "LandscapeMonochromeLayerColors", size_floats: 12 },
];

pub const SLOT_COUNT: usize = SLOT_INFO.len();

/// Every slot, index-aligned with [`SLOT_INFO`]. Lets callers iterate the
/// enum without a `transmute`.
pub const ALL_SLOTS: [UniformSlot; SLOT_COUNT] = {
    use UniformSlot as S;
    [
        S::LocalToWorld,
        S::LocalToWorldRotation,
        S::ViewProjection,
        S::LocalToProjection,
        S::Transform,
        S::CameraWorldPosition,
        S::CameraRight,
        S::CameraUp,
        S::AlphaTestRef,
        S::TextureTransform,
        S::FogOneOverSquaredRange,
        S::FogStartSquared,
        S::FogColor,
        S::UniformMultiplyColor,
        S::FadeColorAndAmount,
        S::BoneMatrices,
        S::LightPositionAndInvRadius,
        S::LightDirection,
        S::LightColor,
        S::UpperSkyColor,
        S::LowerSkyColor,
        S::SpecularColor,
        S::LightColorTimesSpecularColor,
        S::SpecularPower,
        S::EnvironmentColorScale,
        S::EnvironmentParameters,
        S::RimLightingColorAndExponent,
        S::VertexMovementConstants,
        S::VertexSwayMatrix,
        S::PreMultipliedBumpReferencePlane,
        S::BumpHeightRatio,
        S::ConstantEmissiveColor,
        S::FogDistanceScale,
        S::FogStartDistance,
        S::FogExtinctionDistance,
        S::FogMinHeight,
        S::FogMaxHeight,
        S::FogInScattering,
        S::InverseGamma,
        S::ColorGradingBlend,
        S::ColorGradingDesaturation,
        S::ColorGradingHighlightsMinusShadows,
        S::ColorGradingMidTones,
        S::ColorGradingShadows,
        S::OpacityMultiplier,
        S::ScreenToShadowMatrix,
        S::ShadowModulateColor,
        S::ShadowCasterWorldPosition,
        S::ProjectionMatrix,
        S::InvMaxSubjectDepth,
        S::DepthBias,
        S::LandscapeLightmapScaleBias,
        S::LandscapeLayerUvScaleBias,
        S::LandscapeLodValues,
        S::LandscapeMonochromeLayerColors,
    ]
};

/// The value shape last written to a slot; selects the `glUniform*` call.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformData {
    Int(i32),
    /// `components` is 1..=4; `values.len()` is a multiple of it.
    Floats { components: u8, values: Vec<f32> },
    Matrix3(Vec<f32>),
    Matrix4(Vec<f32>),
}

impl UniformData {
    pub fn byte_len(&self) -> usize {
        match self {
            UniformData::Int(_) => 4,
            UniformData::Floats { values, .. }
            | UniformData::Matrix3(values)
            | UniformData::Matrix4(values) => values.len() * 4,
        }
    }
}

/// One engine-side parameter slot: last value plus a monotonic version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionedParameter {
    pub version: u32,
    pub data: Option<UniformData>,
}

/// All versioned parameters, indexed by [`UniformSlot`].
#[derive(Debug)]
pub struct ParameterStore {
    params: Vec<VersionedParameter>,
    bone_count: u32,
}

impl ParameterStore {
    pub fn new(bone_count: u32) -> Self {
        Self {
            params: vec![VersionedParameter::default(); SLOT_COUNT],
            bone_count,
        }
    }

    pub fn get(&self, slot: UniformSlot) -> &VersionedParameter {
        &self.params[slot as usize]
    }

    /// Float capacity of a slot, scaled for the configured bone count.
    pub fn capacity_floats(&self, slot: UniformSlot) -> u32 {
        let base = SLOT_INFO[slot as usize].size_floats;
        if slot == UniformSlot::BoneMatrices {
            base * self.bone_count
        } else {
            base
        }
    }

    pub fn set_i32(&mut self, slot: UniformSlot, value: i32) {
        self.write(slot, UniformData::Int(value));
    }

    pub fn set_f32(&mut self, slot: UniformSlot, value: f32) {
        self.set_floats(slot, 1, &[value]);
    }

    /// Store a float vector/array. `components` selects `glUniform{N}fv`.
    pub fn set_floats(&mut self, slot: UniformSlot, components: u8, values: &[f32]) {
        debug_assert!((1..=4).contains(&components));
        debug_assert_eq!(values.len() % components as usize, 0);
        debug_assert!(
            values.len() as u32 <= self.capacity_floats(slot),
            "uniform {} overflows slot capacity",
            SLOT_INFO[slot as usize].name
        );
        self.write(slot, UniformData::Floats { components, values: values.to_vec() });
    }

    pub fn set_matrix3(&mut self, slot: UniformSlot, values: &[f32; 9]) {
        self.write(slot, UniformData::Matrix3(values.to_vec()));
    }

    pub fn set_matrix4(&mut self, slot: UniformSlot, values: &[f32; 16]) {
        self.write(slot, UniformData::Matrix4(values.to_vec()));
    }

    fn write(&mut self, slot: UniformSlot, data: UniformData) {
        let param = &mut self.params[slot as usize];
        param.version = param.version.wrapping_add(1);
        param.data = Some(data);
    }

    /// Drop values but keep versions monotonic, so rebuilt programs (fresh
    /// bindings at version 0) still pick up whatever the engine sets next.
    pub fn clear_values(&mut self) {
        debug!("parameter store cleared");
        for param in &mut self.params {
            param.data = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_info_matches_slot_count() {
        // The enum indexes the table; a mismatch corrupts every lookup.
        assert_eq!(SLOT_INFO.len(), SLOT_COUNT);
        assert_eq!(UniformSlot::LandscapeMonochromeLayerColors as usize, SLOT_COUNT - 1);
        for (index, slot) in ALL_SLOTS.iter().enumerate() {
            assert_eq!(*slot as usize, index);
        }
    }

    #[test]
    fn versions_bump_on_every_set_even_with_equal_values() {
        let mut store = ParameterStore::new(75);
        store.set_floats(UniformSlot::FogColor, 4, &[1.0, 0.0, 0.0, 1.0]);
        let v1 = store.get(UniformSlot::FogColor).version;
        store.set_floats(UniformSlot::FogColor, 4, &[1.0, 0.0, 0.0, 1.0]);
        let v2 = store.get(UniformSlot::FogColor).version;
        assert_eq!(v2, v1 + 1);
    }

    #[test]
    fn bone_capacity_scales_with_bone_count() {
        let store = ParameterStore::new(75);
        assert_eq!(store.capacity_floats(UniformSlot::BoneMatrices), 12 * 75);
        assert_eq!(store.capacity_floats(UniformSlot::FogColor), 4);
    }

    #[test]
    fn clear_values_preserves_versions() {
        let mut store = ParameterStore::new(1);
        store.set_f32(UniformSlot::AlphaTestRef, 0.5);
        let version = store.get(UniformSlot::AlphaTestRef).version;
        store.clear_values();
        assert_eq!(store.get(UniformSlot::AlphaTestRef).version, version);
        assert!(store.get(UniformSlot::AlphaTestRef).data.is_none());
    }
}
