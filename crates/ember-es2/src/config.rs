//! Process-wide feature switches.
//!
//! A [`SystemSettings`] value is fixed at init from a [`FeatureLevel`]
//! preset (selected at startup from device metrics) plus host overrides.
//! The shader manager consults these allows when assembling program keys,
//! so turning one off collapses that slice of the permutation space.

/// Capability tiers selected from device metrics at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureLevel {
    /// Low-end devices: fog only, no per-pixel features.
    Performance1,
    /// Mid/high devices: the full mobile feature set.
    Performance2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemSettings {
    pub allow_fog: bool,
    pub allow_height_fog: bool,
    /// Collapse the distance-based fog state machine into a single key bit.
    pub minimize_fog_shaders: bool,
    pub allow_normal_mapping: bool,
    pub allow_environment_mapping: bool,
    pub allow_rim_lighting: bool,
    pub allow_specular: bool,
    pub allow_vertex_movement: bool,
    pub allow_bump_offset: bool,
    pub allow_color_grading: bool,
    /// Post-processing owns color grading when enabled; the forward pass
    /// then leaves grading to the global shaders.
    pub allow_post_process: bool,
    pub mobile_bone_count: u32,
    pub max_anisotropy: i32,
    /// Deployment forbids on-demand compiles; missing keys are recorded
    /// instead of compiled at draw time.
    pub use_preprocessed_shaders: bool,
    pub vertex_scratch_bytes: usize,
    pub index_scratch_bytes: usize,
}

impl SystemSettings {
    pub fn for_level(level: FeatureLevel) -> Self {
        let base = Self::default();
        match level {
            FeatureLevel::Performance1 => Self {
                allow_normal_mapping: false,
                allow_environment_mapping: false,
                allow_rim_lighting: false,
                allow_specular: false,
                allow_bump_offset: false,
                allow_color_grading: false,
                allow_height_fog: false,
                minimize_fog_shaders: true,
                ..base
            },
            FeatureLevel::Performance2 => base,
        }
    }
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            allow_fog: true,
            allow_height_fog: false,
            minimize_fog_shaders: false,
            allow_normal_mapping: true,
            allow_environment_mapping: true,
            allow_rim_lighting: true,
            allow_specular: true,
            allow_vertex_movement: true,
            allow_bump_offset: true,
            allow_color_grading: true,
            allow_post_process: false,
            mobile_bone_count: 75,
            max_anisotropy: 1,
            use_preprocessed_shaders: false,
            vertex_scratch_bytes: 512 * 1024,
            index_scratch_bytes: 128 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn performance1_disables_per_pixel_features() {
        let settings = SystemSettings::for_level(FeatureLevel::Performance1);
        assert!(!settings.allow_normal_mapping);
        assert!(!settings.allow_specular);
        assert!(settings.allow_fog);
        assert!(settings.minimize_fog_shaders);
    }
}
