//! Vertex declarations and the semantic-to-attribute-slot mapping.
//!
//! The engine describes vertex layouts as ordered `(stream, offset, type,
//! usage, usage_index)` elements. [`bind_location`] maps each semantic to a
//! fixed engine attribute slot; compiled programs then remap engine slots to
//! whatever GLSL locations the driver assigned (see
//! [`crate::program::ProgramInstance`]).

use ember_gl::consts;

/// Engine attribute slots available to a declaration.
pub const MAX_ENGINE_ATTRIBS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexUsage {
    Position,
    Normal,
    Tangent,
    Color,
    BlendWeight,
    BlendIndices,
    TexCoord,
}

/// Fixed semantic → engine-slot layout.
///
/// | usage        | index | slot |
/// |--------------|-------|------|
/// | Position     | 0     | 0    |
/// | Normal       | 0     | 1    |
/// | Tangent      | 0     | 2    |
/// | Color        | 0..1  | 3..4 |
/// | BlendWeight  | 0     | 5    |
/// | BlendIndices | 0     | 6    |
/// | TexCoord     | 0..3  | 7..10|
pub fn bind_location(usage: VertexUsage, usage_index: u8) -> u32 {
    let base = match usage {
        VertexUsage::Position => 0,
        VertexUsage::Normal => 1,
        VertexUsage::Tangent => 2,
        VertexUsage::Color => 3,
        VertexUsage::BlendWeight => 5,
        VertexUsage::BlendIndices => 6,
        VertexUsage::TexCoord => 7,
    };
    base + u32::from(usage_index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexElementType {
    Float1,
    Float2,
    Float3,
    Float4,
    UByte4,
    UByte4Norm,
    Short2,
    Short2Norm,
    Half2,
}

impl VertexElementType {
    pub fn component_count(self) -> i32 {
        match self {
            VertexElementType::Float1 => 1,
            VertexElementType::Float2 | VertexElementType::Short2 | VertexElementType::Short2Norm
            | VertexElementType::Half2 => 2,
            VertexElementType::Float3 => 3,
            VertexElementType::Float4 | VertexElementType::UByte4 | VertexElementType::UByte4Norm => 4,
        }
    }

    pub fn gl_type(self) -> u32 {
        match self {
            VertexElementType::Float1
            | VertexElementType::Float2
            | VertexElementType::Float3
            | VertexElementType::Float4 => consts::FLOAT,
            VertexElementType::UByte4 | VertexElementType::UByte4Norm => consts::UNSIGNED_BYTE,
            VertexElementType::Short2 | VertexElementType::Short2Norm => consts::SHORT,
            VertexElementType::Half2 => consts::HALF_FLOAT_OES,
        }
    }

    pub fn normalized(self) -> bool {
        matches!(self, VertexElementType::UByte4Norm | VertexElementType::Short2Norm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    pub stream_index: u8,
    pub offset: u16,
    pub element_type: VertexElementType,
    pub usage: VertexUsage,
    pub usage_index: u8,
}

/// What kind of content a declaration was authored for; the render manager
/// keys the shader program family off this at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeclKind {
    #[default]
    Default,
    SpriteParticle,
    SubUvParticle,
    BeamTrailParticle,
    LensFlare,
    Simple,
    Landscape,
    Decal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexDeclaration {
    pub kind: DeclKind,
    pub elements: Vec<VertexElement>,
}

impl VertexDeclaration {
    pub fn new(kind: DeclKind, elements: Vec<VertexElement>) -> Self {
        debug_assert!(elements
            .iter()
            .all(|e| (bind_location(e.usage, e.usage_index) as usize) < MAX_ENGINE_ATTRIBS));
        Self { kind, elements }
    }

    pub fn uses(&self, usage: VertexUsage) -> bool {
        self.elements.iter().any(|e| e.usage == usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_locations_do_not_collide() {
        let mut seen = std::collections::HashSet::new();
        let all = [
            (VertexUsage::Position, 0u8),
            (VertexUsage::Normal, 0),
            (VertexUsage::Tangent, 0),
            (VertexUsage::Color, 0),
            (VertexUsage::Color, 1),
            (VertexUsage::BlendWeight, 0),
            (VertexUsage::BlendIndices, 0),
            (VertexUsage::TexCoord, 0),
            (VertexUsage::TexCoord, 1),
            (VertexUsage::TexCoord, 2),
            (VertexUsage::TexCoord, 3),
        ];
        for (usage, index) in all {
            let slot = bind_location(usage, index);
            assert!((slot as usize) < MAX_ENGINE_ATTRIBS);
            assert!(seen.insert(slot), "slot {slot} assigned twice");
        }
    }

    #[test]
    fn element_type_translation() {
        assert_eq!(VertexElementType::Float3.component_count(), 3);
        assert_eq!(VertexElementType::Float3.gl_type(), consts::FLOAT);
        assert!(!VertexElementType::Float3.normalized());
        assert!(VertexElementType::UByte4Norm.normalized());
        assert_eq!(VertexElementType::Half2.gl_type(), consts::HALF_FLOAT_OES);
    }
}
