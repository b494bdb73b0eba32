//! `ember-es2` is an OpenGL ES 2.0 rendering abstraction for mobile GPUs.
//!
//! It turns a high-level "set material / set mesh / draw primitive" protocol
//! into the minimal correct sequence of GL state changes:
//! - a [`key::ProgramKey`] encodes every material/mesh/pipeline toggle and
//!   selects a compiled program from the [`program::ProgramCache`] (warmable
//!   from an offline key index);
//! - a [`state::StateShadow`] mirrors every GL state the engine sets and
//!   suppresses redundant driver calls;
//! - the [`render_manager::RenderManager`] resolves vertex declarations
//!   against pending streams lazily at draw time;
//! - [`core::Es2Rhi`] owns the lifecycle: viewports, context/thread
//!   handoff, and the suspend/resume resource rebuild that survives Android
//!   context loss.
//!
//! Driver access goes through the [`ember_gl::GlEs2`] seam, so the whole
//! crate runs deterministically against `ember_gl::TraceGl` in tests and
//! against a glow context in production. Vendor quirks are capability bits
//! probed once ([`caps::DeviceCapabilities`]); nothing branches on vendor
//! strings at a call site.

pub mod caps;
pub mod config;
pub mod core;
pub mod error;
pub mod format;
pub mod framebuffer;
pub mod key;
pub mod material;
pub mod program;
pub mod query;
pub mod render_manager;
pub mod resources;
pub mod shader_manager;
pub mod state;
pub mod stats;
pub mod uniforms;
pub mod vertex;

pub use crate::caps::{DeviceCapabilities, TextureCompression};
pub use crate::config::{FeatureLevel, SystemSettings};
pub use crate::core::{DiscardBuffers, Es2Rhi, Lifecycle, ViewportId};
pub use crate::error::RhiError;
pub use crate::format::{PixelFormat, PixelFormatInfo, PixelFormatTable};
pub use crate::key::{KeyField, ProgramKey, ProgramKeyData};
pub use crate::material::{
    AlphaValueSource, AmbientOcclusionSource, BaseFeatures, BlendMode, ColorGradingParams,
    ColorMultiplySource, DepthShaderKind, EmissiveColorSource, EnvironmentBlendMode,
    GlobalShaderKind, HeightFogParams, MaterialPixelParams, MaterialVertexParams, MeshPixelParams,
    MeshVertexParams, ParticleScreenAlignment, PrimitiveType, SpecularMaskMode,
    TexCoordSource, TextureBlendFactorSource, ValueSource,
};
pub use crate::query::OcclusionQueryHandle;
pub use crate::render_manager::Topology;
pub use crate::resources::{
    IndexBufferHandle, SurfaceHandle, SurfaceKind, TextureHandle, TextureUsage, VertexBufferHandle,
};
pub use crate::state::{
    BlendFactor, BlendOp, BlendStateDesc, ColorWriteMask, CompareFunc, CullMode, DepthStateDesc,
    FillMode, RasterizerStateDesc, SamplerAddress, SamplerFilter, SamplerStateDesc,
};
pub use crate::stats::{RhiStats, RhiStatsSnapshot};
pub use crate::uniforms::UniformSlot;
pub use crate::vertex::{
    DeclKind, VertexDeclaration, VertexElement, VertexElementType, VertexUsage,
};
