//! Error kinds the RHI recognises.
//!
//! Recovery is always local: no error here propagates into the engine's
//! command stream. Façade methods absorb these, bump the matching
//! [`RhiStats`](crate::stats::RhiStats) counter and log; internal layers use
//! `Result` so the recovery site is explicit.

use ember_gl::GlDriverError;
use thiserror::Error;

use crate::key::ProgramKey;

#[derive(Debug, Error)]
pub enum RhiError {
    #[error(transparent)]
    Driver(#[from] GlDriverError),

    #[error("shader compile/link failed for program {key}: {log}")]
    ShaderCompile { key: ProgramKey, log: String },

    #[error("framebuffer incomplete (status {status:#06x})")]
    FramebufferIncomplete { status: u32 },

    #[error("vertex declaration cannot be satisfied from the pending streams")]
    InvalidMesh,

    #[error("scratch arena overflow: requested {requested} bytes, capacity {capacity}")]
    ScratchOverflow { requested: usize, capacity: usize },

    #[error("operation requires a current context (lifecycle state {state:?})")]
    NotCurrent { state: crate::core::Lifecycle },
}
