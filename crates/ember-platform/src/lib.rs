//! `ember-platform` defines the contract between the RHI and its host
//! platform (an Android activity in production, a test harness elsewhere).
//!
//! The platform glue itself (JNI marshalling, EGL configuration, the asset
//! manager) lives in the host application. The RHI only needs:
//! - [`WindowHooks`]: create/destroy the native drawing surface, move the GL
//!   context on and off the calling thread, present, and report when the OS
//!   recreated the EGL surface behind our back.
//! - [`HostThreadHooks`]: attach/detach a render thread to the host runtime
//!   before it may touch the context (the JNI thread-attach analog).
//! - [`SuspendGate`]: the flag pair a platform thread uses to force the
//!   render thread to flush and park during app suspension.
//! - [`AssetPack`] / [`UserStorage`]: the packaged read-only asset container
//!   and the writable user area.

mod assets;
mod suspend;
mod window;

pub use assets::{AssetLocation, AssetPack, PackError, UserStorage};
pub use suspend::SuspendGate;
pub use window::{HeadlessWindow, HostThreadHooks, ViewportSurfaces, WindowEvent, WindowHooks};
