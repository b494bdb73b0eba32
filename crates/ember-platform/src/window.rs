//! Window and thread hooks supplied by the host.

use std::cell::{Cell, RefCell};

/// Driver names of the default surfaces backing a viewport.
///
/// `back_buffer` is `0` when the platform presents the default framebuffer
/// directly (Android); it is a renderbuffer name on platforms that hand out
/// an explicit back buffer. `depth_buffer` is `None` when the default context
/// has no depth attachment and the RHI must allocate one itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSurfaces {
    pub back_buffer: u32,
    pub depth_buffer: Option<u32>,
}

/// Surface lifecycle and context-ownership callbacks the host must provide.
///
/// Calls arrive on whichever thread currently holds logical ownership of the
/// context; implementations must not assume a fixed thread.
pub trait WindowHooks {
    /// Create the native drawing surface for a viewport and return the
    /// driver names of its default buffers.
    fn initialize_viewport(&self, native_handle: usize, width: u32, height: u32) -> ViewportSurfaces;

    fn destroy_viewport(&self, native_handle: usize);

    /// Bind the GL context to the calling thread. Returns `false` when the
    /// platform could not make the context current (e.g. surface lost).
    fn make_current(&self) -> bool;

    /// Release the GL context from the calling thread.
    fn unmake_current(&self) -> bool;

    /// Present the default surface.
    fn swap_buffers(&self) -> bool;

    /// True once if the OS destroyed and recreated the EGL surface since the
    /// last poll. The RHI reacts by forcing a full shader recompile on
    /// resume. The flag clears on read.
    fn take_surface_recreated(&self) -> bool;
}

/// Host-runtime registration for threads that will own the GL context.
///
/// On Android a native thread must be attached to the JVM before EGL calls
/// can be marshalled through the activity; both methods must be idempotent.
pub trait HostThreadHooks {
    fn register_render_thread(&self);
    fn unregister_render_thread(&self);
}

/// No-op registration for hosts without a managed runtime.
impl HostThreadHooks for () {
    fn register_render_thread(&self) {}
    fn unregister_render_thread(&self) {}
}

/// Calls observed by [`HeadlessWindow`], in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    InitializeViewport { native_handle: usize, width: u32, height: u32 },
    DestroyViewport { native_handle: usize },
    MakeCurrent,
    UnmakeCurrent,
    SwapBuffers,
}

/// Deterministic in-memory [`WindowHooks`] used by the test suite.
///
/// Records the call sequence and lets a test script the surface-recreated
/// signal and the default-buffer names handed to the RHI.
#[derive(Debug)]
pub struct HeadlessWindow {
    surfaces: Cell<ViewportSurfaces>,
    surface_recreated: Cell<bool>,
    events: RefCell<Vec<WindowEvent>>,
}

impl HeadlessWindow {
    /// An Android-like window: back buffer 0, no default depth buffer.
    pub fn new() -> Self {
        Self::with_surfaces(ViewportSurfaces { back_buffer: 0, depth_buffer: None })
    }

    pub fn with_surfaces(surfaces: ViewportSurfaces) -> Self {
        Self {
            surfaces: Cell::new(surfaces),
            surface_recreated: Cell::new(false),
            events: RefCell::new(Vec::new()),
        }
    }

    /// Simulate the OS recreating the EGL surface while suspended.
    pub fn recreate_surface(&self) {
        self.surface_recreated.set(true);
    }

    pub fn events(&self) -> Vec<WindowEvent> {
        self.events.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&WindowEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| pred(e)).count()
    }

    fn record(&self, event: WindowEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Default for HeadlessWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowHooks for HeadlessWindow {
    fn initialize_viewport(&self, native_handle: usize, width: u32, height: u32) -> ViewportSurfaces {
        self.record(WindowEvent::InitializeViewport { native_handle, width, height });
        self.surfaces.get()
    }

    fn destroy_viewport(&self, native_handle: usize) {
        self.record(WindowEvent::DestroyViewport { native_handle });
    }

    fn make_current(&self) -> bool {
        self.record(WindowEvent::MakeCurrent);
        true
    }

    fn unmake_current(&self) -> bool {
        self.record(WindowEvent::UnmakeCurrent);
        true
    }

    fn swap_buffers(&self) -> bool {
        self.record(WindowEvent::SwapBuffers);
        true
    }

    fn take_surface_recreated(&self) -> bool {
        self.surface_recreated.replace(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_recreated_clears_on_read() {
        let window = HeadlessWindow::new();
        assert!(!window.take_surface_recreated());
        window.recreate_surface();
        assert!(window.take_surface_recreated());
        assert!(!window.take_surface_recreated());
    }

    #[test]
    fn events_record_in_order() {
        let window = HeadlessWindow::new();
        window.initialize_viewport(7, 640, 480);
        window.make_current();
        window.swap_buffers();
        window.unmake_current();
        assert_eq!(
            window.events(),
            vec![
                WindowEvent::InitializeViewport { native_handle: 7, width: 640, height: 480 },
                WindowEvent::MakeCurrent,
                WindowEvent::SwapBuffers,
                WindowEvent::UnmakeCurrent,
            ]
        );
    }
}
