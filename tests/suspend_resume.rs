//! Suspend/resume round trips: GPU objects are released and rebuilt, CPU
//! backing survives, and a recreated EGL surface forces a full recompile.

use std::rc::Rc;

use ember_es2::{
    Es2Rhi, GlobalShaderKind, Lifecycle, PixelFormat, PrimitiveType, SystemSettings, TextureUsage,
};
use ember_gl::{GlCall, TraceGl};
use ember_platform::{HeadlessWindow, SuspendGate, WindowEvent, WindowHooks};

struct Fixture {
    gl: Rc<TraceGl>,
    window: Rc<HeadlessWindow>,
    rhi: Es2Rhi,
}

fn fixture() -> Fixture {
    let gl = Rc::new(TraceGl::new());
    let window = Rc::new(HeadlessWindow::new());
    let mut rhi = Es2Rhi::new(
        Rc::<TraceGl>::clone(&gl),
        Rc::<HeadlessWindow>::clone(&window),
        Rc::new(()),
        SystemSettings::default(),
    );
    rhi.create_viewport(1, 640, 480, false);
    Fixture { gl, window, rhi }
}

#[test]
fn texture_contents_survive_a_suspend_resume_cycle() {
    let mut fx = fixture();
    let pattern: Vec<u8> = (0..(256 * 256 * 4)).map(|i| (i % 251) as u8).collect();
    let texture = fx.rhi.create_texture_2d(
        256,
        256,
        PixelFormat::Rgba8,
        1,
        TextureUsage::empty(),
        Some(&pattern),
    );
    let name_before = fx.rhi.texture(texture).unwrap().driver_name();

    fx.rhi.suspend_rendering();
    assert_eq!(fx.rhi.lifecycle(), Lifecycle::Suspended);
    assert_eq!(fx.rhi.texture(texture).unwrap().driver_name(), 0);

    fx.rhi.resume_rendering();
    assert_eq!(fx.rhi.lifecycle(), Lifecycle::Current);

    // The driver name may differ, but the data must match the upload.
    let name_after = fx.rhi.texture(texture).unwrap().driver_name();
    assert_ne!(name_after, 0);
    assert_ne!(name_after, name_before);
    let read_back = fx.rhi.lock_texture(texture).unwrap().to_vec();
    fx.rhi.unlock_texture(texture);
    assert_eq!(read_back, pattern);
}

#[test]
fn no_gl_is_issued_while_suspended() {
    let mut fx = fixture();
    fx.rhi.suspend_rendering();
    fx.gl.clear_calls();

    fx.rhi.set_color_write_mask(ember_es2::ColorWriteMask::RGB);
    fx.rhi.swap_buffers();
    fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None);
    assert_eq!(fx.gl.total_calls(), 0);
}

#[test]
fn suspend_releases_programs_and_resume_rebuilds_on_demand() {
    let mut fx = fixture();
    assert!(fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None));
    let compiled = fx.rhi.stats().snapshot().programs_compiled;

    fx.rhi.suspend_rendering();
    assert!(fx.gl.count_where(|c| matches!(c, GlCall::DeleteProgram(_))) >= 1);

    fx.rhi.resume_rendering();
    // Same state resolves again: one fresh compile, same key.
    assert!(fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None));
    assert_eq!(fx.rhi.stats().snapshot().programs_compiled, compiled + 1);
}

#[test]
fn surface_recreation_forces_a_full_recompile_even_of_warmed_programs() {
    let mut fx = fixture();
    fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None);

    fx.rhi.suspend_rendering();
    fx.window.recreate_surface();
    fx.rhi.resume_rendering();

    // The recreate signal is consumed by the resume.
    assert!(!fx.window.take_surface_recreated());
    fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None);
    assert_eq!(fx.rhi.stats().snapshot().programs_compiled, 2);
}

#[test]
fn lifecycle_walks_current_notcurrent_and_back() {
    let mut fx = fixture();
    assert_eq!(fx.rhi.lifecycle(), Lifecycle::Current);

    fx.rhi.unmake_current();
    assert_eq!(fx.rhi.lifecycle(), Lifecycle::NotCurrent);

    fx.rhi.acquire_thread_ownership();
    assert_eq!(fx.rhi.lifecycle(), Lifecycle::Current);

    fx.rhi.release_thread_ownership();
    assert_eq!(fx.rhi.lifecycle(), Lifecycle::NotCurrent);
    assert!(fx.window.count(|e| matches!(e, WindowEvent::UnmakeCurrent)) >= 2);
}

#[test]
fn destroying_the_last_viewport_uninitializes_the_renderer() {
    let mut fx = fixture();
    let second = fx.rhi.create_viewport(2, 320, 240, false);
    // Compile something so the final teardown has programs to release.
    fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None);

    fx.rhi.destroy_viewport(second);
    assert_ne!(fx.rhi.lifecycle(), Lifecycle::Uninitialized);

    for id in fx.rhi.viewport_ids() {
        fx.rhi.destroy_viewport(id);
    }
    assert_eq!(fx.rhi.lifecycle(), Lifecycle::Uninitialized);
    assert!(fx.gl.count_where(|c| matches!(c, GlCall::DeleteProgram(_))) >= 1);
}

#[test]
fn render_thread_parks_on_the_suspend_gate() {
    let gate = SuspendGate::new();
    let render_side = std::sync::Arc::clone(&gate);

    let render_thread = std::thread::spawn(move || {
        let mut flushes = 0u32;
        loop {
            if render_side.suspend_requested() {
                flushes += 1;
                render_side.acknowledge();
                render_side.wait_while_suspended();
                break;
            }
            std::thread::yield_now();
        }
        flushes
    });

    gate.request_suspend();
    gate.request_resume();
    assert_eq!(render_thread.join().unwrap(), 1);
}
