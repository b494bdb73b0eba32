//! End-to-end redundant-state-elimination checks against the full RHI,
//! driven through a recording GL context.

use std::rc::Rc;

use ember_es2::{
    BlendFactor, BlendStateDesc, ColorWriteMask, CullMode, DepthStateDesc, DiscardBuffers, Es2Rhi,
    FillMode, PixelFormat, RasterizerStateDesc, SystemSettings, TextureUsage,
};
use ember_gl::{CallKind, GlCall, TraceGl, TraceGlConfig};
use ember_platform::HeadlessWindow;

struct Fixture {
    gl: Rc<TraceGl>,
    window: Rc<HeadlessWindow>,
    rhi: Es2Rhi,
}

fn fixture() -> Fixture {
    fixture_with_config(TraceGlConfig::default())
}

fn fixture_with_config(config: TraceGlConfig) -> Fixture {
    let gl = Rc::new(TraceGl::with_config(config));
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

fn solid(cull: CullMode) -> RasterizerStateDesc {
    RasterizerStateDesc { fill_mode: FillMode::Solid, cull_mode: cull }
}

#[test]
fn redundant_rasterizer_sets_issue_two_cull_transitions() {
    let mut fx = fixture();
    fx.gl.clear_calls();

    fx.rhi.set_rasterizer_state(solid(CullMode::Cw));
    fx.rhi.set_rasterizer_state(solid(CullMode::Cw));
    fx.rhi.set_rasterizer_state(solid(CullMode::None));

    // First set enables culling and picks a winding; the duplicate is
    // swallowed; the third disables. Two transitions, no more.
    let transitions = fx.gl.count_where(|c| {
        matches!(
            c,
            GlCall::Enable(cap) | GlCall::Disable(cap) if *cap == ember_gl::consts::CULL_FACE
        )
    });
    assert_eq!(transitions, 2);
}

#[test]
fn every_state_group_swallows_duplicates() {
    let mut fx = fixture();
    fx.rhi.set_depth_state(DepthStateDesc::default());
    fx.rhi.set_blend_state(BlendStateDesc {
        color_source_factor: BlendFactor::SrcAlpha,
        color_dest_factor: BlendFactor::InvSrcAlpha,
        ..BlendStateDesc::default()
    });
    fx.rhi.set_color_write_mask(ColorWriteMask::RGBA);
    fx.gl.clear_calls();

    fx.rhi.set_depth_state(DepthStateDesc::default());
    fx.rhi.set_blend_state(BlendStateDesc {
        color_source_factor: BlendFactor::SrcAlpha,
        color_dest_factor: BlendFactor::InvSrcAlpha,
        ..BlendStateDesc::default()
    });
    fx.rhi.set_color_write_mask(ColorWriteMask::RGBA);

    assert_eq!(fx.gl.count(CallKind::DepthState), 0);
    assert_eq!(fx.gl.count(CallKind::BlendState), 0);
    assert_eq!(fx.gl.count(CallKind::ColorMask), 0);
}

#[test]
fn changed_state_issues_calls_derived_from_the_new_value() {
    let mut fx = fixture();
    fx.rhi.set_color_write_mask(ColorWriteMask::RGBA);
    fx.gl.clear_calls();

    fx.rhi.set_color_write_mask(ColorWriteMask::RGB);
    assert_eq!(fx.gl.calls(), vec![GlCall::ColorMask(true, true, true, false)]);
}

#[test]
fn depth_state_is_a_no_op_against_a_color_only_target() {
    let mut fx = fixture();
    let texture = fx.rhi.create_texture_2d(
        64,
        64,
        PixelFormat::Rgba8,
        1,
        TextureUsage::RENDER_TARGET,
        None,
    );
    let color = fx.rhi.create_targetable_surface(texture).unwrap();
    fx.rhi.set_render_target(Some(color), None);
    fx.gl.clear_calls();

    fx.rhi.set_depth_state(DepthStateDesc::default());
    assert_eq!(fx.gl.count(CallKind::DepthState), 0);
}

#[test]
fn discard_is_opt_in_per_device() {
    // A device whose probe found no discard extension must issue zero
    // driver calls for the hint.
    let mut fx = fixture_with_config(TraceGlConfig {
        extensions: "GL_EXT_texture_compression_s3tc".to_owned(),
        ..TraceGlConfig::default()
    });
    assert!(!fx.rhi.device_capabilities().unwrap().supports_discard);
    fx.gl.clear_calls();

    fx.rhi.discard_render_buffers(DiscardBuffers::COLOR | DiscardBuffers::DEPTH);
    assert_eq!(fx.gl.total_calls(), 0);
}

#[test]
fn tiled_renderers_discard_depth_before_present() {
    let mut fx = fixture();
    assert!(fx.rhi.device_capabilities().unwrap().tiled_renderer);
    fx.gl.clear_calls();

    fx.rhi.swap_buffers();
    assert_eq!(
        fx.gl.count_where(|c| matches!(c, GlCall::DiscardFramebuffer { .. })),
        1
    );
    assert_eq!(
        fx.window.count(|e| matches!(e, ember_platform::WindowEvent::SwapBuffers)),
        1
    );
    assert_eq!(fx.rhi.stats().snapshot().presents, 1);
}

#[test]
fn zero_sized_viewport_creates_no_depth_attachment_but_succeeds() {
    let gl = Rc::new(TraceGl::new());
    let window = Rc::new(HeadlessWindow::new());
    let mut rhi = Es2Rhi::new(
        Rc::<TraceGl>::clone(&gl),
        Rc::<HeadlessWindow>::clone(&window),
        Rc::new(()),
        SystemSettings::default(),
    );
    let id = rhi.create_viewport(1, 0, 0, false);
    assert!(rhi.get_viewport_back_buffer(id).is_some());
    assert!(rhi.get_viewport_depth_buffer(id).is_none());
}
