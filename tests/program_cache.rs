//! Program key determinism, cache warming, framebuffer reuse and the
//! versioned uniform upload contract, exercised through the public API.

use std::rc::Rc;

use ember_es2::{
    BaseFeatures, Es2Rhi, GlobalShaderKind, MaterialVertexParams, MeshVertexParams, PixelFormat,
    PrimitiveType, SystemSettings, TextureUsage,
};
use ember_gl::{GlCall, TraceGl};
use ember_platform::HeadlessWindow;
use pretty_assertions::assert_eq;

struct Fixture {
    gl: Rc<TraceGl>,
    rhi: Es2Rhi,
}

fn fixture_with_settings(settings: SystemSettings) -> Fixture {
    let gl = Rc::new(TraceGl::new());
    let mut rhi = Es2Rhi::new(
        Rc::<TraceGl>::clone(&gl),
        Rc::new(HeadlessWindow::new()),
        Rc::new(()),
        settings,
    );
    rhi.create_viewport(1, 640, 480, false);
    Fixture { gl, rhi }
}

fn fixture() -> Fixture {
    fixture_with_settings(SystemSettings::default())
}

#[test]
fn equal_state_resolves_the_same_program_across_draws() {
    let mut fx = fixture();
    let mut params = MaterialVertexParams::default();
    params.lighting_enabled = true;
    params.specular_enabled = true;
    fx.rhi.set_mobile_material_vertex_params(&params);
    fx.rhi.enable_specular(true);

    assert!(fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None));
    let compiled_after_first = fx.rhi.stats().snapshot().programs_compiled;

    // Same state again: no recompile, no program change.
    assert!(!fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None));
    assert_eq!(fx.rhi.stats().snapshot().programs_compiled, compiled_after_first);

    // Toggling one feature selects a different program.
    fx.rhi.enable_specular(false);
    assert!(fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None));
    assert_eq!(fx.rhi.stats().snapshot().programs_compiled, compiled_after_first + 1);
}

#[test]
fn preprocessed_index_round_trips_and_reports_missing_keys() {
    use ember_es2::shader_manager::ShaderManager;
    use ember_es2::{DeviceCapabilities, RhiStats};

    let gl = TraceGl::new();
    let caps = DeviceCapabilities::probe(&gl);
    let stats = RhiStats::new();
    let mut settings = SystemSettings::default();
    settings.use_preprocessed_shaders = true;
    let mut sm = ShaderManager::new(settings, caps);

    // Warm with the key for the default state only.
    let warmed_key = sm.build_key().pack();
    sm.warm_shader_cache(&gl, &[warmed_key], &stats);
    assert_eq!(sm.cache().len(), 1);

    // A state the index does not cover gets recorded, not dropped.
    sm.set_vertex_factory_flags(BaseFeatures::GPU_SKINNING);
    sm.set_program_by_type(&gl, PrimitiveType::Default, GlobalShaderKind::None, &stats)
        .unwrap();
    let missing = sm.cache().missing_keys().to_vec();
    assert_eq!(missing.len(), 1);
    assert_ne!(missing[0], warmed_key);

    // The export parses back to the same keys.
    let exported = sm.cache().export_missing_index();
    let parsed = ember_es2::program::parse_key_index(&exported).unwrap();
    assert_eq!(parsed, missing);
}

#[test]
fn warm_cache_via_the_key_index_file() {
    use ember_es2::shader_manager::ShaderManager;
    use ember_es2::{DeviceCapabilities, RhiStats};

    // Build a key with a real manager so the index is well-formed.
    let probe_gl = TraceGl::new();
    let caps = DeviceCapabilities::probe(&probe_gl);
    let sm = ShaderManager::new(SystemSettings::default(), caps);
    let key = sm.build_key().pack();
    let index = format!("version:1\nkey:{}\n", key.to_hex());

    let gl = Rc::new(TraceGl::new());
    let mut rhi = Es2Rhi::new(
        Rc::<TraceGl>::clone(&gl),
        Rc::new(HeadlessWindow::new()),
        Rc::new(()),
        SystemSettings::default(),
    );
    assert_eq!(rhi.load_preprocessed_key_index(&index).unwrap(), 1);

    // First viewport warms the cache: the key compiles ahead of any draw.
    rhi.create_viewport(1, 320, 240, false);
    assert_eq!(rhi.stats().snapshot().programs_compiled, 1);
}

#[test]
fn framebuffer_registry_reuses_the_fbo_for_a_seen_pair() {
    let mut fx = fixture();
    let make_target = |rhi: &mut Es2Rhi| {
        let texture =
            rhi.create_texture_2d(128, 128, PixelFormat::Rgba8, 1, TextureUsage::RENDER_TARGET, None);
        rhi.create_targetable_surface(texture).unwrap()
    };
    let a = make_target(&mut fx.rhi);
    let x = make_target(&mut fx.rhi);

    fx.rhi.set_render_target(Some(a), None);
    fx.rhi.set_render_target(Some(x), None);
    let created = fx.gl.count_where(|c| matches!(c, GlCall::GenFramebuffer(_)));

    // Third bind of the first pair: same FBO, nothing new created.
    fx.rhi.set_render_target(Some(a), None);
    assert_eq!(fx.gl.count_where(|c| matches!(c, GlCall::GenFramebuffer(_))), created);

    let binds: Vec<u32> = fx
        .gl
        .calls()
        .iter()
        .filter_map(|c| match c {
            GlCall::BindFramebuffer(name) if *name != 0 => Some(*name),
            _ => None,
        })
        .collect();
    let first = binds.first().copied().unwrap();
    assert_eq!(binds.last().copied().unwrap(), first);
}

#[test]
fn versioned_fog_color_uploads_once_for_equal_values() {
    let mut fx = fixture();
    // Arrange gradient fog to be active for the draw.
    fx.rhi.set_fog(true, 10.0, 1000.0, [1.0, 0.0, 0.0, 1.0]);
    let mut mesh = MeshVertexParams::default();
    mesh.object_position = [50.0, 0.0, 0.0];
    mesh.object_bounds_radius = 5.0;
    fx.rhi.set_mobile_mesh_vertex_params(&mesh);

    assert!(fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None));
    let fog_uploads = |gl: &TraceGl| {
        gl.count_where(|c| {
            matches!(c, GlCall::Uniform4fv { values, .. } if values == &[1.0, 0.0, 0.0, 1.0])
        })
    };
    let after_first = fog_uploads(&fx.gl);
    assert!(after_first >= 1);

    // Re-set the same fog color (version bumps, value does not change) and
    // draw again: no further upload for it.
    fx.rhi.set_fog(true, 10.0, 1000.0, [1.0, 0.0, 0.0, 1.0]);
    fx.rhi.set_mobile_mesh_vertex_params(&mesh);
    fx.rhi.set_program_by_type(PrimitiveType::Default, GlobalShaderKind::None);
    assert_eq!(fog_uploads(&fx.gl), after_first);
}

#[test]
fn next_draw_global_shader_applies_to_one_quad_only() {
    let mut fx = fixture();
    fx.rhi.set_next_draw_global_shader(GlobalShaderKind::GammaCorrection);

    // The fullscreen quad goes through the immediate-mode path, which is
    // where the override is consumed.
    fx.rhi.set_vertex_declaration(ember_es2::VertexDeclaration::new(
        ember_es2::DeclKind::Simple,
        vec![ember_es2::VertexElement {
            stream_index: 0,
            offset: 0,
            element_type: ember_es2::VertexElementType::Float2,
            usage: ember_es2::VertexUsage::Position,
            usage_index: 0,
        }],
    ));
    let stride = 8;
    if let Some(data) = fx.rhi.begin_draw_primitive_up(ember_es2::Topology::TriangleStrip, 2, stride)
    {
        data.fill(0);
    }
    fx.rhi.end_draw_primitive_up();
    let compiled_for_global = fx.rhi.stats().snapshot().programs_compiled;
    assert!(compiled_for_global >= 1);

    // The next immediate-mode draw must not inherit the global shader.
    if let Some(data) = fx.rhi.begin_draw_primitive_up(ember_es2::Topology::TriangleStrip, 2, stride)
    {
        data.fill(0);
    }
    fx.rhi.end_draw_primitive_up();
    // A Simple program compiles for the second draw (different key).
    assert_eq!(fx.rhi.stats().snapshot().programs_compiled, compiled_for_global + 1);
    assert_eq!(fx.rhi.stats().snapshot().draw_calls_up, 2);
}
