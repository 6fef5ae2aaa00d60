use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cadium_core::{
    Color, Configuration, Fetch, HeadlessTarget, LoadMode, LoadPolicy, LoadState, MeshFormat,
    Viewport, ViewportEvent, ViewportOptions, ViewerError, TARGET_SIZE,
};

/// Serves fixed bodies by URL
#[derive(Default)]
struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.files.insert(url.to_string(), body.into());
        self
    }
}

impl Fetch for MemoryFetcher {
    fn fetch(&self, url: &str, limit: u64) -> Result<Vec<u8>, ViewerError> {
        let body = self
            .files
            .get(url)
            .ok_or_else(|| ViewerError::fetch(url, "404 Not Found"))?;
        cadium_core::loader::read_limited(body.as_slice(), url, limit)
    }
}

/// Blocks fetches of one URL until the test opens the gate
struct GatedFetcher {
    inner: MemoryFetcher,
    gated: String,
    gate: Mutex<Receiver<()>>,
}

impl GatedFetcher {
    fn new(inner: MemoryFetcher, gated: &str) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let fetcher = Self {
            inner,
            gated: gated.to_string(),
            gate: Mutex::new(rx),
        };
        (fetcher, tx)
    }
}

impl Fetch for GatedFetcher {
    fn fetch(&self, url: &str, limit: u64) -> Result<Vec<u8>, ViewerError> {
        if url == self.gated {
            let gate = self.gate.lock().map_err(|e| ViewerError::fetch(url, e))?;
            gate.recv().map_err(|e| ViewerError::fetch(url, e))?;
        }
        self.inner.fetch(url, limit)
    }
}

fn box_corners(size: [f32; 3], offset: [f32; 3]) -> Vec<[f32; 3]> {
    let mut corners = Vec::new();
    for i in 0..8 {
        let pick = |bit: usize, axis: usize| {
            let half = size[axis] / 2.0;
            offset[axis] + if i & bit == 0 { -half } else { half }
        };
        corners.push([pick(1, 0), pick(2, 1), pick(4, 2)]);
    }
    corners
}

/// Quads of the box, as 1-based corner indices
const BOX_FACES: [[usize; 4]; 6] = [
    [1, 3, 4, 2],
    [5, 6, 8, 7],
    [1, 2, 6, 5],
    [3, 7, 8, 4],
    [1, 5, 7, 3],
    [2, 4, 8, 6],
];

fn box_obj(size: [f32; 3], offset: [f32; 3]) -> String {
    let mut out = String::from("o box\n");
    for [x, y, z] in box_corners(size, offset) {
        out.push_str(&format!("v {x} {y} {z}\n"));
    }
    for [a, b, c, d] in BOX_FACES {
        out.push_str(&format!("f {a} {b} {c} {d}\n"));
    }
    out
}

fn box_stl(size: [f32; 3], offset: [f32; 3]) -> Vec<u8> {
    let corners = box_corners(size, offset);
    let mut data = vec![0u8; 80];
    data.extend_from_slice(&12u32.to_le_bytes());
    for [a, b, c, d] in BOX_FACES {
        for tri in [[a, b, c], [a, c, d]] {
            data.extend_from_slice(&[0u8; 12]);
            for i in tri {
                for coord in corners[i - 1] {
                    data.extend_from_slice(&coord.to_le_bytes());
                }
            }
            data.extend_from_slice(&0u16.to_le_bytes());
        }
    }
    data
}

fn options(mode: LoadMode) -> ViewportOptions {
    ViewportOptions {
        auto_rotate: false,
        load: LoadPolicy {
            mode,
            ..LoadPolicy::default()
        },
        ..ViewportOptions::default()
    }
}

fn mount(fetcher: impl Fetch + 'static, options: ViewportOptions) -> (Viewport, HeadlessTarget) {
    let target = HeadlessTarget::new(32, 24);
    let viewport = Viewport::initialize(
        Box::new(target.clone()),
        Configuration::default(),
        options,
        Arc::new(fetcher),
    )
    .unwrap();
    (viewport, target)
}

/// Run frames until `done` holds for the events seen so far
fn pump_until(viewport: &mut Viewport, done: impl Fn(&[ViewportEvent]) -> bool) -> Vec<ViewportEvent> {
    let mut seen = Vec::new();
    for _ in 0..500 {
        viewport.frame().unwrap();
        seen.extend(viewport.drain_events());
        if done(&seen) {
            return seen;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not reached, events: {seen:?}");
}

fn attached(events: &[ViewportEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ViewportEvent::ModelAttached { url, .. } => Some(url.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_normalized_model_is_target_size_and_rests_on_ground() {
    let fetcher = MemoryFetcher::default().with("part.obj", box_obj([0.3, 7.0, 2.0], [40.0, -12.0, 5.0]));
    let (mut viewport, _) = mount(fetcher, options(LoadMode::Inline));

    viewport.load_model("part.obj");
    viewport.frame().unwrap();

    let bounds = viewport.scene().model().unwrap().world_bounds().unwrap();
    assert!((bounds.max_dimension() - TARGET_SIZE).abs() < 1e-4);
    assert!(bounds.min.y.abs() < 1e-4);
    assert!(bounds.center().x.abs() < 1e-4);
    assert!(bounds.center().z.abs() < 1e-4);
}

#[test]
fn test_stl_and_obj_of_same_shape() {
    let size = [2.0, 3.0, 3.0];
    let fetcher = MemoryFetcher::default()
        .with("shape.obj", box_obj(size, [1.0, 1.0, 1.0]))
        .with("shape.stl", box_stl(size, [1.0, 1.0, 1.0]));
    let (mut viewport, _) = mount(fetcher, options(LoadMode::Inline));

    viewport.load_model("shape.obj");
    viewport.frame().unwrap();
    let obj = viewport.scene().model().unwrap().clone();

    viewport.load_model("shape.stl");
    viewport.frame().unwrap();
    let stl = viewport.scene().model().unwrap().clone();
    assert_eq!(stl.format, MeshFormat::Stl);

    let obj_bb = obj.world_bounds().unwrap();
    let stl_bb = stl.world_bounds().unwrap();
    assert!((obj_bb.max_dimension() - stl_bb.max_dimension()).abs() < 1e-4);
    assert!((stl_bb.max_dimension() - TARGET_SIZE).abs() < 1e-4);

    assert_eq!(obj.normalization.rotation.x, 0.0);
    assert!((stl.normalization.rotation.x + FRAC_PI_2).abs() < 1e-6);
    assert_eq!(obj.normalization.scale, stl.normalization.scale);
    assert!(stl_bb.min.y.abs() < 1e-4);
}

#[test]
fn test_z_up_stl_off_origin_rests_on_ground() {
    // Flat plate standing on z = 0 away from the origin, as CAD exports lay it out
    let fetcher = MemoryFetcher::default().with("plate.stl", box_stl([8.0, 4.0, 1.0], [10.0, 3.0, 0.5]));
    let (mut viewport, _) = mount(fetcher, options(LoadMode::Inline));

    viewport.load_model("plate.stl");
    viewport.frame().unwrap();

    let bounds = viewport.scene().model().unwrap().world_bounds().unwrap();
    assert!(bounds.min.y.abs() < 1e-4);
    assert!(bounds.center().x.abs() < 1e-4);
    assert!(bounds.center().z.abs() < 1e-4);
    assert!((bounds.max_dimension() - TARGET_SIZE).abs() < 1e-4);
    // Z was up in the file, so the plate stays thin vertically
    assert!((bounds.size().y - 0.625).abs() < 1e-4);
    assert!((bounds.size().z - 2.5).abs() < 1e-4);
}

#[test]
fn test_appearance_toggles_preserve_geometry() {
    let fetcher = MemoryFetcher::default().with("part.obj", box_obj([1.0, 2.0, 3.0], [0.0; 3]));
    let (mut viewport, _) = mount(fetcher, options(LoadMode::Inline));
    viewport.load_model("part.obj");
    viewport.frame().unwrap();

    let model = viewport.scene().model().unwrap();
    let (triangles, vertices) = (model.content.triangle_count(), model.content.vertex_count());

    let mut config = viewport.config().clone();
    for i in 0..20u8 {
        config.wireframe = !config.wireframe;
        config.color = Color::from_rgb8(i * 10, 255 - i * 10, 128);
        viewport.apply_config(config.clone());
        viewport.frame().unwrap();
    }

    let model = viewport.scene().model().unwrap();
    assert_eq!(model.content.triangle_count(), triangles);
    assert_eq!(model.content.vertex_count(), vertices);
    model.content.for_each_mesh(&mut |mesh| {
        assert_eq!(mesh.material.color, config.color);
        assert_eq!(mesh.material.wireframe, config.wireframe);
    });
}

#[test]
fn test_newer_load_wins_inline() {
    let fetcher = MemoryFetcher::default()
        .with("a.obj", box_obj([1.0; 3], [0.0; 3]))
        .with("b.obj", box_obj([2.0; 3], [0.0; 3]));
    let (mut viewport, _) = mount(fetcher, options(LoadMode::Inline));

    viewport.load_model("a.obj");
    viewport.load_model("b.obj");
    viewport.frame().unwrap();

    let events = viewport.drain_events();
    assert_eq!(attached(&events), vec!["b.obj"]);
    assert_eq!(viewport.scene().model().unwrap().url, "b.obj");
    assert_eq!(events.last(), Some(&ViewportEvent::Loading(false)));
}

#[test]
fn test_late_stale_load_is_discarded() {
    let memory = MemoryFetcher::default()
        .with("a.obj", box_obj([1.0; 3], [0.0; 3]))
        .with("b.stl", box_stl([2.0; 3], [0.0; 3]));
    let (fetcher, open_gate) = GatedFetcher::new(memory, "a.obj");
    let (mut viewport, _) = mount(fetcher, options(LoadMode::Background));

    viewport.load_model("a.obj");
    viewport.load_model("b.stl");
    pump_until(&mut viewport, |events| !attached(events).is_empty());
    assert_eq!(viewport.scene().model().unwrap().url, "b.stl");
    let generation = match viewport.load_state() {
        LoadState::Attached { generation, .. } => *generation,
        other => panic!("unexpected state {other:?}"),
    };

    // Let A finish long after B attached
    open_gate.send(()).unwrap();
    let mut late = Vec::new();
    for _ in 0..40 {
        thread::sleep(Duration::from_millis(5));
        viewport.frame().unwrap();
        late.extend(viewport.drain_events());
    }

    assert!(late.is_empty(), "stale load produced {late:?}");
    assert_eq!(viewport.scene().model().unwrap().url, "b.stl");
    assert!(matches!(viewport.load_state(), LoadState::Attached { generation: g, .. } if *g == generation));
}

#[test]
fn test_unsupported_extension_reports_and_clears_loading() {
    let (mut viewport, _) = mount(MemoryFetcher::default(), options(LoadMode::Background));

    viewport.load_model("https://cdn.example.com/model.fbx");
    viewport.frame().unwrap();

    assert!(viewport.scene().model().is_none());
    assert!(!viewport.is_loading());
    assert_eq!(
        viewport.drain_events(),
        vec![
            ViewportEvent::Loading(true),
            ViewportEvent::LoadFailed {
                url: "https://cdn.example.com/model.fbx".into(),
                error: ViewerError::UnsupportedFormat {
                    extension: Some("fbx".into())
                },
            },
            ViewportEvent::Loading(false),
        ]
    );
}

#[test]
fn test_failed_load_keeps_displayed_model() {
    let fetcher = MemoryFetcher::default()
        .with("good.obj", box_obj([1.0; 3], [0.0; 3]))
        .with("broken.obj", "v 0 0 0\nf 1 2 3\n")
        .with("point.stl", box_stl([0.0; 3], [3.0; 3]));
    let (mut viewport, _) = mount(fetcher, options(LoadMode::Inline));
    viewport.load_model("good.obj");
    viewport.frame().unwrap();
    viewport.drain_events();

    for url in ["broken.obj", "point.stl", "missing.obj"] {
        viewport.load_model(url);
        viewport.frame().unwrap();
        let events = viewport.drain_events();
        assert!(
            matches!(&events[1], ViewportEvent::LoadFailed { url: failed, .. } if failed == url),
            "{events:?}"
        );
        assert_eq!(events[2], ViewportEvent::Loading(false));
        assert_eq!(viewport.scene().model().unwrap().url, "good.obj");
    }
    assert!(matches!(
        viewport.load_state(),
        LoadState::Failed {
            error: ViewerError::Fetch { .. },
            ..
        }
    ));
}

#[test]
fn test_hung_load_times_out() {
    let memory = MemoryFetcher::default().with("slow.obj", box_obj([1.0; 3], [0.0; 3]));
    let (fetcher, open_gate) = GatedFetcher::new(memory, "slow.obj");
    let mut opts = options(LoadMode::Background);
    opts.load.timeout_secs = Some(0.05);
    let (mut viewport, _) = mount(fetcher, opts);

    viewport.load_model("slow.obj");
    let events = pump_until(&mut viewport, |events| {
        events.iter().any(|e| matches!(e, ViewportEvent::LoadFailed { .. }))
    });
    assert!(events.iter().any(|e| matches!(
        e,
        ViewportEvent::LoadFailed {
            error: ViewerError::Timeout { .. },
            ..
        }
    )));
    assert!(!viewport.is_loading());

    open_gate.send(()).unwrap();
    for _ in 0..20 {
        thread::sleep(Duration::from_millis(5));
        viewport.frame().unwrap();
    }
    assert!(viewport.scene().model().is_none());
}

#[test]
fn test_resize_updates_camera_and_drawing_buffer() {
    let (mut viewport, target) = mount(MemoryFetcher::default(), options(LoadMode::Inline));
    target.resize(64, 16);
    target.set_pixel_ratio(2.0);
    viewport.handle_resize(64, 16);

    assert!((viewport.camera().aspect - 4.0).abs() < 1e-6);
    assert_eq!(viewport.renderer().size(), (64, 16));
    assert_eq!(viewport.renderer().drawing_buffer_size(), (128, 32));

    viewport.frame().unwrap();
    let frame = target.last_frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (128, 32));
}

#[test]
fn test_environment_changes_mutate_helpers_in_place() {
    let (mut viewport, target) = mount(MemoryFetcher::default(), options(LoadMode::Inline));
    let config = Configuration {
        show_grid: false,
        show_axes: false,
        background_color: Color::from_rgb8(0, 0, 255),
        ambient_intensity: 3.0,
        ..Configuration::default()
    };
    viewport.apply_config(config);
    viewport.frame().unwrap();

    let scene = viewport.scene();
    assert!(!scene.grid.visible && !scene.axes.visible);
    assert_eq!(scene.ambient.intensity, 3.0);
    // Nothing else on an empty stage, so every pixel is the background
    let frame = target.last_frame().unwrap();
    assert!(frame.rgba().chunks(4).all(|p| p == [0, 0, 255, 255]));
    assert_eq!(target.presented(), 1);
}

#[test]
fn test_transform_config_moves_model_without_reload() {
    let fetcher = MemoryFetcher::default().with("part.obj", box_obj([2.0; 3], [0.0; 3]));
    let (mut viewport, _) = mount(fetcher, options(LoadMode::Inline));
    viewport.load_model("part.obj");
    viewport.frame().unwrap();
    viewport.drain_events();

    let mut config = viewport.config().clone();
    config.scale = 1.5;
    config.position.y = 2.0;
    viewport.apply_config(config);
    viewport.frame().unwrap();

    let bounds = viewport.scene().model().unwrap().world_bounds().unwrap();
    assert!((bounds.max_dimension() - 1.5 * TARGET_SIZE).abs() < 1e-3);
    assert!((bounds.min.y - 2.0).abs() < 1e-3);
    assert!(viewport.drain_events().is_empty());
}

#[test]
fn test_dispose_is_idempotent_and_releases_everything() {
    let fetcher = MemoryFetcher::default().with("part.obj", box_obj([1.0; 3], [0.0; 3]));
    let (mut viewport, target) = mount(fetcher, options(LoadMode::Inline));
    viewport.load_model("part.obj");
    viewport.frame().unwrap();
    assert!(viewport.renderer().resources().geometries > 0);

    viewport.dispose();
    viewport.dispose();
    assert!(viewport.is_disposed());
    assert_eq!(viewport.renderer().resources().total(), 0);
    assert!(!viewport.render_loop().is_running());
    assert!(!target.is_attached());
    assert_eq!(target.detach_calls(), 1);

    // The stopped loop neither renders nor presents
    let presented = target.presented();
    viewport.frame().unwrap();
    assert_eq!(target.presented(), presented);

    drop(viewport);
    assert_eq!(target.detach_calls(), 1);
}

#[test]
fn test_failed_attach_cleans_up() {
    let target = HeadlessTarget::unavailable(10, 10);
    let result = Viewport::initialize(
        Box::new(target.clone()),
        Configuration::default(),
        ViewportOptions::default(),
        Arc::new(MemoryFetcher::default()),
    );
    assert!(matches!(result, Err(ViewerError::Surface(_))));
    assert_eq!(target.detach_calls(), 1);
}

#[test]
fn test_screenshot_matches_drawing_buffer() {
    let (mut viewport, target) = mount(MemoryFetcher::default(), options(LoadMode::Inline));
    viewport.frame().unwrap();

    let shot = viewport.screenshot();
    let frame = target.last_frame().unwrap();
    assert_eq!((shot.width, shot.height), (frame.width(), frame.height()));
    assert_eq!(shot.rgba, frame.rgba());

    let png = shot.encode_png().unwrap();
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
}
