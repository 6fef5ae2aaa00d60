/// Viewport lifecycle: owns the scene, camera, renderer, controls and model
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use nalgebra::Point3;

use crate::config::{Configuration, ViewportOptions};
use crate::controls::OrbitController;
use crate::error::ViewerError;
use crate::ingest::{LoadState, ModelIngest};
use crate::loader::{Fetch, LoaderRegistry, MeshFormat};
use crate::projection::Camera;
use crate::render::{RendererOptions, SoftwareRenderer};
use crate::scene::Scene;
use crate::screenshot::Screenshot;
use crate::surface::MountTarget;
use crate::sync::{apply_appearance, apply_environment, apply_transform};

/// Notifications for the UI owner, drained with [`Viewport::drain_events`]
#[derive(Debug, Clone, PartialEq)]
pub enum ViewportEvent {
    /// The loading indicator: set when a load starts, cleared when the
    /// current load attaches or fails
    Loading(bool),
    ModelAttached {
        url: String,
        format: MeshFormat,
        triangles: usize,
    },
    LoadFailed {
        url: String,
        error: ViewerError,
    },
}

/// Per-viewport frame schedule
#[derive(Debug, Clone)]
pub struct RenderLoop {
    running: bool,
    frames: u64,
    interval: Duration,
}

impl RenderLoop {
    pub fn new(target_fps: u32) -> Self {
        Self {
            running: false,
            frames: 0,
            interval: Duration::from_secs(1) / target_fps.max(1),
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frames completed since start
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Time budget of one frame at the target rate
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// A mounted, continuously rendering view of at most one model.
///
/// Configuration changes go through [`Viewport::apply_config`] and only ever
/// mutate the existing scene. Models come and go exclusively through
/// [`Viewport::load_model`].
pub struct Viewport {
    scene: Scene,
    camera: Camera,
    renderer: SoftwareRenderer,
    controls: OrbitController,
    ingest: ModelIngest,
    mount: Box<dyn MountTarget>,
    config: Configuration,
    render_loop: RenderLoop,
    events: VecDeque<ViewportEvent>,
    disposed: bool,
}

impl Viewport {
    /// Build the scene, camera, renderer, controls, lights and helpers once
    /// and attach to `mount`. On attach failure everything created so far is
    /// disposed before the error is returned.
    pub fn initialize(
        mount: Box<dyn MountTarget>,
        config: Configuration,
        options: ViewportOptions,
        fetcher: Arc<dyn Fetch>,
    ) -> Result<Self, ViewerError> {
        let (width, height) = mount.client_size();

        let mut camera = Camera::perspective(
            options.fov_degrees.to_radians(),
            width,
            height,
            options.near,
            options.far,
        );
        let [ex, ey, ez] = options.eye;
        camera.position = Point3::new(ex, ey, ez);

        let renderer = SoftwareRenderer::new(
            width,
            height,
            RendererOptions {
                antialias: options.antialias,
                pixel_ratio: mount.device_pixel_ratio(),
                shadows: options.shadows,
            },
        );

        let mut controls = OrbitController::new(&camera);
        controls.enable_damping = true;
        controls.damping_factor = options.damping_factor;
        controls.auto_rotate = options.auto_rotate;
        controls.auto_rotate_speed = options.auto_rotate_speed;

        let mut scene = Scene::new();
        apply_environment(&mut scene, &config);

        let ingest = ModelIngest::new(Arc::new(LoaderRegistry::default()), fetcher, options.load.clone());

        let mut viewport = Self {
            scene,
            camera,
            renderer,
            controls,
            ingest,
            mount,
            config,
            render_loop: RenderLoop::new(options.target_fps),
            events: VecDeque::new(),
            disposed: false,
        };

        if let Err(err) = viewport.mount.attach() {
            warn!("mount target refused attach: {err}");
            viewport.dispose();
            return Err(err);
        }

        viewport.render_loop.start();
        info!("viewport initialized at {width}x{height}");
        Ok(viewport)
    }

    /// One render-loop iteration: deliver finished loads, advance the
    /// controls, render and present. Does nothing once the loop is stopped.
    pub fn frame(&mut self) -> Result<(), ViewerError> {
        if !self.render_loop.is_running() {
            return Ok(());
        }

        let delivered = self
            .ingest
            .poll(&mut self.scene, &self.config, &mut self.renderer);
        self.events.extend(delivered);

        self.controls.update(&mut self.camera);
        self.renderer.render(&self.scene, &self.camera);
        self.mount.present(self.renderer.frame())?;
        self.render_loop.frames += 1;
        Ok(())
    }

    /// Replace the configuration, running only the synchronizers whose
    /// inputs changed.
    pub fn apply_config(&mut self, next: Configuration) {
        if next.appearance_differs(&self.config) {
            apply_appearance(&mut self.scene, &next, false);
        }
        if next.transform_differs(&self.config) {
            apply_transform(&mut self.scene, &next);
        }
        if next.environment_differs(&self.config) {
            apply_environment(&mut self.scene, &next);
        }
        self.config = next;
    }

    pub fn load_model(&mut self, url: &str) {
        if self.disposed {
            warn!("ignoring load of {url} on a disposed viewport");
            return;
        }
        let started = self.ingest.load(url);
        self.events.extend(started);
    }

    pub fn handle_resize(&mut self, width: u32, height: u32) {
        debug!("resize to {width}x{height}");
        self.camera.set_aspect(width, height);
        self.renderer.set_pixel_ratio(self.mount.device_pixel_ratio());
        self.renderer.set_size(width, height);
    }

    /// Copy of the most recently rendered drawing buffer
    pub fn screenshot(&self) -> Screenshot {
        Screenshot::from_frame(self.renderer.frame())
    }

    pub fn drain_events(&mut self) -> Vec<ViewportEvent> {
        self.events.drain(..).collect()
    }

    /// Stop the loop and release everything. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.render_loop.stop();
        self.ingest.cancel();
        self.controls.dispose();
        if let Some(model) = self.scene.detach_model() {
            self.renderer.release(&model.content);
        }
        self.renderer.dispose();
        self.mount.detach();
        info!("viewport disposed after {} frames", self.render_loop.frames);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn renderer(&self) -> &SoftwareRenderer {
        &self.renderer
    }

    pub fn controls(&self) -> &OrbitController {
        &self.controls
    }

    /// Orbit input goes here; it takes effect on the next frame
    pub fn controls_mut(&mut self) -> &mut OrbitController {
        &mut self.controls
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn load_state(&self) -> &LoadState {
        self.ingest.state()
    }

    pub fn is_loading(&self) -> bool {
        self.ingest.is_loading()
    }

    pub fn render_loop(&self) -> &RenderLoop {
        &self.render_loop
    }
}

impl Drop for Viewport {
    fn drop(&mut self) {
        self.dispose();
    }
}
