/// Terminal host for the CADium viewport
use cadium_core::{Configuration, Fetch, ViewerError, Viewport, ViewportEvent, ViewportOptions};
use crossterm::{
    cursor,
    event::{self, Event, KeyEvent, KeyEventKind},
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use log::{info, warn};
use std::io::{stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod fetch;
pub mod keys;
pub mod surface;

pub use fetch::{HttpFetcher, SourceFetcher};
pub use keys::{apply_key, KeyAction};
pub use surface::{SurfaceMode, TerminalSurface};

/// What the status line reports about model loading
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadStatus {
    pub loading: bool,
    pub message: Option<String>,
}

impl LoadStatus {
    /// Fold one viewport event into the status
    pub fn update(&mut self, event: &ViewportEvent) {
        match event {
            ViewportEvent::Loading(loading) => self.loading = *loading,
            ViewportEvent::ModelAttached { url, format, triangles } => {
                self.message = Some(format!("{url} ({format}, {triangles} tris)"));
            }
            ViewportEvent::LoadFailed { error, .. } => {
                self.message = Some(format!("error: {error}"));
            }
        }
    }
}

/// Main application struct: owns the configuration and drives the viewport
pub struct TerminalApp {
    viewport: Viewport,
    mode: SurfaceMode,
    config: Configuration,
    status: LoadStatus,
    screenshot_path: PathBuf,
    running: bool,
    last_frame: Instant,
    frame_count: u32,
    fps: f32,
}

impl TerminalApp {
    pub fn new(
        config: Configuration,
        options: ViewportOptions,
        mode: SurfaceMode,
        fetcher: Arc<dyn Fetch>,
    ) -> Result<Self, ViewerError> {
        let viewport = Viewport::initialize(
            Box::new(TerminalSurface::new(mode)),
            config.clone(),
            options,
            fetcher,
        )?;

        Ok(Self {
            viewport,
            mode,
            config,
            status: LoadStatus::default(),
            screenshot_path: PathBuf::from(cadium_core::screenshot::DEFAULT_FILE_NAME),
            running: true,
            last_frame: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        })
    }

    pub fn with_screenshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot_path = path.into();
        self
    }

    pub fn load_model(&mut self, url: &str) {
        self.viewport.load_model(url);
    }

    /// Run until quit, then tear the viewport down and restore the terminal.
    pub fn run(&mut self) -> Result<(), ViewerError> {
        let result = self.main_loop();
        self.viewport.dispose();
        result
    }

    fn main_loop(&mut self) -> Result<(), ViewerError> {
        let target_frame_time = self.viewport.render_loop().interval();

        while self.running {
            let frame_start = Instant::now();

            // Handle input
            while event::poll(Duration::from_millis(0))? {
                self.handle_event(event::read()?);
            }

            // Update and render
            self.viewport.frame()?;
            for event in self.viewport.drain_events() {
                self.status.update(&event);
            }
            self.draw_status()?;

            // Frame timing
            self.frame_count += 1;
            let elapsed = frame_start.elapsed();
            if elapsed < target_frame_time {
                std::thread::sleep(target_frame_time - elapsed);
            }

            // Update FPS counter
            let now = Instant::now();
            if (now - self.last_frame).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_frame).as_secs_f32();
                self.frame_count = 0;
                self.last_frame = now;
            }
        }

        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(KeyEvent { code, kind: KeyEventKind::Press, .. }) => {
                match apply_key(&mut self.config, code) {
                    KeyAction::Configure => self.viewport.apply_config(self.config.clone()),
                    KeyAction::Orbit { left, up } => {
                        let controls = self.viewport.controls_mut();
                        controls.rotate_left(left);
                        controls.rotate_up(up);
                    }
                    KeyAction::Dolly(factor) => self.viewport.controls_mut().dolly(factor),
                    KeyAction::ToggleAutoRotate => {
                        let controls = self.viewport.controls_mut();
                        controls.auto_rotate = !controls.auto_rotate;
                    }
                    KeyAction::Screenshot => self.save_screenshot(),
                    KeyAction::Quit => self.running = false,
                    KeyAction::Ignored => {}
                }
            }
            Event::Resize(cols, rows) => {
                let (width, height) = self.mode.client_size(cols, rows);
                self.viewport.handle_resize(width, height);
            }
            _ => {}
        }
    }

    fn save_screenshot(&mut self) {
        let path = &self.screenshot_path;
        match self.viewport.screenshot().save(path) {
            Ok(()) => {
                info!("screenshot saved to {}", path.display());
                self.status.message = Some(format!("saved {}", path.display()));
            }
            Err(err) => {
                warn!("screenshot failed: {err}");
                self.status.message = Some(format!("screenshot failed: {err}"));
            }
        }
    }

    fn draw_status(&self) -> Result<(), ViewerError> {
        let (width, _) = terminal::size()?;
        let state = if self.status.loading {
            "loading..."
        } else {
            self.status.message.as_deref().unwrap_or("no model")
        };
        let line: String = format!("CADium | FPS: {:.1} | {state} | {}", self.fps, keys::HELP)
            .chars()
            .take(width as usize)
            .collect();

        let mut stdout = stdout();
        queue!(
            stdout,
            cursor::MoveTo(0, 0),
            Clear(ClearType::CurrentLine),
            SetForegroundColor(Color::Yellow),
            Print(line),
            ResetColor
        )?;
        stdout.flush()?;
        Ok(())
    }
}
