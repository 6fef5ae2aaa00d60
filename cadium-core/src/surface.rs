/// Mount targets: where a viewport's frames end up
use std::sync::{Arc, Mutex};

use crate::error::ViewerError;
use crate::render::FrameBuffer;

/// Host-provided drawing surface.
///
/// The viewport attaches once during initialization, presents every rendered
/// frame and detaches on dispose. Sizes are in client units; the drawing
/// buffer is `client_size * device_pixel_ratio`.
pub trait MountTarget: Send {
    fn client_size(&self) -> (u32, u32);

    fn device_pixel_ratio(&self) -> f32 {
        1.0
    }

    fn attach(&mut self) -> Result<(), ViewerError>;

    fn present(&mut self, frame: &FrameBuffer) -> Result<(), ViewerError>;

    /// Must tolerate being called more than once
    fn detach(&mut self);
}

#[derive(Debug, Default)]
struct HeadlessState {
    size: (u32, u32),
    pixel_ratio: f32,
    attached: bool,
    detach_calls: usize,
    presented: usize,
    last_frame: Option<FrameBuffer>,
    fail_attach: bool,
}

/// In-memory target for tests and offscreen rendering.
///
/// Clones share state, so a test can keep a handle after moving one into a
/// viewport.
#[derive(Debug, Clone)]
pub struct HeadlessTarget {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState {
                size: (width, height),
                pixel_ratio: 1.0,
                ..HeadlessState::default()
            })),
        }
    }

    /// A target whose `attach` always fails
    pub fn unavailable(width: u32, height: u32) -> Self {
        let target = Self::new(width, height);
        target.with(|s| s.fail_attach = true);
        target
    }

    fn with<R>(&self, f: impl FnOnce(&mut HeadlessState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    /// Change the reported client size, as a host resize would
    pub fn resize(&self, width: u32, height: u32) {
        self.with(|s| s.size = (width, height));
    }

    pub fn set_pixel_ratio(&self, ratio: f32) {
        self.with(|s| s.pixel_ratio = ratio);
    }

    pub fn is_attached(&self) -> bool {
        self.with(|s| s.attached)
    }

    pub fn detach_calls(&self) -> usize {
        self.with(|s| s.detach_calls)
    }

    pub fn presented(&self) -> usize {
        self.with(|s| s.presented)
    }

    pub fn last_frame(&self) -> Option<FrameBuffer> {
        self.with(|s| s.last_frame.clone())
    }
}

impl MountTarget for HeadlessTarget {
    fn client_size(&self) -> (u32, u32) {
        self.with(|s| s.size)
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.with(|s| s.pixel_ratio)
    }

    fn attach(&mut self) -> Result<(), ViewerError> {
        self.with(|s| {
            if s.fail_attach {
                return Err(ViewerError::Surface("headless target unavailable".into()));
            }
            s.attached = true;
            Ok(())
        })
    }

    fn present(&mut self, frame: &FrameBuffer) -> Result<(), ViewerError> {
        self.with(|s| {
            if !s.attached {
                return Err(ViewerError::Surface("present on a detached target".into()));
            }
            s.presented += 1;
            s.last_frame = Some(frame.clone());
            Ok(())
        })
    }

    fn detach(&mut self) {
        self.with(|s| {
            s.attached = false;
            s.detach_calls += 1;
        });
    }
}
