/// Perspective camera and projection utilities
use nalgebra::{Matrix4, Point3, Vector3, Vector4};

/// Perspective camera looking at a target.
///
/// The projection matrix is cached; call [`Camera::update_projection_matrix`]
/// (or [`Camera::set_aspect`]) after changing `fov`, `aspect`, `near` or `far`.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view in radians
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    projection: Matrix4<f32>,
}

/// A point after projection: pixel coordinates plus NDC depth in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
    pub depth: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self::perspective(75f32.to_radians(), width, height, 0.1, 1000.0)
    }

    pub fn perspective(fov: f32, width: u32, height: u32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            position: Point3::new(0.0, 5.0, 10.0),
            target: Point3::origin(),
            up: Vector3::y(),
            fov,
            aspect: aspect_ratio(width, height),
            near,
            far,
            projection: Matrix4::identity(),
        };
        camera.update_projection_matrix();
        camera
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = aspect_ratio(width, height);
        self.update_projection_matrix();
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection = Matrix4::new_perspective(self.aspect, self.fov, self.near, self.far);
    }

    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    pub fn projection_matrix(&self) -> &Matrix4<f32> {
        &self.projection
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection * self.view_matrix()
    }

    /// Project a world-space point through `view_proj` to a `width` x
    /// `height` pixel grid. Points at or behind the eye yield `None`;
    /// points off screen are still returned so callers can clip.
    pub fn project_to_screen(
        view_proj: &Matrix4<f32>,
        point: &Point3<f32>,
        width: u32,
        height: u32,
    ) -> Option<ScreenPoint> {
        let clip: Vector4<f32> = view_proj * point.to_homogeneous();
        if clip.w <= 1e-6 {
            return None;
        }

        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        let depth = clip.z / clip.w;

        Some(ScreenPoint {
            x: (ndc_x + 1.0) * 0.5 * width as f32,
            y: (1.0 - ndc_y) * 0.5 * height as f32,
            depth,
        })
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
    width.max(1) as f32 / height.max(1) as f32
}
