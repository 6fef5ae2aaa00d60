/// Software rasterizer that draws a [`Scene`] into an RGBA drawing buffer
use std::collections::{HashMap, HashSet};

use log::debug;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};

use crate::color::Color;
use crate::config::ShadowQuality;
use crate::geometry::Mesh;
use crate::projection::Camera;
use crate::scene::{GeometryId, MaterialId, MeshNode, Node, Scene};

/// Clip-space `w` below which a vertex counts as behind the eye
const NEAR_W: f32 = 1e-3;

/// Depth slack so lines win against coplanar geometry
const LINE_DEPTH_BIAS: f32 = 1e-4;

/// Axes helper colors, X/Y/Z
const AXIS_COLORS: [u32; 3] = [0xff0000, 0x00ff00, 0x0000ff];

/// Final 8-bit RGBA pixels, row-major from the top-left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn is_empty(&self) -> bool {
        self.rgba.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererOptions {
    /// Render at 2x and box-filter down
    pub antialias: bool,
    pub pixel_ratio: f32,
    pub shadows: ShadowQuality,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            antialias: true,
            pixel_ratio: 1.0,
            shadows: ShadowQuality::Soft,
        }
    }
}

/// Live entries in the renderer's resource table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub geometries: usize,
    pub materials: usize,
    pub render_targets: usize,
}

impl ResourceCounts {
    pub fn total(&self) -> usize {
        self.geometries + self.materials + self.render_targets
    }
}

/// Per-geometry data prepared once on first draw
struct GpuGeometry {
    face_normals: Vec<Vector3<f32>>,
}

impl GpuGeometry {
    fn upload(mesh: &Mesh) -> Self {
        Self {
            face_normals: mesh.triangles.iter().map(|t| t.calculate_normal()).collect(),
        }
    }
}

/// Pre-multiplied light terms for one frame
struct Lights {
    ambient: Color,
    sun: Color,
    to_sun: Vector3<f32>,
}

impl Lights {
    fn from_scene(scene: &Scene) -> Self {
        Self {
            ambient: scene.ambient.color.scale(scene.ambient.intensity),
            sun: scene.sun.color.scale(scene.sun.intensity),
            to_sun: -scene.sun.direction(),
        }
    }

    /// Lambert shading
    fn shade(&self, albedo: Color, normal: &Vector3<f32>) -> Color {
        let diffuse = normal.dot(&self.to_sun).max(0.0);
        let light = Color::new(
            self.ambient.r + self.sun.r * diffuse,
            self.ambient.g + self.sun.g * diffuse,
            self.ambient.b + self.sun.b * diffuse,
        );
        albedo.modulate(light)
    }
}

/// Supersampled color, depth and shadow-mask planes
struct RenderTarget {
    width: u32,
    height: u32,
    color: Vec<Color>,
    depth: Vec<f32>,
    shadow: Vec<f32>,
}

impl RenderTarget {
    fn new(width: u32, height: u32) -> Self {
        let size = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![Color::BLACK; size],
            depth: vec![f32::INFINITY; size],
            shadow: vec![0.0; size],
        }
    }

    fn clear(&mut self, background: Color) {
        self.color.fill(background);
        self.depth.fill(f32::INFINITY);
        self.shadow.fill(0.0);
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        (x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height)
            .then(|| y as usize * self.width as usize + x as usize)
    }

    /// Pixel-space bounding box of three points, clipped to the target
    fn clip_rect(&self, v: &[(f32, f32, f32); 3]) -> (i32, i32, i32, i32) {
        let min_x = v[0].0.min(v[1].0).min(v[2].0).floor().max(0.0) as i32;
        let max_x = v[0].0.max(v[1].0).max(v[2].0).ceil().min(self.width as f32 - 1.0) as i32;
        let min_y = v[0].1.min(v[1].1).min(v[2].1).floor().max(0.0) as i32;
        let max_y = v[0].1.max(v[1].1).max(v[2].1).ceil().min(self.height as f32 - 1.0) as i32;
        (min_x, max_x, min_y, max_y)
    }

    fn fill_triangle(&mut self, v: [(f32, f32, f32); 3], colors: [Color; 3]) {
        let (min_x, max_x, min_y, max_y) = self.clip_rect(&v);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = (x as f32 + 0.5, y as f32 + 0.5);
                let Some((w0, w1, w2)) = barycentric((v[0].0, v[0].1), (v[1].0, v[1].1), (v[2].0, v[2].1), p)
                else {
                    continue;
                };
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let depth = w0 * v[0].2 + w1 * v[1].2 + w2 * v[2].2;
                if depth > 1.0 {
                    continue;
                }
                let Some(idx) = self.index(x, y) else { continue };
                if depth < self.depth[idx] {
                    self.depth[idx] = depth;
                    self.color[idx] = Color::new(
                        w0 * colors[0].r + w1 * colors[1].r + w2 * colors[2].r,
                        w0 * colors[0].g + w1 * colors[1].g + w2 * colors[2].g,
                        w0 * colors[0].b + w1 * colors[1].b + w2 * colors[2].b,
                    );
                }
            }
        }
    }

    /// Mark shadowed ground pixels that are not hidden behind earlier geometry
    fn mark_shadow(&mut self, v: [(f32, f32, f32); 3]) {
        let (min_x, max_x, min_y, max_y) = self.clip_rect(&v);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = (x as f32 + 0.5, y as f32 + 0.5);
                let Some((w0, w1, w2)) = barycentric((v[0].0, v[0].1), (v[1].0, v[1].1), (v[2].0, v[2].1), p)
                else {
                    continue;
                };
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let depth = w0 * v[0].2 + w1 * v[1].2 + w2 * v[2].2;
                let Some(idx) = self.index(x, y) else { continue };
                if depth <= self.depth[idx] + LINE_DEPTH_BIAS {
                    self.shadow[idx] = 1.0;
                }
            }
        }
    }

    fn apply_shadow(&mut self, opacity: f32, soft: bool) {
        let mask = if soft { self.blurred_shadow() } else { self.shadow.clone() };
        for (color, shade) in self.color.iter_mut().zip(mask) {
            if shade > 0.0 {
                *color = color.scale(1.0 - opacity * shade);
            }
        }
    }

    /// 3x3 box filter over the shadow mask
    fn blurred_shadow(&self) -> Vec<f32> {
        let (w, h) = (self.width as i32, self.height as i32);
        let mut out = vec![0.0; self.shadow.len()];
        for y in 0..h {
            for x in 0..w {
                let mut sum = 0.0;
                let mut n = 0.0;
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        if let Some(i) = self.index(x + dx, y + dy) {
                            sum += self.shadow[i];
                            n += 1.0;
                        }
                    }
                }
                out[(y * w + x) as usize] = sum / n;
            }
        }
        out
    }

    /// Depth-tested segment between two clip-space points
    fn draw_line(&mut self, a: Vector4<f32>, b: Vector4<f32>, color: Color) {
        let Some((a, b)) = clip_near(a, b) else { return };
        let (w, h) = (self.width as f32, self.height as f32);
        let Some((a, b)) = clip_rect_2d(to_screen(&a, w, h), to_screen(&b, w, h), w, h) else {
            return;
        };

        let steps = (b.0 - a.0).abs().max((b.1 - a.1).abs()).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let x = a.0 + (b.0 - a.0) * t;
            let y = a.1 + (b.1 - a.1) * t;
            let z = a.2 + (b.2 - a.2) * t;
            if z > 1.0 {
                continue;
            }
            let Some(idx) = self.index(x.floor() as i32, y.floor() as i32) else {
                continue;
            };
            if z <= self.depth[idx] + LINE_DEPTH_BIAS {
                self.depth[idx] = self.depth[idx].min(z);
                self.color[idx] = color;
            }
        }
    }

    /// Box-filter `factor x factor` blocks into `out`
    fn resolve(&self, out: &mut FrameBuffer, factor: u32) {
        let samples = (factor * factor) as f32;
        for oy in 0..out.height {
            for ox in 0..out.width {
                let mut sum = Color::BLACK;
                for sy in 0..factor {
                    for sx in 0..factor {
                        let x = ox * factor + sx;
                        let y = oy * factor + sy;
                        let c = self.color[y as usize * self.width as usize + x as usize];
                        sum = Color::new(sum.r + c.r, sum.g + c.g, sum.b + c.b);
                    }
                }
                let [r, g, b] = sum.scale(1.0 / samples).to_rgb8();
                let i = (oy as usize * out.width as usize + ox as usize) * 4;
                out.rgba[i..i + 4].copy_from_slice(&[r, g, b, 255]);
            }
        }
    }
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(
    v0: (f32, f32),
    v1: (f32, f32),
    v2: (f32, f32),
    p: (f32, f32),
) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}

fn to_screen(clip: &Vector4<f32>, width: f32, height: f32) -> (f32, f32, f32) {
    let ndc = clip.xyz() / clip.w;
    (
        (ndc.x + 1.0) * 0.5 * width,
        (1.0 - ndc.y) * 0.5 * height,
        ndc.z,
    )
}

/// Cut the part of a segment that lies behind the eye
fn clip_near(a: Vector4<f32>, b: Vector4<f32>) -> Option<(Vector4<f32>, Vector4<f32>)> {
    match (a.w > NEAR_W, b.w > NEAR_W) {
        (true, true) => Some((a, b)),
        (false, false) => None,
        (true, false) => Some((a, a + (b - a) * ((NEAR_W - a.w) / (b.w - a.w)))),
        (false, true) => Some((b + (a - b) * ((NEAR_W - b.w) / (a.w - b.w)), b)),
    }
}

type ScreenPoint = (f32, f32, f32);

/// Liang-Barsky clip of a screen segment to `[0, w] x [0, h]`
fn clip_rect_2d(a: ScreenPoint, b: ScreenPoint, w: f32, h: f32) -> Option<(ScreenPoint, ScreenPoint)> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let mut t0: f32 = 0.0;
    let mut t1: f32 = 1.0;
    for (p, q) in [(-dx, a.0), (dx, w - a.0), (-dy, a.1), (dy, h - a.1)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }
    if t0 > t1 {
        return None;
    }
    let at = |t: f32| (a.0 + dx * t, a.1 + dy * t, a.2 + (b.2 - a.2) * t);
    Some((at(t0), at(t1)))
}

/// Rasterizes a scene into an internal target and resolves it to a [`FrameBuffer`].
///
/// Geometry data and material registrations are kept in a resource table
/// that lives until [`SoftwareRenderer::release`] or
/// [`SoftwareRenderer::dispose`].
pub struct SoftwareRenderer {
    options: RendererOptions,
    size: (u32, u32),
    target: Option<RenderTarget>,
    output: FrameBuffer,
    geometries: HashMap<GeometryId, GpuGeometry>,
    materials: HashSet<MaterialId>,
    frames: u64,
}

impl SoftwareRenderer {
    pub fn new(width: u32, height: u32, options: RendererOptions) -> Self {
        let mut renderer = Self {
            options,
            size: (width, height),
            target: None,
            output: FrameBuffer::new(0, 0),
            geometries: HashMap::new(),
            materials: HashSet::new(),
            frames: 0,
        };
        renderer.allocate_target();
        renderer
    }

    fn supersampling(&self) -> u32 {
        if self.options.antialias {
            2
        } else {
            1
        }
    }

    fn allocate_target(&mut self) {
        let (bw, bh) = self.drawing_buffer_size();
        let ss = self.supersampling();
        self.target = Some(RenderTarget::new(bw * ss, bh * ss));
        self.output = FrameBuffer::new(bw, bh);
    }

    /// Client size, before the pixel ratio
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.options.pixel_ratio).round() as u32).max(1);
        (scale(self.size.0), scale(self.size.1))
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        if self.target.is_some() {
            self.allocate_target();
        }
    }

    pub fn set_pixel_ratio(&mut self, ratio: f32) {
        self.options.pixel_ratio = ratio.max(f32::EPSILON);
        if self.target.is_some() {
            self.allocate_target();
        }
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Most recent frame
    pub fn frame(&self) -> &FrameBuffer {
        &self.output
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn is_disposed(&self) -> bool {
        self.target.is_none()
    }

    pub fn resources(&self) -> ResourceCounts {
        ResourceCounts {
            geometries: self.geometries.len(),
            materials: self.materials.len(),
            render_targets: usize::from(self.target.is_some()),
        }
    }

    /// Drop the resource-table entries of every mesh under `node`
    pub fn release(&mut self, node: &Node) {
        let mut released = 0;
        node.for_each_mesh(&mut |mesh| {
            released += usize::from(self.geometries.remove(&mesh.geometry.id()).is_some());
            self.materials.remove(&mesh.material.id());
        });
        debug!("released {released} geometries");
    }

    /// Free everything. Rendering becomes a no-op afterwards.
    pub fn dispose(&mut self) {
        self.geometries.clear();
        self.materials.clear();
        self.target = None;
        self.output = FrameBuffer::new(0, 0);
    }

    pub fn render(&mut self, scene: &Scene, camera: &Camera) {
        let ss = self.supersampling();
        let Some(target) = self.target.as_mut() else {
            return;
        };
        target.clear(scene.background);

        let view_proj = camera.view_projection();
        let clip = |p: Point3<f32>| view_proj * p.to_homogeneous();

        if scene.grid.visible {
            let half = scene.grid.size / 2.0;
            let divisions = scene.grid.divisions.max(1);
            let step = scene.grid.size / divisions as f32;
            for i in 0..=divisions {
                let k = -half + i as f32 * step;
                let color = if 2 * i == divisions {
                    scene.grid.center_color
                } else {
                    scene.grid.line_color
                };
                target.draw_line(clip(Point3::new(-half, 0.0, k)), clip(Point3::new(half, 0.0, k)), color);
                target.draw_line(clip(Point3::new(k, 0.0, -half)), clip(Point3::new(k, 0.0, half)), color);
            }
        }

        let shadows_on = self.options.shadows != ShadowQuality::Off
            && scene.sun.cast_shadow
            && scene.ground.visible
            && scene.ground.receive_shadow;
        if let (true, Some(model)) = (shadows_on, scene.model()) {
            cast_ground_shadow(target, scene, &model.content, &model.matrix(), &view_proj);
            target.apply_shadow(
                scene.ground.shadow_opacity,
                self.options.shadows == ShadowQuality::Soft,
            );
        }

        if scene.axes.visible {
            let s = scene.axes.size;
            let ends = [Point3::new(s, 0.0, 0.0), Point3::new(0.0, s, 0.0), Point3::new(0.0, 0.0, s)];
            for (end, hex) in ends.into_iter().zip(AXIS_COLORS) {
                target.draw_line(clip(Point3::origin()), clip(end), Color::from_hex_u32(hex));
            }
        }

        if let Some(model) = scene.model() {
            let lights = Lights::from_scene(scene);
            let (tw, th) = (target.width, target.height);
            let geometries = &mut self.geometries;
            let materials = &mut self.materials;
            model.content.visit_meshes(&model.matrix(), &mut |mesh, world| {
                let gpu = geometries
                    .entry(mesh.geometry.id())
                    .or_insert_with(|| GpuGeometry::upload(mesh.geometry.mesh()));
                materials.insert(mesh.material.id());
                draw_mesh(target, gpu, mesh, world, &view_proj, &lights, (tw, th));
            });
        }

        target.resolve(&mut self.output, ss);
        self.frames += 1;
    }
}

fn draw_mesh(
    target: &mut RenderTarget,
    gpu: &GpuGeometry,
    mesh: &MeshNode,
    world: &Matrix4<f32>,
    view_proj: &Matrix4<f32>,
    lights: &Lights,
    (tw, th): (u32, u32),
) {
    let linear: Matrix3<f32> = world.fixed_view::<3, 3>(0, 0).clone_owned();
    let normal_matrix = linear
        .try_inverse()
        .map(|m| m.transpose())
        .unwrap_or_else(Matrix3::identity);
    let material = &mesh.material;

    for (triangle, face_normal) in mesh.geometry.mesh().triangles.iter().zip(&gpu.face_normals) {
        let world_face = (normal_matrix * face_normal)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::zeros);

        let mut screen = [(0.0, 0.0, 0.0); 3];
        let mut colors = [Color::BLACK; 3];
        let mut clips = [Vector4::zeros(); 3];
        let mut visible = true;
        for (k, vertex) in triangle.vertices.iter().enumerate() {
            let p = world.transform_point(&vertex.position);
            clips[k] = view_proj * p.to_homogeneous();
            match Camera::project_to_screen(view_proj, &p, tw, th) {
                Some(sp) => screen[k] = (sp.x, sp.y, sp.depth),
                None => visible = false,
            }
            let n = (normal_matrix * vertex.normal)
                .try_normalize(f32::EPSILON)
                .unwrap_or(world_face);
            colors[k] = lights.shade(material.color, &n);
        }

        if material.wireframe {
            let edge_color = lights.shade(material.color, &world_face);
            for (a, b) in [(0, 1), (1, 2), (2, 0)] {
                target.draw_line(clips[a], clips[b], edge_color);
            }
        } else if visible {
            target.fill_triangle(screen, colors);
        }
    }
}

/// Project every triangle onto `y = 0` along the sun direction and mark the
/// ground pixels it covers, limited to the light's shadow frustum.
fn cast_ground_shadow(
    target: &mut RenderTarget,
    scene: &Scene,
    content: &Node,
    model_matrix: &Matrix4<f32>,
    view_proj: &Matrix4<f32>,
) {
    let dir = scene.sun.direction();
    if dir.y > -1e-6 {
        return;
    }
    let light_view = scene.sun.view_matrix();
    let frustum = scene.sun.shadow;
    let (tw, th) = (target.width, target.height);

    content.visit_meshes(model_matrix, &mut |mesh, world| {
        'triangles: for triangle in &mesh.geometry.mesh().triangles {
            let mut screen = [(0.0, 0.0, 0.0); 3];
            for (k, vertex) in triangle.vertices.iter().enumerate() {
                let p = world.transform_point(&vertex.position);
                let on_ground = p + dir * (-p.y / dir.y);
                let in_light = light_view.transform_point(&on_ground);
                if in_light.x < frustum.left
                    || in_light.x > frustum.right
                    || in_light.y < frustum.bottom
                    || in_light.y > frustum.top
                {
                    continue 'triangles;
                }
                match Camera::project_to_screen(view_proj, &on_ground, tw, th) {
                    Some(sp) => screen[k] = (sp.x, sp.y, sp.depth),
                    None => continue 'triangles,
                }
            }
            target.mark_shadow(screen);
        }
    });
}
