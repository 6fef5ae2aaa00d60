/// Scene graph: the model hierarchy plus the singleton lights and helpers
use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::{Matrix4, Point3, Vector3};

use crate::color::Color;
use crate::geometry::{Aabb, Mesh};
use crate::loader::MeshFormat;
use crate::transform::Transform;

static NEXT_GEOMETRY: AtomicU64 = AtomicU64::new(1);
static NEXT_MATERIAL: AtomicU64 = AtomicU64::new(1);

/// Identity of an uploaded geometry in the renderer's resource table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(u64);

/// Identity of a material in the renderer's resource table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

/// Immutable vertex data. Appearance changes never touch it.
#[derive(Debug, Clone)]
pub struct Geometry {
    id: GeometryId,
    mesh: Mesh,
}

impl Geometry {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            id: GeometryId(NEXT_GEOMETRY.fetch_add(1, Ordering::Relaxed)),
            mesh,
        }
    }

    pub fn id(&self) -> GeometryId {
        self.id
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    /// Whatever the source format came with; discarded right after load.
    Native,
    /// Lit material driven by the viewer's color and wireframe settings.
    Standard,
}

#[derive(Debug, Clone)]
pub struct Material {
    id: MaterialId,
    pub kind: MaterialKind,
    pub color: Color,
    pub wireframe: bool,
}

impl Material {
    fn with_kind(kind: MaterialKind, color: Color, wireframe: bool) -> Self {
        Self {
            id: MaterialId(NEXT_MATERIAL.fetch_add(1, Ordering::Relaxed)),
            kind,
            color,
            wireframe,
        }
    }

    pub fn native() -> Self {
        Self::with_kind(MaterialKind::Native, Color::WHITE, false)
    }

    pub fn standard(color: Color, wireframe: bool) -> Self {
        Self::with_kind(MaterialKind::Standard, color, wireframe)
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }
}

#[derive(Debug, Clone)]
pub struct MeshNode {
    pub geometry: Geometry,
    pub material: Material,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group(Vec<Node>),
    Mesh(MeshNode),
}

/// A node in a loaded model hierarchy
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub visible: bool,
    pub kind: NodeKind,
}

impl Node {
    pub fn group(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::identity(),
            visible: true,
            kind: NodeKind::Group(children),
        }
    }

    pub fn mesh(name: impl Into<String>, mesh: Mesh, material: Material) -> Self {
        Self {
            name: name.into(),
            transform: Transform::identity(),
            visible: true,
            kind: NodeKind::Mesh(MeshNode {
                geometry: Geometry::new(mesh),
                material,
            }),
        }
    }

    /// Depth-first walk over visible meshes with their accumulated matrix.
    pub fn visit_meshes<F>(&self, parent: &Matrix4<f32>, f: &mut F)
    where
        F: FnMut(&MeshNode, &Matrix4<f32>),
    {
        if !self.visible {
            return;
        }
        let world = parent * self.transform.matrix();
        match &self.kind {
            NodeKind::Group(children) => {
                for child in children {
                    child.visit_meshes(&world, f);
                }
            }
            NodeKind::Mesh(mesh) => f(mesh, &world),
        }
    }

    /// Every mesh node, hidden ones included.
    pub fn for_each_mesh_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut MeshNode),
    {
        match &mut self.kind {
            NodeKind::Group(children) => {
                for child in children {
                    child.for_each_mesh_mut(f);
                }
            }
            NodeKind::Mesh(mesh) => f(mesh),
        }
    }

    pub fn for_each_mesh<F>(&self, f: &mut F)
    where
        F: FnMut(&MeshNode),
    {
        match &self.kind {
            NodeKind::Group(children) => {
                for child in children {
                    child.for_each_mesh(f);
                }
            }
            NodeKind::Mesh(mesh) => f(mesh),
        }
    }

    /// Bounds of the whole hierarchy under `parent`
    pub fn bounding_box(&self, parent: &Matrix4<f32>) -> Option<Aabb> {
        let world = parent * self.transform.matrix();
        match &self.kind {
            NodeKind::Group(children) => children
                .iter()
                .filter_map(|c| c.bounding_box(&world))
                .reduce(|a, b| a.union(&b)),
            NodeKind::Mesh(mesh) => {
                // Transform every vertex rather than the local box so rotated
                // meshes get a tight fit.
                Aabb::from_points(mesh.geometry.mesh().triangles.iter().flat_map(|t| {
                    t.vertices.iter().map(move |v| world.transform_point(&v.position))
                }))
            }
        }
    }

    pub fn triangle_count(&self) -> usize {
        let mut n = 0;
        self.for_each_mesh(&mut |m| n += m.geometry.mesh().triangle_count());
        n
    }

    pub fn vertex_count(&self) -> usize {
        let mut n = 0;
        self.for_each_mesh(&mut |m| n += m.geometry.mesh().vertex_count());
        n
    }
}

/// The single loaded model: its content plus the two transforms that place it.
///
/// `normalization` is written once per load; `transform` belongs to the user
/// and is composed on top, so user scale multiplies the normalized size.
#[derive(Debug, Clone)]
pub struct Model {
    pub url: String,
    pub format: MeshFormat,
    pub transform: Transform,
    pub normalization: Transform,
    pub content: Node,
}

impl Model {
    pub fn new(url: impl Into<String>, format: MeshFormat, content: Node) -> Self {
        Self {
            url: url.into(),
            format,
            transform: Transform::identity(),
            normalization: Transform::identity(),
            content,
        }
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        self.transform.matrix() * self.normalization.matrix()
    }

    pub fn world_bounds(&self) -> Option<Aabb> {
        self.content.bounding_box(&self.matrix())
    }
}

#[derive(Debug, Clone)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

/// Orthographic box the directional light casts shadows within
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowFrustum {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub near: f32,
    pub far: f32,
    pub map_size: u32,
}

impl Default for ShadowFrustum {
    fn default() -> Self {
        Self {
            left: -10.0,
            right: 10.0,
            top: 10.0,
            bottom: -10.0,
            near: 0.5,
            far: 50.0,
            map_size: 2048,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub color: Color,
    pub intensity: f32,
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub cast_shadow: bool,
    pub shadow: ShadowFrustum,
}

impl DirectionalLight {
    /// Unit vector the light travels along
    pub fn direction(&self) -> Vector3<f32> {
        (self.target - self.position)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| -Vector3::y())
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &self.target, &Vector3::y())
    }
}

/// Invisible plane at `y = 0` that only shows shadows
#[derive(Debug, Clone)]
pub struct GroundPlane {
    pub size: f32,
    pub shadow_opacity: f32,
    pub receive_shadow: bool,
    pub visible: bool,
}

#[derive(Debug, Clone)]
pub struct GridHelper {
    pub size: f32,
    pub divisions: u32,
    pub center_color: Color,
    pub line_color: Color,
    pub visible: bool,
}

#[derive(Debug, Clone)]
pub struct AxesHelper {
    pub size: f32,
    pub visible: bool,
}

/// Everything drawn each frame.
///
/// Lights and helpers are created once with the scene and only ever mutated.
/// The model slot can only be filled or emptied from inside the crate, by
/// the ingestion pipeline.
#[derive(Debug)]
pub struct Scene {
    pub background: Color,
    pub ambient: AmbientLight,
    pub sun: DirectionalLight,
    pub ground: GroundPlane,
    pub grid: GridHelper,
    pub axes: AxesHelper,
    model: Option<Model>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            background: Color::BLACK,
            ambient: AmbientLight {
                color: Color::WHITE,
                intensity: 1.0,
            },
            sun: DirectionalLight {
                color: Color::WHITE,
                intensity: 1.0,
                position: Point3::new(5.0, 10.0, 7.5),
                target: Point3::origin(),
                cast_shadow: true,
                shadow: ShadowFrustum::default(),
            },
            ground: GroundPlane {
                size: 50.0,
                shadow_opacity: 0.3,
                receive_shadow: true,
                visible: true,
            },
            grid: GridHelper {
                size: 50.0,
                divisions: 50,
                center_color: Color::from_hex_u32(0x444444),
                line_color: Color::from_hex_u32(0x888888),
                visible: true,
            },
            axes: AxesHelper {
                size: 5.0,
                visible: true,
            },
            model: None,
        }
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut Model> {
        self.model.as_mut()
    }

    /// Put `model` in the slot, handing back whatever was there.
    pub(crate) fn attach_model(&mut self, model: Model) -> Option<Model> {
        self.model.replace(model)
    }

    pub(crate) fn detach_model(&mut self) -> Option<Model> {
        self.model.take()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
