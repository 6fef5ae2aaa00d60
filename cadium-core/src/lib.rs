/// CADium Core Library - viewport synchronization and model ingestion
///
/// This library owns the persistent scene a model viewer draws every frame:
/// mesh loading (OBJ, STL), normalization to a common size, the software
/// renderer and orbit camera, and the synchronizers that keep the scene in
/// step with a stream of configuration changes.

pub mod color;
pub mod config;
pub mod controls;
pub mod error;
pub mod geometry;
pub mod ingest;
pub mod loader;
pub mod normalize;
pub mod obj;
pub mod projection;
pub mod render;
pub mod scene;
pub mod screenshot;
pub mod stl;
pub mod surface;
pub mod sync;
pub mod transform;
pub mod viewport;

// Re-export commonly used types
pub use color::Color;
pub use config::{Configuration, LoadMode, LoadPolicy, ShadowQuality, Vec3Config, ViewportOptions};
pub use error::{ViewerError, ViewerResult};
pub use geometry::{Aabb, Mesh, Triangle, Vertex};
pub use ingest::LoadState;
pub use loader::{FileFetcher, Fetch, LoaderRegistry, MeshFormat};
pub use normalize::TARGET_SIZE;
pub use projection::Camera;
pub use render::{FrameBuffer, ResourceCounts, SoftwareRenderer};
pub use screenshot::Screenshot;
pub use surface::{HeadlessTarget, MountTarget};
pub use transform::{RotationState, Transform};
pub use viewport::{Viewport, ViewportEvent};
