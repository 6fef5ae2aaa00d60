/// Loader registry: file extension to parser, plus the fetch seam
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ViewerError;
use crate::geometry::Mesh;
use crate::scene::Node;
use crate::{obj, stl};

/// Mesh formats the viewer can ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    Obj,
    Stl,
}

impl MeshFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "obj" => Some(Self::Obj),
            "stl" => Some(Self::Stl),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Obj => "obj",
            Self::Stl => "stl",
        }
    }

    /// Rotation about X that brings the format's up axis onto +Y.
    ///
    /// STL files are conventionally authored Z-up.
    pub fn corrective_rotation_x(self) -> Option<f32> {
        match self {
            Self::Obj => None,
            Self::Stl => Some(-std::f32::consts::FRAC_PI_2),
        }
    }
}

impl fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Lowercased extension of the last path segment of a URL or path.
///
/// Query strings and fragments are ignored, so
/// `https://host/models/part.STL?token=1` yields `stl`.
pub fn extension_of(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// What a parser hands back
#[derive(Debug, Clone)]
pub enum Parsed {
    /// A ready hierarchy whose materials still need replacing.
    Object(Node),
    /// Bare triangles that the caller wraps in a mesh node.
    Geometry(Mesh),
}

pub trait MeshParser: Send + Sync {
    fn format(&self) -> MeshFormat;
    fn parse(&self, bytes: &[u8]) -> Result<Parsed, ViewerError>;
}

pub struct ObjParser;

impl MeshParser for ObjParser {
    fn format(&self) -> MeshFormat {
        MeshFormat::Obj
    }

    fn parse(&self, bytes: &[u8]) -> Result<Parsed, ViewerError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ViewerError::parse(MeshFormat::Obj, format!("not UTF-8 text: {e}")))?;
        obj::parse_obj(text).map(Parsed::Object)
    }
}

pub struct StlParser;

impl MeshParser for StlParser {
    fn format(&self) -> MeshFormat {
        MeshFormat::Stl
    }

    fn parse(&self, bytes: &[u8]) -> Result<Parsed, ViewerError> {
        stl::parse_stl(bytes).map(Parsed::Geometry)
    }
}

/// Extension to parser table
pub struct LoaderRegistry {
    parsers: HashMap<String, Arc<dyn MeshParser>>,
}

impl LoaderRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn register(&mut self, extension: &str, parser: Arc<dyn MeshParser>) {
        self.parsers.insert(extension.to_ascii_lowercase(), parser);
    }

    pub fn resolve(&self, extension: &str) -> Option<Arc<dyn MeshParser>> {
        self.parsers.get(&extension.to_ascii_lowercase()).cloned()
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("obj", Arc::new(ObjParser));
        registry.register("stl", Arc::new(StlParser));
        registry
    }
}

/// Retrieves the raw bytes behind a model URL.
///
/// Runs on a loader thread, so implementations must be shareable.
pub trait Fetch: Send + Sync {
    /// Fails with [`ViewerError::TooLarge`] once more than `limit` bytes arrive.
    fn fetch(&self, url: &str, limit: u64) -> Result<Vec<u8>, ViewerError>;
}

/// Reads `file://` URLs and bare filesystem paths
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

impl Fetch for FileFetcher {
    fn fetch(&self, url: &str, limit: u64) -> Result<Vec<u8>, ViewerError> {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        let file = std::fs::File::open(path).map_err(|e| ViewerError::fetch(url, e))?;
        read_limited(file, url, limit)
    }
}

/// Read at most `limit` bytes, failing rather than truncating.
pub fn read_limited(reader: impl Read, url: &str, limit: u64) -> Result<Vec<u8>, ViewerError> {
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| ViewerError::fetch(url, e))?;
    if bytes.len() as u64 > limit {
        return Err(ViewerError::TooLarge {
            bytes: bytes.len() as u64,
            limit,
        });
    }
    Ok(bytes)
}
