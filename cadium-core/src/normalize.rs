/// Normalization: bring any loaded model to a common size and resting place
use nalgebra::Vector3;

use crate::error::ViewerError;
use crate::loader::MeshFormat;
use crate::scene::Node;
use crate::transform::{RotationState, Transform};

/// Edge length of the cube every model is scaled to fit
pub const TARGET_SIZE: f32 = 5.0;

/// Largest dimension below which a model counts as zero-volume
const DEGENERATE_EPSILON: f32 = 1e-9;

/// Compute the normalization transform for freshly loaded `content`.
///
/// In order: scale the largest dimension to [`TARGET_SIZE`], move the box
/// center to the origin, lift so the lowest point sits on `y = 0`. The
/// format's corrective rotation is part of the result and the box is measured
/// in the corrected frame, so a Z-up model still rests on the ground.
pub fn normalize(content: &Node, format: MeshFormat) -> Result<Transform, ViewerError> {
    let rotation = format
        .corrective_rotation_x()
        .map_or_else(RotationState::zero, |angle| RotationState::new(angle, 0.0, 0.0));
    let bounds = content
        .bounding_box(&rotation.matrix())
        .ok_or(ViewerError::DegenerateGeometry { max_dimension: 0.0 })?;

    let size = bounds.size();
    let max_dimension = bounds.max_dimension();
    if !max_dimension.is_finite() || max_dimension <= DEGENERATE_EPSILON {
        return Err(ViewerError::DegenerateGeometry { max_dimension });
    }

    let scale_factor = TARGET_SIZE / max_dimension;
    let mut transform = Transform::identity();

    transform.set_uniform_scale(scale_factor);
    transform.position -= bounds.center().coords * scale_factor;
    transform.position += Vector3::new(0.0, size.y * scale_factor / 2.0, 0.0);
    transform.rotation = rotation;

    Ok(transform)
}
