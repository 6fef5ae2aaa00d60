/// Synchronizers: push configuration fields onto the live scene
use log::debug;
use nalgebra::Vector3;

use crate::config::Configuration;
use crate::scene::{Material, MaterialKind, Model, Scene};
use crate::transform::RotationState;

/// Apply `color` and `wireframe` to every mesh of the current model.
///
/// With `fresh` set (right after a load) every material is replaced by a
/// standard one so the source format's own material is dropped. Otherwise
/// existing materials are updated in place. Without a model this does nothing.
pub fn apply_appearance(scene: &mut Scene, config: &Configuration, fresh: bool) {
    if let Some(model) = scene.model_mut() {
        style_model(model, config, fresh);
    }
}

pub(crate) fn style_model(model: &mut Model, config: &Configuration, fresh: bool) {
    let mut touched = 0;
    model.content.for_each_mesh_mut(&mut |mesh| {
        if fresh || mesh.material.kind == MaterialKind::Native {
            mesh.material = Material::standard(config.color, config.wireframe);
        } else {
            mesh.material.color = config.color;
            mesh.material.wireframe = config.wireframe;
        }
        touched += 1;
    });
    debug!("appearance applied to {touched} meshes (fresh: {fresh})");
}

/// Apply position, rotation (degrees) and uniform scale to the model root.
///
/// Only the user transform is written; the normalization transform below it
/// is left alone, so the user scale multiplies the normalized size.
pub fn apply_transform(scene: &mut Scene, config: &Configuration) {
    if let Some(model) = scene.model_mut() {
        place_model(model, config);
    }
}

pub(crate) fn place_model(model: &mut Model, config: &Configuration) {
    let p = config.position;
    let r = config.rotation;
    model.transform.position = Vector3::new(p.x, p.y, p.z);
    model.transform.rotation = RotationState::from_degrees(r.x, r.y, r.z);
    model.transform.set_uniform_scale(config.scale);
}

/// Apply background, light intensities and helper visibility.
pub fn apply_environment(scene: &mut Scene, config: &Configuration) {
    scene.background = config.background_color;
    scene.ambient.intensity = config.ambient_intensity;
    scene.sun.intensity = config.directional_intensity;
    scene.grid.visible = config.show_grid;
    scene.axes.visible = config.show_axes;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::config::Vec3Config;
    use crate::geometry::Mesh;
    use crate::loader::MeshFormat;
    use crate::normalize::{normalize, TARGET_SIZE};
    use crate::scene::{MeshNode, Node};

    fn scene_with_model() -> Scene {
        let mut scene = Scene::new();
        let content = Node::group(
            "parts",
            vec![
                Node::mesh("a", Mesh::cube(2.0), Material::native()),
                Node::mesh("b", Mesh::cuboid(1.0, 3.0, 1.0), Material::native()),
            ],
        );
        let mut model = Model::new("parts.obj", MeshFormat::Obj, content);
        model.normalization = normalize(&model.content, model.format).unwrap();
        scene.attach_model(model);
        scene
    }

    fn materials(scene: &Scene) -> Vec<Material> {
        let mut out = Vec::new();
        scene
            .model()
            .unwrap()
            .content
            .for_each_mesh(&mut |m: &MeshNode| out.push(m.material.clone()));
        out
    }

    #[test]
    fn test_appearance_without_model_is_noop() {
        let mut scene = Scene::new();
        apply_appearance(&mut scene, &Configuration::default(), true);
        apply_transform(&mut scene, &Configuration::default());
        assert!(scene.model().is_none());
    }

    #[test]
    fn test_fresh_appearance_replaces_native_materials() {
        let mut scene = scene_with_model();
        let before: Vec<_> = materials(&scene).iter().map(|m| m.id()).collect();
        apply_appearance(&mut scene, &Configuration::default(), true);

        let after = materials(&scene);
        assert!(after.iter().all(|m| m.kind == MaterialKind::Standard));
        assert!(after.iter().all(|m| !before.contains(&m.id())));
        assert!(after.iter().all(|m| m.color == Color::from_hex_u32(0xC8C8C8)));
    }

    #[test]
    fn test_later_appearance_mutates_in_place() {
        let mut scene = scene_with_model();
        apply_appearance(&mut scene, &Configuration::default(), true);
        let ids: Vec<_> = materials(&scene).iter().map(|m| m.id()).collect();
        let triangles = scene.model().unwrap().content.triangle_count();

        let mut config = Configuration::default();
        for i in 0..10 {
            config.wireframe = i % 2 == 0;
            config.color = Color::from_rgb8(i * 20, 0, 255 - i * 20);
            apply_appearance(&mut scene, &config, false);
        }

        let after = materials(&scene);
        assert_eq!(after.iter().map(|m| m.id()).collect::<Vec<_>>(), ids);
        assert!(after.iter().all(|m| !m.wireframe && m.color == config.color));
        assert_eq!(scene.model().unwrap().content.triangle_count(), triangles);
    }

    #[test]
    fn test_user_scale_multiplies_normalized_size() {
        let mut scene = scene_with_model();
        let config = Configuration {
            scale: 2.0,
            position: Vec3Config { x: 1.0, y: 0.0, z: -1.0 },
            ..Configuration::default()
        };
        apply_transform(&mut scene, &config);

        let bb = scene.model().unwrap().world_bounds().unwrap();
        assert!((bb.max_dimension() - 2.0 * TARGET_SIZE).abs() < 1e-3);
        assert!((bb.center().x - 1.0).abs() < 1e-3);
        assert!(bb.min.y.abs() < 1e-3);
    }

    #[test]
    fn test_rotation_is_converted_from_degrees() {
        let mut scene = scene_with_model();
        let config = Configuration {
            rotation: Vec3Config { x: 0.0, y: 90.0, z: 0.0 },
            ..Configuration::default()
        };
        apply_transform(&mut scene, &config);
        let rotation = scene.model().unwrap().transform.rotation;
        assert!((rotation.y - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_environment_mutates_singletons() {
        let mut scene = Scene::new();
        let config = Configuration {
            background_color: Color::WHITE,
            show_grid: false,
            show_axes: false,
            ambient_intensity: 0.25,
            directional_intensity: 4.0,
            ..Configuration::default()
        };
        apply_environment(&mut scene, &config);
        assert_eq!(scene.background, Color::WHITE);
        assert!(!scene.grid.visible && !scene.axes.visible);
        assert_eq!(scene.ambient.intensity, 0.25);
        assert_eq!(scene.sun.intensity, 4.0);
    }
}
