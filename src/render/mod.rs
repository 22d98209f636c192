//! Draw list construction plus the wgpu backend that consumes it.

mod native;

use glam::{Mat4, Vec3, Vec4};

use crate::effects::EffectInstance;
use crate::model::{ModelTree, NodeId};

pub use native::Renderer;

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl LightParams {
    /// White light that follows the camera.
    pub fn headlight(eye: Vec3) -> Self {
        Self {
            position: eye,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshSource {
    Node(NodeId),
    /// Unit cube centred on the origin.
    Cube,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub mesh: MeshSource,
    pub model: Mat4,
    pub color: Vec4,
}

impl DrawItem {
    pub fn is_translucent(&self) -> bool {
        self.color.w < 1.0
    }
}

/// Visible meshes of `model` followed by effect cubes. Translucent items
/// (skin, fat layers) are moved to the end so they blend over everything else.
pub fn draw_items(model: Option<&ModelTree>, effects: &[EffectInstance]) -> Vec<DrawItem> {
    let mut items: Vec<DrawItem> = model
        .map(|tree| {
            tree.mesh_ids()
                .filter(|id| tree.is_effectively_visible(*id))
                .map(|id| {
                    let node = tree.node(id);
                    DrawItem {
                        mesh: MeshSource::Node(id),
                        model: tree.world_matrix(id),
                        color: node.color.extend(node.opacity),
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    items.extend(effects.iter().map(|effect| DrawItem {
        mesh: MeshSource::Cube,
        model: Mat4::from_scale_rotation_translation(
            Vec3::splat(effect.radius * 2.0),
            glam::Quat::IDENTITY,
            effect.position,
        ),
        color: effect.color.extend(1.0),
    }));
    items.sort_by_key(DrawItem::is_translucent);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::cube_mesh;

    #[test]
    fn hidden_and_empty_nodes_are_skipped() {
        let mut tree = ModelTree::new("root");
        let root = tree.root();
        let shown = tree.add_child(root, "shown");
        tree.node_mut(shown).geometry = Some(cube_mesh(Vec3::ZERO, 1.0));
        tree.node_mut(shown).color = Vec3::new(1.0, 0.0, 0.0);
        let group = tree.add_child(root, "group");
        let hidden = tree.add_child(group, "hidden");
        tree.node_mut(hidden).geometry = Some(cube_mesh(Vec3::ZERO, 1.0));
        tree.set_visible(group, false);

        let items = draw_items(Some(&tree), &[]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].mesh, MeshSource::Node(shown));
        assert_eq!(items[0].color, Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn translucent_meshes_draw_last() {
        let mut tree = ModelTree::new("root");
        let root = tree.root();
        let skin = tree.add_child(root, "Skin");
        tree.node_mut(skin).geometry = Some(cube_mesh(Vec3::ZERO, 2.0));
        tree.node_mut(skin).opacity = 0.4;
        let heart = tree.add_child(root, "Heart");
        tree.node_mut(heart).geometry = Some(cube_mesh(Vec3::ZERO, 0.2));
        let marker = EffectInstance {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            radius: 0.05,
        };

        let items = draw_items(Some(&tree), &[marker]);
        let order: Vec<MeshSource> = items.iter().map(|item| item.mesh).collect();
        assert_eq!(
            order,
            vec![MeshSource::Node(heart), MeshSource::Cube, MeshSource::Node(skin)]
        );
        assert!(items[2].is_translucent());
    }

    #[test]
    fn effects_become_scaled_cubes() {
        let effect = EffectInstance {
            position: Vec3::new(1.0, 2.0, 3.0),
            color: Vec3::ONE,
            radius: 0.05,
        };
        let items = draw_items(None, &[effect]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].mesh, MeshSource::Cube);
        let corner = items[0].model.transform_point3(Vec3::splat(0.5));
        assert!((corner - Vec3::new(1.05, 2.05, 3.05)).length() < 1e-6);
    }
}
