use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::obj::ObjMesh;

/// Index of a node inside a [`ModelTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Axis aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Bounds of the eight transformed corners.
    pub fn transformed(&self, matrix: Mat4) -> Aabb {
        let corners = (0..8).map(|i| {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            matrix.transform_point3(corner)
        });
        // eight corners always exist
        Aabb::from_points(corners).unwrap_or(*self)
    }

    /// Slab test. Returns the entry distance along the ray when it hits.
    pub fn ray_entry(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let inv = direction.recip();
        let t1 = (self.min - origin) * inv;
        let t2 = (self.max - origin) * inv;
        let near = t1.min(t2).max_element();
        let far = t1.max(t2).min_element();
        (far >= near.max(0.0)).then_some(near.max(0.0))
    }
}

/// Single node of the loaded model hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelNode {
    pub name: String,
    pub visible: bool,
    pub geometry: Option<ObjMesh>,
    pub local: Mat4,
    pub material: Option<String>,
    pub color: Vec3,
    pub opacity: f32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ModelNode {
    fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            geometry: None,
            local: Mat4::IDENTITY,
            material: None,
            color: Vec3::ONE,
            opacity: 1.0,
            parent,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_mesh(&self) -> bool {
        self.geometry.is_some()
    }

    /// Object-space bounds of the node's own geometry.
    pub fn local_bounds(&self) -> Option<Aabb> {
        self.geometry
            .as_ref()
            .and_then(|mesh| Aabb::from_points(mesh.positions()))
    }
}

/// Arena backed scene graph. The root always exists at index zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTree {
    nodes: Vec<ModelNode>,
}

impl ModelTree {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![ModelNode::new(root_name, None)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Appends a child node and returns its id.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ModelNode::new(name, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &ModelNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ModelNode {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&ModelNode> {
        self.nodes.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.name == name)
            .map(NodeId)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn mesh_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids().filter(|id| self.node(*id).is_mesh())
    }

    /// Depth-first pre-order walk starting at (and including) `start`.
    pub fn descendants(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cursor = self.node(id).parent;
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.node(parent).parent;
        }
        depth
    }

    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let node = self.node(id);
        match node.parent {
            Some(parent) => self.world_matrix(parent) * node.local,
            None => node.local,
        }
    }

    /// A node renders only if it and all of its ancestors are visible.
    pub fn is_effectively_visible(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current);
            if !node.visible {
                return false;
            }
            cursor = node.parent;
        }
        true
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        self.nodes[id.0].visible = visible;
    }

    pub fn hide_subtree(&mut self, id: NodeId) {
        for node in self.descendants(id) {
            self.nodes[node.0].visible = false;
        }
    }

    /// Object-space bounding box centre transformed to world space.
    pub fn world_center(&self, id: NodeId) -> Option<Vec3> {
        let bounds = self.node(id).local_bounds()?;
        Some(self.world_matrix(id).transform_point3(bounds.center()))
    }

    pub fn world_bounds(&self, id: NodeId) -> Option<Aabb> {
        let bounds = self.node(id).local_bounds()?;
        Some(bounds.transformed(self.world_matrix(id)))
    }

    /// Union of the world bounds of every mesh in the tree.
    pub fn bounds(&self) -> Option<Aabb> {
        self.mesh_ids()
            .filter_map(|id| self.world_bounds(id))
            .reduce(|acc, bounds| acc.union(&bounds))
    }

    /// Indented listing of the hierarchy, one node per line.
    pub fn hierarchy_lines(&self) -> Vec<String> {
        self.descendants(self.root())
            .into_iter()
            .map(|id| {
                let node = self.node(id);
                let kind = if node.is_mesh() { "Mesh" } else { "Group" };
                format!("{}{} (Type: {kind})", "  ".repeat(self.depth(id)), node.name)
            })
            .collect()
    }
}
