use glam::Vec3;

use crate::model::{ModelTree, NodeId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Creates a ray; the direction is normalised.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub node: NodeId,
    pub point: Vec3,
    pub distance: f32,
}

/// Finds which of `candidates` a ray passes through, nearest first.
pub trait HitTester {
    fn cast_ray(&self, ray: &Ray, model: &ModelTree, candidates: &[NodeId]) -> Vec<RayHit>;
}

/// Exact triangle hit-testing against mesh geometry in world space.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeshRaycaster;

impl HitTester for MeshRaycaster {
    fn cast_ray(&self, ray: &Ray, model: &ModelTree, candidates: &[NodeId]) -> Vec<RayHit> {
        let mut hits: Vec<RayHit> = candidates
            .iter()
            .filter_map(|id| nearest_hit(ray, model, *id))
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

fn nearest_hit(ray: &Ray, model: &ModelTree, id: NodeId) -> Option<RayHit> {
    let node = model.get(id)?;
    let mesh = node.geometry.as_ref()?;
    let bounds = model.world_bounds(id)?;
    bounds.ray_entry(ray.origin, ray.direction)?;

    let world = model.world_matrix(id);
    mesh.triangles()
        .filter_map(|[a, b, c]| {
            intersect_triangle(
                ray,
                world.transform_point3(a),
                world.transform_point3(b),
                world.transform_point3(c),
            )
        })
        .min_by(|a, b| a.total_cmp(b))
        .map(|distance| RayHit {
            node: id,
            point: ray.at(distance),
            distance,
        })
}

/// Möller–Trumbore; both faces count as hits.
fn intersect_triangle(ray: &Ray, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;
    let edge1 = b - a;
    let edge2 = c - a;
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    (t > EPSILON).then_some(t)
}
