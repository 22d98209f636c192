use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::model::{ModelTree, NodeId};

/// GPU ready mesh buffers produced from an OBJ file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjMesh {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl ObjMesh {
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices
            .chunks_exact(6)
            .map(|chunk| Vec3::new(chunk[0], chunk[1], chunk[2]))
    }

    pub fn position(&self, index: u32) -> Vec3 {
        let start = index as usize * 6;
        Vec3::from_slice(&self.vertices[start..start + 3])
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|tri| [self.position(tri[0]), self.position(tri[1]), self.position(tri[2])])
    }
}

/// Surface parameters read from an MTL library.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub diffuse: Vec3,
    pub opacity: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec3::ONE,
            opacity: 1.0,
        }
    }
}

/// Node hierarchy parsed from an OBJ file plus the material libraries it references.
#[derive(Debug, Clone)]
pub struct ObjModel {
    pub tree: ModelTree,
    pub material_libraries: Vec<String>,
}

/// Parses an OBJ file into a node tree.
///
/// `o` statements open a child of the root, `g` statements open a child of the
/// current `o` node (or of the root when no object is open). Faces belong to
/// whichever node was opened last; nodes without faces carry no geometry.
/// Vertices are laid out as `position.xyz` followed by `normal.xyz`.
pub fn load_obj_model(data: &str, root_name: &str) -> Result<ObjModel> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut tree = ModelTree::new(root_name);
    let mut object = tree.root();
    let mut current = tree.root();
    let mut faces: HashMap<NodeId, Vec<[FaceIndex; 3]>> = HashMap::new();
    let mut material_libraries = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                triangulate_face(&polygon, faces.entry(current).or_default());
            }
            "o" => {
                object = tree.add_child(tree.root(), statement_name(trimmed, tag));
                current = object;
            }
            "g" => {
                current = tree.add_child(object, statement_name(trimmed, tag));
            }
            "usemtl" => {
                let node = tree.node_mut(current);
                if node.material.is_none() {
                    node.material = Some(statement_name(trimmed, tag));
                }
            }
            "mtllib" => material_libraries.extend(parts.map(str::to_string)),
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    for (id, node_faces) in faces {
        let mut mesh = build_mesh(&positions, &normals, &node_faces)
            .with_context(|| format!("invalid faces in {}", tree.node(id).name))?;
        if needs_normals(&mesh.vertices) {
            compute_normals(&mut mesh);
        }
        tree.node_mut(id).geometry = Some(mesh);
    }

    Ok(ObjModel {
        tree,
        material_libraries,
    })
}

/// Parses an MTL library into named materials.
pub fn load_mtl_from_str(data: &str) -> Result<HashMap<String, Material>> {
    let mut materials = HashMap::new();
    let mut current: Option<(String, Material)> = None;

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "newmtl" => {
                if let Some((name, material)) = current.take() {
                    materials.insert(name, material);
                }
                current = Some((statement_name(trimmed, tag), Material::default()));
            }
            "Kd" => {
                if let Some((_, material)) = current.as_mut() {
                    material.diffuse = parse_vec3(parts)
                        .with_context(|| format!("invalid Kd on line {}", line_no + 1))?;
                }
            }
            "d" | "Tr" => {
                if let Some((_, material)) = current.as_mut() {
                    let value = parts
                        .next()
                        .ok_or_else(|| anyhow!("missing opacity on line {}", line_no + 1))?
                        .parse::<f32>()?;
                    material.opacity = if tag == "Tr" { 1.0 - value } else { value };
                }
            }
            _ => {}
        }
    }

    if let Some((name, material)) = current {
        materials.insert(name, material);
    }
    Ok(materials)
}

fn statement_name(line: &str, tag: &str) -> String {
    line[tag.len()..].trim().to_string()
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    let y = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    let z = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    Ok(Vec3::new(x, y, z))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vn = segments
            .nth(1)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(0);
        indices.push(FaceIndex { v, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    for i in 1..polygon.len().saturating_sub(1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vn: i32,
}

fn build_mesh(positions: &[Vec3], normals: &[Vec3], faces: &[[FaceIndex; 3]]) -> Result<ObjMesh> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for face in faces {
        for idx in face {
            let pos_index =
                fix_index(idx.v, positions.len()).ok_or_else(|| anyhow!("invalid vertex index"))?;
            let normal_index = fix_index(idx.vn, normals.len());
            let key = Key {
                position: pos_index,
                normal: normal_index,
            };
            let next_index = (vertices.len() / 6) as u32;
            let entry = lookup.entry(key).or_insert_with(|| {
                let position = positions[pos_index];
                vertices.extend_from_slice(&[position.x, position.y, position.z]);
                let normal = normal_index.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
                vertices.extend_from_slice(&[normal.x, normal.y, normal.z]);
                next_index
            });
            indices.push(*entry);
        }
    }

    Ok(ObjMesh { vertices, indices })
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then(|| len - abs)
    } else {
        None
    }
}

fn needs_normals(vertices: &[f32]) -> bool {
    vertices
        .chunks_exact(6)
        .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
}

fn compute_normals(mesh: &mut ObjMesh) {
    let vertex_count = mesh.vertices.len() / 6;
    let mut accum = vec![Vec3::ZERO; vertex_count];

    for triangle in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]];
        let (p0, p1, p2) = (mesh.position(i0), mesh.position(i1), mesh.position(i2));
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            for i in [i0, i1, i2] {
                accum[i as usize] += normal;
            }
        }
    }

    for (i, normal) in accum.into_iter().enumerate() {
        let normal = normal.normalize_or_zero();
        mesh.vertices[i * 6 + 3] = normal.x;
        mesh.vertices[i * 6 + 4] = normal.y;
        mesh.vertices[i * 6 + 5] = normal.z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_OBJECTS: &str = "
mtllib anatomy.mtl
v 0 0 0
v 1 0 0
v 0 1 0
v 5 5 5
v 6 5 5
v 5 6 5
o Liver_mesh
usemtl liver
f 1 2 3
o rib_cage
g screw
f 4 5 6
";

    #[test]
    fn objects_and_groups_become_nodes() {
        let model = load_obj_model(TWO_OBJECTS, "anatomy").unwrap();
        let tree = &model.tree;
        assert_eq!(model.material_libraries, vec!["anatomy.mtl".to_string()]);

        let liver = tree.find("Liver_mesh").unwrap();
        assert_eq!(tree.node(liver).material.as_deref(), Some("liver"));
        assert_eq!(tree.node(liver).geometry.as_ref().unwrap().indices, vec![0, 1, 2]);

        let cage = tree.find("rib_cage").unwrap();
        let screw = tree.find("screw").unwrap();
        assert!(tree.node(cage).geometry.is_none());
        assert_eq!(tree.node(screw).parent(), Some(cage));
        let bounds = tree.node(screw).local_bounds().unwrap();
        assert_eq!(bounds.min, Vec3::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let model = load_obj_model(obj, "tri").unwrap();
        let mesh = model.tree.node(model.tree.root()).geometry.clone().unwrap();
        for chunk in mesh.vertices.chunks_exact(6) {
            let normal = Vec3::new(chunk[3], chunk[4], chunk[5]);
            assert!((normal.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn negative_indices_are_relative() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\no tri\nf -3 -2 -1\n";
        let model = load_obj_model(obj, "m").unwrap();
        let tri = model.tree.find("tri").unwrap();
        assert_eq!(model.tree.node(tri).geometry.as_ref().unwrap().triangles().count(), 1);
    }

    #[test]
    fn empty_file_is_an_error() {
        assert!(load_obj_model("# nothing\n", "m").is_err());
    }

    #[test]
    fn parses_mtl_colors_and_opacity() {
        let mtl = "newmtl bone\nKd 0.9 0.9 0.8\nnewmtl liver\nKd 0.5 0.1 0.1\nTr 0.25\n";
        let materials = load_mtl_from_str(mtl).unwrap();
        assert_eq!(materials["bone"].diffuse, Vec3::new(0.9, 0.9, 0.8));
        assert_eq!(materials["bone"].opacity, 1.0);
        assert!((materials["liver"].opacity - 0.75).abs() < 1e-6);
    }
}
