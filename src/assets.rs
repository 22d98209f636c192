use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::manifest::GameManifest;
use crate::model::ModelTree;
use crate::obj::{load_mtl_from_str, load_obj_model, Material};

/// Asset load failure. Reported to the player; the session stays idle until retried.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("unable to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("model loader stopped: {0}")]
    Worker(String),
}

fn read(path: &Path) -> Result<String, AssetError> {
    fs::read_to_string(path).map_err(|source| AssetError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the manifest's model and materials relative to `base_dir` and applies the root transform.
pub fn load_model(manifest: &GameManifest, base_dir: &Path) -> Result<ModelTree, AssetError> {
    let model_path = base_dir.join(&manifest.model);
    let source = read(&model_path)?;
    let root_name = model_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("model");
    let model = load_obj_model(&source, root_name).map_err(|err| AssetError::Parse {
        path: model_path.clone(),
        message: format!("{err:#}"),
    })?;
    let mut tree = model.tree;

    let materials = match &manifest.materials {
        Some(library) => load_library(&base_dir.join(library))?,
        None => {
            let model_dir = model_path.parent().unwrap_or(base_dir);
            let mut materials = HashMap::new();
            for library in &model.material_libraries {
                match load_library(&model_dir.join(library)) {
                    Ok(found) => materials.extend(found),
                    Err(err) => warn!("skipping material library: {err}"),
                }
            }
            materials
        }
    };
    apply_materials(&mut tree, &materials);

    let root = tree.root();
    tree.node_mut(root).local = manifest.transform.matrix();

    info!(
        "loaded {} ({} nodes, {} meshes, {} materials)",
        model_path.display(),
        tree.len(),
        tree.mesh_ids().count(),
        materials.len()
    );
    for line in tree.hierarchy_lines() {
        debug!("{line}");
    }
    Ok(tree)
}

fn load_library(path: &Path) -> Result<HashMap<String, Material>, AssetError> {
    let source = read(path)?;
    load_mtl_from_str(&source).map_err(|err| AssetError::Parse {
        path: path.to_path_buf(),
        message: format!("{err:#}"),
    })
}

fn apply_materials(tree: &mut ModelTree, materials: &HashMap<String, Material>) {
    let ids: Vec<_> = tree.ids().collect();
    for id in ids {
        let node = tree.node_mut(id);
        let Some(name) = node.material.as_deref() else {
            continue;
        };
        match materials.get(name) {
            Some(material) => {
                node.color = material.diffuse;
                node.opacity = material.opacity;
            }
            None => debug!("node {} uses unknown material {name}", node.name),
        }
    }
}

/// Model load running on a background thread. The main loop polls it once per frame.
#[derive(Debug)]
pub struct PendingLoad {
    receiver: Receiver<Result<ModelTree, AssetError>>,
    handle: Option<JoinHandle<()>>,
}

impl PendingLoad {
    pub fn spawn(manifest: GameManifest, base_dir: PathBuf) -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || {
            let result = load_model(&manifest, &base_dir);
            // The receiver is gone when the player exited before the load finished.
            let _ = sender.send(result);
        });
        Self {
            receiver,
            handle: Some(handle),
        }
    }

    /// A load that has already completed, e.g. a cache hit.
    pub fn ready(tree: ModelTree) -> Self {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(Ok(tree));
        Self {
            receiver,
            handle: None,
        }
    }

    /// Returns the result once, when the load has finished.
    pub fn poll(&mut self) -> Option<Result<ModelTree, AssetError>> {
        match self.receiver.try_recv() {
            Ok(result) => {
                self.join();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                Some(Err(AssetError::Worker(
                    "loader thread exited without a result".to_string(),
                )))
            }
        }
    }

    /// Blocks until the load completes.
    pub fn wait(mut self) -> Result<ModelTree, AssetError> {
        let result = self
            .receiver
            .recv()
            .map_err(|_| AssetError::Worker("loader thread exited without a result".to_string()));
        self.join();
        result?
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("model loader thread panicked");
            }
        }
    }
}

/// Pristine (unclassified) models keyed by path, cloned for each new session.
#[derive(Debug, Default)]
pub struct ModelCache {
    models: HashMap<PathBuf, ModelTree>,
}

impl ModelCache {
    pub fn get(&self, path: &Path) -> Option<ModelTree> {
        self.models.get(path).cloned()
    }

    pub fn insert(&mut self, path: PathBuf, tree: ModelTree) {
        self.models.insert(path, tree);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.models.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use tempfile::tempdir;

    const OBJ: &str = "mtllib body.mtl
o Liver_mesh
v 0 0 0
v 1 0 0
v 0 1 0
usemtl liver
f 1 2 3
";

    const MTL: &str = "newmtl liver
Kd 0.6 0.2 0.1
d 0.5
";

    fn manifest() -> GameManifest {
        GameManifest {
            model: "body.obj".to_string(),
            ..GameManifest::default()
        }
    }

    #[test]
    fn loads_model_with_referenced_materials() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("body.obj"), OBJ).unwrap();
        fs::write(dir.path().join("body.mtl"), MTL).unwrap();
        let mut manifest = manifest();
        manifest.transform.position = Vec3::new(0.0, 2.0, 0.0);

        let tree = load_model(&manifest, dir.path()).unwrap();
        let liver = tree.find("Liver_mesh").unwrap();
        assert_eq!(tree.node(liver).color, Vec3::new(0.6, 0.2, 0.1));
        assert_eq!(tree.node(liver).opacity, 0.5);
        let center = tree.world_center(liver).unwrap();
        assert!((center - Vec3::new(0.5, 2.5, 0.0)).length() < 1e-5);
    }

    #[test]
    fn missing_referenced_library_is_not_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("body.obj"), OBJ).unwrap();
        assert!(load_model(&manifest(), dir.path()).is_ok());
    }

    #[test]
    fn missing_explicit_library_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("body.obj"), OBJ).unwrap();
        let mut manifest = manifest();
        manifest.materials = Some("other.mtl".to_string());
        let err = load_model(&manifest, dir.path()).unwrap_err();
        assert!(matches!(err, AssetError::Read { .. }));
    }

    #[test]
    fn background_load_reports_missing_model() {
        let dir = tempdir().unwrap();
        let pending = PendingLoad::spawn(manifest(), dir.path().to_path_buf());
        let err = pending.wait().unwrap_err();
        assert!(err.to_string().contains("body.obj"));
    }

    #[test]
    fn ready_load_polls_once() {
        let mut pending = PendingLoad::ready(ModelTree::new("cached"));
        let tree = pending.poll().unwrap().unwrap();
        assert_eq!(tree.node(tree.root()).name, "cached");
        assert!(matches!(pending.poll(), Some(Err(AssetError::Worker(_)))));
    }

    #[test]
    fn cache_returns_independent_copies() {
        let mut cache = ModelCache::default();
        let path = PathBuf::from("body.obj");
        cache.insert(path.clone(), ModelTree::new("body"));
        let mut copy = cache.get(&path).unwrap();
        let root = copy.root();
        copy.set_visible(root, false);
        let again = cache.get(&path).unwrap();
        assert!(again.node(again.root()).visible);
    }
}
