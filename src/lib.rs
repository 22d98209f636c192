//! Anatomy placement game: organs are removed from a 3D body model and the
//! player clicks where each one belongs.
//!
//! The game core (`registry`, `game`, `timer`) is free of any windowing or
//! GPU dependency and talks to the outside world through the [`Presenter`]
//! and [`HitTester`] traits, so a whole session can be driven headlessly.
//! `render` and the binary supply the wgpu/winit front end.

pub mod app;
pub mod assets;
pub mod camera;
pub mod effects;
pub mod game;
pub mod input;
pub mod manifest;
pub mod model;
pub mod obj;
pub mod present;
pub mod raycast;
pub mod registry;
pub mod render;
pub mod timer;

pub use app::{GameApp, Screen};
pub use assets::{load_model, AssetError, ModelCache, PendingLoad};
pub use camera::{CameraParams, OrbitCamera};
pub use effects::{AudioCue, Effects};
pub use game::{
    ClickOutcome, GameError, GameSession, Mode, OrganTarget, Phase, PlacementAttempt,
    SessionConfig, Verdict,
};
pub use input::{AppCommand, InputState, KeyCode, MouseButton, NamedKey, PointerRelease};
pub use manifest::{GameManifest, OrganGroup};
pub use model::{Aabb, ModelNode, ModelTree, NodeId};
pub use obj::{load_mtl_from_str, load_obj_model, ObjMesh};
pub use present::{FrameStats, GameEvent, Hud, LogPresenter, Presenter, ScenePresenter};
pub use raycast::{HitTester, MeshRaycaster, Ray, RayHit};
pub use registry::{classify, normalize_name, prompt_label, Classification, RegistryError};
pub use render::{LightParams, Renderer};
pub use timer::{Scheduler, TimerId};
