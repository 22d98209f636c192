use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use glam::{EulerRot, Mat4, Quat, Vec3};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::game::Mode;

const DEFAULT_ORGANS: &[&str] = &[
    "heart",
    "liver",
    "lung",
    "kidney",
    "stomach",
    "brain",
    "intestine",
    "pancreas",
    "spleen",
    "bladder",
    "esophagus",
    "trachea",
    "gallbladder",
    "appendix",
    "thyroid",
];

const DEFAULT_OBSTRUCTIONS: &[&str] = &[
    "taenia",
    "rib",
    "mesocolon",
    "sternum",
    "cartilages",
    "xiphoid",
    "bronchi",
    "mesocolic",
    "colon",
    "thymus",
];

/// Game configuration loaded from an XML manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameManifest {
    pub title: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials: Option<String>,
    pub mode: Mode,
    pub transform: RootTransform,
    pub thresholds: Thresholds,
    pub countdown: u32,
    pub victory_seconds: f32,
    pub marker_seconds: f32,
    pub camera: CameraSettings,
    pub organs: Vec<OrganGroup>,
    pub obstructions: Vec<String>,
}

/// Canonical organ name, prompt label and the lower-case substrings that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganGroup {
    pub name: String,
    pub label: String,
    pub keywords: Vec<String>,
}

impl OrganGroup {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

/// Distance below which a click counts as a correct placement, per mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub individual: f32,
    pub grouped: f32,
}

impl Thresholds {
    pub fn for_mode(&self, mode: Mode) -> f32 {
        match mode {
            Mode::Individual => self.individual,
            Mode::Grouped => self.grouped,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            individual: 0.07,
            grouped: 0.3,
        }
    }
}

/// Transform applied to the root of the loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RootTransform {
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl RootTransform {
    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::ZYX,
            self.rotation.z.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.x.to_radians(),
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

impl Default for RootTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub fov: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub intro_seconds: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov: 75.0,
            min_distance: 0.5,
            max_distance: 1.5,
            intro_seconds: 3.0,
        }
    }
}

impl Default for GameManifest {
    fn default() -> Self {
        Self {
            title: "Skeleton Game".to_string(),
            model: "assets/models/anatomy.obj".to_string(),
            materials: None,
            mode: Mode::Individual,
            transform: RootTransform::default(),
            thresholds: Thresholds::default(),
            countdown: 3,
            victory_seconds: 5.0,
            marker_seconds: 0.2,
            camera: CameraSettings::default(),
            organs: default_organs(),
            obstructions: DEFAULT_OBSTRUCTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn default_organs() -> Vec<OrganGroup> {
    DEFAULT_ORGANS
        .iter()
        .map(|name| OrganGroup::new(name, &[name]))
        .collect()
}

impl GameManifest {
    /// Parses a `<game>` manifest. Missing elements keep their defaults.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid manifest XML")?;
        let root = document.root_element();
        if !root.has_tag_name("game") {
            bail!("expected <game> root element, found <{}>", root.tag_name().name());
        }

        let mut manifest = GameManifest::default();
        manifest.model = required_text(&root, "model")?;
        if let Some(title) = optional_text(&root, "title") {
            manifest.title = title;
        }
        manifest.materials = optional_text(&root, "materials");
        if let Some(mode) = optional_text(&root, "mode") {
            manifest.mode = mode.parse()?;
        }
        manifest.countdown = parse_u32(optional_text(&root, "countdown"), manifest.countdown)?;
        manifest.victory_seconds =
            parse_f32(optional_text(&root, "victory-seconds"), manifest.victory_seconds)?;
        manifest.marker_seconds =
            parse_f32(optional_text(&root, "marker-seconds"), manifest.marker_seconds)?;

        if let Some(node) = child(&root, "transform") {
            let t = &mut manifest.transform;
            t.position = parse_vec3(optional_text(&node, "position"), t.position)?;
            t.rotation = parse_vec3(optional_text(&node, "rotation"), t.rotation)?;
            t.scale = parse_vec3(optional_text(&node, "scale"), t.scale)?;
        }

        if let Some(node) = child(&root, "thresholds") {
            let t = &mut manifest.thresholds;
            t.individual = parse_f32(optional_text(&node, "individual"), t.individual)?;
            t.grouped = parse_f32(optional_text(&node, "grouped"), t.grouped)?;
        }

        if let Some(node) = child(&root, "camera") {
            let c = &mut manifest.camera;
            c.fov = parse_f32(optional_text(&node, "fov"), c.fov)?;
            c.min_distance = parse_f32(optional_text(&node, "min-distance"), c.min_distance)?;
            c.max_distance = parse_f32(optional_text(&node, "max-distance"), c.max_distance)?;
            c.intro_seconds = parse_f32(optional_text(&node, "intro-seconds"), c.intro_seconds)?;
            if c.min_distance > c.max_distance {
                bail!(
                    "camera min-distance {} exceeds max-distance {}",
                    c.min_distance,
                    c.max_distance
                );
            }
        }

        if let Some(node) = child(&root, "organs") {
            manifest.organs = node
                .children()
                .filter(|n| n.has_tag_name("organ"))
                .map(|n| parse_organ(&n))
                .collect::<Result<_>>()?;
        }

        if let Some(node) = child(&root, "obstructions") {
            manifest.obstructions = keywords(&node);
        }

        Ok(manifest)
    }

    pub fn threshold(&self, mode: Mode) -> f32 {
        self.thresholds.for_mode(mode)
    }

    pub fn victory_duration(&self) -> Duration {
        Duration::from_secs_f32(self.victory_seconds.max(0.0))
    }

    pub fn marker_duration(&self) -> Duration {
        Duration::from_secs_f32(self.marker_seconds.max(0.0))
    }
}

fn parse_organ(node: &Node<'_, '_>) -> Result<OrganGroup> {
    let name = required_text(node, "name")?;
    let mut keywords = keywords(node);
    if keywords.is_empty() {
        keywords.push(name.to_lowercase());
    }
    Ok(OrganGroup {
        label: optional_text(node, "label").unwrap_or_else(|| name.clone()),
        name,
        keywords,
    })
}

fn keywords(node: &Node<'_, '_>) -> Vec<String> {
    node.children()
        .filter(|n| n.has_tag_name("keyword"))
        .filter_map(|n| n.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("failed to parse vector {value:?}: {err}"))?;
    match numbers.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        [s] => Ok(Vec3::splat(*s)),
        _ => Err(anyhow!("vector {value:?} must have 1 or 3 components")),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float {value:?}: {err}")),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer {value:?}: {err}")),
        None => Ok(default),
    }
}
