//! Turns a loaded model tree into placeable organ targets.
//!
//! Classification is data driven: organ keyword groups and obstruction
//! keywords come from the manifest, so the rules can be exercised on a
//! synthetic tree without any renderer.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use log::{debug, info};

use crate::game::{Mode, OrganTarget};
use crate::manifest::OrganGroup;
use crate::model::{ModelTree, NodeId};

const NAME_MARKERS: &[&str] = &["_generated", "_grp", "_mesh", "_Mesh"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no organ matched the configured keywords in {mode} mode")]
    EmptyTargetSet { mode: Mode },
}

/// Result of a classification pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub targets: Vec<OrganTarget>,
    /// Nodes hidden because their name matched an obstruction keyword.
    pub obstructions: Vec<NodeId>,
}

/// Classifies every node below the root of `tree` and hides organs and obstructions.
///
/// A node whose lower-cased name contains an organ keyword joins that organ;
/// otherwise a node matching an obstruction keyword is hidden together with
/// its whole subtree. When several organ groups match, the longest matching
/// keyword wins and ties go to the earlier group.
pub fn classify(
    tree: &mut ModelTree,
    organs: &[OrganGroup],
    obstructions: &[String],
    mode: Mode,
) -> Result<Classification, RegistryError> {
    let keywords: Vec<Vec<String>> = organs
        .iter()
        .map(|group| lowercase_keywords(&group.keywords))
        .collect();
    let obstructions = lowercase_keywords(obstructions);
    let mut members: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    let mut hidden = Vec::new();

    // The root stands for the model file itself and is never an organ.
    for id in tree.descendants(tree.root()).into_iter().skip(1) {
        let name = tree.node(id).name.to_lowercase();
        if let Some(group) = match_group(&name, &keywords) {
            debug!("organ {} -> {}", tree.node(id).name, organs[group].name);
            members.entry(group).or_default().push(id);
        } else if obstructions.iter().any(|keyword| name.contains(keyword.as_str())) {
            debug!("obstruction {}", tree.node(id).name);
            tree.hide_subtree(id);
            hidden.push(id);
        }
    }

    let targets = match mode {
        Mode::Individual => individual_targets(tree, &members),
        Mode::Grouped => grouped_targets(tree, organs, &members),
    };

    if targets.is_empty() {
        return Err(RegistryError::EmptyTargetSet { mode });
    }

    for target in &targets {
        for node in target.member_nodes() {
            tree.set_visible(*node, false);
        }
    }

    info!(
        "classified {} target(s), hid {} obstruction(s)",
        targets.len(),
        hidden.len()
    );
    Ok(Classification {
        targets,
        obstructions: hidden,
    })
}

fn lowercase_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

fn match_group(name: &str, groups: &[Vec<String>]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (index, keywords) in groups.iter().enumerate() {
        let longest = keywords
            .iter()
            .filter(|keyword| name.contains(keyword.as_str()))
            .map(String::len)
            .max();
        if let Some(len) = longest {
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((index, len));
            }
        }
    }
    best.map(|(index, _)| index)
}

fn individual_targets(tree: &ModelTree, members: &BTreeMap<usize, Vec<NodeId>>) -> Vec<OrganTarget> {
    let mut nodes: Vec<NodeId> = members.values().flatten().copied().collect();
    nodes.sort();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut targets = Vec::new();
    for node in nodes {
        let Some(center) = tree.world_center(node) else {
            debug!("skipping {}: no geometry", tree.node(node).name);
            continue;
        };
        let base = normalize_name(&tree.node(node).name).to_string();
        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        let id = if *count == 1 {
            base.clone()
        } else {
            format!("{base}-{count}")
        };
        targets.push(OrganTarget::new(
            id,
            prompt_label(&base),
            vec![node],
            center,
            Mode::Individual,
        ));
    }
    targets
}

fn grouped_targets(
    tree: &ModelTree,
    organs: &[OrganGroup],
    members: &BTreeMap<usize, Vec<NodeId>>,
) -> Vec<OrganTarget> {
    members
        .iter()
        .filter_map(|(group, nodes)| {
            let centers: Vec<Vec3> = nodes
                .iter()
                .filter_map(|node| tree.world_center(*node))
                .collect();
            if centers.is_empty() {
                debug!("dropping {}: no member has geometry", organs[*group].name);
                return None;
            }
            let position = centers.iter().copied().sum::<Vec3>() / centers.len() as f32;
            let organ = &organs[*group];
            Some(OrganTarget::new(
                organ.name.clone(),
                organ.label.clone(),
                nodes.clone(),
                position,
                Mode::Grouped,
            ))
        })
        .collect()
}

/// Cuts a raw node name at the earliest export marker.
///
/// `"Liver_mesh_03"` becomes `"Liver"`; names without a marker are returned unchanged.
pub fn normalize_name(raw: &str) -> &str {
    NAME_MARKERS
        .iter()
        .filter_map(|marker| raw.find(marker))
        .min()
        .map_or(raw, |cut| &raw[..cut])
}

/// Human friendly label: underscores become spaces, camel case is split and
/// the result is lower-cased.
pub fn prompt_label(name: &str) -> String {
    let mut spaced = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        match ch {
            '_' => spaced.push(' '),
            c if c.is_uppercase() => {
                spaced.push(' ');
                spaced.push(c);
            }
            c => spaced.push(c),
        }
    }
    spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
