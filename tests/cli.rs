use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const BODY: &str = "mtllib body.mtl
o Heart_mesh
v -0.1 -0.1 0
v 0.1 -0.1 0
v 0 0.1 0
usemtl organ
f 1 2 3
o Liver_mesh
v 0.9 0.9 1
v 1.1 0.9 1
v 1 1.1 1
usemtl organ
f 4 5 6
o Rib_left
v 3 3 3
v 4 3 3
v 3 4 3
f 7 8 9
o Skin
v -5 -5 -2
v 5 -5 -2
v 0 5 -2
f 10 11 12
";

const MATERIALS: &str = "newmtl organ
Kd 0.8 0.2 0.2
";

fn build_game(model: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let manifest = format!(
        r#"<game>
  <title>Test Body</title>
  <model>{model}</model>
  <countdown>1</countdown>
  <victory-seconds>2</victory-seconds>
</game>
"#
    );
    let manifest_path = dir.path().join("game.xml");
    fs::write(&manifest_path, manifest).expect("write manifest");
    fs::write(dir.path().join("body.obj"), BODY).expect("write model");
    fs::write(dir.path().join("body.mtl"), MATERIALS).expect("write materials");
    (dir, manifest_path)
}

#[test]
fn summary_lists_targets() {
    let (_dir, manifest) = build_game("body.obj");
    let mut cmd = Command::cargo_bin("anatomy-game").expect("binary exists");
    cmd.arg(&manifest).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded manifest \"Test Body\""))
        .stdout(contains("Model has 5 nodes (4 meshes)"))
        .stdout(contains("Mode individual: 2 target(s)"))
        .stdout(contains(
            " - Liver \"liver\" at (1.000, 1.000, 1.000) [1 node(s)]",
        ))
        .stdout(contains("Hidden obstructions: 1"));
}

#[test]
fn summary_respects_mode_override() {
    let (_dir, manifest) = build_game("body.obj");
    let mut cmd = Command::cargo_bin("anatomy-game").expect("binary exists");
    cmd.arg(&manifest)
        .arg("--summary-only")
        .arg("--mode")
        .arg("grouped");
    cmd.assert()
        .success()
        .stdout(contains("Mode grouped: 2 target(s)"))
        .stdout(contains(" - heart \"heart\""));
}

#[test]
fn autoplay_completes_a_session() {
    let (_dir, manifest) = build_game("body.obj");
    let mut cmd = Command::cargo_bin("anatomy-game").expect("binary exists");
    cmd.arg(&manifest).arg("--autoplay").arg("--seed").arg("42");
    cmd.assert()
        .success()
        .stdout(contains("Playing individual mode"))
        .stdout(contains("Incorrect: "))
        .stdout(contains("(distance 0.1400)"))
        .stdout(contains("Correct: heart (distance 0.0000)"))
        .stdout(contains("Correct: liver (distance 0.0000)"))
        .stdout(contains("All 2 organ(s) placed in 2s"))
        .stdout(contains("Session complete; replay available"));
}

#[test]
fn missing_model_is_reported() {
    let (_dir, manifest) = build_game("missing.obj");
    let mut cmd = Command::cargo_bin("anatomy-game").expect("binary exists");
    cmd.arg(&manifest).arg("--autoplay");
    cmd.assert()
        .failure()
        .stderr(contains("Error:"))
        .stderr(contains("missing.obj"));
}

#[test]
fn unknown_arguments_are_rejected() {
    let (_dir, manifest) = build_game("body.obj");
    let mut cmd = Command::cargo_bin("anatomy-game").expect("binary exists");
    cmd.arg(&manifest).arg("--fly");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --fly"));
}
