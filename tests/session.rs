use std::time::Duration;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

use anatomy_game::{
    classify, load_obj_model, ClickOutcome, GameEvent, GameManifest, GameSession, MeshRaycaster,
    Mode, ModelTree, OrganGroup, Phase, Ray, SessionConfig, Verdict,
};

// Heart centred on the origin, liver on (1, 1, 1), one rib and an inert skin plane.
const BODY: &str = "o Heart_mesh
v -0.1 -0.1 0
v 0.1 -0.1 0
v 0 0.1 0
f 1 2 3
o Liver_mesh
v 0.9 0.9 1
v 1.1 0.9 1
v 1 1.1 1
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

// Two lobes of one lung plus a heart.
const LUNGS: &str = "o LungLeft_mesh
v -0.1 0 0
v 0.1 0 0
v 0 0.2 0
f 1 2 3
o LungRight_mesh
v 1.9 0 0
v 2.1 0 0
v 2 0.2 0
f 4 5 6
o Heart
v 0.9 -1.1 0
v 1.1 -1.1 0
v 1 -0.9 0
f 7 8 9
";

fn config() -> SessionConfig {
    SessionConfig {
        threshold: 0.1,
        countdown_from: 3,
        victory_duration: Duration::from_secs(5),
    }
}

fn prepare(source: &str, mode: Mode, seed: u64) -> (ModelTree, GameSession) {
    let mut tree = load_obj_model(source, "body").unwrap().tree;
    let manifest = GameManifest::default();
    let classification =
        classify(&mut tree, &manifest.organs, &manifest.obstructions, mode).unwrap();
    let session = GameSession::with_rng(
        mode,
        classification.targets,
        config(),
        StdRng::seed_from_u64(seed),
    )
    .unwrap();
    (tree, session)
}

fn start(session: &mut GameSession, events: &mut Vec<GameEvent>) {
    assert!(session.start(events));
    assert_eq!(session.phase(), Phase::CountingDown);
    session.tick(Duration::from_secs(3), events);
    assert_eq!(session.phase(), Phase::Active);
}

fn verdict_of(outcome: ClickOutcome) -> Verdict {
    match outcome {
        ClickOutcome::Placed(attempt) => attempt.verdict,
        other => panic!("expected a placement, got {other:?}"),
    }
}

#[test]
fn two_organs_are_placed_in_order() {
    let (mut tree, mut session) = prepare(BODY, Mode::Individual, 7);
    let mut events: Vec<GameEvent> = Vec::new();
    assert_eq!(session.targets().len(), 2);
    assert!(!tree.is_effectively_visible(tree.find("Rib_left").unwrap()));

    start(&mut session, &mut events);
    let first = session.current_target().unwrap().clone();
    let second = session.ordered_targets().nth(1).unwrap().clone();
    let mut positions = [first.target_position(), second.target_position()];
    positions.sort_by(|a, b| a.x.total_cmp(&b.x));
    assert!((positions[0] - Vec3::ZERO).length() < 1e-5);
    assert!((positions[1] - Vec3::ONE).length() < 1e-5);

    let outcome = session.place_at(first.target_position(), &mut tree, &mut events);
    assert_eq!(verdict_of(outcome), Verdict::Correct);
    assert_eq!(session.current_index(), 1);
    assert!(tree.is_effectively_visible(first.member_nodes()[0]));
    assert!(!tree.is_effectively_visible(second.member_nodes()[0]));

    let outcome = session.place_at(Vec3::splat(5.0), &mut tree, &mut events);
    assert_eq!(verdict_of(outcome), Verdict::Incorrect);
    assert_eq!(session.current_index(), 1);
    assert_eq!(events.last(), Some(&GameEvent::Failure(Vec3::splat(5.0))));

    let outcome = session.place_at(second.target_position(), &mut tree, &mut events);
    assert_eq!(verdict_of(outcome), Verdict::Correct);
    assert_eq!(session.current_index(), 2);
    assert_eq!(session.phase(), Phase::Victory);
    assert!(events.contains(&GameEvent::Victory));
}

#[test]
fn replay_hides_organs_and_restarts() {
    let (mut tree, mut session) = prepare(BODY, Mode::Individual, 11);
    let mut events: Vec<GameEvent> = Vec::new();
    start(&mut session, &mut events);
    while let Some(target) = session.current_target().cloned() {
        session.tick(Duration::from_secs(1), &mut events);
        session.place_at(target.target_position(), &mut tree, &mut events);
    }
    assert_eq!(session.phase(), Phase::Victory);
    assert_eq!(session.elapsed_seconds(), 2);

    // The clock stops at victory.
    session.tick(Duration::from_secs(5), &mut events);
    assert_eq!(session.phase(), Phase::Complete);
    assert_eq!(session.elapsed_seconds(), 2);
    assert_eq!(events.last(), Some(&GameEvent::ReplayAvailable));

    assert!(session.replay(&mut tree, &mut events));
    assert_eq!(session.phase(), Phase::CountingDown);
    assert_eq!(session.current_index(), 0);
    assert!(session.targets().iter().all(|target| !target.is_solved()));
    for target in session.targets() {
        assert!(!tree.is_effectively_visible(target.member_nodes()[0]));
    }
    session.tick(Duration::from_secs(3), &mut events);
    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(session.elapsed_seconds(), 0);
}

#[test]
fn grouped_mode_reveals_every_member() {
    let (mut tree, mut session) = prepare(LUNGS, Mode::Grouped, 3);
    let mut events: Vec<GameEvent> = Vec::new();
    assert_eq!(session.targets().len(), 2);
    let lung = session
        .targets()
        .iter()
        .find(|target| target.id() == "lung")
        .unwrap()
        .clone();
    assert_eq!(lung.member_nodes().len(), 2);
    assert!((lung.target_position() - Vec3::new(1.0, 0.1, 0.0)).length() < 1e-5);

    start(&mut session, &mut events);
    while let Some(target) = session.current_target().cloned() {
        session.place_at(target.target_position(), &mut tree, &mut events);
    }
    assert_eq!(session.phase(), Phase::Victory);
    for node in lung.member_nodes() {
        assert!(tree.is_effectively_visible(*node));
    }
}

#[test]
fn clicks_outside_active_are_ignored() {
    let (mut tree, mut session) = prepare(BODY, Mode::Individual, 5);
    let mut events: Vec<GameEvent> = Vec::new();
    assert_eq!(
        session.place_at(Vec3::ZERO, &mut tree, &mut events),
        ClickOutcome::Ignored
    );
    session.start(&mut events);
    assert_eq!(
        session.place_at(Vec3::ZERO, &mut tree, &mut events),
        ClickOutcome::Ignored
    );
    assert_eq!(session.current_index(), 0);
}

#[test]
fn custom_keywords_drive_classification() {
    let mut tree = load_obj_model(BODY, "body").unwrap().tree;
    let organs = vec![OrganGroup::new("heart", &["heart", "cardiac"])];
    let classification = classify(&mut tree, &organs, &[], Mode::Individual).unwrap();
    assert_eq!(classification.targets.len(), 1);
    assert_eq!(classification.targets[0].id(), "Heart");
    assert_eq!(classification.targets[0].prompt(), "Place the heart");
    assert!(classification.obstructions.is_empty());
}

#[test]
fn model_file_named_like_an_obstruction_stays_playable() {
    let mut tree = load_obj_model(BODY, "thorax_ribs").unwrap().tree;
    let manifest = GameManifest::default();
    let classification = classify(
        &mut tree,
        &manifest.organs,
        &manifest.obstructions,
        Mode::Individual,
    )
    .unwrap();
    let skin = tree.find("Skin").unwrap();
    assert!(!classification.obstructions.contains(&tree.root()));
    assert!(tree.is_effectively_visible(skin));

    let mut session = GameSession::with_rng(
        Mode::Individual,
        classification.targets,
        config(),
        StdRng::seed_from_u64(1),
    )
    .unwrap();
    assert!(session.interactable_nodes(&tree).contains(&skin));

    let mut events: Vec<GameEvent> = Vec::new();
    start(&mut session, &mut events);
    let ray = Ray::new(Vec3::new(3.5, -4.0, 10.0), Vec3::NEG_Z);
    let outcome = session.pointer_click(&ray, &MeshRaycaster, &mut tree, &mut events);
    assert_eq!(verdict_of(outcome), Verdict::Incorrect);
}
