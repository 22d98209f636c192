//! Organ placement state machine and scoring.
//!
//! A [`GameSession`] owns the shuffled organ order, the cursor into it, the
//! elapsed clock and every timer it schedules. The caller drives it with
//! input events and [`GameSession::tick`]; feedback goes out through a
//! [`Presenter`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use glam::Vec3;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::manifest::GameManifest;
use crate::model::{ModelTree, NodeId};
use crate::present::Presenter;
use crate::raycast::{HitTester, Ray};
use crate::timer::{Scheduler, TimerId};

pub const VICTORY_PROMPT: &str = "Congratulations! All organs placed correctly!";

/// Whether each matching mesh is its own target or meshes are merged per organ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Individual,
    Grouped,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Individual => "individual",
            Mode::Grouped => "grouped",
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown mode {0:?}; expected `individual` or `grouped`")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(Mode::Individual),
            "grouped" | "group" => Ok(Mode::Grouped),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    CountingDown,
    Active,
    Victory,
    Complete,
}

/// A placeable organ: one mesh in individual mode, a set of meshes in grouped mode.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganTarget {
    id: String,
    display_name: String,
    member_nodes: Vec<NodeId>,
    target_position: Vec3,
    solved: bool,
    mode: Mode,
}

impl OrganTarget {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        member_nodes: Vec<NodeId>,
        target_position: Vec3,
        mode: Mode,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            member_nodes,
            target_position,
            solved: false,
            mode,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn member_nodes(&self) -> &[NodeId] {
        &self.member_nodes
    }

    pub fn target_position(&self) -> Vec3 {
        self.target_position
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn prompt(&self) -> String {
        format!("Place the {}", self.display_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect,
}

/// Pure scoring rule: strictly closer than `threshold` is correct.
pub fn verdict(distance: f32, threshold: f32) -> Verdict {
    if distance < threshold {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    }
}

/// One scored click against the current target.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementAttempt {
    pub world_click_point: Vec3,
    pub target_id: String,
    pub distance: f32,
    pub verdict: Verdict,
}

impl PlacementAttempt {
    pub fn evaluate(world_click_point: Vec3, target: &OrganTarget, threshold: f32) -> Self {
        let distance = world_click_point.distance(target.target_position());
        Self {
            world_click_point,
            target_id: target.id().to_string(),
            distance,
            verdict: verdict(distance, threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// Clicks outside the active phase do nothing.
    Ignored,
    /// The ray missed every interactable mesh.
    NoHit,
    Placed(PlacementAttempt),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GameError {
    #[error("a session needs at least one organ target")]
    EmptyTargetSet,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub threshold: f32,
    pub countdown_from: u32,
    pub victory_duration: Duration,
}

impl SessionConfig {
    pub fn from_manifest(manifest: &GameManifest, mode: Mode) -> Self {
        Self {
            threshold: manifest.threshold(mode),
            countdown_from: manifest.countdown,
            victory_duration: manifest.victory_duration(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.07,
            countdown_from: 3,
            victory_duration: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTimer {
    CountdownTick,
    ElapsedTick,
    VictoryEnd,
}

const TICK: Duration = Duration::from_secs(1);

pub struct GameSession<R = StdRng> {
    mode: Mode,
    config: SessionConfig,
    targets: Vec<OrganTarget>,
    order: Vec<usize>,
    current: usize,
    elapsed_seconds: u32,
    countdown_remaining: u32,
    phase: Phase,
    timers: Scheduler<SessionTimer>,
    countdown_timer: Option<TimerId>,
    elapsed_timer: Option<TimerId>,
    rng: R,
}

impl GameSession<StdRng> {
    pub fn new(
        mode: Mode,
        targets: Vec<OrganTarget>,
        config: SessionConfig,
    ) -> Result<Self, GameError> {
        Self::with_rng(mode, targets, config, StdRng::from_entropy())
    }
}

impl<R: Rng> GameSession<R> {
    pub fn with_rng(
        mode: Mode,
        targets: Vec<OrganTarget>,
        config: SessionConfig,
        rng: R,
    ) -> Result<Self, GameError> {
        if targets.is_empty() {
            return Err(GameError::EmptyTargetSet);
        }
        let order = (0..targets.len()).collect();
        Ok(Self {
            mode,
            config,
            targets,
            order,
            current: 0,
            elapsed_seconds: 0,
            countdown_remaining: 0,
            phase: Phase::Idle,
            timers: Scheduler::new(),
            countdown_timer: None,
            elapsed_timer: None,
            rng,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn targets(&self) -> &[OrganTarget] {
        &self.targets
    }

    /// Targets in the order they will be prompted.
    pub fn ordered_targets(&self) -> impl Iterator<Item = &OrganTarget> + '_ {
        self.order.iter().map(|index| &self.targets[*index])
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_target(&self) -> Option<&OrganTarget> {
        self.order.get(self.current).map(|index| &self.targets[*index])
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Visible meshes that are not part of any organ target.
    pub fn interactable_nodes(&self, model: &ModelTree) -> Vec<NodeId> {
        model
            .mesh_ids()
            .filter(|id| model.is_effectively_visible(*id))
            .filter(|id| {
                !self
                    .targets
                    .iter()
                    .any(|target| target.member_nodes.contains(id))
            })
            .collect()
    }

    /// `Idle -> CountingDown`. Returns false when the click was ignored.
    pub fn start(&mut self, presenter: &mut dyn Presenter) -> bool {
        if self.phase != Phase::Idle {
            debug!("start ignored in {:?}", self.phase);
            return false;
        }
        self.begin_countdown(presenter);
        true
    }

    /// `Complete -> CountingDown`: hides every revealed organ and restarts the clock.
    pub fn replay(&mut self, model: &mut ModelTree, presenter: &mut dyn Presenter) -> bool {
        if self.phase != Phase::Complete {
            debug!("replay ignored in {:?}", self.phase);
            return false;
        }
        self.cancel_timers();
        for target in &mut self.targets {
            target.solved = false;
            for node in &target.member_nodes {
                model.set_visible(*node, false);
            }
        }
        self.current = 0;
        self.elapsed_seconds = 0;
        self.begin_countdown(presenter);
        true
    }

    /// Advances the session clock, firing countdown, elapsed and victory timers in order.
    pub fn tick(&mut self, dt: Duration, presenter: &mut dyn Presenter) {
        let deadline = self.timers.now() + dt;
        while let Some(timer) = self.timers.pop_due(deadline) {
            self.on_timer(timer, presenter);
        }
        self.timers.settle(deadline);
    }

    /// Casts `ray` against the interactable meshes and scores the nearest hit.
    pub fn pointer_click(
        &mut self,
        ray: &Ray,
        hit_tester: &dyn HitTester,
        model: &mut ModelTree,
        presenter: &mut dyn Presenter,
    ) -> ClickOutcome {
        if self.phase != Phase::Active {
            debug!("click ignored in {:?}", self.phase);
            return ClickOutcome::Ignored;
        }
        let candidates = self.interactable_nodes(model);
        let hits = hit_tester.cast_ray(ray, model, &candidates);
        match hits.first() {
            Some(hit) => self.place_at(hit.point, model, presenter),
            None => {
                debug!("click missed the model");
                ClickOutcome::NoHit
            }
        }
    }

    /// Scores a click that landed on the model at `point`.
    pub fn place_at(
        &mut self,
        point: Vec3,
        model: &mut ModelTree,
        presenter: &mut dyn Presenter,
    ) -> ClickOutcome {
        if self.phase != Phase::Active {
            debug!("placement ignored in {:?}", self.phase);
            return ClickOutcome::Ignored;
        }
        let Some(&index) = self.order.get(self.current) else {
            return ClickOutcome::Ignored;
        };

        let attempt = PlacementAttempt::evaluate(point, &self.targets[index], self.config.threshold);
        info!(
            "{} placement of {} (distance {:.4}, threshold {:.4})",
            match attempt.verdict {
                Verdict::Correct => "correct",
                Verdict::Incorrect => "incorrect",
            },
            attempt.target_id,
            attempt.distance,
            self.config.threshold
        );

        match attempt.verdict {
            Verdict::Correct => {
                let target = &mut self.targets[index];
                target.solved = true;
                for node in &target.member_nodes {
                    model.set_visible(*node, true);
                }
                self.current += 1;
                presenter.show_success_feedback(point);
                if self.current == self.order.len() {
                    self.enter_victory(presenter);
                } else if let Some(next) = self.current_target() {
                    presenter.show_prompt(&next.prompt());
                }
            }
            Verdict::Incorrect => presenter.show_failure_feedback(point),
        }
        ClickOutcome::Placed(attempt)
    }

    /// Cancels every outstanding timer. Called before the session is discarded.
    pub fn cancel_timers(&mut self) {
        self.timers.cancel_all();
        self.countdown_timer = None;
        self.elapsed_timer = None;
    }

    fn begin_countdown(&mut self, presenter: &mut dyn Presenter) {
        self.phase = Phase::CountingDown;
        self.countdown_remaining = self.config.countdown_from;
        info!("counting down from {}", self.countdown_remaining);
        if self.countdown_remaining == 0 {
            self.activate(presenter);
            return;
        }
        presenter.show_countdown(self.countdown_remaining);
        self.countdown_timer = Some(self.timers.every(TICK, SessionTimer::CountdownTick));
    }

    fn activate(&mut self, presenter: &mut dyn Presenter) {
        if let Some(id) = self.countdown_timer.take() {
            self.timers.cancel(id);
        }
        self.order = shuffled_order(&mut self.rng, self.targets.len());
        self.current = 0;
        self.elapsed_seconds = 0;
        self.phase = Phase::Active;
        self.elapsed_timer = Some(self.timers.every(TICK, SessionTimer::ElapsedTick));
        info!("session active with {} target(s)", self.order.len());
        presenter.show_timer(0);
        if let Some(target) = self.current_target() {
            presenter.show_prompt(&target.prompt());
        }
    }

    fn enter_victory(&mut self, presenter: &mut dyn Presenter) {
        if let Some(id) = self.elapsed_timer.take() {
            self.timers.cancel(id);
        }
        self.phase = Phase::Victory;
        info!("all organs placed in {}s", self.elapsed_seconds);
        presenter.show_prompt(VICTORY_PROMPT);
        presenter.show_victory();
        self.timers
            .after(self.config.victory_duration, SessionTimer::VictoryEnd);
    }

    fn on_timer(&mut self, timer: SessionTimer, presenter: &mut dyn Presenter) {
        match (timer, self.phase) {
            (SessionTimer::CountdownTick, Phase::CountingDown) => {
                self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
                if self.countdown_remaining == 0 {
                    self.activate(presenter);
                } else {
                    presenter.show_countdown(self.countdown_remaining);
                }
            }
            (SessionTimer::ElapsedTick, Phase::Active) => {
                self.elapsed_seconds += 1;
                presenter.show_timer(self.elapsed_seconds);
            }
            (SessionTimer::VictoryEnd, Phase::Victory) => {
                self.phase = Phase::Complete;
                info!("session complete");
                presenter.show_replay_affordance();
            }
            (timer, phase) => debug!("stale {timer:?} in {phase:?}"),
        }
    }
}

/// Uniform permutation of `0..len` (Fisher-Yates).
fn shuffled_order<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}
