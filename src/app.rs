use std::path::PathBuf;
use std::time::Duration;

use glam::{Vec2, Vec3};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::assets::{ModelCache, PendingLoad};
use crate::camera::OrbitCamera;
use crate::game::{ClickOutcome, GameSession, Mode, Phase, SessionConfig};
use crate::input::AppCommand;
use crate::manifest::GameManifest;
use crate::model::ModelTree;
use crate::present::Presenter;
use crate::raycast::MeshRaycaster;
use crate::registry::classify;

pub const RULES_TEXT: &str = "Every organ has been removed from the body. \
When a prompt names an organ, click where it belongs. \
Close enough and the organ reappears; otherwise a grey marker shows where you clicked. \
Place them all as fast as you can. Drag to orbit, scroll to zoom.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    MainMenu,
    Rules,
    Playing,
}

/// Screen flow around a single live [`GameSession`].
///
/// Entering the play screen starts a model load; when it completes the model
/// is classified and a fresh session waits in `Idle`. Leaving the screen, or
/// switching modes before starting, tears the session down first so that at
/// most one session and one set of timers exists at a time.
pub struct GameApp {
    manifest: GameManifest,
    base_dir: PathBuf,
    mode: Mode,
    seed: Option<u64>,
    screen: Screen,
    cache: ModelCache,
    pending: Option<PendingLoad>,
    model: Option<ModelTree>,
    session: Option<GameSession>,
    camera: OrbitCamera,
    hit_tester: MeshRaycaster,
    generation: u64,
}

impl GameApp {
    pub fn new(manifest: GameManifest, base_dir: PathBuf) -> Self {
        let camera = OrbitCamera::new(&manifest.camera);
        Self {
            mode: manifest.mode,
            manifest,
            base_dir,
            seed: None,
            screen: Screen::MainMenu,
            cache: ModelCache::default(),
            pending: None,
            model: None,
            session: None,
            camera,
            hit_tester: MeshRaycaster,
            generation: 0,
        }
    }

    /// Seeds the organ shuffle of every session created from now on.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn manifest(&self) -> &GameManifest {
        &self.manifest
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn model(&self) -> Option<&ModelTree> {
        self.model.as_ref()
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Bumped whenever the displayed model is replaced or dropped.
    pub fn scene_generation(&self) -> u64 {
        self.generation
    }

    pub fn model_center(&self) -> Option<Vec3> {
        self.model.as_ref()?.bounds().map(|bounds| bounds.center())
    }

    pub fn menu_text(&self) -> String {
        match self.screen {
            Screen::MainMenu => format!(
                "{} | Enter: play | R: rules | 1/2: mode ({})",
                self.manifest.title, self.mode
            ),
            Screen::Rules => format!("{RULES_TEXT} | Esc: back"),
            Screen::Playing => String::new(),
        }
    }

    pub fn command(&mut self, command: AppCommand, presenter: &mut dyn Presenter) {
        match (self.screen, command) {
            (Screen::MainMenu, AppCommand::Confirm) => self.on_play_clicked(presenter),
            (Screen::MainMenu, AppCommand::Rules) => self.on_rules_clicked(),
            (Screen::Rules, AppCommand::Confirm | AppCommand::Back) => {
                self.screen = Screen::MainMenu;
            }
            (Screen::Playing, AppCommand::Confirm) => {
                let phase = self.session.as_ref().map(GameSession::phase);
                if phase == Some(Phase::Complete) {
                    self.on_replay_clicked(presenter);
                } else {
                    self.on_start_clicked(presenter);
                }
            }
            (Screen::Playing, AppCommand::Back) => self.on_exit_clicked(presenter),
            (_, AppCommand::SelectMode(mode)) => {
                self.select_mode(mode, presenter);
            }
            (screen, command) => debug!("{command:?} ignored on {screen:?}"),
        }
    }

    pub fn on_play_clicked(&mut self, presenter: &mut dyn Presenter) {
        if self.screen != Screen::MainMenu {
            return;
        }
        info!("entering play screen in {} mode", self.mode);
        self.screen = Screen::Playing;
        self.begin_load(presenter);
    }

    pub fn on_rules_clicked(&mut self) {
        if self.screen == Screen::MainMenu {
            self.screen = Screen::Rules;
        }
    }

    /// Changes the mode. Only possible before a session has left `Idle`;
    /// on the play screen the model is reclassified.
    pub fn select_mode(&mut self, mode: Mode, presenter: &mut dyn Presenter) -> bool {
        match self.screen {
            Screen::MainMenu | Screen::Rules => {
                self.mode = mode;
                true
            }
            Screen::Playing => {
                let idle = self
                    .session
                    .as_ref()
                    .map_or(true, |session| session.phase() == Phase::Idle);
                if !idle || self.pending.is_some() {
                    debug!("mode change ignored while playing");
                    return false;
                }
                self.mode = mode;
                info!("switching to {mode} mode");
                self.begin_load(presenter);
                true
            }
        }
    }

    /// Starts the countdown, or retries a failed load.
    pub fn on_start_clicked(&mut self, presenter: &mut dyn Presenter) {
        if self.screen != Screen::Playing {
            return;
        }
        match self.session.as_mut() {
            Some(session) => {
                session.start(presenter);
            }
            None if self.pending.is_none() => {
                info!("retrying model load");
                self.begin_load(presenter);
            }
            None => debug!("start ignored while loading"),
        }
    }

    pub fn on_replay_clicked(&mut self, presenter: &mut dyn Presenter) {
        if let (Some(session), Some(model)) = (self.session.as_mut(), self.model.as_mut()) {
            session.replay(model, presenter);
        }
    }

    /// Tears the play scene down and returns to the menu.
    pub fn on_exit_clicked(&mut self, presenter: &mut dyn Presenter) {
        match self.screen {
            Screen::Playing => {
                self.teardown(presenter);
                self.screen = Screen::MainMenu;
                info!("returned to main menu");
            }
            Screen::Rules => self.screen = Screen::MainMenu,
            Screen::MainMenu => {}
        }
    }

    /// Scores a click at pixel `pointer` of a viewport of the given size.
    pub fn on_pointer_click(
        &mut self,
        pointer: Vec2,
        viewport: (u32, u32),
        presenter: &mut dyn Presenter,
    ) -> ClickOutcome {
        let (Some(session), Some(model)) = (self.session.as_mut(), self.model.as_mut()) else {
            debug!("click ignored before the model is ready");
            return ClickOutcome::Ignored;
        };
        let ray = self.camera.ray_from_screen(pointer, viewport);
        session.pointer_click(&ray, &self.hit_tester, model, presenter)
    }

    /// Scores a click that already hit the model at `point`.
    pub fn place_at(&mut self, point: Vec3, presenter: &mut dyn Presenter) -> ClickOutcome {
        match (self.session.as_mut(), self.model.as_mut()) {
            (Some(session), Some(model)) => session.place_at(point, model, presenter),
            _ => ClickOutcome::Ignored,
        }
    }

    pub fn on_drag(&mut self, delta: Vec2, viewport_height: u32) {
        if self.screen == Screen::Playing {
            self.camera.rotate(delta, viewport_height);
        }
    }

    pub fn on_scroll(&mut self, steps: f32) {
        if self.screen == Screen::Playing {
            self.camera.zoom(steps);
        }
    }

    /// Per-frame update: completes a pending load, then advances timers and the camera.
    pub fn update(&mut self, dt: Duration, presenter: &mut dyn Presenter) {
        if let Some(result) = self.pending.as_mut().and_then(PendingLoad::poll) {
            self.pending = None;
            self.finish_load(result, presenter);
        }
        if let Some(session) = self.session.as_mut() {
            session.tick(dt, presenter);
        }
        self.camera.update(dt);
    }

    /// Blocks until a pending load completes. Used by headless runs.
    pub fn wait_for_load(&mut self, presenter: &mut dyn Presenter) -> bool {
        match self.pending.take() {
            Some(pending) => {
                let result = pending.wait();
                self.finish_load(result, presenter);
                self.session.is_some()
            }
            None => self.session.is_some(),
        }
    }

    fn begin_load(&mut self, presenter: &mut dyn Presenter) {
        self.teardown(presenter);
        let path = self.base_dir.join(&self.manifest.model);
        self.pending = Some(match self.cache.get(&path) {
            Some(tree) => {
                debug!("using cached model {}", path.display());
                PendingLoad::ready(tree)
            }
            None => PendingLoad::spawn(self.manifest.clone(), self.base_dir.clone()),
        });
    }

    fn finish_load(
        &mut self,
        result: Result<ModelTree, crate::assets::AssetError>,
        presenter: &mut dyn Presenter,
    ) {
        let pristine = match result {
            Ok(tree) => tree,
            Err(err) => {
                warn!("model load failed: {err}");
                presenter.show_error(&format!("Failed to load model: {err}. Press Enter to retry."));
                return;
            }
        };
        let path = self.base_dir.join(&self.manifest.model);
        if !self.cache.contains(&path) {
            self.cache.insert(path, pristine.clone());
        }

        let mut model = pristine;
        let classification = match classify(
            &mut model,
            &self.manifest.organs,
            &self.manifest.obstructions,
            self.mode,
        ) {
            Ok(classification) => classification,
            Err(err) => {
                presenter.show_error(&err.to_string());
                return;
            }
        };
        info!(
            "{} target(s), {} obstruction(s) hidden",
            classification.targets.len(),
            classification.obstructions.len()
        );

        let config = SessionConfig::from_manifest(&self.manifest, self.mode);
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        match GameSession::with_rng(self.mode, classification.targets, config, rng) {
            Ok(session) => {
                if let Some(bounds) = model.bounds() {
                    let intro = Duration::from_secs_f32(self.manifest.camera.intro_seconds.max(0.0));
                    self.camera.frame(&bounds, intro);
                }
                self.model = Some(model);
                self.session = Some(session);
                self.generation += 1;
                presenter.show_prompt("Press Enter to start");
            }
            Err(err) => presenter.show_error(&err.to_string()),
        }
    }

    fn teardown(&mut self, presenter: &mut dyn Presenter) {
        if let Some(mut session) = self.session.take() {
            session.cancel_timers();
        }
        self.pending = None;
        if self.model.take().is_some() {
            self.generation += 1;
        }
        presenter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::present::GameEvent;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const OBJ: &str = "o Heart_mesh
v -0.1 -0.1 0
v 0.1 -0.1 0
v 0 0.1 0
f 1 2 3
o Rib_1
v 1 1 0
v 2 1 0
v 1 2 0
f 4 5 6
o Skin
v -5 -5 -1
v 5 -5 -1
v 0 5 -1
f 7 8 9
";

    fn app(obj: &str) -> (TempDir, GameApp) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("body.obj"), obj).unwrap();
        let manifest = GameManifest {
            model: "body.obj".to_string(),
            ..GameManifest::default()
        };
        let app = GameApp::new(manifest, dir.path().to_path_buf()).with_seed(Some(1));
        (dir, app)
    }

    #[test]
    fn play_loads_and_waits_in_idle() {
        let (_dir, mut app) = app(OBJ);
        let mut events: Vec<GameEvent> = Vec::new();
        app.command(AppCommand::Confirm, &mut events);
        assert_eq!(app.screen(), Screen::Playing);
        assert!(app.wait_for_load(&mut events));
        assert_eq!(app.session().unwrap().phase(), Phase::Idle);
        let model = app.model().unwrap();
        let rib = model.find("Rib_1").unwrap();
        assert!(!model.is_effectively_visible(rib));
        assert!(!model.is_effectively_visible(model.find("Heart_mesh").unwrap()));
    }

    #[test]
    fn clicks_before_load_are_ignored() {
        let (_dir, mut app) = app(OBJ);
        let mut events: Vec<GameEvent> = Vec::new();
        app.on_play_clicked(&mut events);
        let outcome = app.on_pointer_click(Vec2::new(10.0, 10.0), (100, 100), &mut events);
        assert_eq!(outcome, ClickOutcome::Ignored);
    }

    #[test]
    fn load_failure_is_reported_and_retryable() {
        let dir = tempdir().unwrap();
        let manifest = GameManifest {
            model: "missing.obj".to_string(),
            ..GameManifest::default()
        };
        let mut app = GameApp::new(manifest, dir.path().to_path_buf());
        let mut events: Vec<GameEvent> = Vec::new();
        app.on_play_clicked(&mut events);
        assert!(!app.wait_for_load(&mut events));
        assert!(matches!(events.last(), Some(GameEvent::Error(_))));

        fs::write(dir.path().join("missing.obj"), OBJ).unwrap();
        app.on_start_clicked(&mut events);
        assert!(app.is_loading());
        assert!(app.wait_for_load(&mut events));
    }

    #[test]
    fn exit_cancels_the_session() {
        let (_dir, mut app) = app(OBJ);
        let mut events: Vec<GameEvent> = Vec::new();
        app.on_play_clicked(&mut events);
        app.wait_for_load(&mut events);
        app.on_start_clicked(&mut events);
        assert_eq!(app.session().unwrap().phase(), Phase::CountingDown);
        let generation = app.scene_generation();

        app.on_exit_clicked(&mut events);
        assert_eq!(app.screen(), Screen::MainMenu);
        assert!(app.session().is_none());
        assert!(app.model().is_none());
        assert!(app.scene_generation() > generation);
        let before = events.len();
        app.update(Duration::from_secs(10), &mut events);
        assert_eq!(events.len(), before);
    }

    #[test]
    fn mode_switch_reclassifies_only_while_idle() {
        let (_dir, mut app) = app(OBJ);
        let mut events: Vec<GameEvent> = Vec::new();
        app.on_play_clicked(&mut events);
        app.wait_for_load(&mut events);
        assert!(app.select_mode(Mode::Grouped, &mut events));
        app.update(Duration::ZERO, &mut events);
        assert_eq!(app.session().unwrap().mode(), Mode::Grouped);

        app.on_start_clicked(&mut events);
        assert!(!app.select_mode(Mode::Individual, &mut events));
        assert_eq!(app.mode(), Mode::Grouped);
    }

    #[test]
    fn full_round_through_the_app() {
        let (_dir, mut app) = app(OBJ);
        let mut events: Vec<GameEvent> = Vec::new();
        app.on_play_clicked(&mut events);
        app.wait_for_load(&mut events);
        app.command(AppCommand::Confirm, &mut events);
        app.update(Duration::from_secs(3), &mut events);
        assert_eq!(app.session().unwrap().phase(), Phase::Active);

        let target = app.session().unwrap().current_target().unwrap().target_position();
        assert!(matches!(
            app.place_at(target, &mut events),
            ClickOutcome::Placed(_)
        ));
        assert_eq!(app.session().unwrap().phase(), Phase::Victory);
        app.update(Duration::from_secs(5), &mut events);
        assert_eq!(app.session().unwrap().phase(), Phase::Complete);

        app.command(AppCommand::Confirm, &mut events);
        assert_eq!(app.session().unwrap().phase(), Phase::CountingDown);
    }

    #[test]
    fn rules_screen_round_trip() {
        let (_dir, mut app) = app(OBJ);
        let mut events: Vec<GameEvent> = Vec::new();
        app.command(AppCommand::Rules, &mut events);
        assert_eq!(app.screen(), Screen::Rules);
        assert!(app.menu_text().starts_with(RULES_TEXT));
        app.command(AppCommand::Back, &mut events);
        assert_eq!(app.screen(), Screen::MainMenu);
    }
}
