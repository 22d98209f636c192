use std::time::Duration;

use glam::Vec3;
use log::{info, warn};

use crate::effects::{AudioCue, Effects};

/// Calls the game core makes on whatever draws the game.
pub trait Presenter {
    fn show_prompt(&mut self, text: &str);
    fn show_countdown(&mut self, remaining: u32);
    fn show_timer(&mut self, seconds: u32);
    fn show_success_feedback(&mut self, point: Vec3);
    fn show_failure_feedback(&mut self, point: Vec3);
    fn show_victory(&mut self);
    fn show_replay_affordance(&mut self);
    fn show_error(&mut self, message: &str);

    /// Drops every overlay and pending effect when the play scene is torn down.
    fn reset(&mut self) {}
}

/// Recorded presenter call, mainly useful for tests and headless runs.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Prompt(String),
    Countdown(u32),
    Timer(u32),
    Success(Vec3),
    Failure(Vec3),
    Victory,
    ReplayAvailable,
    Error(String),
}

impl Presenter for Vec<GameEvent> {
    fn show_prompt(&mut self, text: &str) {
        self.push(GameEvent::Prompt(text.to_string()));
    }

    fn show_countdown(&mut self, remaining: u32) {
        self.push(GameEvent::Countdown(remaining));
    }

    fn show_timer(&mut self, seconds: u32) {
        self.push(GameEvent::Timer(seconds));
    }

    fn show_success_feedback(&mut self, point: Vec3) {
        self.push(GameEvent::Success(point));
    }

    fn show_failure_feedback(&mut self, point: Vec3) {
        self.push(GameEvent::Failure(point));
    }

    fn show_victory(&mut self) {
        self.push(GameEvent::Victory);
    }

    fn show_replay_affordance(&mut self) {
        self.push(GameEvent::ReplayAvailable);
    }

    fn show_error(&mut self, message: &str) {
        self.push(GameEvent::Error(message.to_string()));
    }
}

/// Presenter that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn show_prompt(&mut self, text: &str) {
        info!("prompt: {text}");
    }

    fn show_countdown(&mut self, remaining: u32) {
        info!("countdown: {remaining}");
    }

    fn show_timer(&mut self, seconds: u32) {
        info!("time: {}", format_clock(seconds));
    }

    fn show_success_feedback(&mut self, point: Vec3) {
        info!("correct at ({:.3}, {:.3}, {:.3})", point.x, point.y, point.z);
    }

    fn show_failure_feedback(&mut self, point: Vec3) {
        info!("wrong at ({:.3}, {:.3}, {:.3})", point.x, point.y, point.z);
    }

    fn show_victory(&mut self) {
        info!("victory");
    }

    fn show_replay_affordance(&mut self) {
        info!("replay available");
    }

    fn show_error(&mut self, message: &str) {
        warn!("{message}");
    }
}

/// `mm:ss` rendering of an elapsed second count.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Text overlay state. The windowed front end shows it in the title bar.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Hud {
    pub prompt: Option<String>,
    pub countdown: Option<u32>,
    pub timer: Option<u32>,
    pub banner: Option<String>,
    pub replay: bool,
    pub error: Option<String>,
}

impl Hud {
    pub fn clear(&mut self) {
        *self = Hud::default();
    }

    /// Single line summary, e.g. `Place the liver | 00:12`.
    pub fn line(&self) -> String {
        let mut parts = Vec::new();
        if let Some(error) = &self.error {
            parts.push(format!("Error: {error}"));
        }
        if let Some(remaining) = self.countdown {
            parts.push(format!("Starting in {remaining}"));
        } else if let Some(prompt) = &self.prompt {
            parts.push(prompt.clone());
        }
        if let Some(seconds) = self.timer {
            parts.push(format_clock(seconds));
        }
        if let Some(banner) = &self.banner {
            parts.push(banner.clone());
        }
        if self.replay {
            parts.push("Press Enter to replay".to_string());
        }
        parts.join(" | ")
    }
}

/// Frame rate averaged over one second windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameStats {
    frames: u32,
    window: Duration,
}

impl FrameStats {
    /// Counts one frame; returns the rate once a full second has accumulated.
    pub fn record(&mut self, dt: Duration) -> Option<f32> {
        self.frames += 1;
        self.window += dt;
        if self.window < Duration::from_secs(1) {
            return None;
        }
        let fps = self.frames as f32 / self.window.as_secs_f32();
        *self = Self::default();
        Some(fps)
    }
}

/// Presenter used by the windowed front end: HUD text plus scene effects.
#[derive(Debug)]
pub struct ScenePresenter {
    pub hud: Hud,
    pub effects: Effects,
}

impl ScenePresenter {
    pub fn new(effects: Effects) -> Self {
        Self {
            hud: Hud::default(),
            effects,
        }
    }
}

impl Presenter for ScenePresenter {
    fn show_prompt(&mut self, text: &str) {
        self.hud.prompt = Some(text.to_string());
    }

    fn show_countdown(&mut self, remaining: u32) {
        self.hud.countdown = Some(remaining);
        self.hud.timer = None;
        self.hud.prompt = None;
        self.hud.replay = false;
        self.hud.banner = None;
    }

    fn show_timer(&mut self, seconds: u32) {
        self.hud.countdown = None;
        self.hud.timer = Some(seconds);
    }

    fn show_success_feedback(&mut self, point: Vec3) {
        self.effects.success_marker(point);
        self.effects.play(AudioCue::Success);
    }

    fn show_failure_feedback(&mut self, point: Vec3) {
        self.effects.failure_marker(point);
        self.effects.play(AudioCue::Wrong);
    }

    fn show_victory(&mut self) {
        self.hud.banner = Some("Congratulations! You have completed the game!".to_string());
        self.effects.victory_burst();
        self.effects.play(AudioCue::Victory);
    }

    fn show_replay_affordance(&mut self) {
        self.hud.replay = true;
    }

    fn show_error(&mut self, message: &str) {
        warn!("{message}");
        self.hud.error = Some(message.to_string());
    }

    fn reset(&mut self) {
        self.hud.clear();
        self.effects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hud_line_prefers_countdown_over_prompt() {
        let mut hud = Hud::default();
        hud.prompt = Some("Place the liver".into());
        hud.countdown = Some(2);
        assert_eq!(hud.line(), "Starting in 2");
        hud.countdown = None;
        hud.timer = Some(75);
        assert_eq!(hud.line(), "Place the liver | 01:15");
    }

    #[test]
    fn scene_presenter_drives_effects_until_reset() {
        let effects = Effects::new(Duration::from_millis(200), Duration::from_secs(5));
        let mut presenter = ScenePresenter::new(effects);
        presenter.show_failure_feedback(Vec3::ONE);
        presenter.show_victory();
        assert_eq!(presenter.effects.markers().len(), 1);
        assert_eq!(
            presenter.effects.played(),
            &[AudioCue::Wrong, AudioCue::Victory]
        );
        assert!(presenter.hud.line().starts_with("Congratulations!"));

        presenter.reset();
        assert!(presenter.effects.is_idle());
        assert_eq!(presenter.hud, Hud::default());
    }

    #[test]
    fn countdown_after_replay_drops_stale_clock() {
        let effects = Effects::new(Duration::from_millis(200), Duration::from_secs(5));
        let mut presenter = ScenePresenter::new(effects);
        presenter.show_timer(12);
        presenter.show_prompt("Congratulations! All organs placed correctly!");
        presenter.show_victory();
        presenter.show_replay_affordance();

        presenter.show_countdown(3);
        assert_eq!(presenter.hud.line(), "Starting in 3");
        presenter.show_prompt("Place the heart");
        presenter.show_timer(0);
        assert_eq!(presenter.hud.line(), "Place the heart | 00:00");
    }

    #[test]
    fn frame_stats_reports_once_per_second() {
        let mut stats = FrameStats::default();
        let frame = Duration::from_millis(20);
        for _ in 0..49 {
            assert_eq!(stats.record(frame), None);
        }
        let fps = stats.record(frame).unwrap();
        assert!((fps - 50.0).abs() < 1e-3);
        assert_eq!(stats.record(frame), None);
    }

    #[test]
    fn recording_presenter_keeps_call_order() {
        let mut events: Vec<GameEvent> = Vec::new();
        events.show_countdown(3);
        events.show_prompt("Place the heart");
        events.show_victory();
        assert_eq!(
            events,
            vec![
                GameEvent::Countdown(3),
                GameEvent::Prompt("Place the heart".into()),
                GameEvent::Victory
            ]
        );
    }
}
