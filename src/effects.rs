use std::time::Duration;

use glam::Vec3;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::timer::Scheduler;

const MARKER_RADIUS: f32 = 0.05;
const PARTICLE_RADIUS: f32 = 0.01;
const BURST_PARTICLES: usize = 96;
const BURST_SPEED: f32 = 0.4;
const GRAVITY: f32 = 0.3;
const CUE_HISTORY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCue {
    Success,
    Wrong,
    Victory,
}

impl AudioCue {
    pub fn name(self) -> &'static str {
        match self {
            AudioCue::Success => "success",
            AudioCue::Wrong => "wrong",
            AudioCue::Victory => "victory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Success,
    Failure,
}

impl MarkerKind {
    pub fn color(self) -> Vec3 {
        match self {
            MarkerKind::Success => Vec3::new(0.1, 0.8, 0.2),
            MarkerKind::Failure => Vec3::new(0.5, 0.5, 0.5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub position: Vec3,
    pub kind: MarkerKind,
    serial: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    pub color: Vec3,
}

/// Something the renderer draws as a small solid cube.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectInstance {
    pub position: Vec3,
    pub color: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Marker(u64),
    Burst,
}

/// Short-lived scene decorations: click markers, the victory burst and audio cues.
#[derive(Debug)]
pub struct Effects {
    marker_duration: Duration,
    burst_duration: Duration,
    origin: Vec3,
    markers: Vec<Marker>,
    particles: Vec<Particle>,
    played: Vec<AudioCue>,
    expiries: Scheduler<Expiry>,
    next_serial: u64,
    rng: StdRng,
}

impl Effects {
    pub fn new(marker_duration: Duration, burst_duration: Duration) -> Self {
        Self {
            marker_duration,
            burst_duration,
            origin: Vec3::ZERO,
            markers: Vec::new(),
            particles: Vec::new(),
            played: Vec::new(),
            expiries: Scheduler::new(),
            next_serial: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Where the victory burst starts, normally the model centre.
    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    pub fn success_marker(&mut self, position: Vec3) {
        self.add_marker(position, MarkerKind::Success);
    }

    pub fn failure_marker(&mut self, position: Vec3) {
        self.add_marker(position, MarkerKind::Failure);
    }

    fn add_marker(&mut self, position: Vec3, kind: MarkerKind) {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.markers.push(Marker {
            position,
            kind,
            serial,
        });
        self.expiries.after(self.marker_duration, Expiry::Marker(serial));
    }

    pub fn victory_burst(&mut self) {
        for _ in 0..BURST_PARTICLES {
            let direction = Vec3::new(
                self.rng.gen_range(-1.0..=1.0),
                self.rng.gen_range(0.2..=1.0),
                self.rng.gen_range(-1.0..=1.0),
            )
            .normalize_or_zero();
            let speed = BURST_SPEED * self.rng.gen_range(0.5..=1.0);
            let color = Vec3::new(
                self.rng.gen_range(0.4..=1.0),
                self.rng.gen_range(0.4..=1.0),
                self.rng.gen_range(0.4..=1.0),
            );
            self.particles.push(Particle {
                position: self.origin,
                velocity: direction * speed,
                color,
            });
        }
        self.expiries.after(self.burst_duration, Expiry::Burst);
    }

    /// No audio backend is linked; cues are logged and the most recent few kept.
    pub fn play(&mut self, cue: AudioCue) {
        info!("audio cue: {}", cue.name());
        if self.played.len() == CUE_HISTORY {
            self.played.remove(0);
        }
        self.played.push(cue);
    }

    /// Recent cues, oldest first.
    pub fn played(&self) -> &[AudioCue] {
        &self.played
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn is_idle(&self) -> bool {
        self.markers.is_empty() && self.particles.is_empty()
    }

    pub fn update(&mut self, dt: Duration) {
        let step = dt.as_secs_f32();
        for particle in &mut self.particles {
            particle.velocity.y -= GRAVITY * step;
            particle.position += particle.velocity * step;
        }
        for expiry in self.expiries.advance(dt) {
            match expiry {
                Expiry::Marker(serial) => self.markers.retain(|m| m.serial != serial),
                Expiry::Burst => self.particles.clear(),
            }
        }
    }

    pub fn clear(&mut self) {
        self.markers.clear();
        self.particles.clear();
        self.played.clear();
        self.expiries.cancel_all();
    }

    pub fn instances(&self) -> Vec<EffectInstance> {
        let markers = self.markers.iter().map(|marker| EffectInstance {
            position: marker.position,
            color: marker.kind.color(),
            radius: MARKER_RADIUS,
        });
        let particles = self.particles.iter().map(|particle| EffectInstance {
            position: particle.position,
            color: particle.color,
            radius: PARTICLE_RADIUS,
        });
        markers.chain(particles).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effects() -> Effects {
        Effects::new(Duration::from_millis(200), Duration::from_secs(5))
    }

    #[test]
    fn markers_expire_after_their_duration() {
        let mut fx = effects();
        fx.failure_marker(Vec3::ONE);
        fx.update(Duration::from_millis(100));
        fx.success_marker(Vec3::ZERO);
        assert_eq!(fx.markers().len(), 2);
        fx.update(Duration::from_millis(150));
        assert_eq!(fx.markers().len(), 1);
        assert_eq!(fx.markers()[0].kind, MarkerKind::Success);
        fx.update(Duration::from_millis(100));
        assert!(fx.markers().is_empty());
    }

    #[test]
    fn burst_starts_at_origin_and_ends() {
        let mut fx = effects();
        fx.set_origin(Vec3::new(0.0, 1.0, 0.0));
        fx.victory_burst();
        assert!(fx
            .particles()
            .iter()
            .all(|p| p.position == Vec3::new(0.0, 1.0, 0.0)));
        fx.update(Duration::from_secs(1));
        assert!(fx.particles().iter().any(|p| p.position.y != 1.0));
        fx.update(Duration::from_secs(4));
        assert!(fx.is_idle());
    }

    #[test]
    fn clear_drops_everything() {
        let mut fx = effects();
        fx.failure_marker(Vec3::ZERO);
        fx.victory_burst();
        fx.play(AudioCue::Wrong);
        assert_eq!(fx.instances().len(), BURST_PARTICLES + 1);
        fx.clear();
        assert!(fx.is_idle());
        assert!(fx.played().is_empty());
        fx.success_marker(Vec3::ZERO);
        fx.update(Duration::from_secs(1));
        assert!(fx.is_idle());
    }

    #[test]
    fn cue_history_keeps_only_recent_cues() {
        let mut fx = effects();
        for _ in 0..50 {
            fx.play(AudioCue::Wrong);
        }
        fx.play(AudioCue::Success);
        assert_eq!(fx.played().len(), CUE_HISTORY);
        assert_eq!(fx.played().last(), Some(&AudioCue::Success));
        assert_eq!(fx.played()[0], AudioCue::Wrong);
    }

    #[test]
    fn cue_names() {
        assert_eq!(AudioCue::Success.name(), "success");
        assert_eq!(AudioCue::Wrong.name(), "wrong");
    }
}
