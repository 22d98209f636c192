use std::f32::consts::{FRAC_PI_2, TAU};
use std::time::Duration;

use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};

use crate::manifest::CameraSettings;
use crate::model::Aabb;
use crate::raycast::Ray;

const NEAR: f32 = 0.01;
const FAR: f32 = 1000.0;
const DAMPING: f32 = 0.25;
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Flight from one eye position to another, looking at a fixed point.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CameraIntro {
    from: Vec3,
    to: Vec3,
    duration: Duration,
    elapsed: Duration,
}

impl CameraIntro {
    fn position(&self) -> Vec3 {
        let t = if self.duration.is_zero() {
            1.0
        } else {
            (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
        };
        self.from.lerp(self.to, ease_quadratic_in_out(t))
    }

    fn finished(&self) -> bool {
        self.elapsed >= self.duration
    }
}

pub fn ease_quadratic_in_out(t: f32) -> f32 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// Orbit camera without panning: yaw/pitch around a target at a clamped distance.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub fov_degrees: f32,
    pending: Vec2,
    intro: Option<CameraIntro>,
}

impl OrbitCamera {
    pub fn new(settings: &CameraSettings) -> Self {
        Self {
            target: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            distance: settings.max_distance,
            min_distance: settings.min_distance,
            max_distance: settings.max_distance,
            fov_degrees: settings.fov,
            pending: Vec2::ZERO,
            intro: None,
        }
    }

    /// Looks at the centre of `bounds` from `size.z + 1` in front of it and
    /// optionally flies in from above and behind over `intro`.
    pub fn frame(&mut self, bounds: &Aabb, intro: Duration) {
        let center = bounds.center();
        let size = bounds.size();
        self.target = center;
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.pending = Vec2::ZERO;
        self.distance = (size.z + 1.0).clamp(self.min_distance, self.max_distance);
        self.intro = (!intro.is_zero()).then(|| CameraIntro {
            from: center + Vec3::new(0.0, 4.0, size.z + 5.0),
            to: self.orbit_eye(),
            duration: intro,
            elapsed: Duration::ZERO,
        });
    }

    pub fn in_intro(&self) -> bool {
        self.intro.is_some()
    }

    /// Queues a drag rotation in pixels; a drag across the full viewport height is one turn.
    pub fn rotate(&mut self, delta: Vec2, viewport_height: u32) {
        if self.intro.is_some() {
            return;
        }
        let height = viewport_height.max(1) as f32;
        self.pending += delta * (TAU / height);
    }

    /// Positive steps move closer.
    pub fn zoom(&mut self, steps: f32) {
        self.distance = (self.distance * 0.95f32.powf(steps)).clamp(self.min_distance, self.max_distance);
    }

    pub fn update(&mut self, dt: Duration) {
        if let Some(intro) = self.intro.as_mut() {
            intro.elapsed += dt;
            if intro.finished() {
                self.intro = None;
            }
            return;
        }
        let step = self.pending * DAMPING;
        self.yaw -= step.x;
        self.pitch = (self.pitch + step.y).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.pending *= 1.0 - DAMPING;
        if self.pending.length_squared() < 1e-10 {
            self.pending = Vec2::ZERO;
        }
    }

    fn orbit_eye(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        self.target + Vec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw) * self.distance
    }

    pub fn eye(&self) -> Vec3 {
        match &self.intro {
            Some(intro) => intro.position(),
            None => self.orbit_eye(),
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), aspect.max(0.01), NEAR, FAR)
    }

    pub fn params(&self, aspect: f32) -> CameraParams {
        CameraParams {
            view_proj: self.projection(aspect) * self.view(),
            position: self.eye(),
        }
    }

    /// World-space ray through a pixel of a `width x height` viewport.
    pub fn ray_from_screen(&self, pointer: Vec2, viewport: (u32, u32)) -> Ray {
        let (width, height) = (viewport.0.max(1) as f32, viewport.1.max(1) as f32);
        let ndc = Vec2::new(pointer.x / width * 2.0 - 1.0, 1.0 - pointer.y / height * 2.0);
        let inverse = self.params(width / height).view_proj.inverse();
        let near = inverse * ndc.extend(0.0).extend(1.0);
        let far = inverse * ndc.extend(1.0).extend(1.0);
        let near = near.xyz() / near.w;
        let far = far.xyz() / far.w;
        Ray::new(near, far - near)
    }
}
