use std::any::Any;
use std::env;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use log::{debug, info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode as WinitKeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use anatomy_game::{
    classify, load_model, AppCommand, ClickOutcome, Effects, GameApp, GameEvent, GameManifest,
    InputState, KeyCode, LightParams, Mode, MouseButton, NamedKey, Phase, PointerRelease,
    FrameStats, Presenter, Renderer, ScenePresenter, Screen, Verdict,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let source = fs::read_to_string(&options.path)
        .with_context(|| format!("failed to read manifest {}", options.path.display()))?;
    let mut manifest = GameManifest::from_xml(&source)
        .with_context(|| format!("failed to parse manifest {}", options.path.display()))?;
    if let Some(mode) = options.mode {
        manifest.mode = mode;
    }
    let base_dir = options
        .path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    println!(
        "Loaded manifest \"{}\" ({} organ groups, {} obstruction keywords)",
        manifest.title,
        manifest.organs.len(),
        manifest.obstructions.len()
    );

    if options.summary_only {
        run_summary(&manifest, &base_dir)
    } else if options.autoplay {
        run_autoplay(manifest, base_dir, options.seed)
    } else {
        match run_interactive(manifest.clone(), base_dir.clone(), options.seed) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                    );
                    run_summary(&manifest, &base_dir)
                } else {
                    Err(err)
                }
            }
        }
    }
}

fn run_summary(manifest: &GameManifest, base_dir: &Path) -> Result<()> {
    let mut model = load_model(manifest, base_dir).context("failed to load model")?;
    println!(
        "Model has {} nodes ({} meshes)",
        model.len(),
        model.mesh_ids().count()
    );
    let classification = classify(
        &mut model,
        &manifest.organs,
        &manifest.obstructions,
        manifest.mode,
    )?;
    println!(
        "Mode {}: {} target(s)",
        manifest.mode,
        classification.targets.len()
    );
    for target in &classification.targets {
        let position = target.target_position();
        println!(
            " - {} \"{}\" at ({:.3}, {:.3}, {:.3}) [{} node(s)]",
            target.id(),
            target.display_name(),
            position.x,
            position.y,
            position.z,
            target.member_nodes().len()
        );
    }
    println!("Hidden obstructions: {}", classification.obstructions.len());
    Ok(())
}

/// Plays one full session without a window: one deliberate miss, then every
/// organ placed exactly, one second apart.
fn run_autoplay(manifest: GameManifest, base_dir: PathBuf, seed: Option<u64>) -> Result<()> {
    let mode = manifest.mode;
    let threshold = manifest.threshold(mode);
    let countdown = manifest.countdown;
    let victory = manifest.victory_duration();
    let mut app = GameApp::new(manifest, base_dir).with_seed(seed);
    let mut events: Vec<GameEvent> = Vec::new();

    app.on_play_clicked(&mut events);
    if !app.wait_for_load(&mut events) {
        let message = events
            .iter()
            .rev()
            .find_map(|event| match event {
                GameEvent::Error(message) => Some(message.clone()),
                _ => None,
            })
            .unwrap_or_else(|| "model did not load".to_string());
        return Err(anyhow!(message));
    }

    app.on_start_clicked(&mut events);
    for _ in 0..countdown {
        app.update(Duration::from_secs(1), &mut events);
    }
    println!("Playing {mode} mode");

    let mut missed = false;
    loop {
        let target = match app.session() {
            Some(session) if session.phase() == Phase::Active => session.current_target().cloned(),
            _ => None,
        };
        let Some(target) = target else {
            break;
        };
        if !missed {
            missed = true;
            let miss = target.target_position() + Vec3::X * threshold * 2.0;
            report(app.place_at(miss, &mut events), target.display_name());
        }
        app.update(Duration::from_secs(1), &mut events);
        report(
            app.place_at(target.target_position(), &mut events),
            target.display_name(),
        );
    }

    let session = app
        .session()
        .ok_or_else(|| anyhow!("session ended unexpectedly"))?;
    println!(
        "All {} organ(s) placed in {}s",
        session.targets().len(),
        session.elapsed_seconds()
    );
    app.update(victory, &mut events);
    if app.session().map(|session| session.phase()) == Some(Phase::Complete) {
        println!("Session complete; replay available");
    }
    Ok(())
}

fn report(outcome: ClickOutcome, name: &str) {
    if let ClickOutcome::Placed(attempt) = outcome {
        let verdict = match attempt.verdict {
            Verdict::Correct => "Correct",
            Verdict::Incorrect => "Incorrect",
        };
        println!("{verdict}: {name} (distance {:.4})", attempt.distance);
    }
}

fn run_interactive(manifest: GameManifest, base_dir: PathBuf, seed: Option<u64>) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    let effects = Effects::new(manifest.marker_duration(), manifest.victory_duration());
    let title = manifest.title.clone();
    let mut state = InteractiveState {
        app: GameApp::new(manifest, base_dir).with_seed(seed),
        presenter: ScenePresenter::new(effects),
        input: InputState::new(),
        renderer: None,
        title,
        shown_title: String::new(),
        generation: 0,
        last_frame: Instant::now(),
        stats: FrameStats::default(),
        last_error: None,
    };

    event_loop
        .run_app(&mut state)
        .context("event loop terminated abnormally")?;
    state.shutdown();

    if let Some(err) = state.last_error {
        return Err(err);
    }
    Ok(())
}

struct InteractiveState {
    app: GameApp,
    presenter: ScenePresenter,
    input: InputState,
    renderer: Option<Renderer>,
    title: String,
    shown_title: String,
    generation: u64,
    last_frame: Instant,
    stats: FrameStats,
    last_error: Option<anyhow::Error>,
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

impl ApplicationHandler for InteractiveState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.last_error = Some(WindowInitError::from_error("window", err).into());
                event_loop.exit();
                return;
            }
        };
        match block_on(Renderer::new(window)) {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                self.last_frame = Instant::now();
            }
            Err(err) => {
                self.last_error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if window_id != renderer.window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => renderer.resize(size),
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                let Some(key) = map_keycode(code) else {
                    return;
                };
                match event.state {
                    ElementState::Pressed => {
                        if self.input.set_key_down(key) {
                            if let Some(command) = AppCommand::for_key(key) {
                                self.app.command(command, &mut self.presenter);
                            }
                        }
                    }
                    ElementState::Released => self.input.set_key_up(key),
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let index = match button {
                    WinitMouseButton::Left => 0,
                    WinitMouseButton::Right => 1,
                    WinitMouseButton::Middle => 2,
                    WinitMouseButton::Back => 3,
                    WinitMouseButton::Forward => 4,
                    WinitMouseButton::Other(value) => value.min(u8::MAX as u16) as u8,
                };
                let button = MouseButton::new(index);
                match state {
                    ElementState::Pressed => self.input.set_mouse_button_down(button),
                    ElementState::Released => {
                        if let Some(PointerRelease::Click(position)) =
                            self.input.set_mouse_button_up(button)
                        {
                            let size = renderer.size();
                            let outcome = self.app.on_pointer_click(
                                position,
                                (size.width, size.height),
                                &mut self.presenter,
                            );
                            if outcome == ClickOutcome::NoHit {
                                info!("click missed the model");
                            }
                        }
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = Vec2::new(position.x as f32, position.y as f32);
                if let Some(delta) = self.input.set_mouse_position(position) {
                    self.app.on_drag(delta, renderer.size().height);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(offset) => offset.y as f32 / 50.0,
                };
                self.app.on_scroll(steps);
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.last_error = Some(err);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_ref() {
            renderer.window().request_redraw();
        }
    }
}

impl InteractiveState {
    fn redraw(&mut self) -> Result<()> {
        let now = Instant::now();
        let dt = now - self.last_frame;
        self.last_frame = now;
        if let Some(fps) = self.stats.record(dt) {
            debug!("{fps:.1} fps");
        }

        self.app.update(dt, &mut self.presenter);
        self.presenter.effects.update(dt);
        if self.generation != self.app.scene_generation() {
            self.generation = self.app.scene_generation();
            if let Some(center) = self.app.model_center() {
                self.presenter.effects.set_origin(center);
            }
        }

        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let status = match self.app.screen() {
            Screen::Playing => self.presenter.hud.line(),
            _ => self.app.menu_text(),
        };
        let title = if status.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {status}", self.title)
        };
        if title != self.shown_title {
            renderer.window().set_title(&title);
            self.shown_title = title;
        }

        renderer.sync_scene(self.generation);
        let size = renderer.size();
        let aspect = size.width as f32 / size.height.max(1) as f32;
        let camera = self.app.camera().params(aspect);
        renderer.update_globals(&camera, &LightParams::headlight(camera.position));
        if let Err(err) = renderer.render(self.app.model(), &self.presenter.effects.instances()) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = renderer.window().inner_size();
                    renderer.resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    warn!("Surface timeout; retrying next frame");
                }
                other => warn!("Surface error {other:?}; retrying next frame"),
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.app.on_exit_clicked(&mut self.presenter);
        self.presenter.reset();
        println!("Exited from {:?}", self.app.screen());
    }
}

fn map_keycode(code: WinitKeyCode) -> Option<KeyCode> {
    use WinitKeyCode as Key;
    Some(match code {
        Key::Space => KeyCode::Named(NamedKey::Space),
        Key::Enter | Key::NumpadEnter => KeyCode::Named(NamedKey::Enter),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::Digit0 | Key::Numpad0 => KeyCode::Digit(0),
        Key::Digit1 | Key::Numpad1 => KeyCode::Digit(1),
        Key::Digit2 | Key::Numpad2 => KeyCode::Digit(2),
        Key::Digit3 | Key::Numpad3 => KeyCode::Digit(3),
        Key::Digit4 | Key::Numpad4 => KeyCode::Digit(4),
        Key::Digit5 | Key::Numpad5 => KeyCode::Digit(5),
        Key::Digit6 | Key::Numpad6 => KeyCode::Digit(6),
        Key::Digit7 | Key::Numpad7 => KeyCode::Digit(7),
        Key::Digit8 | Key::Numpad8 => KeyCode::Digit(8),
        Key::Digit9 | Key::Numpad9 => KeyCode::Digit(9),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyB => KeyCode::Character('B'),
        Key::KeyC => KeyCode::Character('C'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyE => KeyCode::Character('E'),
        Key::KeyF => KeyCode::Character('F'),
        Key::KeyG => KeyCode::Character('G'),
        Key::KeyH => KeyCode::Character('H'),
        Key::KeyI => KeyCode::Character('I'),
        Key::KeyJ => KeyCode::Character('J'),
        Key::KeyK => KeyCode::Character('K'),
        Key::KeyL => KeyCode::Character('L'),
        Key::KeyM => KeyCode::Character('M'),
        Key::KeyN => KeyCode::Character('N'),
        Key::KeyO => KeyCode::Character('O'),
        Key::KeyP => KeyCode::Character('P'),
        Key::KeyQ => KeyCode::Character('Q'),
        Key::KeyR => KeyCode::Character('R'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyT => KeyCode::Character('T'),
        Key::KeyU => KeyCode::Character('U'),
        Key::KeyV => KeyCode::Character('V'),
        Key::KeyW => KeyCode::Character('W'),
        Key::KeyX => KeyCode::Character('X'),
        Key::KeyY => KeyCode::Character('Y'),
        Key::KeyZ => KeyCode::Character('Z'),
        _ => return None,
    })
}

struct CliOptions {
    path: PathBuf,
    summary_only: bool,
    autoplay: bool,
    mode: Option<Mode>,
    seed: Option<u64>,
}

const USAGE: &str = "Usage: anatomy-game <manifest.xml> [--summary-only] [--autoplay] [--mode individual|grouped] [--seed N]";

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let mut options = Self {
            path: PathBuf::from(path),
            summary_only: false,
            autoplay: false,
            mode: None,
            seed: None,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => options.summary_only = true,
                "--autoplay" => options.autoplay = true,
                "--mode" => {
                    let value = args.next().ok_or_else(|| anyhow!("--mode needs a value"))?;
                    options.mode = Some(value.parse()?);
                }
                "--seed" => {
                    let value = args.next().ok_or_else(|| anyhow!("--seed needs a value"))?;
                    options.seed = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid seed {value:?}"))?,
                    );
                }
                other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
            }
        }
        Ok(options)
    }
}
