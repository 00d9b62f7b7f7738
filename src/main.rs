use std::any::Any;
use std::env;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::{debug, info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{DeviceEvent, DeviceId, ElementState, MouseButton as WinitMouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

use gallery_walk::assets::{assemble, FileLoader};
use gallery_walk::input::{to_ndc, LockRequest};
use gallery_walk::interaction::{Appearance, ExhibitId, ExhibitInfo, InfoPanel, SceneBackend};
use gallery_walk::render::draw_list;
use gallery_walk::replay::{Replay, Script};
use gallery_walk::{GallerySession, InputState, KeyCode, MouseButton, NamedKey, Renderer, Scene};

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let xml = fs::read_to_string(&options.path)
        .with_context(|| format!("failed to read gallery {}", options.path))?;
    let scene = Scene::from_xml(&xml)
        .with_context(|| format!("failed to parse gallery {}", options.path))?;
    print_summary(&scene);

    let walk = match &options.walk {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read walk script {path}"))?;
            Some(Script::parse(&text).with_context(|| format!("invalid walk script {path}"))?)
        }
        None => None,
    };

    let mut session =
        GallerySession::new(scene.clone()).context("invalid gallery configuration")?;
    let loader = FileLoader::for_descriptor(Path::new(&options.path));
    let report = block_on(assemble(&scene, session.exhibits_mut(), &loader))?;
    for (id, reason) in &report.failed {
        println!(" ! {id} not loaded: {reason}");
    }

    if options.summary_only {
        return run_headless(session, walk);
    }

    match run_interactive(session.clone()) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                );
                run_headless(session, walk)
            } else {
                Err(err)
            }
        }
    }
}

fn print_summary(scene: &Scene) {
    let room = scene.room();
    println!(
        "Loaded gallery with {} exhibits ({} lights) in a {}x{}x{} room",
        scene.exhibits.len(),
        scene.light_rig().len(),
        room.width,
        room.length,
        room.height
    );
    for exhibit in &scene.exhibits {
        println!(
            " - {} \"{}\" at ({:.2}, {:.2}, {:.2})",
            exhibit.id,
            exhibit.info.title,
            exhibit.position.x,
            exhibit.position.y,
            exhibit.position.z
        );
    }
}

fn run_headless(mut session: GallerySession, walk: Option<Script>) -> Result<()> {
    let mut replay = Replay::new();
    if let Some(script) = walk {
        println!("Walking {} command(s)...", script.commands().len());
        replay.run(&mut session, &script);
        for event in replay.log() {
            println!("{event}");
        }
    }
    print_final_state(&session, replay.elapsed());
    Ok(())
}

fn print_final_state(session: &GallerySession, elapsed: f32) {
    let pose = session.pose();
    println!(
        "Final pose after {:.2}s: pos=({:.2}, {:.2}, {:.2}) yaw={:.1} pitch={:.1}",
        elapsed,
        pose.position.x,
        pose.position.y,
        pose.position.z,
        pose.yaw.to_degrees(),
        pose.pitch.to_degrees()
    );
    let exhibits = session.exhibits();
    match exhibits.selected().and_then(|handle| exhibits.exhibit(handle)) {
        Some(exhibit) => println!("Selected: {}", exhibit.id),
        None => println!("Selected: none"),
    }
}

fn run_interactive(session: GallerySession) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GalleryApp::new(session);
    event_loop
        .run_app(&mut app)
        .context("event loop terminated abnormally")?;

    if let Some(err) = app.last_error.take() {
        return Err(err);
    }
    print_final_state(&app.session, app.started.elapsed().as_secs_f32());
    Ok(())
}

struct GalleryApp {
    session: GallerySession,
    input: Arc<InputState>,
    renderer: Option<Renderer>,
    backend: RedrawScene,
    panel: TitlePanel,
    last_frame: Instant,
    started: Instant,
    cursor_grabbed: bool,
    last_error: Option<anyhow::Error>,
}

impl GalleryApp {
    fn new(session: GallerySession) -> Self {
        Self {
            session,
            input: Arc::new(InputState::new()),
            renderer: None,
            backend: RedrawScene,
            panel: TitlePanel::default(),
            last_frame: Instant::now(),
            started: Instant::now(),
            cursor_grabbed: false,
            last_error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title(WINDOW_TITLE)
                        .with_inner_size(LogicalSize::new(1280.0, 720.0)),
                )
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        let renderer = block_on(Renderer::new(Arc::clone(&window)))
            .map_err(|err| WindowInitError::from_error("renderer", format!("{err:#}")))?;
        let size = renderer.size();
        self.session.set_viewport(size.width, size.height);
        self.renderer = Some(renderer);
        self.last_frame = Instant::now();
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        let input = self.input.take_frame();
        self.session
            .tick(dt, &input, &mut self.backend, &mut self.panel);

        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let locked = self.session.controller().is_locked();
        if locked != self.cursor_grabbed {
            grab_cursor(renderer.window(), locked);
            self.cursor_grabbed = locked;
        }
        if let Some(title) = self.panel.take_title() {
            renderer.window().set_title(&title);
        }

        renderer.update_globals(&self.session.camera(), &self.session.light());
        let items = draw_list(self.session.scene(), self.session.exhibits());
        if let Err(err) = renderer.render(&items) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = renderer.window().inner_size();
                    renderer.resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    info!("Surface timeout; retrying next frame");
                }
                wgpu::SurfaceError::Other => {
                    warn!("Surface reported an unknown error; retrying next frame");
                }
            }
        }
        Ok(())
    }

    fn handle_keyboard(&self, key: PhysicalKey, state: ElementState) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        let Some(keycode) = map_keycode(code) else {
            return;
        };
        match state {
            ElementState::Pressed => self.input.set_key_down(keycode),
            ElementState::Released => self.input.set_key_up(keycode),
        }
    }

    fn handle_mouse_button(&self, state: ElementState, button: WinitMouseButton) {
        let index = match button {
            WinitMouseButton::Left => 0,
            WinitMouseButton::Right => 1,
            WinitMouseButton::Middle => 2,
            WinitMouseButton::Back => 3,
            WinitMouseButton::Forward => 4,
            WinitMouseButton::Other(value) => value.min(u16::from(u8::MAX)) as u8,
        };
        let button = MouseButton::new(index);
        match state {
            ElementState::Pressed => self.input.set_mouse_button_down(button),
            ElementState::Released => {
                self.input.set_mouse_button_up(button);
                return;
            }
        }
        if button != MouseButton::LEFT {
            return;
        }
        if self.session.controller().is_locked() {
            // A grabbed cursor aims through the centre of the view.
            self.input.push_click(Vec2::ZERO);
        } else if let Some(renderer) = &self.renderer {
            let size = renderer.size();
            self.input.push_click(to_ndc(
                self.input.mouse_position(),
                size.width as f32,
                size.height as f32,
            ));
            self.input.request_lock(LockRequest::Lock);
        }
    }
}

impl ApplicationHandler for GalleryApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.last_error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if renderer.window_id() != window_id {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                renderer.resize(size);
                self.session.set_viewport(size.width, size.height);
            }
            WindowEvent::Focused(false) => {
                self.input.clear_held();
                self.input.request_lock(LockRequest::FocusLost);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.handle_keyboard(event.physical_key, event.state);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.handle_mouse_button(state, button);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .set_mouse_position(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.frame() {
                    self.last_error = Some(err);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if self.cursor_grabbed {
                self.input
                    .add_pointer_delta(Vec2::new(dx as f32, dy as f32));
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer {
            renderer.window().request_redraw();
        }
    }
}

const WINDOW_TITLE: &str = "Gallery Walk";

fn grab_cursor(window: &Window, grab: bool) {
    if grab {
        let result = window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
        if let Err(err) = result {
            debug!("cursor grab unavailable: {err}");
        }
    } else if let Err(err) = window.set_cursor_grab(CursorGrabMode::None) {
        debug!("cursor release failed: {err}");
    }
    window.set_cursor_visible(!grab);
}

/// The window recolours every frame from the registry, so appearance
/// updates need no bookkeeping here.
struct RedrawScene;

impl SceneBackend for RedrawScene {
    fn set_appearance(&mut self, id: &ExhibitId, appearance: &Appearance) {
        debug!("exhibit {id} emissive now {:?}", appearance.emissive);
    }
}

/// Shows exhibit details in the window title.
#[derive(Default)]
struct TitlePanel {
    current: Option<ExhibitInfo>,
    pending_title: Option<String>,
}

impl TitlePanel {
    fn take_title(&mut self) -> Option<String> {
        self.pending_title.take()
    }
}

impl InfoPanel for TitlePanel {
    fn show_info(&mut self, info: &ExhibitInfo) {
        if self.current.as_ref() == Some(info) {
            return;
        }
        self.pending_title = Some(format!(
            "{WINDOW_TITLE} - {} | {}",
            info.heading(),
            info.caption()
        ));
        self.current = Some(info.clone());
    }

    fn hide_info(&mut self) {
        if self.current.take().is_some() {
            self.pending_title = Some(WINDOW_TITLE.to_string());
        }
    }
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

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    Some(match code {
        WinitKey::Space => KeyCode::Named(NamedKey::Space),
        WinitKey::Enter => KeyCode::Named(NamedKey::Enter),
        WinitKey::Tab => KeyCode::Named(NamedKey::Tab),
        WinitKey::ArrowLeft => KeyCode::Named(NamedKey::Left),
        WinitKey::ArrowRight => KeyCode::Named(NamedKey::Right),
        WinitKey::ArrowUp => KeyCode::Named(NamedKey::Up),
        WinitKey::ArrowDown => KeyCode::Named(NamedKey::Down),
        WinitKey::Escape => KeyCode::Named(NamedKey::Escape),
        WinitKey::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        WinitKey::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        WinitKey::Digit0 => KeyCode::Digit(0),
        WinitKey::Digit1 => KeyCode::Digit(1),
        WinitKey::Digit2 => KeyCode::Digit(2),
        WinitKey::Digit3 => KeyCode::Digit(3),
        WinitKey::Digit4 => KeyCode::Digit(4),
        WinitKey::Digit5 => KeyCode::Digit(5),
        WinitKey::Digit6 => KeyCode::Digit(6),
        WinitKey::Digit7 => KeyCode::Digit(7),
        WinitKey::Digit8 => KeyCode::Digit(8),
        WinitKey::Digit9 => KeyCode::Digit(9),
        WinitKey::KeyA => KeyCode::Character('A'),
        WinitKey::KeyB => KeyCode::Character('B'),
        WinitKey::KeyC => KeyCode::Character('C'),
        WinitKey::KeyD => KeyCode::Character('D'),
        WinitKey::KeyE => KeyCode::Character('E'),
        WinitKey::KeyF => KeyCode::Character('F'),
        WinitKey::KeyG => KeyCode::Character('G'),
        WinitKey::KeyH => KeyCode::Character('H'),
        WinitKey::KeyI => KeyCode::Character('I'),
        WinitKey::KeyJ => KeyCode::Character('J'),
        WinitKey::KeyK => KeyCode::Character('K'),
        WinitKey::KeyL => KeyCode::Character('L'),
        WinitKey::KeyM => KeyCode::Character('M'),
        WinitKey::KeyN => KeyCode::Character('N'),
        WinitKey::KeyO => KeyCode::Character('O'),
        WinitKey::KeyP => KeyCode::Character('P'),
        WinitKey::KeyQ => KeyCode::Character('Q'),
        WinitKey::KeyR => KeyCode::Character('R'),
        WinitKey::KeyS => KeyCode::Character('S'),
        WinitKey::KeyT => KeyCode::Character('T'),
        WinitKey::KeyU => KeyCode::Character('U'),
        WinitKey::KeyV => KeyCode::Character('V'),
        WinitKey::KeyW => KeyCode::Character('W'),
        WinitKey::KeyX => KeyCode::Character('X'),
        WinitKey::KeyY => KeyCode::Character('Y'),
        WinitKey::KeyZ => KeyCode::Character('Z'),
        _ => return None,
    })
}

struct CliOptions {
    path: String,
    summary_only: bool,
    walk: Option<String>,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: gallery-walk <gallery.xml> [--summary-only] [--walk <script>]"
            ));
        };
        let mut summary_only = false;
        let mut walk = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                "--walk" => {
                    let script = args
                        .next()
                        .ok_or_else(|| anyhow!("--walk expects a script path"))?;
                    walk = Some(script);
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --summary-only or --walk <script>"
                    ));
                }
            }
        }
        Ok(Self {
            path,
            summary_only,
            walk,
        })
    }
}
