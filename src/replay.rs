//! Scripted, headless walks through a gallery.
//!
//! A walk script is plain text with one command per line; blank lines and
//! `#` comments are ignored. Commands feed the same [`InputState`] the
//! platform layers use and the session is stepped at a fixed 60 Hz.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use glam::{Vec2, Vec3};
use log::debug;

use crate::input::{InputState, LockRequest, MoveAction};
use crate::interaction::{Appearance, ExhibitId, ExhibitInfo, InfoPanel, SceneBackend};
use crate::session::GallerySession;

/// Fixed simulation step used by replays.
pub const FRAME_DT: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Lock,
    Unlock,
    FocusLost,
    Hold(MoveAction, f32),
    Wait(f32),
    Jump,
    Look(Vec2),
    Drag(Vec2),
    Stick(Vec2, f32),
    Click(Vec2),
    Teleport(f32, f32),
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or_else(|| anyhow!("empty command"))?;
        let args: Vec<&str> = words.collect();
        let command = match name {
            "lock" => Command::Lock,
            "unlock" => Command::Unlock,
            "focus-lost" => Command::FocusLost,
            "jump" => Command::Jump,
            "hold" => {
                let [direction, secs] = arguments::<2>(name, &args)?;
                let action = MoveAction::from_name(direction)
                    .ok_or_else(|| anyhow!("unknown direction {direction:?}"))?;
                Command::Hold(action, seconds(secs)?)
            }
            "wait" => {
                let [secs] = arguments::<1>(name, &args)?;
                Command::Wait(seconds(secs)?)
            }
            "look" => Command::Look(pair(&arguments::<2>(name, &args)?)?),
            "drag" => Command::Drag(pair(&arguments::<2>(name, &args)?)?),
            "stick" => {
                let [x, y, secs] = arguments::<3>(name, &args)?;
                Command::Stick(pair(&[x, y])?, seconds(secs)?)
            }
            "click" => Command::Click(pair(&arguments::<2>(name, &args)?)?),
            "teleport" => {
                let position = pair(&arguments::<2>(name, &args)?)?;
                Command::Teleport(position.x, position.y)
            }
            other => bail!("unknown command {other:?}"),
        };
        Ok(command)
    }
}

fn arguments<'a, const N: usize>(name: &str, args: &[&'a str]) -> Result<[&'a str; N]> {
    <[&str; N]>::try_from(args)
        .map_err(|_| anyhow!("{name} expects {N} argument(s), got {}", args.len()))
}

fn number(text: &str) -> Result<f32> {
    let value: f32 = text
        .parse()
        .map_err(|err| anyhow!("invalid number {text:?}: {err}"))?;
    if !value.is_finite() {
        bail!("invalid number {text:?}");
    }
    Ok(value)
}

fn seconds(text: &str) -> Result<f32> {
    let value = number(text)?;
    if value < 0.0 {
        bail!("duration must not be negative, got {value}");
    }
    Ok(value)
}

fn pair(args: &[&str; 2]) -> Result<Vec2> {
    Ok(Vec2::new(number(args[0])?, number(args[1])?))
}

/// Parsed walk script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    commands: Vec<Command>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self> {
        let mut commands = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let command = line
                .parse::<Command>()
                .with_context(|| format!("line {}: {line:?}", index + 1))?;
            commands.push(command);
        }
        Ok(Self { commands })
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

/// Scene backend that keeps the latest appearance per exhibit.
#[derive(Debug, Default)]
pub struct HeadlessScene {
    appearances: HashMap<ExhibitId, Appearance>,
    changes: usize,
}

impl HeadlessScene {
    pub fn appearance(&self, id: &str) -> Option<&Appearance> {
        self.appearances.get(&ExhibitId::from(id))
    }

    pub fn changes(&self) -> usize {
        self.changes
    }
}

impl SceneBackend for HeadlessScene {
    fn set_appearance(&mut self, id: &ExhibitId, appearance: &Appearance) {
        self.appearances.insert(id.clone(), appearance.clone());
        self.changes += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    Shown(ExhibitInfo),
    Hidden,
}

impl fmt::Display for PanelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelEvent::Shown(info) => write!(f, "show {} | {}", info.heading(), info.caption()),
            PanelEvent::Hidden => write!(f, "hide"),
        }
    }
}

/// Info panel that records only visible changes: repeated shows of the same
/// exhibit and hides of an already hidden panel are dropped.
#[derive(Debug, Default)]
pub struct RecordingPanel {
    current: Option<ExhibitInfo>,
    events: Vec<PanelEvent>,
}

impl RecordingPanel {
    pub fn current(&self) -> Option<&ExhibitInfo> {
        self.current.as_ref()
    }

    pub fn take_events(&mut self) -> Vec<PanelEvent> {
        std::mem::take(&mut self.events)
    }
}

impl InfoPanel for RecordingPanel {
    fn show_info(&mut self, info: &ExhibitInfo) {
        if self.current.as_ref() != Some(info) {
            self.current = Some(info.clone());
            self.events.push(PanelEvent::Shown(info.clone()));
        }
    }

    fn hide_info(&mut self) {
        if self.current.take().is_some() {
            self.events.push(PanelEvent::Hidden);
        }
    }
}

/// Panel change stamped with the simulated time it happened at.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub time: f32,
    pub event: PanelEvent,
}

impl fmt::Display for TimedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:7.2}s] {}", self.time, self.event)
    }
}

/// Drives a [`GallerySession`] from a [`Script`].
#[derive(Debug, Default)]
pub struct Replay {
    input: InputState,
    scene: HeadlessScene,
    panel: RecordingPanel,
    frames: u64,
    log: Vec<TimedEvent>,
}

impl Replay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene(&self) -> &HeadlessScene {
        &self.scene
    }

    pub fn panel(&self) -> &RecordingPanel {
        &self.panel
    }

    pub fn log(&self) -> &[TimedEvent] {
        &self.log
    }

    pub fn elapsed(&self) -> f32 {
        self.frames as f32 * FRAME_DT
    }

    pub fn run(&mut self, session: &mut GallerySession, script: &Script) {
        for command in script.commands() {
            self.execute(session, *command);
        }
    }

    pub fn execute(&mut self, session: &mut GallerySession, command: Command) {
        debug!("replay {command:?} at {:.2}s", self.elapsed());
        match command {
            Command::Lock => self.input.request_lock(LockRequest::Lock),
            Command::Unlock => self.input.request_lock(LockRequest::Unlock),
            Command::FocusLost => {
                self.input.clear_held();
                self.input.request_lock(LockRequest::FocusLost);
            }
            Command::Hold(action, secs) => {
                self.input.set_action(action, true);
                self.advance(session, frames_for(secs));
                self.input.set_action(action, false);
                return;
            }
            Command::Wait(secs) => {
                self.advance(session, frames_for(secs));
                return;
            }
            Command::Jump => self.input.press_jump(),
            Command::Look(delta) => self.input.add_pointer_delta(delta),
            Command::Drag(delta) => self.input.add_touch_delta(delta),
            Command::Stick(displacement, secs) => {
                self.input.set_joystick(displacement);
                self.advance(session, frames_for(secs));
                self.input.release_joystick();
                return;
            }
            Command::Click(ndc) => self.input.push_click(ndc),
            Command::Teleport(x, z) => {
                let y = session.pose().position.y;
                session
                    .controller_mut()
                    .set_position(Vec3::new(x, y, z));
            }
        }
        self.advance(session, 1);
    }

    fn advance(&mut self, session: &mut GallerySession, frames: u64) {
        for _ in 0..frames {
            let input = self.input.take_frame();
            session.tick(FRAME_DT, &input, &mut self.scene, &mut self.panel);
            self.frames += 1;
            let time = self.elapsed();
            self.log.extend(
                self.panel
                    .take_events()
                    .into_iter()
                    .map(|event| TimedEvent { time, event }),
            );
        }
    }
}

fn frames_for(secs: f32) -> u64 {
    (secs / FRAME_DT).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::ExhibitProxy;
    use crate::scene::Scene;

    const GALLERY: &str = r#"
    <gallery>
        <start><position>0 1.6 0</position></start>
        <exhibit>
            <id>north</id><title>North</title><artist>Ann</artist><year>1901</year>
            <position>0 1.6 -9.9</position><size>4 3</size>
        </exhibit>
    </gallery>
    "#;

    fn session() -> GallerySession {
        let mut session = GallerySession::new(Scene::from_xml(GALLERY).unwrap()).unwrap();
        let placement = session.scene().exhibits[0].clone();
        let handle = session
            .exhibits_mut()
            .register(placement.to_exhibit())
            .unwrap();
        session
            .exhibits_mut()
            .resolve_proxy(handle, ExhibitProxy { size: placement.size })
            .unwrap();
        session
    }

    #[test]
    fn parses_every_command() {
        let script = Script::parse(
            "# warm up\nlock\nhold forward 1.5\nwait 0.5 # idle\njump\nlook 10 -4\n\
             drag 3 0\nstick 0 -1 2\nclick 0 0\nteleport 1 2\nfocus-lost\nunlock\n",
        )
        .unwrap();
        assert_eq!(
            script.commands(),
            &[
                Command::Lock,
                Command::Hold(MoveAction::Forward, 1.5),
                Command::Wait(0.5),
                Command::Jump,
                Command::Look(Vec2::new(10.0, -4.0)),
                Command::Drag(Vec2::new(3.0, 0.0)),
                Command::Stick(Vec2::new(0.0, -1.0), 2.0),
                Command::Click(Vec2::ZERO),
                Command::Teleport(1.0, 2.0),
                Command::FocusLost,
                Command::Unlock,
            ]
        );
    }

    #[test]
    fn parse_errors_name_the_line() {
        let err = Script::parse("lock\nhold sideways 1\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
        assert!(Script::parse("wait -1").is_err());
        assert!(Script::parse("click 0").is_err());
        assert!(Script::parse("fly").is_err());
    }

    #[test]
    fn walking_up_to_a_picture_shows_it_once() {
        let mut session = session();
        let mut replay = Replay::new();
        replay.run(
            &mut session,
            &Script::parse("lock\nhold forward 4\nhold backward 6\n").unwrap(),
        );
        let events: Vec<String> = replay.log().iter().map(|e| e.event.to_string()).collect();
        assert_eq!(
            events,
            vec![
                "show North (1901) | By Ann. ".to_string(),
                "hide".to_string()
            ]
        );
        assert!(replay.panel().current().is_none());
    }

    #[test]
    fn click_selects_and_highlights() {
        let mut session = session();
        let mut replay = Replay::new();
        replay.run(&mut session, &Script::parse("click 0 0").unwrap());
        assert_eq!(session.exhibits().selected(), session.exhibits().find("north"));
        let appearance = replay.scene().appearance("north").unwrap();
        assert_eq!(
            appearance.emissive,
            session.exhibits().config().highlight_emissive
        );
        assert_eq!(replay.scene().changes(), 1);
    }

    #[test]
    fn teleport_keeps_height_and_clamps() {
        let mut session = session();
        let mut replay = Replay::new();
        replay.run(&mut session, &Script::parse("teleport 50 3").unwrap());
        assert_eq!(session.pose().position, Vec3::new(9.5, 1.6, 3.0));
        assert_eq!(replay.elapsed(), FRAME_DT);
    }

    #[test]
    fn stick_moves_only_while_held() {
        let mut session = session();
        let mut replay = Replay::new();
        replay.run(&mut session, &Script::parse("lock\nstick 0 -1 1").unwrap());
        let after_stick = session.pose().position;
        assert!((after_stick.z + 3.0).abs() < 0.1);
        replay.run(&mut session, &Script::parse("wait 1").unwrap());
        assert_eq!(session.pose().position, after_stick);
    }
}
