#[cfg(target_arch = "wasm32")]
pub mod wasm;

use std::collections::HashSet;
use std::mem;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::locomotion::MoveFlags;

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    /// Parses short names (`W`, `Space`, `Up`) as well as DOM `KeyboardEvent.code`
    /// values (`KeyW`, `ArrowUp`, `Digit1`).
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let name = name
            .strip_prefix("Key")
            .or_else(|| name.strip_prefix("Digit"))
            .unwrap_or(name);
        let mut chars = name.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return None;
        };
        if ch.is_ascii_alphabetic() {
            return Some(Self::Character(ch.to_ascii_uppercase()));
        }
        if ch.is_ascii_digit() {
            return Some(Self::Digit(ch as u8 - b'0'));
        }
        None
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" | " " => Space,
        "Enter" | "Return" => Enter,
        "Tab" => Tab,
        "Left" | "ArrowLeft" => Left,
        "Right" | "ArrowRight" => Right,
        "Up" | "ArrowUp" => Up,
        "Down" | "ArrowDown" => Down,
        "Escape" | "Esc" => Escape,
        "LeftShift" | "LShift" | "ShiftLeft" => LeftShift,
        "RightShift" | "RShift" | "ShiftRight" => RightShift,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Friendly names for the keys the gallery reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
    LeftShift,
    RightShift,
}

/// Movement actions that keys can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveAction {
    Forward,
    Backward,
    Left,
    Right,
}

impl MoveAction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "forward" => Some(Self::Forward),
            "backward" | "back" => Some(Self::Backward),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    fn apply(self, flags: &mut MoveFlags) {
        match self {
            Self::Forward => flags.forward = true,
            Self::Backward => flags.backward = true,
            Self::Left => flags.left = true,
            Self::Right => flags.right = true,
        }
    }
}

/// Key-to-action table. Defaults to WASD plus the arrow keys, Space to jump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBindings {
    pub movement: Vec<(KeyCode, MoveAction)>,
    pub jump: Vec<KeyCode>,
    pub unlock: Vec<KeyCode>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        use KeyCode::{Character, Named};
        Self {
            movement: vec![
                (Character('W'), MoveAction::Forward),
                (Named(NamedKey::Up), MoveAction::Forward),
                (Character('S'), MoveAction::Backward),
                (Named(NamedKey::Down), MoveAction::Backward),
                (Character('A'), MoveAction::Left),
                (Named(NamedKey::Left), MoveAction::Left),
                (Character('D'), MoveAction::Right),
                (Named(NamedKey::Right), MoveAction::Right),
            ],
            jump: vec![Named(NamedKey::Space)],
            unlock: vec![Named(NamedKey::Escape)],
        }
    }
}

impl KeyBindings {
    pub fn action(&self, key: KeyCode) -> Option<MoveAction> {
        self.movement
            .iter()
            .find(|(bound, _)| *bound == key)
            .map(|(_, action)| *action)
    }
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockRequest {
    Lock,
    Unlock,
    FocusLost,
}

/// Everything that happened between two frames, consumed by one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    pub movement: MoveFlags,
    pub jump: bool,
    pub pointer_delta: Vec2,
    pub touch_delta: Vec2,
    /// Current stick displacement; `None` once the stick is released.
    pub joystick: Option<Vec2>,
    /// Click positions in normalised device coordinates.
    pub clicks: Vec<Vec2>,
    pub lock_requests: Vec<LockRequest>,
}

#[derive(Debug, Default)]
struct PendingEvents {
    jump: bool,
    pointer_delta: Vec2,
    touch_delta: Vec2,
    clicks: Vec<Vec2>,
    lock_requests: Vec<LockRequest>,
}

/// Thread-safe input buffer written by platform event callbacks and drained
/// once per frame with [`InputState::take_frame`].
#[derive(Debug, Default)]
pub struct InputState {
    bindings: KeyBindings,
    keys: RwLock<HashSet<KeyCode>>,
    mouse_buttons: RwLock<HashSet<MouseButton>>,
    mouse_position: RwLock<Vec2>,
    joystick: RwLock<Option<Vec2>>,
    pending: RwLock<PendingEvents>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bindings(bindings: KeyBindings) -> Self {
        Self {
            bindings,
            ..Self::default()
        }
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    /// Records a key press. Jump and unlock keys fire once per press;
    /// auto-repeat presses of an already held key are ignored.
    pub fn set_key_down(&self, key: KeyCode) {
        let newly_pressed = self.keys.write().insert(key);
        if !newly_pressed {
            return;
        }
        if self.bindings.jump.contains(&key) {
            self.pending.write().jump = true;
        }
        if self.bindings.unlock.contains(&key) {
            self.request_lock(LockRequest::Unlock);
        }
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    /// Holds or releases every key bound to `action`; used by touch buttons
    /// and scripted input.
    pub fn set_action(&self, action: MoveAction, active: bool) {
        let keys: Vec<KeyCode> = self
            .bindings
            .movement
            .iter()
            .filter(|(_, bound)| *bound == action)
            .map(|(key, _)| *key)
            .take(1)
            .collect();
        for key in keys {
            if active {
                self.set_key_down(key);
            } else {
                self.set_key_up(key);
            }
        }
    }

    pub fn press_jump(&self) {
        self.pending.write().jump = true;
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.mouse_buttons.write().insert(button);
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) {
        self.mouse_buttons.write().remove(&button);
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.read().contains(&button)
    }

    pub fn set_mouse_position(&self, position: Vec2) {
        *self.mouse_position.write() = position;
    }

    pub fn mouse_position(&self) -> Vec2 {
        *self.mouse_position.read()
    }

    /// Accumulates raw pointer movement while the pointer is locked.
    pub fn add_pointer_delta(&self, delta: Vec2) {
        self.pending.write().pointer_delta += delta;
    }

    /// Accumulates finger movement of a look-drag gesture.
    pub fn add_touch_delta(&self, delta: Vec2) {
        self.pending.write().touch_delta += delta;
    }

    pub fn set_joystick(&self, displacement: Vec2) {
        *self.joystick.write() = Some(displacement);
    }

    pub fn release_joystick(&self) {
        *self.joystick.write() = None;
    }

    /// Queues a click at `ndc` (normalised device coordinates, `y` up).
    pub fn push_click(&self, ndc: Vec2) {
        self.pending.write().clicks.push(ndc);
    }

    pub fn request_lock(&self, request: LockRequest) {
        self.pending.write().lock_requests.push(request);
    }

    /// Snapshot of held input plus everything queued since the last call.
    pub fn take_frame(&self) -> FrameInput {
        let mut movement = MoveFlags::default();
        for key in self.keys.read().iter() {
            if let Some(action) = self.bindings.action(*key) {
                action.apply(&mut movement);
            }
        }
        let pending = mem::take(&mut *self.pending.write());
        FrameInput {
            movement,
            jump: pending.jump,
            pointer_delta: pending.pointer_delta,
            touch_delta: pending.touch_delta,
            joystick: *self.joystick.read(),
            clicks: pending.clicks,
            lock_requests: pending.lock_requests,
        }
    }

    /// Drops held keys and the stick, e.g. after focus loss swallowed the
    /// matching release events.
    pub fn clear_held(&self) {
        self.keys.write().clear();
        self.mouse_buttons.write().clear();
        *self.joystick.write() = None;
    }
}

/// Follows a single finger, by touch identifier, through start, move and
/// end events. Other fingers are ignored, so a look drag and the joystick
/// can run at the same time.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TouchTrack {
    active: Option<(i32, Vec2)>,
    dragged: bool,
}

/// Where a tracked finger lifted and whether it moved while down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchRelease {
    pub position: Vec2,
    pub dragged: bool,
}

impl TouchTrack {
    /// Starts tracking `id` unless another finger is already tracked.
    pub fn begin(&mut self, id: i32, position: Vec2) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some((id, position));
        self.dragged = false;
        true
    }

    pub fn is_tracking(&self, id: i32) -> bool {
        matches!(self.active, Some((tracked, _)) if tracked == id)
    }

    /// Movement of the tracked finger since its last event.
    pub fn move_to(&mut self, id: i32, position: Vec2) -> Option<Vec2> {
        let (tracked, last) = self.active?;
        if tracked != id {
            return None;
        }
        self.active = Some((id, position));
        self.dragged = true;
        Some(position - last)
    }

    pub fn end(&mut self, id: i32) -> Option<TouchRelease> {
        if !self.is_tracking(id) {
            return None;
        }
        let (_, position) = self.active.take()?;
        Some(TouchRelease {
            position,
            dragged: self.dragged,
        })
    }
}

/// Converts a pixel position inside a `width` x `height` viewport to
/// normalised device coordinates.
pub fn to_ndc(position: Vec2, width: f32, height: f32) -> Vec2 {
    let width = width.max(1.0);
    let height = height.max(1.0);
    Vec2::new(
        position.x / width * 2.0 - 1.0,
        -(position.y / height) * 2.0 + 1.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dom_codes_and_short_names() {
        assert_eq!(
            KeyCode::from_name("Space"),
            Some(KeyCode::Named(NamedKey::Space))
        );
        assert_eq!(KeyCode::from_name("KeyW"), Some(KeyCode::Character('W')));
        assert_eq!(KeyCode::from_name("a"), Some(KeyCode::Character('A')));
        assert_eq!(
            KeyCode::from_name("ArrowUp"),
            Some(KeyCode::Named(NamedKey::Up))
        );
        assert_eq!(KeyCode::from_name("Digit7"), Some(KeyCode::Digit(7)));
        assert_eq!(KeyCode::from_name("MetaLeft"), None);
    }

    #[test]
    fn wasd_and_arrows_map_to_movement() {
        let state = InputState::new();
        state.set_key_down(KeyCode::Character('W'));
        state.set_key_down(KeyCode::Named(NamedKey::Left));
        let frame = state.take_frame();
        assert!(frame.movement.forward && frame.movement.left);
        assert!(!frame.movement.backward && !frame.movement.right);

        state.set_key_up(KeyCode::Character('W'));
        let frame = state.take_frame();
        assert!(!frame.movement.forward);
        assert!(frame.movement.left);
    }

    #[test]
    fn jump_is_edge_triggered() {
        let state = InputState::new();
        let space = KeyCode::Named(NamedKey::Space);
        state.set_key_down(space);
        state.set_key_down(space);
        assert!(state.take_frame().jump);
        assert!(!state.take_frame().jump);
        state.set_key_up(space);
        state.set_key_down(space);
        assert!(state.take_frame().jump);
    }

    #[test]
    fn escape_requests_unlock() {
        let state = InputState::new();
        state.set_key_down(KeyCode::Named(NamedKey::Escape));
        assert_eq!(state.take_frame().lock_requests, vec![LockRequest::Unlock]);
    }

    #[test]
    fn deltas_accumulate_and_drain() {
        let state = InputState::new();
        state.add_pointer_delta(Vec2::new(3.0, 1.0));
        state.add_pointer_delta(Vec2::new(2.0, -4.0));
        state.add_touch_delta(Vec2::new(1.0, 1.0));
        state.push_click(Vec2::ZERO);
        let frame = state.take_frame();
        assert_eq!(frame.pointer_delta, Vec2::new(5.0, -3.0));
        assert_eq!(frame.touch_delta, Vec2::ONE);
        assert_eq!(frame.clicks, vec![Vec2::ZERO]);

        let frame = state.take_frame();
        assert_eq!(frame.pointer_delta, Vec2::ZERO);
        assert!(frame.clicks.is_empty());
    }

    #[test]
    fn joystick_persists_until_release() {
        let state = InputState::new();
        state.set_joystick(Vec2::new(0.5, 0.0));
        assert_eq!(state.take_frame().joystick, Some(Vec2::new(0.5, 0.0)));
        assert_eq!(state.take_frame().joystick, Some(Vec2::new(0.5, 0.0)));
        state.release_joystick();
        assert_eq!(state.take_frame().joystick, None);
    }

    #[test]
    fn actions_hold_bound_keys() {
        let state = InputState::new();
        state.set_action(MoveAction::Backward, true);
        assert!(state.take_frame().movement.backward);
        state.set_action(MoveAction::Backward, false);
        assert!(!state.take_frame().movement.backward);
    }

    #[test]
    fn touch_track_ignores_other_fingers() {
        let mut look = TouchTrack::default();
        let mut stick = TouchTrack::default();
        assert!(stick.begin(1, Vec2::new(50.0, 500.0)));
        assert!(look.begin(2, Vec2::new(400.0, 300.0)));
        assert!(!look.begin(3, Vec2::new(10.0, 10.0)));

        assert_eq!(look.move_to(1, Vec2::new(60.0, 500.0)), None);
        assert_eq!(
            look.move_to(2, Vec2::new(410.0, 295.0)),
            Some(Vec2::new(10.0, -5.0))
        );
        assert_eq!(stick.move_to(2, Vec2::new(420.0, 290.0)), None);
        assert_eq!(
            stick.move_to(1, Vec2::new(60.0, 490.0)),
            Some(Vec2::new(10.0, -10.0))
        );

        assert_eq!(stick.end(2), None);
        assert!(stick.is_tracking(1));
        assert_eq!(
            look.end(2),
            Some(TouchRelease {
                position: Vec2::new(410.0, 295.0),
                dragged: true,
            })
        );
        assert!(!look.is_tracking(2));
        assert!(stick.is_tracking(1));
    }

    #[test]
    fn touch_track_reports_taps() {
        let mut track = TouchTrack::default();
        assert!(track.begin(7, Vec2::new(5.0, 6.0)));
        assert_eq!(
            track.end(7),
            Some(TouchRelease {
                position: Vec2::new(5.0, 6.0),
                dragged: false,
            })
        );
        assert!(track.begin(8, Vec2::ZERO));
    }

    #[test]
    fn pixel_positions_convert_to_ndc() {
        assert_eq!(to_ndc(Vec2::new(400.0, 300.0), 800.0, 600.0), Vec2::ZERO);
        assert_eq!(to_ndc(Vec2::ZERO, 800.0, 600.0), Vec2::new(-1.0, 1.0));
        assert_eq!(
            to_ndc(Vec2::new(800.0, 600.0), 800.0, 600.0),
            Vec2::new(1.0, -1.0)
        );
    }
}
