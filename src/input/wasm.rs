use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use glam::Vec2;
use gloo_events::{EventListener, EventListenerOptions};
use wasm_bindgen::JsCast;
use web_sys::{window, Element, HtmlCanvasElement, KeyboardEvent, MouseEvent, TouchEvent};

use super::{to_ndc, InputState, KeyCode, LockRequest, TouchTrack};

/// Stick travel in CSS pixels that maps to full deflection, as a fraction of
/// the joystick element's width.
const JOYSTICK_TRAVEL: f64 = 1.0 / 3.0;

/// Handles DOM input events and updates the shared [`InputState`].
pub struct WasmInputHandler {
    listeners: Vec<EventListener>,
}

impl WasmInputHandler {
    /// Attaches keyboard, pointer-lock, mouse and touch listeners. When a
    /// `joystick` element is given, touches on it drive the virtual stick.
    pub fn attach(
        canvas: &HtmlCanvasElement,
        joystick: Option<&Element>,
        input: Arc<InputState>,
    ) -> Result<Self> {
        let window = window().ok_or_else(|| anyhow!("window not available"))?;
        let document = window
            .document()
            .ok_or_else(|| anyhow!("document not available"))?;

        let mut listeners = Vec::new();
        let active = EventListenerOptions::enable_prevent_default();

        // Keys are captured on the whole document so focus on the canvas is not required.
        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(&document, "keydown", move |event| {
                let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                    return;
                };
                if let Some(code) = KeyCode::from_name(&event.code()) {
                    input_state.set_key_down(code);
                }
            }));
        }

        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(&document, "keyup", move |event| {
                let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                    return;
                };
                if let Some(code) = KeyCode::from_name(&event.code()) {
                    input_state.set_key_up(code);
                }
            }));
        }

        {
            let input_state = Arc::clone(&input);
            let document = document.clone();
            listeners.push(EventListener::new(&document.clone(), "mousemove", move |event| {
                let Some(event) = event.dyn_ref::<MouseEvent>() else {
                    return;
                };
                if document.pointer_lock_element().is_some() {
                    input_state.add_pointer_delta(Vec2::new(
                        event.movement_x() as f32,
                        event.movement_y() as f32,
                    ));
                } else {
                    input_state.set_mouse_position(Vec2::new(
                        event.client_x() as f32,
                        event.client_y() as f32,
                    ));
                }
            }));
        }

        {
            let input_state = Arc::clone(&input);
            let document = document.clone();
            let target = canvas.clone();
            listeners.push(EventListener::new(canvas, "click", move |event| {
                let Some(event) = event.dyn_ref::<MouseEvent>() else {
                    return;
                };
                if document.pointer_lock_element().is_some() {
                    // Locked pointers aim through the centre of the view.
                    input_state.push_click(Vec2::ZERO);
                } else {
                    let rect = target.get_bounding_client_rect();
                    let local = Vec2::new(
                        (f64::from(event.client_x()) - rect.left()) as f32,
                        (f64::from(event.client_y()) - rect.top()) as f32,
                    );
                    input_state.push_click(to_ndc(
                        local,
                        rect.width() as f32,
                        rect.height() as f32,
                    ));
                    target.request_pointer_lock();
                    input_state.request_lock(LockRequest::Lock);
                }
            }));
        }

        {
            let input_state = Arc::clone(&input);
            let document = document.clone();
            listeners.push(EventListener::new(
                &document.clone(),
                "pointerlockchange",
                move |_| {
                    if document.pointer_lock_element().is_none() {
                        input_state.request_lock(LockRequest::Unlock);
                    }
                },
            ));
        }

        {
            let input_state = Arc::clone(&input);
            listeners.push(EventListener::new(&window, "blur", move |_| {
                input_state.clear_held();
                input_state.request_lock(LockRequest::FocusLost);
            }));
        }

        // Touch drag on the canvas looks around; a tap locks and picks.
        let look: Rc<RefCell<TouchTrack>> = Rc::new(RefCell::new(TouchTrack::default()));
        {
            let look = Rc::clone(&look);
            listeners.push(EventListener::new_with_options(
                canvas,
                "touchstart",
                active,
                move |event| {
                    let Some(event) = event.dyn_ref::<TouchEvent>() else {
                        return;
                    };
                    event.prevent_default();
                    let mut look = look.borrow_mut();
                    for (id, position) in changed_touches(event) {
                        look.begin(id, position);
                    }
                },
            ));
        }

        {
            let input_state = Arc::clone(&input);
            let look = Rc::clone(&look);
            listeners.push(EventListener::new_with_options(
                canvas,
                "touchmove",
                active,
                move |event| {
                    let Some(event) = event.dyn_ref::<TouchEvent>() else {
                        return;
                    };
                    event.prevent_default();
                    let mut look = look.borrow_mut();
                    for (id, position) in changed_touches(event) {
                        if let Some(delta) = look.move_to(id, position) {
                            input_state.add_touch_delta(delta);
                        }
                    }
                },
            ));
        }

        {
            let input_state = Arc::clone(&input);
            let look = Rc::clone(&look);
            let target = canvas.clone();
            listeners.push(EventListener::new(canvas, "touchend", move |event| {
                let Some(event) = event.dyn_ref::<TouchEvent>() else {
                    return;
                };
                let mut look = look.borrow_mut();
                for (id, _) in changed_touches(event) {
                    let Some(release) = look.end(id) else {
                        continue;
                    };
                    if release.dragged {
                        continue;
                    }
                    let rect = target.get_bounding_client_rect();
                    let local =
                        release.position - Vec2::new(rect.left() as f32, rect.top() as f32);
                    input_state.push_click(to_ndc(
                        local,
                        rect.width() as f32,
                        rect.height() as f32,
                    ));
                    input_state.request_lock(LockRequest::Lock);
                }
            }));
        }

        listeners.push(EventListener::new(canvas, "touchcancel", move |event| {
            let Some(event) = event.dyn_ref::<TouchEvent>() else {
                return;
            };
            let mut look = look.borrow_mut();
            for (id, _) in changed_touches(event) {
                look.end(id);
            }
        }));

        if let Some(stick) = joystick {
            let finger: Rc<RefCell<TouchTrack>> = Rc::new(RefCell::new(TouchTrack::default()));
            let centre: Rc<Cell<(Vec2, f32)>> = Rc::new(Cell::new((Vec2::ZERO, 1.0)));
            {
                let input_state = Arc::clone(&input);
                let finger = Rc::clone(&finger);
                let centre = Rc::clone(&centre);
                let element = stick.clone();
                listeners.push(EventListener::new_with_options(
                    stick,
                    "touchstart",
                    active,
                    move |event| {
                        let Some(event) = event.dyn_ref::<TouchEvent>() else {
                            return;
                        };
                        event.prevent_default();
                        let mut finger = finger.borrow_mut();
                        for (id, position) in changed_touches(event) {
                            if !finger.begin(id, position) {
                                continue;
                            }
                            let rect = element.get_bounding_client_rect();
                            let middle = Vec2::new(
                                (rect.left() + rect.width() / 2.0) as f32,
                                (rect.top() + rect.height() / 2.0) as f32,
                            );
                            let travel = (rect.width() * JOYSTICK_TRAVEL).max(1.0) as f32;
                            centre.set((middle, travel));
                            input_state.set_joystick((position - middle) / travel);
                        }
                    },
                ));
            }

            {
                let input_state = Arc::clone(&input);
                let finger = Rc::clone(&finger);
                let centre = Rc::clone(&centre);
                listeners.push(EventListener::new_with_options(
                    &document,
                    "touchmove",
                    active,
                    move |event| {
                        let Some(event) = event.dyn_ref::<TouchEvent>() else {
                            return;
                        };
                        let mut finger = finger.borrow_mut();
                        let (middle, travel) = centre.get();
                        for (id, position) in changed_touches(event) {
                            if finger.move_to(id, position).is_some() {
                                event.prevent_default();
                                input_state.set_joystick((position - middle) / travel);
                            }
                        }
                    },
                ));
            }

            for kind in ["touchend", "touchcancel"] {
                let input_state = Arc::clone(&input);
                let finger = Rc::clone(&finger);
                listeners.push(EventListener::new(&document, kind, move |event| {
                    let Some(event) = event.dyn_ref::<TouchEvent>() else {
                        return;
                    };
                    let mut finger = finger.borrow_mut();
                    for (id, _) in changed_touches(event) {
                        if finger.end(id).is_some() {
                            input_state.release_joystick();
                        }
                    }
                }));
            }
        }

        Ok(Self { listeners })
    }
}

impl Drop for WasmInputHandler {
    fn drop(&mut self) {
        self.listeners.clear();
    }
}

/// Fingers whose state changed in this event, as `(identifier, client position)`.
fn changed_touches(event: &TouchEvent) -> impl Iterator<Item = (i32, Vec2)> {
    let touches = event.changed_touches();
    (0..touches.length())
        .filter_map(move |index| touches.get(index))
        .map(|touch| {
            (
                touch.identifier(),
                Vec2::new(touch.client_x() as f32, touch.client_y() as f32),
            )
        })
}
