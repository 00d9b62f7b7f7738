#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use glam::Vec2;
use log::{info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{window, Element, HtmlCanvasElement, HtmlElement, HtmlImageElement};

use crate::assets::ExhibitLoader;
use crate::input::wasm::WasmInputHandler;
use crate::interaction::{
    Appearance, ExhibitHandle, ExhibitId, ExhibitInfo, ExhibitProxy, InfoPanel, SceneBackend,
};
use crate::scene::{ExhibitPlacement, Scene};
use crate::{GallerySession, InputState};

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Browser entry point. The host page renders; this object owns movement,
/// picking and the info panel, and exposes the state the renderer needs.
#[wasm_bindgen]
pub struct WebGallery {
    inner: Rc<RefCell<GalleryState>>,
}

#[wasm_bindgen]
impl WebGallery {
    /// Parses the descriptor, wires DOM input and starts loading exhibit
    /// images relative to `base_url`. Exhibits become pickable as their
    /// images arrive.
    pub async fn load(
        canvas_id: String,
        descriptor_xml: String,
        base_url: String,
        info_id: Option<String>,
        joystick_id: Option<String>,
    ) -> Result<WebGallery, JsValue> {
        let scene = Scene::from_xml(&descriptor_xml).map_err(to_js)?;
        let document = window()
            .and_then(|window| window.document())
            .ok_or_else(|| JsValue::from_str("document not available"))?;
        let canvas = document
            .get_element_by_id(&canvas_id)
            .ok_or_else(|| JsValue::from_str("canvas element not found"))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| JsValue::from_str("element is not a canvas"))?;
        let panel_element = match info_id {
            Some(id) => Some(
                document
                    .get_element_by_id(&id)
                    .ok_or_else(|| JsValue::from_str("info element not found"))?
                    .dyn_into::<HtmlElement>()
                    .map_err(|_| JsValue::from_str("info element is not an HTML element"))?,
            ),
            None => None,
        };
        let joystick: Option<Element> = match joystick_id {
            Some(id) => Some(
                document
                    .get_element_by_id(&id)
                    .ok_or_else(|| JsValue::from_str("joystick element not found"))?,
            ),
            None => None,
        };

        let input = Arc::new(InputState::new());
        let input_handler = WasmInputHandler::attach(&canvas, joystick.as_ref(), Arc::clone(&input))
            .map_err(to_js)?;

        let mut session = GallerySession::new(scene.clone()).map_err(|err| to_js(err.into()))?;
        session.set_viewport(canvas.width(), canvas.height());
        let mut pending = Vec::new();
        for placement in &scene.exhibits {
            let handle = session
                .exhibits_mut()
                .register(placement.to_exhibit())
                .map_err(|err| to_js(err.into()))?;
            pending.push((handle, placement.clone()));
        }
        info!(
            "gallery loaded: {} exhibits, {} lights",
            scene.exhibits.len(),
            scene.light_rig().len()
        );

        let inner = Rc::new(RefCell::new(GalleryState {
            session,
            input,
            backend: HostScene::default(),
            panel: DomInfoPanel::new(panel_element),
            last_frame: None,
            _input_handler: input_handler,
        }));

        let loader = ImageLoader { base_url };
        for (handle, placement) in pending {
            let state = Rc::clone(&inner);
            let loader = loader.clone();
            spawn_local(async move {
                resolve_exhibit(state, &loader, handle, placement).await;
            });
        }

        Ok(Self { inner })
    }

    /// Starts the `requestAnimationFrame` loop.
    pub fn start(&self) -> Result<(), JsValue> {
        schedule_animation_loop(Rc::clone(&self.inner)).map_err(to_js)
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.inner.borrow_mut().session.set_viewport(width, height);
    }

    /// `[x, y, z, yaw, pitch]`.
    pub fn pose(&self) -> Vec<f32> {
        let state = self.inner.borrow();
        let pose = state.session.pose();
        vec![
            pose.position.x,
            pose.position.y,
            pose.position.z,
            pose.yaw,
            pose.pitch,
        ]
    }

    /// Column-major view-projection matrix of the viewer camera.
    pub fn view_projection(&self) -> Vec<f32> {
        self.inner
            .borrow()
            .session
            .camera()
            .view_proj
            .to_cols_array()
            .to_vec()
    }

    /// `[r, g, b, emissive r, emissive g, emissive b]` for the exhibit, or
    /// `undefined` when the id is unknown.
    pub fn appearance(&self, id: &str) -> Option<Vec<f32>> {
        let state = self.inner.borrow();
        let exhibits = state.session.exhibits();
        let exhibit = exhibits.find(id).and_then(|handle| exhibits.exhibit(handle))?;
        let Appearance {
            color, emissive, ..
        } = exhibit.appearance();
        Some(vec![color.x, color.y, color.z, emissive.x, emissive.y, emissive.z])
    }

    /// Ids whose appearance changed since the last call.
    pub fn take_changed(&self) -> Vec<String> {
        let mut state = self.inner.borrow_mut();
        state.backend.take_changed()
    }

    pub fn is_ready(&self, id: &str) -> bool {
        let state = self.inner.borrow();
        let exhibits = state.session.exhibits();
        exhibits
            .find(id)
            .and_then(|handle| exhibits.exhibit(handle))
            .map_or(false, |exhibit| exhibit.is_ready())
    }

    pub fn selected(&self) -> Option<String> {
        let state = self.inner.borrow();
        let exhibits = state.session.exhibits();
        exhibits
            .selected()
            .and_then(|handle| exhibits.exhibit(handle))
            .map(|exhibit| exhibit.id.to_string())
    }

    pub fn is_locked(&self) -> bool {
        self.inner.borrow().session.controller().is_locked()
    }
}

struct GalleryState {
    session: GallerySession,
    input: Arc<InputState>,
    backend: HostScene,
    panel: DomInfoPanel,
    last_frame: Option<f64>,
    _input_handler: WasmInputHandler,
}

impl GalleryState {
    fn frame(&mut self, now: f64) {
        let dt = self
            .last_frame
            .map_or(0.0, |last| ((now - last) / 1000.0) as f32);
        self.last_frame = Some(now);
        let input = self.input.take_frame();
        self.session
            .tick(dt, &input, &mut self.backend, &mut self.panel);
    }
}

async fn resolve_exhibit(
    state: Rc<RefCell<GalleryState>>,
    loader: &ImageLoader,
    handle: ExhibitHandle,
    placement: ExhibitPlacement,
) {
    match loader.load_exhibit(&placement).await {
        Ok(proxy) => {
            let mut state = state.borrow_mut();
            if let Err(err) = state.session.exhibits_mut().resolve_proxy(handle, proxy) {
                warn!("exhibit {}: {err}", placement.id);
            }
        }
        Err(err) => warn!("exhibit {} left unloaded: {err:#}", placement.id),
    }
}

fn schedule_animation_loop(app: Rc<RefCell<GalleryState>>) -> Result<()> {
    let window = window().ok_or_else(|| anyhow!("window not available"))?;
    let callback: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>> = Rc::new(RefCell::new(None));
    let next = Rc::clone(&callback);
    let frame_window = window.clone();

    *callback.borrow_mut() = Some(Closure::wrap(Box::new(move |now: f64| {
        app.borrow_mut().frame(now);
        if let Some(closure) = next.borrow().as_ref() {
            if let Err(err) = frame_window.request_animation_frame(closure.as_ref().unchecked_ref())
            {
                warn!("requestAnimationFrame failed: {err:?}");
            }
        }
    }) as Box<dyn FnMut(f64)>));

    let first = callback.borrow();
    let closure = first
        .as_ref()
        .ok_or_else(|| anyhow!("animation callback missing"))?;
    window
        .request_animation_frame(closure.as_ref().unchecked_ref())
        .map_err(|err| anyhow!("requestAnimationFrame failed: {err:?}"))?;
    Ok(())
}

/// Records which exhibits the host renderer needs to restyle.
#[derive(Debug, Default)]
struct HostScene {
    changed: Vec<String>,
}

impl HostScene {
    fn take_changed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.changed)
    }
}

impl SceneBackend for HostScene {
    fn set_appearance(&mut self, id: &ExhibitId, _appearance: &Appearance) {
        if !self.changed.iter().any(|changed| changed == id.as_str()) {
            self.changed.push(id.to_string());
        }
    }
}

/// Writes exhibit details into a DOM element and toggles its visibility.
struct DomInfoPanel {
    element: Option<HtmlElement>,
    current: Option<ExhibitInfo>,
}

impl DomInfoPanel {
    fn new(element: Option<HtmlElement>) -> Self {
        if let Some(element) = &element {
            set_display(element, "none");
        }
        Self {
            element,
            current: None,
        }
    }
}

impl InfoPanel for DomInfoPanel {
    fn show_info(&mut self, info: &ExhibitInfo) {
        if self.current.as_ref() == Some(info) {
            return;
        }
        self.current = Some(info.clone());
        if let Some(element) = &self.element {
            element.set_inner_text(&format!("{}\n{}", info.heading(), info.caption()));
            set_display(element, "block");
        }
    }

    fn hide_info(&mut self) {
        if self.current.take().is_none() {
            return;
        }
        if let Some(element) = &self.element {
            set_display(element, "none");
        }
    }
}

fn set_display(element: &HtmlElement, value: &str) {
    if let Err(err) = element.style().set_property("display", value) {
        warn!("failed to set info panel display to {value}: {err:?}");
    }
}

/// Loads exhibit images through `HtmlImageElement`; the proxy keeps the
/// declared width and takes its height from the image aspect ratio.
#[derive(Debug, Clone)]
struct ImageLoader {
    base_url: String,
}

impl ImageLoader {
    fn url(&self, source: &str) -> String {
        if self.base_url.is_empty() || source.contains("://") {
            source.to_string()
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), source)
        }
    }
}

impl ExhibitLoader for ImageLoader {
    async fn load_exhibit(&self, placement: &ExhibitPlacement) -> Result<ExhibitProxy> {
        let Some(source) = &placement.source else {
            return Ok(ExhibitProxy {
                size: placement.size,
            });
        };
        let url = self.url(source);
        let image = HtmlImageElement::new()
            .map_err(|err| anyhow!("failed to create image element: {err:?}"))?;
        let loaded = js_sys::Promise::new(&mut |resolve, reject| {
            image.set_onload(Some(&resolve));
            image.set_onerror(Some(&reject));
        });
        image.set_src(&url);
        JsFuture::from(loaded)
            .await
            .map_err(|_| anyhow!("failed to load image {url}"))?;
        image.set_onload(None);
        image.set_onerror(None);

        let (width, height) = (image.natural_width(), image.natural_height());
        let size = if width > 0 && height > 0 {
            Vec2::new(
                placement.size.x,
                placement.size.x * height as f32 / width as f32,
            )
        } else {
            placement.size
        };
        Ok(ExhibitProxy { size })
    }
}

fn to_js(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}
