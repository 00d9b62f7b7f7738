mod common;
#[cfg(not(target_arch = "wasm32"))]
mod native;

pub use common::{draw_list, CameraParams, DrawItem, LightParams};
#[cfg(not(target_arch = "wasm32"))]
pub use native::Renderer;
