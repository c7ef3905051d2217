pub mod font;
pub mod overlay;

pub use overlay::{render, Overlay, OverlayShape, RenderStyle};
