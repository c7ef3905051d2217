use ab_glyph::{FontRef, InvalidFont, PxScale};

/// DejaVu Sans Mono, see `assets/DejaVu-LICENSE`
const LABEL_FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSansMono.ttf");

/// Pixel height of detection labels
pub const LABEL_SCALE: PxScale = PxScale { x: 14.0, y: 14.0 };

/// Font used for detection labels
pub fn label_font() -> Result<FontRef<'static>, InvalidFont> {
    FontRef::try_from_slice(LABEL_FONT_DATA)
}
