use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode bytes as standard base64 text (transport form of tiles and rendered images)
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
