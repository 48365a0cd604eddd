//! Size-token to viewport mapping

/// Logical page height; the capture follows the anchor, not the window.
pub const VIEWPORT_HEIGHT: u32 = 800;

/// Device pixel ratio used for every capture.
pub const DEVICE_SCALE_FACTOR: f64 = 2.0;

const MOBILE_WIDTH: u32 = 480;
const PC_WIDTH: u32 = 1280;
const FALLBACK_WIDTH: u32 = 1200;

/// Concrete viewport for one capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSpec {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl ViewportSpec {
    /// Width of the captured image in physical pixels.
    pub fn physical_width(&self) -> u32 {
        (self.width as f64 * self.device_scale_factor).round() as u32
    }
}

impl Default for ViewportSpec {
    fn default() -> Self {
        resolve(crate::DEFAULT_THEME, crate::DEFAULT_SIZE)
    }
}

/// Resolve the viewport for a `(theme, size)` pair.
///
/// `"mobile"` selects the narrow layout and `"pc"` the wide one, whether the
/// token arrives as the size or as the theme. Mobile wins when both appear.
/// Anything else gets the neutral fallback width.
pub fn resolve(theme: &str, size: &str) -> ViewportSpec {
    let width = if theme == "mobile" || size == "mobile" {
        MOBILE_WIDTH
    } else if theme == "pc" || size == "pc" {
        PC_WIDTH
    } else {
        FALLBACK_WIDTH
    };

    ViewportSpec {
        width,
        height: VIEWPORT_HEIGHT,
        device_scale_factor: DEVICE_SCALE_FACTOR,
    }
}
