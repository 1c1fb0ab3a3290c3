use serde::{Deserialize, Serialize};

/// Texture filter used when the image is drawn larger than its pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    #[default]
    Linear,
    Nearest,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LayerStyle {
    pub visible: bool,
    /// Always within `[0, 1]`.
    opacity: f64,
    pub resampling: Resampling,
}

impl LayerStyle {
    pub fn new(opacity: f64, resampling: Resampling) -> Self {
        Self {
            visible: true,
            opacity: clamp_opacity(opacity),
            resampling,
        }
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = clamp_opacity(opacity);
    }
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self::new(1.0, Resampling::Linear)
    }
}

/// NaN falls back to fully opaque.
pub fn clamp_opacity(opacity: f64) -> f64 {
    if opacity.is_nan() {
        1.0
    } else {
        opacity.clamp(0.0, 1.0)
    }
}
