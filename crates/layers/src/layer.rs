use std::fmt;

use crate::symbology::LayerStyle;

/// Host-assigned layer name, unique within a map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait Layer {
    fn id(&self) -> &LayerId;
    fn style(&self) -> &LayerStyle;
}
