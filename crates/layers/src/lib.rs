pub mod image;
pub mod layer;
pub mod symbology;

pub use image::*;
pub use layer::*;
pub use symbology::*;
