pub mod config;
pub mod hierarchy;
pub mod layer;
pub mod raster;
pub mod symbology;
pub mod visibility;
pub mod walker;

pub use config::*;
pub use hierarchy::*;
pub use layer::*;
pub use raster::*;
pub use symbology::*;
