pub mod adapter;
pub mod dispatch;
pub mod error;
pub mod gesture;
pub mod node;
pub mod options;
pub mod surface;

pub use adapter::*;
pub use dispatch::*;
pub use error::*;
pub use gesture::*;
pub use node::*;
pub use options::*;
pub use surface::*;
