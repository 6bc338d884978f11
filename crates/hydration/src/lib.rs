pub mod lookup;
pub mod pipeline;
pub mod request;
pub mod state;

pub use lookup::*;
pub use pipeline::*;
pub use request::*;
pub use state::*;
