pub mod route;
pub mod stop;

pub use route::*;
pub use stop::*;
