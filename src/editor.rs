pub mod autosave;
pub mod seed;
pub mod session;

pub use session::*;
