//! Request handlers.

pub mod health;
pub mod status;
pub mod upload;

pub use health::*;
pub use status::*;
pub use upload::*;
