//! Request handlers.

pub mod health;
pub mod jobs;
pub mod options;

pub use health::*;
pub use jobs::*;
pub use options::*;
