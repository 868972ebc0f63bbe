//! Terminal helpers shared by the binary and the loader

pub mod progress;
pub mod styling;

pub use progress::*;
pub use styling::*;
