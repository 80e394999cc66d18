//! Core functionality for the Chippy messenger

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{ChatHandle, LinkManager};
