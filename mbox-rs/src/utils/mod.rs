//! Utility functions
//!
//! - [`size`]: human readable byte sizes

pub mod size;

pub use size::readable_size;
