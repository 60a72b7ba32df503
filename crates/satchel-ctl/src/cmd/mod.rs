//! CLI command modules.

pub mod content;
pub mod prefs;
pub mod source;
pub mod stats;
