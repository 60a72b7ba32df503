//! satchel-core — content schema, size strings, and configuration.
//! All other Satchel crates depend on this one.

pub mod config;
pub mod content;
pub mod size;

pub use config::SatchelConfig;
pub use content::{ContentRecord, ContentType, LocalCopy};
pub use size::{format_bytes, parse_size};
