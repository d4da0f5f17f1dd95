//! Children's story generator: pick story elements, get a story from a
//! text-generation service and, optionally, one illustration per paragraph.

pub mod core;
pub mod services;
pub mod ui;
