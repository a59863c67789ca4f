//! Utilities shared by the roomcast packages.

pub mod logger;
pub mod time;
