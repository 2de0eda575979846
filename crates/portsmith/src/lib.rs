pub mod buildsystems;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod install;
pub mod log_sanitize;
pub mod platform;
pub mod ports;
pub mod util;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
