//! Common utilities and types shared across the tool-server discovery crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
