pub mod config;
pub mod error;
pub mod labels;
pub mod model;
pub mod registry;
pub mod time;

pub use error::{Result, WattError};
