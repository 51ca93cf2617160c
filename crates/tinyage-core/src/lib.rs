pub mod config;
pub mod error;

pub use config::TinyageConfig;
pub use error::{AgeError, AgeResult};
