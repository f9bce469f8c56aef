pub mod chunker;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{expand_path, resolve_with_base, Settings};
pub use error::{Error, Result};
