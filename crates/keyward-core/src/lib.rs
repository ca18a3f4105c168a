pub mod config;
pub mod error;

pub use config::{load_config, KeywardConfig};
pub use error::{ConfigError, ConfigResult};
