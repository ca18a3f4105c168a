use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Smallest RSA modulus keyward will generate or accept from config
pub const MIN_MODULUS_BITS: usize = 2048;

/// Top-level configuration (loaded from keyward.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywardConfig {
    pub keystore: KeyStoreConfig,
    pub asymmetric: AsymmetricConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStoreConfig {
    /// Symmetric key file (default: keys/main.dat)
    pub key_file: PathBuf,
    /// How long to wait for the key file repair lock, in milliseconds
    pub lock_timeout_ms: u64,
}

impl KeyStoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsymmetricConfig {
    /// RSA modulus size for generated keypairs (default: 2048)
    pub modulus_bits: usize,
    /// Write generated keys as PEM (true) or raw DER (false)
    pub pem: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            key_file: PathBuf::from("keys/main.dat"),
            lock_timeout_ms: 5000,
        }
    }
}

impl Default for AsymmetricConfig {
    fn default() -> Self {
        Self {
            modulus_bits: MIN_MODULUS_BITS,
            pem: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl KeywardConfig {
    /// Reject settings that would weaken the key material or hang the store.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.asymmetric.modulus_bits < MIN_MODULUS_BITS {
            return Err(ConfigError::Invalid(format!(
                "asymmetric.modulus_bits must be at least {MIN_MODULUS_BITS}, got {}",
                self.asymmetric.modulus_bits
            )));
        }
        if self.keystore.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "keystore.lock_timeout_ms must be greater than zero".into(),
            ));
        }
        match self.logging.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(ConfigError::Invalid(format!(
                "logging.format must be \"json\" or \"text\", got {other:?}"
            ))),
        }
    }
}

/// Load and validate a config file, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> ConfigResult<KeywardConfig> {
    let config = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            KeywardConfig::default()
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    config.validate()?;
    Ok(config)
}
