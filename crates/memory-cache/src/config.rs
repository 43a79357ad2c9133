//! Cache sizing configuration
//!
//! Centralizes the byte budgets for the strong tier, the weak tier and the
//! buffer pool. Configuration can be created programmatically or loaded from
//! environment variables.

use thiserror::Error;

/// Byte budgets for the cache stack
///
/// A zero `memory_cache_size` disables the strong tier (the facade degrades
/// to weak-only or fully disabled, see
/// [`MemoryCache::new`](crate::MemoryCache::new)); a zero `weak_cache_size`
/// disables the weak tier; a zero `pool_size` disables buffer pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Strong tier byte budget
    pub memory_cache_size: usize,
    /// Weak tier byte cap
    pub weak_cache_size: usize,
    /// Buffer pool byte cap
    pub pool_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_cache_size: 64 * 1024 * 1024, // 64 MB
            weak_cache_size: 16 * 1024 * 1024,   // 16 MB
            pool_size: 32 * 1024 * 1024,         // 32 MB
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with custom values in megabytes.
    pub fn new(memory_mb: usize, weak_mb: usize, pool_mb: usize) -> Self {
        Self {
            memory_cache_size: memory_mb * 1024 * 1024,
            weak_cache_size: weak_mb * 1024 * 1024,
            pool_size: pool_mb * 1024 * 1024,
        }
    }

    /// Sets the strong tier budget in megabytes.
    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.memory_cache_size = mb * 1024 * 1024;
        self
    }

    /// Sets the weak tier cap in megabytes.
    pub fn with_weak_mb(mut self, mb: usize) -> Self {
        self.weak_cache_size = mb * 1024 * 1024;
        self
    }

    /// Sets the buffer pool cap in megabytes.
    pub fn with_pool_mb(mut self, mb: usize) -> Self {
        self.pool_size = mb * 1024 * 1024;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PIXLOAD_MEMORY_CACHE_MB`: strong tier budget in MB (default: 64)
    /// - `PIXLOAD_WEAK_CACHE_MB`: weak tier cap in MB (default: 16)
    /// - `PIXLOAD_POOL_MB`: buffer pool cap in MB (default: 32)
    ///
    /// # Errors
    /// Returns an error if any variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PIXLOAD_MEMORY_CACHE_MB") {
            config.memory_cache_size = parse_mb("PIXLOAD_MEMORY_CACHE_MB", &val)?;
        }
        if let Ok(val) = std::env::var("PIXLOAD_WEAK_CACHE_MB") {
            config.weak_cache_size = parse_mb("PIXLOAD_WEAK_CACHE_MB", &val)?;
        }
        if let Ok(val) = std::env::var("PIXLOAD_POOL_MB") {
            config.pool_size = parse_mb("PIXLOAD_POOL_MB", &val)?;
        }

        Ok(config)
    }

    /// Returns the strong tier budget in megabytes.
    pub fn memory_cache_mb(&self) -> usize {
        self.memory_cache_size / (1024 * 1024)
    }

    /// Returns the weak tier cap in megabytes.
    pub fn weak_cache_mb(&self) -> usize {
        self.weak_cache_size / (1024 * 1024)
    }

    /// Returns the buffer pool cap in megabytes.
    pub fn pool_mb(&self) -> usize {
        self.pool_size / (1024 * 1024)
    }
}

fn parse_mb(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .parse::<usize>()
        .map(|mb| mb * 1024 * 1024)
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var("PIXLOAD_MEMORY_CACHE_MB");
        std::env::remove_var("PIXLOAD_WEAK_CACHE_MB");
        std::env::remove_var("PIXLOAD_POOL_MB");
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.memory_cache_size, 64 * 1024 * 1024);
        assert_eq!(config.weak_cache_size, 16 * 1024 * 1024);
        assert_eq!(config.pool_size, 32 * 1024 * 1024);
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_memory_mb(128)
            .with_weak_mb(32)
            .with_pool_mb(0);

        assert_eq!(config.memory_cache_mb(), 128);
        assert_eq!(config.weak_cache_mb(), 32);
        assert_eq!(config.pool_size, 0);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("PIXLOAD_MEMORY_CACHE_MB", "100");
        std::env::set_var("PIXLOAD_WEAK_CACHE_MB", "10");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.memory_cache_mb(), 100);
        assert_eq!(config.weak_cache_mb(), 10);
        // Unset variables keep their defaults.
        assert_eq!(config.pool_mb(), 32);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_value() {
        clear_env();
        std::env::set_var("PIXLOAD_MEMORY_CACHE_MB", "lots");

        let err = CacheConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key) if key == "PIXLOAD_MEMORY_CACHE_MB"));

        clear_env();
    }
}
