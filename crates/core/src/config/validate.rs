use super::{types::Config, ConfigError, TransferSettings};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - transfer.preload_percent is at most 100 (0 or less disables preload)
/// - transfer.cache_size is not 0
/// - Poll intervals are not 0
/// - stream.chunk_size is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    validate_transfer_settings(&config.transfer)?;

    if config.lifecycle.metadata_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "lifecycle.metadata_poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.lifecycle.reaper_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "lifecycle.reaper_interval_secs cannot be 0".to_string(),
        ));
    }

    if config.stream.buffer_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "stream.buffer_poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.stream.chunk_size == 0 {
        return Err(ConfigError::ValidationError(
            "stream.chunk_size cannot be 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate transfer settings, both at load time and on runtime reconfigure.
pub fn validate_transfer_settings(settings: &TransferSettings) -> Result<(), ConfigError> {
    if settings.preload_percent > 100 {
        return Err(ConfigError::ValidationError(format!(
            "transfer.preload_percent cannot exceed 100, got {}",
            settings.preload_percent
        )));
    }

    if settings.cache_size == 0 {
        return Err(ConfigError::ValidationError(
            "transfer.cache_size cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse().unwrap(),
                port: 0,
            },
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_preload_percent_range() {
        let mut config = Config::default();
        config.transfer.preload_percent = 101;
        assert!(validate_config(&config).is_err());

        config.transfer.preload_percent = 100;
        assert!(validate_config(&config).is_ok());

        // Non-positive values disable the preload
        config.transfer.preload_percent = 0;
        assert!(validate_config(&config).is_ok());
        config.transfer.preload_percent = -1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_intervals_fail() {
        let mut config = Config::default();
        config.stream.buffer_poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.lifecycle.metadata_poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }
}
