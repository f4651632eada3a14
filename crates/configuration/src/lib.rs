use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod trading;

// Re-export the core types to provide a clean public API.
pub use settings::{EngineSettings, ExchangeSettings, LogSettings, Settings};
pub use trading::TradingConfig;

/// Loads runtime settings from an optional `meridian.toml` and from
/// `MERIDIAN__*` environment variables, which take precedence.
///
/// Every field has a default, so a missing file is not an error.
pub fn load_settings(file: Option<&str>) -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(file.unwrap_or("meridian")).required(file.is_some()))
        .add_source(config::Environment::with_prefix("MERIDIAN").separator("__"))
        .build()?;

    let settings = builder.try_deserialize::<Settings>()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_without_a_file() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings.fiat, "USDT");
        assert_eq!(settings.exchange.max_attempts, 5);
    }

    #[test]
    fn settings_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("meridian-settings-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "fiat = \"BUSD\"\n[exchange]\nrequest_timeout_ms = 2500\n[engine]\nclose_on_shutdown = true\n",
        )
        .unwrap();
        let settings = load_settings(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.fiat, "BUSD");
        assert_eq!(settings.exchange.request_timeout_ms, 2500);
        assert_eq!(settings.exchange.max_attempts, 5);
        assert!(settings.engine.close_on_shutdown);
        assert_eq!(settings.engine.pause_cooldown_secs, 300);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(matches!(
            load_settings(Some("/definitely/not/here.toml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}
