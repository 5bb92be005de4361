mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{LoggingSettings, RelaySettings, ServerSettings, Settings};

/// Default location of the optional configuration file, without extension.
pub const DEFAULT_CONFIG_PATH: &str = "config/default";

/// Prefix for environment overrides, e.g. `FANOUT_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "FANOUT";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads the configuration from `path` (optional, any format `config`
/// understands) and the environment, merged over `Settings::default()`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_onto(Settings::default()))
}
