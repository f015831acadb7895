use config::Config;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::*;

use crate::{
    driver::{RobotConfig, SimulationConfig},
    localisation::LocalisationConfig,
    navigation::NavigationConfig,
    pid::PidGains,
};

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub control: PidGains,
    pub localisation: LocalisationConfig,
    pub navigation: NavigationConfig,
    pub robot: RobotConfig,
    pub simulation: SimulationConfig,
    /// Map file in the colon separated text format. The built in arena is
    /// used when unset.
    pub map_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load_config(config: &Option<PathBuf>) -> anyhow::Result<Self> {
        let settings = if let Some(config) = config {
            info!("Using configuration from {:?}", config);
            Config::builder()
                .add_source(config::Environment::with_prefix("APP"))
                .add_source(config::File::with_name(
                    config
                        .to_str()
                        .ok_or_else(|| anyhow::anyhow!("Failed to convert path"))?,
                ))
                .build()?
        } else {
            info!("Using dev configuration");
            Config::builder()
                .add_source(config::Environment::with_prefix("APP"))
                .add_source(config::File::with_name("config/settings"))
                .add_source(config::File::with_name("config/dev_settings").required(false))
                .build()?
        };

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    static DEFAULT_CONFIG: &str = include_str!("../config/settings.yaml");

    #[test]
    fn test_config() {
        let builder = Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap();
        let config = builder.try_deserialize::<AppConfig>().unwrap();
        assert_relative_eq!(config.control.kd, 0.75);
        assert_eq!(config.localisation.particles, 1000);
        assert_relative_eq!(config.localisation.noise.gyro_drift, 0.0008);
        assert_eq!(config.navigation.wait_timeout_ms, None);
        assert_eq!(config.robot.red_capacity, 4);
        assert!(config.map_path.is_none());
    }

    #[test]
    fn missing_sections_use_defaults() {
        let builder = Config::builder()
            .add_source(config::File::from_str(
                "navigation:\n  wait_timeout_ms: 5000\n",
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap();
        let config = builder.try_deserialize::<AppConfig>().unwrap();
        assert_eq!(config.navigation.wait_timeout_ms, Some(5000));
        assert_relative_eq!(config.navigation.turn_threshold_degrees, 10.0);
        assert_eq!(config.localisation, LocalisationConfig::default());
    }
}
