use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat, Source};
use ms_mission::MissionConfig;
use ms_pixhawk::PixhawkConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MissionSupervisorConfig {
    pub pixhawk: PixhawkConfig,

    #[serde(default)]
    pub mission: MissionConfig,
}

impl MissionSupervisorConfig {
    /// Reads the config file at `path`, then applies overrides from
    /// `MISSION_SUPERVISOR__*` environment variables.
    pub fn read_from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::read(File::from(path), true)
    }

    pub fn read_from_str(contents: &str) -> Result<Self, ConfigError> {
        Self::read(File::from_str(contents, FileFormat::Toml), false)
    }

    fn read<S>(source: S, with_env: bool) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let mut c = Config::new();

        c.merge(source)?;
        if with_env {
            c.merge(Environment::with_prefix("MISSION_SUPERVISOR").separator("__"))?;
        }

        c.try_into()
    }
}
