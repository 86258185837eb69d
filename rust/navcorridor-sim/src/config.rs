use std::env;
use std::path::PathBuf;

use anyhow::Context;
use navcorridor_core::TracerSettings;

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub settings_path: Option<PathBuf>,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let settings_path = env::var("NAVCORRIDOR_SETTINGS").ok().map(PathBuf::from);
        let log_json = env::var("NAVCORRIDOR_LOG_JSON")
            .ok()
            .map(|s| matches!(s.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            settings_path,
            log_json,
        })
    }

    /// CLI flags win over the environment.
    pub fn with_overrides(mut self, settings_path: Option<PathBuf>, log_json: bool) -> Self {
        if settings_path.is_some() {
            self.settings_path = settings_path;
        }
        self.log_json |= log_json;
        self
    }

    pub fn load_settings(&self) -> anyhow::Result<TracerSettings> {
        match &self.settings_path {
            Some(path) => TracerSettings::from_path(path).with_context(|| format!("loading tracer settings from {:?}", path)),
            None => Ok(TracerSettings::default()),
        }
    }
}
