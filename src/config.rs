use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// History window and sampling cadence of one monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub history_duration_secs: u64,
    pub update_interval_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::new(3600, 1)
    }
}

impl MonitorSettings {
    /// Settings expressed the usual way, both values in seconds.
    pub fn new(history_duration_secs: u64, update_interval_secs: u64) -> Self {
        Self {
            history_duration_secs,
            update_interval_ms: update_interval_secs.saturating_mul(1000),
        }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn history_duration(&self) -> Duration {
        Duration::from_secs(self.history_duration_secs)
    }

    /// Number of samples the history keeps: `floor(duration / interval)`.
    pub fn capacity(&self) -> usize {
        if self.update_interval_ms == 0 {
            return 0;
        }
        let samples =
            u128::from(self.history_duration_secs) * 1000 / u128::from(self.update_interval_ms);
        usize::try_from(samples).unwrap_or(usize::MAX)
    }

    fn validate(&self, monitor: &str) -> Result<()> {
        if self.update_interval_ms == 0 {
            return Err(Error::Config(format!(
                "{monitor}: update_interval_ms must be greater than zero"
            )));
        }
        if self.history_duration_secs.checked_mul(1000).is_none() {
            return Err(Error::Config(format!(
                "{monitor}: history_duration_secs {} is out of range",
                self.history_duration_secs
            )));
        }
        Ok(())
    }
}

/// Settings for all five monitors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)] // missing sections fall back to their defaults
pub struct Settings {
    pub cpu: MonitorSettings,
    pub memory: MonitorSettings,
    pub disk: MonitorSettings,
    pub network: MonitorSettings,
    pub process: MonitorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cpu: MonitorSettings::new(3600, 1),
            memory: MonitorSettings::new(3600, 1),
            disk: MonitorSettings::new(3600, 5),
            network: MonitorSettings::new(3600, 1),
            process: MonitorSettings::new(3600, 1),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|err| Error::read(path, err))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.cpu.validate("cpu")?;
        self.memory.validate("memory")?;
        self.disk.validate("disk")?;
        self.network.validate("network")?;
        self.process.validate("process")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_capacities() {
        let settings = Settings::default();
        assert_eq!(settings.cpu.capacity(), 3600);
        assert_eq!(settings.disk.capacity(), 720);
        assert_eq!(settings.process.capacity(), 3600);
    }

    #[test]
    fn capacity_floors() {
        assert_eq!(MonitorSettings::new(10, 3).capacity(), 3);
        assert_eq!(MonitorSettings::new(2, 5).capacity(), 0);
        let fast = MonitorSettings {
            history_duration_secs: 1,
            update_interval_ms: 300,
        };
        assert_eq!(fast.capacity(), 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings =
            Settings::from_json(r#"{ "disk": { "update_interval_ms": 10000 } }"#).unwrap();
        assert_eq!(settings.disk.update_interval_ms, 10000);
        assert_eq!(settings.disk.history_duration_secs, 3600);
        assert_eq!(settings.cpu, MonitorSettings::new(3600, 1));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = Settings::from_json(r#"{ "cpu": { "update_interval_ms": 0 } }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn huge_duration_is_rejected() {
        let err = Settings::from_json(
            r#"{ "cpu": { "history_duration_secs": 18446744073709552, "update_interval_ms": 1000 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let huge = MonitorSettings {
            history_duration_secs: u64::MAX,
            update_interval_ms: 1,
        };
        assert_eq!(huge.capacity(), usize::MAX);
        assert_eq!(MonitorSettings::new(60, u64::MAX).update_interval_ms, u64::MAX);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "network": {{ "history_duration_secs": 60, "update_interval_ms": 500 }} }}"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.network.capacity(), 120);
    }

    #[test]
    fn load_missing_file() {
        let err = Settings::load("/nonexistent/sysmon.json").unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
