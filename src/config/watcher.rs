//! Configuration file watcher for hot reload.
//!
//! Every reload goes through [`ConfigWatcher::reload`]: the file is parsed, the
//! command-line overrides are laid over it, and only then is it validated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{read_config, ConfigError};
use crate::config::overrides::ConfigOverrides;
use crate::config::schema::GateConfig;
use crate::config::validation::validate_config;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    overrides: ConfigOverrides,
    update_tx: mpsc::UnboundedSender<GateConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configuration updates,
    /// each with `overrides` already applied.
    pub fn new(
        path: &Path,
        overrides: ConfigOverrides,
    ) -> (Self, mpsc::UnboundedReceiver<GateConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                overrides,
                update_tx,
            },
            update_rx,
        )
    }

    /// Load the file and apply the overrides.
    pub fn reload(&self) -> Result<GateConfig, ConfigError> {
        let mut config = read_config(&self.path)?;
        self.overrides.apply(&mut config);
        validate_config(&config)?;
        Ok(config)
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!("Config file change detected, reloading");
                    match self.reload() {
                        Ok(config) => {
                            let _ = self.update_tx.send(config);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Config reload failed, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "drop-connection-watch-{}-{}.toml",
            name,
            std::process::id()
        ));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reload_keeps_status_override_when_file_has_none() {
        let path = write_temp("no-range", "[upstream]\naddress = \"127.0.0.1:3000\"\n");
        let overrides = ConfigOverrides {
            status_code: Some("500-599".into()),
            ..ConfigOverrides::default()
        };
        let (watcher, _updates) = ConfigWatcher::new(&path, overrides);

        let config = watcher.reload().unwrap();
        assert_eq!(config.gate.status_code, "500-599");
        assert_eq!(config.upstream.address, "127.0.0.1:3000");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn reload_keeps_address_overrides() {
        let path = write_temp(
            "addresses",
            "[listener]\nbind_address = \"0.0.0.0:80\"\n[upstream]\naddress = \"10.0.0.1:80\"\n",
        );
        let overrides = ConfigOverrides {
            bind_address: Some("127.0.0.1:9000".into()),
            upstream_address: Some("127.0.0.1:3000".into()),
            status_code: None,
        };
        let (watcher, _updates) = ConfigWatcher::new(&path, overrides);

        let config = watcher.reload().unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.upstream.address, "127.0.0.1:3000");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn reload_without_overrides_uses_file() {
        let path = write_temp("plain", "[gate]\nstatus_code = \"400-499\"\n");
        let (watcher, _updates) = ConfigWatcher::new(&path, ConfigOverrides::default());

        assert_eq!(watcher.reload().unwrap().gate.status_code, "400-499");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn status_override_masks_bad_file_range() {
        let path = write_temp("masked", "[gate]\nstatus_code = \"abc-599\"\n");
        let overrides = ConfigOverrides {
            status_code: Some("500-599".into()),
            ..ConfigOverrides::default()
        };
        let (watcher, _updates) = ConfigWatcher::new(&path, overrides);

        assert_eq!(watcher.reload().unwrap().gate.status_code, "500-599");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn reload_rejects_invalid_file() {
        let path = write_temp("invalid", "[gate]\nstatus_code = \"abc-599\"\n");
        let overrides = ConfigOverrides {
            bind_address: Some("127.0.0.1:9000".into()),
            ..ConfigOverrides::default()
        };
        let (watcher, _updates) = ConfigWatcher::new(&path, overrides);

        assert!(matches!(watcher.reload(), Err(ConfigError::Validation(_))));
        let _ = fs::remove_file(path);
    }
}
