use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use twin_client::{ClientConfig, DEFAULT_BASE_URL, H3State};

use crate::chat::DEFAULT_EXCHANGE_TIMEOUT;

pub const SETTINGS_DIRECTORY_NAME: &str = "twin";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const HISTORY_FILE_NAME: &str = "history.json";
pub const ENV_PREFIX: &str = "TWIN_";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const MIN_H3_LEVEL: u8 = 1;
pub const MAX_H3_LEVEL: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwinSettings {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_exchange_timeout_secs")]
    pub exchange_timeout_secs: u64,
    #[serde(default)]
    pub h3_state: H3State,
    #[serde(default)]
    pub history_path: Option<PathBuf>,
}

impl Default for TwinSettings {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            exchange_timeout_secs: default_exchange_timeout_secs(),
            h3_state: H3State::default(),
            history_path: None,
        }
    }
}

impl TwinSettings {
    pub fn normalized(mut self) -> Self {
        self.backend_url = self.backend_url.trim().trim_end_matches('/').to_string();
        if self.backend_url.is_empty() {
            self.backend_url = default_backend_url();
        }
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = default_connect_timeout_secs();
        }
        if self.exchange_timeout_secs == 0 {
            self.exchange_timeout_secs = default_exchange_timeout_secs();
        }

        let clamp = |level: u8| level.clamp(MIN_H3_LEVEL, MAX_H3_LEVEL);
        self.h3_state = H3State {
            mind: clamp(self.h3_state.mind),
            body: clamp(self.h3_state.body),
            spirit: clamp(self.h3_state.spirit),
            vocation: clamp(self.h3_state.vocation),
        };
        self.history_path = self
            .history_path
            .filter(|path| !path.as_os_str().is_empty());

        self
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.backend_url)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }

    pub fn resolved_history_path(&self) -> PathBuf {
        self.history_path
            .clone()
            .unwrap_or_else(|| SettingsStore::default_config_dir().join(HISTORY_FILE_NAME))
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<TwinSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".twin"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Loads defaults, then the settings file, then `TWIN_*` environment overrides.
    pub fn new(config_path: PathBuf) -> Self {
        let figment =
            Self::base_figment(&config_path).merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment, config_path)
    }

    /// Same as [`new`](Self::new) without the environment layer.
    pub fn from_file(config_path: PathBuf) -> Self {
        let figment = Self::base_figment(&config_path);
        Self::from_figment(figment, config_path)
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<TwinSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: TwinSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Sets the H3 state and tries to persist it.
    ///
    /// The returned state is the clamped value the caller should use, and it
    /// is kept in memory even when saving fails.
    pub fn set_h3_state(&self, h3_state: H3State) -> (H3State, Result<(), SettingsError>) {
        let next = TwinSettings {
            h3_state,
            ..(*self.settings()).clone()
        }
        .normalized();
        let applied = next.h3_state;

        let saved = self.persist(&next);
        if let Err(error) = &saved {
            tracing::warn!(error = %error, "keeping unsaved H3 state in memory");
        }
        self.settings.store(Arc::new(next));
        (applied, saved)
    }

    fn base_figment(path: &Path) -> Figment {
        let figment = Figment::from(Serialized::defaults(TwinSettings::default()));
        if path.exists() {
            figment.merge(Json::file(path))
        } else {
            tracing::info!(path = ?path, "settings file not found, using defaults");
            figment
        }
    }

    fn from_figment(figment: Figment, config_path: PathBuf) -> Self {
        let settings = match figment.extract::<TwinSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    path = ?config_path,
                    error = %error,
                    "failed to parse settings, using defaults"
                );
                TwinSettings::default()
            }
        };

        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    fn persist(&self, settings: &TwinSettings) -> Result<(), SettingsError> {
        let target = self.config_path.as_path();
        if let Some(directory) = target.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(directory).context(CreateSettingsDirectorySnafu {
                stage: "prepare-settings-directory",
                path: directory.to_path_buf(),
            })?;
        }

        let encoded = serde_json::to_vec_pretty(settings).context(EncodeSettingsSnafu {
            stage: "encode-settings",
        })?;
        let staging = target.with_extension("json.tmp");
        std::fs::write(&staging, encoded).context(WriteSettingsSnafu {
            stage: "stage-settings-file",
            path: staging.clone(),
        })?;
        std::fs::rename(&staging, target).context(ReplaceSettingsSnafu {
            stage: "swap-in-settings-file",
            path: target.to_path_buf(),
        })?;

        tracing::info!(path = ?target, backend_url = %settings.backend_url, "settings saved");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("cannot create settings directory {path:?} on `{stage}`: {source}"))]
    CreateSettingsDirectory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot encode settings on `{stage}`: {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("cannot write staged settings {path:?} on `{stage}`: {source}"))]
    WriteSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot replace settings file {path:?} on `{stage}`: {source}"))]
    ReplaceSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

fn default_backend_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_exchange_timeout_secs() -> u64 {
    DEFAULT_EXCHANGE_TIMEOUT.as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let store = SettingsStore::from_file(directory.path().join("settings.json"));

        let settings = store.settings();
        assert_eq!(*settings, TwinSettings::default());
        assert_eq!(settings.backend_url, "http://127.0.0.1:8002");
        assert_eq!(settings.h3_state, H3State::default());
    }

    #[test]
    fn partial_file_is_layered_over_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "backend_url": " http://10.0.0.5:9000/ ", "h3_state": { "mind": 8, "body": 0, "spirit": 12, "vocation": 4 } }"#,
        )
        .unwrap();

        let settings = SettingsStore::from_file(path).settings();

        assert_eq!(settings.backend_url, "http://10.0.0.5:9000");
        assert_eq!(settings.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(
            settings.h3_state,
            H3State {
                mind: 8,
                body: MIN_H3_LEVEL,
                spirit: MAX_H3_LEVEL,
                vocation: 4,
            }
        );
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("settings.json");
        std::fs::write(&path, "{ broken").unwrap();

        assert_eq!(*SettingsStore::from_file(path).settings(), TwinSettings::default());
    }

    #[test]
    fn update_persists_atomically_and_reloads() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("nested/settings.json");
        let store = SettingsStore::from_file(path.clone());

        store
            .update(TwinSettings {
                exchange_timeout_secs: 45,
                history_path: Some(directory.path().join("history.json")),
                ..TwinSettings::default()
            })
            .unwrap();

        assert_eq!(store.settings().exchange_timeout_secs, 45);
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = SettingsStore::from_file(path).settings();
        assert_eq!(reloaded.exchange_timeout(), Duration::from_secs(45));
        assert_eq!(
            reloaded.resolved_history_path(),
            directory.path().join("history.json")
        );
    }

    #[test]
    fn zero_timeouts_are_replaced_by_defaults() {
        let settings = TwinSettings {
            connect_timeout_secs: 0,
            exchange_timeout_secs: 0,
            backend_url: "  ".to_string(),
            ..TwinSettings::default()
        }
        .normalized();

        assert_eq!(settings, TwinSettings::default());
        assert_eq!(settings.client_config().base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn h3_state_survives_a_failed_save() {
        let directory = tempfile::tempdir().unwrap();
        let blocker = directory.path().join("not-a-directory");
        std::fs::write(&blocker, "").unwrap();
        let store = SettingsStore::from_file(blocker.join("settings.json"));
        let requested = H3State {
            mind: 9,
            body: 2,
            spirit: 14,
            vocation: 6,
        };

        let (applied, saved) = store.set_h3_state(requested);

        assert!(saved.is_err());
        assert_eq!(
            applied,
            H3State {
                spirit: MAX_H3_LEVEL,
                ..requested
            }
        );
        assert_eq!(store.settings().h3_state, applied);
    }
}
