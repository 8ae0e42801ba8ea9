use crate::github::DEFAULT_API_BASE_URL;
use anyhow::{anyhow, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    env,
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

const APP_DIR_NAME: &str = "gitupdater";

pub(crate) const REPOS_FILE_NAME: &str = "repos.json";
pub(crate) const CONFIG_FILE_NAME: &str = "config.json";

/// Settings read from `config.json` in the config directory. Every field is optional.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// How many repositories are checked at the same time.
    pub workers: usize,
    /// How long a looked up release is reused before GitHub is asked again.
    pub release_cache_secs: u64,
    /// How long to wait for someone to pick an asset before giving up.
    pub chooser_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub api_base_url: Url,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            release_cache_secs: 300,
            chooser_timeout_secs: 300,
            download_timeout_secs: 600,
            api_base_url: DEFAULT_API_BASE_URL.clone(),
        }
    }
}

impl AppConfig {
    /// Reads the config file at `path`. A missing or broken file gives the default config.
    pub async fn load(path: &Path) -> AppConfig {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist, using the default config", path.display());
                return AppConfig::default();
            }
            Err(e) => {
                warn!(
                    "could not read {}, using the default config: {e}",
                    path.display()
                );
                return AppConfig::default();
            }
        };

        match serde_json::from_slice::<AppConfig>(&bytes) {
            Ok(mut config) => {
                if config.workers == 0 {
                    warn!("workers must be at least 1 in {}", path.display());
                    config.workers = 1;
                }
                config
            }
            Err(e) => {
                warn!(
                    "could not parse {}, using the default config: {e}",
                    path.display()
                );
                AppConfig::default()
            }
        }
    }

    #[must_use]
    pub fn release_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.release_cache_secs)
    }

    #[must_use]
    pub fn chooser_timeout(&self) -> Duration {
        Duration::from_secs(self.chooser_timeout_secs)
    }

    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Returns the directory holding `repos.json` and `config.json`. This is `explicit` if given,
/// otherwise `$XDG_CONFIG_HOME/gitupdater`, otherwise `~/.config/gitupdater`.
///
/// # Errors
///
/// This fails if no directory was given and the home directory cannot be determined.
pub fn config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    resolve_config_dir(explicit, env::var_os("XDG_CONFIG_HOME"), dirs::home_dir())
}

fn resolve_config_dir(
    explicit: Option<&Path>,
    xdg_config_home: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(xdg) = xdg_config_home.filter(|x| !x.is_empty()) {
        return Ok(PathBuf::from(xdg).join(APP_DIR_NAME));
    }
    home.map(|h| h.join(".config").join(APP_DIR_NAME))
        .ok_or_else(|| anyhow!("could not find your home directory, use --config-dir"))
}
