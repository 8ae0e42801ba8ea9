/// The `builder` module contains the `UpdaterBuilder` struct which is used to create an `Updater`
/// instance.
use crate::{
    chooser::Chooser,
    config::{self, AppConfig, CONFIG_FILE_NAME, REPOS_FILE_NAME},
    github::{CachedReleaseSource, GitHub},
    installer::UpdateApplier,
    platform::PlatformIdentity,
    store::RepositoryStore,
    updater::Updater,
};
use anyhow::{anyhow, Result};
use log::debug;
use reqwest::{
    header::{HeaderMap, HeaderValue, USER_AGENT},
    Client,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use url::Url;

/// `UpdaterBuilder` is used to create an [`Updater`] instance. Anything not set here comes from
/// `config.json` in the config directory, or from the defaults in [`AppConfig`].
#[derive(Debug, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct UpdaterBuilder<'a> {
    config_dir: Option<PathBuf>,
    api_base_url: Option<&'a str>,
    token: Option<&'a str>,
    platform: Option<&'a PlatformIdentity>,
    workers: Option<usize>,
    release_cache_ttl: Option<Duration>,
    chooser_timeout: Option<Duration>,
    download_timeout: Option<Duration>,
    chooser: Option<Arc<dyn Chooser>>,
}

impl<'a> UpdaterBuilder<'a> {
    /// Returns a new empty `UpdaterBuilder`.
    #[must_use]
    pub fn new() -> Self {
        UpdaterBuilder::default()
    }

    /// Set the directory that holds `repos.json` and `config.json`. If not set, this is
    /// `$XDG_CONFIG_HOME/gitupdater` or `~/.config/gitupdater`.
    #[must_use]
    pub fn config_dir<P: AsRef<Path>>(mut self, config_dir: P) -> Self {
        self.config_dir = Some(config_dir.as_ref().to_path_buf());
        self
    }

    /// Set the base URL for the GitHub API. This is useful for testing or if you want to operate
    /// against GitHub Enterprise. This should be something like
    /// `https://github.my-corp.example.com/api/v3`.
    #[must_use]
    pub fn api_base_url(mut self, api_base_url: &'a str) -> Self {
        self.api_base_url = Some(api_base_url);
        self
    }

    /// Set a token to use for API requests. If this is not set, then the `GITHUB_TOKEN` and
    /// `GITHUB_ACCESS_TOKEN` env vars are checked, in that order.
    #[must_use]
    pub fn token(mut self, token: &'a str) -> Self {
        self.token = Some(token);
        self
    }

    /// Set the platform to pick assets for. If not set it will be determined based on the current
    /// platform's OS/arch.
    #[must_use]
    pub fn platform(mut self, platform: &'a PlatformIdentity) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Set how many repositories are checked at the same time. Values below 1 are treated as 1.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set how long a looked up release is reused before GitHub is asked again.
    #[must_use]
    pub fn release_cache_ttl(mut self, ttl: Duration) -> Self {
        self.release_cache_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn chooser_timeout(mut self, timeout: Duration) -> Self {
        self.chooser_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = Some(timeout);
        self
    }

    /// Set the chooser that is asked when more than one asset could be the right one. Without a
    /// chooser, such repositories are reported as needing a manual selection.
    #[must_use]
    pub fn chooser(mut self, chooser: Arc<dyn Chooser>) -> Self {
        self.chooser = Some(chooser);
        self
    }

    /// Builds a new [`Updater`] instance and returns it.
    ///
    /// # Errors
    ///
    /// This fails if the config directory cannot be determined, if the API base URL is not a valid
    /// URL, if the current platform is not one assets can be picked for, or if the HTTP client
    /// cannot be created.
    pub async fn build(self) -> Result<Updater> {
        let config_dir = config::config_dir(self.config_dir.as_deref())?;
        debug!("config dir = {}", config_dir.display());

        let config = self.merged_config(AppConfig::load(&config_dir.join(CONFIG_FILE_NAME)).await)?;
        let platform = match self.platform {
            Some(p) => p.clone(),
            None => PlatformIdentity::current()?,
        };
        debug!("picking assets for {platform}");

        let client = reqwest_client()?;
        let github = GitHub::new(
            client.clone(),
            Some(config.api_base_url.clone()),
            self.token.map(String::from),
        );
        let source = CachedReleaseSource::new(github, config.release_cache_ttl());
        let applier = UpdateApplier::new(client, platform.os, config.download_timeout());
        let store = RepositoryStore::new(config_dir.join(REPOS_FILE_NAME));

        Ok(Updater::new(
            config,
            config_dir,
            store,
            Box::new(source),
            applier,
            platform,
            self.chooser,
        ))
    }

    fn merged_config(&self, mut config: AppConfig) -> Result<AppConfig> {
        if let Some(url) = self.api_base_url {
            config.api_base_url = Url::parse(url)
                .map_err(|e| anyhow!("`{url}` is not a valid API base URL: {e}"))?;
        }
        if let Some(workers) = self.workers {
            config.workers = workers.max(1);
        }
        if let Some(ttl) = self.release_cache_ttl {
            config.release_cache_secs = ttl.as_secs();
        }
        if let Some(timeout) = self.chooser_timeout {
            config.chooser_timeout_secs = timeout.as_secs();
        }
        if let Some(timeout) = self.download_timeout {
            config.download_timeout_secs = timeout.as_secs();
        }
        Ok(config)
    }
}

fn reqwest_client() -> Result<Client> {
    let builder = Client::builder().gzip(true);

    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("gitupdater/{}", super::VERSION))?,
    );
    Ok(builder.default_headers(headers).build()?)
}
