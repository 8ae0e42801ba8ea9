use crate::release::{ReleaseAsset, ReleaseSnapshot};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_regex::Lazy;
use log::debug;
use reqwest::{
    header::{HeaderValue, ACCEPT, AUTHORIZATION},
    Client, RequestBuilder,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, env, fmt::Debug, sync::Mutex, time::Duration};
use tokio::time::Instant;
use url::Url;

pub(crate) static DEFAULT_API_BASE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("https://api.github.com").unwrap());

const TOKEN_ENV_VARS: &[&str] = &["GITHUB_TOKEN", "GITHUB_ACCESS_TOKEN"];

/// Something that can tell us about the latest release of a repository.
#[async_trait]
pub trait ReleaseSource: Debug + Send + Sync {
    /// Returns the latest release of `project`, which is an `owner/repo` name.
    async fn latest_release(&self, project: &str) -> Result<ReleaseSnapshot>;
}

/// Looks up releases with the GitHub REST API.
#[derive(Debug)]
pub struct GitHub {
    client: Client,
    api_base_url: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct Release {
    #[serde(default)]
    pub(crate) name: Option<String>,
    pub(crate) tag_name: String,
    pub(crate) created_at: DateTime<Utc>,
    #[serde(default)]
    pub(crate) html_url: Option<Url>,
    #[serde(default)]
    pub(crate) assets: Vec<ReleaseAsset>,
}

impl From<Release> for ReleaseSnapshot {
    fn from(release: Release) -> Self {
        let title = match release.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => release.tag_name.clone(),
        };
        ReleaseSnapshot {
            title,
            tag: release.tag_name,
            created_at: release.created_at,
            html_url: release.html_url,
            assets: release.assets,
        }
    }
}

#[async_trait]
impl ReleaseSource for GitHub {
    async fn latest_release(&self, project: &str) -> Result<ReleaseSnapshot> {
        let url = self.release_info_url(project)?;
        debug!("Getting release info from `{url}`");

        let mut req_builder = self.client.get(url).header(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        req_builder = self.maybe_add_token_header(req_builder)?;
        let resp = self.client.execute(req_builder.build()?).await?;
        if let Err(e) = resp.error_for_status_ref() {
            return Err(anyhow::Error::new(e));
        }

        let release = resp
            .json::<Release>()
            .await
            .with_context(|| format!("could not parse the latest release of {project}"))?;
        debug!(
            "the latest release of {project} is {} with {} assets",
            release.tag_name,
            release.assets.len()
        );
        Ok(release.into())
    }
}

impl GitHub {
    /// Creates a new client. If `token` is `None`, the `GITHUB_TOKEN` and `GITHUB_ACCESS_TOKEN` env
    /// vars are checked, in that order.
    #[must_use]
    pub fn new(client: Client, api_base_url: Option<Url>, token: Option<String>) -> Self {
        Self {
            client,
            api_base_url: api_base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.clone()),
            token: token.or_else(token_from_env),
        }
    }

    fn release_info_url(&self, project: &str) -> Result<Url> {
        let (owner, repo) = project
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| anyhow!("`{project}` is not an owner/repo project name"))?;

        let mut url = self.api_base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("{} cannot be used as an API base URL", self.api_base_url))?
            .pop_if_empty()
            .push("repos")
            .push(owner)
            .push(repo)
            .push("releases")
            .push("latest");
        Ok(url)
    }

    fn maybe_add_token_header(&self, mut req_builder: RequestBuilder) -> Result<RequestBuilder> {
        if let Some(token) = self.token.as_deref() {
            debug!("Adding token to GitHub request.");
            let bearer = format!("Bearer {token}");
            let mut auth_val = HeaderValue::from_str(&bearer)?;
            auth_val.set_sensitive(true);
            req_builder = req_builder.header(AUTHORIZATION, auth_val);
        } else {
            debug!("No token given.");
        }
        Ok(req_builder)
    }
}

fn token_from_env() -> Option<String> {
    TOKEN_ENV_VARS.iter().find_map(|name| {
        let token = env::var(name).ok().filter(|t| !t.is_empty())?;
        debug!("Using GitHub token from the {name} environment variable.");
        Some(token)
    })
}

/// Remembers each successful lookup for `ttl`. Failed lookups are not remembered.
#[derive(Debug)]
pub struct CachedReleaseSource<S> {
    inner: S,
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, ReleaseSnapshot)>>,
}

impl<S: ReleaseSource> CachedReleaseSource<S> {
    #[must_use]
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, project: &str) -> Option<ReleaseSnapshot> {
        let entries = self.entries.lock().ok()?;
        let (fetched_at, snapshot) = entries.get(project)?;
        (fetched_at.elapsed() < self.ttl).then(|| snapshot.clone())
    }
}

#[async_trait]
impl<S: ReleaseSource> ReleaseSource for CachedReleaseSource<S> {
    async fn latest_release(&self, project: &str) -> Result<ReleaseSnapshot> {
        if let Some(snapshot) = self.cached(project) {
            debug!("using the cached latest release of {project}");
            return Ok(snapshot);
        }

        let snapshot = self.inner.latest_release(project).await?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(project.to_string(), (Instant::now(), snapshot.clone()));
        }
        Ok(snapshot)
    }
}
