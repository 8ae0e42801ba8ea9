use crate::error::StoreError;
use lazy_regex::regex_captures;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf};

pub(crate) const CURRENT_SCHEMA: u32 = 1;

// Older settings windows wrote the label of the combo box default into the pattern field.
const AUTO_DETECT: &str = "Auto Detect";

const NOT_INSTALLED: &str = "N/A";

/// One repository whose releases are tracked. The serialized field names are the ones used in
/// `repos.json`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct TrackedRepository {
    /// `owner/repo`, unique within the list.
    pub name: String,
    /// `https://github.com/owner/repo`
    pub url: String,
    #[serde(rename = "path", default)]
    pub local_path: PathBuf,
    #[serde(rename = "correct_package_name", default)]
    pub learned_pattern: String,
    #[serde(rename = "version", default)]
    pub installed_version: String,
    #[serde(default)]
    pub auto_update: bool,
}

impl TrackedRepository {
    /// Creates a new entry from a repository URL. Anything after `owner/repo` in the URL is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidUrl`] if `url` is not a GitHub repository URL.
    pub fn new(url: &str, local_path: PathBuf, auto_update: bool) -> Result<Self, StoreError> {
        let (name, url) = parse_repository_url(url)?;
        Ok(Self {
            name,
            url,
            local_path,
            learned_pattern: String::new(),
            installed_version: String::new(),
            auto_update,
        })
    }

    /// The `owner/repo` project that releases are looked up for. This comes from the URL, since the
    /// name can be changed to anything.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidUrl`] if the stored URL was edited into something else.
    pub fn project(&self) -> Result<String, StoreError> {
        parse_repository_url(&self.url).map(|(project, _)| project)
    }

    #[must_use]
    pub fn learned_pattern(&self) -> Option<&str> {
        match self.learned_pattern.trim() {
            "" | AUTO_DETECT => None,
            p => Some(p),
        }
    }

    #[must_use]
    pub fn installed_version(&self) -> Option<&str> {
        match self.installed_version.trim() {
            "" => None,
            v => Some(v),
        }
    }

    /// The installed version, or `"N/A"` if nothing was installed yet.
    #[must_use]
    pub fn display_version(&self) -> &str {
        self.installed_version().unwrap_or(NOT_INSTALLED)
    }
}

/// The document stored in `repos.json`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct RepositoryList {
    #[serde(default = "current_schema")]
    pub schema: u32,
    #[serde(default)]
    pub repos: Vec<TrackedRepository>,
}

fn current_schema() -> u32 {
    CURRENT_SCHEMA
}

impl Default for RepositoryList {
    fn default() -> Self {
        Self {
            schema: CURRENT_SCHEMA,
            repos: vec![],
        }
    }
}

impl RepositoryList {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TrackedRepository> {
        self.repos.iter().find(|r| r.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TrackedRepository> {
        self.repos.iter_mut().find(|r| r.name == name)
    }

    /// Logs every problem with the document that we can work around. Returns false if there were
    /// any.
    pub(crate) fn validate(&self) -> bool {
        let mut ok = true;
        if self.schema > CURRENT_SCHEMA {
            warn!(
                "the repository list uses schema {} but only schema {CURRENT_SCHEMA} is known",
                self.schema
            );
            ok = false;
        }

        let mut seen = HashSet::new();
        for repo in &self.repos {
            if !seen.insert(repo.name.as_str()) {
                warn!(
                    "the repository {} is listed more than once, only the first entry is used",
                    repo.name
                );
                ok = false;
            }
            if parse_repository_url(&repo.url).is_err() {
                warn!(
                    "the URL of repository {} is not a GitHub repository URL: {}",
                    repo.name, repo.url
                );
                ok = false;
            }
        }
        ok
    }
}

/// Strips everything after `https://github.com/owner/repo` and returns `(owner/repo, url)`.
pub(crate) fn parse_repository_url(url: &str) -> Result<(String, String), StoreError> {
    let Some((_, owner, repo)) = regex_captures!(
        r"^https://github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)(?:[/?#].*)?$",
        url.trim()
    ) else {
        return Err(StoreError::InvalidUrl {
            url: url.to_string(),
        });
    };
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    Ok((
        format!("{owner}/{repo}"),
        format!("https://github.com/{owner}/{repo}"),
    ))
}
