use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// The latest release of a repository, as returned by a [`ReleaseSource`](crate::ReleaseSource).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseSnapshot {
    pub title: String,
    pub tag: String,
    pub created_at: DateTime<Utc>,
    pub html_url: Option<Url>,
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    pub browser_download_url: Url,
    pub updated_at: DateTime<Utc>,
}

/// An update found for one tracked repository during a check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateCandidate {
    pub name: String,
    /// The installed version, or `"N/A"` if nothing was ever installed.
    pub old_version: String,
    pub new_version: String,
    pub asset_url: Url,
    pub asset_display_name: String,
    pub asset_updated_at: DateTime<Utc>,
    pub local_path: PathBuf,
    pub learned_pattern: Option<String>,
    pub auto_update: bool,
}
