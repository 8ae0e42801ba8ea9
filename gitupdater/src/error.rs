use crate::os::Os;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PickError {
    /// More than one asset is left and nobody picked one of them.
    #[error("could not decide between {} assets: {}", candidates.len(), candidates.join(", "))]
    Ambiguous { candidates: Vec<String> },
}

/// A failure to check one repository. These never stop the other repositories from being checked.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("could not look up the latest release of {repository}: {cause:#}")]
    Lookup {
        repository: String,
        cause: anyhow::Error,
    },
    #[error("the latest release of {repository} has no asset for this OS ({os})")]
    NoCompatibleAsset { repository: String, os: Os },
    #[error(
        "manual selection needed for {repository}, could not decide between: {}",
        candidates.join(", ")
    )]
    Ambiguous {
        repository: String,
        candidates: Vec<String>,
    },
    #[error("could not save the asset pattern learned for {repository}: {cause:#}")]
    Persist {
        repository: String,
        cause: anyhow::Error,
    },
}

impl PollError {
    #[must_use]
    pub fn repository(&self) -> &str {
        match self {
            PollError::Lookup { repository, .. }
            | PollError::NoCompatibleAsset { repository, .. }
            | PollError::Ambiguous { repository, .. }
            | PollError::Persist { repository, .. } => repository,
        }
    }
}

/// A failure while downloading or applying one release asset. The repository's installed version
/// is never changed when one of these is returned.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("an update of {repository} is already in progress")]
    InProgress { repository: String },
    #[error("could not download {url}: {cause:#}")]
    Download { url: String, cause: anyhow::Error },
    #[error("could not extract {}: {cause:#}", path.display())]
    Extract { path: PathBuf, cause: anyhow::Error },
    #[error("could not install {}: {cause:#}", path.display())]
    Install { path: PathBuf, cause: anyhow::Error },
    #[error("{cause:#}")]
    Io { cause: anyhow::Error },
    #[error("{repository} was updated but its new version could not be saved: {cause:#}")]
    Persist {
        repository: String,
        cause: anyhow::Error,
    },
}

/// Errors from adding, changing, or removing tracked repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("`{url}` is not a GitHub repository URL like https://github.com/owner/repo")]
    InvalidUrl { url: String },
    #[error("repository {name} already exists")]
    AlreadyExists { name: String },
    #[error("a different repository with the same name ({name}) already exists")]
    NameTaken { name: String },
    #[error("there is no tracked repository named {name}")]
    NotFound { name: String },
    #[error("could not update {}: {cause:#}", path.display())]
    Io { path: PathBuf, cause: anyhow::Error },
}
