use crate::{
    archive,
    download::{self, Download},
    error::ApplyError,
    extension::Extension,
    os::Os,
};
use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use reqwest::Client;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{process::Command, sync::mpsc};
use url::Url;
use which::which;

/// Where an update is in its lifecycle. `Done` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum ApplyState {
    Pending,
    Downloading,
    Extracting,
    Installing,
    Moving,
    Done,
    Failed,
}

/// Sent to whoever is watching an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyEvent {
    State(ApplyState),
    /// The download progress as a whole percentage. Only sent when the value changes.
    Progress(u8),
}

/// What was done with a downloaded asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The archive was unpacked into this directory.
    Extracted(PathBuf),
    /// An installer or package was run.
    Installed,
    /// The file was moved to this path as is.
    Moved(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArtifactKind {
    Archive(Extension),
    Exe,
    Msi,
    Deb,
    Plain,
}

impl ArtifactKind {
    pub(crate) fn classify(file_name: &str, os: Os, has_dpkg: impl FnOnce() -> bool) -> Self {
        let Some(ext) = Extension::from_path(file_name) else {
            return ArtifactKind::Plain;
        };
        if ext.is_archive() {
            return ArtifactKind::Archive(ext);
        }
        match (ext, os) {
            (Extension::Exe, Os::Windows) => ArtifactKind::Exe,
            (Extension::Msi, Os::Windows) => ArtifactKind::Msi,
            (Extension::Deb, Os::Linux) if has_dpkg() => ArtifactKind::Deb,
            _ => ArtifactKind::Plain,
        }
    }

    fn state(self) -> ApplyState {
        match self {
            ArtifactKind::Archive(_) => ApplyState::Extracting,
            ArtifactKind::Exe | ArtifactKind::Msi | ArtifactKind::Deb => ApplyState::Installing,
            ArtifactKind::Plain => ApplyState::Moving,
        }
    }
}

/// Downloads a release asset and puts it in place.
#[derive(Debug)]
pub struct UpdateApplier {
    client: Client,
    os: Os,
    download_timeout: Duration,
}

impl UpdateApplier {
    #[must_use]
    pub fn new(client: Client, os: Os, download_timeout: Duration) -> Self {
        Self {
            client,
            os,
            download_timeout,
        }
    }

    /// Downloads `url` and applies it to `dest`. Archives are extracted into `dest`, installers
    /// are run with `dest` as their working directory, and anything else is moved into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplyError`] for the step that failed. A `Failed` state event is sent first.
    pub async fn apply(
        &self,
        url: &Url,
        dest: &Path,
        events: Option<&mpsc::Sender<ApplyEvent>>,
    ) -> Result<ApplyOutcome, ApplyError> {
        send(events, ApplyEvent::State(ApplyState::Pending)).await;
        let res = self.apply_inner(url, dest, events).await;
        let last = match &res {
            Ok(_) => ApplyState::Done,
            Err(_) => ApplyState::Failed,
        };
        send(events, ApplyEvent::State(last)).await;
        res
    }

    async fn apply_inner(
        &self,
        url: &Url,
        dest: &Path,
        events: Option<&mpsc::Sender<ApplyEvent>>,
    ) -> Result<ApplyOutcome, ApplyError> {
        tokio::fs::create_dir_all(dest)
            .await
            .with_context(|| format!("could not create {}", dest.display()))
            .map_err(|cause| ApplyError::Io { cause })?;

        send(events, ApplyEvent::State(ApplyState::Downloading)).await;
        let download = download::download(&self.client, url, self.download_timeout, events)
            .await
            .map_err(|cause| ApplyError::Download {
                url: url.to_string(),
                cause,
            })?;

        let file_name = file_name(&download.path);
        let kind = ArtifactKind::classify(&file_name, self.os, || which("dpkg").is_ok());
        debug!("{file_name} is handled as {kind:?}");
        send(events, ApplyEvent::State(kind.state())).await;

        match kind {
            ArtifactKind::Archive(ext) => {
                archive::extract(&download.path, ext, dest)
                    .await
                    .map_err(|cause| ApplyError::Extract {
                        path: download.path.clone(),
                        cause,
                    })?;
                tokio::fs::remove_file(&download.path)
                    .await
                    .with_context(|| format!("could not delete {}", download.path.display()))
                    .map_err(|cause| ApplyError::Io { cause })?;
                info!("extracted {file_name} into {}", dest.display());
                Ok(ApplyOutcome::Extracted(dest.to_path_buf()))
            }
            ArtifactKind::Exe | ArtifactKind::Msi | ArtifactKind::Deb => {
                run_installer(kind, &download, dest)
                    .await
                    .map_err(|cause| ApplyError::Install {
                        path: download.path.clone(),
                        cause,
                    })?;
                info!("ran the installer {file_name}");
                Ok(ApplyOutcome::Installed)
            }
            ArtifactKind::Plain => {
                let target = dest.join(&file_name);
                move_file(&download.path, &target)
                    .await
                    .map_err(|cause| ApplyError::Io { cause })?;
                info!("moved {file_name} to {}", target.display());
                Ok(ApplyOutcome::Moved(target))
            }
        }
    }
}

async fn send(events: Option<&mpsc::Sender<ApplyEvent>>, event: ApplyEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn run_installer(kind: ArtifactKind, download: &Download, dest: &Path) -> Result<()> {
    let mut cmd = match kind {
        ArtifactKind::Exe => Command::new(&download.path),
        ArtifactKind::Msi => {
            let mut cmd = Command::new("msiexec");
            cmd.arg("/i").arg(&download.path);
            cmd
        }
        ArtifactKind::Deb => {
            let mut cmd = Command::new("dpkg");
            cmd.arg("-i").arg(&download.path);
            cmd
        }
        ArtifactKind::Archive(_) | ArtifactKind::Plain => {
            return Err(anyhow!("{kind:?} is not an installer"));
        }
    };
    cmd.current_dir(dest);

    debug!("running {cmd:?}");
    let status = cmd
        .status()
        .await
        .with_context(|| format!("could not run {cmd:?}"))?;
    if !status.success() {
        return Err(anyhow!("{cmd:?} exited with {status}"));
    }
    Ok(())
}

async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // Renaming fails across filesystems, and the download directory is usually on another one.
    debug!(
        "could not rename {} to {}, copying it instead",
        from.display(),
        to.display()
    );
    tokio::fs::copy(from, to)
        .await
        .with_context(|| format!("could not copy {} to {}", from.display(), to.display()))?;
    tokio::fs::remove_file(from)
        .await
        .with_context(|| format!("could not delete {}", from.display()))?;
    Ok(())
}
