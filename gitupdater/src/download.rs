use crate::installer::ApplyEvent;
use anyhow::{anyhow, Context, Result};
use log::debug;
use percent_encoding::percent_decode_str;
use reqwest::{
    header::{HeaderValue, ACCEPT},
    Client,
};
use std::{path::PathBuf, time::Duration};
use tempfile::{tempdir, TempDir};
use tokio::{fs::File, io::AsyncWriteExt, sync::mpsc};
use url::Url;

/// Turns byte counts into whole percentages, reporting each percentage only once.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: Option<u64>,
    received: u64,
    last_percent: Option<u8>,
}

impl ProgressTracker {
    pub(crate) fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            received: 0,
            last_percent: None,
        }
    }

    /// Records `n` more bytes. Returns the new percentage if it differs from the last one
    /// returned. Nothing is ever returned when the total size is unknown.
    pub(crate) fn advance(&mut self, n: u64) -> Option<u8> {
        self.received = self.received.saturating_add(n);
        let total = self.total?;
        let percent = u8::try_from(self.received.min(total) * 100 / total).unwrap_or(100);
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(percent)
    }
}

/// A downloaded file. The file lives in a temporary directory that is deleted when this is dropped.
#[derive(Debug)]
pub(crate) struct Download {
    // Kept so the directory isn't deleted while the file is still needed.
    _temp_dir: TempDir,
    pub(crate) path: PathBuf,
}

pub(crate) async fn download(
    client: &Client,
    url: &Url,
    timeout: Duration,
    events: Option<&mpsc::Sender<ApplyEvent>>,
) -> Result<Download> {
    debug!("downloading asset from {url}");

    let req = client
        .get(url.clone())
        .header(ACCEPT, HeaderValue::from_static("application/octet-stream"))
        .timeout(timeout)
        .build()
        .with_context(|| format!("failed to build HTTP request for {url}"))?;
    let mut resp = client
        .execute(req)
        .await
        .with_context(|| format!("failed to execute HTTP request to download asset from {url}"))?;
    if let Err(e) = resp.error_for_status_ref() {
        return Err(anyhow::Error::new(e));
    }

    let td = tempdir().context("failed to create temporary directory for download")?;
    let path = td.path().join(file_name_for(url)?);
    debug!("download path is {}", path.display());

    let mut tracker = ProgressTracker::new(resp.content_length());
    let mut file = File::create(&path)
        .await
        .with_context(|| format!("failed to create file at {}", path.display()))?;
    while let Some(c) = resp
        .chunk()
        .await
        .with_context(|| format!("failed to read chunk while downloading asset from {url}"))?
    {
        file.write_all(c.as_ref())
            .await
            .with_context(|| format!("failed to write chunk to {}", path.display()))?;
        if let (Some(percent), Some(tx)) = (tracker.advance(c.len() as u64), events) {
            // A receiver that went away just doesn't get progress anymore.
            let _ = tx.send(ApplyEvent::Progress(percent)).await;
        }
    }
    file.flush().await?;

    Ok(Download {
        _temp_dir: td,
        path,
    })
}

// Path segments stay percent-encoded in a `Url`, so `My%20App.zip` has to be decoded to get the
// name the asset was uploaded with.
fn file_name_for(url: &Url) -> Result<String> {
    url.path_segments()
        .and_then(|mut s| s.next_back())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .filter(|s| !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\']))
        .ok_or_else(|| anyhow!("cannot get a file name from the URL {url}"))
}
