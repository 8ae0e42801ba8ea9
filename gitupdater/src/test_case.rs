use crate::{
    github::ReleaseSource,
    release::{ReleaseAsset, ReleaseSnapshot},
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, Once,
    },
};
use url::Url;

// For rstest case tables, which can't be combined with `test_log`.
pub(crate) fn init_logging() {
    static INIT_LOGGING: Once = Once::new();
    INIT_LOGGING.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub(crate) fn asset(name: &str, base: &str) -> ReleaseAsset {
    ReleaseAsset {
        name: name.to_string(),
        size_bytes: 1024,
        browser_download_url: Url::parse(&format!("{base}/download/{name}")).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap(),
    }
}

pub(crate) fn release(title: &str, assets: Vec<ReleaseAsset>) -> ReleaseSnapshot {
    ReleaseSnapshot {
        title: title.to_string(),
        tag: title.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap(),
        html_url: None,
        assets,
    }
}

/// Serves canned releases by project name. Projects without a release fail like a 404 would.
/// Clones share their releases, so a test can keep a clone and change what the other one serves.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeReleaseSource {
    releases: Arc<Mutex<HashMap<String, ReleaseSnapshot>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeReleaseSource {
    pub(crate) fn with(self, project: &str, release: ReleaseSnapshot) -> Self {
        self.set(project, release);
        self
    }

    pub(crate) fn set(&self, project: &str, release: ReleaseSnapshot) {
        self.releases
            .lock()
            .unwrap()
            .insert(project.to_string(), release);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseSource for FakeReleaseSource {
    async fn latest_release(&self, project: &str) -> Result<ReleaseSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.releases
            .lock()
            .unwrap()
            .get(project)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found for {project}"))
    }
}
