use crate::{
    chooser::{Chooser, HeadlessChooser},
    config::AppConfig,
    error::{ApplyError, PollError},
    github::ReleaseSource,
    installer::{ApplyEvent, ApplyOutcome, UpdateApplier},
    platform::PlatformIdentity,
    poller::{PollReport, ReleasePoller},
    release::UpdateCandidate,
    store::RepositoryStore,
};
use futures::{stream, StreamExt};
use log::{error, info};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::mpsc;

/// The main entry point. Use [`UpdaterBuilder`](crate::UpdaterBuilder) to create one.
#[derive(Debug)]
pub struct Updater {
    config: AppConfig,
    config_dir: PathBuf,
    store: RepositoryStore,
    source: Box<dyn ReleaseSource>,
    applier: UpdateApplier,
    platform: PlatformIdentity,
    chooser: Option<Arc<dyn Chooser>>,
    in_flight: Mutex<HashSet<String>>,
}

/// The result of one unattended update cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// How many repositories were checked.
    pub checked: usize,
    /// `(name, new version)` for every repository that was updated.
    pub applied: Vec<(String, String)>,
    pub poll_errors: Vec<PollError>,
    pub apply_errors: Vec<(String, ApplyError)>,
}

impl CycleReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.poll_errors.is_empty() && self.apply_errors.is_empty()
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }
}

/// Marks a repository as being updated until it is dropped.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    name: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

impl Updater {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: AppConfig,
        config_dir: PathBuf,
        store: RepositoryStore,
        source: Box<dyn ReleaseSource>,
        applier: UpdateApplier,
        platform: PlatformIdentity,
        chooser: Option<Arc<dyn Chooser>>,
    ) -> Self {
        Self {
            config,
            config_dir,
            store,
            source,
            applier,
            platform,
            chooser,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The tracked repositories. Use this to add, change, and remove them.
    #[must_use]
    pub fn store(&self) -> &RepositoryStore {
        &self.store
    }

    #[must_use]
    pub fn platform(&self) -> &PlatformIdentity {
        &self.platform
    }

    /// Checks every tracked repository, asking the chooser given to the builder when an asset can't
    /// be picked automatically.
    pub async fn check(&self) -> PollReport {
        self.check_with(self.chooser.as_deref()).await
    }

    /// Like [`Updater::check`], with a different chooser.
    pub async fn check_with(&self, chooser: Option<&dyn Chooser>) -> PollReport {
        let repos = self.store.list().await;
        self.poller(chooser).poll_all_collected(repos).await
    }

    fn poller<'a>(&'a self, chooser: Option<&'a dyn Chooser>) -> ReleasePoller<'a> {
        ReleasePoller::new(
            self.source.as_ref(),
            &self.store,
            &self.platform,
            chooser,
            self.config.workers,
        )
    }

    /// Marks `name` as being updated.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::InProgress`] if an update of `name` is already running.
    pub fn begin_update(&self, name: &str) -> Result<InFlightGuard<'_>, ApplyError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(name.to_string()) {
            return Err(ApplyError::InProgress {
                repository: name.to_string(),
            });
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            name: name.to_string(),
        })
    }

    /// Downloads and applies `candidate`, then records its new version. Only one update per
    /// repository can run at a time.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplyError`] if anything fails. The recorded version is only changed on
    /// success.
    pub async fn apply_update(
        &self,
        candidate: &UpdateCandidate,
        events: Option<&mpsc::Sender<ApplyEvent>>,
    ) -> Result<ApplyOutcome, ApplyError> {
        let _guard = self.begin_update(&candidate.name)?;
        info!(
            "updating {} from {} to {} with {}",
            candidate.name, candidate.old_version, candidate.new_version, candidate.asset_display_name
        );

        let outcome = self
            .applier
            .apply(&candidate.asset_url, &candidate.local_path, events)
            .await?;

        self.store
            .set_installed_version(&candidate.name, &candidate.new_version)
            .await
            .map_err(|e| ApplyError::Persist {
                repository: candidate.name.clone(),
                cause: e.into(),
            })?;
        info!("{} is now at {}", candidate.name, candidate.new_version);

        Ok(outcome)
    }

    /// Checks the repositories with auto update turned on and applies every update found, without
    /// asking anyone anything.
    pub async fn run_headless(&self) -> CycleReport {
        let repos = self
            .store
            .list()
            .await
            .into_iter()
            .filter(|r| r.auto_update)
            .collect::<Vec<_>>();
        info!("checking {} repositories with auto update on", repos.len());

        let mut report = CycleReport {
            checked: repos.len(),
            ..CycleReport::default()
        };
        let poll = self
            .poller(Some(&HeadlessChooser))
            .poll_all_collected(repos)
            .await;
        report.poll_errors = poll.errors;

        let results = stream::iter(poll.candidates)
            .map(|c| async move {
                let res = self.apply_update(&c, None).await;
                (c, res)
            })
            .buffer_unordered(self.config.workers.max(1))
            .collect::<Vec<_>>()
            .await;
        for (c, res) in results {
            match res {
                Ok(_) => report.applied.push((c.name, c.new_version)),
                Err(e) => {
                    error!("could not update {}: {e}", c.name);
                    report.apply_errors.push((c.name, e));
                }
            }
        }

        report
    }
}
