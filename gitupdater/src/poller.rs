use crate::{
    chooser::Chooser,
    error::{PickError, PollError},
    github::ReleaseSource,
    picker::{AssetMatch, AssetPicker},
    platform::PlatformIdentity,
    release::UpdateCandidate,
    repository::TrackedRepository,
    store::RepositoryStore,
    version::extract_version,
};
use futures::{stream, Stream, StreamExt};
use log::{debug, error, info};

/// Everything found by checking a batch of repositories.
#[derive(Debug, Default)]
pub struct PollReport {
    pub candidates: Vec<UpdateCandidate>,
    pub errors: Vec<PollError>,
}

/// Checks tracked repositories for new releases, a bounded number at a time.
#[derive(Debug)]
pub struct ReleasePoller<'a> {
    source: &'a dyn ReleaseSource,
    store: &'a RepositoryStore,
    platform: &'a PlatformIdentity,
    chooser: Option<&'a dyn Chooser>,
    workers: usize,
}

impl<'a> ReleasePoller<'a> {
    #[must_use]
    pub fn new(
        source: &'a dyn ReleaseSource,
        store: &'a RepositoryStore,
        platform: &'a PlatformIdentity,
        chooser: Option<&'a dyn Chooser>,
        workers: usize,
    ) -> Self {
        Self {
            source,
            store,
            platform,
            chooser,
            workers: workers.max(1),
        }
    }

    /// Checks every repository in `repos`. Items arrive in the order the checks finish. Repositories
    /// that are already up to date produce no item at all.
    pub fn poll_all(
        &self,
        repos: Vec<TrackedRepository>,
    ) -> impl Stream<Item = Result<UpdateCandidate, PollError>> + '_ {
        debug!(
            "checking {} repositories with {} workers",
            repos.len(),
            self.workers
        );
        stream::iter(repos)
            .map(move |repo| async move { self.poll_one(&repo).await })
            .buffer_unordered(self.workers)
            .filter_map(|res| async move { res.transpose() })
    }

    /// Like [`ReleasePoller::poll_all`] but waits for every check to finish.
    pub async fn poll_all_collected(&self, repos: Vec<TrackedRepository>) -> PollReport {
        let mut report = PollReport::default();
        let mut results = Box::pin(self.poll_all(repos));
        while let Some(res) = results.next().await {
            match res {
                Ok(candidate) => report.candidates.push(candidate),
                Err(e) => {
                    error!("{e}");
                    report.errors.push(e);
                }
            }
        }
        report
    }

    /// Checks one repository. Returns `Ok(None)` if the installed version is already the latest.
    ///
    /// # Errors
    ///
    /// See [`PollError`] for the ways this can fail.
    pub async fn poll_one(
        &self,
        repo: &TrackedRepository,
    ) -> Result<Option<UpdateCandidate>, PollError> {
        let lookup_err = |cause: anyhow::Error| PollError::Lookup {
            repository: repo.name.clone(),
            cause,
        };

        let project = repo.project().map_err(|e| lookup_err(e.into()))?;
        let release = self
            .source
            .latest_release(&project)
            .await
            .map_err(lookup_err)?;

        let picked = AssetPicker::new(self.platform, repo.learned_pattern(), self.chooser)
            .pick(&repo.name, &release.assets)
            .await
            .map_err(|PickError::Ambiguous { candidates }| PollError::Ambiguous {
                repository: repo.name.clone(),
                candidates,
            })?;
        let Some(AssetMatch {
            asset,
            learned_pattern,
        }) = picked
        else {
            return Err(PollError::NoCompatibleAsset {
                repository: repo.name.clone(),
                os: self.platform.os,
            });
        };

        if let Some(pattern) = &learned_pattern {
            self.store
                .set_learned_pattern(&repo.name, pattern)
                .await
                .map_err(|e| PollError::Persist {
                    repository: repo.name.clone(),
                    cause: e.into(),
                })?;
            info!("remembering the asset pattern `{pattern}` for {}", repo.name);
        }

        let new_version = extract_version(&release.title, &asset.updated_at);
        if repo.installed_version() == Some(new_version.as_str()) {
            debug!("{} is up to date at {new_version}", repo.name);
            return Ok(None);
        }
        debug!(
            "{} can be updated from {} to {new_version} with {}",
            repo.name,
            repo.display_version(),
            asset.name
        );

        Ok(Some(UpdateCandidate {
            name: repo.name.clone(),
            old_version: repo.display_version().to_string(),
            new_version,
            asset_url: asset.browser_download_url,
            asset_display_name: asset.name,
            asset_updated_at: asset.updated_at,
            local_path: repo.local_path.clone(),
            learned_pattern: learned_pattern.or_else(|| repo.learned_pattern().map(String::from)),
            auto_update: repo.auto_update,
        }))
    }
}
