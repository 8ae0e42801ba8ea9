use crate::{
    error::StoreError,
    repository::{parse_repository_url, RepositoryList, TrackedRepository},
};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::{
    io::{ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};
use tokio::{
    fs::OpenOptions,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::Mutex,
};

/// The repository list on disk. Every change goes through [`RepositoryStore::update`], which holds
/// a lock while it re-reads the whole file, changes it, and writes it back. Concurrent changes to
/// different repositories therefore never undo each other.
#[derive(Debug)]
pub struct RepositoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RepositoryStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the list. A missing file is an empty list. A file that can't be read or parsed is
    /// logged and also treated as an empty list.
    pub async fn load(&self) -> RepositoryList {
        let _guard = self.lock.lock().await;
        let list = match tokio::fs::read(&self.path).await {
            Ok(bytes) => parse_or_default(&self.path, &bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist yet", self.path.display());
                RepositoryList::default()
            }
            Err(e) => {
                warn!("could not read {}: {e}", self.path.display());
                RepositoryList::default()
            }
        };
        list.validate();
        list
    }

    pub async fn list(&self) -> Vec<TrackedRepository> {
        self.load().await.repos
    }

    pub async fn get(&self, name: &str) -> Option<TrackedRepository> {
        self.load().await.get(name).cloned()
    }

    /// Applies `f` to the current list and writes the result back. Nothing is written if `f`
    /// returns an error.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or [`StoreError::Io`] if the file could not be read, parsed, or
    /// written. A file that can't be parsed is left untouched.
    pub async fn update<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut RepositoryList) -> Result<T, StoreError>,
    {
        let _guard = self.lock.lock().await;
        let io_err = |cause: anyhow::Error| StoreError::Io {
            path: self.path.clone(),
            cause,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("could not create {}", parent.display()))
                .map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await
            .with_context(|| format!("could not open {}", self.path.display()))
            .map_err(io_err)?;

        let mut bytes = vec![];
        file.read_to_end(&mut bytes)
            .await
            .context("could not read the repository list")
            .map_err(io_err)?;
        // Writing back a default list would throw away whatever is in the file, so an unparseable
        // file is an error here rather than an empty list.
        let mut list = parse_existing(&bytes).map_err(io_err)?;

        let ret = f(&mut list)?;

        let out = to_json(&list).map_err(io_err)?;
        write_from_start(&mut file, &out).await.map_err(io_err)?;
        debug!("wrote {} repositories to {}", list.repos.len(), self.path.display());

        Ok(ret)
    }

    /// Starts tracking the repository at `url`. Returns the new entry.
    ///
    /// # Errors
    ///
    /// Fails if the URL is not a GitHub repository URL, if the repository is already tracked, or
    /// if another entry already uses the name derived from the URL.
    pub async fn add(
        &self,
        url: &str,
        local_path: PathBuf,
        auto_update: bool,
    ) -> Result<TrackedRepository, StoreError> {
        let repo = TrackedRepository::new(url, local_path, auto_update)?;
        let added = self
            .update(|list| {
                if list.repos.iter().any(|r| r.url == repo.url) {
                    return Err(StoreError::AlreadyExists {
                        name: repo.name.clone(),
                    });
                }
                if list.get(&repo.name).is_some() {
                    return Err(StoreError::NameTaken {
                        name: repo.name.clone(),
                    });
                }
                list.repos.push(repo.clone());
                Ok(repo)
            })
            .await?;
        info!("now tracking {} ({})", added.name, added.url);
        Ok(added)
    }

    /// Stops tracking `name`. Returns the removed entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is tracked under `name`.
    pub async fn remove(&self, name: &str) -> Result<TrackedRepository, StoreError> {
        let removed = self
            .update(|list| {
                let idx = list
                    .repos
                    .iter()
                    .position(|r| r.name == name)
                    .ok_or_else(|| not_found(name))?;
                Ok(list.repos.remove(idx))
            })
            .await?;
        info!("no longer tracking {name}");
        Ok(removed)
    }

    /// # Errors
    ///
    /// Fails if `old` is not tracked or another entry is already called `new`.
    pub async fn rename(&self, old: &str, new: &str) -> Result<(), StoreError> {
        self.update(|list| {
            if old != new && list.get(new).is_some() {
                return Err(StoreError::NameTaken {
                    name: new.to_string(),
                });
            }
            list.get_mut(old).ok_or_else(|| not_found(old))?.name = new.to_string();
            Ok(())
        })
        .await
    }

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is tracked under `name`.
    pub async fn set_path(&self, name: &str, local_path: PathBuf) -> Result<(), StoreError> {
        self.modify(name, |repo| repo.local_path = local_path).await
    }

    /// Points `name` at another repository. The URL is cleaned up the same way as in
    /// [`RepositoryStore::add`].
    ///
    /// # Errors
    ///
    /// Fails if the URL is not a GitHub repository URL, another entry already tracks it, or `name`
    /// is not tracked.
    pub async fn set_url(&self, name: &str, url: &str) -> Result<(), StoreError> {
        let (_, url) = parse_repository_url(url)?;
        self.update(|list| {
            if let Some(other) = list.repos.iter().find(|r| r.url == url && r.name != name) {
                return Err(StoreError::AlreadyExists {
                    name: other.name.clone(),
                });
            }
            list.get_mut(name).ok_or_else(|| not_found(name))?.url = url;
            Ok(())
        })
        .await
    }

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is tracked under `name`.
    pub async fn set_auto_update(&self, name: &str, auto_update: bool) -> Result<(), StoreError> {
        self.modify(name, |repo| repo.auto_update = auto_update)
            .await
    }

    pub(crate) async fn set_learned_pattern(
        &self,
        name: &str,
        pattern: &str,
    ) -> Result<(), StoreError> {
        self.modify(name, |repo| repo.learned_pattern = pattern.to_string())
            .await
    }

    pub(crate) async fn set_installed_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<(), StoreError> {
        self.modify(name, |repo| repo.installed_version = version.to_string())
            .await
    }

    async fn modify<F>(&self, name: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut TrackedRepository),
    {
        self.update(|list| {
            f(list.get_mut(name).ok_or_else(|| not_found(name))?);
            Ok(())
        })
        .await
    }
}

fn not_found(name: &str) -> StoreError {
    StoreError::NotFound {
        name: name.to_string(),
    }
}

fn parse_or_default(path: &Path, bytes: &[u8]) -> RepositoryList {
    parse_existing(bytes).unwrap_or_else(|e| {
        warn!(
            "could not parse {}, starting with an empty repository list: {e:#}",
            path.display()
        );
        RepositoryList::default()
    })
}

fn parse_existing(bytes: &[u8]) -> Result<RepositoryList> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(RepositoryList::default());
    }
    serde_json::from_slice(bytes).context("could not parse the repository list")
}

fn to_json(list: &RepositoryList) -> Result<Vec<u8>> {
    let mut out = vec![];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    list.serialize(&mut ser)
        .context("could not serialize the repository list")?;
    out.push(b'\n');
    Ok(out)
}

async fn write_from_start(file: &mut tokio::fs::File, bytes: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(0)).await?;
    file.write_all(bytes).await?;
    file.set_len(bytes.len() as u64).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use test_log::test;

    fn store() -> Result<(TempDir, RepositoryStore)> {
        let td = tempdir()?;
        let store = RepositoryStore::new(td.path().join("config").join("repos.json"));
        Ok((td, store))
    }

    #[test(tokio::test)]
    async fn add_creates_the_file() -> Result<()> {
        let (_td, store) = store()?;
        let repo = store
            .add(
                "https://github.com/foo/bar/releases",
                PathBuf::from("/opt/bar"),
                true,
            )
            .await?;
        assert_eq!(repo.name, "foo/bar");
        assert_eq!(repo.url, "https://github.com/foo/bar");

        let on_disk: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(store.path()).await?)?;
        assert_eq!(on_disk["schema"], 1);
        assert_eq!(on_disk["repos"][0]["name"], "foo/bar");
        assert_eq!(on_disk["repos"][0]["path"], "/opt/bar");
        assert_eq!(on_disk["repos"][0]["correct_package_name"], "");
        assert_eq!(on_disk["repos"][0]["version"], "");
        assert_eq!(on_disk["repos"][0]["auto_update"], true);
        Ok(())
    }

    #[test(tokio::test)]
    async fn add_rejects_duplicates() -> Result<()> {
        let (_td, store) = store()?;
        store
            .add("https://github.com/foo/bar", PathBuf::from("/opt"), false)
            .await?;

        let err = store
            .add("https://github.com/foo/bar/", PathBuf::from("/tmp"), false)
            .await
            .expect_err("same URL is rejected");
        assert!(matches!(err, StoreError::AlreadyExists { .. }), "{err}");

        store.rename("foo/bar", "baz/qux").await?;
        let err = store
            .add("https://github.com/baz/qux", PathBuf::from("/tmp"), false)
            .await
            .expect_err("same name is rejected");
        assert!(matches!(err, StoreError::NameTaken { .. }), "{err}");

        let err = store
            .add("https://example.com/foo/bar", PathBuf::from("/tmp"), false)
            .await
            .expect_err("non-GitHub URL is rejected");
        assert!(matches!(err, StoreError::InvalidUrl { .. }), "{err}");

        assert_eq!(store.list().await.len(), 1);
        Ok(())
    }

    #[test(tokio::test)]
    async fn management_operations() -> Result<()> {
        let (_td, store) = store()?;
        store
            .add("https://github.com/foo/bar", PathBuf::from("/opt"), false)
            .await?;
        store
            .add("https://github.com/foo/baz", PathBuf::from("/opt"), false)
            .await?;

        store.set_path("foo/bar", PathBuf::from("/srv/bar")).await?;
        store.set_auto_update("foo/bar", true).await?;
        store
            .set_url("foo/bar", "https://github.com/other/bar/tree/main")
            .await?;
        store.rename("foo/bar", "bar").await?;

        let bar = store.get("bar").await.expect("renamed entry exists");
        assert_eq!(bar.local_path, PathBuf::from("/srv/bar"));
        assert!(bar.auto_update);
        assert_eq!(bar.url, "https://github.com/other/bar");
        assert!(store.get("foo/bar").await.is_none());

        assert!(matches!(
            store.rename("bar", "foo/baz").await,
            Err(StoreError::NameTaken { .. })
        ));
        assert!(matches!(
            store.set_url("bar", "https://github.com/foo/baz").await,
            Err(StoreError::AlreadyExists { .. })
        ));
        assert!(matches!(
            store.set_url("bar", "not a url").await,
            Err(StoreError::InvalidUrl { .. })
        ));
        assert!(matches!(
            store.set_path("nope", PathBuf::from("/")).await,
            Err(StoreError::NotFound { .. })
        ));

        let removed = store.remove("bar").await?;
        assert_eq!(removed.url, "https://github.com/other/bar");
        assert_eq!(
            store
                .list()
                .await
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>(),
            vec!["foo/baz"]
        );
        assert!(matches!(
            store.remove("bar").await,
            Err(StoreError::NotFound { .. })
        ));
        Ok(())
    }

    #[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn concurrent_updates_keep_every_change() -> Result<()> {
        let (_td, store) = store()?;
        let names = (0..10)
            .map(|i| format!("owner/repo{i}"))
            .collect::<Vec<_>>();
        for name in &names {
            store
                .add(
                    &format!("https://github.com/{name}"),
                    PathBuf::from("/opt"),
                    false,
                )
                .await?;
        }

        let store = Arc::new(store);
        let results = join_all(names.iter().map(|name| {
            let store = Arc::clone(&store);
            let name = name.clone();
            tokio::spawn(async move {
                store
                    .set_learned_pattern(&name, &format!("{name}-*.zip"))
                    .await?;
                store.set_installed_version(&name, "1.0.0").await
            })
        }))
        .await;
        for r in results {
            r??;
        }

        let list = store.load().await;
        assert_eq!(list.repos.len(), 10);
        for name in &names {
            let repo = list.get(name).expect("entry survived");
            assert_eq!(repo.learned_pattern(), Some(format!("{name}-*.zip").as_str()));
            assert_eq!(repo.installed_version(), Some("1.0.0"));
        }
        Ok(())
    }

    #[test(tokio::test)]
    async fn shrinking_document_is_truncated() -> Result<()> {
        let (_td, store) = store()?;
        store
            .add("https://github.com/foo/a-very-long-repository-name", PathBuf::from("/opt"), false)
            .await?;
        store
            .remove("foo/a-very-long-repository-name")
            .await?;

        let on_disk: RepositoryList = serde_json::from_slice(&tokio::fs::read(store.path()).await?)?;
        assert!(on_disk.repos.is_empty());
        Ok(())
    }

    #[test(tokio::test)]
    async fn unparseable_file_is_not_overwritten() -> Result<()> {
        let (_td, store) = store()?;
        tokio::fs::create_dir_all(store.path().parent().expect("has a parent")).await?;
        let garbage = r#"{"repos": [{"name": "foo/bar", "#;
        tokio::fs::write(store.path(), garbage).await?;

        assert!(store.list().await.is_empty());
        let err = store
            .add("https://github.com/foo/baz", PathBuf::from("/opt"), false)
            .await
            .expect_err("adding to a broken file fails");
        assert!(matches!(err, StoreError::Io { .. }), "{err}");
        assert!(matches!(
            store.set_auto_update("foo/bar", true).await,
            Err(StoreError::Io { .. })
        ));

        assert_eq!(tokio::fs::read_to_string(store.path()).await?, garbage);
        Ok(())
    }

    #[test(tokio::test)]
    async fn empty_file_is_an_empty_list() -> Result<()> {
        let (_td, store) = store()?;
        tokio::fs::create_dir_all(store.path().parent().expect("has a parent")).await?;
        tokio::fs::write(store.path(), "\n").await?;

        store
            .add("https://github.com/foo/bar", PathBuf::from("/opt"), false)
            .await?;
        assert_eq!(store.list().await.len(), 1);
        Ok(())
    }

    #[test(tokio::test)]
    async fn reads_documents_without_schema() -> Result<()> {
        let (_td, store) = store()?;
        tokio::fs::create_dir_all(store.path().parent().expect("has a parent")).await?;
        tokio::fs::write(
            store.path(),
            r#"{"repos": [{"name": "foo/bar", "url": "https://github.com/foo/bar", "path": "/opt", "correct_package_name": "Auto Detect", "version": "", "auto_update": false}]}"#,
        )
        .await?;

        let repo = store.get("foo/bar").await.expect("entry is loaded");
        assert_eq!(repo.learned_pattern(), None);
        assert_eq!(repo.display_version(), "N/A");

        store.set_installed_version("foo/bar", "2.0").await?;
        let on_disk: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(store.path()).await?)?;
        assert_eq!(on_disk["schema"], 1);
        assert_eq!(on_disk["repos"][0]["version"], "2.0");
        Ok(())
    }
}
