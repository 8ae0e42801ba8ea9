use crate::{
    chooser::Chooser, error::PickError, extension::Extension, pattern, platform::PlatformIdentity,
    release::ReleaseAsset,
};
use log::{debug, warn};

/// The asset picked for a release. `learned_pattern` is set when picking the asset required
/// narrowing down several candidates, and should be remembered for the next check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetMatch {
    pub asset: ReleaseAsset,
    pub learned_pattern: Option<String>,
}

#[derive(Debug)]
pub(crate) struct AssetPicker<'a> {
    platform: &'a PlatformIdentity,
    learned_pattern: Option<&'a str>,
    chooser: Option<&'a dyn Chooser>,
}

impl<'a> AssetPicker<'a> {
    pub(crate) fn new(
        platform: &'a PlatformIdentity,
        learned_pattern: Option<&'a str>,
        chooser: Option<&'a dyn Chooser>,
    ) -> Self {
        Self {
            platform,
            learned_pattern,
            chooser,
        }
    }

    /// Picks the one asset for our platform. `Ok(None)` means that no asset matches our OS at all.
    pub(crate) async fn pick(
        &self,
        title: &str,
        assets: &[ReleaseAsset],
    ) -> Result<Option<AssetMatch>, PickError> {
        let mut os_matches = self.os_matches(assets);
        if os_matches.is_empty() {
            debug!("no asset of {title} matches our OS ({})", self.platform.os);
            return Ok(None);
        }

        if let Some(asset) = self.learned_pattern_match(&os_matches) {
            return Ok(Some(AssetMatch {
                asset: asset.clone(),
                learned_pattern: None,
            }));
        }

        if os_matches.len() == 1 {
            debug!("there is only one asset that matches our OS");
            return Ok(Some(AssetMatch {
                asset: os_matches.remove(0).clone(),
                learned_pattern: None,
            }));
        }

        let mut arch_matches = self.arch_matches(&os_matches);
        if arch_matches.len() == 1 {
            let asset = arch_matches.remove(0);
            debug!("only {} matches our CPU architecture", asset.name);
            return Ok(Some(Self::learned(asset)));
        }

        let candidates = if arch_matches.is_empty() {
            debug!("no asset names matched our CPU architecture, will ask about all OS matches");
            os_matches
        } else {
            arch_matches
        };
        self.ask_chooser(title, candidates).await.map(Some)
    }

    fn os_matches<'b>(&self, assets: &'b [ReleaseAsset]) -> Vec<&'b ReleaseAsset> {
        let os = self.platform.os;
        let mut matches = vec![];
        for asset in assets {
            debug!("matching OS against asset name = {}", asset.name);
            if os.name_matches(&asset.name) {
                debug!("name contains `{}`", os.token());
                matches.push(asset);
            } else if Extension::from_path(&asset.name).and_then(Extension::exclusive_os)
                == Some(os)
            {
                debug!("extension is only used on {os}");
                matches.push(asset);
            } else {
                debug!("does not match our OS");
            }
        }
        matches
    }

    fn learned_pattern_match<'b>(&self, os_matches: &[&'b ReleaseAsset]) -> Option<&'b ReleaseAsset> {
        let pattern = self.learned_pattern?;
        let matcher = match pattern::to_matcher(pattern) {
            Ok(m) => m,
            Err(e) => {
                warn!("ignoring the learned asset pattern `{pattern}`: {e:#}");
                return None;
            }
        };

        let mut matches = os_matches
            .iter()
            .copied()
            .filter(|a| matcher.is_match(&a.name))
            .collect::<Vec<_>>();
        if matches.len() == 1 {
            debug!(
                "the learned pattern `{pattern}` matches {}",
                matches[0].name
            );
            return Some(matches.remove(0));
        }

        debug!(
            "the learned pattern `{pattern}` matches {} assets, ignoring it",
            matches.len()
        );
        None
    }

    fn arch_matches<'b>(&self, os_matches: &[&'b ReleaseAsset]) -> Vec<&'b ReleaseAsset> {
        debug!(
            "matching asset names against CPU architecture labels {}",
            self.platform.arch.labels().join(", ")
        );
        os_matches
            .iter()
            .copied()
            .filter(|a| {
                let m = self.platform.arch.name_matches(&a.name);
                debug!("{} matches our CPU architecture: {m}", a.name);
                m
            })
            .collect()
    }

    async fn ask_chooser(
        &self,
        title: &str,
        candidates: Vec<&ReleaseAsset>,
    ) -> Result<AssetMatch, PickError> {
        let names = candidates.iter().map(|a| a.name.clone()).collect::<Vec<_>>();
        let ambiguous = || PickError::Ambiguous {
            candidates: names.clone(),
        };

        let Some(chooser) = self.chooser else {
            debug!("there is no chooser to ask which asset of {title} to use");
            return Err(ambiguous());
        };
        let Some(selection) = chooser.choose(title, &names).await else {
            debug!("asset selection for {title} was cancelled");
            return Err(ambiguous());
        };

        match candidates.into_iter().find(|a| a.name == selection) {
            Some(asset) => Ok(Self::learned(asset)),
            None => {
                warn!("`{selection}` is not one of the assets that could be picked for {title}");
                Err(ambiguous())
            }
        }
    }

    fn learned(asset: &ReleaseAsset) -> AssetMatch {
        let learned_pattern = pattern::to_pattern(&asset.name);
        debug!(
            "learned the pattern `{learned_pattern}` from {}",
            asset.name
        );
        AssetMatch {
            asset: asset.clone(),
            learned_pattern: Some(learned_pattern),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arch::ArchVariant, os::Os};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };
    use test_log::test;
    use url::Url;

    /// Answers with a fixed selection and counts how often it was asked.
    #[derive(Debug, Default)]
    struct CountingChooser {
        answer: Option<String>,
        calls: AtomicUsize,
        last_candidates: Mutex<Vec<String>>,
    }

    impl CountingChooser {
        fn answering(answer: &str) -> Self {
            Self {
                answer: Some(answer.to_string()),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Chooser for CountingChooser {
        async fn choose(&self, _title: &str, candidates: &[String]) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_candidates.lock().unwrap() = candidates.to_vec();
            self.answer.clone()
        }
    }

    fn assets(names: &[&str]) -> Vec<ReleaseAsset> {
        names
            .iter()
            .map(|name| ReleaseAsset {
                name: (*name).to_string(),
                size_bytes: 1024,
                browser_download_url: Url::parse(&format!(
                    "https://github.com/foo/bar/releases/download/v1/{name}"
                ))
                .unwrap(),
                updated_at: Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap(),
            })
            .collect()
    }

    fn windows_x64() -> PlatformIdentity {
        PlatformIdentity::new(Os::Windows, ArchVariant::X86_64)
    }

    #[rstest]
    #[case::one_os_match(
        PlatformIdentity::new(Os::Windows, ArchVariant::X86_64),
        &["bar-1.2.0-windows-x64.zip", "bar-1.2.0-linux-x64.tar.gz"],
        "bar-1.2.0-windows-x64.zip",
    )]
    #[case::installer_extension(
        PlatformIdentity::new(Os::Windows, ArchVariant::X86_64),
        &["bar-setup-1.2.0.exe", "bar-1.2.0-linux-x64.tar.gz"],
        "bar-setup-1.2.0.exe",
    )]
    #[case::appimage_without_os_in_name(
        PlatformIdentity::new(Os::Linux, ArchVariant::X86_64),
        &["NooDS.AppImage", "NooDS-windows.zip", "NooDS.dmg"],
        "NooDS.AppImage",
    )]
    #[case::dmg_for_darwin(
        PlatformIdentity::new(Os::Darwin, ArchVariant::Arm),
        &["bar-1.2.0.dmg", "bar-1.2.0-linux-x64.tar.gz"],
        "bar-1.2.0.dmg",
    )]
    #[tokio::test]
    async fn single_os_match_needs_no_chooser(
        #[case] platform: PlatformIdentity,
        #[case] names: &[&str],
        #[case] expect: &str,
    ) -> Result<()> {
        crate::test_case::init_logging();
        let chooser = CountingChooser::default();
        let assets = assets(names);
        let picked = AssetPicker::new(&platform, None, Some(&chooser))
            .pick("foo/bar", &assets)
            .await?
            .expect("an asset was picked");

        assert_eq!(picked.asset.name, expect);
        assert_eq!(picked.learned_pattern, None);
        assert_eq!(chooser.calls(), 0);
        Ok(())
    }

    #[test(tokio::test)]
    async fn no_os_match_is_none() -> Result<()> {
        let chooser = CountingChooser::default();
        let platform = PlatformIdentity::new(Os::Darwin, ArchVariant::X86_64);
        let assets = assets(&["bar-1.2.0-windows-x64.zip", "bar-1.2.0-linux-x64.tar.gz"]);
        let picked = AssetPicker::new(&platform, Some("bar-*-windows-x64.zip"), Some(&chooser))
            .pick("foo/bar", &assets)
            .await?;

        assert_eq!(picked, None);
        assert_eq!(chooser.calls(), 0);
        Ok(())
    }

    #[test(tokio::test)]
    async fn arch_filter_learns_a_pattern() -> Result<()> {
        let chooser = CountingChooser::default();
        let platform = windows_x64();
        let assets = assets(&["bar-1.2.0-windows-x86.zip", "bar-1.2.0-windows-x64.zip"]);
        let picked = AssetPicker::new(&platform, None, Some(&chooser))
            .pick("foo/bar", &assets)
            .await?
            .expect("an asset was picked");

        assert_eq!(picked.asset.name, "bar-1.2.0-windows-x64.zip");
        assert_eq!(
            picked.learned_pattern.as_deref(),
            Some("bar-*-windows-x64.zip")
        );
        assert_eq!(chooser.calls(), 0);
        Ok(())
    }

    #[test(tokio::test)]
    async fn learned_pattern_short_circuits() -> Result<()> {
        let chooser = CountingChooser::default();
        let platform = windows_x64();
        let assets = assets(&[
            "bar-2.0.0-windows-x64-portable.zip",
            "bar-2.0.0-windows-x64.zip",
            "bar-2.0.0-windows-x86.zip",
        ]);
        let picked = AssetPicker::new(&platform, Some("bar-*-windows-x64.zip"), Some(&chooser))
            .pick("foo/bar", &assets)
            .await?
            .expect("an asset was picked");

        assert_eq!(picked.asset.name, "bar-2.0.0-windows-x64.zip");
        assert_eq!(picked.learned_pattern, None);
        assert_eq!(chooser.calls(), 0);
        Ok(())
    }

    #[test(tokio::test)]
    async fn learned_pattern_with_no_match_falls_through() -> Result<()> {
        let platform = windows_x64();
        let assets = assets(&["bar-2.0.0-win-x86.zip", "bar-2.0.0-windows-x64.zip"]);
        let picked = AssetPicker::new(&platform, Some("bar-*-windows-amd64.zip"), None)
            .pick("foo/bar", &assets)
            .await?
            .expect("an asset was picked");

        assert_eq!(picked.asset.name, "bar-2.0.0-windows-x64.zip");
        assert_eq!(picked.learned_pattern, None);
        Ok(())
    }

    #[test(tokio::test)]
    async fn chooser_resolves_ambiguity() -> Result<()> {
        let chooser = CountingChooser::answering("bar-1.2.0-windows-x64-portable.zip");
        let platform = windows_x64();
        let assets = assets(&[
            "bar-1.2.0-windows-x64.zip",
            "bar-1.2.0-windows-x64-portable.zip",
            "bar-1.2.0-windows-x86.zip",
        ]);
        let picked = AssetPicker::new(&platform, None, Some(&chooser))
            .pick("foo/bar", &assets)
            .await?
            .expect("an asset was picked");

        assert_eq!(picked.asset.name, "bar-1.2.0-windows-x64-portable.zip");
        assert_eq!(
            picked.learned_pattern.as_deref(),
            Some("bar-*-windows-x64-portable.zip")
        );
        assert_eq!(chooser.calls(), 1);
        assert_eq!(
            *chooser.last_candidates.lock().unwrap(),
            vec![
                "bar-1.2.0-windows-x64.zip".to_string(),
                "bar-1.2.0-windows-x64-portable.zip".to_string(),
            ],
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn chooser_gets_all_os_matches_when_no_arch_matches() -> Result<()> {
        let chooser = CountingChooser::answering("bar-1.2.0-windows-setup.exe");
        let platform = windows_x64();
        let assets = assets(&["bar-1.2.0-windows-portable.zip", "bar-1.2.0-windows-setup.exe"]);
        let picked = AssetPicker::new(&platform, None, Some(&chooser))
            .pick("foo/bar", &assets)
            .await?
            .expect("an asset was picked");

        assert_eq!(picked.asset.name, "bar-1.2.0-windows-setup.exe");
        assert_eq!(chooser.last_candidates.lock().unwrap().len(), 2);
        Ok(())
    }

    #[rstest]
    #[case::no_chooser(None)]
    #[case::cancelled(Some(CountingChooser::default()))]
    #[case::unknown_answer(Some(CountingChooser::answering("not-an-asset.zip")))]
    #[tokio::test]
    async fn unresolved_ambiguity_is_an_error(#[case] chooser: Option<CountingChooser>) {
        crate::test_case::init_logging();
        let platform = windows_x64();
        let assets = assets(&["bar-1.2.0-windows-x64.zip", "bar-1.2.0-windows-x64.msi"]);
        let picked = AssetPicker::new(
            &platform,
            None,
            chooser.as_ref().map(|c| c as &dyn Chooser),
        )
        .pick("foo/bar", &assets)
        .await;

        assert_eq!(
            picked,
            Err(PickError::Ambiguous {
                candidates: vec![
                    "bar-1.2.0-windows-x64.zip".to_string(),
                    "bar-1.2.0-windows-x64.msi".to_string(),
                ],
            })
        );
    }
}
