//! A library for keeping local copies of GitHub release assets up to date.
//!
//! `gitupdater` tracks a list of GitHub repositories. For each one it remembers where the release
//! asset lives on disk, which version is installed, and, once it has been worked out, which asset
//! name pattern is the right one for this machine. Checking for updates compares the installed
//! version with the latest release, and applying an update downloads the asset and either extracts
//! it, runs it as an installer, or moves it into place.
//!
//! This project also ships a CLI tool named `gitupdater`. See [the project's GitHub
//! repo](https://github.com/gitupdater/gitupdater) for more details on installing and using this
//! tool.
//!
//! The main entry point for programmatic use is the [`UpdaterBuilder`] struct. Here is an example
//! of its usage:
//!
//! ```ignore
//! use gitupdater::UpdaterBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let updater = UpdaterBuilder::new().build().await?;
//!
//!     let report = updater.check().await;
//!     for candidate in &report.candidates {
//!         updater.apply_update(candidate, None).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## How `gitupdater` Finds the Right Release Asset
//!
//! Every release asset goes through the same funnel. The first stage that leaves exactly one asset
//! wins.
//!
//! - First it keeps the assets whose name contains the OS token (`windows`, `linux`, or `darwin`),
//!   ignoring case. Assets with an extension that only makes sense on one OS, like `.exe`, `.msi`,
//!   `.deb`, `.AppImage`, or `.dmg`, count as matching that OS. If nothing matches, there is no
//!   compatible asset.
//! - If a name pattern was learned for the repository earlier, it is matched against the
//!   remaining assets. Patterns are asset names with every version number replaced by `*`, so
//!   `bar-1.2.0-windows-x64.zip` becomes `bar-*-windows-x64.zip`.
//! - Next it filters based on your CPU architecture. Each architecture has a set of labels that
//!   mean the same thing, for example `x64`, `x86_64`, and `amd64`. Labels only match as whole
//!   tokens in the name.
//! - If there is still more than one asset, the [`Chooser`] is asked, first with the assets that
//!   matched the architecture and then with all of the assets that matched the OS.
//!
//! Whenever the architecture filter or the chooser settles on an asset, its pattern is saved for
//! the repository so that the next check can skip straight to it.
//!
//! ## Versions
//!
//! The installed version is the first dotted number in the release title, like `2.3.1` in
//! `Release 2.3.1`. Releases without one, such as nightly builds, use the date the asset was last
//! updated instead, formatted as `YYYY-MM-DD`.
//!
//! ## Features
//!
//! This crate offers several features to control the TLS dependency used by `reqwest`:
//!
#![doc = document_features::document_features!()]

mod arch;
mod archive;
mod builder;
mod chooser;
mod config;
mod download;
mod error;
mod extension;
mod github;
mod installer;
mod os;
mod pattern;
mod picker;
mod platform;
mod poller;
mod release;
mod repository;
mod store;
#[cfg(test)]
mod test_case;
mod updater;
mod version;

pub use crate::{
    arch::ArchVariant,
    builder::UpdaterBuilder,
    chooser::{ChannelChooser, Chooser, HeadlessChooser, SelectionRequest},
    config::{config_dir, AppConfig},
    error::{ApplyError, PickError, PollError, StoreError},
    github::{CachedReleaseSource, GitHub, ReleaseSource},
    installer::{ApplyEvent, ApplyOutcome, ApplyState, UpdateApplier},
    os::Os,
    pattern::{to_matcher, to_pattern},
    picker::AssetMatch,
    platform::PlatformIdentity,
    poller::{PollReport, ReleasePoller},
    release::{ReleaseAsset, ReleaseSnapshot, UpdateCandidate},
    repository::{RepositoryList, TrackedRepository},
    store::RepositoryStore,
    updater::{CycleReport, InFlightGuard, Updater},
    version::{extract_version, extract_version_in},
};

// The version of the `gitupdater` crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(feature = "logging")]
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};

/// This function initializes logging for the application. It's public for the sake of the
/// `gitupdater` binary, but it lives in the library crate so that test code can also enable logging.
///
/// # Errors
///
/// This can return a `log::SetLoggerError` error.
#[cfg(feature = "logging")]
pub fn init_logger(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    let line_colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::BrightBlack)
        .debug(Color::BrightBlack)
        .trace(Color::BrightBlack);
    let level_colors = line_colors.info(Color::Green).debug(Color::Black);

    Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{color_line}[{target}][{level}{color_line}] {message}\x1B[0m",
                color_line = format_args!(
                    "\x1B[{}m",
                    line_colors.get_color(&record.level()).to_fg_str()
                ),
                target = record.target(),
                level = level_colors.color(record.level()),
                message = message,
            ));
        })
        .level(level)
        // These are very noisy.
        .level_for("hyper", log::LevelFilter::Error)
        .level_for("reqwest", log::LevelFilter::Error)
        .chain(std::io::stderr())
        .apply()
}
